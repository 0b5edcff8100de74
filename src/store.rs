//! Entity store: every query against the patient / lab_test / booking
//! tables lives here, keyed off the shared [`sqlx::PgPool`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::models::{BookingDetailRow, BookingRow, BookingStatus, PatientRow, TestRow, is_upcoming};
use crate::validation::{NormalizedSubmission, Slot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("multiple patients matched the lookup")]
    AmbiguousLookup,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/* ============================================================
   Tests (catalog)
   ============================================================ */

pub async fn active_tests(pool: &PgPool) -> Result<Vec<TestRow>, StoreError> {
    let rows = sqlx::query_as::<_, TestRow>(
        r#"
        SELECT test_id, test_name, description, price, duration_hours, is_active, created_at
        FROM lab_test
        WHERE is_active = true
        ORDER BY test_name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn active_test(pool: &PgPool, test_id: Uuid) -> Result<TestRow, StoreError> {
    sqlx::query_as::<_, TestRow>(
        r#"
        SELECT test_id, test_name, description, price, duration_hours, is_active, created_at
        FROM lab_test
        WHERE test_id = $1 AND is_active = true
        "#,
    )
    .bind(test_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound("test"))
}

/* ============================================================
   Availability / slot conflict
   ============================================================ */

/// Advisory check: is the slot held by a pending or confirmed booking?
/// The UNIQUE (test_id, booking_date, booking_time) constraint is the
/// actual guarantee at insert time.
pub async fn slot_taken(pool: &PgPool, slot: Slot) -> Result<bool, StoreError> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM booking
            WHERE test_id = $1
              AND booking_date = $2
              AND booking_time = $3
              AND status IN (0, 1) -- pending, confirmed
        )
        "#,
    )
    .bind(slot.test_id)
    .bind(slot.booking_date)
    .bind(slot.booking_time)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn booked_times(
    pool: &PgPool,
    test_id: Uuid,
    booking_date: NaiveDate,
) -> Result<Vec<NaiveTime>, StoreError> {
    let times: Vec<NaiveTime> = sqlx::query_scalar(
        r#"
        SELECT booking_time
        FROM booking
        WHERE test_id = $1
          AND booking_date = $2
          AND status IN (0, 1) -- pending, confirmed
        ORDER BY booking_time ASC
        "#,
    )
    .bind(test_id)
    .bind(booking_date)
    .fetch_all(pool)
    .await?;
    Ok(times)
}

/* ============================================================
   Submission commit (upsert patient + insert booking, one tx)
   ============================================================ */

/// Create-or-update keyed on normalized email. `created_at` stays at
/// its original value on update.
pub async fn upsert_patient_by_email(
    tx: &mut Transaction<'_, Postgres>,
    bundle: &NormalizedSubmission,
) -> Result<Uuid, StoreError> {
    let patient_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO patient (full_name, age, gender, phone, email, address)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            age       = EXCLUDED.age,
            gender    = EXCLUDED.gender,
            phone     = EXCLUDED.phone,
            address   = EXCLUDED.address
        RETURNING patient_id
        "#,
    )
    .bind(&bundle.full_name)
    .bind(bundle.age)
    .bind(bundle.gender)
    .bind(&bundle.phone)
    .bind(&bundle.email)
    .bind(&bundle.address)
    .fetch_one(&mut **tx)
    .await?;
    Ok(patient_id)
}

/// New bookings always start pending. A unique violation on the slot
/// constraint becomes a Conflict.
pub async fn create_booking(
    tx: &mut Transaction<'_, Postgres>,
    patient_id: Uuid,
    bundle: &NormalizedSubmission,
) -> Result<BookingRow, StoreError> {
    sqlx::query_as::<_, BookingRow>(
        r#"
        INSERT INTO booking (patient_id, test_id, booking_date, booking_time, status, notes)
        VALUES ($1, $2, $3, $4, 0, $5)
        RETURNING booking_id, booking_number, patient_id, test_id,
                  booking_date, booking_time, status, notes, created_at, updated_at
        "#,
    )
    .bind(patient_id)
    .bind(bundle.test_id)
    .bind(bundle.booking_date)
    .bind(bundle.booking_time)
    .bind(&bundle.notes)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict(
                "This time slot was just taken. Please select a different time.".into(),
            )
        } else {
            StoreError::Db(e)
        }
    })
}

/// True when the slot is no longer ahead of `now`: a past date, or
/// today at or before the current time.
pub fn slot_in_past(
    booking_date: NaiveDate,
    booking_time: NaiveTime,
    now: NaiveDateTime,
) -> bool {
    !is_upcoming(booking_date, booking_time, now)
}

/// Commits a validated submission as one atomic unit: a conflict on the
/// booking insert rolls the patient upsert back with it.
pub async fn submit_booking(
    pool: &PgPool,
    bundle: &NormalizedSubmission,
) -> Result<BookingRow, StoreError> {
    // The not-in-the-past rule is enforced a second time here, right
    // before the write; the form-time check may be stale by now.
    let now = chrono::Local::now().naive_local();
    if slot_in_past(bundle.booking_date, bundle.booking_time, now) {
        return Err(StoreError::Validation(
            "Cannot book for a past date or time.".into(),
        ));
    }

    let mut tx = pool.begin().await?;
    let patient_id = upsert_patient_by_email(&mut tx, bundle).await?;
    let booking = create_booking(&mut tx, patient_id, bundle).await?;
    tx.commit().await?;
    Ok(booking)
}

/* ============================================================
   Read projections
   ============================================================ */

const DETAIL_SELECT: &str = r#"
    SELECT b.booking_id, b.booking_number, b.booking_date, b.booking_time,
           b.status, b.notes, b.created_at,
           p.patient_id, p.full_name AS patient_name,
           t.test_id, t.test_name, t.price
    FROM booking b
    JOIN patient p ON p.patient_id = b.patient_id
    JOIN lab_test t ON t.test_id = b.test_id
"#;

pub async fn booking_detail(pool: &PgPool, booking_id: Uuid) -> Result<BookingDetailRow, StoreError> {
    sqlx::query_as::<_, BookingDetailRow>(&format!("{DETAIL_SELECT} WHERE b.booking_id = $1"))
        .bind(booking_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound("booking"))
}

/// Newest-created first.
pub async fn bookings_for_patient(
    pool: &PgPool,
    patient_id: Uuid,
) -> Result<Vec<BookingDetailRow>, StoreError> {
    let rows = sqlx::query_as::<_, BookingDetailRow>(&format!(
        "{DETAIL_SELECT} WHERE b.patient_id = $1 ORDER BY b.created_at DESC"
    ))
    .bind(patient_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Up to 10 pending/confirmed bookings from `today` onwards, earliest
/// slot first. Exposed on the public test-detail page, so no patient
/// columns.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct UpcomingSlotRow {
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub status: BookingStatus,
}

pub async fn upcoming_bookings_for_test(
    pool: &PgPool,
    test_id: Uuid,
    today: NaiveDate,
) -> Result<Vec<UpcomingSlotRow>, StoreError> {
    let rows = sqlx::query_as::<_, UpcomingSlotRow>(
        r#"
        SELECT booking_date, booking_time, status
        FROM booking
        WHERE test_id = $1
          AND booking_date >= $2
          AND status IN (0, 1) -- pending, confirmed
        ORDER BY booking_date ASC, booking_time ASC
        LIMIT 10
        "#,
    )
    .bind(test_id)
    .bind(today)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/* ============================================================
   My-bookings lookup
   ============================================================ */

/// Last 10 digits of the phone input, used as a contains-match against
/// the stored (cleaned) phone. Digits-only output keeps LIKE
/// metacharacters like `%` and `_` out of the pattern.
pub fn phone_suffix(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

/// Exact email match when given; otherwise phone suffix contains-match.
/// With both, the two conditions combine. A phone input with no digits
/// contributes nothing. Zero rows is NotFound, more than one is
/// AmbiguousLookup.
pub async fn lookup_patient(
    pool: &PgPool,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<PatientRow, StoreError> {
    let phone_like = phone
        .map(phone_suffix)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let rows: Vec<PatientRow> = match (email, phone_like.as_deref()) {
        (Some(email), Some(like)) => {
            sqlx::query_as::<_, PatientRow>(
                r#"
                SELECT patient_id, full_name, age, gender, phone, email, address, created_at
                FROM patient
                WHERE email = $1 AND phone LIKE $2
                LIMIT 2
                "#,
            )
            .bind(email)
            .bind(like)
            .fetch_all(pool)
            .await?
        }
        (Some(email), None) => {
            sqlx::query_as::<_, PatientRow>(
                r#"
                SELECT patient_id, full_name, age, gender, phone, email, address, created_at
                FROM patient
                WHERE email = $1
                LIMIT 2
                "#,
            )
            .bind(email)
            .fetch_all(pool)
            .await?
        }
        (None, Some(like)) => {
            sqlx::query_as::<_, PatientRow>(
                r#"
                SELECT patient_id, full_name, age, gender, phone, email, address, created_at
                FROM patient
                WHERE phone LIKE $1
                LIMIT 2
                "#,
            )
            .bind(like)
            .fetch_all(pool)
            .await?
        }
        (None, None) => return Err(StoreError::NotFound("patient")),
    };

    match rows.len() {
        0 => Err(StoreError::NotFound("patient")),
        1 => Ok(rows.into_iter().next().expect("one row")),
        _ => Err(StoreError::AmbiguousLookup),
    }
}

/* ============================================================
   Administrative operations
   ============================================================ */

/// Status change with the directed transition table enforced. The row
/// is never deleted; cancelling only flips the status, and the slot
/// uniqueness constraint keeps applying to it.
pub async fn set_booking_status(
    pool: &PgPool,
    booking_id: Uuid,
    new_status: BookingStatus,
) -> Result<BookingRow, StoreError> {
    let current: BookingStatus = sqlx::query_scalar(
        r#"SELECT status FROM booking WHERE booking_id = $1"#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound("booking"))?;

    if !current.can_transition_to(new_status) {
        return Err(StoreError::Conflict(format!(
            "Cannot change booking status {:?} -> {:?}",
            current, new_status
        )));
    }

    let row = sqlx::query_as::<_, BookingRow>(
        r#"
        UPDATE booking
        SET status = $2, updated_at = now()
        WHERE booking_id = $1
        RETURNING booking_id, booking_number, patient_id, test_id,
                  booking_date, booking_time, status, notes, created_at, updated_at
        "#,
    )
    .bind(booking_id)
    .bind(new_status)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Bulk status change: rows whose current status may not move to the
/// target are skipped; returns the count actually updated.
pub async fn set_bookings_status(
    pool: &PgPool,
    booking_ids: &[Uuid],
    new_status: BookingStatus,
) -> Result<u64, StoreError> {
    let allowed_from = BookingStatus::sources_of(new_status);
    let result = sqlx::query(
        r#"
        UPDATE booking
        SET status = $2, updated_at = now()
        WHERE booking_id = ANY($1)
          AND status = ANY($3)
        "#,
    )
    .bind(booking_ids.to_vec())
    .bind(new_status)
    .bind(allowed_from)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_tests_active(
    pool: &PgPool,
    test_ids: &[Uuid],
    active: bool,
) -> Result<u64, StoreError> {
    let result = sqlx::query(r#"UPDATE lab_test SET is_active = $2 WHERE test_id = ANY($1)"#)
        .bind(test_ids.to_vec())
        .bind(active)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_patient(pool: &PgPool, patient_id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query(r#"DELETE FROM patient WHERE patient_id = $1"#)
        .bind(patient_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("patient"));
    }
    Ok(())
}

pub async fn delete_test(pool: &PgPool, test_id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query(r#"DELETE FROM lab_test WHERE test_id = $1"#)
        .bind(test_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("test"));
    }
    Ok(())
}

/* ============================================================
   Dashboard
   ============================================================ */

#[derive(Debug, serde::Serialize)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub total_tests: i64,
    pub total_bookings: i64,
    pub today_bookings: i64,
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
}

pub async fn dashboard_stats(pool: &PgPool, today: NaiveDate) -> Result<DashboardStats, StoreError> {
    let total_patients: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM patient"#)
        .fetch_one(pool)
        .await?;
    let total_tests: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM lab_test WHERE is_active = true"#)
            .fetch_one(pool)
            .await?;
    let total_bookings: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM booking"#)
        .fetch_one(pool)
        .await?;
    let today_bookings: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM booking WHERE booking_date = $1"#)
            .bind(today)
            .fetch_one(pool)
            .await?;
    let pending_bookings: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM booking WHERE status = 0"#)
            .fetch_one(pool)
            .await?;
    let confirmed_bookings: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM booking WHERE status = 1"#)
            .fetch_one(pool)
            .await?;

    Ok(DashboardStats {
        total_patients,
        total_tests,
        total_bookings,
        today_bookings,
        pending_bookings,
        confirmed_bookings,
    })
}

pub async fn recent_bookings(pool: &PgPool, limit: i64) -> Result<Vec<BookingDetailRow>, StoreError> {
    let rows = sqlx::query_as::<_, BookingDetailRow>(&format!(
        "{DETAIL_SELECT} ORDER BY b.created_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn bookings_on_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<BookingDetailRow>, StoreError> {
    let rows = sqlx::query_as::<_, BookingDetailRow>(&format!(
        "{DETAIL_SELECT} WHERE b.booking_date = $1 ORDER BY b.booking_time ASC"
    ))
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_suffix_takes_last_ten_digits() {
        assert_eq!(phone_suffix("+919876543210"), "9876543210");
        assert_eq!(phone_suffix("  9876543210  "), "9876543210");
        assert_eq!(phone_suffix("(987) 654-3210"), "9876543210");
        assert_eq!(phone_suffix("12345"), "12345");
        assert_eq!(phone_suffix(""), "");
    }

    #[test]
    fn phone_suffix_never_emits_like_wildcards() {
        assert_eq!(phone_suffix("%%%%%%%%%%"), "");
        assert_eq!(phone_suffix("98_7654%3210"), "9876543210");
        assert_eq!(phone_suffix("\\9876543210"), "9876543210");
    }

    #[test]
    fn past_slots_are_caught_before_insert() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let d = |day| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();

        assert!(slot_in_past(d(1).pred_opt().unwrap(), t(23, 59), now));
        assert!(slot_in_past(d(1), t(9, 59), now));
        assert!(slot_in_past(d(1), t(10, 0), now));
        assert!(!slot_in_past(d(1), t(10, 1), now));
        assert!(!slot_in_past(d(2), t(8, 0), now));
    }
}
