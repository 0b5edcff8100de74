use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Wire enums (smallint in DB)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male = 0,
    Female = 1,
    Other = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
}

impl BookingStatus {
    /// Statuses that hold a slot for the advisory conflict check.
    pub fn blocks_slot(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Directed transition table for admin status changes:
    /// pending -> confirmed|cancelled, confirmed -> completed|cancelled,
    /// completed and cancelled are terminal.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    /// Statuses allowed to move into `target` (used by bulk updates).
    pub fn sources_of(target: BookingStatus) -> Vec<i16> {
        [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(target))
        .map(|s| s as i16)
        .collect()
    }
}

/// Human-facing booking reference shown on the confirmation page.
pub fn booking_reference(booking_number: i64) -> String {
    format!("BK-{booking_number:04}")
}

/// A booking is upcoming while its date/time is still ahead of `now`.
pub fn is_upcoming(booking_date: NaiveDate, booking_time: NaiveTime, now: NaiveDateTime) -> bool {
    booking_date > now.date() || (booking_date == now.date() && booking_time > now.time())
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TestRow {
    pub test_id: Uuid,
    pub test_name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_hours: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingRow {
    pub booking_id: Uuid,
    pub booking_number: i64,
    pub patient_id: Uuid,
    pub test_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking joined with patient and test, for confirmation and listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingDetailRow {
    pub booking_id: Uuid,
    pub booking_number: i64,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub test_id: Uuid,
    pub test_name: String,
    pub price: Decimal,
}

#[derive(Debug, FromRow)]
pub struct AdminUserRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(Debug, FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   Shared API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        OkResponse { data: OkData { ok: true } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn booking_reference_is_zero_padded() {
        assert_eq!(booking_reference(7), "BK-0007");
        assert_eq!(booking_reference(12345), "BK-12345");
    }

    #[test]
    fn upcoming_depends_on_date_then_time() {
        let now = d(2025, 6, 1).and_time(t(10, 0));
        assert!(is_upcoming(d(2025, 6, 2), t(8, 0), now));
        assert!(is_upcoming(d(2025, 6, 1), t(10, 1), now));
        assert!(!is_upcoming(d(2025, 6, 1), t(10, 0), now));
        assert!(!is_upcoming(d(2025, 5, 31), t(23, 59), now));
    }

    #[test]
    fn transition_table_is_directed() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn sources_of_matches_table() {
        assert_eq!(BookingStatus::sources_of(BookingStatus::Confirmed), vec![0]);
        assert_eq!(BookingStatus::sources_of(BookingStatus::Completed), vec![1]);
        assert_eq!(BookingStatus::sources_of(BookingStatus::Cancelled), vec![0, 1]);
        assert!(BookingStatus::sources_of(BookingStatus::Pending).is_empty());
    }

    #[test]
    fn only_pending_and_confirmed_block_a_slot() {
        assert!(BookingStatus::Pending.blocks_slot());
        assert!(BookingStatus::Confirmed.blocks_slot());
        assert!(!BookingStatus::Completed.blocks_slot());
        assert!(!BookingStatus::Cancelled.blocks_slot());
    }
}
