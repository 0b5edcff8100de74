// src/routes/admin_routes.rs
//
// Administrative console over the three entities: dashboard stats,
// list/edit/delete screens and the bulk status/active actions. Every
// handler requires an admin session (AuthContext).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::is_unique_violation,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, BookingStatus, Gender, OkResponse, TestRow, booking_reference},
    store::{self, DashboardStats},
    validation,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/patients", get(list_patients))
        .route("/patients/{patient_id}", get(get_patient).patch(update_patient).delete(remove_patient))
        .route("/tests", get(list_all_tests).post(create_test))
        .route("/tests/{test_id}", patch(update_test).delete(remove_test))
        .route("/tests/set_active", post(set_tests_active))
        .route("/bookings", get(list_bookings))
        .route("/bookings/{booking_id}/status", post(set_booking_status))
        .route("/bookings/set_status", post(set_bookings_status))
}

fn one_dp_min() -> Decimal {
    // 0.01, the minimum test price
    Decimal::new(1, 2)
}

/* ============================================================
   GET /dashboard
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct BookingBriefDto {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub patient_name: String,
    pub test_name: String,
    pub booking_date: NaiveDate,
    pub booking_time: String,
    pub status: BookingStatus,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardDto {
    pub stats: DashboardStats,
    pub recent_bookings: Vec<BookingBriefDto>,
    pub today_bookings: Vec<BookingBriefDto>,
}

fn brief(row: crate::models::BookingDetailRow) -> BookingBriefDto {
    BookingBriefDto {
        booking_id: row.booking_id,
        booking_reference: booking_reference(row.booking_number),
        patient_name: row.patient_name,
        test_name: row.test_name,
        booking_date: row.booking_date,
        booking_time: row.booking_time.format("%H:%M").to_string(),
        status: row.status,
        total_cost: row.price,
        created_at: row.created_at,
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<DashboardDto>>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let stats = store::dashboard_stats(&state.db, today).await?;
    let recent = store::recent_bookings(&state.db, 10).await?;
    let todays = store::bookings_on_date(&state.db, today).await?;

    Ok(Json(ApiOk {
        data: DashboardDto {
            stats,
            recent_bookings: recent.into_iter().map(brief).collect(),
            today_bookings: todays.into_iter().map(brief).collect(),
        },
    }))
}

/* ============================================================
   Patients
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientAdminRow {
    pub patient_id: Uuid,
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    /// Cross-link to this patient's bookings in the console.
    pub booking_count: i64,
}

const PATIENT_ADMIN_SELECT: &str = r#"
    SELECT p.patient_id, p.full_name, p.age, p.gender, p.phone, p.email,
           p.address, p.created_at,
           COUNT(b.booking_id) AS booking_count
    FROM patient p
    LEFT JOIN booking b ON b.patient_id = p.patient_id
"#;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ApiOk<Vec<PatientAdminRow>>>, ApiError> {
    let query = q.query.unwrap_or_default().trim().to_string();

    let rows: Vec<PatientAdminRow> = if query.is_empty() {
        sqlx::query_as::<_, PatientAdminRow>(&format!(
            "{PATIENT_ADMIN_SELECT}
             GROUP BY p.patient_id
             ORDER BY p.created_at DESC
             LIMIT 50"
        ))
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    } else {
        let like = format!("%{query}%");
        sqlx::query_as::<_, PatientAdminRow>(&format!(
            "{PATIENT_ADMIN_SELECT}
             WHERE p.full_name ILIKE $1 OR p.phone ILIKE $1 OR p.email ILIKE $1
             GROUP BY p.patient_id
             ORDER BY p.created_at DESC
             LIMIT 50"
        ))
        .bind(like)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    };

    Ok(Json(ApiOk { data: rows }))
}

pub async fn get_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<PatientAdminRow>>, ApiError> {
    let row: PatientAdminRow = sqlx::query_as::<_, PatientAdminRow>(&format!(
        "{PATIENT_ADMIN_SELECT} WHERE p.patient_id = $1 GROUP BY p.patient_id"
    ))
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(ApiOk { data: row }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub full_name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

pub async fn update_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientAdminRow>>, ApiError> {
    // Re-run the same field cleaners the booking form uses; only the
    // provided fields change.
    let mut errors = validation::FieldErrors::default();

    let full_name = match req.full_name.as_deref() {
        Some(raw) => validation::clean_name(raw)
            .map_err(|e| errors.add("full_name", e))
            .ok(),
        None => None,
    };
    let age = match req.age {
        Some(raw) => validation::check_age(Some(raw))
            .map_err(|e| errors.add("age", e))
            .ok(),
        None => None,
    };
    let gender = match req.gender.as_deref() {
        Some(raw) => validation::parse_gender(raw)
            .map_err(|e| errors.add("gender", e))
            .ok(),
        None => None,
    };
    let phone = match req.phone.as_deref() {
        Some(raw) => validation::clean_phone(raw)
            .map_err(|e| errors.add("phone", e))
            .ok(),
        None => None,
    };
    let email = match req.email.as_deref() {
        Some(raw) => validation::clean_email(raw)
            .map_err(|e| errors.add("email", e))
            .ok(),
        None => None,
    };
    let address = req
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let updated = sqlx::query(
        r#"
        UPDATE patient
        SET full_name = COALESCE($2, full_name),
            age       = COALESCE($3, age),
            gender    = COALESCE($4, gender),
            phone     = COALESCE($5, phone),
            email     = COALESCE($6, email),
            address   = COALESCE($7, address)
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .bind(full_name)
    .bind(age)
    .bind(gender)
    .bind(phone)
    .bind(email)
    .bind(address)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("CONFLICT", "Another patient already uses that email".into())
        } else {
            ApiError::Internal(format!("db error: {e}"))
        }
    })?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("patient"));
    }

    get_patient(State(state), _auth, Path(patient_id)).await
}

pub async fn remove_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    // Bookings go with the patient (FK cascade).
    store::delete_patient(&state.db, patient_id).await?;
    Ok(Json(OkResponse::new()))
}

/* ============================================================
   Tests (catalog management)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TestAdminRow {
    pub test_id: Uuid,
    pub test_name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_hours: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub booking_count: i64,
}

pub async fn list_all_tests(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<TestAdminRow>>>, ApiError> {
    // Inactive tests stay visible here; only booking flows hide them.
    let rows: Vec<TestAdminRow> = sqlx::query_as::<_, TestAdminRow>(
        r#"
        SELECT t.test_id, t.test_name, t.description, t.price, t.duration_hours,
               t.is_active, t.created_at,
               COUNT(b.booking_id) AS booking_count
        FROM lab_test t
        LEFT JOIN booking b ON b.test_id = t.test_id
        GROUP BY t.test_id
        ORDER BY t.test_name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTestRequest {
    pub test_name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_hours: Option<i32>,
    pub is_active: Option<bool>,
}

fn check_test_fields(name: &str, price: Decimal, duration_hours: i32) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "test_name is required".into()));
    }
    if price < one_dp_min() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "price must be at least 0.01".into(),
        ));
    }
    if !(1..=24).contains(&duration_hours) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "duration_hours must be between 1 and 24".into(),
        ));
    }
    Ok(())
}

pub async fn create_test(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(req): Json<CreateTestRequest>,
) -> Result<(StatusCode, Json<ApiOk<TestRow>>), ApiError> {
    let name = req.test_name.trim();
    let duration_hours = req.duration_hours.unwrap_or(1);
    check_test_fields(name, req.price, duration_hours)?;

    let row: TestRow = sqlx::query_as::<_, TestRow>(
        r#"
        INSERT INTO lab_test (test_name, description, price, duration_hours, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING test_id, test_name, description, price, duration_hours, is_active, created_at
        "#,
    )
    .bind(name)
    .bind(req.description.trim())
    .bind(req.price)
    .bind(duration_hours)
    .bind(req.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("CONFLICT", "A test with that name already exists".into())
        } else {
            ApiError::Internal(format!("db error: {e}"))
        }
    })?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: row })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestRequest {
    pub test_name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub duration_hours: Option<i32>,
    pub is_active: Option<bool>,
}

pub async fn update_test(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(test_id): Path<Uuid>,
    Json(req): Json<UpdateTestRequest>,
) -> Result<Json<ApiOk<TestRow>>, ApiError> {
    let existing: TestRow = sqlx::query_as::<_, TestRow>(
        r#"
        SELECT test_id, test_name, description, price, duration_hours, is_active, created_at
        FROM lab_test
        WHERE test_id = $1
        "#,
    )
    .bind(test_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("test"))?;

    let test_name = match req.test_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.test_name.clone(),
    };
    let description = match req.description.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.description.clone(),
    };
    let price = req.price.unwrap_or(existing.price);
    let duration_hours = req.duration_hours.unwrap_or(existing.duration_hours);
    let is_active = req.is_active.unwrap_or(existing.is_active);

    check_test_fields(&test_name, price, duration_hours)?;

    let row: TestRow = sqlx::query_as::<_, TestRow>(
        r#"
        UPDATE lab_test
        SET test_name = $2,
            description = $3,
            price = $4,
            duration_hours = $5,
            is_active = $6
        WHERE test_id = $1
        RETURNING test_id, test_name, description, price, duration_hours, is_active, created_at
        "#,
    )
    .bind(test_id)
    .bind(test_name)
    .bind(description)
    .bind(price)
    .bind(duration_hours)
    .bind(is_active)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("CONFLICT", "A test with that name already exists".into())
        } else {
            ApiError::Internal(format!("db error: {e}"))
        }
    })?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn remove_test(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(test_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    store::delete_test(&state.db, test_id).await?;
    Ok(Json(OkResponse::new()))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub test_ids: Vec<Uuid>,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateDto {
    pub updated: u64,
}

pub async fn set_tests_active(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<ApiOk<BulkUpdateDto>>, ApiError> {
    if req.test_ids.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "test_ids is empty".into()));
    }
    let updated = store::set_tests_active(&state.db, &req.test_ids, req.active).await?;
    Ok(Json(ApiOk { data: BulkUpdateDto { updated } }))
}

/* ============================================================
   Bookings
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub status: Option<BookingStatus>,
    // YYYY-MM-DD
    pub date: Option<String>,
}

pub async fn list_bookings(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<BookingsQuery>,
) -> Result<Json<ApiOk<Vec<BookingBriefDto>>>, ApiError> {
    let date: Option<NaiveDate> = match q.date.as_deref() {
        Some(raw) => Some(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest("VALIDATION_ERROR", "date must be YYYY-MM-DD".into())
        })?),
        None => None,
    };
    let status = q.status.map(|s| s as i16);

    let rows = sqlx::query_as::<_, crate::models::BookingDetailRow>(
        r#"
        SELECT b.booking_id, b.booking_number, b.booking_date, b.booking_time,
               b.status, b.notes, b.created_at,
               p.patient_id, p.full_name AS patient_name,
               t.test_id, t.test_name, t.price
        FROM booking b
        JOIN patient p ON p.patient_id = b.patient_id
        JOIN lab_test t ON t.test_id = b.test_id
        WHERE ($1::int2 IS NULL OR b.status = $1)
          AND ($2::date IS NULL OR b.booking_date = $2)
        ORDER BY b.booking_date DESC, b.booking_time DESC
        LIMIT 200
        "#,
    )
    .bind(status)
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(brief).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: BookingStatus,
}

pub async fn set_booking_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<ApiOk<BookingBriefDto>>, ApiError> {
    store::set_booking_status(&state.db, booking_id, req.status).await?;
    let row = store::booking_detail(&state.db, booking_id).await?;
    Ok(Json(ApiOk { data: brief(row) }))
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub booking_ids: Vec<Uuid>,
    pub status: BookingStatus,
}

pub async fn set_bookings_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(req): Json<BulkStatusRequest>,
) -> Result<Json<ApiOk<BulkUpdateDto>>, ApiError> {
    if req.booking_ids.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "booking_ids is empty".into()));
    }
    let updated = store::set_bookings_status(&state.db, &req.booking_ids, req.status).await?;
    Ok(Json(ApiOk { data: BulkUpdateDto { updated } }))
}
