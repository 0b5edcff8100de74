// src/routes/test_routes.rs
//
// Public catalog surface: browse active tests and check slot
// availability. No auth; only active tests are ever visible here.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ApiOk, AppState, TestRow},
    store::{self, UpcomingSlotRow},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tests", get(list_tests))
        .route("/tests/{test_id}", get(test_detail))
        .route("/availability", get(check_availability))
}

#[derive(Debug, Serialize)]
pub struct TestDto {
    pub test_id: Uuid,
    pub test_name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_hours: i32,
}

impl From<TestRow> for TestDto {
    fn from(row: TestRow) -> Self {
        TestDto {
            test_id: row.test_id,
            test_name: row.test_name,
            description: row.description,
            price: row.price,
            duration_hours: row.duration_hours,
        }
    }
}

pub async fn list_tests(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<TestDto>>>, ApiError> {
    let rows = store::active_tests(&state.db).await?;
    Ok(Json(ApiOk {
        data: rows.into_iter().map(TestDto::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct TestDetailDto {
    #[serde(flatten)]
    pub test: TestDto,
    /// Up to 10 upcoming pending/confirmed slots, earliest first.
    pub upcoming_bookings: Vec<UpcomingSlotRow>,
}

pub async fn test_detail(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<Json<ApiOk<TestDetailDto>>, ApiError> {
    let test = store::active_test(&state.db, test_id).await?;
    let today = chrono::Local::now().date_naive();
    let upcoming = store::upcoming_bookings_for_test(&state.db, test_id, today).await?;

    Ok(Json(ApiOk {
        data: TestDetailDto {
            test: test.into(),
            upcoming_bookings: upcoming,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub test_id: Uuid,
    // YYYY-MM-DD
    pub booking_date: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityDto {
    /// Taken slots as HH:MM strings.
    pub booked_times: Vec<String>,
    pub test_name: String,
    pub duration: i32,
}

pub async fn check_availability(
    State(state): State<AppState>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<AvailabilityDto>>, ApiError> {
    let date = NaiveDate::parse_from_str(q.booking_date.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", "booking_date must be YYYY-MM-DD".into())
    })?;

    let test = store::active_test(&state.db, q.test_id).await?;
    let times = store::booked_times(&state.db, q.test_id, date).await?;

    Ok(Json(ApiOk {
        data: AvailabilityDto {
            booked_times: times.iter().map(|t| t.format("%H:%M").to_string()).collect(),
            test_name: test.test_name,
            duration: test.duration_hours,
        },
    }))
}
