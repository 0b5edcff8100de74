// src/routes/booking_routes.rs
//
// The combined patient + booking submission, the confirmation view and
// the my-bookings lookup.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ApiOk, AppState, BookingDetailRow, BookingStatus, PatientRow, booking_reference, is_upcoming},
    store,
    validation::{self, BookingSubmission},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(submit_booking))
        .route("/bookings/lookup", post(lookup_bookings))
        .route("/bookings/{booking_id}", get(booking_confirmation))
}

/* ============================================================
   POST /bookings (combined form submit)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct BookingCreatedDto {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub status: BookingStatus,
    pub test_name: String,
    pub total_cost: Decimal,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub message: String,
}

pub async fn submit_booking(
    State(state): State<AppState>,
    Json(raw): Json<BookingSubmission>,
) -> Result<(StatusCode, Json<ApiOk<BookingCreatedDto>>), ApiError> {
    let now = chrono::Local::now().naive_local();
    let mut outcome = validation::validate_submission(&raw, now);

    // Advisory slot check against the committed store. Runs whenever
    // test/date/time parsed, so the caller gets the complete error set
    // in one round trip. The UNIQUE constraint at insert time closes
    // the remaining race.
    let mut selected_test = None;
    if let Some(slot) = outcome.slot {
        match store::active_test(&state.db, slot.test_id).await {
            Ok(test) => {
                if store::slot_taken(&state.db, slot).await? {
                    outcome
                        .errors
                        .add("booking_time", validation::slot_conflict_message(&test.test_name));
                }
                selected_test = Some(test);
            }
            Err(store::StoreError::NotFound(_)) => {
                outcome.errors.add("test_id", "Select a valid test.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !outcome.errors.is_empty() {
        return Err(ApiError::Validation(outcome.errors));
    }

    let (Some(bundle), Some(test)) = (outcome.bundle, selected_test) else {
        return Err(ApiError::Internal("validation passed without a bundle".into()));
    };

    let booking = store::submit_booking(&state.db, &bundle).await?;
    let reference = booking_reference(booking.booking_number);

    tracing::info!(booking = %reference, test = %test.test_name, "booking created");

    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: BookingCreatedDto {
                booking_id: booking.booking_id,
                booking_reference: reference.clone(),
                status: booking.status,
                test_name: test.test_name,
                total_cost: test.price,
                booking_date: booking.booking_date,
                booking_time: booking.booking_time,
                message: format!(
                    "Booking confirmed! Your booking ID is {reference}. \
                     You will receive a confirmation call shortly."
                ),
            },
        }),
    ))
}

/* ============================================================
   GET /bookings/{id} (confirmation view)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct BookingDetailDto {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub patient_name: String,
    pub test_name: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub status: BookingStatus,
    pub notes: String,
    pub total_cost: Decimal,
    pub is_upcoming: bool,
    pub created_at: DateTime<Utc>,
}

impl BookingDetailDto {
    pub fn from_row(row: BookingDetailRow, now: chrono::NaiveDateTime) -> Self {
        BookingDetailDto {
            booking_id: row.booking_id,
            booking_reference: booking_reference(row.booking_number),
            patient_name: row.patient_name,
            test_name: row.test_name,
            booking_date: row.booking_date,
            booking_time: row.booking_time,
            status: row.status,
            notes: row.notes,
            total_cost: row.price,
            is_upcoming: is_upcoming(row.booking_date, row.booking_time, now),
            created_at: row.created_at,
        }
    }
}

pub async fn booking_confirmation(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<BookingDetailDto>>, ApiError> {
    let row = store::booking_detail(&state.db, booking_id).await?;
    let now = chrono::Local::now().naive_local();
    Ok(Json(ApiOk {
        data: BookingDetailDto::from_row(row, now),
    }))
}

/* ============================================================
   POST /bookings/lookup (my bookings)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LookupPatientDto {
    pub patient_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponseDto {
    pub patient: LookupPatientDto,
    /// Newest-created first.
    pub bookings: Vec<BookingDetailDto>,
}

pub async fn lookup_bookings(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<ApiOk<LookupResponseDto>>, ApiError> {
    let email = req
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    let phone = req
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    if email.is_none() && phone.is_none() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "Please provide either email or phone number.".into(),
        ));
    }

    let patient: PatientRow = store::lookup_patient(&state.db, email.as_deref(), phone.as_deref())
        .await
        .map_err(|e| match e {
            store::StoreError::NotFound(_) => ApiError::NotFound(
                "NOT_FOUND",
                "No patient found with the provided details.".into(),
            ),
            other => other.into(),
        })?;
    let rows = store::bookings_for_patient(&state.db, patient.patient_id).await?;

    let now = chrono::Local::now().naive_local();
    Ok(Json(ApiOk {
        data: LookupResponseDto {
            patient: LookupPatientDto {
                patient_id: patient.patient_id,
                full_name: patient.full_name,
                email: patient.email,
                phone: patient.phone,
            },
            bookings: rows
                .into_iter()
                .map(|r| BookingDetailDto::from_row(r, now))
                .collect(),
        },
    }))
}
