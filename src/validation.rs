//! Form validation for the combined patient + booking submission.
//!
//! Everything here is a pure function of the raw input and the clock
//! handed in by the caller; the slot-conflict advisory check needs the
//! database and therefore lives in the handler, which merges its result
//! into the same [`FieldErrors`] map.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Gender;

/// Lab opening hours, both ends inclusive.
pub fn lab_open() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).expect("valid opening time")
}

pub fn lab_close() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).expect("valid closing time")
}

/* ============================================================
   Input / output shapes
   ============================================================ */

/// Raw combined form input, exactly as submitted. Dates and times come
/// in as strings so a malformed value produces a field error instead of
/// a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct BookingSubmission {
    pub patient_name: String,
    pub patient_age: Option<i64>,
    pub patient_gender: String,
    pub patient_phone: String,
    pub patient_email: String,
    pub patient_address: String,
    pub test_id: Option<Uuid>,
    pub booking_date: String,
    pub booking_time: String,
    pub notes: Option<String>,
}

/// Normalized bundle ready for persistence. Produced only when every
/// field rule passed.
#[derive(Debug, Clone)]
pub struct NormalizedSubmission {
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub test_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: String,
}

/// The slot a submission targets, available whenever test/date/time
/// individually parsed, even if other fields failed. Lets the handler
/// run the advisory conflict check and still report a complete error
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub test_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct FieldErrors(pub BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
pub struct ValidationOutcome {
    /// Some iff `errors` is empty.
    pub bundle: Option<NormalizedSubmission>,
    pub slot: Option<Slot>,
    pub errors: FieldErrors,
}

/* ============================================================
   Field cleaners
   ============================================================ */

/// Title-case per word: first letter of each alphabetic run uppercased,
/// the rest lowercased.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn clean_name(raw: &str) -> Result<String, String> {
    let name = title_case(raw.trim());
    if name.chars().count() < 2 {
        return Err("Name must be at least 2 characters long.".into());
    }
    if !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err("Name should contain only letters and spaces.".into());
    }
    Ok(name)
}

/// Keeps digits plus a single leading `+`; requires at least 10 digits.
/// The cleaned value is what gets stored.
pub fn clean_phone(raw: &str) -> Result<String, String> {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if c == '+' && cleaned.is_empty() {
            cleaned.push(c);
        }
    }
    let digits = cleaned.chars().filter(char::is_ascii_digit).count();
    if digits < 10 {
        return Err("Phone number must be at least 10 digits.".into());
    }
    Ok(cleaned)
}

pub fn clean_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();
    let shape_ok = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };
    if !shape_ok {
        return Err("Enter a valid email address.".into());
    }
    Ok(email)
}

pub fn check_age(raw: Option<i64>) -> Result<i32, String> {
    match raw {
        Some(age) if (1..=120).contains(&age) => Ok(age as i32),
        _ => Err("Age must be between 1 and 120.".into()),
    }
}

pub fn parse_gender(raw: &str) -> Result<Gender, String> {
    match raw.trim().to_lowercase().as_str() {
        "male" | "m" => Ok(Gender::Male),
        "female" | "f" => Ok(Gender::Female),
        "other" | "o" => Ok(Gender::Other),
        _ => Err("Select a valid gender.".into()),
    }
}

pub fn parse_booking_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| "booking_date must be YYYY-MM-DD.".to_string())?;
    if date < today {
        return Err("Cannot book for a past date.".into());
    }
    Ok(date)
}

/// Parses `HH:MM` (or `HH:MM:SS`) and applies the lab-hours window.
/// The same-day cutoff is checked only when the date parsed and equals
/// today: the time must then be strictly after `now`.
pub fn parse_booking_time(
    raw: &str,
    booking_date: Option<NaiveDate>,
    now: NaiveDateTime,
) -> Result<NaiveTime, String> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| "booking_time must be HH:MM.".to_string())?;

    if time < lab_open() || time > lab_close() {
        return Err("Lab hours are from 8:00 AM to 8:00 PM.".into());
    }
    if booking_date == Some(now.date()) && time <= now.time() {
        return Err("Cannot book for a past time today.".into());
    }
    Ok(time)
}

/* ============================================================
   Combined submission
   ============================================================ */

/// Runs every independent field rule and accumulates errors per field,
/// so one failure never hides another.
pub fn validate_submission(raw: &BookingSubmission, now: NaiveDateTime) -> ValidationOutcome {
    let mut errors = FieldErrors::default();

    let name = clean_name(&raw.patient_name)
        .map_err(|e| errors.add("patient_name", e))
        .ok();
    let age = check_age(raw.patient_age)
        .map_err(|e| errors.add("patient_age", e))
        .ok();
    let gender = parse_gender(&raw.patient_gender)
        .map_err(|e| errors.add("patient_gender", e))
        .ok();
    let phone = clean_phone(&raw.patient_phone)
        .map_err(|e| errors.add("patient_phone", e))
        .ok();
    let email = clean_email(&raw.patient_email)
        .map_err(|e| errors.add("patient_email", e))
        .ok();

    let address = raw.patient_address.trim().to_string();
    if address.is_empty() {
        errors.add("patient_address", "Address is required.");
    }

    if raw.test_id.is_none() {
        errors.add("test_id", "Select a medical test.");
    }

    let date = parse_booking_date(&raw.booking_date, now.date())
        .map_err(|e| errors.add("booking_date", e))
        .ok();
    let time = parse_booking_time(&raw.booking_time, date, now)
        .map_err(|e| errors.add("booking_time", e))
        .ok();

    let slot = match (raw.test_id, date, time) {
        (Some(test_id), Some(booking_date), Some(booking_time)) => Some(Slot {
            test_id,
            booking_date,
            booking_time,
        }),
        _ => None,
    };

    let bundle = if errors.is_empty() {
        // All cleaners succeeded when no errors were recorded.
        match (name, age, gender, phone, email, slot) {
            (Some(full_name), Some(age), Some(gender), Some(phone), Some(email), Some(slot)) => {
                Some(NormalizedSubmission {
                    full_name,
                    age,
                    gender,
                    phone,
                    email,
                    address,
                    test_id: slot.test_id,
                    booking_date: slot.booking_date,
                    booking_time: slot.booking_time,
                    notes: raw.notes.as_deref().unwrap_or("").trim().to_string(),
                })
            }
            _ => None,
        }
    } else {
        None
    };

    ValidationOutcome { bundle, slot, errors }
}

/// Message shown when the advisory slot check finds a pending or
/// confirmed booking on the same (test, date, time).
pub fn slot_conflict_message(test_name: &str) -> String {
    format!("This time slot is already booked for {test_name}. Please select a different time.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    fn raw_valid() -> BookingSubmission {
        BookingSubmission {
            patient_name: "  jane doe ".into(),
            patient_age: Some(34),
            patient_gender: "female".into(),
            patient_phone: "+91 98765-43210".into(),
            patient_email: "  Jane.Doe@Example.COM ".into(),
            patient_address: "12 Park Lane".into(),
            test_id: Some(Uuid::new_v4()),
            booking_date: "2025-06-02".into(),
            booking_time: "10:00".into(),
            notes: None,
        }
    }

    fn noon(y: i32, m: u32, day: u32) -> NaiveDateTime {
        d(y, m, day).and_time(t(12, 0))
    }

    #[test]
    fn name_is_trimmed_and_title_cased() {
        assert_eq!(clean_name("  jane doe "), Ok("Jane Doe".to_string()));
        assert_eq!(clean_name("MARY ANN"), Ok("Mary Ann".to_string()));
    }

    #[test]
    fn name_rejects_digits_and_short_input() {
        assert!(clean_name("Jane123").is_err());
        assert!(clean_name(" a ").is_err());
        assert!(clean_name("").is_err());
    }

    #[test]
    fn phone_keeps_digits_and_leading_plus() {
        assert_eq!(clean_phone("+91 98765-43210"), Ok("+919876543210".to_string()));
        assert_eq!(clean_phone("(080) 1234-5678 99"), Ok("0801234567899".to_string()));
        // a '+' after the first digit is dropped
        assert_eq!(clean_phone("98+76543210123"), Ok("9876543210123".to_string()));
    }

    #[test]
    fn phone_requires_ten_digits() {
        assert!(clean_phone("123456789").is_err());
        assert!(clean_phone("+12345678").is_err());
        assert!(clean_phone("1234567890").is_ok());
    }

    #[test]
    fn email_is_lowercased_and_shape_checked() {
        assert_eq!(
            clean_email("  Jane.Doe@Example.COM "),
            Ok("jane.doe@example.com".to_string())
        );
        assert!(clean_email("not-an-email").is_err());
        assert!(clean_email("a@b").is_err());
        assert!(clean_email("@example.com").is_err());
    }

    #[test]
    fn age_bounds_are_inclusive() {
        assert_eq!(check_age(Some(1)), Ok(1));
        assert_eq!(check_age(Some(120)), Ok(120));
        assert!(check_age(Some(0)).is_err());
        assert!(check_age(Some(121)).is_err());
        assert!(check_age(None).is_err());
    }

    #[test]
    fn past_dates_are_rejected() {
        let today = d(2025, 6, 1);
        assert!(parse_booking_date("2025-05-31", today).is_err());
        assert_eq!(parse_booking_date("2025-06-01", today), Ok(today));
        assert_eq!(parse_booking_date("2025-06-02", today), Ok(d(2025, 6, 2)));
        assert!(parse_booking_date("06/01/2025", today).is_err());
    }

    #[test]
    fn lab_hours_window_is_inclusive_at_both_ends() {
        let now = noon(2025, 6, 1);
        let tomorrow = Some(d(2025, 6, 2));
        assert_eq!(parse_booking_time("08:00", tomorrow, now), Ok(t(8, 0)));
        assert_eq!(parse_booking_time("20:00", tomorrow, now), Ok(t(20, 0)));
        assert!(parse_booking_time("07:59", tomorrow, now).is_err());
        assert!(parse_booking_time("20:01", tomorrow, now).is_err());
    }

    #[test]
    fn same_day_cutoff_is_strictly_after_now() {
        let now = d(2025, 6, 1).and_time(t(10, 0));
        let today = Some(d(2025, 6, 1));
        assert!(parse_booking_time("10:00", today, now).is_err());
        assert!(parse_booking_time("09:59", today, now).is_err());
        assert_eq!(parse_booking_time("10:01", today, now), Ok(t(10, 1)));
        // a different day ignores the clock
        assert_eq!(parse_booking_time("10:00", Some(d(2025, 6, 2)), now), Ok(t(10, 0)));
    }

    #[test]
    fn valid_submission_normalizes_everything() {
        let out = validate_submission(&raw_valid(), noon(2025, 6, 1));
        assert!(out.errors.is_empty());
        let b = out.bundle.expect("bundle");
        assert_eq!(b.full_name, "Jane Doe");
        assert_eq!(b.phone, "+919876543210");
        assert_eq!(b.email, "jane.doe@example.com");
        assert_eq!(b.gender, Gender::Female);
        assert_eq!(b.booking_time, t(10, 0));
        assert_eq!(b.notes, "");
    }

    #[test]
    fn errors_accumulate_across_independent_fields() {
        let mut raw = raw_valid();
        raw.patient_name = "J4ne".into();
        raw.patient_phone = "123".into();
        raw.booking_date = "2025-05-01".into();
        let out = validate_submission(&raw, noon(2025, 6, 1));
        assert!(out.bundle.is_none());
        assert!(out.errors.0.contains_key("patient_name"));
        assert!(out.errors.0.contains_key("patient_phone"));
        assert!(out.errors.0.contains_key("booking_date"));
        assert!(!out.errors.0.contains_key("booking_time"));
    }

    #[test]
    fn slot_survives_unrelated_field_errors() {
        let mut raw = raw_valid();
        let test_id = raw.test_id.unwrap();
        raw.patient_phone = "123".into();
        let out = validate_submission(&raw, noon(2025, 6, 1));
        assert!(out.bundle.is_none());
        assert_eq!(
            out.slot,
            Some(Slot {
                test_id,
                booking_date: d(2025, 6, 2),
                booking_time: t(10, 0),
            })
        );
    }

    #[test]
    fn slot_is_absent_when_its_own_fields_fail() {
        let mut raw = raw_valid();
        raw.booking_time = "25:00".into();
        let out = validate_submission(&raw, noon(2025, 6, 1));
        assert!(out.slot.is_none());
        assert!(out.errors.0.contains_key("booking_time"));
    }

    #[test]
    fn missing_test_and_blank_address_are_field_errors() {
        let mut raw = raw_valid();
        raw.test_id = None;
        raw.patient_address = "   ".into();
        let out = validate_submission(&raw, noon(2025, 6, 1));
        assert!(out.errors.0.contains_key("test_id"));
        assert!(out.errors.0.contains_key("patient_address"));
    }

    #[test]
    fn conflict_message_names_the_test() {
        assert_eq!(
            slot_conflict_message("Blood Panel"),
            "This time slot is already booked for Blood Panel. Please select a different time."
        );
    }
}
