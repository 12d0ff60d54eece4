use crate::models::AppState;
use axum::Router;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::error::ApiError;
use crate::schedule::{Recurrence, RecurrenceSpec};

pub mod admin_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod clinic_routes;
pub mod dashboard_routes;
pub mod doctor_routes;
pub mod search_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api/doctor", doctor_routes::router())
        .nest("/api/clinic", clinic_routes::router())
        .nest("/api/admin", admin_routes::router())
        .nest("/api/dashboard", dashboard_routes::router())
        .nest("/api", search_routes::router())
        .nest("/api", appointment_routes::router())
        .with_state(state)
}

/* ============================================================
   Schedule-slot parameters, shared by every slot-creating flow
   (invitations, join requests, private clinics)
   ============================================================ */

#[derive(Debug, Clone, Deserialize)]
pub struct SlotParams {
    // "HH:MM" or "HH:MM:SS"
    pub start_time: String,
    pub end_time: String,
    pub recurrence: RecurrenceSpec,
    /// 0 or absent = unlimited.
    pub patient_limit: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ValidSlotParams {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: Recurrence,
    pub patient_limit: i32,
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let v = value.trim();
    NaiveTime::parse_from_str(v, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M"))
        .ok()
}

impl SlotParams {
    pub fn validate(&self) -> Result<ValidSlotParams, ApiError> {
        let bad = |msg: String| ApiError::BadRequest("VALIDATION_ERROR", msg);

        let start_time = parse_time(&self.start_time)
            .ok_or_else(|| bad(format!("invalid start_time: {:?}", self.start_time)))?;
        let end_time = parse_time(&self.end_time)
            .ok_or_else(|| bad(format!("invalid end_time: {:?}", self.end_time)))?;
        if end_time <= start_time {
            return Err(bad("end_time must be after start_time".into()));
        }

        let recurrence = self.recurrence.validate().map_err(bad)?;

        let patient_limit = self.patient_limit.unwrap_or(0);
        if patient_limit < 0 {
            return Err(bad("patient_limit must not be negative".into()));
        }

        Ok(ValidSlotParams {
            start_time,
            end_time,
            recurrence,
            patient_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
        assert_eq!(parse_time(" 17:00 "), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("noon"), None);
    }

    #[test]
    fn test_slot_params_validation() {
        let ok = SlotParams {
            start_time: "09:00".into(),
            end_time: "12:00".into(),
            recurrence: RecurrenceSpec::Weekly { days: vec!["Monday".into()] },
            patient_limit: Some(2),
        };
        let v = ok.validate().unwrap();
        assert_eq!(v.patient_limit, 2);
        assert_eq!(v.recurrence, Recurrence::Weekly(vec![0]));

        let backwards = SlotParams {
            end_time: "08:00".into(),
            ..ok.clone()
        };
        assert!(backwards.validate().is_err());

        let negative = SlotParams {
            patient_limit: Some(-1),
            ..ok.clone()
        };
        assert!(negative.validate().is_err());

        let bad_recurrence = SlotParams {
            recurrence: RecurrenceSpec::Monthly { dates: vec![] },
            ..ok
        };
        assert!(bad_recurrence.validate().is_err());
    }
}
