use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub booking_max_retries: u32,
}

/* -------------------------
   Roles
--------------------------*/

// app_user.role (smallint):
// 0 patient, 1 admin, 3 doctor, 4 receptionist
pub const ROLE_PATIENT: i16 = 0;
pub const ROLE_ADMIN: i16 = 1;
pub const ROLE_DOCTOR: i16 = 3;
pub const ROLE_RECEPTIONIST: i16 = 4;

pub fn role_to_string(role: i16) -> String {
    match role {
        ROLE_PATIENT => "patient",
        ROLE_ADMIN => "admin",
        ROLE_DOCTOR => "doctor",
        ROLE_RECEPTIONIST => "receptionist",
        _ => "unknown",
    }
    .to_string()
}

/// Role name as it appears in login URLs (`/auth/login/{role}`).
pub fn role_from_name(name: &str) -> Option<i16> {
    match name {
        "patient" => Some(ROLE_PATIENT),
        "admin" => Some(ROLE_ADMIN),
        "doctor" => Some(ROLE_DOCTOR),
        "receptionist" => Some(ROLE_RECEPTIONIST),
        _ => None,
    }
}

/* -------------------------
   Appointment status
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Confirmed = 0,
    Waiting = 1,
    Done = 2,
    Absent = 3,
}

impl AppointmentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Confirmed" => Some(Self::Confirmed),
            "Waiting" => Some(Self::Waiting),
            "Done" => Some(Self::Done),
            "Absent" => Some(Self::Absent),
            _ => None,
        }
    }

    /// Done and Absent are out of the serving queue for the day.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Absent)
    }
}

/* -------------------------
   Pending-approval status (invitation / join_request)
--------------------------*/

pub const APPROVAL_PENDING: i16 = 0;
pub const APPROVAL_ACCEPTED: i16 = 1;
pub const APPROVAL_REJECTED: i16 = 2;

/* -------------------------
   Shared API envelopes
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct CountData {
    pub affected: u64,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: i16,
    pub is_active: bool,
}

#[derive(Debug, FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClinicRow {
    pub clinic_id: Uuid,
    pub name: String,
    pub address: String,
    pub receptionist_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorRow {
    pub doctor_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub specialty: String,
    pub credentials: String,
    pub phone: String,
    pub daily_patient_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub mobile: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReceptionistRow {
    pub receptionist_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub clinic_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduleSlotRow {
    pub slot_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence_kind: i16,
    pub recurrence_days: Vec<i16>,
    pub patient_limit: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub visit_date: NaiveDate,
    pub queue_number: i32,
    pub status: AppointmentStatus,
    pub slot_time: NaiveTime,
}
