// src/routes/dashboard_routes.rs
//
// Per-role read models. Nothing here mutates; every derived figure (serving
// pointer, queue position, progress) is recomputed from appointment rows on
// each request.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentRow, AppointmentStatus, ClinicRow, DoctorRow, PatientRow,
        ReceptionistRow, APPROVAL_PENDING, ROLE_ADMIN, ROLE_DOCTOR, ROLE_PATIENT,
        ROLE_RECEPTIONIST,
    },
    queue::{self, QueuePosition},
    schedule::{Recurrence, RecurrenceSpec},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patient", get(patient_dashboard))
        .route("/doctor", get(doctor_dashboard))
        .route("/receptionist", get(receptionist_dashboard))
        .route("/admin", get(admin_dashboard))
}

fn ensure_role(auth: &AuthContext, role: i16, what: &str) -> Result<(), ApiError> {
    if auth.role == role {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            format!("Only a {what} can view this dashboard"),
        ))
    }
}

async fn patient_names(
    state: &AppState,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, String>, ApiError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    #[derive(sqlx::FromRow)]
    struct NameRow {
        patient_id: Uuid,
        name: String,
    }
    let rows: Vec<NameRow> =
        sqlx::query_as(r#"SELECT patient_id, name FROM patient WHERE patient_id = ANY($1)"#)
            .bind(ids)
            .fetch_all(&state.db)
            .await
            .map_err(ApiError::db)?;
    Ok(rows.into_iter().map(|r| (r.patient_id, r.name)).collect())
}

/* ============================================================
   GET /dashboard/patient
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PatientDashboard {
    pub patient: PatientRow,
    pub appointments: Vec<PatientAppointmentDto>,
}

#[derive(Debug, Serialize)]
pub struct PatientAppointmentDto {
    pub appointment_id: Uuid,
    pub doctor_name: String,
    pub clinic_name: String,
    pub visit_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub queue_number: i32,
    pub status: AppointmentStatus,
    pub current_serving: i32,
    pub position: QueuePosition,
}

pub async fn patient_dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<PatientDashboard>>, ApiError> {
    ensure_role(&auth, ROLE_PATIENT, "patient")?;

    let patient: PatientRow = sqlx::query_as::<_, PatientRow>(
        r#"
        SELECT patient_id, user_id, name, date_of_birth, mobile
        FROM patient WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient profile not found".into()))?;

    #[derive(Debug, sqlx::FromRow)]
    struct Row {
        appointment_id: Uuid,
        doctor_name: String,
        clinic_name: String,
        visit_date: NaiveDate,
        slot_time: NaiveTime,
        queue_number: i32,
        status: AppointmentStatus,
        current_serving: i32,
    }
    let rows: Vec<Row> = sqlx::query_as::<_, Row>(
        r#"
        SELECT a.appointment_id,
               d.name AS doctor_name,
               c.name AS clinic_name,
               a.visit_date, a.slot_time, a.queue_number, a.status,
               COALESCE((
                   SELECT MAX(x.queue_number)::int
                   FROM appointment x
                   WHERE x.doctor_id = a.doctor_id
                     AND x.clinic_id = a.clinic_id
                     AND x.visit_date = a.visit_date
                     AND x.status = 2
               ), 0) AS current_serving
        FROM appointment a
        JOIN doctor d ON d.doctor_id = a.doctor_id
        JOIN clinic c ON c.clinic_id = a.clinic_id
        WHERE a.patient_id = $1
        ORDER BY a.visit_date, a.queue_number
        "#,
    )
    .bind(patient.patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let appointments = rows
        .into_iter()
        .map(|r| PatientAppointmentDto {
            appointment_id: r.appointment_id,
            doctor_name: r.doctor_name,
            clinic_name: r.clinic_name,
            visit_date: r.visit_date,
            slot_time: r.slot_time,
            queue_number: r.queue_number,
            status: r.status,
            position: queue::project(r.queue_number, r.current_serving),
            current_serving: r.current_serving,
        })
        .collect();

    Ok(Json(ApiOk {
        data: PatientDashboard { patient, appointments },
    }))
}

/* ============================================================
   GET /dashboard/doctor
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct DoctorDashboardQuery {
    /// Restrict the queue view to one clinic; omit for all clinics today.
    pub clinic_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub doctor: DoctorRow,
    pub appointments: Vec<DoctorAppointmentDto>,
    pub current_serving: i32,
    pub current_patient: Option<DoctorAppointmentDto>,
    pub next_patient: Option<DoctorAppointmentDto>,
    pub done: usize,
    pub total: usize,
    pub schedules: Vec<DoctorSlotDto>,
    pub invitations: Vec<PendingInvitationDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorAppointmentDto {
    pub appointment_id: Uuid,
    pub queue_number: i32,
    pub patient_name: String,
    pub status: AppointmentStatus,
    pub clinic_id: Uuid,
    pub slot_time: NaiveTime,
}

#[derive(Debug, Serialize)]
pub struct DoctorSlotDto {
    pub slot_id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: RecurrenceSpec,
    pub patient_limit: i32,
}

#[derive(Debug, Serialize)]
pub struct PendingInvitationDto {
    pub invitation_id: Uuid,
    pub clinic_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: RecurrenceSpec,
}

pub async fn doctor_dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<DoctorDashboardQuery>,
) -> Result<Json<ApiOk<DoctorDashboard>>, ApiError> {
    ensure_role(&auth, ROLE_DOCTOR, "doctor")?;

    let doctor: DoctorRow = sqlx::query_as::<_, DoctorRow>(
        r#"
        SELECT doctor_id, user_id, name, specialty, credentials, phone, daily_patient_limit
        FROM doctor WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "doctor profile not found".into()))?;

    let today = Utc::now().date_naive();

    let appointments: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, doctor_id, clinic_id,
               visit_date, queue_number, status, slot_time
        FROM appointment
        WHERE doctor_id = $1 AND visit_date = $2
          AND ($3::uuid IS NULL OR clinic_id = $3)
        ORDER BY queue_number
        "#,
    )
    .bind(doctor.doctor_id)
    .bind(today)
    .bind(q.clinic_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let ids: Vec<Uuid> = appointments.iter().map(|a| a.patient_id).collect();
    let names = patient_names(&state, &ids).await?;
    let to_dto = |a: &AppointmentRow| DoctorAppointmentDto {
        appointment_id: a.appointment_id,
        queue_number: a.queue_number,
        patient_name: names
            .get(&a.patient_id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string()),
        status: a.status,
        clinic_id: a.clinic_id,
        slot_time: a.slot_time,
    };

    let current_patient = queue::head(&appointments).map(to_dto);
    let next_patient = queue::next_after_head(&appointments).map(to_dto);
    let (done, total) = queue::progress(&appointments);
    let current_serving = queue::current_serving(&appointments);
    let appointment_dtos: Vec<DoctorAppointmentDto> = appointments.iter().map(to_dto).collect();

    #[derive(Debug, sqlx::FromRow)]
    struct SlotRow {
        slot_id: Uuid,
        clinic_id: Uuid,
        clinic_name: String,
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence_kind: i16,
        recurrence_days: Vec<i16>,
        patient_limit: i32,
    }
    let slot_rows: Vec<SlotRow> = sqlx::query_as::<_, SlotRow>(
        r#"
        SELECT s.slot_id, s.clinic_id, c.name AS clinic_name,
               s.start_time, s.end_time,
               s.recurrence_kind, s.recurrence_days, s.patient_limit
        FROM schedule_slot s
        JOIN clinic c ON c.clinic_id = s.clinic_id
        WHERE s.doctor_id = $1
        ORDER BY c.name, s.start_time
        "#,
    )
    .bind(doctor.doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let schedules = slot_rows
        .into_iter()
        .filter_map(|s| {
            let rec = Recurrence::from_columns(s.recurrence_kind, &s.recurrence_days)?;
            Some(DoctorSlotDto {
                slot_id: s.slot_id,
                clinic_id: s.clinic_id,
                clinic_name: s.clinic_name,
                start_time: s.start_time,
                end_time: s.end_time,
                recurrence: rec.to_wire(),
                patient_limit: s.patient_limit,
            })
        })
        .collect();

    #[derive(Debug, sqlx::FromRow)]
    struct InvRow {
        invitation_id: Uuid,
        clinic_name: String,
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence_kind: i16,
        recurrence_days: Vec<i16>,
    }
    let inv_rows: Vec<InvRow> = sqlx::query_as::<_, InvRow>(
        r#"
        SELECT i.invitation_id, c.name AS clinic_name,
               i.start_time, i.end_time, i.recurrence_kind, i.recurrence_days
        FROM invitation i
        JOIN clinic c ON c.clinic_id = i.clinic_id
        WHERE i.doctor_id = $1 AND i.status = $2
        ORDER BY i.created_at
        "#,
    )
    .bind(doctor.doctor_id)
    .bind(APPROVAL_PENDING)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let invitations = inv_rows
        .into_iter()
        .filter_map(|i| {
            let rec = Recurrence::from_columns(i.recurrence_kind, &i.recurrence_days)?;
            Some(PendingInvitationDto {
                invitation_id: i.invitation_id,
                clinic_name: i.clinic_name,
                start_time: i.start_time,
                end_time: i.end_time,
                recurrence: rec.to_wire(),
            })
        })
        .collect();

    Ok(Json(ApiOk {
        data: DoctorDashboard {
            doctor,
            appointments: appointment_dtos,
            current_serving,
            current_patient,
            next_patient,
            done,
            total,
            schedules,
            invitations,
        },
    }))
}

/* ============================================================
   GET /dashboard/receptionist
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ReceptionistDashboard {
    pub receptionist: ReceptionistRow,
    pub clinic: ClinicRow,
    /// Doctors rostered at this clinic (have a schedule slot here).
    pub doctors: Vec<DoctorRow>,
    /// Every doctor in the system, so the invite form has ids to offer.
    pub all_doctors: Vec<DoctorBriefDto>,
    pub join_requests: Vec<PendingJoinRequestDto>,
    pub pending_invitations: Vec<SentInvitationDto>,
    pub todays_appointments: Vec<ClinicAppointmentDto>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorBriefDto {
    pub doctor_id: Uuid,
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Serialize)]
pub struct PendingJoinRequestDto {
    pub join_request_id: Uuid,
    pub doctor_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: RecurrenceSpec,
}

#[derive(Debug, Serialize)]
pub struct SentInvitationDto {
    pub invitation_id: Uuid,
    pub doctor_name: String,
}

#[derive(Debug, Serialize)]
pub struct ClinicAppointmentDto {
    pub appointment_id: Uuid,
    pub doctor_name: String,
    pub patient_name: String,
    pub queue_number: i32,
    pub status: AppointmentStatus,
    pub slot_time: NaiveTime,
}

pub async fn receptionist_dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<ReceptionistDashboard>>, ApiError> {
    ensure_role(&auth, ROLE_RECEPTIONIST, "receptionist")?;

    let receptionist: ReceptionistRow = sqlx::query_as::<_, ReceptionistRow>(
        r#"
        SELECT receptionist_id, user_id, name, clinic_id
        FROM receptionist WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "receptionist profile not found".into()))?;

    let Some(clinic_id) = receptionist.clinic_id else {
        return Err(ApiError::BadRequest(
            "NO_CLINIC",
            "Account is not attached to a clinic".into(),
        ));
    };

    let clinic: ClinicRow = sqlx::query_as::<_, ClinicRow>(
        r#"SELECT clinic_id, name, address, receptionist_id FROM clinic WHERE clinic_id = $1"#,
    )
    .bind(clinic_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "clinic not found".into()))?;

    let doctors: Vec<DoctorRow> = sqlx::query_as::<_, DoctorRow>(
        r#"
        SELECT DISTINCT d.doctor_id, d.user_id, d.name, d.specialty,
               d.credentials, d.phone, d.daily_patient_limit
        FROM doctor d
        JOIN schedule_slot s ON s.doctor_id = d.doctor_id
        WHERE s.clinic_id = $1
        ORDER BY d.name
        "#,
    )
    .bind(clinic_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let all_doctors: Vec<DoctorBriefDto> = sqlx::query_as::<_, DoctorBriefDto>(
        r#"SELECT doctor_id, name, specialty FROM doctor ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    #[derive(Debug, sqlx::FromRow)]
    struct JrRow {
        join_request_id: Uuid,
        doctor_name: String,
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence_kind: i16,
        recurrence_days: Vec<i16>,
    }
    let jr_rows: Vec<JrRow> = sqlx::query_as::<_, JrRow>(
        r#"
        SELECT j.join_request_id, d.name AS doctor_name,
               j.start_time, j.end_time, j.recurrence_kind, j.recurrence_days
        FROM join_request j
        JOIN doctor d ON d.doctor_id = j.doctor_id
        WHERE j.clinic_id = $1 AND j.status = $2
        ORDER BY j.created_at
        "#,
    )
    .bind(clinic_id)
    .bind(APPROVAL_PENDING)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let join_requests = jr_rows
        .into_iter()
        .filter_map(|j| {
            let rec = Recurrence::from_columns(j.recurrence_kind, &j.recurrence_days)?;
            Some(PendingJoinRequestDto {
                join_request_id: j.join_request_id,
                doctor_name: j.doctor_name,
                start_time: j.start_time,
                end_time: j.end_time,
                recurrence: rec.to_wire(),
            })
        })
        .collect();

    #[derive(Debug, sqlx::FromRow)]
    struct SentRow {
        invitation_id: Uuid,
        doctor_name: String,
    }
    let sent: Vec<SentRow> = sqlx::query_as::<_, SentRow>(
        r#"
        SELECT i.invitation_id, d.name AS doctor_name
        FROM invitation i
        JOIN doctor d ON d.doctor_id = i.doctor_id
        WHERE i.clinic_id = $1 AND i.status = $2
        ORDER BY i.created_at
        "#,
    )
    .bind(clinic_id)
    .bind(APPROVAL_PENDING)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let today = Utc::now().date_naive();
    #[derive(Debug, sqlx::FromRow)]
    struct ApRow {
        appointment_id: Uuid,
        doctor_name: String,
        patient_name: String,
        queue_number: i32,
        status: AppointmentStatus,
        slot_time: NaiveTime,
    }
    let ap_rows: Vec<ApRow> = sqlx::query_as::<_, ApRow>(
        r#"
        SELECT a.appointment_id, d.name AS doctor_name, p.name AS patient_name,
               a.queue_number, a.status, a.slot_time
        FROM appointment a
        JOIN doctor d ON d.doctor_id = a.doctor_id
        JOIN patient p ON p.patient_id = a.patient_id
        WHERE a.clinic_id = $1 AND a.visit_date = $2
        ORDER BY d.name, a.queue_number
        "#,
    )
    .bind(clinic_id)
    .bind(today)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: ReceptionistDashboard {
            receptionist,
            clinic,
            doctors,
            all_doctors,
            join_requests,
            pending_invitations: sent
                .into_iter()
                .map(|s| SentInvitationDto {
                    invitation_id: s.invitation_id,
                    doctor_name: s.doctor_name,
                })
                .collect(),
            todays_appointments: ap_rows
                .into_iter()
                .map(|a| ClinicAppointmentDto {
                    appointment_id: a.appointment_id,
                    doctor_name: a.doctor_name,
                    patient_name: a.patient_name,
                    queue_number: a.queue_number,
                    status: a.status,
                    slot_time: a.slot_time,
                })
                .collect(),
        },
    }))
}

/* ============================================================
   GET /dashboard/admin
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub clinics: Vec<ClinicRow>,
    pub doctors: Vec<DoctorRow>,
    pub patients: Vec<PatientRow>,
    pub receptionists: Vec<ReceptionistRow>,
}

/// Plain global listings; no queue derivation on the admin view.
pub async fn admin_dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AdminDashboard>>, ApiError> {
    ensure_role(&auth, ROLE_ADMIN, "admin")?;

    let clinics: Vec<ClinicRow> = sqlx::query_as(
        r#"SELECT clinic_id, name, address, receptionist_id FROM clinic ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let doctors: Vec<DoctorRow> = sqlx::query_as(
        r#"
        SELECT doctor_id, user_id, name, specialty, credentials, phone, daily_patient_limit
        FROM doctor ORDER BY name
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let patients: Vec<PatientRow> = sqlx::query_as(
        r#"SELECT patient_id, user_id, name, date_of_birth, mobile FROM patient ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let receptionists: Vec<ReceptionistRow> = sqlx::query_as(
        r#"SELECT receptionist_id, user_id, name, clinic_id FROM receptionist ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: AdminDashboard {
            clinics,
            doctors,
            patients,
            receptionists,
        },
    }))
}
