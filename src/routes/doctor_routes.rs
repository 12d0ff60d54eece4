// src/routes/doctor_routes.rs
//
// Doctor-side queue management: advancing the serving queue, free-form status
// updates, day resets, plus roster self-service (invitations, join requests,
// private clinics, own slots).

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentRow, AppointmentStatus, CountData, OkData, APPROVAL_ACCEPTED,
        APPROVAL_PENDING, APPROVAL_REJECTED, ROLE_DOCTOR,
    },
    queue,
    routes::SlotParams,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/next-patient", post(next_patient))
        .route("/appointments/{appointment_id}/status", post(update_status))
        .route("/clear-appointments", post(clear_appointments))
        .route("/reset-queue", post(reset_queue))
        .route("/invitations/{invitation_id}/accept", post(accept_invitation))
        .route("/invitations/{invitation_id}/reject", post(reject_invitation))
        .route("/join-requests", post(create_join_request))
        .route("/clinics", post(create_private_clinic))
        .route("/slots/{slot_id}", delete(delete_slot))
}

fn ensure_doctor(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_DOCTOR {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only doctors can manage the serving queue".into(),
        ))
    }
}

pub async fn resolve_doctor_id(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    let doctor_id: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT doctor_id FROM doctor WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    doctor_id.ok_or_else(|| {
        ApiError::BadRequest("NO_DOCTOR_PROFILE", "Account has no doctor profile".into())
    })
}

async fn todays_queue(
    state: &AppState,
    doctor_id: Uuid,
    clinic_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AppointmentRow>, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, doctor_id, clinic_id,
               visit_date, queue_number, status, slot_time
        FROM appointment
        WHERE doctor_id = $1 AND clinic_id = $2 AND visit_date = $3
        ORDER BY queue_number
        "#,
    )
    .bind(doctor_id)
    .bind(clinic_id)
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)
}

async fn patient_name(state: &AppState, patient_id: Uuid) -> Result<String, ApiError> {
    let name: Option<String> =
        sqlx::query_scalar(r#"SELECT name FROM patient WHERE patient_id = $1"#)
            .bind(patient_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    Ok(name.unwrap_or_else(|| "Unknown".to_string()))
}

/* ============================================================
   POST /doctor/next-patient
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct NextPatientRequest {
    pub clinic_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct QueueEntryDto {
    pub appointment_id: Uuid,
    pub queue_number: i32,
    pub patient_name: String,
}

#[derive(Debug, Serialize)]
pub struct AdvanceData {
    /// The appointment just marked Done. None = the queue was already empty;
    /// that is a defined result, not a failure.
    pub served: Option<QueueEntryDto>,
    pub current_serving: i32,
    pub current_patient: Option<QueueEntryDto>,
    pub next_patient: Option<QueueEntryDto>,
    pub done: usize,
    pub total: usize,
}

/// Marks the head of the queue (lowest queue_number still Confirmed or
/// Waiting) as Done, which advances "currently serving" to the next head.
pub async fn next_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NextPatientRequest>,
) -> Result<Json<ApiOk<AdvanceData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;
    let today = Utc::now().date_naive();

    // One statement so two concurrent advances can't serve the same head
    // twice. Status: 0 Confirmed, 1 Waiting, 2 Done, 3 Absent.
    #[derive(Debug, sqlx::FromRow)]
    struct ServedRow {
        appointment_id: Uuid,
        queue_number: i32,
        patient_id: Uuid,
    }
    let served: Option<ServedRow> = sqlx::query_as::<_, ServedRow>(
        r#"
        UPDATE appointment
        SET status = 2
        WHERE appointment_id = (
            SELECT appointment_id FROM appointment
            WHERE doctor_id = $1 AND clinic_id = $2 AND visit_date = $3
              AND status IN (0, 1)
            ORDER BY queue_number
            LIMIT 1
            FOR UPDATE
        )
        RETURNING appointment_id, queue_number, patient_id
        "#,
    )
    .bind(doctor_id)
    .bind(req.clinic_id)
    .bind(today)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let served_dto = match served {
        Some(row) => {
            tracing::info!(
                appointment_id = %row.appointment_id,
                queue_number = row.queue_number,
                "queue advanced"
            );
            Some(QueueEntryDto {
                appointment_id: row.appointment_id,
                queue_number: row.queue_number,
                patient_name: patient_name(&state, row.patient_id).await?,
            })
        }
        None => None,
    };

    let appointments = todays_queue(&state, doctor_id, req.clinic_id, today).await?;
    let (done, total) = queue::progress(&appointments);

    let mut current_patient = None;
    if let Some(a) = queue::head(&appointments) {
        current_patient = Some(QueueEntryDto {
            appointment_id: a.appointment_id,
            queue_number: a.queue_number,
            patient_name: patient_name(&state, a.patient_id).await?,
        });
    }
    let mut next = None;
    if let Some(a) = queue::next_after_head(&appointments) {
        next = Some(QueueEntryDto {
            appointment_id: a.appointment_id,
            queue_number: a.queue_number,
            patient_name: patient_name(&state, a.patient_id).await?,
        });
    }

    Ok(Json(ApiOk {
        data: AdvanceData {
            served: served_dto,
            current_serving: queue::current_serving(&appointments),
            current_patient,
            next_patient: next,
            done,
            total,
        },
    }))
}

/* ============================================================
   POST /doctor/appointments/{id}/status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    // "Confirmed" | "Waiting" | "Done" | "Absent"
    pub status: String,
}

/// All four states are freely settable; there is no forward-only order.
/// Queue numbers are untouched, so the serving pointer simply re-derives.
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;

    let Some(status) = AppointmentStatus::parse(&req.status) else {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("invalid status: {:?}", req.status),
        ));
    };

    let updated: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        UPDATE appointment
        SET status = $3
        WHERE appointment_id = $1 AND doctor_id = $2
        RETURNING appointment_id, patient_id, doctor_id, clinic_id,
                  visit_date, queue_number, status, slot_time
        "#,
    )
    .bind(appointment_id)
    .bind(doctor_id)
    .bind(status)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = updated else {
        return Err(ApiError::NotFound("NOT_FOUND", "appointment not found".into()));
    };

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   POST /doctor/clear-appointments, POST /doctor/reset-queue
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct QueueScopeRequest {
    /// Omit for "all clinics today".
    pub clinic_id: Option<Uuid>,
}

/// Deletes today's appointments in scope.
pub async fn clear_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<QueueScopeRequest>,
) -> Result<Json<ApiOk<CountData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;
    let today = Utc::now().date_naive();

    let res = sqlx::query(
        r#"
        DELETE FROM appointment
        WHERE doctor_id = $1 AND visit_date = $2
          AND ($3::uuid IS NULL OR clinic_id = $3)
        "#,
    )
    .bind(doctor_id)
    .bind(today)
    .bind(req.clinic_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(affected = res.rows_affected(), "appointments cleared");

    Ok(Json(ApiOk {
        data: CountData { affected: res.rows_affected() },
    }))
}

/// Restarts queue progress: everything in scope goes back to Confirmed while
/// keeping its queue_number, so the serving pointer re-derives to 0.
pub async fn reset_queue(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<QueueScopeRequest>,
) -> Result<Json<ApiOk<CountData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;
    let today = Utc::now().date_naive();

    let res = sqlx::query(
        r#"
        UPDATE appointment
        SET status = 0
        WHERE doctor_id = $1 AND visit_date = $2
          AND ($3::uuid IS NULL OR clinic_id = $3)
        "#,
    )
    .bind(doctor_id)
    .bind(today)
    .bind(req.clinic_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: CountData { affected: res.rows_affected() },
    }))
}

/* ============================================================
   Invitations (clinic -> doctor)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct SlotCreatedData {
    pub slot_id: Uuid,
    pub clinic_id: Uuid,
}

/// Accepting materializes the schedule slot the clinic proposed.
pub async fn accept_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<ApiOk<SlotCreatedData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    #[derive(Debug, sqlx::FromRow)]
    struct InvitationRow {
        clinic_id: Uuid,
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence_kind: i16,
        recurrence_days: Vec<i16>,
        patient_limit: i32,
    }
    let inv: Option<InvitationRow> = sqlx::query_as::<_, InvitationRow>(
        r#"
        SELECT clinic_id, start_time, end_time,
               recurrence_kind, recurrence_days, patient_limit
        FROM invitation
        WHERE invitation_id = $1 AND doctor_id = $2 AND status = $3
        FOR UPDATE
        "#,
    )
    .bind(invitation_id)
    .bind(doctor_id)
    .bind(APPROVAL_PENDING)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let Some(inv) = inv else {
        return Err(ApiError::NotFound("NOT_FOUND", "pending invitation not found".into()));
    };

    sqlx::query(r#"UPDATE invitation SET status = $2 WHERE invitation_id = $1"#)
        .bind(invitation_id)
        .bind(APPROVAL_ACCEPTED)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    let slot_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO schedule_slot
            (doctor_id, clinic_id, start_time, end_time,
             recurrence_kind, recurrence_days, patient_limit)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING slot_id
        "#,
    )
    .bind(doctor_id)
    .bind(inv.clinic_id)
    .bind(inv.start_time)
    .bind(inv.end_time)
    .bind(inv.recurrence_kind)
    .bind(&inv.recurrence_days)
    .bind(inv.patient_limit)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%invitation_id, %slot_id, "invitation accepted");

    Ok(Json(ApiOk {
        data: SlotCreatedData { slot_id, clinic_id: inv.clinic_id },
    }))
}

pub async fn reject_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;

    let res = sqlx::query(
        r#"
        UPDATE invitation SET status = $3
        WHERE invitation_id = $1 AND doctor_id = $2 AND status = $4
        "#,
    )
    .bind(invitation_id)
    .bind(doctor_id)
    .bind(APPROVAL_REJECTED)
    .bind(APPROVAL_PENDING)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "pending invitation not found".into()));
    }

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

/* ============================================================
   POST /doctor/join-requests (doctor -> clinic)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct JoinRequestBody {
    pub clinic_id: Uuid,
    pub slot: SlotParams,
}

#[derive(Debug, Serialize)]
pub struct JoinRequestData {
    pub join_request_id: Uuid,
}

pub async fn create_join_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<JoinRequestBody>,
) -> Result<Json<ApiOk<JoinRequestData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;
    let slot = req.slot.validate()?;

    let clinic_exists: Option<i32> =
        sqlx::query_scalar(r#"SELECT 1 FROM clinic WHERE clinic_id = $1"#)
            .bind(req.clinic_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    if clinic_exists.is_none() {
        return Err(ApiError::NotFound("NOT_FOUND", "clinic not found".into()));
    }

    let pending: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM join_request
        WHERE doctor_id = $1 AND clinic_id = $2 AND status = $3
        "#,
    )
    .bind(doctor_id)
    .bind(req.clinic_id)
    .bind(APPROVAL_PENDING)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;
    if pending > 0 {
        return Err(ApiError::Conflict(
            "ALREADY_REQUESTED",
            "A join request for this clinic is already pending".into(),
        ));
    }

    let join_request_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO join_request
            (clinic_id, doctor_id, start_time, end_time,
             recurrence_kind, recurrence_days, patient_limit, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING join_request_id
        "#,
    )
    .bind(req.clinic_id)
    .bind(doctor_id)
    .bind(slot.start_time)
    .bind(slot.end_time)
    .bind(slot.recurrence.kind())
    .bind(slot.recurrence.days().to_vec())
    .bind(slot.patient_limit)
    .bind(APPROVAL_PENDING)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: JoinRequestData { join_request_id },
    }))
}

/* ============================================================
   POST /doctor/clinics (private clinic self-service)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PrivateClinicRequest {
    pub name: String,
    pub address: String,
    pub slot: SlotParams,
}

#[derive(Debug, Serialize)]
pub struct PrivateClinicData {
    pub clinic_id: Uuid,
    pub slot_id: Uuid,
}

/// A private clinic has no receptionist; the doctor's slot there is created
/// in the same transaction.
pub async fn create_private_clinic(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<PrivateClinicRequest>,
) -> Result<Json<ApiOk<PrivateClinicData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "name is required".into()));
    }
    let slot = req.slot.validate()?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let clinic_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO clinic (name, address, receptionist_id)
        VALUES ($1, $2, NULL)
        RETURNING clinic_id
        "#,
    )
    .bind(name)
    .bind(req.address.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let slot_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO schedule_slot
            (doctor_id, clinic_id, start_time, end_time,
             recurrence_kind, recurrence_days, patient_limit)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING slot_id
        "#,
    )
    .bind(doctor_id)
    .bind(clinic_id)
    .bind(slot.start_time)
    .bind(slot.end_time)
    .bind(slot.recurrence.kind())
    .bind(slot.recurrence.days().to_vec())
    .bind(slot.patient_limit)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%clinic_id, %slot_id, "private clinic created");

    Ok(Json(ApiOk {
        data: PrivateClinicData { clinic_id, slot_id },
    }))
}

/* ============================================================
   DELETE /doctor/slots/{slot_id}
   ============================================================ */

pub async fn delete_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_doctor(&auth)?;
    let doctor_id = resolve_doctor_id(&state, auth.user_id).await?;

    let res = sqlx::query(r#"DELETE FROM schedule_slot WHERE slot_id = $1 AND doctor_id = $2"#)
        .bind(slot_id)
        .bind(doctor_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "slot not found".into()));
    }

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
