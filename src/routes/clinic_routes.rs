// src/routes/clinic_routes.rs
//
// Receptionist-side roster management for the clinic they run: inviting
// doctors, deciding join requests, and pruning schedule slots.

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, OkData, APPROVAL_ACCEPTED, APPROVAL_PENDING, APPROVAL_REJECTED,
        ROLE_RECEPTIONIST,
    },
    routes::SlotParams,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invitations", post(invite_doctor))
        .route("/join-requests/{join_request_id}/accept", post(accept_join_request))
        .route("/join-requests/{join_request_id}/reject", post(reject_join_request))
        .route("/slots/{slot_id}", delete(delete_slot))
}

fn ensure_receptionist(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_RECEPTIONIST {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only receptionists can manage a clinic roster".into(),
        ))
    }
}

/// The clinic this receptionist runs. A receptionist without a clinic cannot
/// manage anything.
pub async fn resolve_clinic_id(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    let clinic_id: Option<Option<Uuid>> =
        sqlx::query_scalar(r#"SELECT clinic_id FROM receptionist WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    clinic_id
        .flatten()
        .ok_or_else(|| {
            ApiError::BadRequest(
                "NO_CLINIC",
                "Account is not attached to a clinic".into(),
            )
        })
}

/* ============================================================
   POST /clinic/invitations
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct InviteDoctorRequest {
    pub doctor_id: Uuid,
    pub slot: SlotParams,
}

#[derive(Debug, Serialize)]
pub struct InvitationData {
    pub invitation_id: Uuid,
}

pub async fn invite_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<InviteDoctorRequest>,
) -> Result<Json<ApiOk<InvitationData>>, ApiError> {
    ensure_receptionist(&auth)?;
    let clinic_id = resolve_clinic_id(&state, auth.user_id).await?;
    let slot = req.slot.validate()?;

    let doctor_exists: Option<i32> =
        sqlx::query_scalar(r#"SELECT 1 FROM doctor WHERE doctor_id = $1"#)
            .bind(req.doctor_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    if doctor_exists.is_none() {
        return Err(ApiError::NotFound("NOT_FOUND", "doctor not found".into()));
    }

    let pending: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM invitation
        WHERE doctor_id = $1 AND clinic_id = $2 AND status = $3
        "#,
    )
    .bind(req.doctor_id)
    .bind(clinic_id)
    .bind(APPROVAL_PENDING)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;
    if pending > 0 {
        return Err(ApiError::Conflict(
            "ALREADY_INVITED",
            "An invitation for this doctor is already pending".into(),
        ));
    }

    let invitation_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO invitation
            (clinic_id, doctor_id, start_time, end_time,
             recurrence_kind, recurrence_days, patient_limit, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING invitation_id
        "#,
    )
    .bind(clinic_id)
    .bind(req.doctor_id)
    .bind(slot.start_time)
    .bind(slot.end_time)
    .bind(slot.recurrence.kind())
    .bind(slot.recurrence.days().to_vec())
    .bind(slot.patient_limit)
    .bind(APPROVAL_PENDING)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(%invitation_id, doctor_id = %req.doctor_id, "doctor invited");

    Ok(Json(ApiOk {
        data: InvitationData { invitation_id },
    }))
}

/* ============================================================
   Join requests (doctor -> clinic), decided here
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct SlotCreatedData {
    pub slot_id: Uuid,
    pub doctor_id: Uuid,
}

pub async fn accept_join_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(join_request_id): Path<Uuid>,
) -> Result<Json<ApiOk<SlotCreatedData>>, ApiError> {
    ensure_receptionist(&auth)?;
    let clinic_id = resolve_clinic_id(&state, auth.user_id).await?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    #[derive(Debug, sqlx::FromRow)]
    struct JoinRequestRow {
        doctor_id: Uuid,
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence_kind: i16,
        recurrence_days: Vec<i16>,
        patient_limit: i32,
    }
    let jr: Option<JoinRequestRow> = sqlx::query_as::<_, JoinRequestRow>(
        r#"
        SELECT doctor_id, start_time, end_time,
               recurrence_kind, recurrence_days, patient_limit
        FROM join_request
        WHERE join_request_id = $1 AND clinic_id = $2 AND status = $3
        FOR UPDATE
        "#,
    )
    .bind(join_request_id)
    .bind(clinic_id)
    .bind(APPROVAL_PENDING)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let Some(jr) = jr else {
        return Err(ApiError::NotFound("NOT_FOUND", "pending join request not found".into()));
    };

    sqlx::query(r#"UPDATE join_request SET status = $2 WHERE join_request_id = $1"#)
        .bind(join_request_id)
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
    .bind(jr.doctor_id)
    .bind(clinic_id)
    .bind(jr.start_time)
    .bind(jr.end_time)
    .bind(jr.recurrence_kind)
    .bind(&jr.recurrence_days)
    .bind(jr.patient_limit)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%join_request_id, %slot_id, "join request accepted");

    Ok(Json(ApiOk {
        data: SlotCreatedData { slot_id, doctor_id: jr.doctor_id },
    }))
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(join_request_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_receptionist(&auth)?;
    let clinic_id = resolve_clinic_id(&state, auth.user_id).await?;

    let res = sqlx::query(
        r#"
        UPDATE join_request SET status = $3
        WHERE join_request_id = $1 AND clinic_id = $2 AND status = $4
        "#,
    )
    .bind(join_request_id)
    .bind(clinic_id)
    .bind(APPROVAL_REJECTED)
    .bind(APPROVAL_PENDING)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "pending join request not found".into()));
    }

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

/* ============================================================
   DELETE /clinic/slots/{slot_id}
   ============================================================ */

pub async fn delete_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_receptionist(&auth)?;
    let clinic_id = resolve_clinic_id(&state, auth.user_id).await?;

    let res = sqlx::query(r#"DELETE FROM schedule_slot WHERE slot_id = $1 AND clinic_id = $2"#)
        .bind(slot_id)
        .bind(clinic_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "slot not found".into()));
    }

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
