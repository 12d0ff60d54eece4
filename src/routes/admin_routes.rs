// src/routes/admin_routes.rs
//
// Global record management. Clinic deletion cascades to its slots,
// appointments, invitations and join requests (FK rules in the migration);
// doctor/patient deletion is blocked while dependent rows exist, so history
// never silently disappears with a person.

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, ROLE_ADMIN, ROLE_DOCTOR, ROLE_RECEPTIONIST},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", post(create_doctor))
        .route("/receptionists", post(create_receptionist))
        .route("/clinics/{clinic_id}", delete(delete_clinic))
        .route("/doctors/{doctor_id}", delete(delete_doctor))
        .route("/patients/{patient_id}", delete(delete_patient))
}

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admins can manage global records".into(),
        ))
    }
}

async fn ensure_username_free(state: &AppState, username: &str) -> Result<(), ApiError> {
    let taken: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT user_id FROM app_user WHERE username = $1"#)
            .bind(username)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    if taken.is_some() {
        return Err(ApiError::Conflict(
            "USERNAME_TAKEN",
            "That username is already in use".into(),
        ));
    }
    Ok(())
}

/* ============================================================
   POST /admin/doctors
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub specialty: String,
    pub credentials: Option<String>,
    pub phone: Option<String>,
    pub daily_patient_limit: Option<i32>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreateDoctorData {
    pub doctor_id: Uuid,
    pub user_id: Uuid,
}

pub async fn create_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<Json<ApiOk<CreateDoctorData>>, ApiError> {
    ensure_admin(&auth)?;

    let name = req.name.trim();
    let specialty = req.specialty.trim();
    if name.is_empty() || specialty.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "name and specialty are required".into(),
        ));
    }
    if req.daily_patient_limit.is_some_and(|l| l < 0) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "daily_patient_limit must not be negative".into(),
        ));
    }
    let username = req.username.trim();
    ensure_username_free(&state, username).await?;
    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (username, display_name, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING user_id
        "#,
    )
    .bind(username)
    .bind(name)
    .bind(&password_hash)
    .bind(ROLE_DOCTOR)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let doctor_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO doctor (user_id, name, specialty, credentials, phone, daily_patient_limit)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING doctor_id
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(specialty)
    .bind(req.credentials.unwrap_or_default())
    .bind(req.phone.unwrap_or_default())
    .bind(req.daily_patient_limit)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%doctor_id, "doctor created");

    Ok(Json(ApiOk {
        data: CreateDoctorData { doctor_id, user_id },
    }))
}

/* ============================================================
   POST /admin/receptionists (receptionist onboarding = new clinic)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateReceptionistRequest {
    pub name: String,
    pub username: String,
    pub password: String,
    pub clinic_name: String,
    pub clinic_address: String,
}

#[derive(Debug, Serialize)]
pub struct CreateReceptionistData {
    pub receptionist_id: Uuid,
    pub clinic_id: Uuid,
    pub user_id: Uuid,
}

/// Onboarding a receptionist creates the clinic they run in one transaction.
pub async fn create_receptionist(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateReceptionistRequest>,
) -> Result<Json<ApiOk<CreateReceptionistData>>, ApiError> {
    ensure_admin(&auth)?;

    let name = req.name.trim();
    let clinic_name = req.clinic_name.trim();
    if name.is_empty() || clinic_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "name and clinic_name are required".into(),
        ));
    }
    let username = req.username.trim();
    ensure_username_free(&state, username).await?;
    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (username, display_name, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING user_id
        "#,
    )
    .bind(username)
    .bind(name)
    .bind(&password_hash)
    .bind(ROLE_RECEPTIONIST)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let clinic_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO clinic (name, address)
        VALUES ($1, $2)
        RETURNING clinic_id
        "#,
    )
    .bind(clinic_name)
    .bind(req.clinic_address.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let receptionist_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO receptionist (user_id, name, clinic_id)
        VALUES ($1, $2, $3)
        RETURNING receptionist_id
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(clinic_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    sqlx::query(r#"UPDATE clinic SET receptionist_id = $2 WHERE clinic_id = $1"#)
        .bind(clinic_id)
        .bind(receptionist_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%receptionist_id, %clinic_id, "receptionist onboarded");

    Ok(Json(ApiOk {
        data: CreateReceptionistData {
            receptionist_id,
            clinic_id,
            user_id,
        },
    }))
}

/* ============================================================
   Deletes
   ============================================================ */

pub async fn delete_clinic(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    // FK cascade removes slots, appointments, invitations and join requests.
    let res = sqlx::query(r#"DELETE FROM clinic WHERE clinic_id = $1"#)
        .bind(clinic_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "clinic not found".into()));
    }

    tracing::info!(%clinic_id, "clinic deleted");

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

pub async fn delete_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    let dependents: i64 = sqlx::query_scalar(
        r#"
        SELECT (SELECT COUNT(*) FROM appointment WHERE doctor_id = $1)
             + (SELECT COUNT(*) FROM schedule_slot WHERE doctor_id = $1)
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;
    if dependents > 0 {
        return Err(ApiError::Conflict(
            "HAS_DEPENDENTS",
            "Doctor still has appointments or schedule slots".into(),
        ));
    }

    // Removing the account row cascades to the doctor profile.
    let res = sqlx::query(
        r#"DELETE FROM app_user WHERE user_id = (SELECT user_id FROM doctor WHERE doctor_id = $1)"#,
    )
    .bind(doctor_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "doctor not found".into()));
    }

    tracing::info!(%doctor_id, "doctor deleted");

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    let dependents: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM appointment WHERE patient_id = $1"#)
            .bind(patient_id)
            .fetch_one(&state.db)
            .await
            .map_err(ApiError::db)?;
    if dependents > 0 {
        return Err(ApiError::Conflict(
            "HAS_DEPENDENTS",
            "Patient still has appointments".into(),
        ));
    }

    let res = sqlx::query(
        r#"DELETE FROM app_user WHERE user_id = (SELECT user_id FROM patient WHERE patient_id = $1)"#,
    )
    .bind(patient_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "patient not found".into()));
    }

    tracing::info!(%patient_id, "patient deleted");

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
