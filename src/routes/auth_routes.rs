// src/routes/auth_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{generate_access_token, hash_access_token, hash_password, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{role_from_name, role_to_string, ApiOk, AppState, OkData, UserRow, ROLE_PATIENT},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{role}", post(login))
        .route("/signup/patient", post(signup_patient))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

fn validate_username(username: &str) -> Result<&str, ApiError> {
    let username = username.trim();
    if username.len() < 3 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username must be at least 3 characters".into(),
        ));
    }
    Ok(username)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// Role-scoped login: the URL names the portal being used, and the account's
/// stored role must agree with it.
pub async fn login(
    State(state): State<AppState>,
    Path(role_name): Path<String>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginData>>, ApiError> {
    let Some(required_role) = role_from_name(&role_name) else {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("unknown role: {role_name}"),
        ));
    };

    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username and password are required".into(),
        ));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, username, display_name, password_hash, role, is_active
        FROM app_user
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }
    if user.role != required_role {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Account type not allowed for this login".into(),
        ));
    }
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    sqlx::query(
        r#"
        INSERT INTO session_token (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user.user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(user_id = %user.user_id, role = %role_name, "login");

    Ok(Json(ApiOk {
        data: LoginData {
            access_token,
            expires_at,
            user: UserProfile {
                user_id: user.user_id,
                username: user.username,
                display_name: user.display_name,
                role: role_to_string(user.role),
            },
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct PatientSignupRequest {
    pub name: String,
    pub username: String,
    pub password: String,
    pub date_of_birth: Option<NaiveDate>,
    pub mobile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PatientSignupData {
    pub user_id: Uuid,
    pub patient_id: Uuid,
}

/// Self-service patient registration. Staff accounts are created by the
/// admin endpoints instead.
pub async fn signup_patient(
    State(state): State<AppState>,
    Json(req): Json<PatientSignupRequest>,
) -> Result<Json<ApiOk<PatientSignupData>>, ApiError> {
    let username = validate_username(&req.username)?;
    validate_password(&req.password)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "name is required".into()));
    }

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
    .bind(ROLE_PATIENT)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let patient_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO patient (user_id, name, date_of_birth, mobile)
        VALUES ($1, $2, $3, $4)
        RETURNING patient_id
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(req.date_of_birth)
    .bind(req.mobile.unwrap_or_default())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%user_id, %patient_id, "patient signup");

    Ok(Json(ApiOk {
        data: PatientSignupData { user_id, patient_id },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<UserProfile>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, username, display_name, password_hash, role, is_active
        FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "user not found".into()))?;

    Ok(Json(ApiOk {
        data: UserProfile {
            user_id: user.user_id,
            username: user.username,
            display_name: user.display_name,
            role: role_to_string(user.role),
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert_eq!(validate_username("  bob  ").unwrap(), "bob");
        assert!(validate_username("al").is_err());
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_role_names_round_trip() {
        for name in ["patient", "admin", "doctor", "receptionist"] {
            let role = role_from_name(name).unwrap();
            assert_eq!(role_to_string(role), name);
        }
        assert!(role_from_name("manager").is_none());
    }
}
