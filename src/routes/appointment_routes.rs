// src/routes/appointment_routes.rs
//
// Booking (queue-number allocation), cancellation, and the live queue-status
// poll. Allocation runs inside one transaction that holds an advisory lock on
// the (doctor, clinic, date) scope, so "read max queue_number + capacity,
// then insert" is serialized against concurrent bookings for the same day.
// The unique index on (doctor_id, clinic_id, visit_date, queue_number) is the
// backstop; hitting it (or a serialization failure) retries a bounded number
// of times before surfacing a Conflict.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, BookingError},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, AppointmentRow, AppointmentStatus, OkData, ScheduleSlotRow, ROLE_PATIENT},
    queue,
    schedule::{effective_load, Capacity, Recurrence},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments/book", post(book_appointment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
        .route("/queue-status", get(queue_status))
}

fn ensure_patient(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_PATIENT {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only patients can book appointments".into(),
        ))
    }
}

async fn resolve_patient_id(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    let patient_id: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT patient_id FROM patient WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    patient_id.ok_or_else(|| {
        ApiError::BadRequest("NO_PATIENT_PROFILE", "Account has no patient profile".into())
    })
}

/* ============================================================
   POST /appointments/book
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    // YYYY-MM-DD
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct BookedAppointment {
    pub appointment_id: Uuid,
    pub queue_number: i32,
    pub visit_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub status: AppointmentStatus,
}

/// Allocation rule: queue_number = 1 + max(existing for the scope, default 0).
fn next_queue_number(current_max: Option<i32>) -> i32 {
    current_max.unwrap_or(0) + 1
}

/// Advisory-lock key for one (doctor, clinic, date) queue sequence.
fn scope_lock_key(doctor_id: Uuid, clinic_id: Uuid, date: NaiveDate) -> String {
    format!("appt:{doctor_id}:{clinic_id}:{date}")
}

/// Unique-violation (the queue-number backstop index) and serialization
/// failures are transient under concurrent booking; everything else is not.
fn is_retryable(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("23505") | Some("40001"))
        }
        _ => false,
    }
}

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<BookRequest>,
) -> Result<Json<ApiOk<BookedAppointment>>, ApiError> {
    ensure_patient(&auth)?;
    let patient_id = resolve_patient_id(&state, auth.user_id).await?;

    let date = NaiveDate::parse_from_str(req.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("VALIDATION_ERROR", "date must be YYYY-MM-DD".into()))?;

    let mut attempts = 0;
    let booked = loop {
        match try_book(&state, patient_id, req.doctor_id, req.clinic_id, date).await {
            Ok(b) => break b,
            Err(BookingError::Db(e)) if is_retryable(&e) => {
                attempts += 1;
                if attempts >= state.booking_max_retries {
                    tracing::warn!(
                        doctor_id = %req.doctor_id,
                        clinic_id = %req.clinic_id,
                        %date,
                        "booking retries exhausted"
                    );
                    return Err(BookingError::Contention.into());
                }
                tracing::debug!(attempt = attempts, "transient booking conflict, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    };

    tracing::info!(
        appointment_id = %booked.appointment_id,
        queue_number = booked.queue_number,
        "appointment booked"
    );

    Ok(Json(ApiOk { data: booked }))
}

async fn try_book(
    state: &AppState,
    patient_id: Uuid,
    doctor_id: Uuid,
    clinic_id: Uuid,
    date: NaiveDate,
) -> Result<BookedAppointment, BookingError> {
    let mut tx = state.db.begin().await?;

    // Serialize all bookings for this (doctor, clinic, date) sequence.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(scope_lock_key(doctor_id, clinic_id, date))
        .execute(&mut *tx)
        .await?;

    let daily_limit: Option<i32> =
        sqlx::query_scalar(r#"SELECT daily_patient_limit FROM doctor WHERE doctor_id = $1"#)
            .bind(doctor_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(BookingError::NotFound)?;

    let clinic_exists: Option<i32> =
        sqlx::query_scalar(r#"SELECT 1 FROM clinic WHERE clinic_id = $1"#)
            .bind(clinic_id)
            .fetch_optional(&mut *tx)
            .await?;
    if clinic_exists.is_none() {
        return Err(BookingError::NotFound);
    }

    // Duplicate-booking prevention: one live appointment per patient per
    // (doctor, clinic, date). Cancellation deletes the row, freeing this.
    let duplicates: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM appointment
        WHERE patient_id = $1 AND doctor_id = $2 AND clinic_id = $3 AND visit_date = $4
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(clinic_id)
    .bind(date)
    .fetch_one(&mut *tx)
    .await?;
    if duplicates > 0 {
        return Err(BookingError::DuplicateBooking);
    }

    // Re-evaluate matching slots and capacity at commit time, under the lock.
    // A search response from a moment ago proves nothing by now.
    let slots: Vec<ScheduleSlotRow> = sqlx::query_as::<_, ScheduleSlotRow>(
        r#"
        SELECT slot_id, doctor_id, clinic_id, start_time, end_time,
               recurrence_kind, recurrence_days, patient_limit
        FROM schedule_slot
        WHERE doctor_id = $1 AND clinic_id = $2
        ORDER BY start_time
        "#,
    )
    .bind(doctor_id)
    .bind(clinic_id)
    .fetch_all(&mut *tx)
    .await?;

    let matching: Vec<&ScheduleSlotRow> = slots
        .iter()
        .filter(|s| {
            Recurrence::from_columns(s.recurrence_kind, &s.recurrence_days)
                .is_some_and(|r| r.matches(date))
        })
        .collect();
    if matching.is_empty() {
        return Err(BookingError::NoMatchingSlot);
    }

    let day_total: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM appointment WHERE doctor_id = $1 AND visit_date = $2"#,
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_one(&mut *tx)
    .await?;

    let mut chosen: Option<&ScheduleSlotRow> = None;
    for slot in &matching {
        let booked: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM appointment
            WHERE doctor_id = $1 AND clinic_id = $2 AND visit_date = $3 AND slot_time = $4
            "#,
        )
        .bind(doctor_id)
        .bind(clinic_id)
        .bind(date)
        .bind(slot.start_time)
        .fetch_one(&mut *tx)
        .await?;

        let (limit, load) = effective_load(slot.patient_limit, booked, daily_limit, day_total);
        if !Capacity::of(limit, load).is_full() {
            chosen = Some(slot);
            break;
        }
    }
    let Some(slot) = chosen else {
        return Err(BookingError::SlotFull);
    };

    let current_max: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT MAX(queue_number) FROM appointment
        WHERE doctor_id = $1 AND clinic_id = $2 AND visit_date = $3
        "#,
    )
    .bind(doctor_id)
    .bind(clinic_id)
    .bind(date)
    .fetch_one(&mut *tx)
    .await?;
    let queue_number = next_queue_number(current_max);

    // Initial status is Confirmed; the doctor flips it to Waiting on arrival.
    let appointment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO appointment
            (patient_id, doctor_id, clinic_id, visit_date, queue_number, status, slot_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING appointment_id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(clinic_id)
    .bind(date)
    .bind(queue_number)
    .bind(AppointmentStatus::Confirmed)
    .bind(slot.start_time)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(BookedAppointment {
        appointment_id,
        queue_number,
        visit_date: date,
        slot_time: slot.start_time,
        status: AppointmentStatus::Confirmed,
    })
}

/* ============================================================
   POST /appointments/{id}/cancel
   ============================================================ */

/// Cancellation deletes the row. Surviving appointments keep their queue
/// numbers; the gap is intentional and numbers are never reused.
pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_patient(&auth)?;
    let patient_id = resolve_patient_id(&state, auth.user_id).await?;

    let res = sqlx::query(
        r#"DELETE FROM appointment WHERE appointment_id = $1 AND patient_id = $2"#,
    )
    .bind(appointment_id)
    .bind(patient_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "appointment not found".into()));
    }

    tracing::info!(%appointment_id, "appointment cancelled");

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   GET /queue-status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct QueueStatusQuery {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusData {
    pub current_serving: i32,
}

/// Polled by patient dashboards. Derived fresh on every call; nothing about
/// the serving pointer is stored.
pub async fn queue_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<QueueStatusQuery>,
) -> Result<Json<ApiOk<QueueStatusData>>, ApiError> {
    let today = Utc::now().date_naive();

    let appointments: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, doctor_id, clinic_id,
               visit_date, queue_number, status, slot_time
        FROM appointment
        WHERE doctor_id = $1 AND clinic_id = $2 AND visit_date = $3
        "#,
    )
    .bind(q.doctor_id)
    .bind(q.clinic_id)
    .bind(today)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: QueueStatusData {
            current_serving: queue::current_serving(&appointments),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_queue_number() {
        assert_eq!(next_queue_number(None), 1);
        assert_eq!(next_queue_number(Some(0)), 1);
        assert_eq!(next_queue_number(Some(7)), 8);
        // A gap left by cancellation must not shrink the next number.
        assert_eq!(next_queue_number(Some(3)), 4);
    }

    #[test]
    fn test_scope_lock_key_is_per_tuple() {
        let d = Uuid::new_v4();
        let c = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let other_day = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        assert_eq!(scope_lock_key(d, c, day), scope_lock_key(d, c, day));
        assert_ne!(scope_lock_key(d, c, day), scope_lock_key(d, c, other_day));
        assert_ne!(scope_lock_key(d, c, day), scope_lock_key(c, d, day));
    }
}
