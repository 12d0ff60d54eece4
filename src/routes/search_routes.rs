// src/routes/search_routes.rs
//
// Patient-facing doctor search: given a calendar date plus optional free-text
// filters, list doctors with the schedule slots that actually apply to that
// date and how much capacity each has left. Capacity is recomputed from the
// appointment table on every request; a stale count here would let the
// frontend offer a Book button for a full slot.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
    schedule::{self, RecurrenceSpec},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/doctors", get(search_doctors))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    // YYYY-MM-DD
    pub date: String,
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub clinic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DoctorSearchResult {
    pub doctor_id: Uuid,
    pub name: String,
    pub specialty: String,
    pub schedules: Vec<MatchedSlotDto>,
}

#[derive(Debug, Serialize)]
pub struct MatchedSlotDto {
    pub slot_id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: RecurrenceSpec,
    /// None = unlimited.
    pub remaining: Option<i64>,
    pub bookable: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct DoctorBriefRow {
    doctor_id: Uuid,
    name: String,
    specialty: String,
    daily_patient_limit: Option<i32>,
}

#[derive(Debug, sqlx::FromRow)]
struct SlotWithClinicRow {
    slot_id: Uuid,
    doctor_id: Uuid,
    clinic_id: Uuid,
    clinic_name: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    recurrence_kind: i16,
    recurrence_days: Vec<i16>,
    patient_limit: i32,
}

/// `%term%` with LIKE metacharacters escaped, for ILIKE filters.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn non_empty(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub async fn search_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ApiOk<Vec<DoctorSearchResult>>>, ApiError> {
    let date = NaiveDate::parse_from_str(q.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("VALIDATION_ERROR", "date must be YYYY-MM-DD".into()))?;

    let name_pat = non_empty(&q.name).map(like_pattern);
    let specialty_pat = non_empty(&q.specialty).map(like_pattern);
    let clinic_pat = non_empty(&q.clinic).map(like_pattern);

    let doctors: Vec<DoctorBriefRow> = sqlx::query_as::<_, DoctorBriefRow>(
        r#"
        SELECT doctor_id, name, specialty, daily_patient_limit
        FROM doctor
        WHERE ($1::text IS NULL OR name ILIKE $1)
          AND ($2::text IS NULL OR specialty ILIKE $2)
        ORDER BY name
        "#,
    )
    .bind(name_pat.as_deref())
    .bind(specialty_pat.as_deref())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    if doctors.is_empty() {
        return Ok(Json(ApiOk { data: vec![] }));
    }
    let doctor_ids: Vec<Uuid> = doctors.iter().map(|d| d.doctor_id).collect();

    let slots: Vec<SlotWithClinicRow> = sqlx::query_as::<_, SlotWithClinicRow>(
        r#"
        SELECT s.slot_id, s.doctor_id, s.clinic_id, c.name AS clinic_name,
               s.start_time, s.end_time,
               s.recurrence_kind, s.recurrence_days, s.patient_limit
        FROM schedule_slot s
        JOIN clinic c ON c.clinic_id = s.clinic_id
        WHERE s.doctor_id = ANY($1)
          AND ($2::text IS NULL OR c.name ILIKE $2 OR c.address ILIKE $2)
        ORDER BY s.start_time
        "#,
    )
    .bind(&doctor_ids)
    .bind(clinic_pat.as_deref())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    // Fresh booked counts for the requested date, per slot scope.
    #[derive(Debug, sqlx::FromRow)]
    struct BookedCountRow {
        doctor_id: Uuid,
        clinic_id: Uuid,
        slot_time: NaiveTime,
        booked: i64,
    }
    let counts: Vec<BookedCountRow> = sqlx::query_as::<_, BookedCountRow>(
        r#"
        SELECT doctor_id, clinic_id, slot_time, COUNT(*) AS booked
        FROM appointment
        WHERE visit_date = $1 AND doctor_id = ANY($2)
        GROUP BY doctor_id, clinic_id, slot_time
        "#,
    )
    .bind(date)
    .bind(&doctor_ids)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let booked: HashMap<(Uuid, Uuid, NaiveTime), i64> = counts
        .into_iter()
        .map(|r| ((r.doctor_id, r.clinic_id, r.slot_time), r.booked))
        .collect();

    // Whole-day totals per doctor, for the daily_patient_limit fallback.
    #[derive(Debug, sqlx::FromRow)]
    struct DayTotalRow {
        doctor_id: Uuid,
        booked: i64,
    }
    let totals: Vec<DayTotalRow> = sqlx::query_as::<_, DayTotalRow>(
        r#"
        SELECT doctor_id, COUNT(*) AS booked
        FROM appointment
        WHERE visit_date = $1 AND doctor_id = ANY($2)
        GROUP BY doctor_id
        "#,
    )
    .bind(date)
    .bind(&doctor_ids)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;
    let day_totals: HashMap<Uuid, i64> =
        totals.into_iter().map(|r| (r.doctor_id, r.booked)).collect();

    let mut slots_by_doctor: HashMap<Uuid, Vec<SlotWithClinicRow>> = HashMap::new();
    for s in slots {
        slots_by_doctor.entry(s.doctor_id).or_default().push(s);
    }

    let results = doctors
        .into_iter()
        .map(|d| {
            let own = slots_by_doctor.remove(&d.doctor_id).unwrap_or_default();
            let daily_limit = d.daily_patient_limit;
            let day_total = day_totals.get(&d.doctor_id).copied().unwrap_or(0);
            let slot_booked = |s: &SlotWithClinicRow| {
                booked
                    .get(&(s.doctor_id, s.clinic_id, s.start_time))
                    .copied()
                    .unwrap_or(0)
            };
            // Same effective limit/load the booking path checks; a limit-0
            // slot is capped by the doctor's daily_patient_limit here too.
            let matched = schedule::match_slots(
                own,
                date,
                |s| {
                    let (limit, _) =
                        schedule::effective_load(s.patient_limit, slot_booked(s), daily_limit, day_total);
                    (s.recurrence_kind, s.recurrence_days.clone(), limit)
                },
                |s| schedule::effective_load(s.patient_limit, slot_booked(s), daily_limit, day_total).1,
            );
            let schedules = matched
                .into_iter()
                .filter_map(|m| {
                    let rec = schedule::Recurrence::from_columns(
                        m.slot.recurrence_kind,
                        &m.slot.recurrence_days,
                    )?;
                    Some(MatchedSlotDto {
                        slot_id: m.slot.slot_id,
                        clinic_id: m.slot.clinic_id,
                        clinic_name: m.slot.clinic_name,
                        start_time: m.slot.start_time,
                        end_time: m.slot.end_time,
                        recurrence: rec.to_wire(),
                        remaining: m.capacity.remaining(),
                        bookable: !m.capacity.is_full(),
                    })
                })
                .collect();
            DoctorSearchResult {
                doctor_id: d.doctor_id,
                name: d.name,
                specialty: d.specialty,
                schedules,
            }
        })
        .collect();

    Ok(Json(ApiOk { data: results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("smith"), "%smith%");
        assert_eq!(like_pattern("  smith "), "%smith%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_non_empty_filter() {
        assert_eq!(non_empty(&Some("  ".into())), None);
        assert_eq!(non_empty(&Some(" x ".into())), Some("x"));
        assert_eq!(non_empty(&None), None);
    }
}
