//! Schedule matching: decides whether a doctor's recurring slot applies to a
//! calendar date and how much booking capacity is left on it.
//!
//! Recurrence is a tagged value (weekly day-of-week set vs explicit
//! day-of-month set). Storage uses a smallint discriminant plus a smallint
//! array; nothing here ever sniffs strings to tell the two apart.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const RECURRENCE_WEEKLY: i16 = 0;
pub const RECURRENCE_MONTHLY: i16 = 1;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Weekday name -> index (Monday = 0). Case-insensitive, full names only.
pub fn parse_weekday(name: &str) -> Option<i16> {
    WEEKDAY_NAMES
        .iter()
        .position(|w| w.eq_ignore_ascii_case(name.trim()))
        .map(|i| i as i16)
}

pub fn weekday_name(index: i16) -> &'static str {
    WEEKDAY_NAMES
        .get(index as usize)
        .copied()
        .unwrap_or("unknown")
}

/// Validated recurrence of a schedule slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Day-of-week indices, Monday = 0 .. Sunday = 6.
    Weekly(Vec<i16>),
    /// Explicit days of the month, 1..=31.
    Monthly(Vec<i16>),
}

impl Recurrence {
    /// Rebuild from storage columns. Unknown discriminants yield `None`, and
    /// the caller must treat that slot as never matching (fail closed).
    pub fn from_columns(kind: i16, days: &[i16]) -> Option<Self> {
        match kind {
            RECURRENCE_WEEKLY => Some(Recurrence::Weekly(days.to_vec())),
            RECURRENCE_MONTHLY => Some(Recurrence::Monthly(days.to_vec())),
            _ => None,
        }
    }

    pub fn kind(&self) -> i16 {
        match self {
            Recurrence::Weekly(_) => RECURRENCE_WEEKLY,
            Recurrence::Monthly(_) => RECURRENCE_MONTHLY,
        }
    }

    pub fn days(&self) -> &[i16] {
        match self {
            Recurrence::Weekly(d) | Recurrence::Monthly(d) => d,
        }
    }

    /// Does this recurrence include the given calendar date?
    /// An empty day set matches nothing.
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::Weekly(days) => {
                let idx = date.weekday().num_days_from_monday() as i16;
                days.contains(&idx)
            }
            Recurrence::Monthly(dates) => {
                let dom = date.day() as i16;
                dates.contains(&dom)
            }
        }
    }

    pub fn to_wire(&self) -> RecurrenceSpec {
        match self {
            Recurrence::Weekly(days) => RecurrenceSpec::Weekly {
                days: days.iter().map(|d| weekday_name(*d).to_string()).collect(),
            },
            Recurrence::Monthly(dates) => RecurrenceSpec::Monthly {
                dates: dates.clone(),
            },
        }
    }
}

/// Wire shape of a recurrence, used by slot-creating requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceSpec {
    Weekly { days: Vec<String> },
    Monthly { dates: Vec<i16> },
}

impl RecurrenceSpec {
    /// Validate into the internal form: weekday names must parse, month days
    /// must be 1..=31, the set must be non-empty. Duplicates collapse.
    pub fn validate(&self) -> Result<Recurrence, String> {
        match self {
            RecurrenceSpec::Weekly { days } => {
                if days.is_empty() {
                    return Err("weekly recurrence needs at least one day".into());
                }
                let mut idx = Vec::with_capacity(days.len());
                for name in days {
                    let i = parse_weekday(name)
                        .ok_or_else(|| format!("unknown weekday name: {name:?}"))?;
                    if !idx.contains(&i) {
                        idx.push(i);
                    }
                }
                idx.sort_unstable();
                Ok(Recurrence::Weekly(idx))
            }
            RecurrenceSpec::Monthly { dates } => {
                if dates.is_empty() {
                    return Err("monthly recurrence needs at least one date".into());
                }
                let mut out = Vec::with_capacity(dates.len());
                for &d in dates {
                    if !(1..=31).contains(&d) {
                        return Err(format!("day of month out of range: {d}"));
                    }
                    if !out.contains(&d) {
                        out.push(d);
                    }
                }
                out.sort_unstable();
                Ok(Recurrence::Monthly(out))
            }
        }
    }
}

/// Remaining booking capacity of a slot on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// patient_limit = 0: the slot never fills up.
    Unlimited,
    Remaining(i64),
}

impl Capacity {
    pub fn of(patient_limit: i32, booked: i64) -> Self {
        if patient_limit <= 0 {
            Capacity::Unlimited
        } else {
            Capacity::Remaining((patient_limit as i64 - booked).max(0))
        }
    }

    pub fn is_full(self) -> bool {
        matches!(self, Capacity::Remaining(0))
    }

    /// `None` means unlimited on the wire.
    pub fn remaining(self) -> Option<i64> {
        match self {
            Capacity::Unlimited => None,
            Capacity::Remaining(n) => Some(n),
        }
    }
}

/// Effective (limit, load) pair for a slot. A slot with its own
/// patient_limit is measured against its own bookings; a limit-0 slot falls
/// back to the doctor's daily cap, measured against the doctor's whole-day
/// total. Booking and search must agree on this, or search will advertise
/// slots that booking refuses.
pub fn effective_load(
    slot_limit: i32,
    slot_booked: i64,
    daily_limit: Option<i32>,
    day_total: i64,
) -> (i32, i64) {
    if slot_limit > 0 {
        (slot_limit, slot_booked)
    } else {
        (daily_limit.unwrap_or(0), day_total)
    }
}

/// A slot that applies to the queried date, annotated with capacity.
#[derive(Debug, Clone)]
pub struct MatchedSlot<T> {
    pub slot: T,
    pub capacity: Capacity,
}

/// Filter `slots` down to those whose recurrence includes `date`, annotating
/// each with remaining capacity. `booked` reports today's appointment count
/// for a slot; it is re-read per request, never cached.
///
/// Slots with an unknown recurrence discriminant are skipped entirely.
pub fn match_slots<T, K, B>(slots: Vec<T>, date: NaiveDate, key: K, booked: B) -> Vec<MatchedSlot<T>>
where
    K: Fn(&T) -> (i16, Vec<i16>, i32),
    B: Fn(&T) -> i64,
{
    let mut out = Vec::new();
    for slot in slots {
        let (kind, days, limit) = key(&slot);
        let Some(rec) = Recurrence::from_columns(kind, &days) else {
            continue;
        };
        if !rec.matches(date) {
            continue;
        }
        let capacity = Capacity::of(limit, booked(&slot));
        out.push(MatchedSlot { slot, capacity });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("Monday"), Some(0));
        assert_eq!(parse_weekday("sunday"), Some(6));
        assert_eq!(parse_weekday(" Wednesday "), Some(2));
        assert_eq!(parse_weekday("Mon"), None);
        assert_eq!(parse_weekday(""), None);
    }

    #[test]
    fn test_weekly_matches_only_listed_days() {
        let rec = Recurrence::Weekly(vec![0]); // Mondays
        assert!(rec.matches(date(2024, 7, 1))); // a Monday
        assert!(!rec.matches(date(2024, 7, 2))); // Tuesday
        assert!(!rec.matches(date(2024, 7, 7))); // Sunday
    }

    #[test]
    fn test_monthly_matches_day_of_month_regardless_of_weekday() {
        let rec = Recurrence::Monthly(vec![15]);
        assert!(rec.matches(date(2024, 7, 15))); // a Monday
        assert!(rec.matches(date(2024, 6, 15))); // a Saturday
        assert!(!rec.matches(date(2024, 7, 14)));
    }

    #[test]
    fn test_empty_set_never_matches() {
        assert!(!Recurrence::Weekly(vec![]).matches(date(2024, 7, 1)));
        assert!(!Recurrence::Monthly(vec![]).matches(date(2024, 7, 15)));
    }

    #[test]
    fn test_unknown_kind_fails_closed() {
        assert_eq!(Recurrence::from_columns(9, &[0, 1]), None);
    }

    #[test]
    fn test_spec_validation() {
        let ok = RecurrenceSpec::Weekly {
            days: vec!["monday".into(), "Wednesday".into(), "Monday".into()],
        };
        assert_eq!(ok.validate().unwrap(), Recurrence::Weekly(vec![0, 2]));

        let bad_name = RecurrenceSpec::Weekly {
            days: vec!["Funday".into()],
        };
        assert!(bad_name.validate().is_err());

        let empty = RecurrenceSpec::Monthly { dates: vec![] };
        assert!(empty.validate().is_err());

        let out_of_range = RecurrenceSpec::Monthly { dates: vec![32] };
        assert!(out_of_range.validate().is_err());

        let ok_monthly = RecurrenceSpec::Monthly {
            dates: vec![15, 1, 15],
        };
        assert_eq!(ok_monthly.validate().unwrap(), Recurrence::Monthly(vec![1, 15]));
    }

    #[test]
    fn test_capacity() {
        assert_eq!(Capacity::of(0, 100), Capacity::Unlimited);
        assert!(!Capacity::of(0, 100).is_full());
        assert_eq!(Capacity::of(2, 1), Capacity::Remaining(1));
        assert!(Capacity::of(2, 2).is_full());
        // over-booked (limit lowered after bookings) clamps to 0, still full
        assert_eq!(Capacity::of(2, 5), Capacity::Remaining(0));
        assert_eq!(Capacity::Unlimited.remaining(), None);
        assert_eq!(Capacity::Remaining(3).remaining(), Some(3));
    }

    #[test]
    fn test_effective_load_prefers_slot_limit() {
        assert_eq!(effective_load(5, 3, Some(2), 10), (5, 3));
        assert_eq!(effective_load(1, 0, None, 99), (1, 0));
    }

    #[test]
    fn test_effective_load_falls_back_to_daily_cap() {
        // Limit-0 slot: the doctor's day cap vs the whole-day total.
        assert_eq!(effective_load(0, 1, Some(4), 4), (4, 4));
        let (limit, load) = effective_load(0, 1, Some(4), 4);
        assert!(Capacity::of(limit, load).is_full());
        // No cap anywhere stays unlimited.
        assert_eq!(effective_load(0, 9, None, 42), (0, 42));
        assert!(!Capacity::of(0, 42).is_full());
    }

    #[test]
    fn test_day_cap_exhaustion_marks_matched_slot_full() {
        // (kind, days, slot_limit, slot_booked): a limit-0 Monday slot whose
        // doctor has already hit their daily cap must come back full.
        let slots = vec![(RECURRENCE_WEEKLY, vec![0], 0, 0i64)];
        let daily_limit = Some(3);
        let day_total = 3i64;
        let matched = match_slots(
            slots,
            date(2024, 7, 1),
            |s| {
                let (limit, _) = effective_load(s.2, s.3, daily_limit, day_total);
                (s.0, s.1.clone(), limit)
            },
            |s| effective_load(s.2, s.3, daily_limit, day_total).1,
        );
        assert_eq!(matched.len(), 1);
        assert!(matched[0].capacity.is_full());
    }

    #[test]
    fn test_match_slots_filters_and_annotates() {
        // (kind, days, limit, booked)
        let slots = vec![
            (RECURRENCE_WEEKLY, vec![0], 2, 2i64),  // Monday, full
            (RECURRENCE_WEEKLY, vec![1], 2, 0i64),  // Tuesday, no match
            (RECURRENCE_MONTHLY, vec![1], 0, 9i64), // 1st of month, unlimited
            (99, vec![0], 0, 0i64),                 // corrupt kind, skipped
        ];
        // 2024-07-01 is both a Monday and the 1st.
        let matched = match_slots(
            slots,
            date(2024, 7, 1),
            |s| (s.0, s.1.clone(), s.2),
            |s| s.3,
        );
        assert_eq!(matched.len(), 2);
        assert!(matched[0].capacity.is_full());
        assert_eq!(matched[1].capacity, Capacity::Unlimited);
    }
}
