//! Live queue arithmetic for one (doctor, clinic, date) serving queue.
//!
//! Everything here is derived fresh from appointment rows on each read; the
//! "currently serving" pointer is never stored, so concurrent status changes
//! can't leave a stale counter behind.

use serde::Serialize;

use crate::models::{AppointmentRow, AppointmentStatus};

/// Currently-serving number: the highest queue_number among Done
/// appointments, i.e. the last patient advanced past. 0 before the queue
/// starts moving.
pub fn current_serving(appointments: &[AppointmentRow]) -> i32 {
    appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Done)
        .map(|a| a.queue_number)
        .max()
        .unwrap_or(0)
}

/// Head of the queue: lowest queue_number still in a non-terminal state.
/// This is the appointment "Next Patient" will mark Done.
pub fn head(appointments: &[AppointmentRow]) -> Option<&AppointmentRow> {
    appointments
        .iter()
        .filter(|a| !a.status.is_terminal())
        .min_by_key(|a| a.queue_number)
}

/// The appointment that becomes head once the current head is served.
pub fn next_after_head(appointments: &[AppointmentRow]) -> Option<&AppointmentRow> {
    let head_no = head(appointments)?.queue_number;
    appointments
        .iter()
        .filter(|a| !a.status.is_terminal() && a.queue_number > head_no)
        .min_by_key(|a| a.queue_number)
}

/// Completion progress for the doctor dashboard.
pub fn progress(appointments: &[AppointmentRow]) -> (usize, usize) {
    let done = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Done)
        .count();
    (done, appointments.len())
}

/// Where a patient stands relative to the serving pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum QueuePosition {
    /// Nobody has been served yet.
    NotStarted,
    /// The serving pointer has moved past this queue number.
    Passed,
    /// This patient is up next.
    Next,
    Waiting { patients_ahead: i32 },
}

/// Classify `queue_number` against `serving` (see [`current_serving`]).
pub fn project(queue_number: i32, serving: i32) -> QueuePosition {
    if serving == 0 {
        QueuePosition::NotStarted
    } else if queue_number <= serving {
        QueuePosition::Passed
    } else if queue_number == serving + 1 {
        QueuePosition::Next
    } else {
        QueuePosition::Waiting {
            patients_ahead: queue_number - serving - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn appt(queue_number: i32, status: AppointmentStatus) -> AppointmentRow {
        AppointmentRow {
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            visit_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            queue_number,
            status,
            slot_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_current_serving_is_max_done() {
        use AppointmentStatus::*;
        let q = vec![appt(1, Done), appt(2, Done), appt(3, Confirmed)];
        assert_eq!(current_serving(&q), 2);
    }

    #[test]
    fn test_current_serving_defaults_to_zero() {
        use AppointmentStatus::*;
        assert_eq!(current_serving(&[]), 0);
        let q = vec![appt(1, Confirmed), appt(2, Waiting)];
        assert_eq!(current_serving(&q), 0);
    }

    #[test]
    fn test_current_serving_ignores_absent() {
        use AppointmentStatus::*;
        let q = vec![appt(1, Absent), appt(2, Done), appt(3, Absent)];
        assert_eq!(current_serving(&q), 2);
    }

    #[test]
    fn test_head_skips_terminal_states() {
        use AppointmentStatus::*;
        let q = vec![appt(1, Done), appt(2, Absent), appt(3, Waiting), appt(4, Confirmed)];
        assert_eq!(head(&q).unwrap().queue_number, 3);
        assert_eq!(next_after_head(&q).unwrap().queue_number, 4);
    }

    #[test]
    fn test_head_on_empty_queue() {
        use AppointmentStatus::*;
        assert!(head(&[]).is_none());
        let all_done = vec![appt(1, Done), appt(2, Done)];
        assert!(head(&all_done).is_none());
        assert!(next_after_head(&all_done).is_none());
    }

    #[test]
    fn test_head_with_cancellation_gap() {
        use AppointmentStatus::*;
        // #2 was cancelled (row deleted); survivors keep their numbers.
        let q = vec![appt(1, Done), appt(3, Confirmed)];
        assert_eq!(current_serving(&q), 1);
        assert_eq!(head(&q).unwrap().queue_number, 3);
        assert!(next_after_head(&q).is_none());
    }

    #[test]
    fn test_project_not_started() {
        assert_eq!(project(1, 0), QueuePosition::NotStarted);
        assert_eq!(project(7, 0), QueuePosition::NotStarted);
    }

    #[test]
    fn test_project_passed_next_waiting() {
        assert_eq!(project(2, 2), QueuePosition::Passed);
        assert_eq!(project(1, 2), QueuePosition::Passed);
        assert_eq!(project(3, 2), QueuePosition::Next);
        assert_eq!(project(6, 2), QueuePosition::Waiting { patients_ahead: 3 });
    }

    #[test]
    fn test_project_is_pure() {
        // Same inputs, same answer: polling twice with no mutation in
        // between cannot disagree with itself.
        assert_eq!(project(5, 3), project(5, 3));
    }

    #[test]
    fn test_progress() {
        use AppointmentStatus::*;
        let q = vec![appt(1, Done), appt(2, Done), appt(3, Confirmed)];
        assert_eq!(progress(&q), (2, 3));
        assert_eq!(progress(&[]), (0, 0));
    }
}
