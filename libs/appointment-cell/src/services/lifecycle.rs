// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use shared_models::auth::User;

use crate::models::{Appointment, AppointmentAction, AppointmentError, AppointmentStatus, PartyRole};

const ALL_ACTIONS: [AppointmentAction; 5] = [
    AppointmentAction::Accept,
    AppointmentAction::Reject,
    AppointmentAction::Cancel,
    AppointmentAction::Reschedule,
    AppointmentAction::Finish,
];

/// The transition table. `None` means the action is illegal in that state.
pub fn next_status(current: AppointmentStatus, action: AppointmentAction) -> Option<AppointmentStatus> {
    use AppointmentAction::*;
    use AppointmentStatus::*;

    match (current, action) {
        (Pending, Accept) => Some(Accepted),
        (Pending, Reject) => Some(Rejected),
        (Pending | Accepted, Cancel) => Some(Canceled),
        (Pending | Accepted, Reschedule) => Some(Pending),
        (Accepted, Finish) => Some(Finished),
        _ => None,
    }
}

pub fn transition(
    current: AppointmentStatus,
    action: AppointmentAction,
) -> Result<AppointmentStatus, AppointmentError> {
    match next_status(current, action) {
        Some(next) => {
            debug!("Status transition {} --{}--> {}", current, action, next);
            Ok(next)
        }
        None => {
            warn!("Invalid status transition attempted: {} on {}", action, current);
            Err(AppointmentError::InvalidStatusTransition { from: current, action })
        }
    }
}

pub fn valid_actions(current: AppointmentStatus) -> Vec<AppointmentAction> {
    ALL_ACTIONS
        .into_iter()
        .filter(|action| next_status(current, *action).is_some())
        .collect()
}

/// Resolves which side `caller` acts for and checks the actor rules:
/// accept and reject belong to the counterparty of the initiator, finish to
/// the therapist, cancel and reschedule to either side. Admins act for the
/// side given in `acting_role`, defaulting to the one the action needs.
pub fn authorize(
    appointment: &Appointment,
    caller: &User,
    action: AppointmentAction,
    acting_role: Option<PartyRole>,
) -> Result<PartyRole, AppointmentError> {
    let responder = appointment.initiator_role.counterparty();

    let actor = if caller.is_admin() {
        acting_role.unwrap_or(match action {
            AppointmentAction::Finish => PartyRole::Therapist,
            _ => responder,
        })
    } else {
        appointment.party_role(&caller.username).ok_or_else(|| {
            AppointmentError::Unauthorized(format!(
                "{} is not a party to this appointment",
                caller.username
            ))
        })?
    };

    match action {
        AppointmentAction::Accept | AppointmentAction::Reject if actor != responder => {
            Err(AppointmentError::Unauthorized(format!(
                "only the {} can {} this appointment",
                responder, action
            )))
        }
        AppointmentAction::Finish if actor != PartyRole::Therapist => Err(AppointmentError::Unauthorized(
            "only the therapist can finish this appointment".to_string(),
        )),
        _ => Ok(actor),
    }
}

/// Session notes are written by the appointment's therapist or an admin.
pub fn authorize_notes(appointment: &Appointment, caller: &User) -> Result<(), AppointmentError> {
    if caller.is_admin() || appointment.therapist_username == caller.username {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized(
            "only the therapist can manage session notes".to_string(),
        ))
    }
}

/// Accepted sessions are finished once their full duration has elapsed.
pub fn should_auto_finish(appointment: &Appointment, now: NaiveDateTime, duration_minutes: u32) -> bool {
    appointment.status == AppointmentStatus::Accepted && appointment.ends_at(duration_minutes) <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared_models::auth::UserRole;
    use shared_models::scheduling::SessionType;

    fn appointment(initiator: PartyRole) -> Appointment {
        Appointment::new(
            "amna",
            "drsara",
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            "2:00 PM".parse().unwrap(),
            SessionType::Online,
            initiator,
        )
    }

    fn user(username: &str, role: UserRole) -> User {
        User {
            username: username.to_string(),
            email: None,
            role,
            created_at: None,
        }
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for status in [AppointmentStatus::Rejected, AppointmentStatus::Canceled, AppointmentStatus::Finished] {
            assert!(valid_actions(status).is_empty(), "{} should be terminal", status);
        }
        assert_eq!(
            valid_actions(AppointmentStatus::Accepted),
            vec![AppointmentAction::Cancel, AppointmentAction::Reschedule, AppointmentAction::Finish]
        );
    }

    #[test]
    fn reschedule_always_lands_in_pending() {
        assert_eq!(transition(AppointmentStatus::Pending, AppointmentAction::Reschedule).unwrap(), AppointmentStatus::Pending);
        assert_eq!(transition(AppointmentStatus::Accepted, AppointmentAction::Reschedule).unwrap(), AppointmentStatus::Pending);
        assert!(transition(AppointmentStatus::Finished, AppointmentAction::Reschedule).is_err());
    }

    #[test]
    fn only_the_counterparty_accepts() {
        let appt = appointment(PartyRole::Patient);

        assert!(authorize(&appt, &user("amna", UserRole::Patient), AppointmentAction::Accept, None).is_err());
        assert_eq!(
            authorize(&appt, &user("drsara", UserRole::Therapist), AppointmentAction::Accept, None).unwrap(),
            PartyRole::Therapist
        );
        assert!(authorize(&appt, &user("bilal", UserRole::Patient), AppointmentAction::Cancel, None).is_err());
    }

    #[test]
    fn admin_defaults_to_the_needed_side() {
        let appt = appointment(PartyRole::Therapist);
        let admin = user("ops", UserRole::Admin);

        assert_eq!(authorize(&appt, &admin, AppointmentAction::Accept, None).unwrap(), PartyRole::Patient);
        assert_eq!(authorize(&appt, &admin, AppointmentAction::Finish, None).unwrap(), PartyRole::Therapist);
        assert!(authorize(&appt, &admin, AppointmentAction::Reject, Some(PartyRole::Therapist)).is_err());
    }

    #[test]
    fn auto_finish_waits_for_the_session_to_end() {
        let mut appt = appointment(PartyRole::Patient);
        appt.status = AppointmentStatus::Accepted;
        let start = appt.starts_at();

        assert!(!should_auto_finish(&appt, start, 60));
        assert!(should_auto_finish(&appt, start + chrono::Duration::minutes(60), 60));

        appt.status = AppointmentStatus::Pending;
        assert!(!should_auto_finish(&appt, start + chrono::Duration::days(1), 60));
    }
}
