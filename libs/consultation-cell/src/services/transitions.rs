// libs/consultation-cell/src/services/transitions.rs
//! Consultation state machine and per-role action permissions.
//!
//! Two independent tables live here. `TRANSITIONS` answers "may the status move
//! from A to B, and who may move it". `ACTIONS` answers "may this role touch this
//! attribute while the consultation is in this status". Both are plain data so a
//! new role or status is a table edit.

use serde::Serialize;
use tracing::{debug, warn};

use shared_models::auth::Role;

use crate::models::{Action, ConsultationStatus};

use ConsultationStatus::*;

const PATIENT: Role = Role::Patient;
const DOCTOR: Role = Role::Doctor;
const ADMIN: Role = Role::Admin;

/// Edge -> roles permitted to execute it. Terminal states have no outgoing edges.
const TRANSITIONS: &[(ConsultationStatus, ConsultationStatus, &[Role])] = &[
    (Draft, PendingAdminReview, &[PATIENT, ADMIN]),
    (PendingAdminReview, Assigned, &[ADMIN]),
    (PendingAdminReview, Cancelled, &[ADMIN]),
    (Assigned, Confirmed, &[PATIENT]),
    (Assigned, Cancelled, &[PATIENT, ADMIN]),
    (Confirmed, Scheduled, &[DOCTOR, ADMIN]),
    (Confirmed, Cancelled, &[PATIENT, ADMIN]),
    (Scheduled, InProgress, &[DOCTOR]),
    (Scheduled, Cancelled, &[PATIENT, DOCTOR, ADMIN]),
    (InProgress, Completed, &[DOCTOR]),
    (InProgress, Cancelled, &[DOCTOR, ADMIN]),
];

/// (role, status) -> actions that role may perform without necessarily changing status.
const ACTIONS: &[(Role, ConsultationStatus, &[Action])] = &[
    (PATIENT, Draft, &[Action::Cancel]),
    (PATIENT, Assigned, &[Action::Confirm, Action::Cancel]),
    (PATIENT, Confirmed, &[Action::Cancel]),
    (PATIENT, Scheduled, &[Action::Cancel]),
    (DOCTOR, Confirmed, &[Action::Reschedule, Action::UpdateNotes]),
    (
        DOCTOR,
        Scheduled,
        &[Action::Reschedule, Action::Start, Action::Cancel, Action::UpdateNotes, Action::UpdateDuration],
    ),
    (
        DOCTOR,
        InProgress,
        &[Action::Complete, Action::Cancel, Action::UpdateNotes, Action::UpdateDuration],
    ),
    (DOCTOR, Completed, &[Action::UpdateNotes, Action::UpdateDuration]),
    (ADMIN, PendingAdminReview, &[Action::AssignProvider, Action::Cancel]),
    (ADMIN, Assigned, &[Action::AssignProvider, Action::Cancel]),
    (ADMIN, Confirmed, &[Action::AssignProvider, Action::Reschedule, Action::Cancel]),
    (ADMIN, Scheduled, &[Action::Reschedule, Action::Cancel]),
    (ADMIN, InProgress, &[Action::Cancel]),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Unknown consultation status: '{0}'")]
    UnknownStatus(String),

    #[error("Unknown role: '{0}'")]
    UnknownRole(String),

    #[error("Transition from '{from}' to '{to}' is not allowed")]
    NotAllowed {
        from: ConsultationStatus,
        to: ConsultationStatus,
    },

    #[error("Role '{role}' cannot move a consultation from '{from}' to '{to}'; permitted roles: {allowed}")]
    RoleNotPermitted {
        from: ConsultationStatus,
        to: ConsultationStatus,
        role: Role,
        allowed: String,
    },
}

impl TransitionError {
    /// Stable machine-readable code, separating malformed input from rule violations.
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::UnknownStatus(_) => "unknown_status",
            TransitionError::UnknownRole(_) => "unknown_role",
            TransitionError::NotAllowed { .. } => "transition_not_allowed",
            TransitionError::RoleNotPermitted { .. } => "role_not_permitted",
        }
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(self, TransitionError::UnknownStatus(_) | TransitionError::UnknownRole(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Unknown action: '{0}'")]
    UnknownAction(String),

    #[error("Role '{role}' cannot {action} while the consultation is '{status}'")]
    NotPermitted {
        role: Role,
        action: Action,
        status: ConsultationStatus,
    },
}

/// Serializable outcome of the string-level `validate` contract.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    pub code: Option<&'static str>,
}

/// Serializable outcome of the string-level `can_perform` contract.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionResult {
    pub allowed: bool,
    pub error: Option<String>,
}

/// Roles allowed to execute `from -> to`, or `None` when the edge does not exist.
pub fn allowed_roles(from: ConsultationStatus, to: ConsultationStatus) -> Option<&'static [Role]> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, roles)| *roles)
}

/// Validate that `role` may move a consultation from `from` to `to`.
///
/// A no-op transition is always valid so callers can re-save a record idempotently.
pub fn validate_transition(
    from: ConsultationStatus,
    to: ConsultationStatus,
    role: Role,
) -> Result<(), TransitionError> {
    debug!("Validating status transition from {} to {} as {}", from, to, role);

    if from == to {
        return Ok(());
    }

    let roles = allowed_roles(from, to).ok_or_else(|| {
        warn!("Invalid status transition attempted: {} -> {}", from, to);
        TransitionError::NotAllowed { from, to }
    })?;

    if !roles.contains(&role) {
        warn!("Role {} not permitted for transition {} -> {}", role, from, to);
        return Err(TransitionError::RoleNotPermitted {
            from,
            to,
            role,
            allowed: join_roles(roles),
        });
    }

    Ok(())
}

/// String-level contract: parses the inputs, then applies `validate_transition`.
pub fn validate(from: &str, to: &str, role: &str) -> ValidationResult {
    let parsed = (|| {
        let from: ConsultationStatus = from.parse()?;
        let to: ConsultationStatus = to.parse()?;
        let role: Role = role
            .parse()
            .map_err(|_| TransitionError::UnknownRole(role.to_string()))?;
        validate_transition(from, to, role)
    })();

    match parsed {
        Ok(()) => ValidationResult { valid: true, error: None, code: None },
        Err(e) => ValidationResult {
            valid: false,
            code: Some(e.code()),
            error: Some(e.to_string()),
        },
    }
}

/// Statuses `role` may move a consultation to from `from`.
pub fn next_statuses(from: ConsultationStatus, role: Role) -> Vec<ConsultationStatus> {
    TRANSITIONS
        .iter()
        .filter(|(f, _, roles)| *f == from && roles.contains(&role))
        .map(|(_, to, _)| *to)
        .collect()
}

/// Actions `role` may perform while the consultation is in `status`.
pub fn allowed_actions(role: Role, status: ConsultationStatus) -> &'static [Action] {
    ACTIONS
        .iter()
        .find(|(r, s, _)| *r == role && *s == status)
        .map(|(_, _, actions)| *actions)
        .unwrap_or(&[])
}

pub fn check_action(
    status: ConsultationStatus,
    role: Role,
    action: Action,
) -> Result<(), PermissionError> {
    if allowed_actions(role, status).contains(&action) {
        Ok(())
    } else {
        warn!("Role {} attempted {} while consultation is {}", role, action, status);
        Err(PermissionError::NotPermitted { role, action, status })
    }
}

/// String-level contract for the action table.
pub fn can_perform(status: &str, role: &str, action: &str) -> PermissionResult {
    let checked = (|| -> Result<(), String> {
        let status: ConsultationStatus = status.parse().map_err(|e: TransitionError| e.to_string())?;
        let role: Role = role.parse()?;
        let action: Action = action.parse().map_err(|e: PermissionError| e.to_string())?;
        check_action(status, role, action).map_err(|e| e.to_string())
    })();

    match checked {
        Ok(()) => PermissionResult { allowed: true, error: None },
        Err(error) => PermissionResult { allowed: false, error: Some(error) },
    }
}

fn join_roles(roles: &[Role]) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_edge_is_valid_for_its_roles_only() {
        for (from, to, roles) in TRANSITIONS {
            for role in Role::ALL {
                let result = validate_transition(*from, *to, role);
                assert_eq!(result.is_ok(), roles.contains(&role), "{} -> {} as {}", from, to, role);
            }
        }
    }

    #[test]
    fn edges_outside_table_are_rejected_for_everyone() {
        for from in ConsultationStatus::ALL {
            for to in ConsultationStatus::ALL {
                if from == to || allowed_roles(from, to).is_some() {
                    continue;
                }
                for role in Role::ALL {
                    assert_eq!(
                        validate_transition(from, to, role),
                        Err(TransitionError::NotAllowed { from, to })
                    );
                }
            }
        }
    }

    #[test]
    fn self_transition_always_valid() {
        for status in ConsultationStatus::ALL {
            for role in Role::ALL {
                assert!(validate_transition(status, status, role).is_ok());
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Completed, Cancelled] {
            for role in Role::ALL {
                assert!(next_statuses(terminal, role).is_empty());
            }
        }
    }

    #[test]
    fn role_error_names_permitted_roles() {
        let err = validate_transition(Scheduled, InProgress, Role::Patient).unwrap_err();
        assert_eq!(err.code(), "role_not_permitted");
        assert!(err.to_string().contains("permitted roles: doctor"));

        let err = validate_transition(Assigned, Cancelled, Role::Doctor).unwrap_err();
        assert!(err.to_string().contains("patient, admin"));
    }

    #[test]
    fn unknown_inputs_are_distinguished_from_rule_violations() {
        let bad_status = validate("draft", "teleported", "patient");
        assert!(!bad_status.valid);
        assert_eq!(bad_status.code, Some("unknown_status"));

        let bad_role = validate("draft", "pending_admin_review", "nurse");
        assert_eq!(bad_role.code, Some("unknown_role"));

        let disallowed = validate("pending_admin_review", "scheduled", "patient");
        assert_eq!(disallowed.code, Some("transition_not_allowed"));
        let message = disallowed.error.unwrap();
        assert!(message.contains("'pending_admin_review'"));
        assert!(message.contains("'scheduled'"));
    }

    #[test]
    fn action_table_is_independent_of_transitions() {
        // notes while in progress, no status change involved
        assert!(check_action(InProgress, Role::Doctor, Action::UpdateNotes).is_ok());
        // post-completion edits
        assert!(check_action(Completed, Role::Doctor, Action::UpdateDuration).is_ok());
        assert!(check_action(Completed, Role::Admin, Action::Cancel).is_err());
        assert!(check_action(Scheduled, Role::Patient, Action::UpdateNotes).is_err());
    }

    #[test]
    fn can_perform_reports_unknown_action() {
        let result = can_perform("scheduled", "doctor", "teleport");
        assert!(!result.allowed);
        assert!(result.error.unwrap().contains("Unknown action"));

        assert!(can_perform("scheduled", "doctor", "reschedule").allowed);
    }
}
