//! Session state machine - status transitions and validation.

use super::types::{SessionError, SessionStatus};

/// Validates a status transition.
///
/// # Errors
///
/// Returns [`SessionError::InvalidTransition`] if `from -> to` is not allowed.
pub fn validate_transition(from: SessionStatus, to: SessionStatus) -> Result<(), SessionError> {
    use SessionStatus::{Active, Failed, Idle, Starting, Stopping};

    let valid = match (from, to) {
        // A start may follow a clean stop or a failure
        (Idle | Failed, Starting) => true,
        (Starting, Active | Failed) => true,
        // Failed goes through Stopping to clear residue; Idle only during recovery
        (Active | Failed | Idle, Stopping) => true,
        (Stopping, Idle | Failed) => true,
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition { from, to })
    }
}

/// Returns `true` while a session occupies the host.
#[must_use]
pub const fn is_live(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Starting | SessionStatus::Active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::{Active, Failed, Idle, Starting, Stopping};

    const ALL: [SessionStatus; 5] = [Idle, Starting, Active, Stopping, Failed];

    #[test]
    fn allowed_transitions() {
        for (from, to) in [
            (Idle, Starting),
            (Failed, Starting),
            (Starting, Active),
            (Starting, Failed),
            (Active, Stopping),
            (Failed, Stopping),
            (Idle, Stopping),
            (Stopping, Idle),
            (Stopping, Failed),
        ] {
            assert!(validate_transition(from, to).is_ok(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn everything_else_is_rejected() {
        let allowed = 9;
        let rejected = ALL
            .iter()
            .flat_map(|&from| ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| validate_transition(from, to).is_err())
            .count();
        assert_eq!(rejected, ALL.len() * ALL.len() - allowed);
        assert_eq!(
            validate_transition(Active, Starting),
            Err(SessionError::InvalidTransition {
                from: Active,
                to: Starting
            })
        );
    }

    #[test]
    fn live_states() {
        assert!(is_live(Starting));
        assert!(is_live(Active));
        assert!(!is_live(Failed));
    }
}
