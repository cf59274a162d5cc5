//! Finding lifecycle state machine.
//!
//! The transition table is fixed; anything outside it is rejected by the
//! store with [`crate::error::WardError::InvalidTransition`].

use crate::model::FindingStatus;

/// States reachable from `from` in one transition.
pub fn allowed_transitions(from: FindingStatus) -> &'static [FindingStatus] {
    use FindingStatus::*;
    match from {
        Open => &[Acknowledged, Resolved, Suppressed],
        Acknowledged => &[Open, Resolved, Suppressed],
        Resolved => &[Open],
        Suppressed => &[Open],
    }
}

/// Whether `from -> to` is a legal lifecycle transition.
pub fn can_transition(from: FindingStatus, to: FindingStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use FindingStatus::*;

    const ALL: [FindingStatus; 4] = [Open, Acknowledged, Resolved, Suppressed];

    #[test]
    fn transition_table_matches_exactly() {
        let allowed = [
            (Open, Acknowledged),
            (Open, Resolved),
            (Open, Suppressed),
            (Acknowledged, Open),
            (Acknowledged, Resolved),
            (Acknowledged, Suppressed),
            (Resolved, Open),
            (Suppressed, Open),
        ];

        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in ALL {
            assert!(!can_transition(status, status));
        }
    }

    proptest! {
        #[test]
        fn every_state_can_reopen_or_leave_open(idx in 0usize..4) {
            let status = ALL[idx];
            // Open reaches everything else; everything else reaches Open.
            if status == Open {
                prop_assert!(ALL.iter().filter(|s| **s != Open).all(|s| can_transition(Open, *s)));
            } else {
                prop_assert!(can_transition(status, Open));
            }
        }
    }
}
