//! L3 system state machine (§4.5.1).

use std::time::Duration;

use crate::errors::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    Uninitialized,
    Initializing,
    Ready,
    Connecting,
    Negotiating,
    DataTransfer,
    Flushing,
    ShuttingDown,
    Terminated,
    Error,
}

impl SystemState {
    /// Per-state deadline (seconds) before the state's recovery action fires.
    pub fn timeout(self) -> Duration {
        match self {
            SystemState::Uninitialized => Duration::from_secs(u64::MAX / 2),
            SystemState::Initializing => Duration::from_secs(10),
            SystemState::Ready => Duration::from_secs(u64::MAX / 2),
            SystemState::Connecting => Duration::from_secs(15),
            SystemState::Negotiating => Duration::from_secs(5),
            SystemState::DataTransfer => Duration::from_secs(u64::MAX / 2),
            SystemState::Flushing => Duration::from_secs(5),
            SystemState::ShuttingDown => Duration::from_secs(5),
            SystemState::Terminated => Duration::from_secs(u64::MAX / 2),
            SystemState::Error => Duration::from_secs(u64::MAX / 2),
        }
    }

    /// The state this one falls back to when its deadline is exceeded.
    pub fn recovery(self) -> Option<SystemState> {
        match self {
            SystemState::Initializing => Some(SystemState::Ready),
            SystemState::Connecting => Some(SystemState::Ready),
            SystemState::Negotiating => Some(SystemState::DataTransfer),
            SystemState::Flushing => Some(SystemState::ShuttingDown),
            SystemState::ShuttingDown => Some(SystemState::Terminated),
            _ => None,
        }
    }

    fn permitted_targets(self) -> &'static [SystemState] {
        use SystemState::*;
        match self {
            Uninitialized => &[Initializing],
            Initializing => &[Ready, Error],
            Ready => &[Connecting, ShuttingDown, Error],
            Connecting => &[Negotiating, DataTransfer, Ready, Error],
            Negotiating => &[DataTransfer, Connecting, Error],
            DataTransfer => &[Flushing, ShuttingDown, Error],
            Flushing => &[Terminated, ShuttingDown, Error],
            ShuttingDown => &[Terminated, Error],
            Terminated => &[],
            Error => &[Ready, ShuttingDown, Terminated],
        }
    }

    pub fn can_transition_to(self, to: SystemState) -> bool {
        self.permitted_targets().contains(&to)
    }

    /// True once entering/leaving this state should flip the Hayes filter's
    /// `in_online_mode` flag (§4.5.1: "Entry/exit of DATA_TRANSFER toggles
    /// hayes_ctx.in_online_mode").
    pub fn is_online(self) -> bool {
        matches!(self, SystemState::DataTransfer)
    }
}

/// Validates and applies a transition, returning the new state or a
/// `BridgeError::InvalidTransition` if §4.5.1 does not permit it.
pub fn transition(from: SystemState, to: SystemState) -> BridgeResult<SystemState> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(BridgeError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permitted_transitions_succeed() {
        assert!(transition(SystemState::Uninitialized, SystemState::Initializing).is_ok());
        assert!(transition(SystemState::Ready, SystemState::Connecting).is_ok());
        assert!(transition(SystemState::DataTransfer, SystemState::Flushing).is_ok());
        assert!(transition(SystemState::Error, SystemState::Ready).is_ok());
    }

    #[test]
    fn forbidden_transitions_are_rejected() {
        let err = transition(SystemState::Ready, SystemState::DataTransfer).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransition { .. }));
    }

    #[test]
    fn no_self_loops_are_permitted() {
        for state in [
            SystemState::Uninitialized,
            SystemState::Initializing,
            SystemState::Ready,
            SystemState::Connecting,
            SystemState::Negotiating,
            SystemState::DataTransfer,
            SystemState::Flushing,
            SystemState::ShuttingDown,
            SystemState::Terminated,
            SystemState::Error,
        ] {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn terminated_is_truly_terminal() {
        assert!(SystemState::Terminated.permitted_targets().is_empty());
    }

    #[test]
    fn data_transfer_is_the_only_online_state() {
        assert!(SystemState::DataTransfer.is_online());
        assert!(!SystemState::Negotiating.is_online());
    }
}
