//! State machine trait for phase enums.
//!
//! Gives every client-side component with explicit phases (attachment
//! pipeline, composer) the same way of checking and performing transitions.

use super::ValidationError;

/// Trait for phase enums that represent state machines.
///
/// Implementors list the valid edges; validated transitions come for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for ComposerPhase {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Ready, Sending) | (Sending, Ready))
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Ready => vec![Sending],
///             Sending => vec![Ready],
///         }
///     }
/// }
///
/// let next = ComposerPhase::Ready.transition_to(ComposerPhase::Sending)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
        Bricked,
    }

    impl StateMachine for Door {
        fn can_transition_to(&self, target: &Self) -> bool {
            use Door::*;
            matches!(
                (self, target),
                (Open, Closed) | (Closed, Open) | (Closed, Bricked)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use Door::*;
            match self {
                Open => vec![Closed],
                Closed => vec![Open, Bricked],
                Bricked => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_edge() {
        assert_eq!(Door::Open.transition_to(Door::Closed), Ok(Door::Closed));
    }

    #[test]
    fn transition_to_fails_for_missing_edge() {
        let err = Door::Open.transition_to(Door::Bricked).unwrap_err();
        assert_eq!(err.field(), "state_transition");
    }

    #[test]
    fn terminal_state_has_no_exits() {
        assert!(Door::Bricked.is_terminal());
        assert!(!Door::Closed.is_terminal());
    }
}
