//! Negotiation state machine states.

use std::fmt;

/// Lifecycle of a bus.
///
/// ```text
/// [Negotiating] ──ready──> [Ready]
///       │                     │
///       └──── destroy() ──────┴──> [Destroyed]
/// ```
///
/// There are no reverse transitions; a failed negotiation stays in
/// `Negotiating` until the owner destroys the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Handshake in progress (or failed and awaiting teardown)
    Negotiating,
    /// Identities resolved, session channel usable
    Ready,
    /// Torn down (terminal)
    Destroyed,
}

impl NegotiationState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition(self, next: NegotiationState) -> bool {
        matches!(
            (self, next),
            (Self::Negotiating, Self::Ready)
                | (Self::Negotiating | Self::Ready, Self::Destroyed)
        )
    }

    /// True once the bus is torn down
    pub fn is_terminal(self) -> bool {
        self == Self::Destroyed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Negotiating => "negotiating",
            Self::Ready => "ready",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use NegotiationState::*;

        assert!(Negotiating.can_transition(Ready));
        assert!(Negotiating.can_transition(Destroyed));
        assert!(Ready.can_transition(Destroyed));

        assert!(!Ready.can_transition(Negotiating));
        assert!(!Destroyed.can_transition(Ready));
        assert!(!Destroyed.can_transition(Negotiating));
        assert!(!Destroyed.can_transition(Destroyed));
    }

    #[test]
    fn test_terminal() {
        assert!(NegotiationState::Destroyed.is_terminal());
        assert!(!NegotiationState::Ready.is_terminal());
    }
}
