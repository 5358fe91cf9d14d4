//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of an order-creation saga.
///
/// State transitions:
/// ```text
/// Started ──► CartFetched ──► Priced ──► StockReserved ──► PaymentCaptured ──► Persisted ──► Completed
///    │             │            │              │                  │
///    │             │            └──────────────┴──► Compensating ─┤
///    └─────────────┴──────────────────────────────────────────────┴──► Failed
/// ```
///
/// `PaymentCaptured` is the commit point. Nothing at or after it is ever
/// compensated; failures there end in `Failed` with reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    #[default]
    Started,
    CartFetched,
    Priced,
    StockReserved,
    PaymentCaptured,
    Persisted,
    /// Cart cleared (or cart clearing handed to the background).
    Completed,
    Compensating,
    Failed,
}

impl SagaState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Started, CartFetched)
            | (CartFetched, Priced)
            | (Priced, StockReserved)
            | (StockReserved, PaymentCaptured)
            | (PaymentCaptured, Persisted)
            | (Persisted, Completed) => true,
            // Partial reservations can exist while still in `Priced`.
            (Priced | StockReserved, Compensating) => true,
            (Compensating, Failed) => true,
            (Started | CartFetched | Priced | StockReserved | PaymentCaptured, Failed) => true,
            _ => false,
        }
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        self.can_transition_to(SagaState::Compensating)
    }

    /// Returns true once payment has been captured.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            SagaState::PaymentCaptured | SagaState::Persisted | SagaState::Completed
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Started => "STARTED",
            SagaState::CartFetched => "CART_FETCHED",
            SagaState::Priced => "PRICED",
            SagaState::StockReserved => "STOCK_RESERVED",
            SagaState::PaymentCaptured => "PAYMENT_CAPTURED",
            SagaState::Persisted => "PERSISTED",
            SagaState::Completed => "COMPLETED",
            SagaState::Compensating => "COMPENSATING",
            SagaState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SagaState; 9] = [
        SagaState::Started,
        SagaState::CartFetched,
        SagaState::Priced,
        SagaState::StockReserved,
        SagaState::PaymentCaptured,
        SagaState::Persisted,
        SagaState::Completed,
        SagaState::Compensating,
        SagaState::Failed,
    ];

    #[test]
    fn test_default_state_is_started() {
        assert_eq!(SagaState::default(), SagaState::Started);
    }

    #[test]
    fn test_happy_path_is_linear() {
        let path = [
            SagaState::Started,
            SagaState::CartFetched,
            SagaState::Priced,
            SagaState::StockReserved,
            SagaState::PaymentCaptured,
            SagaState::Persisted,
            SagaState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!SagaState::Started.can_transition_to(SagaState::Priced));
        assert!(!SagaState::StockReserved.can_transition_to(SagaState::Persisted));
    }

    #[test]
    fn test_nothing_after_commit_is_compensated() {
        for state in ALL.into_iter().filter(SagaState::is_committed) {
            assert!(!state.can_compensate(), "{state} must not compensate");
        }
        assert!(SagaState::Priced.can_compensate());
        assert!(SagaState::StockReserved.can_compensate());
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for state in ALL.into_iter().filter(SagaState::is_terminal) {
            for next in ALL {
                assert!(!state.can_transition_to(next), "{state} -> {next}");
            }
        }
    }

    #[test]
    fn test_persisted_cannot_fail() {
        assert!(!SagaState::Persisted.can_transition_to(SagaState::Failed));
        assert!(SagaState::PaymentCaptured.can_transition_to(SagaState::Failed));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SagaState::StockReserved).unwrap();
        assert_eq!(json, "\"STOCK_RESERVED\"");
        let back: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SagaState::StockReserved);
    }
}
