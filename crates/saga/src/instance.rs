//! Per-request saga instance.

use common::{OrderId, ProductId, UserId};
use domain::{Money, OrderDraft, PricedLineItem};

use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::state::SagaState;

/// A stock decrement that was applied and must be undone on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// State of one order-creation attempt.
///
/// Created per request and owned by exactly one task. Tracks the draft
/// order, every reservation applied so far and a journal of what happened.
#[derive(Debug, Clone)]
pub struct SagaInstance {
    state: SagaState,
    draft: OrderDraft,
    reservations: Vec<Reservation>,
    transaction_id: Option<String>,
    failure: Option<SagaError>,
    journal: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Starts a new saga for the user with a pre-assigned order id.
    pub fn new(order_id: OrderId, user_id: UserId) -> Self {
        Self {
            state: SagaState::Started,
            draft: OrderDraft::new(order_id, user_id),
            reservations: Vec::new(),
            transaction_id: None,
            failure: None,
            journal: Vec::new(),
        }
    }

    /// Moves to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: SagaState) -> Result<(), SagaError> {
        if !self.state.can_transition_to(next) {
            return Err(SagaError::Internal(format!(
                "illegal saga transition {} -> {next}",
                self.state
            )));
        }
        tracing::info!(
            order_id = %self.order_id(),
            from = %self.state,
            to = %next,
            "saga transition"
        );
        self.journal.push(SagaEvent::transitioned(self.state, next));
        self.state = next;
        Ok(())
    }

    /// Adds a priced line to the draft.
    pub fn add_item(&mut self, item: PricedLineItem) -> Result<(), SagaError> {
        self.draft
            .push(item)
            .map_err(|e| SagaError::InvalidCart(e.to_string()))
    }

    /// Records a stock decrement that succeeded.
    pub fn record_reservation(&mut self, product_id: ProductId, quantity: u32) {
        self.journal
            .push(SagaEvent::stock_reserved(product_id.clone(), quantity));
        self.reservations.push(Reservation {
            product_id,
            quantity,
        });
    }

    /// Records that a reservation was undone.
    pub fn record_restored(&mut self, reservation: &Reservation) {
        self.journal.push(SagaEvent::stock_restored(
            reservation.product_id.clone(),
            reservation.quantity,
        ));
    }

    /// Records that a reservation could not be undone.
    pub fn record_compensation_failure(&mut self, reservation: &Reservation, error: &str) {
        self.journal.push(SagaEvent::compensation_failed(
            reservation.product_id.clone(),
            reservation.quantity,
            error,
        ));
    }

    /// Records the captured payment.
    pub fn record_payment(&mut self, transaction_id: String) {
        self.journal
            .push(SagaEvent::payment_captured(&transaction_id, self.draft.total()));
        self.transaction_id = Some(transaction_id);
    }

    /// Notes that the inline cart clear failed.
    pub fn record_cart_clear_deferred(&mut self, reason: &str) {
        self.journal.push(SagaEvent::cart_clear_deferred(reason));
    }

    /// Takes the applied reservations, most recent first, for compensation.
    pub fn take_reservations_for_compensation(&mut self) -> Vec<Reservation> {
        let mut reservations = std::mem::take(&mut self.reservations);
        reservations.reverse();
        reservations
    }

    /// Marks the saga as failed with the given error.
    pub fn fail(&mut self, error: &SagaError) -> Result<(), SagaError> {
        self.transition(SagaState::Failed)?;
        self.journal.push(SagaEvent::saga_failed(error.to_string()));
        self.failure = Some(error.clone());
        Ok(())
    }

    pub fn order_id(&self) -> OrderId {
        self.draft.order_id()
    }

    pub fn user_id(&self) -> &UserId {
        self.draft.user_id()
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn draft(&self) -> &OrderDraft {
        &self.draft
    }

    pub fn total(&self) -> Money {
        self.draft.total()
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn failure(&self) -> Option<&SagaError> {
        self.failure.as_ref()
    }

    pub fn journal(&self) -> &[SagaEvent] {
        &self.journal
    }
}
