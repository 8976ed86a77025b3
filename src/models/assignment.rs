use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    Failed,
    Compensated,
}

/// Scratch state for one `dispatch` run. Never shared or persisted.
#[derive(Debug, Clone)]
pub struct AssignmentAttempt {
    pub order_id: Uuid,
    pub candidates: Vec<Uuid>,
    pub index: usize,
    pub outcome: AttemptOutcome,
}

impl AssignmentAttempt {
    pub fn new(order_id: Uuid, candidates: Vec<Uuid>) -> Self {
        Self {
            order_id,
            candidates,
            index: 0,
            outcome: AttemptOutcome::Pending,
        }
    }

    pub fn next_candidate(&mut self) -> Option<Uuid> {
        let candidate = self.candidates.get(self.index).copied();
        if candidate.is_some() {
            self.index += 1;
        }
        candidate
    }

    pub fn finish(&mut self, outcome: AttemptOutcome) {
        self.outcome = outcome;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    OrderNotFound,
    OrderChangedConcurrently,
    AdapterUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Assigned { courier_id: Uuid },
    #[serde(rename = "no_courier")]
    NoCourierAvailable,
    /// The order is not in a dispatchable status.
    InvalidTransition { from: OrderStatus },
    Failed { reason: FailureReason },
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Assigned { .. } => "assigned",
            DispatchOutcome::NoCourierAvailable => "no_courier",
            DispatchOutcome::InvalidTransition { .. } => "invalid_transition",
            DispatchOutcome::Failed { .. } => "failed",
        }
    }
}
