use crate::{
    db_types::{MatchStatus, Order},
    order_objects::ReconciliationStats,
};

/// Emitted when the classifier moves an order to a different status.
#[derive(Debug, Clone)]
pub struct OrderClassifiedEvent {
    pub order: Order,
    pub previous: MatchStatus,
}

impl OrderClassifiedEvent {
    pub fn new(order: Order, previous: MatchStatus) -> Self {
        Self { order, previous }
    }
}

/// Emitted once per `reconcile_batch` call, carrying the histogram handed back to the caller. Alerting
/// collaborators subscribe to this instead of polling.
#[derive(Debug, Clone)]
pub struct BatchReconciledEvent {
    pub stats: ReconciliationStats,
}

impl BatchReconciledEvent {
    pub fn new(stats: ReconciliationStats) -> Self {
        Self { stats }
    }
}
