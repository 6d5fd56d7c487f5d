use chrono::NaiveDateTime;
use thiserror::Error;
use vmr_common::Som;

use crate::{
    db::traits::data_objects::{StatusCount, UnmatchedCount},
    db_types::{MatchStatus, Order, OrderKey, SourceKind},
    order_objects::OrderQueryFilter,
    sources::{EnrichmentRecord, FiscalRecord, GatewayRecord, PrimaryRecord},
};

/// This trait defines the persistence contract required by the reconciliation engine.
///
/// The store owns conflict resolution: upserts are serialized per natural key inside the backend (a transaction in
/// the SQLite implementation), so independent batches may run concurrently without caller-side locking. All
/// operations are idempotent so an abandoned batch can simply be re-run.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Insert a machine-log record, or merge it into the existing order with the same natural key.
    ///
    /// Merging never lets an absent value clobber a populated one, and `order_price`, once set, is never
    /// overwritten regardless of source ordering. The order's match status is left untouched on merge; the caller
    /// decides whether the source set changed in a way that needs re-evaluation.
    ///
    /// Returns the stored order and `true` when a new row was created.
    async fn upsert_primary(&self, rec: PrimaryRecord) -> Result<(Order, bool), ReconDbError>;

    /// Create an order seen only in the accounting export (status `EnrichmentOnly`).
    async fn insert_enrichment_order(&self, rec: EnrichmentRecord) -> Result<Order, ReconDbError>;

    /// Merge an accepted accounting row into its primary order: enrichment fields, the `Enrichment` source flag and
    /// status `Matched`. Only called after the window and price checks have passed.
    async fn merge_enrichment(&self, id: i64, rec: EnrichmentRecord) -> Result<Order, ReconDbError>;

    /// Overwrite the match status (and optionally the mismatch details) of an order.
    async fn update_match_status(
        &self,
        id: i64,
        status: MatchStatus,
        details: Option<&str>,
    ) -> Result<Order, ReconDbError>;

    async fn fetch_order_by_key(&self, key: &OrderKey) -> Result<Option<Order>, ReconDbError>;

    /// Cash orders not yet corroborated by a receipt whose paying time lies within the tolerance window of
    /// `fiscal_time` and whose price is within the amount tolerance, nearest-in-time first.
    async fn find_fiscal_candidates(
        &self,
        fiscal_time: NaiveDateTime,
        amount: Som,
    ) -> Result<Vec<Order>, ReconDbError>;

    /// Whether this receipt has already been attached to some order. Makes receipt re-ingestion a no-op.
    async fn fiscal_receipt_attached(&self, rec: &FiscalRecord) -> Result<bool, ReconDbError>;

    /// Attach a receipt to a cash order: receipt identifiers, `fiscal_matched` and the source flag.
    async fn attach_fiscal(&self, id: i64, rec: FiscalRecord) -> Result<Order, ReconDbError>;

    /// Custom-payment orders not yet corroborated by a settlement, same window semantics as the fiscal search.
    async fn find_gateway_candidates(
        &self,
        transaction_time: NaiveDateTime,
        amount: Som,
    ) -> Result<Vec<Order>, ReconDbError>;

    /// Whether this settlement has already been attached to some order.
    async fn gateway_settlement_attached(&self, rec: &GatewayRecord) -> Result<bool, ReconDbError>;

    /// Attach a gateway settlement to a custom-payment order: provider, transaction identifiers,
    /// `gateway_matched` and the source flag.
    async fn attach_gateway(&self, id: i64, rec: GatewayRecord) -> Result<Order, ReconDbError>;

    /// Retain a receipt/settlement row that matched no order, verbatim, for audit.
    async fn insert_unmatched(
        &self,
        kind: SourceKind,
        record_time: NaiveDateTime,
        amount: Som,
        payload: serde_json::Value,
    ) -> Result<(), ReconDbError>;

    /// Orders touched since they were last classified (or never classified at all).
    async fn fetch_unclassified(&self) -> Result<Vec<Order>, ReconDbError>;

    /// Stamp the final status decided by the classifier.
    async fn mark_classified(&self, id: i64, status: MatchStatus, details: &str) -> Result<(), ReconDbError>;

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, ReconDbError>;

    async fn status_counts(&self) -> Result<Vec<StatusCount>, ReconDbError>;

    async fn unmatched_counts(&self) -> Result<Vec<UnmatchedCount>, ReconDbError>;

    /// Closes the store connection.
    async fn close(&mut self) -> Result<(), ReconDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconDbError {
    #[error("The order store is unavailable or failed to execute a query: {0}")]
    StoreUnavailable(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderKey),
}

impl From<sqlx::Error> for ReconDbError {
    fn from(e: sqlx::Error) -> Self {
        ReconDbError::StoreUnavailable(e.to_string())
    }
}
