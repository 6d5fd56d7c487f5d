//! VMR Reconciliation Engine
//!
//! The VMR engine reconciles vending-machine order records gathered from several mutually inconsistent sources (the
//! machine-side order log, the internal accounting export, tax-authority fiscal receipts and payment-gateway
//! settlement files) into a single canonical Order per transaction, classified by how completely it was corroborated.
//!
//! The library is divided into three main sections:
//! 1. Ingestion ([`mod@schema`] and [`mod@sources`]). Schema detection maps arbitrary spreadsheet headers onto
//!    canonical field names for each supported source kind; the source records then normalize raw cell values into
//!    typed records, dropping rows that cannot be used.
//! 2. Storage ([`SqliteDatabase`] and the [`ReconciliationDatabase`] trait). The order store holds the canonical
//!    table of merged Orders, keyed by `(order_number, machine_code)`, with upsert-merge semantics that never let an
//!    absent value clobber a populated one. You should never need to access the database directly; use the public
//!    API instead.
//! 3. The reconciliation API ([`ReconciliationApi`]). This drives the per-source matching stages, the final status
//!    classification and the statistics roll-up consumed by dashboards.
//!
//! The engine also emits events when orders are reclassified or a batch completes. A simple actor framework lets
//! callers hook into these events without the engine knowing anything about notification delivery.
mod db;

pub mod classify;
pub mod db_types;
pub mod events;
pub mod matching;
pub mod schema;
pub mod sources;

mod recon_api;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, SqliteDatabase};
pub use db::traits::{ReconDbError, ReconciliationDatabase, StatusCount, UnmatchedCount};
pub use recon_api::{errors::ReconApiError, order_objects, recon_flow_api::ReconciliationApi};
