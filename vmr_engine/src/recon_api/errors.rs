use thiserror::Error;

use crate::db::traits::ReconDbError;

/// Errors surfaced by the reconciliation API.
///
/// Row- and file-level problems never appear here; they are absorbed into the ingest counters. Only a failing
/// order store is fatal, and a batch interrupted by it can safely be re-run thanks to idempotent upserts.
#[derive(Debug, Error)]
pub enum ReconApiError {
    #[error("order store failure: {0}")]
    DatabaseError(#[from] ReconDbError),
}
