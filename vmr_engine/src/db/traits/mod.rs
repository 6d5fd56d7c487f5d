mod data_objects;
mod recon_db;

pub use data_objects::{StatusCount, UnmatchedCount};
pub use recon_db::{ReconDbError, ReconciliationDatabase};
