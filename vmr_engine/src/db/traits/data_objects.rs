use sqlx::FromRow;

use crate::db_types::{MatchStatus, SourceKind};

/// One row of the per-status order histogram.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StatusCount {
    pub status: MatchStatus,
    pub count: i64,
}

/// Unmatched audit records grouped by the source kind that produced them.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UnmatchedCount {
    pub kind: SourceKind,
    pub count: i64,
}
