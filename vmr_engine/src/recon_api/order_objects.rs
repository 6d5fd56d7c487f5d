use std::{collections::BTreeMap, fmt::Display};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db_types::{MatchStatus, OrderNumber, SourceKind};

/// Read-access filter for reporting collaborators. Supports match status, machine code and a date range over
/// `creation_time`; an empty filter returns everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_number: Option<OrderNumber>,
    pub machine_code: Option<String>,
    pub since: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
    pub status: Option<Vec<MatchStatus>>,
}

impl OrderQueryFilter {
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = Some(order_number);
        self
    }

    pub fn with_machine_code<S: Into<String>>(mut self, machine_code: S) -> Self {
        self.machine_code = Some(machine_code.into());
        self
    }

    pub fn since(mut self, since: NaiveDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: MatchStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_number.is_none() &&
            self.machine_code.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(order_number) = &self.order_number {
            write!(f, "order_number: {order_number}. ")?;
        }
        if let Some(machine_code) = &self.machine_code {
            write!(f, "machine_code: {machine_code}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

/// Outcome of one `ingest` call. Row-level failures are counted, never raised, so operators can spot systematic
/// schema drift from the skip counter alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    pub processed: usize,
    pub skipped: usize,
    /// `None` when no source kind recognized the file's headers and the whole file was skipped.
    pub detected: Option<SourceKind>,
}

/// The per-status order histogram returned by `reconcile_batch` and consumed by dashboards and alerting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    pub counts: BTreeMap<MatchStatus, i64>,
    pub total: i64,
}

impl ReconciliationStats {
    pub fn count(&self, status: MatchStatus) -> i64 {
        self.counts.get(&status).copied().unwrap_or_default()
    }
}

impl Display for ReconciliationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} orders", self.total)?;
        for (status, count) in &self.counts {
            write!(f, ", {status}: {count}")?;
        }
        Ok(())
    }
}
