//! Typed source records and the cell-level normalization that produces them.
//!
//! The caller owns file decoding; the engine receives each row as a map of header → raw cell text. The conversions
//! here turn those rows into per-kind records, dropping rows that cannot be used. A dropped row is counted by the
//! ingest flow, never raised as an error.

mod enrichment;
mod fiscal;
mod gateway;
mod primary;

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
pub use enrichment::EnrichmentRecord;
pub use fiscal::FiscalRecord;
pub use gateway::GatewayRecord;
pub use primary::PrimaryRecord;
use thiserror::Error;
use vmr_common::Som;

use crate::{db_types::PaymentType, schema::FieldMapping};

/// One decoded spreadsheet row: original header → raw cell text.
pub type RawRow = HashMap<String, String>;

/// Why a row was dropped during normalization. Local and recovered: the ingest flow counts these and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row has no usable order number")]
    MissingKey,
    #[error("required timestamp '{0}' is missing or unparseable")]
    MissingTimestamp(&'static str),
    #[error("amount field '{0}' is missing, non-positive or unparseable")]
    BadAmount(&'static str),
}

/// Datetime formats tried in order; the first successful parse wins. ISO first, then the day-first and month-first
/// variants seen in upstream exports, then bare dates.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

/// Parse a cell as a timestamp. Unparseable values yield `None` (field absent, not an error).
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a cell as a som amount. Strips space/NBSP thousands separators and accepts a comma decimal mark.
pub fn parse_amount(raw: &str) -> Option<Som> {
    let cleaned: String =
        raw.trim().chars().filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'').collect();
    if cleaned.is_empty() {
        return None;
    }
    let cleaned = cleaned.replace(',', ".");
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(Som::from_tiyin((value * 100.0).round() as i64))
}

/// Normalize free-text payment labels into the canonical enum. Unseen gateways are always card-like, so anything
/// unrecognized is treated as a custom payment rather than an error.
pub fn normalize_payment_type(raw: &str) -> PaymentType {
    let label = raw.trim().to_lowercase();
    if label.is_empty() {
        return PaymentType::Unknown;
    }
    if label.contains("cash") || label.contains("наличн") {
        PaymentType::Cash
    } else if label.contains("custom") || label.contains("кастом") {
        PaymentType::CustomPayment
    } else if label.contains("test") || label.contains("тест") {
        PaymentType::Test
    } else if label.contains("vip") {
        PaymentType::Vip
    } else {
        PaymentType::CustomPayment
    }
}

/// Fetch a mapped cell, trimmed. Blank cells and pandas-style `nan` placeholders read as absent.
pub(crate) fn cell<'a>(row: &'a RawRow, mapping: &FieldMapping, field: &str) -> Option<&'a str> {
    let header = mapping.get(field)?;
    let value = row.get(header)?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(value)
}

pub(crate) fn cell_string(row: &RawRow, mapping: &FieldMapping, field: &str) -> Option<String> {
    cell(row, mapping, field).map(str::to_string)
}

pub(crate) fn cell_datetime(row: &RawRow, mapping: &FieldMapping, field: &str) -> Option<NaiveDateTime> {
    cell(row, mapping, field).and_then(parse_datetime)
}

pub(crate) fn cell_amount(row: &RawRow, mapping: &FieldMapping, field: &str) -> Option<Som> {
    cell(row, mapping, field).and_then(parse_amount)
}

pub(crate) fn cell_int(row: &RawRow, mapping: &FieldMapping, field: &str) -> Option<i64> {
    cell(row, mapping, field).and_then(|v| v.parse::<f64>().ok()).map(|v| v as i64)
}

/// The verbatim row, retained as the provenance slot for the produced record.
pub(crate) fn raw_payload(row: &RawRow) -> serde_json::Value {
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}
