//! Tolerance windows and the enrichment acceptance check.
//!
//! All four matching stages share the same slack: ±60 seconds on timestamps and one tiyin (0.01 som) on amounts.
//! The helpers here are pure so the window arithmetic can be tested without a database.

use chrono::{Duration, NaiveDateTime};
use vmr_common::Som;

use crate::db_types::Order;

/// Allowed clock skew between two records describing the same transaction.
pub const TIME_TOLERANCE_SECS: i64 = 60;
/// Allowed amount discrepancy between two records describing the same transaction.
pub const AMOUNT_TOLERANCE: Som = Som::from_tiyin(1);
/// Window granted after `creation_time` when the machine never recorded a delivery.
pub const FALLBACK_DELIVERY_WINDOW_SECS: i64 = 600;

pub fn time_tolerance() -> Duration {
    Duration::seconds(TIME_TOLERANCE_SECS)
}

/// The interval an accounting event must fall into to corroborate `order`.
///
/// Runs from `creation_time` to the refund time if there is one, else the delivery time, else ten minutes past
/// creation, padded by the tolerance on both ends. `None` when the order has no creation time at all.
pub fn enrichment_window(order: &Order) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = order.creation_time?;
    let end = order
        .refund_time
        .or(order.delivery_time)
        .unwrap_or(start + Duration::seconds(FALLBACK_DELIVERY_WINDOW_SECS));
    Some((start - time_tolerance(), end + time_tolerance()))
}

pub fn within_amount_tolerance(a: Som, b: Som) -> bool {
    a.abs_diff(b) <= AMOUNT_TOLERANCE
}

/// Result of validating an accounting-export row against its primary order.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Accepted,
    TimeOutOfRange {
        event_time: NaiveDateTime,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    },
    PriceMismatch {
        order_price: Som,
        event_price: Som,
    },
}

impl EnrichmentOutcome {
    /// Operator-facing explanation for the two rejection variants.
    pub fn details(&self) -> Option<String> {
        match self {
            EnrichmentOutcome::Accepted => None,
            EnrichmentOutcome::TimeOutOfRange { event_time, window: Some((start, end)) } => Some(format!(
                "accounting event at {event_time} falls outside the order window {start} to {end}"
            )),
            EnrichmentOutcome::TimeOutOfRange { event_time, window: None } => {
                Some(format!("accounting event at {event_time} cannot be windowed: order has no creation time"))
            },
            EnrichmentOutcome::PriceMismatch { order_price, event_price } => {
                Some(format!("order price {order_price} differs from accounting export price {event_price}"))
            },
        }
    }
}

/// Validate an accounting event against `order`: the event time must fall inside the order's window and the prices
/// must agree to within [`AMOUNT_TOLERANCE`]. The window check runs first, so a row that fails both is reported as
/// out of range.
pub fn evaluate_enrichment(order: &Order, event_time: NaiveDateTime, event_price: Som) -> EnrichmentOutcome {
    match enrichment_window(order) {
        None => EnrichmentOutcome::TimeOutOfRange { event_time, window: None },
        Some((start, end)) => {
            if event_time < start || event_time > end {
                return EnrichmentOutcome::TimeOutOfRange { event_time, window: Some((start, end)) };
            }
            if let Some(order_price) = order.order_price {
                if !within_amount_tolerance(order_price, event_price) {
                    return EnrichmentOutcome::PriceMismatch { order_price, event_price };
                }
            }
            EnrichmentOutcome::Accepted
        },
    }
}
