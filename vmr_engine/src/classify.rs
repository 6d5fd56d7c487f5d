//! Final status classification.
//!
//! A pure function over an order's accumulated flags, run once per batch after all matching stages. The only
//! configuration is which payment types are exempt from payment-side corroboration; the upstream business rule
//! exempts test shipments and VIP orders, but it is policy, not a constant.

use crate::db_types::{MatchStatus, Order, PaymentType, SourceKind};

/// Payment types that count as fully matched without a fiscal receipt or gateway settlement.
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    exempt_types: Vec<PaymentType>,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self { exempt_types: vec![PaymentType::Test, PaymentType::Vip] }
    }
}

impl ClassifierPolicy {
    pub fn new(exempt_types: Vec<PaymentType>) -> Self {
        Self { exempt_types }
    }

    pub fn is_exempt(&self, payment_type: PaymentType) -> bool {
        self.exempt_types.contains(&payment_type)
    }
}

/// Derive the terminal status for `order` along with an operator-facing explanation.
///
/// `TimeOutOfRange` and `PriceMismatch` were decided by the matching engine and are never re-evaluated here; the
/// order is kept as-is for operator review.
pub fn classify(order: &Order, policy: &ClassifierPolicy) -> (MatchStatus, String) {
    if order.match_status.is_terminal_mismatch() {
        let details = order.mismatch_details.clone().unwrap_or_default();
        return (order.match_status, details);
    }

    let has_primary = order.has_source(SourceKind::PrimaryLog);
    let has_enrichment = order.has_source(SourceKind::Enrichment);

    if has_primary && !has_enrichment {
        return (MatchStatus::PrimaryOnly, "order seen only in the machine log".to_string());
    }
    if has_enrichment && !has_primary {
        return (
            MatchStatus::EnrichmentOnly,
            "order seen only in the accounting export, never on the machine".to_string(),
        );
    }

    if policy.is_exempt(order.payment_type) {
        return (
            MatchStatus::FullyMatched,
            format!("corroboration not required for {} orders", order.payment_type),
        );
    }

    match order.payment_type {
        PaymentType::Cash => {
            if order.fiscal_matched {
                (MatchStatus::FullyMatched, "all sources reconciled".to_string())
            } else {
                (MatchStatus::FiscalMismatch, "cash order without a matching fiscal receipt".to_string())
            }
        },
        PaymentType::CustomPayment => {
            if order.gateway_matched {
                (MatchStatus::FullyMatched, "all sources reconciled".to_string())
            } else {
                (
                    MatchStatus::GatewayMismatch,
                    "custom-payment order without a matching gateway settlement".to_string(),
                )
            }
        },
        _ => (
            MatchStatus::Matched,
            "machine log and accounting export reconciled; no payment-side corroboration applies".to_string(),
        ),
    }
}
