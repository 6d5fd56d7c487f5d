use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use chrono::NaiveDateTime;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;
use vmr_common::Som;

//--------------------------------------     OrderNumber       -------------------------------------------------------
/// The free-text order number assigned by the source system. Only unique together with the machine code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       OrderKey        -------------------------------------------------------
/// The natural key of an order: `(order_number, machine_code)`. De-duplication identity for the order store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub order_number: OrderNumber,
    pub machine_code: String,
}

impl OrderKey {
    pub fn new<O: Into<OrderNumber>, M: Into<String>>(order_number: O, machine_code: M) -> Self {
        Self { order_number: order_number.into(), machine_code: machine_code.into() }
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.order_number, self.machine_code)
    }
}

//--------------------------------------      SourceKind       -------------------------------------------------------
/// The six kinds of input file the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
pub enum SourceKind {
    /// The machine-side order log. Forms the base identity of every order.
    PrimaryLog,
    /// The internal accounting export corroborating primary orders.
    Enrichment,
    /// Tax-authority receipts proving cash payments.
    FiscalReceipt,
    GatewayPayme,
    GatewayClick,
    GatewayUzum,
}

impl SourceKind {
    pub fn is_gateway(&self) -> bool {
        self.gateway_provider().is_some()
    }

    pub fn gateway_provider(&self) -> Option<GatewayProvider> {
        match self {
            SourceKind::GatewayPayme => Some(GatewayProvider::Payme),
            SourceKind::GatewayClick => Some(GatewayProvider::Click),
            SourceKind::GatewayUzum => Some(GatewayProvider::Uzum),
            _ => None,
        }
    }

    /// The histogram status under which an unmatched record of this kind is reported.
    pub fn only_status(&self) -> MatchStatus {
        match self {
            SourceKind::PrimaryLog => MatchStatus::PrimaryOnly,
            SourceKind::Enrichment => MatchStatus::EnrichmentOnly,
            SourceKind::FiscalReceipt => MatchStatus::FiscalOnly,
            SourceKind::GatewayPayme => MatchStatus::PaymeOnly,
            SourceKind::GatewayClick => MatchStatus::ClickOnly,
            SourceKind::GatewayUzum => MatchStatus::UzumOnly,
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::PrimaryLog => write!(f, "PrimaryLog"),
            SourceKind::Enrichment => write!(f, "Enrichment"),
            SourceKind::FiscalReceipt => write!(f, "FiscalReceipt"),
            SourceKind::GatewayPayme => write!(f, "GatewayPayme"),
            SourceKind::GatewayClick => write!(f, "GatewayClick"),
            SourceKind::GatewayUzum => write!(f, "GatewayUzum"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid source kind: {0}")]
pub struct SourceKindConversionError(String);

impl FromStr for SourceKind {
    type Err = SourceKindConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PrimaryLog" => Ok(Self::PrimaryLog),
            "Enrichment" => Ok(Self::Enrichment),
            "FiscalReceipt" => Ok(Self::FiscalReceipt),
            "GatewayPayme" => Ok(Self::GatewayPayme),
            "GatewayClick" => Ok(Self::GatewayClick),
            "GatewayUzum" => Ok(Self::GatewayUzum),
            s => Err(SourceKindConversionError(s.to_string())),
        }
    }
}

//--------------------------------------    GatewayProvider     ------------------------------------------------------
/// The card/wallet settlement providers whose files corroborate non-cash orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum GatewayProvider {
    Payme,
    Click,
    Uzum,
}

impl GatewayProvider {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            GatewayProvider::Payme => SourceKind::GatewayPayme,
            GatewayProvider::Click => SourceKind::GatewayClick,
            GatewayProvider::Uzum => SourceKind::GatewayUzum,
        }
    }
}

impl Display for GatewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayProvider::Payme => write!(f, "Payme"),
            GatewayProvider::Click => write!(f, "Click"),
            GatewayProvider::Uzum => write!(f, "Uzum"),
        }
    }
}

//--------------------------------------      PaymentType       ------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentType {
    /// Coins and notes. Must be corroborated by a fiscal receipt.
    Cash,
    /// Any card/wallet payment. Must be corroborated by a gateway settlement.
    CustomPayment,
    /// Engineering test shipments.
    Test,
    /// Complimentary orders.
    Vip,
    Unknown,
}

impl Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentType::Cash => write!(f, "Cash"),
            PaymentType::CustomPayment => write!(f, "CustomPayment"),
            PaymentType::Test => write!(f, "Test"),
            PaymentType::Vip => write!(f, "Vip"),
            PaymentType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<String> for PaymentType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment type: {value}. But this conversion cannot fail. Defaulting to Unknown");
            PaymentType::Unknown
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment type: {0}")]
pub struct PaymentTypeConversionError(String);

impl FromStr for PaymentType {
    type Err = PaymentTypeConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(Self::Cash),
            "CustomPayment" => Ok(Self::CustomPayment),
            "Test" => Ok(Self::Test),
            "Vip" | "VIP" => Ok(Self::Vip),
            "Unknown" => Ok(Self::Unknown),
            s => Err(PaymentTypeConversionError(s.to_string())),
        }
    }
}

//--------------------------------------      MatchStatus       ------------------------------------------------------
/// The terminal classification of an order's corroboration completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
pub enum MatchStatus {
    /// Only the machine log has seen this order.
    PrimaryOnly,
    /// Only the accounting export has seen this order. A corroboration gap worth flagging.
    EnrichmentOnly,
    /// Orphaned receipt/settlement rows, reported in the histogram only.
    FiscalOnly,
    PaymeOnly,
    ClickOnly,
    UzumOnly,
    /// Machine log and accounting export agree; payment-side corroboration still pending or not applicable.
    Matched,
    /// Everything that should corroborate this order does.
    FullyMatched,
    /// Cash order with no matching fiscal receipt.
    FiscalMismatch,
    /// Non-cash order with no matching gateway settlement.
    GatewayMismatch,
    /// The accounting event fell outside the order's time window. Terminal; kept for operator review.
    TimeOutOfRange,
    /// The sources disagree on the amount. Terminal; kept for operator review.
    PriceMismatch,
}

impl MatchStatus {
    /// Statuses that are never re-derived by the classifier.
    pub fn is_terminal_mismatch(&self) -> bool {
        matches!(self, MatchStatus::TimeOutOfRange | MatchStatus::PriceMismatch)
    }
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::PrimaryOnly => write!(f, "PrimaryOnly"),
            MatchStatus::EnrichmentOnly => write!(f, "EnrichmentOnly"),
            MatchStatus::FiscalOnly => write!(f, "FiscalOnly"),
            MatchStatus::PaymeOnly => write!(f, "PaymeOnly"),
            MatchStatus::ClickOnly => write!(f, "ClickOnly"),
            MatchStatus::UzumOnly => write!(f, "UzumOnly"),
            MatchStatus::Matched => write!(f, "Matched"),
            MatchStatus::FullyMatched => write!(f, "FullyMatched"),
            MatchStatus::FiscalMismatch => write!(f, "FiscalMismatch"),
            MatchStatus::GatewayMismatch => write!(f, "GatewayMismatch"),
            MatchStatus::TimeOutOfRange => write!(f, "TimeOutOfRange"),
            MatchStatus::PriceMismatch => write!(f, "PriceMismatch"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid match status: {0}")]
pub struct MatchStatusConversionError(String);

impl FromStr for MatchStatus {
    type Err = MatchStatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PrimaryOnly" => Ok(Self::PrimaryOnly),
            "EnrichmentOnly" => Ok(Self::EnrichmentOnly),
            "FiscalOnly" => Ok(Self::FiscalOnly),
            "PaymeOnly" => Ok(Self::PaymeOnly),
            "ClickOnly" => Ok(Self::ClickOnly),
            "UzumOnly" => Ok(Self::UzumOnly),
            "Matched" => Ok(Self::Matched),
            "FullyMatched" => Ok(Self::FullyMatched),
            "FiscalMismatch" => Ok(Self::FiscalMismatch),
            "GatewayMismatch" => Ok(Self::GatewayMismatch),
            "TimeOutOfRange" => Ok(Self::TimeOutOfRange),
            "PriceMismatch" => Ok(Self::PriceMismatch),
            s => Err(MatchStatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for MatchStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid match status: {value}. But this conversion cannot fail. Defaulting to PrimaryOnly");
            MatchStatus::PrimaryOnly
        })
    }
}

//--------------------------------------         Order          ------------------------------------------------------
/// The canonical, merged view of one real-world transaction.
///
/// Created on first sighting from any source, mutated by each matching stage, never deleted. The raw row from each
/// contributing source is retained verbatim in the `*_data` slots for audit; the engine never queries those
/// structurally.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub machine_code: String,
    pub creation_time: Option<NaiveDateTime>,
    pub paying_time: Option<NaiveDateTime>,
    pub brewing_time: Option<NaiveDateTime>,
    pub delivery_time: Option<NaiveDateTime>,
    pub refund_time: Option<NaiveDateTime>,
    pub event_time: Option<NaiveDateTime>,
    pub fiscal_time: Option<NaiveDateTime>,
    pub gateway_time: Option<NaiveDateTime>,
    /// The authoritative amount, set by the machine log. Write-once: no later upsert may change it.
    pub order_price: Option<Som>,
    pub fiscal_amount: Option<Som>,
    /// Gross settlement amount as reported by the gateway. Commission is never deducted before comparison.
    pub gateway_amount: Option<Som>,
    pub bonus_amount: Option<Som>,
    pub cashback_amount: Option<Som>,
    pub goods_name: Option<String>,
    pub goods_id: Option<String>,
    pub taste_name: Option<String>,
    pub address: Option<String>,
    pub machine_category: Option<String>,
    pub username: Option<String>,
    pub payment_type: PaymentType,
    /// The raw source label the payment type was derived from, kept pre-normalization.
    pub order_resource: Option<String>,
    pub payment_gateway: Option<GatewayProvider>,
    pub fiscal_check_number: Option<String>,
    pub taxpayer_id: Option<String>,
    pub cash_register_id: Option<String>,
    pub shift_number: Option<i64>,
    pub receipt_type: Option<String>,
    pub transaction_id: Option<String>,
    pub card_number: Option<String>,
    pub merchant_id: Option<String>,
    pub terminal_id: Option<String>,
    pub service_id: Option<String>,
    pub shop_id: Option<String>,
    pub gateway_status: Option<String>,
    pub fiscal_matched: bool,
    pub gateway_matched: bool,
    pub matched_sources: Json<BTreeSet<SourceKind>>,
    pub match_status: MatchStatus,
    pub mismatch_details: Option<String>,
    pub primary_data: Option<Json<serde_json::Value>>,
    pub enrichment_data: Option<Json<serde_json::Value>>,
    pub fiscal_data: Option<Json<serde_json::Value>>,
    pub gateway_data: Option<Json<serde_json::Value>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub classified_at: Option<NaiveDateTime>,
}

impl Order {
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.order_number.clone(), self.machine_code.clone())
    }

    pub fn has_source(&self, kind: SourceKind) -> bool {
        self.matched_sources.0.contains(&kind)
    }

    pub fn sources(&self) -> &BTreeSet<SourceKind> {
        &self.matched_sources.0
    }

    /// The source set extended with `kind`, ready to be written back on a merge.
    pub fn sources_with(&self, kind: SourceKind) -> BTreeSet<SourceKind> {
        let mut set = self.matched_sources.0.clone();
        set.insert(kind);
        set
    }
}
