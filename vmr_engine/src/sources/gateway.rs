use chrono::NaiveDateTime;
use vmr_common::Som;

use super::{cell_amount, cell_datetime, cell_string, raw_payload, RawRow, RowError};
use crate::{db_types::GatewayProvider, schema::FieldMapping};

/// One settlement row from a payment gateway export.
///
/// The amount is the gross order value as reported by the provider. Commission columns, when present, survive only
/// inside the raw payload and are never applied before comparison.
#[derive(Debug, Clone)]
pub struct GatewayRecord {
    pub provider: GatewayProvider,
    pub transaction_time: NaiveDateTime,
    pub amount: Som,
    pub transaction_id: Option<String>,
    pub card_number: Option<String>,
    pub merchant_id: Option<String>,
    pub terminal_id: Option<String>,
    pub service_id: Option<String>,
    pub shop_id: Option<String>,
    pub cashback_amount: Option<Som>,
    pub status: Option<String>,
    pub raw: serde_json::Value,
}

impl GatewayRecord {
    pub fn from_row(row: &RawRow, mapping: &FieldMapping, provider: GatewayProvider) -> Result<Self, RowError> {
        let transaction_time = cell_datetime(row, mapping, "transaction_time")
            .ok_or(RowError::MissingTimestamp("transaction_time"))?;
        let amount =
            cell_amount(row, mapping, "amount").filter(Som::is_positive).ok_or(RowError::BadAmount("amount"))?;
        // Payme and Uzum files call the card column masked_pan, Click calls it card_number.
        let card_number =
            cell_string(row, mapping, "masked_pan").or_else(|| cell_string(row, mapping, "card_number"));
        Ok(Self {
            provider,
            transaction_time,
            amount,
            transaction_id: cell_string(row, mapping, "transaction_id"),
            card_number,
            merchant_id: cell_string(row, mapping, "merchant_id"),
            terminal_id: cell_string(row, mapping, "terminal_id"),
            service_id: cell_string(row, mapping, "service_id"),
            shop_id: cell_string(row, mapping, "shop_id"),
            cashback_amount: cell_amount(row, mapping, "cashback_amount"),
            status: cell_string(row, mapping, "status"),
            raw: raw_payload(row),
        })
    }
}
