use chrono::NaiveDateTime;
use vmr_common::Som;

use super::{
    cell_amount, cell_datetime, cell_string, normalize_payment_type, raw_payload, RawRow, RowError,
};
use crate::{
    db_types::{OrderKey, OrderNumber, PaymentType},
    schema::FieldMapping,
};

/// One row of the machine-side order log. Every valid row becomes, or updates, a canonical order.
#[derive(Debug, Clone)]
pub struct PrimaryRecord {
    pub order_number: OrderNumber,
    pub machine_code: String,
    pub creation_time: NaiveDateTime,
    pub paying_time: Option<NaiveDateTime>,
    pub brewing_time: Option<NaiveDateTime>,
    pub delivery_time: Option<NaiveDateTime>,
    pub refund_time: Option<NaiveDateTime>,
    pub order_price: Som,
    pub payment_type: PaymentType,
    pub order_resource: Option<String>,
    pub goods_name: Option<String>,
    pub taste_name: Option<String>,
    pub address: Option<String>,
    pub raw: serde_json::Value,
}

impl PrimaryRecord {
    pub fn from_row(row: &RawRow, mapping: &FieldMapping) -> Result<Self, RowError> {
        let order_number =
            cell_string(row, mapping, "order_number").map(OrderNumber::from).ok_or(RowError::MissingKey)?;
        let machine_code = cell_string(row, mapping, "machine_code").unwrap_or_default();
        let creation_time =
            cell_datetime(row, mapping, "creation_time").ok_or(RowError::MissingTimestamp("creation_time"))?;
        let order_price = cell_amount(row, mapping, "order_price")
            .filter(Som::is_positive)
            .ok_or(RowError::BadAmount("order_price"))?;
        let order_resource = cell_string(row, mapping, "order_resource");
        let payment_type = normalize_payment_type(order_resource.as_deref().unwrap_or_default());
        Ok(Self {
            order_number,
            machine_code,
            creation_time,
            paying_time: cell_datetime(row, mapping, "paying_time"),
            brewing_time: cell_datetime(row, mapping, "brewing_time"),
            delivery_time: cell_datetime(row, mapping, "delivery_time"),
            refund_time: cell_datetime(row, mapping, "refund_time"),
            order_price,
            payment_type,
            order_resource,
            goods_name: cell_string(row, mapping, "goods_name"),
            taste_name: cell_string(row, mapping, "taste_name"),
            address: cell_string(row, mapping, "address"),
            raw: raw_payload(row),
        })
    }

    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.order_number.clone(), self.machine_code.clone())
    }

    /// Refunded orders are excluded from reconciliation entirely.
    pub fn is_refunded(&self) -> bool {
        self.refund_time.is_some()
    }
}
