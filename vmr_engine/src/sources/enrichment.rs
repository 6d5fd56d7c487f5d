use chrono::NaiveDateTime;
use vmr_common::Som;

use super::{
    cell_amount, cell_datetime, cell_string, normalize_payment_type, raw_payload, RawRow, RowError,
};
use crate::{
    db_types::{OrderKey, OrderNumber, PaymentType},
    schema::FieldMapping,
};

/// One row of the internal accounting export. Corroborates a primary order, or surfaces as an
/// enrichment-only order when the machine log never saw the transaction.
#[derive(Debug, Clone)]
pub struct EnrichmentRecord {
    pub order_number: OrderNumber,
    pub machine_code: String,
    pub event_time: NaiveDateTime,
    pub order_price: Som,
    pub payment_type: PaymentType,
    pub goods_name: Option<String>,
    pub goods_id: Option<String>,
    pub machine_category: Option<String>,
    pub username: Option<String>,
    pub bonus_amount: Option<Som>,
    pub raw: serde_json::Value,
}

impl EnrichmentRecord {
    pub fn from_row(row: &RawRow, mapping: &FieldMapping) -> Result<Self, RowError> {
        let order_number =
            cell_string(row, mapping, "order_number").map(OrderNumber::from).ok_or(RowError::MissingKey)?;
        let machine_code = cell_string(row, mapping, "machine_code").unwrap_or_default();
        let event_time =
            cell_datetime(row, mapping, "event_time").ok_or(RowError::MissingTimestamp("event_time"))?;
        let order_price = cell_amount(row, mapping, "order_price")
            .filter(Som::is_positive)
            .ok_or(RowError::BadAmount("order_price"))?;
        let payment_type =
            normalize_payment_type(cell_string(row, mapping, "payment_type").as_deref().unwrap_or_default());
        Ok(Self {
            order_number,
            machine_code,
            event_time,
            order_price,
            payment_type,
            goods_name: cell_string(row, mapping, "goods_name"),
            goods_id: cell_string(row, mapping, "goods_id"),
            machine_category: cell_string(row, mapping, "machine_category"),
            username: cell_string(row, mapping, "username"),
            bonus_amount: cell_amount(row, mapping, "bonus_amount"),
            raw: raw_payload(row),
        })
    }

    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.order_number.clone(), self.machine_code.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mapping() -> FieldMapping {
        [
            ("order_number", "Order number"),
            ("machine_code", "Machine code"),
            ("event_time", "Order time"),
            ("order_price", "Order price"),
            ("payment_type", "Payment type"),
            ("bonus_amount", "Amount of accrued bonus"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn row(cells: &[(&str, &str)]) -> RawRow {
        cells.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn full_row_converts() {
        let rec = EnrichmentRecord::from_row(
            &row(&[
                ("Order number", "1001"),
                ("Machine code", "M1"),
                ("Order time", "2024-01-01 10:00:30"),
                ("Order price", "15000"),
                ("Payment type", "Cash payment"),
                ("Amount of accrued bonus", "150"),
            ]),
            &mapping(),
        )
        .unwrap();
        assert_eq!(rec.key(), OrderKey::new("1001", "M1"));
        assert_eq!(rec.payment_type, PaymentType::Cash);
        assert_eq!(rec.bonus_amount, Some(Som::from_som(150)));
    }

    #[test]
    fn missing_event_time_drops_the_row() {
        let result = EnrichmentRecord::from_row(
            &row(&[("Order number", "1001"), ("Order price", "15000")]),
            &mapping(),
        );
        assert_eq!(result.unwrap_err(), RowError::MissingTimestamp("event_time"));
    }
}
