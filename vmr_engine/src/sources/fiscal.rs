use chrono::NaiveDateTime;
use vmr_common::Som;

use super::{cell_amount, cell_datetime, cell_int, cell_string, raw_payload, RawRow, RowError};
use crate::schema::FieldMapping;

/// One tax-authority receipt. Carries no order number; correlation is by paying time and amount alone.
#[derive(Debug, Clone)]
pub struct FiscalRecord {
    pub fiscal_time: NaiveDateTime,
    pub amount: Som,
    pub check_number: Option<String>,
    pub taxpayer_id: Option<String>,
    pub cash_register_id: Option<String>,
    pub shift_number: Option<i64>,
    pub receipt_type: Option<String>,
    pub raw: serde_json::Value,
}

impl FiscalRecord {
    pub fn from_row(row: &RawRow, mapping: &FieldMapping) -> Result<Self, RowError> {
        let fiscal_time =
            cell_datetime(row, mapping, "fiscal_time").ok_or(RowError::MissingTimestamp("fiscal_time"))?;
        let amount =
            cell_amount(row, mapping, "amount").filter(Som::is_positive).ok_or(RowError::BadAmount("amount"))?;
        Ok(Self {
            fiscal_time,
            amount,
            check_number: cell_string(row, mapping, "fiscal_check_number"),
            taxpayer_id: cell_string(row, mapping, "taxpayer_id"),
            cash_register_id: cell_string(row, mapping, "cash_register_id"),
            shift_number: cell_int(row, mapping, "shift_number"),
            receipt_type: cell_string(row, mapping, "receipt_type"),
            raw: raw_payload(row),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mapping() -> FieldMapping {
        [
            ("fiscal_check_number", "fiscal_check_number"),
            ("fiscal_time", "fiscal_time"),
            ("amount", "amount"),
            ("taxpayer_id", "taxpayer_id"),
            ("shift_number", "shift_number"),
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
        let rec = FiscalRecord::from_row(
            &row(&[
                ("fiscal_check_number", "FC-77"),
                ("fiscal_time", "2024-01-01 10:05:00"),
                ("amount", "15000"),
                ("taxpayer_id", "301234567"),
                ("shift_number", "3"),
            ]),
            &mapping(),
        )
        .unwrap();
        assert_eq!(rec.amount, Som::from_som(15_000));
        assert_eq!(rec.check_number.as_deref(), Some("FC-77"));
        assert_eq!(rec.shift_number, Some(3));
    }

    #[test]
    fn non_positive_amount_drops_the_row() {
        let result = FiscalRecord::from_row(
            &row(&[("fiscal_time", "2024-01-01 10:05:00"), ("amount", "0")]),
            &mapping(),
        );
        assert_eq!(result.unwrap_err(), RowError::BadAmount("amount"));
    }
}
