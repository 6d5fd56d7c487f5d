//! In-memory fixtures for unit tests. Integration tests build orders through the real store instead.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use sqlx::types::Json;

use crate::db_types::{MatchStatus, Order, OrderNumber, PaymentType, SourceKind};

/// A bare primary-only order with the minimum fields populated. Tests override what they care about.
pub(crate) fn order_fixture() -> Order {
    let created = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    Order {
        id: 1,
        order_number: OrderNumber::from("1001"),
        machine_code: "M1".to_string(),
        creation_time: None,
        paying_time: None,
        brewing_time: None,
        delivery_time: None,
        refund_time: None,
        event_time: None,
        fiscal_time: None,
        gateway_time: None,
        order_price: None,
        fiscal_amount: None,
        gateway_amount: None,
        bonus_amount: None,
        cashback_amount: None,
        goods_name: None,
        goods_id: None,
        taste_name: None,
        address: None,
        machine_category: None,
        username: None,
        payment_type: PaymentType::Unknown,
        order_resource: None,
        payment_gateway: None,
        fiscal_check_number: None,
        taxpayer_id: None,
        cash_register_id: None,
        shift_number: None,
        receipt_type: None,
        transaction_id: None,
        card_number: None,
        merchant_id: None,
        terminal_id: None,
        service_id: None,
        shop_id: None,
        gateway_status: None,
        fiscal_matched: false,
        gateway_matched: false,
        matched_sources: Json(BTreeSet::from([SourceKind::PrimaryLog])),
        match_status: MatchStatus::PrimaryOnly,
        mismatch_details: None,
        primary_data: None,
        enrichment_data: None,
        fiscal_data: None,
        gateway_data: None,
        created_at: created,
        updated_at: created,
        classified_at: None,
    }
}
