//! End-to-end reconciliation scenarios against a real SQLite store.

mod support;

use support::{fresh_db, headers, row, ENRICHMENT_HEADERS, FISCAL_HEADERS, PAYME_HEADERS, PRIMARY_HEADERS};
use vmr_engine::{
    db_types::{GatewayProvider, MatchStatus, OrderKey, SourceKind},
    order_objects::OrderQueryFilter,
    ReconciliationApi, ReconciliationDatabase, SqliteDatabase,
};

fn api(db: SqliteDatabase) -> ReconciliationApi<SqliteDatabase> {
    ReconciliationApi::new(db)
}

async fn order_1001(api: &ReconciliationApi<SqliteDatabase>) -> vmr_engine::db_types::Order {
    api.db()
        .fetch_order_by_key(&OrderKey::new("1001", "M1"))
        .await
        .expect("store failure")
        .expect("order 1001 should exist")
}

#[tokio::test]
async fn primary_row_alone_classifies_as_primary_only() {
    let api = api(fresh_db().await);
    let result = api
        .ingest(
            &headers(PRIMARY_HEADERS),
            &[row(&[
                ("Order number", "1001"),
                ("Machine code", "M1"),
                ("Creation time", "2024-01-01 10:00:00"),
                ("Order price", "15000"),
                ("Order resource", "Cash payment"),
            ])],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.detected, Some(SourceKind::PrimaryLog));
    assert_eq!(result.processed, 1);
    assert_eq!(result.skipped, 0);

    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.count(MatchStatus::PrimaryOnly), 1);

    let order = order_1001(&api).await;
    assert_eq!(order.match_status, MatchStatus::PrimaryOnly);
    assert!(order.mismatch_details.unwrap().contains("machine log"));
}

#[tokio::test]
async fn enrichment_then_fiscal_walks_to_fully_matched() {
    let api = api(fresh_db().await);
    // Scenario B/C: a cash order confirmed by the accounting export, then by its receipt.
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Creation time", "2024-01-01 10:00:00"),
            ("Paying time", "2024-01-01 10:04:30"),
            ("Delivery time", "2024-01-01 10:05:10"),
            ("Order price", "15000"),
            ("Order resource", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();

    let result = api
        .ingest(
            &headers(ENRICHMENT_HEADERS),
            &[row(&[
                ("Order number", "1001"),
                ("Machine code", "M1"),
                ("Order time", "2024-01-01 10:00:30"),
                ("Order price", "15000"),
                ("Payment type", "Cash payment"),
                ("Goods id", "G-7"),
            ])],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.detected, Some(SourceKind::Enrichment));

    let order = order_1001(&api).await;
    assert_eq!(order.match_status, MatchStatus::Matched);
    assert!(order.has_source(SourceKind::Enrichment));
    assert_eq!(order.goods_id.as_deref(), Some("G-7"));

    // Without fiscal data the cash order reclassifies to FiscalMismatch.
    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::FiscalMismatch), 1);

    // Scenario C: a receipt lands within 60 s of paying time at the same amount.
    api.ingest(
        &headers(FISCAL_HEADERS),
        &[row(&[
            ("fiscal_check_number", "FC-77"),
            ("fiscal_time", "2024-01-01 10:05:00"),
            ("amount", "15000"),
            ("taxpayer_id", "301234567"),
        ])],
        None,
    )
    .await
    .unwrap();

    let order = order_1001(&api).await;
    assert!(order.fiscal_matched);
    assert_eq!(order.fiscal_check_number.as_deref(), Some("FC-77"));

    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::FullyMatched), 1);
    assert_eq!(stats.count(MatchStatus::FiscalMismatch), 0);
    assert_eq!(order_1001(&api).await.match_status, MatchStatus::FullyMatched);
}

#[tokio::test]
async fn late_enrichment_event_is_rejected_as_time_out_of_range() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Creation time", "2024-01-01 10:00:00"),
            ("Delivery time", "2024-01-01 10:02:00"),
            ("Order price", "15000"),
            ("Order resource", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();

    // Scenario D: the accounting event lands twenty minutes after delivery, no refund in sight.
    api.ingest(
        &headers(ENRICHMENT_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Order time", "2024-01-01 10:22:00"),
            ("Order price", "15000"),
            ("Payment type", "Cash payment"),
            ("Goods id", "G-7"),
        ])],
        None,
    )
    .await
    .unwrap();

    let order = order_1001(&api).await;
    assert_eq!(order.match_status, MatchStatus::TimeOutOfRange);
    assert!(order.mismatch_details.as_deref().unwrap().contains("outside the order window"));
    // The rejected row's fields were not merged.
    assert!(order.event_time.is_none());
    assert!(order.goods_id.is_none());
    assert!(!order.has_source(SourceKind::Enrichment));

    // Terminal statuses survive reclassification.
    api.reconcile_batch().await.unwrap();
    assert_eq!(order_1001(&api).await.match_status, MatchStatus::TimeOutOfRange);
}

#[tokio::test]
async fn enrichment_price_disagreement_is_rejected_as_price_mismatch() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Creation time", "2024-01-01 10:00:00"),
            ("Delivery time", "2024-01-01 10:02:00"),
            ("Order price", "15000"),
            ("Order resource", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();
    api.ingest(
        &headers(ENRICHMENT_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Order time", "2024-01-01 10:01:00"),
            ("Order price", "14000"),
            ("Payment type", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();

    let order = order_1001(&api).await;
    assert_eq!(order.match_status, MatchStatus::PriceMismatch);
    let details = order.mismatch_details.unwrap();
    assert!(details.contains("15000.00 UZS"));
    assert!(details.contains("14000.00 UZS"));
}

#[tokio::test]
async fn nearer_of_two_receipts_wins_the_order() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Creation time", "2024-01-01 10:00:00"),
            ("Paying time", "2024-01-01 10:04:30"),
            ("Delivery time", "2024-01-01 10:05:10"),
            ("Order price", "15000"),
            ("Order resource", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();
    api.ingest(
        &headers(ENRICHMENT_HEADERS),
        &[row(&[
            ("Order number", "1001"),
            ("Machine code", "M1"),
            ("Order time", "2024-01-01 10:00:30"),
            ("Order price", "15000"),
            ("Payment type", "Cash payment"),
        ])],
        None,
    )
    .await
    .unwrap();

    // Scenario E: both receipts sit within tolerance; the temporally nearer one (10 s vs 30 s) must win,
    // regardless of row order in the file.
    let result = api
        .ingest(
            &headers(FISCAL_HEADERS),
            &[
                row(&[
                    ("fiscal_check_number", "FC-far"),
                    ("fiscal_time", "2024-01-01 10:05:00"),
                    ("amount", "15000"),
                ]),
                row(&[
                    ("fiscal_check_number", "FC-near"),
                    ("fiscal_time", "2024-01-01 10:04:40"),
                    ("amount", "15000"),
                ]),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.processed, 2);

    let order = order_1001(&api).await;
    assert!(order.fiscal_matched);
    assert_eq!(order.fiscal_check_number.as_deref(), Some("FC-near"));

    // The loser is retained as an unmatched record and surfaces in the histogram.
    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::FiscalOnly), 1);
    assert_eq!(stats.count(MatchStatus::FullyMatched), 1);
}

#[tokio::test]
async fn gateway_settlement_corroborates_custom_payment_orders() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[row(&[
            ("Order number", "2001"),
            ("Machine code", "M2"),
            ("Creation time", "2024-01-01 12:00:00"),
            ("Paying time", "2024-01-01 12:00:20"),
            ("Delivery time", "2024-01-01 12:01:00"),
            ("Order price", "22000"),
            ("Order resource", "Custom payment"),
        ])],
        None,
    )
    .await
    .unwrap();
    api.ingest(
        &headers(ENRICHMENT_HEADERS),
        &[row(&[
            ("Order number", "2001"),
            ("Machine code", "M2"),
            ("Order time", "2024-01-01 12:00:30"),
            ("Order price", "22000"),
            ("Payment type", "Custom payment"),
        ])],
        None,
    )
    .await
    .unwrap();

    // Without a settlement the order reclassifies to GatewayMismatch.
    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::GatewayMismatch), 1);

    // The settlement file reports the gross amount; no commission is deducted before comparison.
    let result = api
        .ingest(
            &headers(PAYME_HEADERS),
            &[row(&[
                ("transaction_id", "TX-9"),
                ("transaction_time", "2024-01-01 12:00:50"),
                ("amount", "22000"),
                ("masked_pan", "8600**1234"),
                ("terminal_id", "T-4"),
                ("status", "success"),
            ])],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.detected, Some(SourceKind::GatewayPayme));

    let order = api
        .db()
        .fetch_order_by_key(&OrderKey::new("2001", "M2"))
        .await
        .unwrap()
        .unwrap();
    assert!(order.gateway_matched);
    assert_eq!(order.payment_gateway, Some(GatewayProvider::Payme));
    assert_eq!(order.transaction_id.as_deref(), Some("TX-9"));
    assert_eq!(order.card_number.as_deref(), Some("8600**1234"));

    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::FullyMatched), 1);
    assert_eq!(stats.count(MatchStatus::GatewayMismatch), 0);
}

#[tokio::test]
async fn refunded_orders_are_excluded_entirely() {
    let api = api(fresh_db().await);
    let result = api
        .ingest(
            &headers(PRIMARY_HEADERS),
            &[
                row(&[
                    ("Order number", "3001"),
                    ("Machine code", "M1"),
                    ("Creation time", "2024-01-01 09:00:00"),
                    ("Refund time", "2024-01-01 09:10:00"),
                    ("Order price", "10000"),
                    ("Order resource", "Cash payment"),
                ]),
                row(&[
                    ("Order number", "3002"),
                    ("Machine code", "M1"),
                    ("Creation time", "2024-01-01 09:05:00"),
                    ("Order price", "10000"),
                    ("Order resource", "Cash payment"),
                ]),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(result.skipped, 1);
    assert!(api.db().fetch_order_by_key(&OrderKey::new("3001", "M1")).await.unwrap().is_none());
}

#[tokio::test]
async fn unrecognized_headers_skip_the_file_but_not_the_batch() {
    let api = api(fresh_db().await);
    let result = api
        .ingest(
            &headers(&["Employee", "Department", "Salary"]),
            &[row(&[("Employee", "A"), ("Department", "B"), ("Salary", "1")])],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.detected, None);
    assert_eq!(result.processed, 0);
    assert_eq!(result.skipped, 1);

    // The batch carries on with recognizable files.
    let result = api
        .ingest(
            &headers(PRIMARY_HEADERS),
            &[row(&[
                ("Order number", "1001"),
                ("Machine code", "M1"),
                ("Creation time", "2024-01-01 10:00:00"),
                ("Order price", "15000"),
                ("Order resource", "Cash payment"),
            ])],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.processed, 1);
}

#[tokio::test]
async fn test_and_vip_orders_need_no_corroboration() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[
            row(&[
                ("Order number", "4001"),
                ("Machine code", "M3"),
                ("Creation time", "2024-01-01 08:00:00"),
                ("Delivery time", "2024-01-01 08:01:00"),
                ("Order price", "5000"),
                ("Order resource", "Test Shipment"),
            ]),
            row(&[
                ("Order number", "4002"),
                ("Machine code", "M3"),
                ("Creation time", "2024-01-01 08:10:00"),
                ("Delivery time", "2024-01-01 08:11:00"),
                ("Order price", "5000"),
                ("Order resource", "VIP"),
            ]),
        ],
        None,
    )
    .await
    .unwrap();
    for (number, event) in [("4001", "2024-01-01 08:00:30"), ("4002", "2024-01-01 08:10:30")] {
        api.ingest(
            &headers(ENRICHMENT_HEADERS),
            &[row(&[
                ("Order number", number),
                ("Machine code", "M3"),
                ("Order time", event),
                ("Order price", "5000"),
            ])],
            None,
        )
        .await
        .unwrap();
    }

    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.count(MatchStatus::FullyMatched), 2);
}

#[tokio::test]
async fn query_orders_filters_by_status_machine_and_date_range() {
    let api = api(fresh_db().await);
    api.ingest(
        &headers(PRIMARY_HEADERS),
        &[
            row(&[
                ("Order number", "5001"),
                ("Machine code", "M1"),
                ("Creation time", "2024-01-01 10:00:00"),
                ("Order price", "1000"),
                ("Order resource", "Cash payment"),
            ]),
            row(&[
                ("Order number", "5002"),
                ("Machine code", "M2"),
                ("Creation time", "2024-02-01 10:00:00"),
                ("Order price", "2000"),
                ("Order resource", "Cash payment"),
            ]),
        ],
        None,
    )
    .await
    .unwrap();
    api.reconcile_batch().await.unwrap();

    let by_machine = api
        .query_orders(OrderQueryFilter::default().with_machine_code("M2"))
        .await
        .unwrap();
    assert_eq!(by_machine.len(), 1);
    assert_eq!(by_machine[0].order_number.as_str(), "5002");

    let by_status = api
        .query_orders(OrderQueryFilter::default().with_status(MatchStatus::PrimaryOnly))
        .await
        .unwrap();
    assert_eq!(by_status.len(), 2);

    let jan = "2024-01-01T00:00:00".parse::<chrono::NaiveDateTime>().unwrap();
    let feb = "2024-01-31T23:59:59".parse::<chrono::NaiveDateTime>().unwrap();
    let by_range = api.query_orders(OrderQueryFilter::default().since(jan).until(feb)).await.unwrap();
    assert_eq!(by_range.len(), 1);
    assert_eq!(by_range[0].order_number.as_str(), "5001");
}
