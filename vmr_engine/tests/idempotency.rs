//! Re-running files must never duplicate orders, double-count matches or disturb settled fields.

mod support;

use support::{fresh_db, headers, row, ENRICHMENT_HEADERS, FISCAL_HEADERS, PRIMARY_HEADERS};
use vmr_engine::{
    db_types::{MatchStatus, OrderKey, SourceKind},
    order_objects::OrderQueryFilter,
    ReconciliationApi, ReconciliationDatabase, SqliteDatabase,
};

fn api(db: SqliteDatabase) -> ReconciliationApi<SqliteDatabase> {
    ReconciliationApi::new(db)
}

fn primary_rows() -> Vec<std::collections::HashMap<String, String>> {
    vec![row(&[
        ("Order number", "1001"),
        ("Machine code", "M1"),
        ("Creation time", "2024-01-01 10:00:00"),
        ("Paying time", "2024-01-01 10:04:30"),
        ("Delivery time", "2024-01-01 10:05:10"),
        ("Order price", "15000"),
        ("Order resource", "Cash payment"),
    ])]
}

fn enrichment_rows() -> Vec<std::collections::HashMap<String, String>> {
    vec![row(&[
        ("Order number", "1001"),
        ("Machine code", "M1"),
        ("Order time", "2024-01-01 10:00:30"),
        ("Order price", "15000"),
        ("Payment type", "Cash payment"),
    ])]
}

fn fiscal_rows() -> Vec<std::collections::HashMap<String, String>> {
    vec![row(&[
        ("fiscal_check_number", "FC-77"),
        ("fiscal_time", "2024-01-01 10:05:00"),
        ("amount", "15000"),
    ])]
}

#[tokio::test]
async fn ingesting_every_file_twice_leaves_the_store_unchanged() {
    let api = api(fresh_db().await);
    let ph = headers(PRIMARY_HEADERS);
    let eh = headers(ENRICHMENT_HEADERS);
    let fh = headers(FISCAL_HEADERS);

    for _ in 0..2 {
        api.ingest(&ph, &primary_rows(), None).await.unwrap();
        api.ingest(&eh, &enrichment_rows(), None).await.unwrap();
        api.ingest(&fh, &fiscal_rows(), None).await.unwrap();
    }
    let stats = api.reconcile_batch().await.unwrap();

    // One order, fully corroborated once; the repeated receipt neither double-attached nor landed in the
    // unmatched audit table.
    assert_eq!(stats.total, 1);
    assert_eq!(stats.count(MatchStatus::FullyMatched), 1);
    assert_eq!(stats.count(MatchStatus::FiscalOnly), 0);

    let orders = api.query_orders(OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert!(order.fiscal_matched);
    assert_eq!(order.sources().len(), 3);

    // A third ingest after reconciliation is still a no-op.
    api.ingest(&fh, &fiscal_rows(), None).await.unwrap();
    let stats = api.reconcile_batch().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.count(MatchStatus::FiscalOnly), 0);
}

#[tokio::test]
async fn order_price_is_write_once_regardless_of_source_ordering() {
    let api = api(fresh_db().await);
    api.ingest(&headers(PRIMARY_HEADERS), &primary_rows(), None).await.unwrap();

    // A corrected re-export with a different price must not disturb the recorded amount.
    let mut rows = primary_rows();
    rows[0].insert("Order price".to_string(), "20000".to_string());
    api.ingest(&headers(PRIMARY_HEADERS), &rows, None).await.unwrap();

    let order = api.db().fetch_order_by_key(&OrderKey::new("1001", "M1")).await.unwrap().unwrap();
    assert_eq!(order.order_price.unwrap().value(), 1_500_000);
}

#[tokio::test]
async fn enrichment_arriving_first_still_converges() {
    let api = api(fresh_db().await);
    api.ingest(&headers(ENRICHMENT_HEADERS), &enrichment_rows(), None).await.unwrap();

    let order = api.db().fetch_order_by_key(&OrderKey::new("1001", "M1")).await.unwrap().unwrap();
    assert_eq!(order.match_status, MatchStatus::EnrichmentOnly);
    assert!(!order.has_source(SourceKind::PrimaryLog));

    // The machine log catches up; the same window/price acceptance check runs on the merged order.
    api.ingest(&headers(PRIMARY_HEADERS), &primary_rows(), None).await.unwrap();
    let order = api.db().fetch_order_by_key(&OrderKey::new("1001", "M1")).await.unwrap().unwrap();
    assert_eq!(order.match_status, MatchStatus::Matched);
    assert!(order.has_source(SourceKind::PrimaryLog));
    assert!(order.has_source(SourceKind::Enrichment));
    assert_eq!(order.creation_time.unwrap().to_string(), "2024-01-01 10:00:00");
}

#[tokio::test]
async fn enrichment_first_with_conflicting_price_flags_a_mismatch() {
    let api = api(fresh_db().await);
    let mut enrichment = enrichment_rows();
    enrichment[0].insert("Order price".to_string(), "14000".to_string());
    api.ingest(&headers(ENRICHMENT_HEADERS), &enrichment, None).await.unwrap();
    api.ingest(&headers(PRIMARY_HEADERS), &primary_rows(), None).await.unwrap();

    let order = api.db().fetch_order_by_key(&OrderKey::new("1001", "M1")).await.unwrap().unwrap();
    assert_eq!(order.match_status, MatchStatus::PriceMismatch);
}

#[tokio::test]
async fn reclassification_is_stable_across_batches() {
    let api = api(fresh_db().await);
    api.ingest(&headers(PRIMARY_HEADERS), &primary_rows(), None).await.unwrap();
    let first = api.reconcile_batch().await.unwrap();
    let second = api.reconcile_batch().await.unwrap();
    assert_eq!(first, second);
}
