use chrono::{Duration, NaiveDateTime};
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};
use vmr_common::Som;

use crate::{
    db::traits::{ReconDbError, StatusCount},
    db_types::{MatchStatus, Order, OrderKey, PaymentType, SourceKind},
    matching::{AMOUNT_TOLERANCE, TIME_TOLERANCE_SECS},
    order_objects::OrderQueryFilter,
    sources::{EnrichmentRecord, FiscalRecord, GatewayRecord, PrimaryRecord},
};

/// How many correlation candidates a single receipt/settlement row may consider.
const CANDIDATE_LIMIT: i64 = 20;

pub(crate) async fn fetch_order_by_key(
    key: &OrderKey,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_number = $1 AND machine_code = $2")
        .bind(key.order_number.as_str())
        .bind(&key.machine_code)
        .fetch_optional(conn)
        .await
}

pub(crate) async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Inserts the machine-log record, or merges it into the existing order with the same natural key, returning
/// `true` in the second parameter if a new order was created.
pub(crate) async fn upsert_primary(
    rec: PrimaryRecord,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), ReconDbError> {
    let upserted = match fetch_order_by_key(&rec.key(), conn).await? {
        Some(existing) => {
            let order = merge_primary(&existing, rec, conn).await?;
            trace!("🗃️ Order {} merged with a fresh machine-log row", order.key());
            (order, false)
        },
        None => {
            let order = insert_primary(rec, conn).await?;
            debug!("🗃️ Order {} inserted with id {}", order.key(), order.id);
            (order, true)
        },
    };
    Ok(upserted)
}

async fn insert_primary(rec: PrimaryRecord, conn: &mut SqliteConnection) -> Result<Order, ReconDbError> {
    let sources = Json(std::collections::BTreeSet::from([SourceKind::PrimaryLog]));
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                machine_code,
                creation_time,
                paying_time,
                brewing_time,
                delivery_time,
                refund_time,
                order_price,
                payment_type,
                order_resource,
                goods_name,
                taste_name,
                address,
                matched_sources,
                match_status,
                primary_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(rec.order_number.as_str().to_string())
    .bind(rec.machine_code)
    .bind(rec.creation_time)
    .bind(rec.paying_time)
    .bind(rec.brewing_time)
    .bind(rec.delivery_time)
    .bind(rec.refund_time)
    .bind(rec.order_price.value())
    .bind(rec.payment_type.to_string())
    .bind(rec.order_resource)
    .bind(rec.goods_name)
    .bind(rec.taste_name)
    .bind(rec.address)
    .bind(sources)
    .bind(MatchStatus::PrimaryOnly.to_string())
    .bind(Json(rec.raw))
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Field-level merge for a repeated or late-arriving machine-log row. An incoming non-null value overwrites, an
/// absent one never clobbers, and `order_price` is write-once. The match status is left for the caller to settle.
async fn merge_primary(
    existing: &Order,
    rec: PrimaryRecord,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let sources = Json(existing.sources_with(SourceKind::PrimaryLog));
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                creation_time = COALESCE($1, creation_time),
                paying_time = COALESCE($2, paying_time),
                brewing_time = COALESCE($3, brewing_time),
                delivery_time = COALESCE($4, delivery_time),
                refund_time = COALESCE($5, refund_time),
                order_price = COALESCE(order_price, $6),
                payment_type = CASE WHEN $7 = 'Unknown' THEN payment_type ELSE $7 END,
                order_resource = COALESCE($8, order_resource),
                goods_name = COALESCE($9, goods_name),
                taste_name = COALESCE($10, taste_name),
                address = COALESCE($11, address),
                matched_sources = $12,
                primary_data = $13,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $14
            RETURNING *;
        "#,
    )
    .bind(rec.creation_time)
    .bind(rec.paying_time)
    .bind(rec.brewing_time)
    .bind(rec.delivery_time)
    .bind(rec.refund_time)
    .bind(rec.order_price.value())
    .bind(rec.payment_type.to_string())
    .bind(rec.order_resource)
    .bind(rec.goods_name)
    .bind(rec.taste_name)
    .bind(rec.address)
    .bind(sources)
    .bind(Json(rec.raw))
    .bind(existing.id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub(crate) async fn insert_enrichment_order(
    rec: EnrichmentRecord,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let sources = Json(std::collections::BTreeSet::from([SourceKind::Enrichment]));
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                machine_code,
                event_time,
                order_price,
                payment_type,
                goods_name,
                goods_id,
                machine_category,
                username,
                bonus_amount,
                matched_sources,
                match_status,
                enrichment_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(rec.order_number.as_str().to_string())
    .bind(rec.machine_code)
    .bind(rec.event_time)
    .bind(rec.order_price.value())
    .bind(rec.payment_type.to_string())
    .bind(rec.goods_name)
    .bind(rec.goods_id)
    .bind(rec.machine_category)
    .bind(rec.username)
    .bind(rec.bonus_amount.map(|b| b.value()))
    .bind(sources)
    .bind(MatchStatus::EnrichmentOnly.to_string())
    .bind(Json(rec.raw))
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Enrichment-only order {} inserted with id {}", order.key(), order.id);
    Ok(order)
}

pub(crate) async fn merge_enrichment(
    id: i64,
    rec: EnrichmentRecord,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let existing = fetch_order_by_id(id, conn).await?.ok_or(ReconDbError::OrderIdNotFound(id))?;
    let sources = Json(existing.sources_with(SourceKind::Enrichment));
    let order: Order = sqlx::query_as(
        r#"
            UPDATE orders SET
                event_time = $1,
                order_price = COALESCE(order_price, $2),
                payment_type = CASE WHEN $3 = 'Unknown' THEN payment_type ELSE $3 END,
                goods_name = COALESCE($4, goods_name),
                goods_id = COALESCE($5, goods_id),
                machine_category = COALESCE($6, machine_category),
                username = COALESCE($7, username),
                bonus_amount = COALESCE($8, bonus_amount),
                matched_sources = $9,
                match_status = $10,
                mismatch_details = NULL,
                enrichment_data = $11,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $12
            RETURNING *;
        "#,
    )
    .bind(rec.event_time)
    .bind(rec.order_price.value())
    .bind(rec.payment_type.to_string())
    .bind(rec.goods_name)
    .bind(rec.goods_id)
    .bind(rec.machine_category)
    .bind(rec.username)
    .bind(rec.bonus_amount.map(|b| b.value()))
    .bind(sources)
    .bind(MatchStatus::Matched.to_string())
    .bind(Json(rec.raw))
    .bind(id)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Order {} enriched from the accounting export", order.key());
    Ok(order)
}

pub(crate) async fn update_match_status(
    id: i64,
    status: MatchStatus,
    details: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET match_status = $1, mismatch_details = COALESCE($2, mismatch_details), updated_at = \
         CURRENT_TIMESTAMP WHERE id = $3 RETURNING *",
    )
    .bind(status.to_string())
    .bind(details)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(ReconDbError::OrderIdNotFound(id))
}

/// Cash orders eligible to corroborate a fiscal receipt: unfiscalized, paid within the tolerance window of the
/// receipt time, price within one tiyin. Nearest-in-time first, so the caller's greedy assignment is the
/// deterministic nearest-neighbour tie-break.
pub(crate) async fn find_fiscal_candidates(
    fiscal_time: NaiveDateTime,
    amount: Som,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    find_correlation_candidates(PaymentType::Cash, "fiscal_matched", fiscal_time, amount, conn).await
}

/// Custom-payment orders eligible to corroborate a gateway settlement. The settlement amount is compared gross,
/// with no commission deducted.
pub(crate) async fn find_gateway_candidates(
    transaction_time: NaiveDateTime,
    amount: Som,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    find_correlation_candidates(PaymentType::CustomPayment, "gateway_matched", transaction_time, amount, conn).await
}

async fn find_correlation_candidates(
    payment_type: PaymentType,
    matched_flag: &str,
    record_time: NaiveDateTime,
    amount: Som,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let start = record_time - Duration::seconds(TIME_TOLERANCE_SECS);
    let end = record_time + Duration::seconds(TIME_TOLERANCE_SECS);
    let sql = format!(
        r#"
        SELECT * FROM orders
        WHERE payment_type = $1
          AND {matched_flag} = 0
          AND paying_time IS NOT NULL
          AND paying_time BETWEEN $2 AND $3
          AND order_price IS NOT NULL
          AND ABS(order_price - $4) <= $5
        ORDER BY ABS(julianday(paying_time) - julianday($6)) ASC
        LIMIT {CANDIDATE_LIMIT};
        "#
    );
    sqlx::query_as(&sql)
        .bind(payment_type.to_string())
        .bind(start)
        .bind(end)
        .bind(amount.value())
        .bind(AMOUNT_TOLERANCE.value())
        .bind(record_time)
        .fetch_all(conn)
        .await
}

/// Whether this receipt already corroborates some order. Keyed by check number when the receipt carries one,
/// falling back to the exact time/amount pair.
pub(crate) async fn fiscal_receipt_attached(
    rec: &FiscalRecord,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let hit: Option<i64> = match &rec.check_number {
        Some(number) => {
            sqlx::query_scalar("SELECT id FROM orders WHERE fiscal_matched = 1 AND fiscal_check_number = $1 LIMIT 1")
                .bind(number)
                .fetch_optional(conn)
                .await?
        },
        None => {
            sqlx::query_scalar(
                "SELECT id FROM orders WHERE fiscal_matched = 1 AND fiscal_time = $1 AND fiscal_amount = $2 LIMIT 1",
            )
            .bind(rec.fiscal_time)
            .bind(rec.amount.value())
            .fetch_optional(conn)
            .await?
        },
    };
    Ok(hit.is_some())
}

pub(crate) async fn gateway_settlement_attached(
    rec: &GatewayRecord,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let hit: Option<i64> = match &rec.transaction_id {
        Some(txid) => {
            sqlx::query_scalar(
                "SELECT id FROM orders WHERE gateway_matched = 1 AND payment_gateway = $1 AND transaction_id = $2 \
                 LIMIT 1",
            )
            .bind(rec.provider.to_string())
            .bind(txid)
            .fetch_optional(conn)
            .await?
        },
        None => {
            sqlx::query_scalar(
                "SELECT id FROM orders WHERE gateway_matched = 1 AND gateway_time = $1 AND gateway_amount = $2 LIMIT 1",
            )
            .bind(rec.transaction_time)
            .bind(rec.amount.value())
            .fetch_optional(conn)
            .await?
        },
    };
    Ok(hit.is_some())
}

pub(crate) async fn attach_fiscal(
    id: i64,
    rec: FiscalRecord,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let existing = fetch_order_by_id(id, conn).await?.ok_or(ReconDbError::OrderIdNotFound(id))?;
    let sources = Json(existing.sources_with(SourceKind::FiscalReceipt));
    let order: Order = sqlx::query_as(
        r#"
            UPDATE orders SET
                fiscal_time = $1,
                fiscal_amount = $2,
                fiscal_check_number = COALESCE($3, fiscal_check_number),
                taxpayer_id = COALESCE($4, taxpayer_id),
                cash_register_id = COALESCE($5, cash_register_id),
                shift_number = COALESCE($6, shift_number),
                receipt_type = COALESCE($7, receipt_type),
                fiscal_matched = 1,
                matched_sources = $8,
                fiscal_data = $9,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $10
            RETURNING *;
        "#,
    )
    .bind(rec.fiscal_time)
    .bind(rec.amount.value())
    .bind(rec.check_number)
    .bind(rec.taxpayer_id)
    .bind(rec.cash_register_id)
    .bind(rec.shift_number)
    .bind(rec.receipt_type)
    .bind(sources)
    .bind(Json(rec.raw))
    .bind(id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Fiscal receipt attached to order {}", order.key());
    Ok(order)
}

pub(crate) async fn attach_gateway(
    id: i64,
    rec: GatewayRecord,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconDbError> {
    let existing = fetch_order_by_id(id, conn).await?.ok_or(ReconDbError::OrderIdNotFound(id))?;
    let sources = Json(existing.sources_with(rec.provider.source_kind()));
    let order: Order = sqlx::query_as(
        r#"
            UPDATE orders SET
                gateway_time = $1,
                gateway_amount = $2,
                payment_gateway = $3,
                transaction_id = COALESCE($4, transaction_id),
                card_number = COALESCE($5, card_number),
                merchant_id = COALESCE($6, merchant_id),
                terminal_id = COALESCE($7, terminal_id),
                service_id = COALESCE($8, service_id),
                shop_id = COALESCE($9, shop_id),
                cashback_amount = COALESCE($10, cashback_amount),
                gateway_status = COALESCE($11, gateway_status),
                gateway_matched = 1,
                matched_sources = $12,
                gateway_data = $13,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $14
            RETURNING *;
        "#,
    )
    .bind(rec.transaction_time)
    .bind(rec.amount.value())
    .bind(rec.provider.to_string())
    .bind(rec.transaction_id)
    .bind(rec.card_number)
    .bind(rec.merchant_id)
    .bind(rec.terminal_id)
    .bind(rec.service_id)
    .bind(rec.shop_id)
    .bind(rec.cashback_amount.map(|c| c.value()))
    .bind(rec.status)
    .bind(sources)
    .bind(Json(rec.raw))
    .bind(id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ {} settlement attached to order {}", order.payment_gateway.map(|p| p.to_string()).unwrap_or_default(), order.key());
    Ok(order)
}

/// Orders touched since their last classification. `>=` rather than `>` because the timestamps only carry
/// one-second resolution; re-classifying an already-settled order is a no-op.
pub(crate) async fn fetch_unclassified(conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE classified_at IS NULL OR updated_at >= classified_at ORDER BY id ASC",
    )
    .fetch_all(conn)
    .await
}

/// Stamps the classifier's verdict without touching `updated_at`, so the order drops out of the next
/// reconciliation pass unless another source touches it again.
pub(crate) async fn mark_classified(
    id: i64,
    status: MatchStatus,
    details: &str,
    conn: &mut SqliteConnection,
) -> Result<(), ReconDbError> {
    let result = sqlx::query(
        "UPDATE orders SET match_status = $1, mismatch_details = $2, classified_at = CURRENT_TIMESTAMP WHERE id = $3",
    )
    .bind(status.to_string())
    .bind(details)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ReconDbError::OrderIdNotFound(id));
    }
    Ok(())
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `creation_time` in ascending order.
pub(crate) async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_number) = query.order_number {
        where_clause.push("order_number = ");
        where_clause.push_bind_unseparated(order_number.as_str().to_string());
    }
    if let Some(machine_code) = query.machine_code {
        where_clause.push("machine_code = ");
        where_clause.push_bind_unseparated(machine_code);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("match_status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("creation_time >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("creation_time <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY creation_time ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

pub(crate) async fn status_counts(conn: &mut SqliteConnection) -> Result<Vec<StatusCount>, sqlx::Error> {
    sqlx::query_as("SELECT match_status AS status, COUNT(*) AS count FROM orders GROUP BY match_status")
        .fetch_all(conn)
        .await
}
