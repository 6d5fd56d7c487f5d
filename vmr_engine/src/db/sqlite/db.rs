//! `SqliteDatabase` is the concrete SQLite implementation of the reconciliation store.
//!
//! Every trait method acquires a transaction, so each store operation is atomic and upserts serialize per natural
//! key without any caller-side locking.
use std::fmt::Debug;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use vmr_common::Som;

use super::{new_pool, orders, unmatched};
use crate::{
    db::traits::{ReconDbError, ReconciliationDatabase, StatusCount, UnmatchedCount},
    db_types::{MatchStatus, Order, OrderKey, SourceKind},
    order_objects::OrderQueryFilter,
    sources::{EnrichmentRecord, FiscalRecord, GatewayRecord, PrimaryRecord},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, ReconDbError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_primary(&self, rec: PrimaryRecord) -> Result<(Order, bool), ReconDbError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::upsert_primary(rec, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_enrichment_order(&self, rec: EnrichmentRecord) -> Result<Order, ReconDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_enrichment_order(rec, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn merge_enrichment(&self, id: i64, rec: EnrichmentRecord) -> Result<Order, ReconDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::merge_enrichment(id, rec, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn update_match_status(
        &self,
        id: i64,
        status: MatchStatus,
        details: Option<&str>,
    ) -> Result<Order, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_match_status(id, status, details, &mut conn).await
    }

    async fn fetch_order_by_key(&self, key: &OrderKey) -> Result<Option<Order>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_key(key, &mut conn).await?;
        Ok(order)
    }

    async fn find_fiscal_candidates(
        &self,
        fiscal_time: NaiveDateTime,
        amount: Som,
    ) -> Result<Vec<Order>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let candidates = orders::find_fiscal_candidates(fiscal_time, amount, &mut conn).await?;
        Ok(candidates)
    }

    async fn fiscal_receipt_attached(&self, rec: &FiscalRecord) -> Result<bool, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let attached = orders::fiscal_receipt_attached(rec, &mut conn).await?;
        Ok(attached)
    }

    async fn attach_fiscal(&self, id: i64, rec: FiscalRecord) -> Result<Order, ReconDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::attach_fiscal(id, rec, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn find_gateway_candidates(
        &self,
        transaction_time: NaiveDateTime,
        amount: Som,
    ) -> Result<Vec<Order>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let candidates = orders::find_gateway_candidates(transaction_time, amount, &mut conn).await?;
        Ok(candidates)
    }

    async fn gateway_settlement_attached(&self, rec: &GatewayRecord) -> Result<bool, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let attached = orders::gateway_settlement_attached(rec, &mut conn).await?;
        Ok(attached)
    }

    async fn attach_gateway(&self, id: i64, rec: GatewayRecord) -> Result<Order, ReconDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::attach_gateway(id, rec, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn insert_unmatched(
        &self,
        kind: SourceKind,
        record_time: NaiveDateTime,
        amount: Som,
        payload: serde_json::Value,
    ) -> Result<(), ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        unmatched::insert(kind, record_time, amount, payload, &mut conn).await?;
        Ok(())
    }

    async fn fetch_unclassified(&self) -> Result<Vec<Order>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_unclassified(&mut conn).await?;
        Ok(result)
    }

    async fn mark_classified(&self, id: i64, status: MatchStatus, details: &str) -> Result<(), ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_classified(id, status, details, &mut conn).await
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::search_orders(filter, &mut conn).await?;
        Ok(result)
    }

    async fn status_counts(&self) -> Result<Vec<StatusCount>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::status_counts(&mut conn).await?;
        Ok(result)
    }

    async fn unmatched_counts(&self) -> Result<Vec<UnmatchedCount>, ReconDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = unmatched::counts(&mut conn).await?;
        Ok(result)
    }

    async fn close(&mut self) -> Result<(), ReconDbError> {
        self.pool.close().await;
        Ok(())
    }
}
