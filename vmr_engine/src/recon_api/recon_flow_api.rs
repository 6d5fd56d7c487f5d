use std::{
    collections::HashSet,
    fmt::Debug,
};

use log::*;

use crate::{
    classify::{classify, ClassifierPolicy},
    db::traits::{ReconciliationDatabase, StatusCount, UnmatchedCount},
    db_types::{GatewayProvider, MatchStatus, Order, SourceKind},
    events::{BatchReconciledEvent, EventProducers, OrderClassifiedEvent},
    matching::{evaluate_enrichment, EnrichmentOutcome},
    recon_api::{
        errors::ReconApiError,
        order_objects::{IngestResult, OrderQueryFilter, ReconciliationStats},
    },
    schema::{detect_schema, FieldMapping},
    sources::{EnrichmentRecord, FiscalRecord, GatewayRecord, PrimaryRecord, RawRow},
};

/// `ReconciliationApi` is the primary API for feeding source files into the order store and deriving the final
/// per-order classification.
///
/// The four matching stages of a batch must run in source order (primary ingest, enrichment, fiscal correlation,
/// gateway correlation) because each stage depends on fields written by the previous one. The API does not enforce
/// a call order; it simply processes whatever file the caller hands it, so the caller's scheduler decides the
/// batch shape. Every stage is idempotent: feeding the same file twice leaves the store unchanged.
pub struct ReconciliationApi<B> {
    db: B,
    policy: ClassifierPolicy,
    producers: EventProducers,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, policy: ClassifierPolicy::default(), producers: EventProducers::default() }
    }

    pub fn with_policy(mut self, policy: ClassifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationDatabase
{
    /// Feed one decoded file into the engine.
    ///
    /// The header row resolves the source kind (restricted to `hint` when one is given); every data row is then
    /// normalized and pushed through the matching stage for that kind. Row-level failures are counted in
    /// `skipped`, never raised. An unrecognized header set skips the whole file and reports `detected: None`.
    pub async fn ingest(
        &self,
        headers: &[String],
        rows: &[RawRow],
        hint: Option<SourceKind>,
    ) -> Result<IngestResult, ReconApiError> {
        let Some((kind, mapping)) = detect_schema(headers, hint) else {
            warn!("🔄️ No source kind recognized these headers. Skipping the file.");
            return Ok(IngestResult { processed: 0, skipped: rows.len(), detected: None });
        };
        let (processed, skipped) = match kind {
            SourceKind::PrimaryLog => self.ingest_primary_rows(rows, &mapping).await?,
            SourceKind::Enrichment => self.ingest_enrichment_rows(rows, &mapping).await?,
            SourceKind::FiscalReceipt => self.ingest_fiscal_rows(rows, &mapping).await?,
            SourceKind::GatewayPayme => self.ingest_gateway_rows(rows, &mapping, GatewayProvider::Payme).await?,
            SourceKind::GatewayClick => self.ingest_gateway_rows(rows, &mapping, GatewayProvider::Click).await?,
            SourceKind::GatewayUzum => self.ingest_gateway_rows(rows, &mapping, GatewayProvider::Uzum).await?,
        };
        info!("🔄️ Ingested {processed} rows from a {kind} file ({skipped} skipped)");
        Ok(IngestResult { processed, skipped, detected: Some(kind) })
    }

    /// Run the status classifier over every order touched since the last reconciliation, then roll the store up
    /// into the per-status histogram. Unmatched receipt/settlement rows are folded in under their `<Source>Only`
    /// statuses.
    pub async fn reconcile_batch(&self) -> Result<ReconciliationStats, ReconApiError> {
        let touched = self.db.fetch_unclassified().await?;
        debug!("🔄️ Classifying {} touched orders", touched.len());
        for order in touched {
            let (status, details) = classify(&order, &self.policy);
            self.db.mark_classified(order.id, status, &details).await?;
            if status != order.match_status {
                trace!("🔄️ Order {} moved {} -> {status}", order.key(), order.match_status);
                self.call_order_classified_hook(order, status, details).await;
            }
        }

        let mut stats = ReconciliationStats::default();
        for StatusCount { status, count } in self.db.status_counts().await? {
            *stats.counts.entry(status).or_default() += count;
            stats.total += count;
        }
        for UnmatchedCount { kind, count } in self.db.unmatched_counts().await? {
            *stats.counts.entry(kind.only_status()).or_default() += count;
            stats.total += count;
        }
        self.call_batch_reconciled_hook(&stats).await;
        info!("🔄️ Reconciliation complete. {stats}");
        Ok(stats)
    }

    /// Read access for reporting collaborators.
    pub async fn query_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, ReconApiError> {
        trace!("🔄️ Order query: {filter}");
        let orders = self.db.search_orders(filter).await?;
        Ok(orders)
    }

    async fn ingest_primary_rows(
        &self,
        rows: &[RawRow],
        mapping: &FieldMapping,
    ) -> Result<(usize, usize), ReconApiError> {
        let mut processed = 0;
        let mut skipped = 0;
        for row in rows {
            let rec = match PrimaryRecord::from_row(row, mapping) {
                Ok(rec) => rec,
                Err(e) => {
                    debug!("🔄️ Dropping machine-log row: {e}");
                    skipped += 1;
                    continue;
                },
            };
            if rec.is_refunded() {
                debug!("🔄️ Skipping refunded order {}", rec.key());
                skipped += 1;
                continue;
            }
            let primary_price = rec.order_price;
            let (order, inserted) = self.db.upsert_primary(rec).await?;
            if !inserted && order.match_status == MatchStatus::EnrichmentOnly {
                // The accounting export saw this order first. Now that the machine log confirms it, run the same
                // acceptance check the enrichment stage applies, against the merged time fields.
                match order.event_time {
                    Some(event_time) => {
                        let outcome = evaluate_enrichment(&order, event_time, primary_price);
                        self.settle_enrichment_outcome(&order, outcome).await?;
                    },
                    None => {
                        self.db.update_match_status(order.id, MatchStatus::Matched, None).await?;
                    },
                }
            }
            processed += 1;
        }
        Ok((processed, skipped))
    }

    async fn ingest_enrichment_rows(
        &self,
        rows: &[RawRow],
        mapping: &FieldMapping,
    ) -> Result<(usize, usize), ReconApiError> {
        let mut processed = 0;
        let mut skipped = 0;
        for row in rows {
            let rec = match EnrichmentRecord::from_row(row, mapping) {
                Ok(rec) => rec,
                Err(e) => {
                    debug!("🔄️ Dropping accounting-export row: {e}");
                    skipped += 1;
                    continue;
                },
            };
            match self.db.fetch_order_by_key(&rec.key()).await? {
                Some(order) if order.has_source(SourceKind::Enrichment) => {
                    // Same source kind, same key: last write wins on the enrichment fields, provided the row
                    // still passes the acceptance check. A stray failing duplicate never demotes a settled order.
                    match evaluate_enrichment(&order, rec.event_time, rec.order_price) {
                        EnrichmentOutcome::Accepted => {
                            self.db.merge_enrichment(order.id, rec).await?;
                        },
                        _ => trace!("🔄️ Repeated enrichment row for {} fails validation. No-op.", order.key()),
                    }
                },
                Some(order) => {
                    let outcome = evaluate_enrichment(&order, rec.event_time, rec.order_price);
                    match outcome {
                        EnrichmentOutcome::Accepted => {
                            self.db.merge_enrichment(order.id, rec).await?;
                        },
                        rejected => {
                            self.settle_enrichment_outcome(&order, rejected).await?;
                        },
                    }
                },
                None => {
                    // Visible internally but never seen on the machine: a corroboration gap worth flagging.
                    self.db.insert_enrichment_order(rec).await?;
                },
            }
            processed += 1;
        }
        Ok((processed, skipped))
    }

    async fn settle_enrichment_outcome(
        &self,
        order: &Order,
        outcome: EnrichmentOutcome,
    ) -> Result<(), ReconApiError> {
        let status = match &outcome {
            EnrichmentOutcome::Accepted => MatchStatus::Matched,
            EnrichmentOutcome::TimeOutOfRange { .. } => MatchStatus::TimeOutOfRange,
            EnrichmentOutcome::PriceMismatch { .. } => MatchStatus::PriceMismatch,
        };
        let details = outcome.details();
        self.db.update_match_status(order.id, status, details.as_deref()).await?;
        Ok(())
    }

    async fn ingest_fiscal_rows(
        &self,
        rows: &[RawRow],
        mapping: &FieldMapping,
    ) -> Result<(usize, usize), ReconApiError> {
        let mut processed = 0;
        let mut skipped = 0;
        let mut fresh: Vec<FiscalRecord> = Vec::new();
        for row in rows {
            match FiscalRecord::from_row(row, mapping) {
                Ok(rec) => {
                    if self.db.fiscal_receipt_attached(&rec).await? {
                        trace!("🔄️ Receipt already corroborates an order. No-op.");
                        processed += 1;
                    } else {
                        fresh.push(rec);
                    }
                },
                Err(e) => {
                    debug!("🔄️ Dropping fiscal row: {e}");
                    skipped += 1;
                },
            }
        }

        // Score every (receipt, candidate) pair before attaching anything, then assign greedily by time delta.
        // This makes the nearest receipt win an order regardless of row order in the file.
        let mut pairs: Vec<(i64, usize, i64)> = Vec::new();
        for (idx, rec) in fresh.iter().enumerate() {
            for order in self.db.find_fiscal_candidates(rec.fiscal_time, rec.amount).await? {
                if let Some(paying_time) = order.paying_time {
                    let delta = (paying_time - rec.fiscal_time).num_milliseconds().abs();
                    pairs.push((delta, idx, order.id));
                }
            }
        }
        let matched = self
            .assign_nearest(pairs, |idx, order_id| {
                let rec = fresh[idx].clone();
                async move { self.db.attach_fiscal(order_id, rec).await.map(|_| ()) }
            })
            .await?;

        for (idx, rec) in fresh.into_iter().enumerate() {
            if !matched.contains(&idx) {
                debug!("🔄️ No cash order corroborates this receipt. Retaining for audit.");
                self.db.insert_unmatched(SourceKind::FiscalReceipt, rec.fiscal_time, rec.amount, rec.raw).await?;
            }
            processed += 1;
        }
        Ok((processed, skipped))
    }

    async fn ingest_gateway_rows(
        &self,
        rows: &[RawRow],
        mapping: &FieldMapping,
        provider: GatewayProvider,
    ) -> Result<(usize, usize), ReconApiError> {
        let mut processed = 0;
        let mut skipped = 0;
        let mut fresh: Vec<GatewayRecord> = Vec::new();
        for row in rows {
            match GatewayRecord::from_row(row, mapping, provider) {
                Ok(rec) => {
                    if self.db.gateway_settlement_attached(&rec).await? {
                        trace!("🔄️ {provider} settlement already corroborates an order. No-op.");
                        processed += 1;
                    } else {
                        fresh.push(rec);
                    }
                },
                Err(e) => {
                    debug!("🔄️ Dropping {provider} row: {e}");
                    skipped += 1;
                },
            }
        }

        let mut pairs: Vec<(i64, usize, i64)> = Vec::new();
        for (idx, rec) in fresh.iter().enumerate() {
            for order in self.db.find_gateway_candidates(rec.transaction_time, rec.amount).await? {
                if let Some(paying_time) = order.paying_time {
                    let delta = (paying_time - rec.transaction_time).num_milliseconds().abs();
                    pairs.push((delta, idx, order.id));
                }
            }
        }
        let matched = self
            .assign_nearest(pairs, |idx, order_id| {
                let rec = fresh[idx].clone();
                async move { self.db.attach_gateway(order_id, rec).await.map(|_| ()) }
            })
            .await?;

        for (idx, rec) in fresh.into_iter().enumerate() {
            if !matched.contains(&idx) {
                debug!("🔄️ No custom-payment order corroborates this {provider} settlement. Retaining for audit.");
                self.db
                    .insert_unmatched(provider.source_kind(), rec.transaction_time, rec.amount, rec.raw)
                    .await?;
            }
            processed += 1;
        }
        Ok((processed, skipped))
    }

    /// Greedy nearest-first assignment over (delta, record index, order id) triples. Each order takes at most one
    /// record and vice versa; equal deltas fall back to record then order id, which keeps ambiguous matches
    /// deterministic.
    async fn assign_nearest<F, Fut>(
        &self,
        mut pairs: Vec<(i64, usize, i64)>,
        attach: F,
    ) -> Result<HashSet<usize>, ReconApiError>
    where
        F: Fn(usize, i64) -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::db::traits::ReconDbError>>,
    {
        pairs.sort_unstable();
        let mut used_orders: HashSet<i64> = HashSet::new();
        let mut matched: HashSet<usize> = HashSet::new();
        for (_, idx, order_id) in pairs {
            if used_orders.contains(&order_id) || matched.contains(&idx) {
                continue;
            }
            attach(idx, order_id).await?;
            used_orders.insert(order_id);
            matched.insert(idx);
        }
        Ok(matched)
    }

    async fn call_order_classified_hook(&self, order: Order, status: MatchStatus, details: String) {
        if self.producers.order_classified_producer.is_empty() {
            return;
        }
        let previous = order.match_status;
        let mut updated = order;
        updated.match_status = status;
        updated.mismatch_details = Some(details);
        for emitter in &self.producers.order_classified_producer {
            let event = OrderClassifiedEvent::new(updated.clone(), previous);
            emitter.publish_event(event).await;
        }
    }

    async fn call_batch_reconciled_hook(&self, stats: &ReconciliationStats) {
        for emitter in &self.producers.batch_reconciled_producer {
            let event = BatchReconciledEvent::new(stats.clone());
            emitter.publish_event(event).await;
        }
    }
}
