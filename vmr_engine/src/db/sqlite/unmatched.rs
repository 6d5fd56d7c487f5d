use chrono::NaiveDateTime;
use log::trace;
use sqlx::{types::Json, SqliteConnection};
use vmr_common::Som;

use crate::{db::traits::UnmatchedCount, db_types::SourceKind};

/// Retains a receipt/settlement row that matched no order. The identity constraint makes re-ingestion of the same
/// file a no-op rather than a growing audit table.
pub(crate) async fn insert(
    kind: SourceKind,
    record_time: NaiveDateTime,
    amount: Som,
    payload: serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO unmatched_records (kind, record_time, amount, payload) VALUES ($1, $2, $3, $4) ON CONFLICT DO \
         NOTHING",
    )
    .bind(kind.to_string())
    .bind(record_time)
    .bind(amount.value())
    .bind(Json(payload))
    .execute(conn)
    .await?;
    trace!("🗃️ Unmatched {kind} record retained ({} new)", result.rows_affected());
    Ok(())
}

pub(crate) async fn counts(conn: &mut SqliteConnection) -> Result<Vec<UnmatchedCount>, sqlx::Error> {
    sqlx::query_as("SELECT kind, COUNT(*) AS count FROM unmatched_records GROUP BY kind").fetch_all(conn).await
}
