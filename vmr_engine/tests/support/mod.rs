#![allow(dead_code)]
//! Shared setup for the integration suite: a throwaway SQLite database per test, migrated and ready.

use std::collections::HashMap;

use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};
use vmr_engine::SqliteDatabase;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_url() -> String {
    format!("sqlite://{}/vmr_test_store_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/db/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

pub async fn fresh_db() -> SqliteDatabase {
    let url = random_db_url();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn row(cells: &[(&str, &str)]) -> HashMap<String, String> {
    cells.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub const PRIMARY_HEADERS: &[&str] = &[
    "Order number",
    "Machine code",
    "Creation time",
    "Paying time",
    "Brewing time",
    "Delivery time",
    "Refund time",
    "Order price",
    "Goods name",
    "Order resource",
];

pub const ENRICHMENT_HEADERS: &[&str] = &[
    "Order number",
    "Machine code",
    "Order time",
    "Order price",
    "Payment type",
    "Goods id",
    "Goods name",
    "Machine category",
    "Username",
];

pub const FISCAL_HEADERS: &[&str] =
    &["fiscal_check_number", "fiscal_time", "amount", "taxpayer_id", "cash_register_id", "shift_number"];

pub const PAYME_HEADERS: &[&str] =
    &["transaction_id", "transaction_time", "amount", "masked_pan", "merchant_id", "terminal_id", "status"];
