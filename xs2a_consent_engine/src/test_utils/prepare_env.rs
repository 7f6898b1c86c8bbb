use std::path::Path;

use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().expect("Database path is not valid UTF-8");
    if let Some(parent) = Path::new(p.trim_start_matches("sqlite://")).parent() {
        std::fs::create_dir_all(parent).expect("Error creating database folder");
    }
    if let Err(e) = Sqlite::drop_database(p).await {
        warn!("🚀️ Error dropping database {p}: {e:?}");
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {p}");
}

/// A migrated, empty database at a random path. Returns the database and its URL.
pub async fn new_test_database() -> (SqliteDatabase, String) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    (db, url)
}

/// Closes the database and deletes its file.
pub async fn drop_test_database(mut db: SqliteDatabase, url: &str) {
    use crate::traits::ConsentDatabase;
    if let Err(e) = db.close().await {
        warn!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("🚀️ Failed to drop database {url}: {e}");
    }
}
