//! Integration tests against a live MySQL database.
//!
//! These tests require DATABASE_* environment variables pointing at a
//! database the tests may create and drop tables in.
//! Run with: cargo test --test integration -- --ignored

use abstractions_api::config::DatabaseConfig;
use abstractions_api::db::{
    lazy_pool, migration_pool, query_json, ConnectionGate, GatePolicy, MySqlProbe,
};
use abstractions_api::migrations::{Migration, MigrationSet, MigrationStore, Migrator, MySqlMigrationStore};
use pretty_assertions::assert_eq;
use sqlx::mysql::MySqlPool;

/// Get a test config from environment.
fn test_config() -> Option<DatabaseConfig> {
    dotenvy::dotenv().ok();

    // Skip unless a database is explicitly configured
    std::env::var("DATABASE_HOST").ok()?;
    DatabaseConfig::load().ok()
}

fn table_name(prefix: &str) -> String {
    format!("{}_{}", prefix, std::process::id())
}

async fn drop_table(pool: &MySqlPool, table: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(pool)
        .await
        .unwrap();
}

/// The gate opens on the first probe against a running database.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_gate_opens_immediately() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };

    let mut gate = ConnectionGate::new(
        MySqlProbe::new(config.connect_options()),
        GatePolicy::default(),
    );
    assert_eq!(gate.wait().await.unwrap(), 1);
}

/// Rows come back as objects keyed by column, in column order.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_query_json_organizers() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);
    let table = table_name("organizer_it");

    drop_table(&pool, &table).await;
    sqlx::query(&format!(
        "CREATE TABLE {table} (id INT NOT NULL PRIMARY KEY, name VARCHAR(64) NOT NULL)"
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!("INSERT INTO {table} VALUES (1, 'Alice'), (2, 'Bob')"))
        .execute(&pool)
        .await
        .unwrap();

    let json = query_json(&pool, &format!("SELECT * FROM {table} ORDER BY id")).await;
    drop_table(&pool, &table).await;

    assert_eq!(
        json.unwrap(),
        r#"[{"id":1,"name":"Alice"},{"id":2,"name":"Bob"}]"#
    );
}

/// Mixed column types keep their native JSON types; blobs become text.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_query_json_column_types() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);
    let table = table_name("types_it");

    drop_table(&pool, &table).await;
    sqlx::query(&format!(
        "CREATE TABLE {table} (id BIGINT, active BOOLEAN, score DOUBLE, logo BLOB, note TEXT NULL)"
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "INSERT INTO {table} VALUES (7, TRUE, 2.5, 'Acme Corp', NULL)"
    ))
    .execute(&pool)
    .await
    .unwrap();

    let json = query_json(&pool, &format!("SELECT * FROM {table}")).await;
    let empty = query_json(&pool, &format!("SELECT * FROM {table} WHERE id < 0")).await;
    drop_table(&pool, &table).await;

    let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{ "id": 7, "active": true, "score": 2.5, "logo": "Acme Corp", "note": null }])
    );
    assert_eq!(empty.unwrap(), "[]");
}

/// Out-of-range TIME values and zero dates render as text instead of failing.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_query_json_temporal_edge_values() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);
    let table = table_name("temporal_it");
    drop_table(&pool, &table).await;

    // Zero dates need a permissive sql_mode, which is per session.
    let mut conn = pool.acquire().await.unwrap();
    sqlx::query("SET SESSION sql_mode = ''")
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {table} (id INT, long_time TIME, negative_time TIME, day DATE, stamp DATETIME)"
    ))
    .execute(&mut *conn)
    .await
    .unwrap();
    sqlx::query(&format!(
        "INSERT INTO {table} VALUES (1, '25:00:00', '-01:00:00', '0000-00-00', '0000-00-00 00:00:00'), \
         (2, '838:59:59', '00:00:01', '2016-08-12', '2016-08-12 09:30:00')"
    ))
    .execute(&mut *conn)
    .await
    .unwrap();
    drop(conn);

    let json = query_json(&pool, &format!("SELECT * FROM {table} ORDER BY id")).await;
    drop_table(&pool, &table).await;

    let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!([
            {
                "id": 1,
                "long_time": "25:00:00",
                "negative_time": "-01:00:00",
                "day": "0000-00-00",
                "stamp": "0000-00-00 00:00:00"
            },
            {
                "id": 2,
                "long_time": "838:59:59",
                "negative_time": "00:00:01",
                "day": "2016-08-12",
                "stamp": "2016-08-12 09:30:00"
            }
        ])
    );
}

/// A bad query is an error, not partial output.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_query_json_bad_query() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);

    let result = query_json(&pool, "SELECT * FROM table_that_does_not_exist").await;
    assert!(result.is_err());
}

/// Migrations are recorded and not re-applied.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_migrations_record_versions() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);
    let table = table_name("migrated_it");
    drop_table(&pool, &table).await;

    let mut store = MySqlMigrationStore::new(migration_pool(&config).unwrap());
    store.prepare().await.unwrap();
    let base = store.current_version().await.unwrap().unwrap_or(0);

    let set = MigrationSet::new(vec![
        Migration::new(base + 1, "create", format!("CREATE TABLE {table} (id INT)")),
        Migration::new(base + 2, "seed", format!("INSERT INTO {table} VALUES (1); INSERT INTO {table} VALUES (2);")),
    ])
    .unwrap();

    let mut migrator = Migrator::new(store);
    let first = migrator.up(&set).await.unwrap();
    assert_eq!(first.applied, vec![base + 1, base + 2]);

    let second = migrator.up(&set).await.unwrap();
    assert!(second.applied.is_empty());

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&pool)
        .await
        .unwrap();
    drop_table(&pool, &table).await;
    sqlx::query("DELETE FROM schema_migrations WHERE version > ?")
        .bind(base as i64)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(count, 2);
}

/// A step that fails after running DDL leaves no version behind.
#[tokio::test]
#[ignore = "requires DATABASE_HOST"]
async fn test_failed_migration_is_not_recorded() {
    let Some(config) = test_config() else {
        println!("Skipping: DATABASE_HOST not set");
        return;
    };
    let pool = lazy_pool(&config);
    let table = table_name("partial_it");
    drop_table(&pool, &table).await;

    let mut store = MySqlMigrationStore::new(migration_pool(&config).unwrap());
    store.prepare().await.unwrap();
    let base = store.current_version().await.unwrap().unwrap_or(0);

    let broken = Migration::new(
        base + 1,
        "partial",
        format!("CREATE TABLE {table} (id INT); INSERT INTO table_that_does_not_exist VALUES (1);"),
    );
    let result = store.apply(&broken).await;
    let after = store.current_version().await.unwrap().unwrap_or(0);
    drop_table(&pool, &table).await;

    assert!(result.is_err());
    assert_eq!(after, base);
}
