pub mod from_row;
pub mod queries;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;
use crate::payments::ProcessorApi;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub processor: Arc<dyn ProcessorApi>,
    pub webhook_secret: String,
    pub base_url: String,
}

pub fn init_db_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")
    });
    let pool = r2d2::Pool::new(manager)?;
    let conn = pool.get()?;
    init_db(&conn)?;
    Ok(pool)
}

/// Create the schema. Idempotent; runs at startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            purchased_course_ids TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            price_cents INTEGER,
            currency TEXT,
            access_duration TEXT,
            created_at INTEGER NOT NULL
        );

        -- Course access keyed by (user, course); the entitlement map of the
        -- user aggregate. Mutated only by grant_entitlement_atomic.
        CREATE TABLE IF NOT EXISTS user_entitlements (
            user_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            access_duration TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            purchased_at INTEGER NOT NULL,
            course_title TEXT NOT NULL,
            completed_tutorials TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (user_id, course_id)
        );

        -- Idempotency ledger, keyed by processor payment id. Never deleted.
        CREATE TABLE IF NOT EXISTS processed_payments (
            payment_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            user_id TEXT,
            course_id TEXT,
            is_subscription INTEGER NOT NULL DEFAULT 0,
            is_renewal INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS checkout_intents (
            reference TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL,
            user_email TEXT,
            user_name TEXT,
            course_title TEXT,
            payment_id TEXT,
            payment_status TEXT,
            subscription_id TEXT,
            failure_reason TEXT,
            started_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_intents_status_started
            ON checkout_intents (status, started_at);

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL,
            payer_email TEXT,
            management_url TEXT,
            last_payment_id TEXT,
            last_payment_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user
            ON subscriptions (user_id);

        CREATE TABLE IF NOT EXISTS cancellation_feedback (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            subscription_id TEXT NOT NULL,
            feedback TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );",
    )?;
    Ok(())
}
