//! Embedded forward-only schema migrations.
//!
//! Each migration runs in one transaction together with its
//! `schema_version` bump, so a crash mid-migration leaves the previous
//! version intact. Migrations are never edited after shipping; schema
//! changes append a new entry.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// One schema migration.
pub(crate) struct Migration {
    /// Monotonic schema version this migration produces.
    pub version: i64,
    /// Short description for logs.
    pub name: &'static str,
    /// Semicolon-separated DDL statements.
    pub sql: &'static str,
}

/// All migrations in version order.
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core schema",
        sql: r"
CREATE TABLE games (
    game_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    creator TEXT NOT NULL,
    entry_fee_wei TEXT NOT NULL,
    base_reward_wei TEXT NOT NULL,
    bps_first INTEGER NOT NULL,
    bps_second INTEGER NOT NULL,
    bps_third INTEGER NOT NULL,
    bps_kills INTEGER NOT NULL,
    bps_creator INTEGER NOT NULL,
    zone_center_lat INTEGER NOT NULL,
    zone_center_lng INTEGER NOT NULL,
    meeting_point_lat INTEGER NOT NULL,
    meeting_point_lng INTEGER NOT NULL,
    registration_deadline INTEGER NOT NULL,
    game_date INTEGER NOT NULL,
    max_duration_secs INTEGER NOT NULL,
    min_players INTEGER NOT NULL,
    phase TEXT NOT NULL,
    sub_phase TEXT,
    sub_phase_started_at INTEGER,
    started_at INTEGER,
    ended_at INTEGER,
    player_count INTEGER NOT NULL DEFAULT 0,
    total_collected_wei TEXT NOT NULL DEFAULT '0',
    winner_first TEXT,
    winner_second TEXT,
    winner_third TEXT,
    winner_top_killer TEXT
);

CREATE TABLE zone_shrinks (
    game_id INTEGER NOT NULL,
    at_second INTEGER NOT NULL,
    radius_meters INTEGER NOT NULL,
    PRIMARY KEY (game_id, at_second)
);

CREATE TABLE players (
    game_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    player_number INTEGER NOT NULL,
    is_alive INTEGER NOT NULL DEFAULT 1,
    kills INTEGER NOT NULL DEFAULT 0,
    checked_in INTEGER NOT NULL DEFAULT 0,
    bluetooth_id TEXT,
    last_heartbeat_at INTEGER,
    eliminated_at INTEGER,
    elimination_order INTEGER,
    eliminated_by TEXT,
    elimination_reason TEXT,
    has_claimed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (game_id, address),
    UNIQUE (game_id, player_number)
);

CREATE INDEX idx_players_alive ON players (game_id, is_alive);

CREATE TABLE target_assignments (
    game_id INTEGER NOT NULL,
    hunter TEXT NOT NULL,
    target TEXT NOT NULL,
    PRIMARY KEY (game_id, hunter),
    UNIQUE (game_id, target)
);

CREATE TABLE kills (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL,
    hunter TEXT NOT NULL,
    target TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    hunter_lat INTEGER NOT NULL,
    hunter_lng INTEGER NOT NULL,
    target_lat INTEGER NOT NULL,
    target_lng INTEGER NOT NULL,
    distance_meters REAL NOT NULL,
    tx_hash TEXT
);

CREATE INDEX idx_kills_game ON kills (game_id, timestamp);

CREATE TABLE heartbeat_scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL,
    scanner TEXT NOT NULL,
    scanned TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    scanner_lat INTEGER NOT NULL,
    scanner_lng INTEGER NOT NULL,
    distance_meters REAL NOT NULL
);

CREATE TABLE location_pings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    lat INTEGER NOT NULL,
    lng INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    is_in_zone INTEGER NOT NULL
);

CREATE INDEX idx_pings_latest ON location_pings (game_id, address, id);

CREATE TABLE operator_txs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER,
    action TEXT NOT NULL,
    params TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    tx_hash TEXT,
    created_at INTEGER NOT NULL,
    confirmed_at INTEGER,
    last_error TEXT
);

CREATE INDEX idx_operator_txs_status ON operator_txs (status, id);

CREATE TABLE sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)",
    },
    Migration {
        version: 2,
        name: "kill-proof photos",
        sql: r"
CREATE TABLE game_photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL,
    hunter TEXT NOT NULL,
    target TEXT NOT NULL,
    taken_at INTEGER NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE INDEX idx_photos_game ON game_photos (game_id, taken_at)",
    },
];

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns a store error when DDL fails; the failed migration's transaction
/// rolls back and `schema_version` is left at the previous value.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    let current = current.unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;

        for statement in migration.sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
