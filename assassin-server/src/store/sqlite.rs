//! SQLite implementation of the store ports using SQLx.
//!
//! # Type Conversions
//!
//! SQLite stores signed integers; the domain uses unsigned counts and u64
//! ids. These casts are safe because:
//! - Game ids and block numbers stay far below `i64::MAX`
//! - Player counts fit in u32
//! - Coordinates are micro-degrees, bounded by ±180e6
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]

use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, instrument};

use crate::error::{Result, ServerError, StoreError};
use crate::geo::GeoPoint;
use crate::ports::store::{
    AtomicStore, EliminationUpdate, GameStore, HeartbeatStore, KillStore, LocationStore,
    OperatorTxStore, PhaseUpdate, PhotoStore, PlayerStore, RewireUpdate, SyncStore, TargetStore,
};
use crate::types::entities::{
    Game, GamePhoto, HeartbeatScan, Kill, LocationPing, OperatorTx, Player, PrizeSplit,
    SyncCursor, TargetAssignment, Winners, ZoneShrink,
};
use crate::types::enums::{EliminationReason, GamePhase, OperatorTxStatus, SubPhase};
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

use super::migrations;

/// `sync_state` key for the listener cursor.
const SYNC_KEY_LAST_BLOCK: &str = "last_processed_block";
/// `sync_state` key for the contract address the cursor was built against.
const SYNC_KEY_CONTRACT: &str = "contract_address";

// ═══════════════════════════════════════════════════════════════════════════════
// STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// SQLite-backed store.
///
/// Cloning is cheap; all clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] when the integrity check fails, or
    /// a database error when the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Open an in-memory database. Used by tests and the simulation setup.
    ///
    /// # Errors
    ///
    /// Returns a database error when the pool cannot be created.
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let check: String = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_one(&pool)
            .await?;
        if check != "ok" {
            return Err(StoreError::Corrupted(check).into());
        }

        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for maintenance queries.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLUMN CODECS
// ═══════════════════════════════════════════════════════════════════════════════

fn addr_to_db(addr: Address) -> String {
    format!("{addr:#x}")
}

fn addr_from_db(s: &str) -> Result<Address> {
    s.parse()
        .map_err(|_| StoreError::Corrupted(format!("bad address column: {s}")).into())
}

fn opt_addr_from_db(s: Option<&str>) -> Result<Option<Address>> {
    s.map(addr_from_db).transpose()
}

fn wei_to_db(value: U256) -> String {
    value.to_string()
}

fn wei_from_db(s: &str) -> Result<U256> {
    U256::from_str(s).map_err(|_| StoreError::Corrupted(format!("bad wei column: {s}")).into())
}

fn point_from_db(lat_e6: i64, lng_e6: i64) -> Result<GeoPoint> {
    GeoPoint::from_fixed(lat_e6, lng_e6)
        .map_err(|e| StoreError::Corrupted(format!("bad coordinate columns: {e}")).into())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROW TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct GameRow {
    game_id: i64,
    title: String,
    creator: String,
    entry_fee_wei: String,
    base_reward_wei: String,
    bps_first: i64,
    bps_second: i64,
    bps_third: i64,
    bps_kills: i64,
    bps_creator: i64,
    zone_center_lat: i64,
    zone_center_lng: i64,
    meeting_point_lat: i64,
    meeting_point_lng: i64,
    registration_deadline: i64,
    game_date: i64,
    max_duration_secs: i64,
    min_players: i64,
    phase: String,
    sub_phase: Option<String>,
    sub_phase_started_at: Option<i64>,
    started_at: Option<i64>,
    ended_at: Option<i64>,
    player_count: i64,
    total_collected_wei: String,
    winner_first: Option<String>,
    winner_second: Option<String>,
    winner_third: Option<String>,
    winner_top_killer: Option<String>,
}

impl GameRow {
    fn into_game(self) -> Result<Game> {
        let phase = GamePhase::parse(&self.phase)
            .ok_or_else(|| StoreError::Corrupted(format!("bad phase column: {}", self.phase)))?;
        let sub_phase = match self.sub_phase.as_deref() {
            None => None,
            Some(s) => Some(SubPhase::parse(s).ok_or_else(|| {
                StoreError::Corrupted(format!("bad sub_phase column: {s}"))
            })?),
        };

        let winners = match (&self.winner_first, &self.winner_top_killer) {
            (Some(first), Some(top_killer)) => Some(Winners {
                first: addr_from_db(first)?,
                second: opt_addr_from_db(self.winner_second.as_deref())?,
                third: opt_addr_from_db(self.winner_third.as_deref())?,
                top_killer: addr_from_db(top_killer)?,
            }),
            _ => None,
        };

        Ok(Game {
            id: GameId::new(self.game_id as u64),
            title: self.title,
            creator: addr_from_db(&self.creator)?,
            entry_fee_wei: wei_from_db(&self.entry_fee_wei)?,
            base_reward_wei: wei_from_db(&self.base_reward_wei)?,
            split: PrizeSplit {
                first_bps: self.bps_first as u16,
                second_bps: self.bps_second as u16,
                third_bps: self.bps_third as u16,
                kills_bps: self.bps_kills as u16,
                creator_bps: self.bps_creator as u16,
            },
            zone_center: point_from_db(self.zone_center_lat, self.zone_center_lng)?,
            meeting_point: point_from_db(self.meeting_point_lat, self.meeting_point_lng)?,
            registration_deadline: self.registration_deadline,
            game_date: self.game_date,
            max_duration_secs: self.max_duration_secs,
            min_players: self.min_players as u32,
            phase,
            sub_phase,
            sub_phase_started_at: self.sub_phase_started_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            player_count: self.player_count as u32,
            total_collected_wei: wei_from_db(&self.total_collected_wei)?,
            winners,
        })
    }
}

const GAME_COLUMNS: &str = "game_id, title, creator, entry_fee_wei, base_reward_wei, \
    bps_first, bps_second, bps_third, bps_kills, bps_creator, \
    zone_center_lat, zone_center_lng, meeting_point_lat, meeting_point_lng, \
    registration_deadline, game_date, max_duration_secs, min_players, \
    phase, sub_phase, sub_phase_started_at, started_at, ended_at, \
    player_count, total_collected_wei, \
    winner_first, winner_second, winner_third, winner_top_killer";

#[derive(Debug, FromRow)]
struct PlayerRow {
    game_id: i64,
    address: String,
    player_number: i64,
    is_alive: i64,
    kills: i64,
    checked_in: i64,
    bluetooth_id: Option<String>,
    last_heartbeat_at: Option<i64>,
    eliminated_at: Option<i64>,
    elimination_order: Option<i64>,
    eliminated_by: Option<String>,
    elimination_reason: Option<String>,
    has_claimed: i64,
}

impl PlayerRow {
    fn into_player(self) -> Result<Player> {
        let elimination_reason = match self.elimination_reason.as_deref() {
            None => None,
            Some(s) => Some(EliminationReason::parse(s).ok_or_else(|| {
                StoreError::Corrupted(format!("bad elimination_reason column: {s}"))
            })?),
        };

        Ok(Player {
            game_id: GameId::new(self.game_id as u64),
            address: addr_from_db(&self.address)?,
            number: PlayerNumber::new(self.player_number as u32),
            is_alive: self.is_alive != 0,
            kills: self.kills as u32,
            checked_in: self.checked_in != 0,
            bluetooth_id: self.bluetooth_id,
            last_heartbeat_at: self.last_heartbeat_at,
            eliminated_at: self.eliminated_at,
            elimination_order: self.elimination_order.map(|o| o as u32),
            eliminated_by: opt_addr_from_db(self.eliminated_by.as_deref())?,
            elimination_reason,
            has_claimed: self.has_claimed != 0,
        })
    }
}

#[derive(Debug, FromRow)]
struct KillRow {
    game_id: i64,
    hunter: String,
    target: String,
    timestamp: i64,
    hunter_lat: i64,
    hunter_lng: i64,
    target_lat: i64,
    target_lng: i64,
    distance_meters: f64,
    tx_hash: Option<String>,
}

impl KillRow {
    fn into_kill(self) -> Result<Kill> {
        Ok(Kill {
            game_id: GameId::new(self.game_id as u64),
            hunter: addr_from_db(&self.hunter)?,
            target: addr_from_db(&self.target)?,
            timestamp: self.timestamp,
            hunter_pos: point_from_db(self.hunter_lat, self.hunter_lng)?,
            target_pos: point_from_db(self.target_lat, self.target_lng)?,
            distance_meters: self.distance_meters,
            tx_hash: self.tx_hash,
        })
    }
}

#[derive(Debug, FromRow)]
struct PingRow {
    game_id: i64,
    address: String,
    lat: i64,
    lng: i64,
    timestamp: i64,
    is_in_zone: i64,
}

impl PingRow {
    fn into_ping(self) -> Result<LocationPing> {
        Ok(LocationPing {
            game_id: GameId::new(self.game_id as u64),
            address: addr_from_db(&self.address)?,
            point: point_from_db(self.lat, self.lng)?,
            timestamp: self.timestamp,
            is_in_zone: self.is_in_zone != 0,
        })
    }
}

#[derive(Debug, FromRow)]
struct OperatorTxRow {
    id: i64,
    game_id: Option<i64>,
    action: String,
    params: String,
    status: String,
    tx_hash: Option<String>,
    created_at: i64,
    confirmed_at: Option<i64>,
    last_error: Option<String>,
}

impl OperatorTxRow {
    fn into_tx(self) -> Result<OperatorTx> {
        let status = OperatorTxStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupted(format!("bad status column: {}", self.status)))?;
        Ok(OperatorTx {
            id: self.id,
            game_id: self.game_id.map(|id| GameId::new(id as u64)),
            action: self.action,
            params: self.params,
            status,
            tx_hash: self.tx_hash,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            last_error: self.last_error,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Eliminate a player within an open transaction.
///
/// A no-op when the player is already dead, so replayed chain events cannot
/// double-eliminate.
async fn eliminate_in(
    conn: &mut SqliteConnection,
    game_id: GameId,
    address: Address,
    reason: EliminationReason,
    eliminated_by: Option<Address>,
    timestamp: UnixSeconds,
) -> Result<()> {
    sqlx::query(
        "UPDATE players SET
            is_alive = 0,
            eliminated_at = ?,
            elimination_order =
                (SELECT COUNT(*) + 1 FROM players WHERE game_id = ? AND is_alive = 0),
            eliminated_by = ?,
            elimination_reason = ?
         WHERE game_id = ? AND address = ? AND is_alive = 1",
    )
    .bind(timestamp)
    .bind(game_id.value() as i64)
    .bind(eliminated_by.map(addr_to_db))
    .bind(reason.as_str())
    .bind(game_id.value() as i64)
    .bind(addr_to_db(address))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Apply a cycle rewire within an open transaction.
///
/// The victim's outgoing assignment must already be deleted: the
/// `(game_id, target)` uniqueness constraint requires removing the old edge
/// to the inherited target before pointing the hunter at it.
async fn rewire_in(
    conn: &mut SqliteConnection,
    game_id: GameId,
    victim: Address,
    rewire: RewireUpdate,
) -> Result<()> {
    sqlx::query("DELETE FROM target_assignments WHERE game_id = ? AND hunter = ?")
        .bind(game_id.value() as i64)
        .bind(addr_to_db(victim))
        .execute(&mut *conn)
        .await?;

    match rewire {
        RewireUpdate::Reassign { hunter, new_target } => {
            sqlx::query(
                "UPDATE target_assignments SET target = ? WHERE game_id = ? AND hunter = ?",
            )
            .bind(addr_to_db(new_target))
            .bind(game_id.value() as i64)
            .bind(addr_to_db(hunter))
            .execute(&mut *conn)
            .await?;
        }
        RewireUpdate::ClearHunter { hunter } => {
            sqlx::query("DELETE FROM target_assignments WHERE game_id = ? AND hunter = ?")
                .bind(game_id.value() as i64)
                .bind(addr_to_db(hunter))
                .execute(&mut *conn)
                .await?;
        }
        RewireUpdate::None => {}
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// GAME STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl GameStore for SqliteStore {
    #[instrument(skip(self, game), fields(game_id = %game.id))]
    async fn insert_game(&self, game: &Game) -> Result<()> {
        let (zc_lat, zc_lng) = game.zone_center.to_fixed();
        let (mp_lat, mp_lng) = game.meeting_point.to_fixed();

        sqlx::query(
            "INSERT INTO games (
                game_id, title, creator, entry_fee_wei, base_reward_wei,
                bps_first, bps_second, bps_third, bps_kills, bps_creator,
                zone_center_lat, zone_center_lng, meeting_point_lat, meeting_point_lng,
                registration_deadline, game_date, max_duration_secs, min_players,
                phase, sub_phase, sub_phase_started_at, started_at, ended_at,
                player_count, total_collected_wei
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game.id.value() as i64)
        .bind(&game.title)
        .bind(addr_to_db(game.creator))
        .bind(wei_to_db(game.entry_fee_wei))
        .bind(wei_to_db(game.base_reward_wei))
        .bind(i64::from(game.split.first_bps))
        .bind(i64::from(game.split.second_bps))
        .bind(i64::from(game.split.third_bps))
        .bind(i64::from(game.split.kills_bps))
        .bind(i64::from(game.split.creator_bps))
        .bind(zc_lat)
        .bind(zc_lng)
        .bind(mp_lat)
        .bind(mp_lng)
        .bind(game.registration_deadline)
        .bind(game.game_date)
        .bind(game.max_duration_secs)
        .bind(i64::from(game.min_players))
        .bind(game.phase.as_str())
        .bind(game.sub_phase.map(SubPhase::as_str))
        .bind(game.sub_phase_started_at)
        .bind(game.started_at)
        .bind(game.ended_at)
        .bind(i64::from(game.player_count))
        .bind(wei_to_db(game.total_collected_wei))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE game_id = ?"
        ))
        .bind(game_id.value() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GameRow::into_game).transpose()
    }

    #[instrument(skip(self, update))]
    async fn update_game_phase(
        &self,
        game_id: GameId,
        phase: GamePhase,
        update: &PhaseUpdate,
    ) -> Result<()> {
        let winners = update.winners.as_ref();
        sqlx::query(
            "UPDATE games SET
                phase = ?,
                sub_phase = ?,
                sub_phase_started_at = ?,
                started_at = COALESCE(?, started_at),
                ended_at = COALESCE(?, ended_at),
                winner_first = COALESCE(?, winner_first),
                winner_second = COALESCE(?, winner_second),
                winner_third = COALESCE(?, winner_third),
                winner_top_killer = COALESCE(?, winner_top_killer)
             WHERE game_id = ?",
        )
        .bind(phase.as_str())
        .bind(update.sub_phase.map(SubPhase::as_str))
        .bind(update.sub_phase_started_at)
        .bind(update.started_at)
        .bind(update.ended_at)
        .bind(winners.map(|w| addr_to_db(w.first)))
        .bind(winners.and_then(|w| w.second.map(addr_to_db)))
        .bind(winners.and_then(|w| w.third.map(addr_to_db)))
        .bind(winners.map(|w| addr_to_db(w.top_killer)))
        .bind(game_id.value() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_sub_phase(
        &self,
        game_id: GameId,
        sub_phase: SubPhase,
        started_at: UnixSeconds,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE games SET sub_phase = ?, sub_phase_started_at = ? WHERE game_id = ?",
        )
        .bind(sub_phase.as_str())
        .bind(started_at)
        .bind(game_id.value() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_games_in_phase(&self, phase: GamePhase) -> Result<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE phase = ? ORDER BY game_id"
        ))
        .bind(phase.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GameRow::into_game).collect()
    }

    async fn get_all_games(&self) -> Result<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games ORDER BY game_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GameRow::into_game).collect()
    }

    async fn update_player_count(
        &self,
        game_id: GameId,
        player_count: u32,
        total_collected_wei: U256,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE games SET player_count = ?, total_collected_wei = ? WHERE game_id = ?",
        )
        .bind(i64::from(player_count))
        .bind(wei_to_db(total_collected_wei))
        .bind(game_id.value() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_zone_shrinks(&self, game_id: GameId, schedule: &[ZoneShrink]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM zone_shrinks WHERE game_id = ?")
            .bind(game_id.value() as i64)
            .execute(&mut *tx)
            .await?;
        for step in schedule {
            sqlx::query(
                "INSERT INTO zone_shrinks (game_id, at_second, radius_meters) VALUES (?, ?, ?)",
            )
            .bind(game_id.value() as i64)
            .bind(step.at_second)
            .bind(i64::from(step.radius_meters))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_zone_shrinks(&self, game_id: GameId) -> Result<Vec<ZoneShrink>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT at_second, radius_meters FROM zone_shrinks
             WHERE game_id = ? ORDER BY at_second",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(at_second, radius)| ZoneShrink {
                at_second,
                radius_meters: radius as u32,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn reset_game_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "games",
            "zone_shrinks",
            "players",
            "target_assignments",
            "kills",
            "heartbeat_scans",
            "location_pings",
            "game_photos",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Wiped game tables for rebuild");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYER STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PlayerStore for SqliteStore {
    async fn insert_player(&self, player: &Player) -> Result<()> {
        sqlx::query(
            "INSERT INTO players (
                game_id, address, player_number, is_alive, kills, checked_in,
                bluetooth_id, last_heartbeat_at, eliminated_at, elimination_order,
                eliminated_by, elimination_reason, has_claimed
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(player.game_id.value() as i64)
        .bind(addr_to_db(player.address))
        .bind(i64::from(player.number.value()))
        .bind(i64::from(player.is_alive))
        .bind(i64::from(player.kills))
        .bind(i64::from(player.checked_in))
        .bind(player.bluetooth_id.as_deref())
        .bind(player.last_heartbeat_at)
        .bind(player.eliminated_at)
        .bind(player.elimination_order.map(i64::from))
        .bind(player.eliminated_by.map(addr_to_db))
        .bind(player.elimination_reason.map(EliminationReason::as_str))
        .bind(i64::from(player.has_claimed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_player(&self, game_id: GameId, address: Address) -> Result<Option<Player>> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE game_id = ? AND address = ?",
        )
        .bind(game_id.value() as i64)
        .bind(addr_to_db(address))
        .fetch_optional(&self.pool)
        .await?;

        row.map(PlayerRow::into_player).transpose()
    }

    async fn get_player_by_number(
        &self,
        game_id: GameId,
        number: PlayerNumber,
    ) -> Result<Option<Player>> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE game_id = ? AND player_number = ?",
        )
        .bind(game_id.value() as i64)
        .bind(i64::from(number.value()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(PlayerRow::into_player).transpose()
    }

    async fn get_players(&self, game_id: GameId) -> Result<Vec<Player>> {
        let rows = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE game_id = ?
             ORDER BY is_alive DESC, kills DESC, player_number ASC",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PlayerRow::into_player).collect()
    }

    async fn get_alive_players(&self, game_id: GameId) -> Result<Vec<Player>> {
        let rows = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE game_id = ? AND is_alive = 1
             ORDER BY player_number ASC",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PlayerRow::into_player).collect()
    }

    async fn get_player_count(&self, game_id: GameId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE game_id = ?")
            .bind(game_id.value() as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn get_alive_player_count(&self, game_id: GameId) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE game_id = ? AND is_alive = 1")
                .bind(game_id.value() as i64)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn get_checked_in_count(&self, game_id: GameId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM players WHERE game_id = ? AND checked_in = 1",
        )
        .bind(game_id.value() as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn eliminate_player(
        &self,
        game_id: GameId,
        address: Address,
        reason: EliminationReason,
        eliminated_by: Option<Address>,
        timestamp: UnixSeconds,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        eliminate_in(&mut conn, game_id, address, reason, eliminated_by, timestamp).await
    }

    async fn increment_player_kills(&self, game_id: GameId, address: Address) -> Result<()> {
        sqlx::query("UPDATE players SET kills = kills + 1 WHERE game_id = ? AND address = ?")
            .bind(game_id.value() as i64)
            .bind(addr_to_db(address))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_player_checked_in(
        &self,
        game_id: GameId,
        address: Address,
        bluetooth_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE players SET checked_in = 1, bluetooth_id = COALESCE(?, bluetooth_id)
             WHERE game_id = ? AND address = ?",
        )
        .bind(bluetooth_id)
        .bind(game_id.value() as i64)
        .bind(addr_to_db(address))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_player_claimed(&self, game_id: GameId, address: Address) -> Result<()> {
        sqlx::query("UPDATE players SET has_claimed = 1 WHERE game_id = ? AND address = ?")
            .bind(game_id.value() as i64)
            .bind(addr_to_db(address))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn init_players_heartbeat(&self, game_id: GameId, timestamp: UnixSeconds) -> Result<()> {
        sqlx::query(
            "UPDATE players SET last_heartbeat_at = ? WHERE game_id = ? AND is_alive = 1",
        )
        .bind(timestamp)
        .bind(game_id.value() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_heartbeat(
        &self,
        game_id: GameId,
        addresses: &[Address],
        timestamp: UnixSeconds,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for address in addresses {
            sqlx::query(
                "UPDATE players SET last_heartbeat_at = ? WHERE game_id = ? AND address = ?",
            )
            .bind(timestamp)
            .bind(game_id.value() as i64)
            .bind(addr_to_db(*address))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_heartbeat_expired_players(
        &self,
        game_id: GameId,
        now: UnixSeconds,
        interval_secs: i64,
    ) -> Result<Vec<Player>> {
        // Boundary is inclusive: a heartbeat exactly `interval` old expires.
        let rows = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players
             WHERE game_id = ? AND is_alive = 1
               AND last_heartbeat_at IS NOT NULL
               AND ? - last_heartbeat_at >= ?
             ORDER BY player_number ASC",
        )
        .bind(game_id.value() as i64)
        .bind(now)
        .bind(interval_secs)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PlayerRow::into_player).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TARGET STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl TargetStore for SqliteStore {
    async fn set_target_assignments(
        &self,
        game_id: GameId,
        assignments: &[(Address, Address)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM target_assignments WHERE game_id = ?")
            .bind(game_id.value() as i64)
            .execute(&mut *tx)
            .await?;
        for (hunter, target) in assignments {
            sqlx::query(
                "INSERT INTO target_assignments (game_id, hunter, target) VALUES (?, ?, ?)",
            )
            .bind(game_id.value() as i64)
            .bind(addr_to_db(*hunter))
            .bind(addr_to_db(*target))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_target_assignment(
        &self,
        game_id: GameId,
        hunter: Address,
        target: Address,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO target_assignments (game_id, hunter, target) VALUES (?, ?, ?)
             ON CONFLICT (game_id, hunter) DO UPDATE SET target = excluded.target",
        )
        .bind(game_id.value() as i64)
        .bind(addr_to_db(hunter))
        .bind(addr_to_db(target))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_target_assignment(
        &self,
        game_id: GameId,
        hunter: Address,
    ) -> Result<Option<Address>> {
        let target: Option<String> = sqlx::query_scalar(
            "SELECT target FROM target_assignments WHERE game_id = ? AND hunter = ?",
        )
        .bind(game_id.value() as i64)
        .bind(addr_to_db(hunter))
        .fetch_optional(&self.pool)
        .await?;

        target.as_deref().map(addr_from_db).transpose()
    }

    async fn remove_target_assignment(&self, game_id: GameId, hunter: Address) -> Result<()> {
        sqlx::query("DELETE FROM target_assignments WHERE game_id = ? AND hunter = ?")
            .bind(game_id.value() as i64)
            .bind(addr_to_db(hunter))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_hunter_of(&self, game_id: GameId, target: Address) -> Result<Option<Address>> {
        let hunter: Option<String> = sqlx::query_scalar(
            "SELECT hunter FROM target_assignments WHERE game_id = ? AND target = ?",
        )
        .bind(game_id.value() as i64)
        .bind(addr_to_db(target))
        .fetch_optional(&self.pool)
        .await?;

        hunter.as_deref().map(addr_from_db).transpose()
    }

    async fn get_target_assignments(&self, game_id: GameId) -> Result<Vec<TargetAssignment>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT hunter, target FROM target_assignments WHERE game_id = ?",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(hunter, target)| {
                Ok(TargetAssignment {
                    game_id,
                    hunter: addr_from_db(&hunter)?,
                    target: addr_from_db(&target)?,
                })
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KILL / LOCATION / HEARTBEAT / PHOTO IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl KillStore for SqliteStore {
    async fn insert_kill(&self, kill: &Kill) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_kill_in(&mut conn, kill).await
    }

    async fn update_kill_tx_hash(
        &self,
        game_id: GameId,
        hunter: Address,
        target: Address,
        tx_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE kills SET tx_hash = ?
             WHERE game_id = ? AND hunter = ? AND target = ? AND tx_hash IS NULL",
        )
        .bind(tx_hash)
        .bind(game_id.value() as i64)
        .bind(addr_to_db(hunter))
        .bind(addr_to_db(target))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_kills(&self, game_id: GameId) -> Result<Vec<Kill>> {
        let rows = sqlx::query_as::<_, KillRow>(
            "SELECT game_id, hunter, target, timestamp, hunter_lat, hunter_lng,
                    target_lat, target_lng, distance_meters, tx_hash
             FROM kills WHERE game_id = ? ORDER BY timestamp, id",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(KillRow::into_kill).collect()
    }
}

async fn insert_kill_in(conn: &mut SqliteConnection, kill: &Kill) -> Result<()> {
    let (h_lat, h_lng) = kill.hunter_pos.to_fixed();
    let (t_lat, t_lng) = kill.target_pos.to_fixed();

    sqlx::query(
        "INSERT INTO kills (
            game_id, hunter, target, timestamp,
            hunter_lat, hunter_lng, target_lat, target_lng, distance_meters, tx_hash
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(kill.game_id.value() as i64)
    .bind(addr_to_db(kill.hunter))
    .bind(addr_to_db(kill.target))
    .bind(kill.timestamp)
    .bind(h_lat)
    .bind(h_lng)
    .bind(t_lat)
    .bind(t_lng)
    .bind(kill.distance_meters)
    .bind(kill.tx_hash.as_deref())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LocationStore for SqliteStore {
    async fn insert_location_ping(&self, ping: &LocationPing) -> Result<()> {
        let (lat, lng) = ping.point.to_fixed();
        sqlx::query(
            "INSERT INTO location_pings (game_id, address, lat, lng, timestamp, is_in_zone)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(ping.game_id.value() as i64)
        .bind(addr_to_db(ping.address))
        .bind(lat)
        .bind(lng)
        .bind(ping.timestamp)
        .bind(i64::from(ping.is_in_zone))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest_location_ping(
        &self,
        game_id: GameId,
        address: Address,
    ) -> Result<Option<LocationPing>> {
        let row = sqlx::query_as::<_, PingRow>(
            "SELECT game_id, address, lat, lng, timestamp, is_in_zone
             FROM location_pings WHERE game_id = ? AND address = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(game_id.value() as i64)
        .bind(addr_to_db(address))
        .fetch_optional(&self.pool)
        .await?;

        row.map(PingRow::into_ping).transpose()
    }

    async fn get_latest_location_pings(&self, game_id: GameId) -> Result<Vec<LocationPing>> {
        let rows = sqlx::query_as::<_, PingRow>(
            "SELECT game_id, address, lat, lng, timestamp, is_in_zone
             FROM location_pings
             WHERE game_id = ? AND id IN (
                 SELECT MAX(id) FROM location_pings WHERE game_id = ? GROUP BY address
             )",
        )
        .bind(game_id.value() as i64)
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PingRow::into_ping).collect()
    }

    async fn prune_location_pings(&self, game_id: GameId, before: UnixSeconds) -> Result<u64> {
        // Always keep each player's latest ping, however old.
        let result = sqlx::query(
            "DELETE FROM location_pings
             WHERE game_id = ? AND timestamp < ? AND id NOT IN (
                 SELECT MAX(id) FROM location_pings WHERE game_id = ? GROUP BY address
             )",
        )
        .bind(game_id.value() as i64)
        .bind(before)
        .bind(game_id.value() as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HeartbeatStore for SqliteStore {
    async fn insert_heartbeat_scan(&self, scan: &HeartbeatScan) -> Result<()> {
        let (lat, lng) = scan.scanner_pos.to_fixed();
        sqlx::query(
            "INSERT INTO heartbeat_scans (
                game_id, scanner, scanned, timestamp, scanner_lat, scanner_lng, distance_meters
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scan.game_id.value() as i64)
        .bind(addr_to_db(scan.scanner))
        .bind(addr_to_db(scan.scanned))
        .bind(scan.timestamp)
        .bind(lat)
        .bind(lng)
        .bind(scan.distance_meters)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PhotoStore for SqliteStore {
    async fn insert_game_photo(&self, photo: &GamePhoto) -> Result<()> {
        sqlx::query(
            "INSERT INTO game_photos (game_id, hunter, target, taken_at, content_hash)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(photo.game_id.value() as i64)
        .bind(addr_to_db(photo.hunter))
        .bind(addr_to_db(photo.target))
        .bind(photo.taken_at)
        .bind(&photo.content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_game_photos(&self, game_id: GameId) -> Result<Vec<GamePhoto>> {
        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            "SELECT hunter, target, taken_at, content_hash
             FROM game_photos WHERE game_id = ? ORDER BY taken_at",
        )
        .bind(game_id.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(hunter, target, taken_at, content_hash)| {
                Ok(GamePhoto {
                    game_id,
                    hunter: addr_from_db(&hunter)?,
                    target: addr_from_db(&target)?,
                    taken_at,
                    content_hash,
                })
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR TX & SYNC IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl OperatorTxStore for SqliteStore {
    async fn insert_operator_tx(
        &self,
        game_id: Option<GameId>,
        action: &str,
        params: &str,
        created_at: UnixSeconds,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO operator_txs (game_id, action, params, status, created_at)
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(game_id.map(|id| id.value() as i64))
        .bind(action)
        .bind(params)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_operator_tx(
        &self,
        id: i64,
        status: OperatorTxStatus,
        tx_hash: Option<&str>,
        last_error: Option<&str>,
        confirmed_at: Option<UnixSeconds>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE operator_txs SET
                status = ?,
                tx_hash = COALESCE(?, tx_hash),
                last_error = COALESCE(?, last_error),
                confirmed_at = COALESCE(?, confirmed_at)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(tx_hash)
        .bind(last_error)
        .bind(confirmed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_operator_txs_in_status(
        &self,
        status: OperatorTxStatus,
    ) -> Result<Vec<OperatorTx>> {
        let rows = sqlx::query_as::<_, OperatorTxRow>(
            "SELECT * FROM operator_txs WHERE status = ? ORDER BY id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OperatorTxRow::into_tx).collect()
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn get_sync_cursor(&self) -> Result<Option<SyncCursor>> {
        let block: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
                .bind(SYNC_KEY_LAST_BLOCK)
                .fetch_optional(&self.pool)
                .await?;
        let contract: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
                .bind(SYNC_KEY_CONTRACT)
                .fetch_optional(&self.pool)
                .await?;

        match (block, contract) {
            (Some(block), Some(contract_address)) => {
                let last_processed_block = block.parse().map_err(|_| {
                    ServerError::from(StoreError::Corrupted(format!("bad sync cursor: {block}")))
                })?;
                Ok(Some(SyncCursor {
                    last_processed_block,
                    contract_address,
                }))
            }
            _ => Ok(None),
        }
    }

    async fn set_sync_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [
            (SYNC_KEY_LAST_BLOCK, cursor.last_processed_block.to_string()),
            (SYNC_KEY_CONTRACT, cursor.contract_address.clone()),
        ] {
            sqlx::query(
                "INSERT INTO sync_state (key, value) VALUES (?, ?)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATOMIC TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl AtomicStore for SqliteStore {
    #[instrument(skip(self, kill, elimination), fields(game_id = %kill.game_id))]
    async fn commit_kill(&self, kill: &Kill, elimination: &EliminationUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_kill_in(&mut *tx, kill).await?;

        sqlx::query("UPDATE players SET kills = kills + 1 WHERE game_id = ? AND address = ?")
            .bind(kill.game_id.value() as i64)
            .bind(addr_to_db(kill.hunter))
            .execute(&mut *tx)
            .await?;

        eliminate_in(
            &mut *tx,
            elimination.game_id,
            elimination.victim,
            elimination.reason,
            elimination.eliminated_by,
            elimination.timestamp,
        )
        .await?;
        rewire_in(&mut *tx, elimination.game_id, elimination.victim, elimination.rewire).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, elimination), fields(game_id = %elimination.game_id))]
    async fn commit_elimination(&self, elimination: &EliminationUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        eliminate_in(
            &mut *tx,
            elimination.game_id,
            elimination.victim,
            elimination.reason,
            elimination.eliminated_by,
            elimination.timestamp,
        )
        .await?;
        rewire_in(&mut *tx, elimination.game_id, elimination.victim, elimination.rewire).await?;

        tx.commit().await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn sample_game(id: u64) -> Game {
        Game {
            id: GameId::new(id),
            title: format!("Game {id}"),
            creator: addr(0xC0),
            entry_fee_wei: U256::from(50_000_000_000_000_000_u64),
            base_reward_wei: U256::ZERO,
            split: PrizeSplit {
                first_bps: 5000,
                second_bps: 2000,
                third_bps: 1000,
                kills_bps: 1000,
                creator_bps: 1000,
            },
            zone_center: GeoPoint { lat: 52.52, lng: 13.405 },
            meeting_point: GeoPoint { lat: 52.521, lng: 13.406 },
            registration_deadline: 1_000,
            game_date: 2_000,
            max_duration_secs: 14_400,
            min_players: 3,
            phase: GamePhase::Registration,
            sub_phase: None,
            sub_phase_started_at: None,
            started_at: None,
            ended_at: None,
            player_count: 0,
            total_collected_wei: U256::ZERO,
            winners: None,
        }
    }

    fn sample_player(game: u64, byte: u8, number: u32) -> Player {
        Player {
            game_id: GameId::new(game),
            address: addr(byte),
            number: PlayerNumber::new(number),
            is_alive: true,
            kills: 0,
            checked_in: false,
            bluetooth_id: None,
            last_heartbeat_at: None,
            eliminated_at: None,
            elimination_order: None,
            eliminated_by: None,
            elimination_reason: None,
            has_claimed: false,
        }
    }

    async fn store_with_players(n: u32) -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_game(&sample_game(1)).await.unwrap();
        for i in 1..=n {
            store
                .insert_player(&sample_player(1, i as u8, i))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn game_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        let game = sample_game(7);
        store.insert_game(&game).await.unwrap();

        let loaded = store.get_game(GameId::new(7)).await.unwrap().unwrap();
        assert_eq!(loaded, game);
        assert!(store.get_game(GameId::new(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn phase_update_sets_fields_and_winners() {
        let store = store_with_players(3).await;

        store
            .update_game_phase(
                GameId::new(1),
                GamePhase::Active,
                &PhaseUpdate {
                    started_at: Some(2_000),
                    sub_phase: Some(SubPhase::Checkin),
                    sub_phase_started_at: Some(2_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let game = store.get_game(GameId::new(1)).await.unwrap().unwrap();
        assert_eq!(game.phase, GamePhase::Active);
        assert_eq!(game.sub_phase, Some(SubPhase::Checkin));
        assert_eq!(game.started_at, Some(2_000));

        let winners = Winners {
            first: addr(1),
            second: Some(addr(2)),
            third: None,
            top_killer: addr(1),
        };
        store
            .update_game_phase(
                GameId::new(1),
                GamePhase::Ended,
                &PhaseUpdate {
                    ended_at: Some(3_000),
                    winners: Some(winners),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let game = store.get_game(GameId::new(1)).await.unwrap().unwrap();
        assert_eq!(game.phase, GamePhase::Ended);
        assert_eq!(game.sub_phase, None);
        assert_eq!(game.winners, Some(winners));
    }

    #[tokio::test]
    async fn zone_shrinks_round_trip_ordered() {
        let store = SqliteStore::in_memory().await.unwrap();
        let schedule = vec![
            ZoneShrink { at_second: 0, radius_meters: 500 },
            ZoneShrink { at_second: 600, radius_meters: 300 },
            ZoneShrink { at_second: 1200, radius_meters: 150 },
        ];
        store
            .insert_zone_shrinks(GameId::new(1), &schedule)
            .await
            .unwrap();
        assert_eq!(store.get_zone_shrinks(GameId::new(1)).await.unwrap(), schedule);
    }

    #[tokio::test]
    async fn duplicate_player_number_rejected() {
        let store = store_with_players(1).await;
        let dup = sample_player(1, 0x99, 1);
        let err = store.insert_player(&dup).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Store(StoreError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn leaderboard_order_is_alive_kills_number() {
        let store = store_with_players(4).await;
        let id = GameId::new(1);

        store.increment_player_kills(id, addr(3)).await.unwrap();
        store.increment_player_kills(id, addr(3)).await.unwrap();
        store.increment_player_kills(id, addr(4)).await.unwrap();
        store
            .eliminate_player(id, addr(2), EliminationReason::Killed, Some(addr(3)), 100)
            .await
            .unwrap();

        let numbers: Vec<u32> = store
            .get_players(id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.number.value())
            .collect();
        // Alive 3 (2 kills), 4 (1 kill), 1 (0 kills), then dead 2.
        assert_eq!(numbers, vec![3, 4, 1, 2]);
    }

    #[tokio::test]
    async fn eliminate_is_idempotent_and_stamps_order() {
        let store = store_with_players(3).await;
        let id = GameId::new(1);

        store
            .eliminate_player(id, addr(1), EliminationReason::ZoneViolation, None, 100)
            .await
            .unwrap();
        // Replay must not bump the order or timestamps.
        store
            .eliminate_player(id, addr(1), EliminationReason::Killed, Some(addr(2)), 999)
            .await
            .unwrap();

        let p = store.get_player(id, addr(1)).await.unwrap().unwrap();
        assert!(!p.is_alive);
        assert_eq!(p.eliminated_at, Some(100));
        assert_eq!(p.elimination_order, Some(1));
        assert_eq!(p.elimination_reason, Some(EliminationReason::ZoneViolation));

        store
            .eliminate_player(id, addr(2), EliminationReason::HeartbeatTimeout, None, 150)
            .await
            .unwrap();
        let p2 = store.get_player(id, addr(2)).await.unwrap().unwrap();
        assert_eq!(p2.elimination_order, Some(2));
        assert_eq!(store.get_alive_player_count(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn commit_kill_is_atomic_and_rewires() {
        let store = store_with_players(3).await;
        let id = GameId::new(1);
        // Cycle 1 → 2 → 3 → 1.
        store
            .set_target_assignments(id, &[(addr(1), addr(2)), (addr(2), addr(3)), (addr(3), addr(1))])
            .await
            .unwrap();

        let kill = Kill {
            game_id: id,
            hunter: addr(1),
            target: addr(2),
            timestamp: 60,
            hunter_pos: GeoPoint { lat: 52.52, lng: 13.405 },
            target_pos: GeoPoint { lat: 52.5204, lng: 13.405 },
            distance_meters: 44.0,
            tx_hash: None,
        };
        store
            .commit_kill(
                &kill,
                &EliminationUpdate {
                    game_id: id,
                    victim: addr(2),
                    reason: EliminationReason::Killed,
                    eliminated_by: Some(addr(1)),
                    timestamp: 60,
                    rewire: RewireUpdate::Reassign { hunter: addr(1), new_target: addr(3) },
                },
            )
            .await
            .unwrap();

        let hunter = store.get_player(id, addr(1)).await.unwrap().unwrap();
        assert_eq!(hunter.kills, 1);
        let victim = store.get_player(id, addr(2)).await.unwrap().unwrap();
        assert!(!victim.is_alive);
        assert_eq!(
            store.get_target_assignment(id, addr(1)).await.unwrap(),
            Some(addr(3))
        );
        assert_eq!(store.get_target_assignment(id, addr(2)).await.unwrap(), None);
        assert_eq!(store.find_hunter_of(id, addr(3)).await.unwrap(), Some(addr(1)));
        assert_eq!(store.get_kills(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn kill_tx_hash_updates_once() {
        let store = store_with_players(2).await;
        let id = GameId::new(1);
        let kill = Kill {
            game_id: id,
            hunter: addr(1),
            target: addr(2),
            timestamp: 60,
            hunter_pos: GeoPoint { lat: 0.0, lng: 0.0 },
            target_pos: GeoPoint { lat: 0.0, lng: 0.0 },
            distance_meters: 10.0,
            tx_hash: None,
        };
        store.insert_kill(&kill).await.unwrap();

        store
            .update_kill_tx_hash(id, addr(1), addr(2), "0xabc")
            .await
            .unwrap();
        store
            .update_kill_tx_hash(id, addr(1), addr(2), "0xdef")
            .await
            .unwrap();

        let kills = store.get_kills(id).await.unwrap();
        assert_eq!(kills[0].tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn latest_ping_wins_and_prune_keeps_it() {
        let store = store_with_players(1).await;
        let id = GameId::new(1);

        for (ts, lat) in [(10, 52.52), (20, 52.53)] {
            store
                .insert_location_ping(&LocationPing {
                    game_id: id,
                    address: addr(1),
                    point: GeoPoint { lat, lng: 13.4 },
                    timestamp: ts,
                    is_in_zone: true,
                })
                .await
                .unwrap();
        }

        let latest = store
            .get_latest_location_ping(id, addr(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.timestamp, 20);

        let pruned = store.prune_location_pings(id, 1_000).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(
            store
                .get_latest_location_ping(id, addr(1))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn heartbeat_expiry_boundary_is_inclusive() {
        let store = store_with_players(2).await;
        let id = GameId::new(1);
        store.init_players_heartbeat(id, 1_000).await.unwrap();

        // One second before the interval: nobody expires.
        let expired = store
            .get_heartbeat_expired_players(id, 1_599, 600)
            .await
            .unwrap();
        assert!(expired.is_empty());

        // Exactly at the interval: both expire.
        let expired = store
            .get_heartbeat_expired_players(id, 1_600, 600)
            .await
            .unwrap();
        assert_eq!(expired.len(), 2);

        store
            .update_last_heartbeat(id, &[addr(1)], 1_500)
            .await
            .unwrap();
        let expired = store
            .get_heartbeat_expired_players(id, 1_600, 600)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].address, addr(2));
    }

    #[tokio::test]
    async fn operator_log_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();

        let id = store
            .insert_operator_tx(Some(GameId::new(1)), "record_kill", "{}", 100)
            .await
            .unwrap();

        let pending = store
            .get_operator_txs_in_status(OperatorTxStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        store
            .update_operator_tx(id, OperatorTxStatus::Submitted, Some("0x123"), None, None)
            .await
            .unwrap();
        store
            .update_operator_tx(id, OperatorTxStatus::Confirmed, None, None, Some(110))
            .await
            .unwrap();

        let confirmed = store
            .get_operator_txs_in_status(OperatorTxStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed[0].tx_hash.as_deref(), Some("0x123"));
        assert_eq!(confirmed[0].confirmed_at, Some(110));
    }

    #[tokio::test]
    async fn sync_cursor_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get_sync_cursor().await.unwrap().is_none());

        let cursor = SyncCursor {
            last_processed_block: 1234,
            contract_address: "0x00000000000000000000000000000000000000aa".into(),
        };
        store.set_sync_cursor(&cursor).await.unwrap();
        assert_eq!(store.get_sync_cursor().await.unwrap(), Some(cursor));
    }

    #[tokio::test]
    async fn reset_wipes_game_tables_but_not_operator_log() {
        let store = store_with_players(2).await;
        store
            .insert_operator_tx(None, "withdraw_platform_fees", "{}", 1)
            .await
            .unwrap();

        store.reset_game_data().await.unwrap();

        assert!(store.get_game(GameId::new(1)).await.unwrap().is_none());
        assert_eq!(store.get_player_count(GameId::new(1)).await.unwrap(), 0);
        assert_eq!(
            store
                .get_operator_txs_in_status(OperatorTxStatus::Pending)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
