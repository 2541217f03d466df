//! Game lifecycle orchestration.
//!
//! The manager owns the registry of per-game actors and registration
//! deadline timers, reacts to confirmed chain events, and exposes the
//! operations the transport front-ends call. It is the only component that
//! creates game rows - always from a confirmed chain event or a rebuild
//! read, never from user input.
//!
//! # Startup recovery
//!
//! On process start the manager rebuilds what the previous process held in
//! memory: deadline timers for REGISTRATION games, actors (with their
//! sub-phase state re-entered from the store) for ACTIVE games. The event
//! listener then backfills everything missed while the process was down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::OperatorCall;
use crate::error::{Result, StateError};
use crate::game::actor::{self, GameCommand, GameDeps, GameHandle};
use crate::game::checkin::min_required_for_prizes;
use crate::game::kill::KillRequest;
use crate::listener::ChainEventHandler;
use crate::types::entities::{Game, Kill, LeaderboardEntry, Player, Winners};
use crate::types::enums::{GamePhase, SubPhase};
use crate::types::events::{EventMetadata, GameEvent};
use crate::types::messages::{GameStatus, ServerMessage};
use crate::types::primitives::{GameId, PlayerNumber};

// ═══════════════════════════════════════════════════════════════════════════════
// MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Orchestrates all games hosted by this operator process.
pub struct GameManager {
    deps: Arc<GameDeps>,
    actors: Mutex<HashMap<GameId, GameHandle>>,
    registration_timers: Mutex<HashMap<GameId, JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for GameManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameManager")
            .field("actors", &self.actors.lock().len())
            .field("registration_timers", &self.registration_timers.lock().len())
            .finish_non_exhaustive()
    }
}

impl GameManager {
    /// Create a manager over the shared services.
    #[must_use]
    pub fn new(deps: Arc<GameDeps>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            deps,
            actors: Mutex::new(HashMap::new()),
            registration_timers: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Rebuild in-memory state from the store after a restart.
    ///
    /// Reschedules registration deadline timers (firing immediately when
    /// already past) and re-enters every ACTIVE game's sub-phase through a
    /// fresh actor. The caller runs the listener backfill afterwards.
    ///
    /// # Errors
    ///
    /// Returns store errors; individual actor failures are logged and
    /// skipped so one bad row cannot block every game.
    #[instrument(skip(self))]
    pub async fn startup_recovery(&self) -> Result<()> {
        let registration = self
            .deps
            .store
            .get_games_in_phase(GamePhase::Registration)
            .await?;
        for game in &registration {
            self.schedule_registration_deadline(game);
        }

        let active = self.deps.store.get_games_in_phase(GamePhase::Active).await?;
        for game in &active {
            if let Err(e) = self.ensure_actor(game.id).await {
                error!(game_id = %game.id, error = %e, "Failed to recover game actor");
            }
        }

        info!(
            registration = registration.len(),
            active = active.len(),
            "Startup recovery complete"
        );
        Ok(())
    }

    /// Stop every actor and timer.
    pub fn stop_all(&self) {
        for (_, handle) in self.actors.lock().drain() {
            handle.stop();
        }
        for (_, timer) in self.registration_timers.lock().drain() {
            timer.abort();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACTOR REGISTRY
    // ═══════════════════════════════════════════════════════════════════════

    async fn ensure_actor(&self, game_id: GameId) -> Result<()> {
        {
            let mut actors = self.actors.lock();
            // Reap a previously finished actor so it can be respawned.
            if actors.get(&game_id).is_some_and(GameHandle::is_finished) {
                actors.remove(&game_id);
            }
            if actors.contains_key(&game_id) {
                return Ok(());
            }
        }

        let handle = actor::spawn(Arc::clone(&self.deps), game_id).await?;
        self.actors.lock().insert(game_id, handle);
        Ok(())
    }

    fn actor_sender(&self, game_id: GameId) -> Option<mpsc::Sender<GameCommand>> {
        let actors = self.actors.lock();
        actors
            .get(&game_id)
            .filter(|h| !h.is_finished())
            .map(GameHandle::sender)
    }

    fn stop_actor(&self, game_id: GameId) {
        if let Some(handle) = self.actors.lock().remove(&game_id) {
            handle.stop();
        }
    }

    fn cancel_registration_timer(&self, game_id: GameId) {
        if let Some(timer) = self.registration_timers.lock().remove(&game_id) {
            timer.abort();
        }
    }

    async fn send_command(&self, game_id: GameId, command: GameCommand) -> Result<()> {
        let sender = self
            .actor_sender(game_id)
            .ok_or_else(|| StateError::NotFound(format!("no active game {game_id}")))?;
        sender
            .send(command)
            .await
            .map_err(|_| StateError::NotFound(format!("game {game_id} actor stopped")).into())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTRATION DEADLINE TIMERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Arm the one-shot deadline timer for a REGISTRATION game.
    ///
    /// When the deadline fires: enough registrations start the game,
    /// too few cancel it, and a game already past its expiry window is
    /// expired instead.
    fn schedule_registration_deadline(&self, game: &Game) {
        let game_id = game.id;
        let deps = Arc::clone(&self.deps);
        let shutdown = self.shutdown.clone();

        let now = chrono::Utc::now().timestamp();
        let delay = Duration::from_secs(game.registration_deadline.saturating_sub(now).max(0) as u64);
        debug!(%game_id, delay_secs = delay.as_secs(), "Registration deadline scheduled");

        let task = tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = Self::fire_registration_deadline(&deps, game_id).await {
                error!(%game_id, error = %e, "Registration deadline handling failed");
            }
        });

        if let Some(previous) = self.registration_timers.lock().insert(game_id, task) {
            previous.abort();
        }
    }

    async fn fire_registration_deadline(deps: &GameDeps, game_id: GameId) -> Result<()> {
        let Some(game) = deps.store.get_game(game_id).await? else {
            return Ok(());
        };
        if game.phase != GamePhase::Registration {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let call = if now >= game.expiry_at() {
            info!(%game_id, "Registration game past expiry; triggering expiry");
            OperatorCall::TriggerExpiry { game_id }
        } else if game.player_count >= game.min_players {
            info!(%game_id, players = game.player_count, "Deadline reached; starting game");
            OperatorCall::StartGame { game_id }
        } else {
            info!(
                %game_id,
                players = game.player_count,
                min = game.min_players,
                "Too few registrations; triggering cancellation"
            );
            OperatorCall::TriggerCancellation { game_id }
        };
        deps.queue.enqueue(call).await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COLLABORATOR API (transport-agnostic)
    // ═══════════════════════════════════════════════════════════════════════

    /// Submit a kill on behalf of a verified hunter.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's validation error or a state error when the
    /// game is not running.
    pub async fn submit_kill(
        &self,
        game_id: GameId,
        hunter: Address,
        qr_payload: String,
        lat: f64,
        lng: f64,
        ble_nearby: Vec<String>,
        photo_hash: Option<String>,
    ) -> Result<Kill> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            game_id,
            GameCommand::SubmitKill {
                request: KillRequest {
                    hunter,
                    qr_payload,
                    lat,
                    lng,
                    ble_nearby,
                    photo_hash,
                },
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| StateError::NotFound(format!("game {game_id} actor stopped")))?
    }

    /// Check a player in at the venue.
    ///
    /// # Errors
    ///
    /// Returns check-in policy violations or a state error.
    pub async fn checkin(
        &self,
        game_id: GameId,
        player: Address,
        lat: f64,
        lng: f64,
        qr_payload: Option<String>,
        bluetooth_id: Option<String>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            game_id,
            GameCommand::CheckIn {
                player,
                lat,
                lng,
                qr_payload,
                bluetooth_id,
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| StateError::NotFound(format!("game {game_id} actor stopped")))?
    }

    /// Record a location ping.
    ///
    /// # Errors
    ///
    /// Returns coordinate or state errors.
    pub async fn location(
        &self,
        game_id: GameId,
        player: Address,
        lat: f64,
        lng: f64,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(game_id, GameCommand::Location { player, lat, lng, reply })
            .await?;
        rx.await
            .map_err(|_| StateError::NotFound(format!("game {game_id} actor stopped")))?
    }

    /// Accept a heartbeat proximity scan.
    ///
    /// # Errors
    ///
    /// Returns scan validation failures.
    pub async fn heartbeat_scan(
        &self,
        game_id: GameId,
        scanner: Address,
        qr_payload: String,
        lat: f64,
        lng: f64,
        ble_nearby: Vec<String>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            game_id,
            GameCommand::HeartbeatScan {
                scanner,
                qr_payload,
                lat,
                lng,
                ble_nearby,
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| StateError::NotFound(format!("game {game_id} actor stopped")))?
    }

    /// Read a game status snapshot.
    ///
    /// Served by the actor for running games and derived from the store
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] for an unknown game.
    pub async fn status(&self, game_id: GameId) -> Result<GameStatus> {
        if self.actor_sender(game_id).is_some() {
            let (reply, rx) = oneshot::channel();
            if self
                .send_command(game_id, GameCommand::Snapshot { reply })
                .await
                .is_ok()
                && let Ok(status) = rx.await
            {
                return status;
            }
        }
        self.store_status(game_id).await
    }

    /// Build the per-player auth snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] when the player never registered.
    pub async fn auth_snapshot(&self, game_id: GameId, player: Address) -> Result<ServerMessage> {
        let row = self
            .deps
            .store
            .get_player(game_id, player)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("player {player} in game {game_id}")))?;
        let status = self.status(game_id).await?;

        Ok(ServerMessage::AuthSuccess {
            game_id,
            player_number: row.number,
            is_alive: row.is_alive,
            checked_in: row.checked_in,
            status,
        })
    }

    async fn store_status(&self, game_id: GameId) -> Result<GameStatus> {
        let game = self
            .deps
            .store
            .get_game(game_id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("game {game_id}")))?;
        let players = self.deps.store.get_players(game_id).await?;

        Ok(GameStatus {
            game_id,
            phase: game.phase,
            sub_phase: game.sub_phase,
            player_count: game.player_count.max(players.len() as u32),
            alive_count: players.iter().filter(|p| p.is_alive).count() as u32,
            checked_in_count: players.iter().filter(|p| p.checked_in).count() as u32,
            zone: None,
            leaderboard: players
                .iter()
                .map(|p| LeaderboardEntry {
                    player_number: p.number,
                    kills: p.kills,
                    is_alive: p.is_alive,
                })
                .collect(),
            heartbeat_disabled: false,
        })
    }

    fn number_of(players: &[Player], address: Address) -> Option<PlayerNumber> {
        players
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.number)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CHAIN EVENT REACTIONS
    // ═══════════════════════════════════════════════════════════════════════

    async fn on_game_created(&self, game_id: GameId, _creator: Address) -> Result<()> {
        if self.deps.store.get_game(game_id).await?.is_some() {
            return Ok(());
        }

        let config = self.deps.chain.game_config(game_id).await?;
        let shrinks = self.deps.chain.zone_shrinks(game_id).await?;

        let game = Game {
            id: game_id,
            title: config.title,
            creator: config.creator,
            entry_fee_wei: config.entry_fee_wei,
            base_reward_wei: config.base_reward_wei,
            split: config.split,
            zone_center: config.zone_center,
            meeting_point: config.meeting_point,
            registration_deadline: config.registration_deadline,
            game_date: config.game_date,
            max_duration_secs: config.max_duration_secs,
            min_players: config.min_players,
            phase: GamePhase::Registration,
            sub_phase: None,
            sub_phase_started_at: None,
            started_at: None,
            ended_at: None,
            player_count: 0,
            total_collected_wei: alloy::primitives::U256::ZERO,
            winners: None,
        };
        self.deps.store.insert_game(&game).await?;
        self.deps.store.insert_zone_shrinks(game_id, &shrinks).await?;
        self.schedule_registration_deadline(&game);

        info!(%game_id, title = %game.title, "Game created");
        Ok(())
    }

    async fn on_player_registered(
        &self,
        game_id: GameId,
        address: Address,
        number: u32,
    ) -> Result<()> {
        if self.deps.store.get_player(game_id, address).await?.is_some() {
            return Ok(());
        }
        let Some(game) = self.deps.store.get_game(game_id).await? else {
            warn!(%game_id, "Registration for unknown game ignored");
            return Ok(());
        };

        self.deps
            .store
            .insert_player(&Player {
                game_id,
                address,
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
            })
            .await?;

        let count = self.deps.store.get_player_count(game_id).await?;
        let total = game.entry_fee_wei * alloy::primitives::U256::from(count);
        self.deps
            .store
            .update_player_count(game_id, count, total)
            .await?;

        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::PlayerRegistered {
                game_id,
                player_number: PlayerNumber::new(number),
                player_count: count,
            },
        );
        Ok(())
    }

    async fn on_game_started(&self, game_id: GameId, started_at: i64) -> Result<()> {
        self.cancel_registration_timer(game_id);

        let Some(game) = self.deps.store.get_game(game_id).await? else {
            warn!(%game_id, "GameStarted for unknown game ignored");
            return Ok(());
        };
        if game.phase != GamePhase::Registration {
            // Replay during backfill.
            return self.ensure_actor_if_active(game_id).await;
        }

        self.deps
            .store
            .update_game_phase(
                game_id,
                GamePhase::Active,
                &crate::ports::store::PhaseUpdate {
                    started_at: Some(started_at),
                    sub_phase: Some(SubPhase::Checkin),
                    sub_phase_started_at: Some(started_at),
                    ..Default::default()
                },
            )
            .await?;

        let required = min_required_for_prizes(&game.split, game.min_players);
        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::CheckinStarted { game_id, required },
        );

        info!(%game_id, started_at, "Game started; check-in open");
        self.ensure_actor(game_id).await
    }

    async fn ensure_actor_if_active(&self, game_id: GameId) -> Result<()> {
        let still_active = self
            .deps
            .store
            .get_game(game_id)
            .await?
            .is_some_and(|g| g.phase == GamePhase::Active);
        if still_active {
            self.ensure_actor(game_id).await?;
        }
        Ok(())
    }

    async fn on_game_ended(
        &self,
        game_id: GameId,
        first: Address,
        second: Address,
        third: Address,
        top_killer: Address,
        meta: EventMetadata,
    ) -> Result<()> {
        self.cancel_registration_timer(game_id);
        self.stop_actor(game_id);

        let Some(game) = self.deps.store.get_game(game_id).await? else {
            return Ok(());
        };
        let already_ended = game.phase == GamePhase::Ended;

        let non_zero = |a: Address| (a != Address::ZERO).then_some(a);
        let winners = Winners {
            first,
            second: non_zero(second),
            third: non_zero(third),
            top_killer,
        };
        self.deps
            .store
            .update_game_phase(
                game_id,
                GamePhase::Ended,
                &crate::ports::store::PhaseUpdate {
                    ended_at: Some(meta.block_timestamp),
                    winners: Some(winners),
                    ..Default::default()
                },
            )
            .await?;

        if !already_ended {
            let players = self.deps.store.get_players(game_id).await?;
            if let (Some(first_number), Some(killer_number)) = (
                Self::number_of(&players, first),
                Self::number_of(&players, top_killer),
            ) {
                self.deps.broadcaster.broadcast(
                    game_id,
                    &ServerMessage::GameEnded {
                        game_id,
                        first: first_number,
                        second: winners.second.and_then(|a| Self::number_of(&players, a)),
                        third: winners.third.and_then(|a| Self::number_of(&players, a)),
                        top_killer: killer_number,
                    },
                );
            }
            info!(%game_id, "Game ended on-chain");
        }
        Ok(())
    }

    async fn on_game_cancelled(&self, game_id: GameId, meta: EventMetadata) -> Result<()> {
        self.cancel_registration_timer(game_id);
        self.stop_actor(game_id);

        let Some(game) = self.deps.store.get_game(game_id).await? else {
            return Ok(());
        };
        if game.phase == GamePhase::Cancelled {
            return Ok(());
        }

        self.deps
            .store
            .update_game_phase(
                game_id,
                GamePhase::Cancelled,
                &crate::ports::store::PhaseUpdate {
                    ended_at: Some(meta.block_timestamp),
                    ..Default::default()
                },
            )
            .await?;
        self.deps
            .broadcaster
            .broadcast(game_id, &ServerMessage::GameCancelled { game_id });

        info!(%game_id, "Game cancelled on-chain");
        Ok(())
    }
}

#[async_trait]
impl ChainEventHandler for GameManager {
    #[instrument(skip(self, event, meta), fields(event = event.name(), game_id = %event.game_id(), block = meta.block_number))]
    async fn handle_event(&self, event: GameEvent, meta: EventMetadata) -> Result<()> {
        match event {
            GameEvent::GameCreated { game_id, creator } => {
                self.on_game_created(game_id, creator).await
            }
            GameEvent::PlayerRegistered {
                game_id,
                player,
                player_number,
            } => {
                self.on_player_registered(game_id, player, player_number)
                    .await
            }
            GameEvent::GameStarted {
                game_id,
                started_at,
            } => self.on_game_started(game_id, started_at).await,
            GameEvent::KillRecorded { game_id, .. } | GameEvent::PlayerEliminated { game_id, .. } => {
                if self.actor_sender(game_id).is_some() {
                    self.send_command(game_id, GameCommand::ChainEvent { event, meta })
                        .await
                } else {
                    self.mirror_without_actor(event, meta).await
                }
            }
            GameEvent::GameEnded {
                game_id,
                first,
                second,
                third,
                top_killer,
            } => {
                self.on_game_ended(game_id, first, second, third, top_killer, meta)
                    .await
            }
            GameEvent::GameCancelled { game_id } => self.on_game_cancelled(game_id, meta).await,
        }
    }
}

impl GameManager {
    /// Store-level mirror for kill/elimination events arriving when no
    /// actor is running (terminal games, or replays during backfill).
    async fn mirror_without_actor(&self, event: GameEvent, meta: EventMetadata) -> Result<()> {
        match event {
            GameEvent::KillRecorded {
                game_id,
                hunter,
                target,
            } => {
                self.deps
                    .store
                    .update_kill_tx_hash(game_id, hunter, target, &format!("{:#x}", meta.tx_hash))
                    .await?;
                self.deps
                    .store
                    .eliminate_player(
                        game_id,
                        target,
                        crate::types::enums::EliminationReason::Killed,
                        Some(hunter),
                        meta.block_timestamp,
                    )
                    .await
            }
            GameEvent::PlayerEliminated {
                game_id,
                player,
                reason,
            } => {
                self.deps
                    .store
                    .eliminate_player(
                        game_id,
                        player,
                        reason.unwrap_or(crate::types::enums::EliminationReason::ZoneViolation),
                        None,
                        meta.block_timestamp,
                    )
                    .await
            }
            _ => Ok(()),
        }
    }
}
