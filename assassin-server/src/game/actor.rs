//! Per-game actor: one task owns all mutable state of one active game.
//!
//! Every mutation of a game - ticks, kill submissions, check-ins, location
//! pings, heartbeat scans, mirrored chain events - flows through the
//! actor's mailbox, so within one game all state transitions are totally
//! ordered without explicit locks. Across games, actors run in parallel.
//!
//! The actor holds the kill path end to end: verification, the atomic
//! store commit, and the operator-queue enqueue all happen before the next
//! command is taken, so no other mutation can observe post-kill state
//! before the chain-side intent is logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::OperatorCall;
use crate::config::GameSettings;
use crate::error::{Result, StateError, ValidationError};
use crate::game::checkin::{self, seed_slot_quota};
use crate::game::heartbeat::HeartbeatEnforcer;
use crate::game::kill::{self, KillContext, KillRequest};
use crate::game::target_chain::{TargetChain, permutation_seed};
use crate::game::zone::ZoneTracker;
use crate::ports::broadcast::Broadcaster;
use crate::ports::chain::GameChain;
use crate::ports::store::{EliminationUpdate, PhaseUpdate, RewireUpdate, Store};
use crate::proof::qr;
use crate::types::entities::{
    Game, HeartbeatScan, Kill, LeaderboardEntry, LocationPing, Player, Winners,
};
use crate::types::enums::{EliminationReason, GamePhase, SubPhase};
use crate::types::events::{EventMetadata, GameEvent};
use crate::types::messages::{GameStatus, ServerMessage, ZoneStatus};
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

/// Mailbox depth per game. Ingress beyond this backpressures the transport.
const MAILBOX_CAPACITY: usize = 64;

/// Location pings are pruned on this tick cadence.
const PRUNE_EVERY_TICKS: u64 = 300;

/// Pings older than this are dropped by pruning.
const PRUNE_RETAIN_SECONDS: i64 = 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCIES & COMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared services every game actor needs.
pub struct GameDeps {
    /// The persistence layer.
    pub store: Arc<dyn Store>,
    /// Typed chain reads.
    pub chain: Arc<dyn GameChain>,
    /// Operator transaction queue.
    pub queue: crate::queue::OperatorQueue,
    /// Client fan-out.
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Gameplay policy.
    pub settings: GameSettings,
}

impl std::fmt::Debug for GameDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameDeps").finish_non_exhaustive()
    }
}

/// Messages a game actor accepts.
#[derive(Debug)]
pub enum GameCommand {
    /// A kill submission from a hunter.
    SubmitKill {
        /// The submission.
        request: KillRequest,
        /// Resolves with the recorded kill or the rejection.
        reply: oneshot::Sender<Result<Kill>>,
    },
    /// An in-venue check-in.
    CheckIn {
        /// The caller (verified upstream).
        player: Address,
        /// Submitted latitude.
        lat: f64,
        /// Submitted longitude.
        lng: f64,
        /// QR of an already-checked-in player, beyond the seed quota.
        qr_payload: Option<String>,
        /// Bluetooth identifier to record for BLE checks.
        bluetooth_id: Option<String>,
        /// Resolves when the check-in is accepted.
        reply: oneshot::Sender<Result<()>>,
    },
    /// A location ping.
    Location {
        /// The caller.
        player: Address,
        /// Latitude.
        lat: f64,
        /// Longitude.
        lng: f64,
        /// Resolves when the ping is stored.
        reply: oneshot::Sender<Result<()>>,
    },
    /// A heartbeat proximity scan.
    HeartbeatScan {
        /// The scanning player.
        scanner: Address,
        /// Scanned QR payload.
        qr_payload: String,
        /// Scanner latitude.
        lat: f64,
        /// Scanner longitude.
        lng: f64,
        /// Bluetooth identifiers the scanner sees.
        ble_nearby: Vec<String>,
        /// Resolves when the scan is accepted.
        reply: oneshot::Sender<Result<()>>,
    },
    /// A confirmed chain event to mirror.
    ChainEvent {
        /// The event.
        event: GameEvent,
        /// Its block metadata.
        meta: EventMetadata,
    },
    /// Read a status snapshot.
    Snapshot {
        /// Resolves with the snapshot.
        reply: oneshot::Sender<Result<GameStatus>>,
    },
}

/// Handle to a running game actor.
#[derive(Debug)]
pub struct GameHandle {
    tx: mpsc::Sender<GameCommand>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl GameHandle {
    /// Send a command to the actor.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] when the actor has stopped.
    pub async fn send(&self, command: GameCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| StateError::NotFound("game actor stopped".into()).into())
    }

    /// Clone the mailbox sender, for use outside any registry lock.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<GameCommand> {
        self.tx.clone()
    }

    /// Request the actor to stop at the next suspension point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the actor task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// The state machine for one ACTIVE game.
struct GameActor {
    deps: Arc<GameDeps>,
    game: Game,
    /// Stable address → number lookup (numbers never change).
    numbers: HashMap<Address, PlayerNumber>,
    targets: TargetChain,
    zone: Option<ZoneTracker>,
    heartbeat: HeartbeatEnforcer,
    /// Expiry submission latch.
    expiry_requested: bool,
    finished: bool,
    tick_count: u64,
    rx: mpsc::Receiver<GameCommand>,
    cancel: CancellationToken,
}

/// Spawn an actor for an ACTIVE game, rehydrating sub-phase state from the
/// store (startup recovery re-enters the current sub-phase this way).
///
/// # Errors
///
/// Returns [`StateError::NotFound`] for an unknown game and store errors
/// from rehydration reads.
#[instrument(skip(deps))]
pub async fn spawn(deps: Arc<GameDeps>, game_id: GameId) -> Result<GameHandle> {
    let game = deps
        .store
        .get_game(game_id)
        .await?
        .ok_or_else(|| StateError::NotFound(format!("game {game_id}")))?;

    let players = deps.store.get_players(game_id).await?;
    let numbers: HashMap<Address, PlayerNumber> =
        players.iter().map(|p| (p.address, p.number)).collect();
    let alive_count = players.iter().filter(|p| p.is_alive).count() as u32;

    let settings = &deps.settings;
    let mut heartbeat = HeartbeatEnforcer::new(
        settings.heartbeat_interval_seconds,
        settings.heartbeat_proximity_meters,
        settings.heartbeat_disable_threshold,
    );

    let mut targets = TargetChain::new();
    let mut zone = None;

    if game.in_sub_phase(SubPhase::Game) {
        let assignments = deps.store.get_target_assignments(game_id).await?;
        targets = TargetChain::from_assignments(
            assignments.into_iter().map(|a| (a.hunter, a.target)),
        );

        let schedule = deps.store.get_zone_shrinks(game_id).await?;
        let mut tracker = ZoneTracker::new(schedule, settings.zone_grace_seconds);
        let now = chrono::Utc::now().timestamp();
        tracker.resume(now - game.started_at.unwrap_or(now));
        zone = Some(tracker);

        heartbeat.observe_alive_count(alive_count);
    }

    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let cancel = CancellationToken::new();

    let actor = GameActor {
        deps,
        game,
        numbers,
        targets,
        zone,
        heartbeat,
        expiry_requested: false,
        finished: false,
        tick_count: 0,
        rx,
        cancel: cancel.clone(),
    };

    info!(%game_id, alive = alive_count, "Game actor started");
    let join = tokio::spawn(actor.run());

    Ok(GameHandle { tx, cancel, join })
}

impl GameActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if self.finished {
                break;
            }
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    if let Err(e) = self.on_tick(now).await {
                        error!(game_id = %self.game.id, error = %e, "Tick failed");
                    }
                }
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command).await;
                }
            }
        }
        debug!(game_id = %self.game.id, "Game actor stopped");
    }

    async fn handle(&mut self, command: GameCommand) {
        let now = chrono::Utc::now().timestamp();
        match command {
            GameCommand::SubmitKill { request, reply } => {
                let result = self.on_submit_kill(&request, now).await;
                let _ = reply.send(result);
            }
            GameCommand::CheckIn {
                player,
                lat,
                lng,
                qr_payload,
                bluetooth_id,
                reply,
            } => {
                let result = self
                    .on_checkin(player, lat, lng, qr_payload.as_deref(), bluetooth_id, now)
                    .await;
                let _ = reply.send(result);
            }
            GameCommand::Location { player, lat, lng, reply } => {
                let result = self.on_location(player, lat, lng, now).await;
                let _ = reply.send(result);
            }
            GameCommand::HeartbeatScan {
                scanner,
                qr_payload,
                lat,
                lng,
                ble_nearby,
                reply,
            } => {
                let result = self
                    .on_heartbeat_scan(scanner, &qr_payload, lat, lng, &ble_nearby, now)
                    .await;
                let _ = reply.send(result);
            }
            GameCommand::ChainEvent { event, meta } => {
                if let Err(e) = self.on_chain_event(event, meta, now).await {
                    error!(game_id = %self.game.id, error = %e, "Chain event mirror failed");
                }
            }
            GameCommand::Snapshot { reply } => {
                let result = self.snapshot().await;
                let _ = reply.send(result);
            }
        }
    }

    fn number_of(&self, address: Address) -> Option<PlayerNumber> {
        self.numbers.get(&address).copied()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TICK
    // ═══════════════════════════════════════════════════════════════════════

    async fn on_tick(&mut self, now: UnixSeconds) -> Result<()> {
        if self.game.phase != GamePhase::Active {
            self.finished = true;
            return Ok(());
        }
        self.tick_count += 1;

        // The expiry deadline is permissionless; latch one submission.
        if !self.expiry_requested && now >= self.game.expiry_at() {
            warn!(game_id = %self.game.id, "Expiry deadline passed; requesting cancellation");
            self.expiry_requested = true;
            self.deps
                .queue
                .enqueue(OperatorCall::TriggerExpiry {
                    game_id: self.game.id,
                })
                .await?;
        }

        match self.game.sub_phase {
            Some(SubPhase::Checkin) => self.try_finish_checkin(now).await?,
            Some(SubPhase::Pregame) => {
                let since = self.game.sub_phase_started_at.unwrap_or(now);
                if now - since >= self.deps.settings.pregame_duration_seconds {
                    self.enter_game(now).await?;
                }
            }
            Some(SubPhase::Game) => self.game_tick(now).await?,
            None => {}
        }

        if self.tick_count.is_multiple_of(PRUNE_EVERY_TICKS) {
            self.deps
                .store
                .prune_location_pings(self.game.id, now - PRUNE_RETAIN_SECONDS)
                .await?;
        }
        Ok(())
    }

    async fn game_tick(&mut self, now: UnixSeconds) -> Result<()> {
        let game_id = self.game.id;
        let started_at = self.game.started_at.unwrap_or(now);

        // (a) + (b): zone shrinks and the out-of-zone sweep.
        let alive: Vec<Player> = self.deps.store.get_alive_players(game_id).await?;
        let alive_set: HashMap<Address, ()> = alive.iter().map(|p| (p.address, ())).collect();

        let freshness = (self.deps.settings.gps_ping_interval_seconds * 6).max(30);
        let positions: Vec<(Address, crate::geo::GeoPoint)> = self
            .deps
            .store
            .get_latest_location_pings(game_id)
            .await?
            .into_iter()
            .filter(|ping| alive_set.contains_key(&ping.address))
            .filter(|ping| now - ping.timestamp <= freshness)
            .map(|ping| (ping.address, ping.point))
            .collect();

        let zone_center = self.game.zone_center;
        let events = self
            .zone
            .as_mut()
            .map(|zone| zone.tick(now, now - started_at, zone_center, &positions));
        if let Some(events) = events {
            let next = self.zone.as_ref().and_then(ZoneTracker::next_shrink);
            for radius in events.shrinks {
                self.deps.broadcaster.broadcast(
                    game_id,
                    &ServerMessage::ZoneShrink {
                        game_id,
                        radius_meters: radius,
                        next_shrink_at: next.map(|s| started_at + s.at_second),
                        next_radius_meters: next.map(|s| s.radius_meters),
                    },
                );
            }
            for (player, seconds_remaining) in events.warnings {
                if let Some(number) = self.number_of(player) {
                    self.deps.broadcaster.send_to_player(
                        game_id,
                        number,
                        &ServerMessage::ZoneWarning {
                            game_id,
                            seconds_remaining,
                        },
                    );
                }
            }
            for player in events.returned {
                if let Some(number) = self.number_of(player) {
                    self.deps
                        .broadcaster
                        .send_to_player(game_id, number, &ServerMessage::ZoneOk { game_id });
                }
            }
            for victim in events.eliminations {
                self.eliminate(victim, EliminationReason::ZoneViolation, None, now, true)
                    .await?;
                if self.finished {
                    return Ok(());
                }
            }
        }

        // (c): heartbeat sweep, unless auto-disabled.
        if !self.heartbeat.is_disabled() {
            let expired = self
                .deps
                .store
                .get_heartbeat_expired_players(game_id, now, self.heartbeat.interval_secs())
                .await?;
            for player in expired {
                let alive_count = self.deps.store.get_alive_player_count(game_id).await?;
                self.heartbeat.observe_alive_count(alive_count);
                if self.heartbeat.is_disabled() {
                    info!(game_id = %game_id, alive_count, "Heartbeat enforcement auto-disabled");
                    break;
                }
                self.eliminate(
                    player.address,
                    EliminationReason::HeartbeatTimeout,
                    None,
                    now,
                    true,
                )
                .await?;
                if self.finished {
                    return Ok(());
                }
            }
        }

        // (d): endgame check (also covered by each elimination).
        if !self.finished && self.deps.store.get_alive_player_count(game_id).await? <= 1 {
            self.end_game(now).await?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SUB-PHASE TRANSITIONS
    // ═══════════════════════════════════════════════════════════════════════

    fn checkin_required(&self) -> u32 {
        checkin::min_required_for_prizes(&self.game.split, self.game.min_players)
    }

    async fn try_finish_checkin(&mut self, now: UnixSeconds) -> Result<()> {
        let checked_in = self.deps.store.get_checked_in_count(self.game.id).await?;
        if checked_in >= self.checkin_required() {
            self.enter_pregame(now).await?;
        }
        Ok(())
    }

    async fn enter_pregame(&mut self, now: UnixSeconds) -> Result<()> {
        let game_id = self.game.id;
        info!(%game_id, "Entering pregame");

        self.deps
            .store
            .update_sub_phase(game_id, SubPhase::Pregame, now)
            .await?;
        self.game.sub_phase = Some(SubPhase::Pregame);
        self.game.sub_phase_started_at = Some(now);

        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::PregameStarted {
                game_id,
                starts_in_seconds: self.deps.settings.pregame_duration_seconds,
            },
        );
        Ok(())
    }

    async fn enter_game(&mut self, now: UnixSeconds) -> Result<()> {
        let game_id = self.game.id;
        let started_at = self.game.started_at.unwrap_or(now);
        info!(%game_id, "Entering the hunt");

        self.deps
            .store
            .update_sub_phase(game_id, SubPhase::Game, now)
            .await?;
        self.game.sub_phase = Some(SubPhase::Game);
        self.game.sub_phase_started_at = Some(now);

        // Everyone starts with a fresh heartbeat deadline.
        self.deps.store.init_players_heartbeat(game_id, now).await?;

        // Build and persist the target cycle.
        let alive = self.deps.store.get_alive_players(game_id).await?;
        let pairs: Vec<(Address, PlayerNumber)> =
            alive.iter().map(|p| (p.address, p.number)).collect();

        let seed_hash = match self.deps.chain.seed_block_hash(started_at).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%game_id, error = %e, "Seed block lookup failed; using context hash");
                None
            }
        };
        let seed = permutation_seed(game_id, started_at, seed_hash);
        self.targets = TargetChain::initialize(&pairs, seed);
        self.deps
            .store
            .set_target_assignments(game_id, &self.targets.assignments())
            .await?;

        // Zone tracking begins against the elapsed schedule.
        let schedule = self.deps.store.get_zone_shrinks(game_id).await?;
        let mut tracker = ZoneTracker::new(schedule, self.deps.settings.zone_grace_seconds);
        tracker.resume(now - started_at);
        let current = tracker.current_radius();
        let next = tracker.next_shrink();
        self.zone = Some(tracker);

        self.heartbeat.observe_alive_count(pairs.len() as u32);

        self.deps
            .broadcaster
            .broadcast(game_id, &ServerMessage::GameStartedBroadcast { game_id });
        if let Some(radius) = current {
            self.deps.broadcaster.broadcast(
                game_id,
                &ServerMessage::ZoneShrink {
                    game_id,
                    radius_meters: radius,
                    next_shrink_at: next.map(|s| started_at + s.at_second),
                    next_radius_meters: next.map(|s| s.radius_meters),
                },
            );
        }
        for (hunter, target) in self.targets.assignments() {
            if let (Some(hunter_number), Some(target_number)) =
                (self.number_of(hunter), self.number_of(target))
            {
                self.deps.broadcaster.send_to_player(
                    game_id,
                    hunter_number,
                    &ServerMessage::GameStarted {
                        game_id,
                        target_number,
                    },
                );
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ELIMINATIONS & ENDGAME
    // ═══════════════════════════════════════════════════════════════════════

    /// Eliminate a player for a non-combat reason (or mirror a chain-side
    /// elimination when `reflect_on_chain` is false).
    async fn eliminate(
        &mut self,
        victim: Address,
        reason: EliminationReason,
        eliminated_by: Option<Address>,
        now: UnixSeconds,
        reflect_on_chain: bool,
    ) -> Result<()> {
        let game_id = self.game.id;
        let Some(victim_number) = self.number_of(victim) else {
            return Ok(());
        };

        let rewire = self.targets.eliminate(victim);
        self.deps
            .store
            .commit_elimination(&EliminationUpdate {
                game_id,
                victim,
                reason,
                eliminated_by,
                timestamp: now,
                rewire,
            })
            .await?;

        if let Some(zone) = self.zone.as_mut() {
            zone.clear_player(victim);
        }

        if reflect_on_chain {
            self.deps
                .queue
                .enqueue(OperatorCall::EliminatePlayer {
                    game_id,
                    player: victim,
                    reason,
                })
                .await?;
        }

        info!(%game_id, player = %victim_number, reason = reason.as_str(), "Player eliminated");
        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::PlayerEliminated {
                game_id,
                player_number: victim_number,
                reason,
            },
        );
        self.announce_rewire(rewire);
        self.broadcast_leaderboard().await?;

        if self.deps.store.get_alive_player_count(game_id).await? <= 1 {
            self.end_game(now).await?;
        }
        Ok(())
    }

    fn announce_rewire(&self, rewire: RewireUpdate) {
        let game_id = self.game.id;
        if let RewireUpdate::Reassign { hunter, new_target } = rewire {
            if let (Some(hunter_number), Some(target_number)) =
                (self.number_of(hunter), self.number_of(new_target))
            {
                self.deps.broadcaster.send_to_player(
                    game_id,
                    hunter_number,
                    &ServerMessage::TargetAssigned {
                        game_id,
                        target_number,
                    },
                );
                self.deps.broadcaster.send_to_player(
                    game_id,
                    target_number,
                    &ServerMessage::HunterUpdated { game_id },
                );
            }
        }
    }

    async fn broadcast_leaderboard(&self) -> Result<()> {
        let leaderboard = self.leaderboard().await?;
        self.deps.broadcaster.broadcast(
            self.game.id,
            &ServerMessage::LeaderboardUpdate {
                game_id: self.game.id,
                leaderboard,
            },
        );
        Ok(())
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(self
            .deps
            .store
            .get_players(self.game.id)
            .await?
            .into_iter()
            .map(|p| LeaderboardEntry {
                player_number: p.number,
                kills: p.kills,
                is_alive: p.is_alive,
            })
            .collect())
    }

    /// Compute winners and transition to ENDED.
    ///
    /// 1st is the remaining alive player, 2nd and 3rd come from the
    /// elimination order reversed, top killer is max kills with the lowest
    /// player number breaking ties.
    async fn end_game(&mut self, now: UnixSeconds) -> Result<()> {
        let game_id = self.game.id;
        let players = self.deps.store.get_players(game_id).await?;

        let mut eliminated: Vec<&Player> =
            players.iter().filter(|p| !p.is_alive).collect();
        eliminated.sort_by_key(|p| std::cmp::Reverse(p.elimination_order.unwrap_or(0)));

        let mut podium = players.iter().filter(|p| p.is_alive).map(|p| p.address);
        let first = match podium.next() {
            Some(address) => address,
            // Everyone got eliminated in the same tick; last out wins.
            None => match eliminated.first() {
                Some(p) => p.address,
                None => return Ok(()),
            },
        };
        let mut placed = eliminated.iter().filter(|p| p.address != first);
        let second = placed.next().map(|p| p.address);
        let third = placed.next().map(|p| p.address);

        let top_killer = players
            .iter()
            .max_by(|a, b| {
                a.kills
                    .cmp(&b.kills)
                    .then(b.number.value().cmp(&a.number.value()))
            })
            .map_or(first, |p| p.address);

        let winners = Winners {
            first,
            second,
            third,
            top_killer,
        };

        info!(%game_id, ?winners, "Game over");
        self.deps
            .store
            .update_game_phase(
                game_id,
                GamePhase::Ended,
                &PhaseUpdate {
                    ended_at: Some(now),
                    winners: Some(winners),
                    ..Default::default()
                },
            )
            .await?;
        self.game.phase = GamePhase::Ended;
        self.game.sub_phase = None;
        self.game.winners = Some(winners);

        self.deps
            .queue
            .enqueue(OperatorCall::EndGame {
                game_id,
                first,
                second,
                third,
                top_killer,
            })
            .await?;

        if let (Some(first_number), Some(killer_number)) =
            (self.number_of(first), self.number_of(top_killer))
        {
            self.deps.broadcaster.broadcast(
                game_id,
                &ServerMessage::GameEnded {
                    game_id,
                    first: first_number,
                    second: second.and_then(|a| self.number_of(a)),
                    third: third.and_then(|a| self.number_of(a)),
                    top_killer: killer_number,
                },
            );
        }

        self.finished = true;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INGRESS: KILLS
    // ═══════════════════════════════════════════════════════════════════════

    async fn on_submit_kill(&mut self, request: &KillRequest, now: UnixSeconds) -> Result<Kill> {
        let game_id = self.game.id;
        let store = &self.deps.store;

        let hunter = store.get_player(game_id, request.hunter).await?;

        // Resolve the QR to its player ahead of verification; the pipeline
        // re-checks the payload itself so a bad QR still fails at its own
        // step.
        let target = match qr::decode_qr(&request.qr_payload) {
            Ok(payload) if payload.game_id == game_id => {
                store
                    .get_player_by_number(game_id, payload.player_number)
                    .await?
            }
            _ => None,
        };
        let target_ping = match &target {
            Some(t) => store.get_latest_location_ping(game_id, t.address).await?,
            None => None,
        };
        let assigned_target = self.targets.target_of(request.hunter);

        let verified = kill::verify(
            request,
            &KillContext {
                game: &self.game,
                hunter: hunter.as_ref(),
                target: target.as_ref(),
                target_ping: target_ping.as_ref(),
                assigned_target,
                kill_proximity_meters: self.deps.settings.kill_proximity_meters,
                ble_required: self.deps.settings.ble_required,
            },
        )?;

        let kill = Kill {
            game_id,
            hunter: request.hunter,
            target: verified.target,
            timestamp: now,
            hunter_pos: verified.hunter_pos,
            target_pos: verified.target_pos,
            distance_meters: verified.distance_meters,
            tx_hash: None,
        };

        let rewire = self.targets.eliminate(verified.target);
        store
            .commit_kill(
                &kill,
                &EliminationUpdate {
                    game_id,
                    victim: verified.target,
                    reason: EliminationReason::Killed,
                    eliminated_by: Some(request.hunter),
                    timestamp: now,
                    rewire,
                },
            )
            .await?;

        // Chain intent is enqueued before this command completes, so no
        // later command can observe the post-kill state first.
        self.deps
            .queue
            .enqueue(OperatorCall::RecordKill {
                game_id,
                hunter: request.hunter,
                target: verified.target,
            })
            .await?;

        if let Some(content_hash) = &request.photo_hash {
            self.deps
                .store
                .insert_game_photo(&crate::types::entities::GamePhoto {
                    game_id,
                    hunter: request.hunter,
                    target: verified.target,
                    taken_at: now,
                    content_hash: content_hash.clone(),
                })
                .await?;
        }

        if let Some(zone) = self.zone.as_mut() {
            zone.clear_player(verified.target);
        }

        let hunter_number = self.number_of(request.hunter);
        info!(
            %game_id,
            hunter = ?hunter_number,
            target = %verified.target_number,
            distance_m = verified.distance_meters,
            "Kill recorded"
        );

        if let Some(hunter_number) = hunter_number {
            self.deps.broadcaster.broadcast(
                game_id,
                &ServerMessage::KillRecorded {
                    game_id,
                    hunter_number,
                    target_number: verified.target_number,
                    distance_meters: verified.distance_meters,
                },
            );
        }
        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::PlayerEliminated {
                game_id,
                player_number: verified.target_number,
                reason: EliminationReason::Killed,
            },
        );
        self.announce_rewire(rewire);
        self.broadcast_leaderboard().await?;

        if store.get_alive_player_count(game_id).await? <= 1 {
            self.end_game(now).await?;
        }

        Ok(kill)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INGRESS: CHECK-IN & LOCATION
    // ═══════════════════════════════════════════════════════════════════════

    async fn on_checkin(
        &mut self,
        player: Address,
        lat: f64,
        lng: f64,
        qr_payload: Option<&str>,
        bluetooth_id: Option<String>,
        now: UnixSeconds,
    ) -> Result<()> {
        let game_id = self.game.id;
        if !self.game.in_sub_phase(SubPhase::Checkin) {
            return Err(StateError::PhaseMismatch {
                expected: "checkin".into(),
                actual: self
                    .game
                    .sub_phase
                    .map_or_else(|| self.game.phase.as_str().into(), |s| s.as_str().to_owned()),
            }
            .into());
        }

        let row = self
            .deps
            .store
            .get_player(game_id, player)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("player {player} in game {game_id}")))?;
        if row.checked_in {
            return Err(StateError::AlreadyCheckedIn.into());
        }

        let position =
            crate::geo::GeoPoint::new(lat, lng).map_err(ValidationError::BadCoordinate)?;

        // Resolve the voucher QR, if one was presented.
        let voucher = match qr_payload {
            None => None,
            Some(payload) => match qr::decode_qr(payload) {
                Ok(decoded) if decoded.game_id == game_id => {
                    self.deps
                        .store
                        .get_player_by_number(game_id, decoded.player_number)
                        .await?
                }
                _ => return Err(ValidationError::InvalidQr.into()),
            },
        };
        let voucher_ping = match &voucher {
            Some(v) => {
                self.deps
                    .store
                    .get_latest_location_ping(game_id, v.address)
                    .await?
            }
            None => None,
        };

        let checked_in = self.deps.store.get_checked_in_count(game_id).await?;
        checkin::verify_checkin(
            position,
            checked_in,
            seed_slot_quota(self.game.player_count),
            voucher.as_ref().zip(voucher_ping.as_ref()),
            self.deps.settings.kill_proximity_meters,
        )?;

        self.deps
            .store
            .set_player_checked_in(game_id, player, bluetooth_id.as_deref())
            .await?;
        self.deps
            .store
            .insert_location_ping(&LocationPing {
                game_id,
                address: player,
                point: position,
                timestamp: now,
                is_in_zone: true,
            })
            .await?;

        let checked_in = checked_in + 1;
        let required = self.checkin_required();
        info!(%game_id, player = %row.number, checked_in, required, "Player checked in");
        self.deps.broadcaster.broadcast(
            game_id,
            &ServerMessage::CheckinUpdate {
                game_id,
                player_number: row.number,
                checked_in_count: checked_in,
                required,
            },
        );

        if checked_in >= required {
            self.enter_pregame(now).await?;
        }
        Ok(())
    }

    async fn on_location(
        &mut self,
        player: Address,
        lat: f64,
        lng: f64,
        now: UnixSeconds,
    ) -> Result<()> {
        let game_id = self.game.id;
        if self.game.phase != GamePhase::Active {
            return Err(ValidationError::GameNotActive.into());
        }
        let row = self
            .deps
            .store
            .get_player(game_id, player)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("player {player} in game {game_id}")))?;
        if !row.is_alive {
            return Err(StateError::AlreadyEliminated.into());
        }

        let position =
            crate::geo::GeoPoint::new(lat, lng).map_err(ValidationError::BadCoordinate)?;

        let in_zone = self
            .zone
            .as_ref()
            .and_then(ZoneTracker::current_radius)
            .is_none_or(|radius| {
                crate::geo::haversine_meters(position, self.game.zone_center)
                    <= f64::from(radius)
            });

        self.deps
            .store
            .insert_location_ping(&LocationPing {
                game_id,
                address: player,
                point: position,
                timestamp: now,
                is_in_zone: in_zone,
            })
            .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INGRESS: HEARTBEAT SCANS
    // ═══════════════════════════════════════════════════════════════════════

    async fn on_heartbeat_scan(
        &mut self,
        scanner: Address,
        qr_payload: &str,
        lat: f64,
        lng: f64,
        ble_nearby: &[String],
        now: UnixSeconds,
    ) -> Result<()> {
        let game_id = self.game.id;
        let result = self
            .accept_heartbeat_scan(scanner, qr_payload, lat, lng, ble_nearby, now)
            .await;

        if let Err(error) = &result
            && let Some(number) = self.number_of(scanner)
        {
            self.deps.broadcaster.send_to_player(
                game_id,
                number,
                &ServerMessage::HeartbeatError {
                    game_id,
                    code: error.code().to_owned(),
                },
            );
        }
        result
    }

    async fn accept_heartbeat_scan(
        &mut self,
        scanner: Address,
        qr_payload: &str,
        lat: f64,
        lng: f64,
        ble_nearby: &[String],
        now: UnixSeconds,
    ) -> Result<()> {
        let game_id = self.game.id;
        if !self.game.in_sub_phase(SubPhase::Game) {
            return Err(ValidationError::GameNotActive.into());
        }

        let scanner_row = self
            .deps
            .store
            .get_player(game_id, scanner)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("player {scanner}")))?;

        let payload = qr::decode_qr(qr_payload).map_err(|_| ValidationError::InvalidQr)?;
        if payload.game_id != game_id {
            return Err(ValidationError::InvalidQr.into());
        }
        let scanned_row = self
            .deps
            .store
            .get_player_by_number(game_id, payload.player_number)
            .await?
            .ok_or(ValidationError::TargetNotFound)?;

        let scanner_pos =
            crate::geo::GeoPoint::new(lat, lng).map_err(ValidationError::BadCoordinate)?;
        let scanned_ping = self
            .deps
            .store
            .get_latest_location_ping(game_id, scanned_row.address)
            .await?;

        let distance = self.heartbeat.validate_scan(
            &scanner_row,
            &scanned_row,
            scanner_pos,
            scanned_ping.map(|p| p.point),
            self.deps.settings.ble_required,
            ble_nearby,
        )?;

        // Both parties proved presence.
        self.deps
            .store
            .update_last_heartbeat(game_id, &[scanner, scanned_row.address], now)
            .await?;
        self.deps
            .store
            .insert_heartbeat_scan(&HeartbeatScan {
                game_id,
                scanner,
                scanned: scanned_row.address,
                timestamp: now,
                scanner_pos,
                distance_meters: distance,
            })
            .await?;

        debug!(%game_id, scanner = %scanner_row.number, scanned = %scanned_row.number, "Heartbeat scan accepted");
        self.deps.broadcaster.send_to_player(
            game_id,
            scanner_row.number,
            &ServerMessage::HeartbeatScanSuccess {
                game_id,
                scanned_number: scanned_row.number,
            },
        );
        self.deps.broadcaster.send_to_player(
            game_id,
            scanned_row.number,
            &ServerMessage::HeartbeatRefreshed {
                game_id,
                last_heartbeat_at: now,
            },
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CHAIN EVENT MIRRORING
    // ═══════════════════════════════════════════════════════════════════════

    /// Mirror a confirmed chain event into local state.
    ///
    /// The server's own eliminations pre-populate the store, so replays are
    /// no-ops; the mirror paths only act when the chain knows something we
    /// do not (recovery after a crash between enqueue and local write is
    /// impossible by construction, but an operator acting out-of-band is
    /// not).
    async fn on_chain_event(
        &mut self,
        event: GameEvent,
        meta: EventMetadata,
        now: UnixSeconds,
    ) -> Result<()> {
        let game_id = self.game.id;
        match event {
            GameEvent::KillRecorded { hunter, target, .. } => {
                self.deps
                    .store
                    .update_kill_tx_hash(game_id, hunter, target, &format!("{:#x}", meta.tx_hash))
                    .await?;

                let local = self.deps.store.get_player(game_id, target).await?;
                if local.as_ref().is_some_and(|p| p.is_alive) {
                    warn!(%game_id, %target, "Mirroring chain-side kill unknown to the server");
                    let target_number = local.map(|p| p.number);
                    let target_pos = self
                        .deps
                        .store
                        .get_latest_location_ping(game_id, target)
                        .await?
                        .map_or(self.game.zone_center, |p| p.point);

                    let rewire = self.targets.eliminate(target);
                    self.deps
                        .store
                        .commit_kill(
                            &Kill {
                                game_id,
                                hunter,
                                target,
                                timestamp: meta.block_timestamp,
                                hunter_pos: target_pos,
                                target_pos,
                                distance_meters: 0.0,
                                tx_hash: Some(format!("{:#x}", meta.tx_hash)),
                            },
                            &EliminationUpdate {
                                game_id,
                                victim: target,
                                reason: EliminationReason::Killed,
                                eliminated_by: Some(hunter),
                                timestamp: meta.block_timestamp,
                                rewire,
                            },
                        )
                        .await?;

                    if let Some(zone) = self.zone.as_mut() {
                        zone.clear_player(target);
                    }
                    if let Some(number) = target_number {
                        self.deps.broadcaster.broadcast(
                            game_id,
                            &ServerMessage::PlayerEliminated {
                                game_id,
                                player_number: number,
                                reason: EliminationReason::Killed,
                            },
                        );
                    }
                    self.announce_rewire(rewire);
                    self.broadcast_leaderboard().await?;
                    if self.deps.store.get_alive_player_count(game_id).await? <= 1 {
                        self.end_game(now).await?;
                    }
                }
            }
            GameEvent::PlayerEliminated { player, reason, .. } => {
                let local = self.deps.store.get_player(game_id, player).await?;
                if local.as_ref().is_some_and(|p| p.is_alive) {
                    warn!(%game_id, %player, "Mirroring chain-side elimination unknown to the server");
                    self.eliminate(
                        player,
                        reason.unwrap_or(EliminationReason::ZoneViolation),
                        None,
                        now,
                        false,
                    )
                    .await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════

    async fn snapshot(&self) -> Result<GameStatus> {
        let game_id = self.game.id;
        let started_at = self.game.started_at.unwrap_or(0);

        let zone = self.zone.as_ref().and_then(|tracker| {
            tracker.current_radius().map(|radius| {
                let next = tracker.next_shrink();
                ZoneStatus {
                    center: self.game.zone_center,
                    radius_meters: radius,
                    next_shrink_at: next.map(|s| started_at + s.at_second),
                    next_radius_meters: next.map(|s| s.radius_meters),
                }
            })
        });

        Ok(GameStatus {
            game_id,
            phase: self.game.phase,
            sub_phase: self.game.sub_phase,
            player_count: self.deps.store.get_player_count(game_id).await?,
            alive_count: self.deps.store.get_alive_player_count(game_id).await?,
            checked_in_count: self.deps.store.get_checked_in_count(game_id).await?,
            zone,
            leaderboard: self.leaderboard().await?,
            heartbeat_disabled: self.heartbeat.is_disabled(),
        })
    }
}
