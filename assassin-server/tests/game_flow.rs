//! End-to-end scenarios driven through the manager against an in-memory
//! store and a scripted mock chain.

mod common;

use std::time::Duration;

use common::{TestEnv, VENUE, addr, build_env, meta, near_venue, script_game, test_settings};

use assassin_server::chain::OperatorCall;
use assassin_server::error::{ServerError, StateError, ValidationError};
use assassin_server::listener::ChainEventHandler;
use assassin_server::listener::rebuild::rebuild_from_chain;
use assassin_server::ports::store::{PlayerStore, TargetStore};
use assassin_server::proof::qr::encode_qr;
use assassin_server::types::enums::{EliminationReason, GamePhase, SubPhase};
use assassin_server::types::events::GameEvent;
use assassin_server::types::primitives::{GameId, PlayerNumber};

const GAME: GameId = GameId::new(1);

/// Drive a scripted game to ACTIVE/checkin through chain events.
async fn start_game(env: &TestEnv, players: u32) {
    script_game(env, 1, 3, players);

    env.manager
        .handle_event(
            GameEvent::GameCreated {
                game_id: GAME,
                creator: addr(0xC0),
            },
            meta(1, 0),
        )
        .await
        .unwrap();

    for n in 1..=players {
        env.manager
            .handle_event(
                GameEvent::PlayerRegistered {
                    game_id: GAME,
                    player: addr(n as u8),
                    player_number: n,
                },
                meta(2, u64::from(n)),
            )
            .await
            .unwrap();
    }

    env.manager
        .handle_event(
            GameEvent::GameStarted {
                game_id: GAME,
                started_at: chrono::Utc::now().timestamp(),
            },
            meta(3, 0),
        )
        .await
        .unwrap();
}

/// Check in all players: #1 on GPS (seed slot), the rest vouched by #1.
async fn check_in_all(env: &TestEnv, players: u32) {
    let here = near_venue(10.0);
    env.manager
        .checkin(GAME, addr(1), here.lat, here.lng, None, Some("BT:01".into()))
        .await
        .unwrap();

    let voucher_qr = encode_qr(GAME, PlayerNumber::new(1)).unwrap();
    for n in 2..=players {
        let pos = near_venue(10.0 + f64::from(n));
        env.manager
            .checkin(
                GAME,
                addr(n as u8),
                pos.lat,
                pos.lng,
                Some(voucher_qr.clone()),
                Some(format!("BT:{n:02}")),
            )
            .await
            .unwrap();
    }
}

/// Wait until the game reaches the given sub-phase.
async fn wait_for_sub_phase(env: &TestEnv, sub_phase: SubPhase) {
    for _ in 0..60 {
        let game = env.store_game().await;
        if game.sub_phase == Some(sub_phase) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("game never reached sub-phase {sub_phase:?}");
}

impl TestEnv {
    async fn store_game(&self) -> assassin_server::types::entities::Game {
        use assassin_server::ports::store::GameStore;
        self.store.get_game(GAME).await.unwrap().unwrap()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn happy_four_player_game() {
    let mut env = build_env(test_settings()).await;
    start_game(&env, 4).await;
    check_in_all(&env, 4).await;
    wait_for_sub_phase(&env, SubPhase::Game).await;

    // The cycle covers all four players.
    let assignments = env.store.get_target_assignments(GAME).await.unwrap();
    assert_eq!(assignments.len(), 4);

    // A kill on someone other than the assignment changes nothing.
    let hunter = addr(1);
    let target = env
        .store
        .get_target_assignment(GAME, hunter)
        .await
        .unwrap()
        .unwrap();
    let not_target = (1_u8..=4)
        .map(addr)
        .find(|a| *a != hunter && *a != target)
        .unwrap();
    let not_target_number = env
        .store
        .get_player(GAME, not_target)
        .await
        .unwrap()
        .unwrap()
        .number;
    let bad_qr = encode_qr(GAME, not_target_number).unwrap();
    let err = env
        .manager
        .submit_kill(GAME, hunter, bad_qr, VENUE.lat, VENUE.lng, vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Validation(ValidationError::NotYourTarget)
    ));
    assert!(
        env.store
            .get_player(GAME, not_target)
            .await
            .unwrap()
            .unwrap()
            .is_alive
    );
    use assassin_server::ports::store::KillStore;
    assert!(env.store.get_kills(GAME).await.unwrap().is_empty());

    // Walk the cycle: player 1 takes out every inherited target.
    let mut victims = Vec::new();
    for round in 1..=3 {
        let target = env
            .store
            .get_target_assignment(GAME, hunter)
            .await
            .unwrap()
            .unwrap();
        let target_number = env
            .store
            .get_player(GAME, target)
            .await
            .unwrap()
            .unwrap()
            .number;
        let qr = encode_qr(GAME, target_number).unwrap();

        // The first kill carries a proof photo.
        let photo = (round == 1).then(|| "sha256:4f2d".to_owned());
        let kill = env
            .manager
            .submit_kill(GAME, hunter, qr, VENUE.lat, VENUE.lng, vec![], photo)
            .await
            .unwrap();
        assert_eq!(kill.hunter, hunter);
        assert_eq!(kill.target, target);
        assert!(kill.distance_meters <= 100.0);
        victims.push(target);

        let hunter_row = env.store.get_player(GAME, hunter).await.unwrap().unwrap();
        assert_eq!(hunter_row.kills, round);
        let target_row = env.store.get_player(GAME, target).await.unwrap().unwrap();
        assert!(!target_row.is_alive);
        assert_eq!(target_row.eliminated_by, Some(hunter));
        assert_eq!(target_row.elimination_reason, Some(EliminationReason::Killed));
    }

    // Three kills from four players ends the game.
    let game = env.store_game().await;
    assert_eq!(game.phase, GamePhase::Ended);
    let winners = game.winners.unwrap();
    assert_eq!(winners.first, hunter);
    assert_eq!(winners.top_killer, hunter);
    assert_eq!(winners.second, Some(victims[2]));
    assert_eq!(winners.third, Some(victims[1]));

    // Kill count equals kill rows.
    let kills = env.store.get_kills(GAME).await.unwrap();
    assert_eq!(kills.len(), 3);

    // The proof photo from the first kill was recorded.
    use assassin_server::ports::store::PhotoStore;
    let photos = env.store.get_game_photos(GAME).await.unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].content_hash, "sha256:4f2d");
    assert_eq!(photos[0].target, victims[0]);

    // The operator queue saw exactly the chain intents, in order.
    let mut actions = Vec::new();
    while let Ok(entry) = env.queue_rx.try_recv() {
        actions.push(entry.call);
    }
    assert_eq!(actions.len(), 4);
    for call in &actions[..3] {
        assert!(matches!(call, OperatorCall::RecordKill { .. }));
    }
    assert!(matches!(
        actions[3],
        OperatorCall::EndGame { first, top_killer, .. }
            if first == hunter && top_killer == hunter
    ));

    env.shutdown.cancel();
}

#[tokio::test]
async fn duplicate_kill_recorded_event_is_a_noop() {
    let env = build_env(test_settings()).await;
    start_game(&env, 4).await;
    check_in_all(&env, 4).await;
    wait_for_sub_phase(&env, SubPhase::Game).await;

    let hunter = addr(1);
    let target = env
        .store
        .get_target_assignment(GAME, hunter)
        .await
        .unwrap()
        .unwrap();
    let target_number = env
        .store
        .get_player(GAME, target)
        .await
        .unwrap()
        .unwrap()
        .number;
    let qr = encode_qr(GAME, target_number).unwrap();
    env.manager
        .submit_kill(GAME, hunter, qr, VENUE.lat, VENUE.lng, vec![], None)
        .await
        .unwrap();

    // The confirmation event replays twice (backfill after restart).
    for i in 0..2 {
        env.manager
            .handle_event(
                GameEvent::KillRecorded {
                    game_id: GAME,
                    hunter,
                    target,
                },
                meta(10, i),
            )
            .await
            .unwrap();
        // Give the actor mailbox a moment to drain.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    use assassin_server::ports::store::KillStore;
    let kills = env.store.get_kills(GAME).await.unwrap();
    assert_eq!(kills.len(), 1);
    assert!(kills[0].tx_hash.is_some());
    let hunter_row = env.store.get_player(GAME, hunter).await.unwrap().unwrap();
    assert_eq!(hunter_row.kills, 1);

    env.shutdown.cancel();
}

#[tokio::test]
async fn checkin_policy_enforced() {
    let env = build_env(test_settings()).await;
    start_game(&env, 4).await;

    let here = near_venue(5.0);

    // Seed slot: one player on GPS alone.
    env.manager
        .checkin(GAME, addr(1), here.lat, here.lng, None, None)
        .await
        .unwrap();

    // Repeat check-in rejected.
    let err = env
        .manager
        .checkin(GAME, addr(1), here.lat, here.lng, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::State(StateError::AlreadyCheckedIn)
    ));

    // Beyond the quota, GPS alone is not enough.
    let err = env
        .manager
        .checkin(GAME, addr(2), here.lat, here.lng, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Validation(ValidationError::NotCheckedIn)
    ));

    // A QR from another game is rejected outright.
    let foreign = encode_qr(GameId::new(9), PlayerNumber::new(1)).unwrap();
    let err = env
        .manager
        .checkin(GAME, addr(2), here.lat, here.lng, Some(foreign), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Validation(ValidationError::InvalidQr)
    ));

    // Vouched by the checked-in player works.
    let voucher = encode_qr(GAME, PlayerNumber::new(1)).unwrap();
    env.manager
        .checkin(GAME, addr(2), here.lat, here.lng, Some(voucher), None)
        .await
        .unwrap();

    env.shutdown.cancel();
}

#[tokio::test]
async fn heartbeat_scan_refreshes_both_sides() {
    let env = build_env(test_settings()).await;
    start_game(&env, 4).await;
    check_in_all(&env, 4).await;
    wait_for_sub_phase(&env, SubPhase::Game).await;

    let before = env.store.get_player(GAME, addr(1)).await.unwrap().unwrap();
    let baseline = before.last_heartbeat_at.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Player 3 scans player 1's QR near the venue.
    let qr = encode_qr(GAME, PlayerNumber::new(1)).unwrap();
    let here = near_venue(12.0);
    env.manager
        .heartbeat_scan(GAME, addr(3), qr, here.lat, here.lng, vec![])
        .await
        .unwrap();

    let scanner = env.store.get_player(GAME, addr(3)).await.unwrap().unwrap();
    let scanned = env.store.get_player(GAME, addr(1)).await.unwrap().unwrap();
    assert!(scanner.last_heartbeat_at.unwrap() >= baseline);
    assert!(scanned.last_heartbeat_at.unwrap() >= baseline);

    // Self-scan is rejected.
    let own = encode_qr(GAME, PlayerNumber::new(3)).unwrap();
    let err = env
        .manager
        .heartbeat_scan(GAME, addr(3), own, here.lat, here.lng, vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Validation(ValidationError::InvalidQr)
    ));

    env.shutdown.cancel();
}

#[tokio::test]
async fn heartbeat_timeouts_stop_at_the_disable_threshold() {
    let env = build_env(test_settings()).await;
    start_game(&env, 6).await;
    // The pregame threshold is four check-ins; players 5 and 6 never show
    // up at the meeting point but are still alive in the hunt.
    check_in_all(&env, 4).await;
    wait_for_sub_phase(&env, SubPhase::Game).await;

    // Players 4-6 all blew their heartbeat deadline while the process was
    // busy; the sweep may only eliminate until the alive count reaches the
    // threshold.
    let stale = chrono::Utc::now().timestamp() - 700;
    env.store
        .update_last_heartbeat(GAME, &[addr(4), addr(5), addr(6)], stale)
        .await
        .unwrap();

    // Two eliminations bring alive from 6 to 4; then the latch engages.
    for _ in 0..50 {
        if !env.store.get_player(GAME, addr(5)).await.unwrap().unwrap().is_alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let p4 = env.store.get_player(GAME, addr(4)).await.unwrap().unwrap();
    let p5 = env.store.get_player(GAME, addr(5)).await.unwrap().unwrap();
    let p6 = env.store.get_player(GAME, addr(6)).await.unwrap().unwrap();
    assert!(!p4.is_alive);
    assert_eq!(p4.elimination_reason, Some(EliminationReason::HeartbeatTimeout));
    assert!(!p5.is_alive);
    // The third expired player is spared: enforcement disabled at 4 alive.
    assert!(p6.is_alive);

    let status = env.manager.status(GAME).await.unwrap();
    assert_eq!(status.alive_count, 4);
    assert!(status.heartbeat_disabled);

    // Still disabled one sweep later.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(env.store.get_player(GAME, addr(6)).await.unwrap().unwrap().is_alive);

    env.shutdown.cancel();
}

#[tokio::test]
async fn low_registration_triggers_cancellation() {
    let mut env = build_env(test_settings()).await;
    script_game(&env, 1, 3, 2);

    // Deadline one second out so the timer fires during the test.
    {
        let mut games = env.chain.games.lock();
        let game = games.get_mut(&1).unwrap();
        game.config.registration_deadline = chrono::Utc::now().timestamp() + 1;
    }

    env.manager
        .handle_event(
            GameEvent::GameCreated {
                game_id: GAME,
                creator: addr(0xC0),
            },
            meta(1, 0),
        )
        .await
        .unwrap();
    for n in 1..=2 {
        env.manager
            .handle_event(
                GameEvent::PlayerRegistered {
                    game_id: GAME,
                    player: addr(n),
                    player_number: u32::from(n),
                },
                meta(2, u64::from(n)),
            )
            .await
            .unwrap();
    }

    // playerCount = 2 < minPlayers = 3 → the deadline requests cancellation.
    let entry = tokio::time::timeout(Duration::from_secs(5), env.queue_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.call, OperatorCall::TriggerCancellation { game_id: GAME });

    // The confirmation event lands; the server's role ends there.
    env.manager
        .handle_event(GameEvent::GameCancelled { game_id: GAME }, meta(5, 0))
        .await
        .unwrap();
    let game = env.store_game().await;
    assert_eq!(game.phase, GamePhase::Cancelled);

    env.shutdown.cancel();
}

#[tokio::test]
async fn restart_recovers_mid_game_state() {
    let env = build_env(test_settings()).await;
    start_game(&env, 4).await;
    check_in_all(&env, 4).await;
    wait_for_sub_phase(&env, SubPhase::Game).await;

    // One kill before the "crash".
    let hunter = addr(1);
    let target = env
        .store
        .get_target_assignment(GAME, hunter)
        .await
        .unwrap()
        .unwrap();
    let target_number = env
        .store
        .get_player(GAME, target)
        .await
        .unwrap()
        .unwrap()
        .number;
    let qr = encode_qr(GAME, target_number).unwrap();
    env.manager
        .submit_kill(GAME, hunter, qr, VENUE.lat, VENUE.lng, vec![], None)
        .await
        .unwrap();

    let assignments_before = {
        let mut a = env.store.get_target_assignments(GAME).await.unwrap();
        a.sort_by_key(|x| x.hunter);
        a
    };

    // Crash: drop every actor, then bring up a fresh manager on the same
    // store and recover.
    env.shutdown.cancel();
    env.manager.stop_all();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let env2 = {
        use assassin_server::fanout::ChannelBroadcaster;
        use assassin_server::game::{GameDeps, GameManager};
        use assassin_server::ports::chain::GameChain;
        use assassin_server::ports::store::Store;
        use assassin_server::queue::OperatorQueue;
        use std::sync::Arc;
        use tokio_util::sync::CancellationToken;

        let (queue, rx) = OperatorQueue::detached(Arc::clone(&env.store) as Arc<dyn Store>);
        let deps = Arc::new(GameDeps {
            store: Arc::clone(&env.store) as Arc<dyn Store>,
            chain: Arc::clone(&env.chain) as Arc<dyn GameChain>,
            queue,
            broadcaster: Arc::new(ChannelBroadcaster::new()),
            settings: test_settings(),
        });
        let manager = GameManager::new(deps, CancellationToken::new());
        (manager, rx)
    };
    let (manager2, mut queue_rx2) = env2;
    manager2.startup_recovery().await.unwrap();

    // Assignments survived untouched - recovery reloads, never reshuffles.
    let assignments_after = {
        let mut a = env.store.get_target_assignments(GAME).await.unwrap();
        a.sort_by_key(|x| x.hunter);
        a
    };
    assert_eq!(assignments_before, assignments_after);

    // The recovered actor serves snapshots and kills identically.
    let status = manager2.status(GAME).await.unwrap();
    assert_eq!(status.sub_phase, Some(SubPhase::Game));
    assert_eq!(status.alive_count, 3);
    assert_eq!(status.zone.unwrap().radius_meters, 500);

    let next_target = env
        .store
        .get_target_assignment(GAME, hunter)
        .await
        .unwrap()
        .unwrap();
    let next_number = env
        .store
        .get_player(GAME, next_target)
        .await
        .unwrap()
        .unwrap()
        .number;
    let qr = encode_qr(GAME, next_number).unwrap();
    manager2
        .submit_kill(GAME, hunter, qr, VENUE.lat, VENUE.lng, vec![], None)
        .await
        .unwrap();

    let entry = queue_rx2.recv().await.unwrap();
    assert!(matches!(entry.call, OperatorCall::RecordKill { .. }));

    manager2.stop_all();
}

#[tokio::test]
async fn rebuild_from_chain_is_idempotent() {
    let env = build_env(test_settings()).await;
    script_game(&env, 1, 3, 4);
    script_game(&env, 2, 3, 3);

    use assassin_server::ports::store::GameStore;

    let loaded = rebuild_from_chain(env.store.as_ref(), env.chain.as_ref(), 1)
        .await
        .unwrap();
    assert_eq!(loaded, 2);
    let games_first = env.store.get_all_games().await.unwrap();
    let players_first = env.store.get_players(GAME).await.unwrap();

    let loaded = rebuild_from_chain(env.store.as_ref(), env.chain.as_ref(), 1)
        .await
        .unwrap();
    assert_eq!(loaded, 2);
    let games_second = env.store.get_all_games().await.unwrap();
    let players_second = env.store.get_players(GAME).await.unwrap();

    assert_eq!(games_first, games_second);
    assert_eq!(players_first, players_second);
    assert_eq!(players_first.len(), 4);

    env.shutdown.cancel();
}

#[tokio::test]
async fn auth_snapshot_reports_identity_and_state() {
    let env = build_env(test_settings()).await;
    start_game(&env, 4).await;

    let snapshot = env.manager.auth_snapshot(GAME, addr(2)).await.unwrap();
    match snapshot {
        assassin_server::types::messages::ServerMessage::AuthSuccess {
            game_id,
            player_number,
            is_alive,
            checked_in,
            status,
        } => {
            assert_eq!(game_id, GAME);
            assert_eq!(player_number, PlayerNumber::new(2));
            assert!(is_alive);
            assert!(!checked_in);
            assert_eq!(status.phase, GamePhase::Active);
            assert_eq!(status.sub_phase, Some(SubPhase::Checkin));
            assert_eq!(status.player_count, 4);
        }
        other => panic!("expected auth:success, got {other:?}"),
    }

    let err = env.manager.auth_snapshot(GAME, addr(0x99)).await.unwrap_err();
    assert!(matches!(err, ServerError::State(StateError::NotFound(_))));

    env.shutdown.cancel();
}
