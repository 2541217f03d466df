//! Shared fixtures for integration tests: a scripted mock chain, an
//! in-memory environment, and event helpers.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use assassin_server::config::GameSettings;
use assassin_server::error::{Result, StateError};
use assassin_server::fanout::ChannelBroadcaster;
use assassin_server::game::{GameDeps, GameManager};
use assassin_server::geo::GeoPoint;
use assassin_server::ports::broadcast::Broadcaster;
use assassin_server::ports::chain::{ChainGameConfig, ChainGameState, ChainPlayer, GameChain};
use assassin_server::ports::store::Store;
use assassin_server::queue::{OperatorQueue, QueueEntry};
use assassin_server::store::SqliteStore;
use assassin_server::types::entities::{PrizeSplit, ZoneShrink};
use assassin_server::types::enums::GamePhase;
use assassin_server::types::events::EventMetadata;
use assassin_server::types::primitives::{GameId, PlayerNumber, UnixSeconds};

/// One scripted game on the mock chain.
#[derive(Debug, Clone)]
pub struct MockGame {
    pub config: ChainGameConfig,
    pub state: ChainGameState,
    pub shrinks: Vec<ZoneShrink>,
    pub players: Vec<(Address, ChainPlayer)>,
}

/// Scripted implementation of the chain-read port.
#[derive(Debug, Default)]
pub struct MockChain {
    pub games: Mutex<HashMap<u64, MockGame>>,
    pub next_game_id: Mutex<u64>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_game(&self, id: u64, game: MockGame) {
        self.games.lock().insert(id, game);
        let mut next = self.next_game_id.lock();
        *next = (*next).max(id + 1);
    }
}

#[async_trait]
impl GameChain for MockChain {
    async fn next_game_id(&self) -> Result<u64> {
        Ok(*self.next_game_id.lock())
    }

    async fn game_config(&self, game_id: GameId) -> Result<ChainGameConfig> {
        self.games
            .lock()
            .get(&game_id.value())
            .map(|g| g.config.clone())
            .ok_or_else(|| StateError::NotFound(format!("game {game_id}")).into())
    }

    async fn game_state(&self, game_id: GameId) -> Result<ChainGameState> {
        self.games
            .lock()
            .get(&game_id.value())
            .map(|g| g.state)
            .ok_or_else(|| StateError::NotFound(format!("game {game_id}")).into())
    }

    async fn zone_shrinks(&self, game_id: GameId) -> Result<Vec<ZoneShrink>> {
        self.games
            .lock()
            .get(&game_id.value())
            .map(|g| g.shrinks.clone())
            .ok_or_else(|| StateError::NotFound(format!("game {game_id}")).into())
    }

    async fn player(&self, game_id: GameId, address: Address) -> Result<Option<ChainPlayer>> {
        Ok(self.games.lock().get(&game_id.value()).and_then(|g| {
            g.players
                .iter()
                .find(|(a, _)| *a == address)
                .map(|(_, p)| *p)
        }))
    }

    async fn player_by_number(
        &self,
        game_id: GameId,
        number: PlayerNumber,
    ) -> Result<Option<(Address, ChainPlayer)>> {
        Ok(self.games.lock().get(&game_id.value()).and_then(|g| {
            g.players
                .iter()
                .find(|(_, p)| p.number == number)
                .copied()
        }))
    }

    async fn seed_block_hash(&self, _at_or_after: UnixSeconds) -> Result<Option<B256>> {
        Ok(Some(B256::repeat_byte(0x42)))
    }
}

/// Everything a scenario needs, wired over in-memory infrastructure.
pub struct TestEnv {
    pub store: Arc<SqliteStore>,
    pub chain: Arc<MockChain>,
    pub manager: Arc<GameManager>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub queue_rx: mpsc::UnboundedReceiver<QueueEntry>,
    pub shutdown: CancellationToken,
}

/// Venue anchor: all test positions are offsets from here.
pub const VENUE: GeoPoint = GeoPoint { lat: 52.52, lng: 13.405 };

/// A point roughly `meters` north of the venue.
pub fn near_venue(meters: f64) -> GeoPoint {
    GeoPoint {
        lat: VENUE.lat + meters / 111_195.0,
        lng: VENUE.lng,
    }
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn test_settings() -> GameSettings {
    GameSettings {
        kill_proximity_meters: 100.0,
        zone_grace_seconds: 60,
        gps_ping_interval_seconds: 5,
        ble_required: false,
        heartbeat_interval_seconds: 600,
        heartbeat_proximity_meters: 100.0,
        heartbeat_disable_threshold: 4,
        checkin_duration_seconds: 300,
        // Tests move through pregame on the next tick.
        pregame_duration_seconds: 0,
    }
}

pub async fn build_env(settings: GameSettings) -> TestEnv {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let chain = MockChain::new();
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let (queue, queue_rx) = OperatorQueue::detached(Arc::clone(&store) as Arc<dyn Store>);
    let shutdown = CancellationToken::new();

    let deps = Arc::new(GameDeps {
        store: Arc::clone(&store) as Arc<dyn Store>,
        chain: Arc::clone(&chain) as Arc<dyn GameChain>,
        queue,
        broadcaster: Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        settings,
    });
    let manager = GameManager::new(deps, shutdown.clone());

    TestEnv {
        store,
        chain,
        manager,
        broadcaster,
        queue_rx,
        shutdown,
    }
}

/// A four-player game scripted onto the mock chain, registration still
/// open far in the future so deadline timers stay quiet.
pub fn script_game(env: &TestEnv, id: u64, min_players: u32, player_count: u32) {
    let now = chrono::Utc::now().timestamp();
    let players = (1..=player_count)
        .map(|n| {
            (
                addr(n as u8),
                ChainPlayer {
                    number: PlayerNumber::new(n),
                    is_alive: true,
                    kills: 0,
                    has_claimed: false,
                },
            )
        })
        .collect();

    env.chain.put_game(
        id,
        MockGame {
            config: ChainGameConfig {
                title: format!("Test Game {id}"),
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
                zone_center: VENUE,
                meeting_point: VENUE,
                registration_deadline: now + 3600,
                game_date: now + 3600,
                max_duration_secs: 14_400,
                min_players,
            },
            state: ChainGameState {
                phase: GamePhase::Registration,
                started_at: None,
                ended_at: None,
                player_count,
                total_collected_wei: U256::ZERO,
                winners: None,
            },
            shrinks: vec![
                ZoneShrink { at_second: 0, radius_meters: 500 },
                ZoneShrink { at_second: 1800, radius_meters: 250 },
            ],
            players,
        },
    );
}

pub fn meta(block: u64, log_index: u64) -> EventMetadata {
    EventMetadata {
        block_number: block,
        log_index,
        tx_hash: B256::repeat_byte(0xEE),
        block_timestamp: chrono::Utc::now().timestamp(),
    }
}
