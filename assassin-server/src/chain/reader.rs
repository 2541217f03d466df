//! Typed contract reads over RPC.
//!
//! Implements the [`GameChain`] port with idempotent views of on-chain
//! truth, decoding fixed-point coordinates and phase discriminants into
//! domain form at the boundary.

use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::BlockNumberOrTag;
use async_trait::async_trait;
use tracing::{debug, instrument};

use evm_operator::ProviderError;

use crate::abi::assassin_game::IAssassinGame;
use crate::error::{ChainError, Result};
use crate::geo::GeoPoint;
use crate::ports::chain::{ChainGameConfig, ChainGameState, ChainPlayer, GameChain};
use crate::types::entities::{PrizeSplit, Winners, ZoneShrink};
use crate::types::enums::GamePhase;
use crate::types::primitives::{GameId, PlayerNumber, UnixSeconds};

type Instance = IAssassinGame::IAssassinGameInstance<DynProvider>;

/// RPC-backed implementation of the [`GameChain`] port.
#[derive(Debug, Clone)]
pub struct ChainReader {
    provider: DynProvider,
    instance: Instance,
}

impl ChainReader {
    /// Bind the contract at `address` to the given provider.
    #[must_use]
    pub fn new(provider: DynProvider, address: Address) -> Self {
        let instance = IAssassinGame::new(address, provider.clone());
        Self { provider, instance }
    }

    /// The bound contract address.
    #[must_use]
    pub fn address(&self) -> Address {
        *self.instance.address()
    }

    fn point(lat_e6: i64, lng_e6: i64) -> Result<GeoPoint> {
        GeoPoint::from_fixed(lat_e6, lng_e6)
            .map_err(|e| ChainError::InvalidData(e.to_string()).into())
    }

    fn non_zero(addr: Address) -> Option<Address> {
        (addr != Address::ZERO).then_some(addr)
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<UnixSeconds>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;
        #[allow(clippy::cast_possible_wrap)] // block timestamps fit i64
        let ts = block.map(|b| b.header.timestamp as i64);
        Ok(ts)
    }
}

#[async_trait]
impl GameChain for ChainReader {
    #[instrument(skip(self))]
    async fn next_game_id(&self) -> Result<u64> {
        let next = self
            .instance
            .nextGameId()
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;
        Ok(next.to::<u64>())
    }

    #[instrument(skip(self))]
    async fn game_config(&self, game_id: GameId) -> Result<ChainGameConfig> {
        let cfg = self
            .instance
            .getGameConfig(alloy::primitives::U256::from(game_id.value()))
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        #[allow(clippy::cast_possible_wrap)] // deadlines fit i64
        let config = ChainGameConfig {
            title: cfg.title,
            creator: cfg.creator,
            entry_fee_wei: cfg.entryFee,
            base_reward_wei: cfg.baseReward,
            split: PrizeSplit {
                first_bps: cfg.bpsFirst,
                second_bps: cfg.bpsSecond,
                third_bps: cfg.bpsThird,
                kills_bps: cfg.bpsKills,
                creator_bps: cfg.bpsCreator,
            },
            zone_center: Self::point(cfg.zoneCenterLat, cfg.zoneCenterLng)?,
            meeting_point: Self::point(cfg.meetingPointLat, cfg.meetingPointLng)?,
            registration_deadline: cfg.registrationDeadline as i64,
            game_date: cfg.gameDate as i64,
            max_duration_secs: cfg.maxDuration as i64,
            min_players: cfg.minPlayers,
        };
        Ok(config)
    }

    #[instrument(skip(self))]
    async fn game_state(&self, game_id: GameId) -> Result<ChainGameState> {
        let state = self
            .instance
            .getGameState(alloy::primitives::U256::from(game_id.value()))
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        let phase = GamePhase::try_from(state.phase)
            .map_err(|e| ChainError::InvalidData(e.to_string()))?;

        let winners = (phase == GamePhase::Ended && state.winnerFirst != Address::ZERO).then(|| {
            Winners {
                first: state.winnerFirst,
                second: Self::non_zero(state.winnerSecond),
                third: Self::non_zero(state.winnerThird),
                top_killer: state.topKiller,
            }
        });

        #[allow(clippy::cast_possible_wrap)] // timestamps fit i64
        let state = ChainGameState {
            phase,
            started_at: (state.startedAt > 0).then_some(state.startedAt as i64),
            ended_at: (state.endedAt > 0).then_some(state.endedAt as i64),
            player_count: state.playerCount,
            total_collected_wei: state.totalCollected,
            winners,
        };
        Ok(state)
    }

    #[instrument(skip(self))]
    async fn zone_shrinks(&self, game_id: GameId) -> Result<Vec<ZoneShrink>> {
        let entries = self
            .instance
            .getZoneShrinks(alloy::primitives::U256::from(game_id.value()))
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        #[allow(clippy::cast_possible_wrap)] // schedule offsets fit i64
        let schedule = entries
            .into_iter()
            .map(|e| ZoneShrink {
                at_second: e.atSecond as i64,
                radius_meters: e.radiusMeters,
            })
            .collect();
        Ok(schedule)
    }

    #[instrument(skip(self))]
    async fn player(&self, game_id: GameId, address: Address) -> Result<Option<ChainPlayer>> {
        let record = self
            .instance
            .getPlayer(alloy::primitives::U256::from(game_id.value()), address)
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        // Player numbers are 1-based; zero means never registered.
        if record.playerNumber == 0 {
            return Ok(None);
        }

        Ok(Some(ChainPlayer {
            number: PlayerNumber::new(record.playerNumber),
            is_alive: record.isAlive,
            kills: record.kills,
            has_claimed: record.hasClaimed,
        }))
    }

    #[instrument(skip(self))]
    async fn player_by_number(
        &self,
        game_id: GameId,
        number: PlayerNumber,
    ) -> Result<Option<(Address, ChainPlayer)>> {
        let ret = self
            .instance
            .getPlayerByNumber(alloy::primitives::U256::from(game_id.value()), number.value())
            .call()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;
        let (address, record) = (ret._0, ret._1);

        if address == Address::ZERO || record.playerNumber == 0 {
            return Ok(None);
        }
        Ok(Some((
            address,
            ChainPlayer {
                number: PlayerNumber::new(record.playerNumber),
                is_alive: record.isAlive,
                kills: record.kills,
                has_claimed: record.hasClaimed,
            },
        )))
    }

    /// Binary search for the first block at or after `at_or_after`.
    ///
    /// Block timestamps are non-decreasing, so the search is sound. Costs
    /// O(log head) block-header reads, paid once per game start.
    #[instrument(skip(self))]
    async fn seed_block_hash(&self, at_or_after: UnixSeconds) -> Result<Option<B256>> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        let Some(head_ts) = self.block_timestamp(head).await? else {
            return Ok(None);
        };
        if head_ts < at_or_after {
            return Ok(None);
        }

        let (mut lo, mut hi) = (0_u64, head);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.block_timestamp(mid).await? {
                Some(ts) if ts >= at_or_after => hi = mid,
                Some(_) => lo = mid + 1,
                // A gap here means the node pruned the block; fall back to
                // treating it as too old.
                None => lo = mid + 1,
            }
        }

        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(lo))
            .await
            .map_err(|e| ChainError::from(ProviderError::from(e)))?;

        let hash = block.map(|b| b.header.hash);
        debug!(block = lo, found = hash.is_some(), "Resolved seed block");
        Ok(hash)
    }
}
