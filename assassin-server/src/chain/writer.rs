//! Operator transaction construction and submission.
//!
//! Builds the contract call for each [`OperatorCall`], stamps the explicit
//! nonce the queue reserved, and sends it through the operator provider. The
//! queue owns retry policy; this module only classifies what happened.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::DynProvider;
use tracing::{debug, instrument};

use evm_operator::{OperatorProvider, ProviderError};

use crate::abi::assassin_game::{GameConfig, IAssassinGame, ZoneShrinkEntry};
use crate::chain::OperatorCall;
use crate::types::entities::NewGame;
use crate::types::enums::GamePhase;
use crate::types::primitives::GameId;

type Instance = IAssassinGame::IAssassinGameInstance<DynProvider>;

/// Write-side access to the game contract as the operator.
#[derive(Debug, Clone)]
pub struct ChainWriter {
    provider: OperatorProvider,
    instance: Instance,
}

impl ChainWriter {
    /// Bind the contract at `address` to the operator provider.
    #[must_use]
    pub fn new(provider: OperatorProvider, address: Address) -> Self {
        let instance = IAssassinGame::new(address, provider.inner().clone());
        Self { provider, instance }
    }

    /// The operator provider backing this writer.
    #[must_use]
    pub const fn provider(&self) -> &OperatorProvider {
        &self.provider
    }

    fn game_config_input(params: &NewGame) -> (GameConfig, Vec<ZoneShrinkEntry>) {
        let (zc_lat, zc_lng) = params.zone_center.to_fixed();
        let (mp_lat, mp_lng) = params.meeting_point.to_fixed();

        #[allow(clippy::cast_sign_loss)] // validated non-negative by config
        let config = GameConfig {
            title: params.title.clone(),
            creator: Address::ZERO, // assigned by the contract from msg.sender
            entryFee: params.entry_fee_wei,
            baseReward: params.base_reward_wei,
            bpsFirst: params.split.first_bps,
            bpsSecond: params.split.second_bps,
            bpsThird: params.split.third_bps,
            bpsKills: params.split.kills_bps,
            bpsCreator: params.split.creator_bps,
            zoneCenterLat: zc_lat,
            zoneCenterLng: zc_lng,
            meetingPointLat: mp_lat,
            meetingPointLng: mp_lng,
            registrationDeadline: params.registration_deadline as u64,
            gameDate: params.game_date as u64,
            maxDuration: params.max_duration_secs as u64,
            minPlayers: params.min_players,
        };

        #[allow(clippy::cast_sign_loss)] // schedule offsets validated non-negative
        let shrinks = params
            .zone_shrinks
            .iter()
            .map(|s| ZoneShrinkEntry {
                atSecond: s.at_second as u64,
                radiusMeters: s.radius_meters,
            })
            .collect();

        (config, shrinks)
    }

    /// Submit one operator call with an explicit nonce.
    ///
    /// Returns the transaction hash; confirmation is the queue's business.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ProviderError`] - nonce race, revert, or
    /// transport failure.
    #[instrument(skip(self, call), fields(action = call.action(), nonce))]
    pub async fn submit(&self, call: &OperatorCall, nonce: u64) -> Result<TxHash, ProviderError> {
        let from = self.provider.operator();

        // Each call builder is a distinct generated type, so every arm runs
        // its own send.
        let pending = match call {
            OperatorCall::CreateGame { params } => {
                let (config, shrinks) = Self::game_config_input(params);
                self.instance
                    .createGame(config, shrinks)
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::StartGame { game_id } => {
                self.instance
                    .startGame(U256::from(game_id.value()))
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::RecordKill {
                game_id,
                hunter,
                target,
            } => {
                self.instance
                    .recordKill(U256::from(game_id.value()), *hunter, *target)
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::EliminatePlayer {
                game_id,
                player,
                reason,
            } => {
                self.instance
                    .eliminatePlayer(U256::from(game_id.value()), *player, reason.chain_code())
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::EndGame {
                game_id,
                first,
                second,
                third,
                top_killer,
            } => {
                self.instance
                    .endGame(
                        U256::from(game_id.value()),
                        *first,
                        second.unwrap_or(Address::ZERO),
                        third.unwrap_or(Address::ZERO),
                        *top_killer,
                    )
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::TriggerCancellation { game_id } => {
                self.instance
                    .triggerCancellation(U256::from(game_id.value()))
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::TriggerExpiry { game_id } => {
                self.instance
                    .triggerExpiry(U256::from(game_id.value()))
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::WithdrawCreatorFees { game_id } => {
                self.instance
                    .withdrawCreatorFees(U256::from(game_id.value()))
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
            OperatorCall::WithdrawPlatformFees => {
                self.instance
                    .withdrawPlatformFees()
                    .from(from)
                    .nonce(nonce)
                    .send()
                    .await
            }
        }
        .map_err(ProviderError::from)?;

        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, "Submitted operator transaction");
        Ok(tx_hash)
    }

    /// Check whether the intended state change of a pending entry has
    /// already landed on-chain.
    ///
    /// Used by startup reconciliation before any resubmission. Conservative:
    /// calls whose effect cannot be inferred report `false` and are
    /// resubmitted (the contract rejects true duplicates).
    ///
    /// # Errors
    ///
    /// Returns a provider error when the chain reads fail.
    #[instrument(skip(self, call), fields(action = call.action()))]
    pub async fn is_applied(&self, call: &OperatorCall) -> Result<bool, ProviderError> {
        match call {
            OperatorCall::StartGame { game_id } => {
                let phase = self.phase_of(*game_id).await?;
                Ok(phase != GamePhase::Registration)
            }
            OperatorCall::RecordKill {
                game_id, target, ..
            } => self.is_eliminated(*game_id, *target).await,
            OperatorCall::EliminatePlayer {
                game_id, player, ..
            } => self.is_eliminated(*game_id, *player).await,
            OperatorCall::EndGame { game_id, .. } => {
                Ok(self.phase_of(*game_id).await? == GamePhase::Ended)
            }
            OperatorCall::TriggerCancellation { game_id }
            | OperatorCall::TriggerExpiry { game_id } => {
                Ok(self.phase_of(*game_id).await? == GamePhase::Cancelled)
            }
            OperatorCall::CreateGame { .. }
            | OperatorCall::WithdrawCreatorFees { .. }
            | OperatorCall::WithdrawPlatformFees => Ok(false),
        }
    }

    async fn phase_of(&self, game_id: GameId) -> Result<GamePhase, ProviderError> {
        let state = self
            .instance
            .getGameState(U256::from(game_id.value()))
            .call()
            .await
            .map_err(ProviderError::from)?;
        GamePhase::try_from(state.phase)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn is_eliminated(
        &self,
        game_id: GameId,
        player: Address,
    ) -> Result<bool, ProviderError> {
        let record = self
            .instance
            .getPlayer(U256::from(game_id.value()), player)
            .call()
            .await
            .map_err(ProviderError::from)?;
        Ok(record.playerNumber != 0 && !record.isAlive)
    }
}
