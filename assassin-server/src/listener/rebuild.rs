//! Destructive rebuild of the store from on-chain history.
//!
//! Wipes every game-scoped table, then re-derives games, shrink schedules,
//! and players by iterating game ids from `start_game_id` through
//! `nextGameId − 1` with direct contract reads. Server-only state (check-in
//! flags, location pings, heartbeat deadlines, sub-phases) cannot be
//! recovered from the chain; ACTIVE games conservatively re-enter check-in.
//!
//! Rebuilding is idempotent: two consecutive rebuilds produce identical
//! rows.

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::ports::chain::GameChain;
use crate::ports::store::Store;
use crate::types::entities::{Game, Player};
use crate::types::enums::{GamePhase, SubPhase};
use crate::types::primitives::{GameId, PlayerNumber};

/// Rebuild the store from chain reads. Returns the number of games loaded.
///
/// # Errors
///
/// Returns chain or store errors; the store is left wiped but partially
/// loaded in that case, and a rerun completes the job.
#[instrument(skip(store, chain))]
pub async fn rebuild_from_chain(
    store: &dyn Store,
    chain: &dyn GameChain,
    start_game_id: u64,
) -> Result<u64> {
    warn!("Rebuilding store from chain; server-side-only state will be lost");
    store.reset_game_data().await?;

    let next = chain.next_game_id().await?;
    let mut loaded = 0;

    for raw_id in start_game_id..next {
        let game_id = GameId::new(raw_id);
        let config = chain.game_config(game_id).await?;
        let state = chain.game_state(game_id).await?;
        let shrinks = chain.zone_shrinks(game_id).await?;

        let sub_phase = (state.phase == GamePhase::Active).then_some(SubPhase::Checkin);
        store
            .insert_game(&Game {
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
                phase: state.phase,
                sub_phase,
                sub_phase_started_at: sub_phase.and(state.started_at),
                started_at: state.started_at,
                ended_at: state.ended_at,
                player_count: state.player_count,
                total_collected_wei: state.total_collected_wei,
                winners: state.winners,
            })
            .await?;
        store.insert_zone_shrinks(game_id, &shrinks).await?;

        for number in 1..=state.player_count {
            let Some((address, record)) = chain
                .player_by_number(game_id, PlayerNumber::new(number))
                .await?
            else {
                warn!(%game_id, number, "Player enumeration hit a gap");
                continue;
            };
            store
                .insert_player(&Player {
                    game_id,
                    address,
                    number: record.number,
                    is_alive: record.is_alive,
                    kills: record.kills,
                    checked_in: false,
                    bluetooth_id: None,
                    last_heartbeat_at: None,
                    eliminated_at: None,
                    elimination_order: None,
                    eliminated_by: None,
                    elimination_reason: None,
                    has_claimed: record.has_claimed,
                })
                .await?;
        }

        loaded += 1;
    }

    info!(games = loaded, "Rebuild from chain complete");
    Ok(loaded)
}
