//! Raw log → domain event decoding.
//!
//! Matches logs by event signature (topic0) against the contract's event
//! set and decodes them into [`GameEvent`]. Unknown signatures are skipped,
//! not errors - the contract may emit events this server version does not
//! consume.

use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use tracing::debug;

use crate::abi::assassin_game as abi;
use crate::error::{ChainError, Result};
use crate::types::enums::EliminationReason;
use crate::types::events::GameEvent;
use crate::types::primitives::GameId;

fn decode<E: SolEvent>(log: &Log) -> Result<E> {
    E::decode_log(&log.inner)
        .map(|decoded| decoded.data)
        .map_err(|e| ChainError::InvalidData(format!("event decode failed: {e}")).into())
}

fn game_id(raw: alloy::primitives::U256) -> GameId {
    GameId::new(raw.to::<u64>())
}

/// Decode one log into a domain event.
///
/// Returns `Ok(None)` for logs that are not game events.
///
/// # Errors
///
/// Returns [`ChainError::InvalidData`] when a recognized signature carries
/// malformed data.
pub fn decode_log(log: &Log) -> Result<Option<GameEvent>> {
    let Some(topic0) = log.topics().first() else {
        return Ok(None);
    };

    let event = match *topic0 {
        t if t == abi::GameCreated::SIGNATURE_HASH => {
            let e = decode::<abi::GameCreated>(log)?;
            GameEvent::GameCreated {
                game_id: game_id(e.gameId),
                creator: e.creator,
            }
        }
        t if t == abi::PlayerRegistered::SIGNATURE_HASH => {
            let e = decode::<abi::PlayerRegistered>(log)?;
            GameEvent::PlayerRegistered {
                game_id: game_id(e.gameId),
                player: e.player,
                player_number: e.playerNumber,
            }
        }
        t if t == abi::GameStarted::SIGNATURE_HASH => {
            let e = decode::<abi::GameStarted>(log)?;
            #[allow(clippy::cast_possible_wrap)] // timestamps fit i64
            let started_at = e.startedAt as i64;
            GameEvent::GameStarted {
                game_id: game_id(e.gameId),
                started_at,
            }
        }
        t if t == abi::KillRecorded::SIGNATURE_HASH => {
            let e = decode::<abi::KillRecorded>(log)?;
            GameEvent::KillRecorded {
                game_id: game_id(e.gameId),
                hunter: e.hunter,
                target: e.target,
            }
        }
        t if t == abi::PlayerEliminated::SIGNATURE_HASH => {
            let e = decode::<abi::PlayerEliminated>(log)?;
            GameEvent::PlayerEliminated {
                game_id: game_id(e.gameId),
                player: e.player,
                reason: EliminationReason::from_chain_code(e.reason),
            }
        }
        t if t == abi::GameEnded::SIGNATURE_HASH => {
            let e = decode::<abi::GameEnded>(log)?;
            GameEvent::GameEnded {
                game_id: game_id(e.gameId),
                first: e.first,
                second: e.second,
                third: e.third,
                top_killer: e.topKiller,
            }
        }
        t if t == abi::GameCancelled::SIGNATURE_HASH => {
            let e = decode::<abi::GameCancelled>(log)?;
            GameEvent::GameCancelled {
                game_id: game_id(e.gameId),
            }
        }
        _ => {
            debug!(?topic0, "Skipping unrecognized log");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, Log as PrimitiveLog, U256};

    use super::*;

    fn wrap(inner: PrimitiveLog) -> Log {
        Log {
            inner,
            block_hash: Some(B256::repeat_byte(1)),
            block_number: Some(10),
            block_timestamp: Some(1_000),
            transaction_hash: Some(B256::repeat_byte(2)),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        }
    }

    #[test]
    fn decodes_player_registered() {
        let event = abi::PlayerRegistered {
            gameId: U256::from(7),
            player: Address::repeat_byte(0xAB),
            playerNumber: 3,
        };
        let log = wrap(PrimitiveLog {
            address: Address::repeat_byte(0x11),
            data: event.encode_log_data(),
        });

        let decoded = decode_log(&log).unwrap().unwrap();
        assert_eq!(
            decoded,
            GameEvent::PlayerRegistered {
                game_id: GameId::new(7),
                player: Address::repeat_byte(0xAB),
                player_number: 3,
            }
        );
    }

    #[test]
    fn decodes_elimination_reason_codes() {
        let event = abi::PlayerEliminated {
            gameId: U256::from(1),
            player: Address::repeat_byte(0x01),
            reason: 2,
        };
        let log = wrap(PrimitiveLog {
            address: Address::repeat_byte(0x11),
            data: event.encode_log_data(),
        });

        let decoded = decode_log(&log).unwrap().unwrap();
        assert_eq!(
            decoded,
            GameEvent::PlayerEliminated {
                game_id: GameId::new(1),
                player: Address::repeat_byte(0x01),
                reason: Some(EliminationReason::HeartbeatTimeout),
            }
        );
    }

    #[test]
    fn unknown_topic_is_skipped() {
        let log = wrap(PrimitiveLog {
            address: Address::repeat_byte(0x11),
            data: alloy::primitives::LogData::new_unchecked(
                vec![B256::repeat_byte(0xFF)],
                alloy::primitives::Bytes::new(),
            ),
        });
        assert_eq!(decode_log(&log).unwrap(), None);
    }

    #[test]
    fn topicless_log_is_skipped() {
        let log = wrap(PrimitiveLog {
            address: Address::repeat_byte(0x11),
            data: alloy::primitives::LogData::new_unchecked(
                vec![],
                alloy::primitives::Bytes::new(),
            ),
        });
        assert_eq!(decode_log(&log).unwrap(), None);
    }
}
