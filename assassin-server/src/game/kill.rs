//! Kill verification pipeline.
//!
//! A kill submission carries three independent proximity signals: the
//! target's QR payload (physical line of sight to the screen), GPS
//! positions, and optionally the BLE neighborhood. Verification
//! short-circuits on the first failed check with a specific error code, so
//! the client can tell the hunter exactly what was wrong.
//!
//! The pipeline is pure over pre-fetched state; the game actor gathers the
//! rows and holds the per-game ordering while the verdict and commit happen.

use alloy::primitives::Address;

use crate::error::ValidationError;
use crate::geo::{GeoPoint, haversine_meters};
use crate::proof::qr;
use crate::types::entities::{Game, LocationPing, Player};
use crate::types::enums::SubPhase;
use crate::types::primitives::PlayerNumber;

/// A kill submission as received from the transport.
#[derive(Debug, Clone)]
pub struct KillRequest {
    /// The scanning hunter.
    pub hunter: Address,
    /// The target's QR payload.
    pub qr_payload: String,
    /// Hunter's submitted latitude.
    pub lat: f64,
    /// Hunter's submitted longitude.
    pub lng: f64,
    /// Bluetooth identifiers the hunter's device currently sees.
    pub ble_nearby: Vec<String>,
    /// Content hash of the kill-proof photo, when the client took one.
    pub photo_hash: Option<String>,
}

/// Pre-fetched state the pipeline verifies against.
#[derive(Debug)]
pub struct KillContext<'a> {
    /// The game being played.
    pub game: &'a Game,
    /// The submitting hunter's row, if registered.
    pub hunter: Option<&'a Player>,
    /// The player the QR resolves to, if any.
    pub target: Option<&'a Player>,
    /// The target's latest location ping.
    pub target_ping: Option<&'a LocationPing>,
    /// The hunter's current assignment.
    pub assigned_target: Option<Address>,
    /// Maximum kill distance in meters.
    pub kill_proximity_meters: f64,
    /// Whether BLE presence is required.
    pub ble_required: bool,
}

/// A submission that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedKill {
    /// The eliminated target.
    pub target: Address,
    /// The target's number, for messages.
    pub target_number: PlayerNumber,
    /// Hunter's validated position.
    pub hunter_pos: GeoPoint,
    /// Target position used for the distance check.
    pub target_pos: GeoPoint,
    /// Verified distance in meters.
    pub distance_meters: f64,
}

/// Run the verification pipeline.
///
/// Checks in order: game active, hunter alive, QR decodes for this game,
/// target exists and is alive, target is the hunter's assignment, distance
/// within bounds against the target's last known ping, BLE presence when
/// required.
///
/// # Errors
///
/// Returns the specific [`ValidationError`] of the first failed step.
pub fn verify(request: &KillRequest, ctx: &KillContext<'_>) -> Result<VerifiedKill, ValidationError> {
    if !ctx.game.in_sub_phase(SubPhase::Game) {
        return Err(ValidationError::GameNotActive);
    }

    let hunter = ctx.hunter.ok_or(ValidationError::HunterNotAlive)?;
    if !hunter.is_alive {
        return Err(ValidationError::HunterNotAlive);
    }

    let payload = qr::decode_qr(&request.qr_payload).map_err(|_| ValidationError::InvalidQr)?;
    if payload.game_id != ctx.game.id
        || payload.player_number.value() > ctx.game.player_count
    {
        return Err(ValidationError::InvalidQr);
    }

    let target = ctx.target.ok_or(ValidationError::TargetNotFound)?;
    if !target.is_alive {
        return Err(ValidationError::TargetNotAlive);
    }

    if ctx.assigned_target != Some(target.address) {
        return Err(ValidationError::NotYourTarget);
    }

    let hunter_pos = GeoPoint::new(request.lat, request.lng)?;
    let target_pos = ctx
        .target_ping
        .map(|ping| ping.point)
        .ok_or(ValidationError::NoTargetPosition)?;

    let distance = haversine_meters(hunter_pos, target_pos);
    if distance > ctx.kill_proximity_meters {
        return Err(ValidationError::OutOfRange {
            distance_meters: distance,
            max_meters: ctx.kill_proximity_meters,
        });
    }

    if ctx.ble_required {
        let present = target
            .bluetooth_id
            .as_deref()
            .is_some_and(|id| {
                request
                    .ble_nearby
                    .iter()
                    .any(|seen| seen.eq_ignore_ascii_case(id))
            });
        if !present {
            return Err(ValidationError::BlePresenceMissing);
        }
    }

    Ok(VerifiedKill {
        target: target.address,
        target_number: target.number,
        hunter_pos,
        target_pos,
        distance_meters: distance,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;

    use super::*;
    use crate::proof::qr::encode_qr;
    use crate::types::entities::PrizeSplit;
    use crate::types::enums::GamePhase;
    use crate::types::primitives::GameId;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn game() -> Game {
        Game {
            id: GameId::new(1),
            title: "t".into(),
            creator: addr(0xC0),
            entry_fee_wei: U256::ZERO,
            base_reward_wei: U256::ZERO,
            split: PrizeSplit {
                first_bps: 10_000,
                second_bps: 0,
                third_bps: 0,
                kills_bps: 0,
                creator_bps: 0,
            },
            zone_center: GeoPoint { lat: 0.0, lng: 0.0 },
            meeting_point: GeoPoint { lat: 0.0, lng: 0.0 },
            registration_deadline: 0,
            game_date: 0,
            max_duration_secs: 3600,
            min_players: 3,
            phase: GamePhase::Active,
            sub_phase: Some(SubPhase::Game),
            sub_phase_started_at: Some(100),
            started_at: Some(0),
            ended_at: None,
            player_count: 4,
            total_collected_wei: U256::ZERO,
            winners: None,
        }
    }

    fn player(byte: u8, number: u32, alive: bool) -> Player {
        Player {
            game_id: GameId::new(1),
            address: addr(byte),
            number: PlayerNumber::new(number),
            is_alive: alive,
            kills: 0,
            checked_in: true,
            bluetooth_id: Some(format!("BT:{number:02}")),
            last_heartbeat_at: Some(0),
            eliminated_at: None,
            elimination_order: None,
            eliminated_by: None,
            elimination_reason: None,
            has_claimed: false,
        }
    }

    fn ping_at(byte: u8, lat: f64) -> LocationPing {
        LocationPing {
            game_id: GameId::new(1),
            address: addr(byte),
            point: GeoPoint { lat, lng: 0.0 },
            timestamp: 200,
            is_in_zone: true,
        }
    }

    fn request(qr: &str) -> KillRequest {
        KillRequest {
            hunter: addr(1),
            qr_payload: qr.into(),
            lat: 0.0,
            lng: 0.0,
            ble_nearby: vec!["bt:02".into()],
            photo_hash: None,
        }
    }

    #[test]
    fn valid_kill_passes_with_distance() {
        let game = game();
        let hunter = player(1, 1, true);
        let target = player(2, 2, true);
        let ping = ping_at(2, 0.00045); // ~50 m away
        let qr = encode_qr(GameId::new(1), PlayerNumber::new(2)).unwrap();

        let verified = verify(
            &request(&qr),
            &KillContext {
                game: &game,
                hunter: Some(&hunter),
                target: Some(&target),
                target_ping: Some(&ping),
                assigned_target: Some(addr(2)),
                kill_proximity_meters: 100.0,
                ble_required: true,
            },
        )
        .unwrap();

        assert_eq!(verified.target, addr(2));
        assert_eq!(verified.target_number, PlayerNumber::new(2));
        assert!((40.0..60.0).contains(&verified.distance_meters));
    }

    #[test]
    fn pipeline_short_circuits_in_order() {
        let mut inactive = game();
        inactive.sub_phase = Some(SubPhase::Pregame);
        let hunter = player(1, 1, true);
        let dead_hunter = player(1, 1, false);
        let target = player(2, 2, true);
        let ping = ping_at(2, 0.0);
        let qr = encode_qr(GameId::new(1), PlayerNumber::new(2)).unwrap();

        let base = |game, hunter, target, ping, assigned| KillContext {
            game,
            hunter,
            target,
            target_ping: ping,
            assigned_target: assigned,
            kill_proximity_meters: 100.0,
            ble_required: false,
        };

        // 1. Wrong sub-phase wins over everything.
        assert_eq!(
            verify(&request(&qr), &base(&inactive, None, None, None, None)),
            Err(ValidationError::GameNotActive)
        );

        let game = game();
        // 2. Dead hunter.
        assert_eq!(
            verify(&request(&qr), &base(&game, Some(&dead_hunter), Some(&target), Some(&ping), Some(addr(2)))),
            Err(ValidationError::HunterNotAlive)
        );

        // 3. Garbage QR.
        assert_eq!(
            verify(&request("junk"), &base(&game, Some(&hunter), Some(&target), Some(&ping), Some(addr(2)))),
            Err(ValidationError::InvalidQr)
        );

        // 3b. QR for another game.
        let foreign = encode_qr(GameId::new(9), PlayerNumber::new(2)).unwrap();
        assert_eq!(
            verify(&request(&foreign), &base(&game, Some(&hunter), Some(&target), Some(&ping), Some(addr(2)))),
            Err(ValidationError::InvalidQr)
        );

        // 3c. QR with a number beyond the registered count.
        let overflow = encode_qr(GameId::new(1), PlayerNumber::new(9)).unwrap();
        assert_eq!(
            verify(&request(&overflow), &base(&game, Some(&hunter), None, None, Some(addr(2)))),
            Err(ValidationError::InvalidQr)
        );

        // 4. Unknown target.
        assert_eq!(
            verify(&request(&qr), &base(&game, Some(&hunter), None, Some(&ping), Some(addr(2)))),
            Err(ValidationError::TargetNotFound)
        );

        // 4b. Dead target.
        let dead_target = player(2, 2, false);
        assert_eq!(
            verify(&request(&qr), &base(&game, Some(&hunter), Some(&dead_target), Some(&ping), Some(addr(2)))),
            Err(ValidationError::TargetNotAlive)
        );
    }

    #[test]
    fn kill_on_non_assigned_target_is_rejected() {
        let game = game();
        let hunter = player(1, 1, true);
        let target = player(3, 3, true);
        let ping = ping_at(3, 0.0);
        // Hunter's assignment is #2, QR belongs to #3 standing right there.
        let qr = encode_qr(GameId::new(1), PlayerNumber::new(3)).unwrap();

        let result = verify(
            &request(&qr),
            &KillContext {
                game: &game,
                hunter: Some(&hunter),
                target: Some(&target),
                target_ping: Some(&ping),
                assigned_target: Some(addr(2)),
                kill_proximity_meters: 100.0,
                ble_required: false,
            },
        );
        assert_eq!(result, Err(ValidationError::NotYourTarget));
    }

    #[test]
    fn distance_and_position_failures() {
        let game = game();
        let hunter = player(1, 1, true);
        let target = player(2, 2, true);
        let far = ping_at(2, 0.003); // ~333 m
        let qr = encode_qr(GameId::new(1), PlayerNumber::new(2)).unwrap();

        let ctx = |ping| KillContext {
            game: &game,
            hunter: Some(&hunter),
            target: Some(&target),
            target_ping: ping,
            assigned_target: Some(addr(2)),
            kill_proximity_meters: 100.0,
            ble_required: false,
        };

        assert!(matches!(
            verify(&request(&qr), &ctx(Some(&far))),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(
            verify(&request(&qr), &ctx(None)),
            Err(ValidationError::NoTargetPosition)
        );
    }

    #[test]
    fn ble_presence_is_enforced_when_required() {
        let game = game();
        let hunter = player(1, 1, true);
        let target = player(2, 2, true);
        let ping = ping_at(2, 0.0);
        let qr = encode_qr(GameId::new(1), PlayerNumber::new(2)).unwrap();

        let mut req = request(&qr);
        req.ble_nearby = vec!["bt:07".into()];

        let result = verify(
            &req,
            &KillContext {
                game: &game,
                hunter: Some(&hunter),
                target: Some(&target),
                target_ping: Some(&ping),
                assigned_target: Some(addr(2)),
                kill_proximity_meters: 100.0,
                ble_required: true,
            },
        );
        assert_eq!(result, Err(ValidationError::BlePresenceMissing));
    }
}
