//! In-venue check-in policy.
//!
//! Check-in proves physical presence at the meeting area without a
//! moderator. The first few players (a seed-slot quota) may check in on GPS
//! alone; everyone after that must scan the QR of an already-checked-in
//! player and stand within kill proximity of them - presence spreads
//! virally from the seed slots.

use crate::error::ValidationError;
use crate::geo::{GeoPoint, haversine_meters};
use crate::types::entities::{LocationPing, Player, PrizeSplit};

/// How a check-in was justified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinProof {
    /// Within the seed-slot quota; GPS alone suffices.
    SeedSlot,
    /// Vouched by proximity to an already-checked-in player.
    Vouched,
}

/// Seed slots for a game: `max(1, ceil(player_count × 5%))`.
#[must_use]
pub const fn seed_slot_quota(player_count: u32) -> u32 {
    let ceil_5pct = player_count.div_ceil(20);
    if ceil_5pct > 1 { ceil_5pct } else { 1 }
}

/// Check-ins required before pregame can begin.
///
/// Derived from the escrow split: the number of non-zero placement prizes,
/// plus one for the kills prize when it exists and the count is still below
/// four, clamped to at least `min_players`.
#[must_use]
pub const fn min_required_for_prizes(split: &PrizeSplit, min_players: u32) -> u32 {
    let mut required = split.placement_count();
    if split.kills_bps > 0 && required < 4 {
        required += 1;
    }
    if required < min_players { min_players } else { required }
}

/// Validate a check-in attempt.
///
/// `voucher` is the already-checked-in player whose QR was presented (with
/// their latest ping), resolved by the caller; `None` when no QR was
/// submitted or it did not resolve.
///
/// # Errors
///
/// Returns [`ValidationError::NotCheckedIn`] when neither the seed quota
/// nor a valid voucher admits the player, and [`ValidationError::OutOfRange`]
/// when the voucher is too far away.
pub fn verify_checkin(
    position: GeoPoint,
    checked_in_count: u32,
    quota: u32,
    voucher: Option<(&Player, &LocationPing)>,
    kill_proximity_meters: f64,
) -> Result<CheckinProof, ValidationError> {
    if checked_in_count < quota {
        return Ok(CheckinProof::SeedSlot);
    }

    let (voucher, ping) = voucher.ok_or(ValidationError::NotCheckedIn)?;
    if !voucher.checked_in {
        return Err(ValidationError::NotCheckedIn);
    }

    let distance = haversine_meters(position, ping.point);
    if distance > kill_proximity_meters {
        return Err(ValidationError::OutOfRange {
            distance_meters: distance,
            max_meters: kill_proximity_meters,
        });
    }

    Ok(CheckinProof::Vouched)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
