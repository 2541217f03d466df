//! Heartbeat enforcement: periodic proximity scans prove liveness.
//!
//! Once the hunt begins, every alive player must be scanned (or scan
//! someone) within the heartbeat interval, or they are eliminated for
//! hiding. Near the endgame the mechanic flips from anti-hiding to
//! unwinnable pressure, so timeout eliminations auto-disable once the alive
//! count reaches the threshold - one-way for the rest of the game.

use crate::error::ValidationError;
use crate::geo::{GeoPoint, haversine_meters};
use crate::types::entities::Player;

/// Per-game heartbeat policy and the auto-disable latch.
#[derive(Debug, Clone)]
pub struct HeartbeatEnforcer {
    interval_secs: i64,
    proximity_meters: f64,
    disable_threshold: u32,
    disabled: bool,
}

impl HeartbeatEnforcer {
    /// Create an enforcer with the game's configured policy.
    #[must_use]
    pub const fn new(interval_secs: i64, proximity_meters: f64, disable_threshold: u32) -> Self {
        Self {
            interval_secs,
            proximity_meters,
            disable_threshold,
            disabled: false,
        }
    }

    /// The timeout interval in seconds.
    #[must_use]
    pub const fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    /// Whether timeout-based elimination is suspended.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Observe the current alive count; latches the disable when it reaches
    /// the threshold. Returns `true` when this observation newly disabled
    /// enforcement.
    pub const fn observe_alive_count(&mut self, alive: u32) -> bool {
        if !self.disabled && alive <= self.disable_threshold {
            self.disabled = true;
            return true;
        }
        false
    }

    /// Validate a proximity scan from `scanner` proving `scanned` is
    /// present.
    ///
    /// The QR payload has already been decoded and resolved to `scanned` by
    /// the caller; this checks the physical-presence rules. Returns the
    /// measured distance for the audit row.
    ///
    /// # Errors
    ///
    /// Returns the specific [`ValidationError`] for the first failed check.
    pub fn validate_scan(
        &self,
        scanner: &Player,
        scanned: &Player,
        scanner_pos: GeoPoint,
        scanned_pos: Option<GeoPoint>,
        ble_required: bool,
        ble_nearby: &[String],
    ) -> Result<f64, ValidationError> {
        if !scanner.is_alive {
            return Err(ValidationError::HunterNotAlive);
        }
        if !scanned.is_alive {
            return Err(ValidationError::TargetNotAlive);
        }
        if scanner.address == scanned.address {
            return Err(ValidationError::InvalidQr);
        }

        let scanned_pos = scanned_pos.ok_or(ValidationError::NoTargetPosition)?;
        let distance = haversine_meters(scanner_pos, scanned_pos);
        if distance > self.proximity_meters {
            return Err(ValidationError::OutOfRange {
                distance_meters: distance,
                max_meters: self.proximity_meters,
            });
        }

        if ble_required {
            let present = scanned
                .bluetooth_id
                .as_deref()
                .is_some_and(|id| ble_nearby.iter().any(|seen| seen.eq_ignore_ascii_case(id)));
            if !present {
                return Err(ValidationError::BlePresenceMissing);
            }
        }

        Ok(distance)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::types::primitives::{GameId, PlayerNumber};

    fn player(byte: u8, alive: bool, bluetooth: Option<&str>) -> Player {
        Player {
            game_id: GameId::new(1),
            address: Address::repeat_byte(byte),
            number: PlayerNumber::new(u32::from(byte)),
            is_alive: alive,
            kills: 0,
            checked_in: true,
            bluetooth_id: bluetooth.map(Into::into),
            last_heartbeat_at: Some(0),
            eliminated_at: None,
            elimination_order: None,
            eliminated_by: None,
            elimination_reason: None,
            has_claimed: false,
        }
    }

    const NEAR: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };
    const NEAR_50M: GeoPoint = GeoPoint { lat: 0.00045, lng: 0.0 };
    const FAR_333M: GeoPoint = GeoPoint { lat: 0.003, lng: 0.0 };

    fn enforcer() -> HeartbeatEnforcer {
        HeartbeatEnforcer::new(600, 100.0, 4)
    }

    #[test]
    fn accepts_a_close_scan_and_reports_distance() {
        let distance = enforcer()
            .validate_scan(
                &player(1, true, None),
                &player(2, true, Some("AA:BB")),
                NEAR,
                Some(NEAR_50M),
                true,
                &["aa:bb".into()],
            )
            .unwrap();
        assert!((40.0..60.0).contains(&distance));
    }

    #[test]
    fn rejects_distance_beyond_proximity() {
        let err = enforcer()
            .validate_scan(
                &player(1, true, None),
                &player(2, true, None),
                NEAR,
                Some(FAR_333M),
                false,
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn rejects_self_scan_and_dead_parties() {
        let e = enforcer();
        assert_eq!(
            e.validate_scan(&player(1, true, None), &player(1, true, None), NEAR, Some(NEAR), false, &[]),
            Err(ValidationError::InvalidQr)
        );
        assert_eq!(
            e.validate_scan(&player(1, false, None), &player(2, true, None), NEAR, Some(NEAR), false, &[]),
            Err(ValidationError::HunterNotAlive)
        );
        assert_eq!(
            e.validate_scan(&player(1, true, None), &player(2, false, None), NEAR, Some(NEAR), false, &[]),
            Err(ValidationError::TargetNotAlive)
        );
    }

    #[test]
    fn rejects_missing_position_and_missing_ble() {
        let e = enforcer();
        assert_eq!(
            e.validate_scan(&player(1, true, None), &player(2, true, None), NEAR, None, false, &[]),
            Err(ValidationError::NoTargetPosition)
        );
        assert_eq!(
            e.validate_scan(
                &player(1, true, None),
                &player(2, true, Some("AA:BB")),
                NEAR,
                Some(NEAR),
                true,
                &["cc:dd".into()],
            ),
            Err(ValidationError::BlePresenceMissing)
        );
    }

    #[test]
    fn auto_disable_latches_at_threshold() {
        let mut e = enforcer();
        assert!(!e.observe_alive_count(5));
        assert!(!e.is_disabled());

        // Strictly ≤: dropping from 5 to 4 disables.
        assert!(e.observe_alive_count(4));
        assert!(e.is_disabled());

        // One-way: already disabled, later observations report nothing new.
        assert!(!e.observe_alive_count(6));
        assert!(e.is_disabled());
    }
}
