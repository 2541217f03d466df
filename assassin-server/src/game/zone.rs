//! Shrinking play zone enforcement.
//!
//! The schedule is fixed at game creation: strictly increasing offsets from
//! `started_at`, non-increasing radii, first entry at second 0. Each tick
//! the tracker advances through due shrinks and sweeps alive players'
//! latest positions, running the out-of-zone grace countdown per player.
//!
//! A player with no (fresh) ping is unknown to the zone - hiding is the
//! heartbeat enforcer's problem, not ours.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::geo::{GeoPoint, haversine_meters};
use crate::types::entities::ZoneShrink;
use crate::types::primitives::UnixSeconds;

/// Repeat interval for out-of-zone warnings after the initial one.
const WARN_REPEAT_SECONDS: i64 = 10;

/// What one tick of the zone produced.
#[derive(Debug, Default, PartialEq)]
pub struct ZoneEvents {
    /// Radii that became active this tick, in order.
    pub shrinks: Vec<u32>,
    /// `(player, seconds_remaining)` warnings to deliver.
    pub warnings: Vec<(Address, i64)>,
    /// Players back inside after a warning was sent.
    pub returned: Vec<Address>,
    /// Players whose grace ran out.
    pub eliminations: Vec<Address>,
}

/// Per-game zone state.
#[derive(Debug, Clone)]
pub struct ZoneTracker {
    schedule: Vec<ZoneShrink>,
    /// Index of the next schedule entry not yet applied.
    next_index: usize,
    grace_seconds: i64,
    out_since: HashMap<Address, UnixSeconds>,
    last_warned: HashMap<Address, UnixSeconds>,
}

impl ZoneTracker {
    /// Create a tracker over a schedule (sorted by `at_second`, first entry
    /// at 0).
    #[must_use]
    pub fn new(schedule: Vec<ZoneShrink>, grace_seconds: i64) -> Self {
        Self {
            schedule,
            next_index: 0,
            grace_seconds,
            out_since: HashMap::new(),
            last_warned: HashMap::new(),
        }
    }

    /// Advance the shrink index to `elapsed` without emitting events.
    ///
    /// Used by startup recovery to rejoin a running game.
    pub fn resume(&mut self, elapsed: i64) {
        while self
            .schedule
            .get(self.next_index)
            .is_some_and(|s| s.at_second <= elapsed)
        {
            self.next_index += 1;
        }
    }

    /// The radius currently in force, if the schedule has begun.
    #[must_use]
    pub fn current_radius(&self) -> Option<u32> {
        self.next_index
            .checked_sub(1)
            .and_then(|i| self.schedule.get(i))
            .map(|s| s.radius_meters)
    }

    /// The next scheduled shrink, if any remain.
    #[must_use]
    pub fn next_shrink(&self) -> Option<ZoneShrink> {
        self.schedule.get(self.next_index).copied()
    }

    /// Forget a player (eliminated or otherwise gone).
    pub fn clear_player(&mut self, player: Address) {
        self.out_since.remove(&player);
        self.last_warned.remove(&player);
    }

    /// Run one 1 Hz sweep.
    ///
    /// `positions` holds the latest fresh ping per alive player; players
    /// absent from it are left untouched.
    pub fn tick(
        &mut self,
        now: UnixSeconds,
        elapsed: i64,
        center: GeoPoint,
        positions: &[(Address, GeoPoint)],
    ) -> ZoneEvents {
        let mut events = ZoneEvents::default();

        while self
            .schedule
            .get(self.next_index)
            .is_some_and(|s| s.at_second <= elapsed)
        {
            events.shrinks.push(self.schedule[self.next_index].radius_meters);
            self.next_index += 1;
        }

        let Some(radius) = self.current_radius() else {
            return events;
        };
        let radius_m = f64::from(radius);

        for &(player, position) in positions {
            // Exactly on the boundary counts as inside.
            let in_zone = haversine_meters(position, center) <= radius_m;

            if in_zone {
                if self.out_since.remove(&player).is_some()
                    && self.last_warned.remove(&player).is_some()
                {
                    events.returned.push(player);
                }
                continue;
            }

            match self.out_since.get(&player).copied() {
                None => {
                    self.out_since.insert(player, now);
                    self.last_warned.insert(player, now);
                    events.warnings.push((player, self.grace_seconds));
                }
                Some(since) if now - since >= self.grace_seconds => {
                    self.clear_player(player);
                    events.eliminations.push(player);
                }
                Some(since) => {
                    let warned = self.last_warned.get(&player).copied().unwrap_or(since);
                    if now - warned >= WARN_REPEAT_SECONDS {
                        self.last_warned.insert(player, now);
                        events
                            .warnings
                            .push((player, self.grace_seconds - (now - since)));
                    }
                }
            }
        }

        events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
