//! Settings structs and loading logic.
//!
//! All settings have defaults matching the production deployment and can be
//! overridden via a TOML file or `ASSASSIN_`-prefixed environment
//! variables. Secrets (the operator key) normally arrive via environment.

use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Ethereum RPC endpoints.
    pub rpc: RpcSettings,
    /// Game contract binding.
    pub contract: ContractSettings,
    /// Operator identity.
    pub operator: OperatorSettings,
    /// Store location.
    pub db: DbSettings,
    /// Gameplay policy knobs.
    pub game: GameSettings,
    /// Startup sync behavior.
    pub sync: SyncSettings,
    /// Event-listener liveness policy.
    pub listener: ListenerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Ethereum RPC configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// HTTP endpoint for reads and operator writes.
    pub url: String,
    /// WebSocket endpoint for the event subscription.
    pub ws_url: String,
    /// Expected chain id; 0 skips the startup check.
    pub chain_id: u64,
}

/// Game contract binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractSettings {
    /// The deployed contract address.
    pub address: String,
}

impl ContractSettings {
    /// Parse the configured address.
    ///
    /// # Errors
    ///
    /// Returns a message when the address is malformed.
    pub fn parse(&self) -> Result<Address, String> {
        self.address
            .parse()
            .map_err(|e| format!("invalid contract address {:?}: {e}", self.address))
    }
}

/// Operator identity.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSettings {
    /// Hex-encoded private key of the single operator wallet.
    pub private_key: String,
}

/// Store location.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    /// SQLite database file path.
    pub path: String,
}

/// Gameplay policy knobs. Defaults match the deployed venue setup.
#[derive(Debug, Clone, Deserialize)]
pub struct GameSettings {
    /// Maximum kill distance in meters.
    pub kill_proximity_meters: f64,
    /// Out-of-zone grace before elimination, seconds.
    pub zone_grace_seconds: i64,
    /// Expected client ping cadence, seconds.
    pub gps_ping_interval_seconds: i64,
    /// Whether kills and scans require BLE presence.
    pub ble_required: bool,
    /// Heartbeat scan deadline, seconds.
    pub heartbeat_interval_seconds: i64,
    /// Maximum heartbeat scan distance, meters.
    pub heartbeat_proximity_meters: f64,
    /// Alive count at which timeout eliminations suspend.
    pub heartbeat_disable_threshold: u32,
    /// Nominal check-in window, seconds.
    pub checkin_duration_seconds: i64,
    /// Pregame countdown, seconds.
    pub pregame_duration_seconds: i64,
}

/// Startup sync behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// First game id this deployment tracks.
    pub start_game_id: u64,
    /// Wipe game tables and rebuild from chain on startup.
    pub rebuild_db: bool,
}

/// Event-listener liveness policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSettings {
    /// How often the stale watchdog checks, milliseconds.
    pub ws_heartbeat_check_interval_ms: u64,
    /// Silence threshold before the subscription restarts, milliseconds.
    pub ws_heartbeat_stale_ms: u64,
    /// Minimum delay between forced restarts, milliseconds.
    pub ws_restart_cooldown_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (`error`..`trace`).
    pub level: String,
}

impl Settings {
    /// Load settings from defaults, an optional TOML file, and environment
    /// variables with the `ASSASSIN_` prefix (later overrides earlier).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a source is malformed.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("rpc.url", "http://localhost:8545")?
            .set_default("rpc.ws_url", "ws://localhost:8546")?
            .set_default("rpc.chain_id", 0_i64)?
            .set_default("contract.address", "")?
            .set_default("operator.private_key", "")?
            .set_default("db.path", "assassin.db")?
            .set_default("game.kill_proximity_meters", 100.0)?
            .set_default("game.zone_grace_seconds", 60)?
            .set_default("game.gps_ping_interval_seconds", 5)?
            .set_default("game.ble_required", true)?
            .set_default("game.heartbeat_interval_seconds", 600)?
            .set_default("game.heartbeat_proximity_meters", 100.0)?
            .set_default("game.heartbeat_disable_threshold", 4)?
            .set_default("game.checkin_duration_seconds", 300)?
            .set_default("game.pregame_duration_seconds", 180)?
            .set_default("sync.start_game_id", 1)?
            .set_default("sync.rebuild_db", false)?
            .set_default("listener.ws_heartbeat_check_interval_ms", 30_000)?
            .set_default("listener.ws_heartbeat_stale_ms", 120_000)?
            .set_default("listener.ws_restart_cooldown_ms", 30_000)?
            .set_default("logging.level", "info")?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("ASSASSIN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Validate settings before startup.
    ///
    /// # Errors
    ///
    /// Returns every validation failure; any failure is fatal.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.rpc.url.is_empty() {
            errors.push("rpc.url must not be empty".into());
        }
        if self.rpc.ws_url.is_empty() {
            errors.push("rpc.ws_url must not be empty".into());
        }

        match self.contract.parse() {
            Ok(addr) if addr == Address::ZERO => {
                errors.push("contract.address must not be the zero address".into());
            }
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        let key = self.operator.private_key.trim_start_matches("0x");
        if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            errors.push("operator.private_key must be a 32-byte hex key".into());
        }

        if self.game.kill_proximity_meters <= 0.0 {
            errors.push("game.kill_proximity_meters must be positive".into());
        }
        if self.game.zone_grace_seconds < 0 {
            errors.push("game.zone_grace_seconds must not be negative".into());
        }
        if self.game.heartbeat_interval_seconds <= 0 {
            errors.push("game.heartbeat_interval_seconds must be positive".into());
        }
        if self.sync.start_game_id == 0 {
            errors.push("sync.start_game_id is 1-based".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        let mut settings = Settings::load(None).unwrap();
        settings.contract.address = "0x00000000000000000000000000000000000000aa".into();
        settings.operator.private_key = format!("0x{}", "11".repeat(32));
        settings
    }

    #[test]
    fn defaults_match_the_documented_policy() {
        let s = Settings::load(None).unwrap();
        assert!((s.game.kill_proximity_meters - 100.0).abs() < f64::EPSILON);
        assert_eq!(s.game.zone_grace_seconds, 60);
        assert_eq!(s.game.gps_ping_interval_seconds, 5);
        assert!(s.game.ble_required);
        assert_eq!(s.game.heartbeat_interval_seconds, 600);
        assert_eq!(s.game.heartbeat_disable_threshold, 4);
        assert_eq!(s.game.checkin_duration_seconds, 300);
        assert_eq!(s.game.pregame_duration_seconds, 180);
        assert_eq!(s.sync.start_game_id, 1);
        assert!(!s.sync.rebuild_db);
        assert_eq!(s.listener.ws_heartbeat_check_interval_ms, 30_000);
        assert_eq!(s.listener.ws_heartbeat_stale_ms, 120_000);
        assert_eq!(s.listener.ws_restart_cooldown_ms, 30_000);
    }

    #[test]
    fn valid_settings_pass() {
        valid().validate().unwrap();
    }

    #[test]
    fn missing_contract_and_key_are_fatal() {
        let s = Settings::load(None).unwrap();
        let errors = s.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("contract.address")));
        assert!(errors.iter().any(|e| e.contains("operator.private_key")));
    }

    #[test]
    fn zero_contract_address_is_rejected() {
        let mut s = valid();
        s.contract.address = format!("0x{}", "00".repeat(20));
        let errors = s.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("zero address")));
    }
}
