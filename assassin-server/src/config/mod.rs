//! Configuration loading and validation.

mod settings;

pub use settings::{
    ContractSettings, DbSettings, GameSettings, ListenerSettings, LoggingSettings,
    OperatorSettings, RpcSettings, Settings, SyncSettings,
};
