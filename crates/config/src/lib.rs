//! Configuration for the bridge: schema, file discovery, env substitution.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, find_config_file, load_config},
    schema::{
        BridgeSection, BroadcastSection, GatewaySection, StorageSection, WabridgeConfig,
        WorkerSection,
    },
};
