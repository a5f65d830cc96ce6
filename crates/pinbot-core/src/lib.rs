//! Pin relay core: the connection registry, the relay engine, and the
//! command layer that sits in front of the registry.

pub mod commands;
pub mod config;
pub mod error;
pub mod platform;
pub mod registry;
pub mod relay;
mod store;

use std::sync::Arc;

use pinbot_db::Database;

pub use commands::{Command, CommandContext, Commands, parse_command};
pub use config::Settings;
pub use error::{Error, IntegrityWarning, Rejection, Result};
pub use platform::{OutboundFile, Platform};
pub use registry::{PinRegistration, Registry, SourceRegistration};
pub use relay::{ConnectionRelay, RelayEngine, RelayOutcome};

/// Registry, relay and commands wired to one store and one platform.
pub struct PinBot {
    pub registry: Arc<Registry>,
    pub relay: RelayEngine,
    pub commands: Commands,
    pub settings: Settings,
}

impl PinBot {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>, settings: Settings) -> Self {
        let registry = Arc::new(Registry::new(
            Arc::clone(&db),
            Arc::clone(&platform),
            settings.command_prefix.clone(),
        ));
        let relay = RelayEngine::new(db, Arc::clone(&platform), &settings);
        let commands = Commands::new(
            Arc::clone(&registry),
            platform,
            settings.command_prefix.clone(),
        );

        Self {
            registry,
            relay,
            commands,
            settings,
        }
    }
}
