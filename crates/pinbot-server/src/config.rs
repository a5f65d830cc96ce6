use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use pinbot_core::Settings;

pub const DEFAULT_SECRETS_PATH: &str = "config/secrets.json";
pub const DEFAULT_DB_PATH: &str = "pinbot.db";

pub struct Config {
    pub token: String,
    pub db_path: PathBuf,
    pub settings: Settings,
}

#[derive(Deserialize)]
struct Secrets {
    bot_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let token = match var("PINBOT_DISCORD_TOKEN") {
            Some(token) => token,
            None => {
                let path = var("PINBOT_SECRETS_PATH").unwrap_or_else(|| DEFAULT_SECRETS_PATH.into());
                load_token(Path::new(&path))?
            },
        };

        let defaults = Settings::default();
        let upload_ceiling = match var("PINBOT_UPLOAD_CEILING") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PINBOT_UPLOAD_CEILING must be a byte count, got {raw:?}"))?,
            None => defaults.upload_ceiling,
        };

        Ok(Self {
            token,
            db_path: PathBuf::from(var("PINBOT_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            settings: Settings {
                command_prefix: var("PINBOT_COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
                pin_emoji: var("PINBOT_PIN_EMOJI").unwrap_or(defaults.pin_emoji),
                upload_ceiling,
            },
        })
    }
}

fn load_token(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("no PINBOT_DISCORD_TOKEN set and cannot read {}", path.display()))?;
    let secrets: Secrets = serde_json::from_str(&raw)
        .with_context(|| format!("parse secrets file {}", path.display()))?;
    if secrets.bot_token.trim().is_empty() {
        bail!("bot_token in {} is empty", path.display());
    }
    Ok(secrets.bot_token)
}
