//! Configuration loading and management

use std::time::Duration;

use anyhow::{bail, Context, Result};

use xhotkey::display::{ConnectOptions, DEFAULT_MAX_ATTEMPTS};
use xhotkey::hotkey::Combination;

const DEFAULT_COMBINATION: &str = "ctrl+shift+h";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How to reach the X server
    pub connect: ConnectOptions,

    /// Hotkey to listen for
    pub combination: Combination,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let display = lookup("XHOTKEY_DISPLAY").filter(|name| !name.is_empty());

        let combination = lookup("XHOTKEY_COMBINATION")
            .unwrap_or_else(|| DEFAULT_COMBINATION.to_string())
            .parse::<Combination>()
            .context("invalid XHOTKEY_COMBINATION")?;

        let max_attempts = match lookup("XHOTKEY_CONNECT_ATTEMPTS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .context("invalid XHOTKEY_CONNECT_ATTEMPTS")?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        if max_attempts == 0 {
            bail!("XHOTKEY_CONNECT_ATTEMPTS must be at least 1");
        }

        let backoff = lookup("XHOTKEY_CONNECT_BACKOFF_MS")
            .map(|value| value.trim().parse::<u64>())
            .transpose()
            .context("invalid XHOTKEY_CONNECT_BACKOFF_MS")?
            .map(Duration::from_millis);

        Ok(Self {
            connect: ConnectOptions {
                display,
                max_attempts,
                backoff,
            },
            combination,
        })
    }
}
