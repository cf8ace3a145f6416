/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use chatrelay_client::{DisconnectPolicy, RelaySettings};
use serde::{Deserialize, Serialize};
use url::Url;

/// Everything the relay needs at startup.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    /// Cookie obtained from a browser session on the chat service.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(flatten)]
    pub settings: RelaySettings,
}

impl RelayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: RelayConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_env_or_default() -> anyhow::Result<Self> {
        // Try to load from config file first
        if let Ok(config_path) = std::env::var("CHATRELAY_CONFIG_PATH") {
            return Self::from_file(config_path);
        }
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from individual variables, falling back to defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = RelaySettings::default();

        let interests = var("CHAT_INTERESTS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|interest| !interest.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let disconnect_policy = match var("DISCONNECT_POLICY") {
            Some(policy) => policy.parse::<DisconnectPolicy>()?,
            None => defaults.disconnect_policy,
        };

        Ok(RelayConfig {
            cookie: var("CHAT_COOKIE"),
            settings: RelaySettings {
                server_url: var("CHAT_SERVER_URL").unwrap_or(defaults.server_url),
                origin: var("CHAT_ORIGIN").unwrap_or(defaults.origin),
                interests,
                prefer_same_country: parse_or(
                    &var,
                    "PREFER_SAME_COUNTRY",
                    defaults.prefer_same_country,
                )?,
                heartbeat_interval_secs: parse_or(
                    &var,
                    "HEARTBEAT_INTERVAL_SECS",
                    defaults.heartbeat_interval_secs,
                )?,
                relay_enabled: parse_or(&var, "RELAY_ENABLED", defaults.relay_enabled)?,
                disconnect_policy,
                auto_rematch: parse_or(&var, "AUTO_REMATCH", defaults.auto_rematch)?,
            },
        })
    }

    pub fn server_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.settings.server_url)
            .map_err(|e| anyhow!("Invalid server URL: {e:?}"))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(anyhow!("Server URL must use ws or wss, not {other}")),
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {name} ('{raw}'): {e}")),
        None => Ok(default),
    }
}
