//! Configuration loading and parsing.
//!
//! Defines the bridge config schema and resolves defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level bridge configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Media server connection settings.
    pub server: ServerConfig,
    /// Local playback settings.
    pub player: Option<PlayerConfig>,
}

/// Media server connection settings.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Base HTTP(S) URL of the media server.
    pub address: String,
    /// Access token for the configured device.
    pub token: String,
    /// Stable device id (defaults to the hostname).
    pub device_id: Option<String>,
}

/// Local playback settings.
#[derive(Debug, Deserialize)]
pub struct PlayerConfig {
    /// Player command and leading arguments; the stream URL is appended.
    pub command: Option<Vec<String>>,
}

impl BridgeConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<BridgeConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Validate the server address and strip trailing slashes.
pub fn server_address_from_config(cfg: &BridgeConfig) -> Result<String> {
    let address = cfg.server.address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(anyhow::anyhow!("server.address is required in config"));
    }
    url::Url::parse(address).with_context(|| format!("parse server.address {address}"))?;
    Ok(address.to_string())
}

/// Resolve the device id, falling back to the hostname.
pub fn device_id_from_config(cfg: &BridgeConfig) -> String {
    if let Some(id) = cfg.server.device_id.as_deref() {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    hostname()
}

/// Resolve the player command, falling back to ffplay.
pub fn player_command_from_config(cfg: &BridgeConfig) -> Result<Vec<String>> {
    let Some(command) = cfg.player.as_ref().and_then(|p| p.command.as_ref()) else {
        return Ok(default_player_command());
    };
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow::anyhow!("player.command must not be empty"));
    }
    Ok(command.clone())
}

fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "error"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().to_string();
    if name.is_empty() {
        "media-bridge".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> BridgeConfig {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn minimal_config_parses() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            "#,
        );
        assert_eq!(server_address_from_config(&cfg).unwrap(), "http://media.local:8096");
        assert_eq!(player_command_from_config(&cfg).unwrap()[0], "ffplay");
    }

    #[test]
    fn server_address_strips_trailing_slash() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096/"
            token = "abc"
            "#,
        );
        assert_eq!(server_address_from_config(&cfg).unwrap(), "http://media.local:8096");
    }

    #[test]
    fn server_address_rejects_garbage() {
        let cfg = parse(
            r#"
            [server]
            address = "not a url"
            token = "abc"
            "#,
        );
        assert!(server_address_from_config(&cfg).is_err());
    }

    #[test]
    fn device_id_prefers_config_value() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            device_id = "living-room"
            "#,
        );
        assert_eq!(device_id_from_config(&cfg), "living-room");
    }

    #[test]
    fn device_id_falls_back_to_machine_hostname() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            "#,
        );
        let expected = gethostname::gethostname().to_string_lossy().to_string();
        assert_eq!(device_id_from_config(&cfg), expected);
    }

    #[test]
    fn blank_device_id_falls_back_to_machine_hostname() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            device_id = "  "
            "#,
        );
        let expected = gethostname::gethostname().to_string_lossy().to_string();
        assert_eq!(device_id_from_config(&cfg), expected);
    }

    #[test]
    fn player_command_rejects_empty_list() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            [player]
            command = []
            "#,
        );
        assert!(player_command_from_config(&cfg).is_err());
    }

    #[test]
    fn player_command_uses_configured_binary() {
        let cfg = parse(
            r#"
            [server]
            address = "http://media.local:8096"
            token = "abc"
            [player]
            command = ["mpv", "--no-video"]
            "#,
        );
        assert_eq!(
            player_command_from_config(&cfg).unwrap(),
            vec!["mpv".to_string(), "--no-video".to_string()]
        );
    }
}
