use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Public STUN servers offered to the peer connection when none are configured.
pub const DEFAULT_STUN_SERVERS: [&str; 5] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
];

pub const DEFAULT_REFRESH_HZ: u32 = 60;
const MAX_REFRESH_HZ: u32 = 240;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// What to do with an offer that arrives while a negotiated session is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPolicy {
    /// Keep the live session and ignore the new offer.
    #[default]
    RejectWhileLive,
    /// Close the live session and answer the new offer.
    Replace,
}

#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Avatar model URL before the morph-target query is appended.
    pub avatar_url: Option<String>,
    pub ice_servers: Vec<IceServerConfig>,
    /// Display refresh rate driving the retargeting loop.
    pub refresh_hz: u32,
    pub offer_policy: OfferPolicy,
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_hz == 0 || self.refresh_hz > MAX_REFRESH_HZ {
            return Err(Error::config(format!(
                "refresh rate must be within 1..={MAX_REFRESH_HZ} Hz, got {}",
                self.refresh_hz
            )));
        }
        if let Some(server) = self.ice_servers.iter().find(|s| s.urls.is_empty()) {
            return Err(Error::config(format!(
                "ICE server entry has no URLs: {server:?}"
            )));
        }
        for url in self.ice_servers.iter().flat_map(|s| s.urls.iter()) {
            if !is_ice_url(url) {
                return Err(Error::config(format!(
                    "unsupported ICE server URL {url:?}: expected stun:, stuns:, turn: or turns:"
                )));
            }
        }
        Ok(())
    }

    /// Interval between retargeting loop ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            avatar_url: None,
            ice_servers: DEFAULT_STUN_SERVERS
                .iter()
                .map(|url| IceServerConfig::new(*url))
                .collect(),
            refresh_hz: DEFAULT_REFRESH_HZ,
            offer_policy: OfferPolicy::default(),
        }
    }
}

fn is_ice_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Parse a comma/semicolon separated list of ICE server URLs, one server per URL.
pub fn parse_ice_server_list(value: &str) -> Result<Vec<IceServerConfig>> {
    let servers: Vec<IceServerConfig> = value
        .split([',', ';'])
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(IceServerConfig::new)
        .collect();

    if servers.is_empty() {
        return Err(Error::config(
            "ICE server list is set but contains no usable URLs",
        ));
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SurfaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ice_servers.len(), 5);
        assert_eq!(config.offer_policy, OfferPolicy::RejectWhileLive);
    }

    #[test]
    fn test_frame_interval_at_60hz() {
        let config = SurfaceConfig::default();
        let micros = config.frame_interval().as_micros();
        assert!((16_666..=16_667).contains(&micros));
    }

    #[test]
    fn test_rejects_zero_refresh() {
        let config = SurfaceConfig {
            refresh_hz: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_ice_server_list_multiple_entries() {
        let servers =
            parse_ice_server_list("stun:a.example:3478; turn:b.example:3478,").unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].urls, vec!["turn:b.example:3478".to_string()]);
    }

    #[test]
    fn test_parse_ice_server_list_rejects_empty() {
        assert!(parse_ice_server_list(" , ;").is_err());
    }

    #[test]
    fn test_rejects_non_ice_scheme() {
        let config = SurfaceConfig {
            ice_servers: vec![IceServerConfig::new("https://example.com")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
