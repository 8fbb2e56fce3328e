//! Configuration types for call negotiation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// STUN server URLs (empty: host candidates only)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Which kinds of local media to acquire on start
    pub media: MediaConstraints,

    /// Receive-side options applied when creating the offer
    pub offer: OfferOptions,

    /// Upper bound for a negotiation round in milliseconds (default: 10000, range: 100-120000)
    pub negotiation_timeout_ms: u64,

    /// Capacity of the call event broadcast channel (default: 64)
    pub event_capacity: usize,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Local media acquisition constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    /// Acquire a video track (default: true)
    pub video: bool,

    /// Acquire an audio track (default: true)
    pub audio: bool,
}

/// Offer creation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferOptions {
    /// Offer a video section even when no local video is sent (default: true)
    pub offer_to_receive_video: bool,

    /// Offer an audio section even when no local audio is sent (default: false)
    pub offer_to_receive_audio: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            media: MediaConstraints::default(),
            offer: OfferOptions::default(),
            negotiation_timeout_ms: 10_000,
            event_capacity: 64,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            offer_to_receive_video: true,
            offer_to_receive_audio: false,
        }
    }
}

impl CallConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to parse call config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Negotiation round bound as a Duration
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_millis(self.negotiation_timeout_ms)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a STUN URL does not start with `stun:` or `stuns:`
    /// - a TURN URL does not start with `turn:` or `turns:`
    /// - neither video nor audio is requested
    /// - `negotiation_timeout_ms` is not in range 100-120000
    /// - `event_capacity` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server URL must start with stun: or stuns:, got {}",
                url
            )));
        }

        if let Some(turn) = self
            .turn_servers
            .iter()
            .find(|turn| !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server URL must start with turn: or turns:, got {}",
                turn.url
            )));
        }

        if !self.media.video && !self.media.audio {
            return Err(Error::InvalidConfig(
                "At least one of video or audio must be requested".to_string(),
            ));
        }

        if self.negotiation_timeout_ms < 100 || self.negotiation_timeout_ms > 120_000 {
            return Err(Error::InvalidConfig(format!(
                "negotiation_timeout_ms must be in range 100-120000, got {}",
                self.negotiation_timeout_ms
            )));
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
