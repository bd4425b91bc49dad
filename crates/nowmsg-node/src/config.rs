use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// Which directions a node takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    #[default]
    TwoWay,
    /// Send only; inbound frames are ignored.
    Sender,
    /// Receive only; sends are refused.
    Receiver,
}

impl CommunicationMode {
    pub fn can_send(self) -> bool {
        self != CommunicationMode::Receiver
    }

    pub fn can_receive(self) -> bool {
        self != CommunicationMode::Sender
    }
}

impl fmt::Display for CommunicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommunicationMode::TwoWay => "two_way",
            CommunicationMode::Sender => "sender",
            CommunicationMode::Receiver => "receiver",
        })
    }
}

/// When peers are registered with the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Register on `add_peer`, unregister on `remove_peer` or drop.
    #[default]
    Persistent,
    /// Register around each send only. Keeps the link's peer table small
    /// when the node talks to more peers than the radio can hold.
    Ephemeral,
}

/// Node configuration.
///
/// Deserializes from JSON; every field is optional:
///
/// ```json
/// { "mode": "two_way", "verify_sender": true, "default_channel": 6,
///   "encryption": true, "shared_key": "00112233445566778899aabbccddeeff",
///   "send_timeout_ms": 500, "registration": "persistent" }
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub mode: CommunicationMode,
    /// Drop frames from addresses that are not registered peers.
    pub verify_sender: bool,
    /// Channel to tune to at startup; 0 keeps the current one.
    pub default_channel: i32,
    pub encryption: bool,
    /// Primary key as 32 hex characters. Required when `encryption` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_key: Option<String>,
    /// How long a send waits for its completion. Must be non-zero.
    #[serde(deserialize_with = "nonzero_millis")]
    pub send_timeout_ms: u64,
    pub registration: RegistrationPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mode: CommunicationMode::TwoWay,
            verify_sender: false,
            default_channel: 1,
            encryption: false,
            shared_key: None,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            registration: RegistrationPolicy::Persistent,
        }
    }
}

pub(crate) const DEFAULT_SEND_TIMEOUT_MS: u64 = 1000;

fn nonzero_millis<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match u64::deserialize(deserializer)? {
        0 => Err(serde::de::Error::custom("send_timeout_ms must be at least 1")),
        ms => Ok(ms),
    }
}

impl NodeConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("NodeConfig");
        dbg.field("mode", &self.mode)
            .field("verify_sender", &self.verify_sender)
            .field("default_channel", &self.default_channel)
            .field("encryption", &self.encryption);
        if let Some(key) = &self.shared_key {
            dbg.field("shared_key", &format_args!("<redacted:{} chars>", key.len()));
        } else {
            dbg.field("shared_key", &Option::<String>::None);
        }
        dbg.field("send_timeout_ms", &self.send_timeout_ms)
            .field("registration", &self.registration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.mode, CommunicationMode::TwoWay);
        assert!(!config.verify_sender);
        assert_eq!(config.default_channel, 1);
        assert_eq!(config.send_timeout(), Duration::from_secs(1));
        assert_eq!(config.registration, RegistrationPolicy::Persistent);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            NodeConfig::from_json(r#"{"mode": "receiver", "registration": "ephemeral"}"#).unwrap();
        assert_eq!(config.mode, CommunicationMode::Receiver);
        assert_eq!(config.registration, RegistrationPolicy::Ephemeral);
        assert_eq!(config.default_channel, 1);
        assert!(!config.mode.can_send());
        assert!(config.mode.can_receive());
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(NodeConfig::from_json(r#"{"chanel": 3}"#).is_err());
        assert!(NodeConfig::from_json(r#"{"mode": "both"}"#).is_err());
    }

    #[test]
    fn zero_send_timeout_rejected() {
        let err = NodeConfig::from_json(r#"{"send_timeout_ms": 0}"#).unwrap_err();
        assert!(err.to_string().contains("send_timeout_ms"), "{err}");

        let config = NodeConfig::from_json(r#"{"send_timeout_ms": 1}"#).unwrap();
        assert_eq!(config.send_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn debug_redacts_shared_key() {
        let config = NodeConfig {
            encryption: true,
            shared_key: Some("00112233445566778899aabbccddeeff".to_string()),
            ..NodeConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("0011223344"));
        assert!(debug.contains("<redacted:32 chars>"));
    }
}
