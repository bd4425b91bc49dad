use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Length of a radio hardware address in bytes.
pub const MAC_LENGTH: usize = 6;

/// Length of a link encryption key in bytes.
pub const KEY_LENGTH: usize = 16;

/// Lowest valid radio channel. Channel 0 means "the channel the radio is on".
pub const MIN_CHANNEL: u8 = 0;

/// Highest valid radio channel.
pub const MAX_CHANNEL: u8 = 13;

/// A 6-byte radio hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; MAC_LENGTH]);

impl MacAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_LENGTH]);

    pub const fn new(bytes: [u8; MAC_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAC_LENGTH] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; MAC_LENGTH]> for MacAddress {
    fn from(bytes: [u8; MAC_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for MacAddress {
    type Error = TransportError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; MAC_LENGTH] = bytes
            .try_into()
            .map_err(|_| TransportError::InvalidAddress(format!("{} bytes", bytes.len())))?;
        Ok(Self(raw))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

/// Parses `AA:BB:CC:DD:EE:FF`; `-` is accepted as a separator as well.
impl FromStr for MacAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(s.to_string());

        let mut bytes = [0u8; MAC_LENGTH];
        let mut parts = s.trim().split(|c: char| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            hex::decode_to_slice(part, std::slice::from_mut(byte)).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// A validated radio channel in `MIN_CHANNEL..=MAX_CHANNEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Follow whatever channel the radio is tuned to.
    pub const CURRENT: Channel = Channel(0);

    /// Returns `None` when `channel` is outside the valid range.
    pub fn new(channel: i32) -> Option<Self> {
        if (i32::from(MIN_CHANNEL)..=i32::from(MAX_CHANNEL)).contains(&channel) {
            Some(Self(channel as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Channel 0 follows whatever channel the radio is currently tuned to.
    pub fn is_current(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Radio interface a peer is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterfaceMode {
    #[default]
    Station,
    AccessPoint,
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceMode::Station => f.write_str("sta"),
            InterfaceMode::AccessPoint => f.write_str("ap"),
        }
    }
}

/// A 16-byte link key. Debug output never shows key material.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerKey([u8; KEY_LENGTH]);

impl PeerKey {
    pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Parse a key from 32 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, TransportError> {
        let text = text.trim();
        let mut bytes = [0u8; KEY_LENGTH];
        hex::decode_to_slice(text, &mut bytes).map_err(|err| match err {
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                TransportError::InvalidKey(format!(
                    "expected {} hex characters, got {}",
                    KEY_LENGTH * 2,
                    text.len()
                ))
            }
            other => TransportError::InvalidKey(other.to_string()),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerKey(<redacted:{KEY_LENGTH} bytes>)")
    }
}
