use crate::address::MacAddress;

/// Errors reported by a radio transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The text or byte slice is not a 6-byte hardware address.
    #[error("invalid hardware address: {0}")]
    InvalidAddress(String),

    /// The key material is not a 16-byte link key.
    #[error("invalid link key: {0}")]
    InvalidKey(String),

    /// The destination has not been registered with the link.
    #[error("peer {0} is not registered with the link")]
    PeerNotFound(MacAddress),

    /// The address is already registered with the link.
    #[error("peer {0} is already registered with the link")]
    PeerExists(MacAddress),

    /// Another station already uses this address on the medium.
    #[error("address {0} already in use on the medium")]
    AddressInUse(MacAddress),

    /// The link's peer table has no free slots.
    #[error("link peer table full ({max} peers)")]
    PeerTableFull { max: usize },

    /// The frame does not fit in one transmission unit.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The radio refused to retune.
    #[error("channel {0} rejected by radio")]
    ChannelRejected(u8),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
