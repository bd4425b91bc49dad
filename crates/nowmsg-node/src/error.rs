use std::time::Duration;

use nowmsg_transport::{MacAddress, TransportError};

use crate::config::CommunicationMode;
use crate::registry::PeerId;

/// Errors returned by node operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] nowmsg_frame::FrameError),

    /// Configuration JSON could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Channel outside `0..=13`.
    #[error("channel {0} out of range (0..=13)")]
    ChannelOutOfRange(i32),

    #[error("peer id {0} already registered")]
    DuplicateId(PeerId),

    /// The address already belongs to a peer, locally or on the link.
    #[error("address {address} already registered")]
    DuplicateAddress {
        address: MacAddress,
        existing: Option<PeerId>,
    },

    #[error("unknown peer id {0}")]
    UnknownPeer(PeerId),

    /// The link refused to register the peer.
    #[error("link registration for {address} failed: {source}")]
    PeerRegistration {
        address: MacAddress,
        #[source]
        source: TransportError,
    },

    /// The link refused to unregister the peer. Local state is already gone.
    #[error("link deregistration for {address} failed: {source}")]
    PeerDeregistration {
        address: MacAddress,
        #[source]
        source: TransportError,
    },

    /// The link refused the frame outright.
    #[error("transmit to {address} rejected: {source}")]
    TransmitRejected {
        address: MacAddress,
        #[source]
        source: TransportError,
    },

    /// The link reported that the frame was not delivered.
    #[error("delivery to {0} failed")]
    DeliveryFailed(MacAddress),

    /// No completion arrived in time.
    #[error("send to {address} timed out after {timeout:?}")]
    SendTimeout {
        address: MacAddress,
        timeout: Duration,
    },

    /// Another send is awaiting its completion.
    #[error("another send is in progress")]
    SendInProgress,

    /// The communication mode does not allow the operation.
    #[error("{operation} not supported in {mode} mode")]
    ModeUnsupported {
        mode: CommunicationMode,
        operation: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, NodeError>;
