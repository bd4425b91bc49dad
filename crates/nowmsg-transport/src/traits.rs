use std::sync::Arc;

use crate::address::{Channel, InterfaceMode, MacAddress, PeerKey};
use crate::error::Result;

/// Largest frame the link carries in one transmission.
pub const MAX_DATA_LEN: usize = 250;

/// Peer parameters handed to the link on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPeer {
    pub address: MacAddress,
    pub channel: Channel,
    pub interface: InterfaceMode,
    /// Per-peer key. `Some` registers the peer as encrypted.
    pub key: Option<PeerKey>,
}

impl LinkPeer {
    /// An unencrypted peer on the current channel, station interface.
    pub fn plain(address: MacAddress) -> Self {
        Self {
            address,
            channel: Channel::CURRENT,
            interface: InterfaceMode::Station,
            key: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

/// Peer table occupancy as reported by the link itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerCounts {
    pub total: usize,
    pub encrypted: usize,
}

impl PeerCounts {
    pub fn plain(&self) -> usize {
        self.total.saturating_sub(self.encrypted)
    }
}

/// Notifications delivered by the link.
///
/// Both callbacks run on the transport's own notification context, which may
/// be concurrent with application calls. Implementations must not block.
pub trait LinkHandler: Send + Sync {
    /// A transmit to `destination` finished, successfully or not.
    fn on_send_complete(&self, destination: &MacAddress, success: bool);

    /// A frame arrived from `source`.
    fn on_receive(&self, source: &MacAddress, data: &[u8]);
}

/// The datagram radio link underneath the messaging layer.
pub trait RadioTransport: Send + Sync {
    /// Hand one frame to the radio. `Ok` means accepted, not delivered; the
    /// outcome arrives later through [`LinkHandler::on_send_complete`].
    fn transmit(&self, destination: &MacAddress, frame: &[u8]) -> Result<()>;

    fn register_peer(&self, peer: &LinkPeer) -> Result<()>;

    fn unregister_peer(&self, address: &MacAddress) -> Result<()>;

    fn peer_exists(&self, address: &MacAddress) -> bool;

    fn peer_counts(&self) -> Result<PeerCounts>;

    fn current_channel(&self) -> Channel;

    fn set_channel(&self, channel: Channel) -> Result<()>;

    /// Install the primary key used to protect per-peer keys.
    fn set_primary_key(&self, key: &PeerKey) -> Result<()>;

    fn local_address(&self) -> MacAddress;

    /// Attach (or with `None`, detach) the notification handler.
    fn set_handler(&self, handler: Option<Arc<dyn LinkHandler>>);
}

impl<T: RadioTransport + ?Sized> RadioTransport for Arc<T> {
    fn transmit(&self, destination: &MacAddress, frame: &[u8]) -> Result<()> {
        (**self).transmit(destination, frame)
    }

    fn register_peer(&self, peer: &LinkPeer) -> Result<()> {
        (**self).register_peer(peer)
    }

    fn unregister_peer(&self, address: &MacAddress) -> Result<()> {
        (**self).unregister_peer(address)
    }

    fn peer_exists(&self, address: &MacAddress) -> bool {
        (**self).peer_exists(address)
    }

    fn peer_counts(&self) -> Result<PeerCounts> {
        (**self).peer_counts()
    }

    fn current_channel(&self) -> Channel {
        (**self).current_channel()
    }

    fn set_channel(&self, channel: Channel) -> Result<()> {
        (**self).set_channel(channel)
    }

    fn set_primary_key(&self, key: &PeerKey) -> Result<()> {
        (**self).set_primary_key(key)
    }

    fn local_address(&self) -> MacAddress {
        (**self).local_address()
    }

    fn set_handler(&self, handler: Option<Arc<dyn LinkHandler>>) {
        (**self).set_handler(handler)
    }
}
