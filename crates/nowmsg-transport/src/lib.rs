//! Radio link abstraction for nowmsg.
//!
//! Defines the collaborator interface the messaging layer consumes:
//! - [`RadioTransport`]: transmit, peer registration, channel control
//! - [`LinkHandler`]: send-completion and receive notifications
//!
//! This is the lowest layer of nowmsg. The in-memory [`LoopbackMedium`]
//! provides stations that behave like a shared radio medium, for tests,
//! demos and host-side simulation.

pub mod address;
pub mod error;
pub mod loopback;
pub mod traits;

pub use address::{
    Channel, InterfaceMode, MacAddress, PeerKey, KEY_LENGTH, MAC_LENGTH, MAX_CHANNEL, MIN_CHANNEL,
};
pub use error::{Result, TransportError};
pub use loopback::{CompletionMode, LoopbackMedium, LoopbackOptions, LoopbackRadio};
pub use traits::{LinkHandler, LinkPeer, PeerCounts, RadioTransport, MAX_DATA_LEN};
