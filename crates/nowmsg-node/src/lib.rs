//! Typed peer-to-peer messaging over a datagram radio link.
//!
//! A [`Node`] ties together:
//! - a [`PeerRegistry`] of application-numbered peers
//! - a [`DeliveryQueue`] fed from the link's notification context
//! - a [`SendCoordinator`] that waits, with a timeout, for each send's
//!   link-layer verdict
//!
//! Setup never fails outright; problems are collected in [`SetupStatus`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod inbound;
pub mod node;
pub mod queue;
pub mod registry;
pub mod status;

pub use config::{CommunicationMode, NodeConfig, RegistrationPolicy};
pub use coordinator::{SendCoordinator, SendState};
pub use error::{NodeError, Result};
pub use inbound::{InboundDispatch, InboundStats, NodeObserver};
pub use node::Node;
pub use queue::DeliveryQueue;
pub use registry::{PeerFilter, PeerId, PeerRecord, PeerRegistry};
pub use status::{SetupIssue, SetupStatus, Severity};
