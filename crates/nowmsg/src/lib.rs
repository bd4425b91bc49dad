//! Typed, acknowledged peer-to-peer messaging over datagram radio links.
//!
//! nowmsg carries small typed values (scalars, arrays, text, records) between
//! numbered peers on a connectionless radio link, one fixed-size frame per
//! message, and tells the sender whether the link delivered it.
//!
//! # Crate Structure
//!
//! - [`transport`]: radio link abstraction and the in-memory loopback medium
//! - [`frame`]: tagged fixed-size frames and typed values
//! - [`node`]: peers, delivery queue and acknowledged sends (behind `node` feature)

/// Re-export transport types.
pub mod transport {
    pub use nowmsg_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nowmsg_frame::*;
}

/// Re-export node types (requires `node` feature).
#[cfg(feature = "node")]
pub mod node {
    pub use nowmsg_node::*;
}
