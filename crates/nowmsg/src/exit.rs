use std::fmt;
use std::io;

use nowmsg_frame::FrameError;
use nowmsg_node::NodeError;
use nowmsg_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidAddress(_) | TransportError::InvalidKey(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::FrameTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

/// Every frame error is a problem with the caller's data.
pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn node_error(context: &str, err: NodeError) -> CliError {
    match err {
        NodeError::Transport(err) => transport_error(context, err),
        NodeError::Frame(err) => frame_error(context, err),
        NodeError::SendTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        NodeError::Config(_)
        | NodeError::ChannelOutOfRange(_)
        | NodeError::DuplicateId(_)
        | NodeError::DuplicateAddress { .. }
        | NodeError::UnknownPeer(_)
        | NodeError::ModeUnsupported { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        NodeError::SendInProgress => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
