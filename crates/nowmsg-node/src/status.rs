//! Setup problems collected over a node's lifetime.
//!
//! Construction never fails. Anything that goes wrong while configuring the
//! radio is recorded here, and the application checks [`SetupStatus`] before
//! relying on the node.

use std::sync::{Mutex, PoisonError};

use nowmsg_transport::MacAddress;

use crate::registry::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded setup problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupIssue {
    #[error("default channel {channel} out of range (0..=13)")]
    ChannelOutOfRange { channel: i32 },

    #[error("send timeout of 0 ms replaced with {fallback_ms} ms")]
    ZeroSendTimeout { fallback_ms: u64 },

    #[error("encryption enabled without a shared key")]
    MissingSharedKey,

    #[error("encryption setup failed: {reason}")]
    EncryptionSetup { reason: String },

    #[error("could not tune to channel {channel}: {reason}")]
    ChannelSetup { channel: u8, reason: String },

    #[error("address {address} already registered (requested id {id})")]
    DuplicateAddress { address: MacAddress, id: PeerId },

    #[error("link registration for {address} failed: {reason}")]
    PeerRegistration { address: MacAddress, reason: String },

    #[error("link peer count unavailable: {reason}")]
    PeerCountQuery { reason: String },

    #[error("peer count mismatch: {local} local, {transport} on the link")]
    CountMismatch { local: usize, transport: usize },
}

impl SetupIssue {
    pub fn severity(&self) -> Severity {
        match self {
            SetupIssue::DuplicateAddress { .. } | SetupIssue::CountMismatch { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

/// Snapshot of recorded issues, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupStatus {
    issues: Vec<SetupIssue>,
}

impl SetupStatus {
    /// Nothing has gone wrong, not even a warning.
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn issues(&self) -> &[SetupIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &SetupIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SetupIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity() == Severity::Warning)
    }
}

/// Shared, append-only issue log.
#[derive(Debug, Default)]
pub(crate) struct IssueLog {
    issues: Mutex<Vec<SetupIssue>>,
}

impl IssueLog {
    /// Record an issue. Repeats of the most recent identical issue are
    /// collapsed.
    pub(crate) fn record(&self, issue: SetupIssue) {
        match issue.severity() {
            Severity::Warning => tracing::warn!(%issue, "setup warning"),
            Severity::Error => tracing::error!(%issue, "setup error"),
        }
        let mut issues = self.issues.lock().unwrap_or_else(PoisonError::into_inner);
        if issues.last() != Some(&issue) {
            issues.push(issue);
        }
    }

    pub(crate) fn snapshot(&self) -> SetupStatus {
        SetupStatus {
            issues: self
                .issues
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
