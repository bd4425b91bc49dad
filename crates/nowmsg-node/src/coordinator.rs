//! One-at-a-time acknowledged sends.
//!
//! A send takes the [`SendPermit`], resolves its destination, retunes the
//! radio if the peer lives on another channel, encodes, arms the pending slot
//! and transmits. It then waits, bounded by the send timeout, for the link's
//! completion notification for that destination.
//!
//! A send that times out leaves its destination *orphaned*: the link still
//! owes a verdict for it. That late verdict is discarded when it arrives, and
//! the next send to the same address waits for it (again bounded by the
//! timeout) before arming, so it can never be taken as the new send's result.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use nowmsg_frame::Message;
use nowmsg_transport::{Channel, LinkPeer, MacAddress, RadioTransport};

use crate::error::{NodeError, Result};

/// Progress of the current send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendState {
    Idle = 0,
    ResolvingPeer = 1,
    ConfiguringChannel = 2,
    Encoding = 3,
    Transmitting = 4,
    AwaitingCompletion = 5,
}

impl SendState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SendState::ResolvingPeer,
            2 => SendState::ConfiguringChannel,
            3 => SendState::Encoding,
            4 => SendState::Transmitting,
            5 => SendState::AwaitingCompletion,
            _ => SendState::Idle,
        }
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SendState::Idle => "idle",
            SendState::ResolvingPeer => "resolving_peer",
            SendState::ConfiguringChannel => "configuring_channel",
            SendState::Encoding => "encoding",
            SendState::Transmitting => "transmitting",
            SendState::AwaitingCompletion => "awaiting_completion",
        })
    }
}

enum Completion {
    Blocking(mpsc::SyncSender<bool>),
    #[cfg(feature = "async")]
    Async(tokio::sync::oneshot::Sender<bool>),
}

impl Completion {
    fn fire(self, success: bool) {
        match self {
            Completion::Blocking(tx) => {
                let _ = tx.try_send(success);
            }
            #[cfg(feature = "async")]
            Completion::Async(tx) => {
                let _ = tx.send(success);
            }
        }
    }
}

struct PendingSend {
    destination: MacAddress,
    completion: Completion,
}

#[derive(Default)]
struct Slots {
    pending: Option<PendingSend>,
    /// Destinations whose timed-out send still has a verdict in flight.
    orphaned: HashSet<MacAddress>,
}

/// Serializes sends and correlates them with completion notifications.
pub struct SendCoordinator {
    busy: AtomicBool,
    state: AtomicU8,
    slots: Mutex<Slots>,
    settled: Condvar,
    timeout: Duration,
}

impl SendCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            busy: AtomicBool::new(false),
            state: AtomicU8::new(SendState::Idle as u8),
            slots: Mutex::new(Slots::default()),
            settled: Condvar::new(),
            timeout,
        }
    }

    pub fn state(&self) -> SendState {
        SendState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a timed-out send to `destination` still awaits its verdict.
    pub fn is_orphaned(&self, destination: &MacAddress) -> bool {
        self.lock_slots().orphaned.contains(destination)
    }

    /// Take the permit, failing fast if another send holds it.
    pub(crate) fn begin(&self) -> Result<SendPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NodeError::SendInProgress)?;
        let permit = SendPermit { coordinator: self };
        permit.enter(SendState::ResolvingPeer);
        Ok(permit)
    }

    /// Deliver a completion notification from the link.
    ///
    /// A late verdict for an orphaned destination is consumed and dropped.
    /// Otherwise the pending send fires only if it targets `destination`;
    /// anything else is logged and ignored. Returns whether a send was
    /// completed.
    pub fn complete(&self, destination: &MacAddress, success: bool) -> bool {
        let pending = {
            let mut slots = self.lock_slots();
            if slots.orphaned.remove(destination) {
                drop(slots);
                self.settled.notify_all();
                tracing::debug!(
                    %destination,
                    success,
                    "late completion of timed-out send discarded"
                );
                return false;
            }
            match slots.pending.take() {
                Some(pending) if pending.destination == *destination => pending,
                Some(pending) => {
                    tracing::debug!(
                        expected = %pending.destination,
                        got = %destination,
                        "completion for another destination ignored"
                    );
                    slots.pending = Some(pending);
                    return false;
                }
                None => {
                    tracing::debug!(
                        %destination,
                        success,
                        "completion with no pending send ignored"
                    );
                    return false;
                }
            }
        };
        tracing::trace!(%destination, success, "send completed");
        pending.completion.fire(success);
        true
    }

    /// Send `msg` to the peer `resolve` yields, blocking until the link
    /// reports the outcome or the timeout expires.
    pub(crate) fn send<F>(
        &self,
        transport: &dyn RadioTransport,
        resolve: F,
        msg: &Message,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<LinkPeer>,
    {
        let permit = self.begin()?;
        let peer = resolve()?;
        self.settle(&peer.address);
        let (frame, _link) = self.prepare(&permit, transport, &peer, msg)?;

        let (tx, rx) = mpsc::sync_channel(1);
        self.transmit(&permit, transport, &peer, &frame, Completion::Blocking(tx))?;

        match rx.recv_timeout(self.timeout) {
            Ok(success) => self.outcome(&peer, success),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if self.abandon(&peer.address) {
                    return Err(self.timed_out(&peer));
                }
                // The verdict landed between the timeout and the abandon.
                rx.try_recv()
                    .map_err(|_| self.timed_out(&peer))
                    .and_then(|success| self.outcome(&peer, success))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(NodeError::DeliveryFailed(peer.address))
            }
        }
    }

    /// Async flavour of [`SendCoordinator::send`]; the wait suspends instead
    /// of blocking.
    #[cfg(feature = "async")]
    pub(crate) async fn send_async<F>(
        &self,
        transport: &dyn RadioTransport,
        resolve: F,
        msg: &Message,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<LinkPeer>,
    {
        let permit = self.begin()?;
        let peer = resolve()?;
        self.settle_async(&peer.address).await;
        let (frame, _link) = self.prepare(&permit, transport, &peer, msg)?;

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        self.transmit(&permit, transport, &peer, &frame, Completion::Async(tx))?;

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(success)) => self.outcome(&peer, success),
            Ok(Err(_)) => Err(NodeError::DeliveryFailed(peer.address)),
            Err(_) => {
                if self.abandon(&peer.address) {
                    return Err(self.timed_out(&peer));
                }
                rx.try_recv()
                    .map_err(|_| self.timed_out(&peer))
                    .and_then(|success| self.outcome(&peer, success))
            }
        }
    }

    /// Wait for an orphaned verdict to `destination` before arming a new
    /// send there. A verdict that never shows up within the timeout is
    /// written off as lost.
    fn settle(&self, destination: &MacAddress) {
        let slots = self.lock_slots();
        if !slots.orphaned.contains(destination) {
            return;
        }
        tracing::debug!(%destination, "waiting for late completion of previous send");
        let (mut slots, _) = self
            .settled
            .wait_timeout_while(slots, self.timeout, |slots| {
                slots.orphaned.contains(destination)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if slots.orphaned.remove(destination) {
            tracing::debug!(%destination, "late completion never arrived, written off");
        }
    }

    #[cfg(feature = "async")]
    async fn settle_async(&self, destination: &MacAddress) {
        const POLL: Duration = Duration::from_millis(2);

        let deadline = tokio::time::Instant::now() + self.timeout;
        while self.is_orphaned(destination) {
            if tokio::time::Instant::now() >= deadline {
                if self.lock_slots().orphaned.remove(destination) {
                    tracing::debug!(%destination, "late completion never arrived, written off");
                }
                return;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Give up on the armed send to `destination`. Returns `true` when its
    /// verdict is still owed, which orphans the destination; `false` when the
    /// verdict already arrived and sits in the completion channel.
    fn abandon(&self, destination: &MacAddress) -> bool {
        let mut slots = self.lock_slots();
        match slots.pending.take() {
            Some(pending) if pending.destination == *destination => {
                slots.orphaned.insert(*destination);
                true
            }
            other => {
                slots.pending = other;
                false
            }
        }
    }

    fn prepare<'t>(
        &self,
        permit: &SendPermit<'_>,
        transport: &'t dyn RadioTransport,
        peer: &LinkPeer,
        msg: &Message,
    ) -> Result<(Bytes, LinkRegistration<'t>)> {
        permit.enter(SendState::ConfiguringChannel);
        configure_channel(transport, peer.channel)?;

        permit.enter(SendState::Encoding);
        let frame = msg.to_bytes();

        let link = LinkRegistration::ensure(transport, peer)?;
        Ok((frame, link))
    }

    fn transmit(
        &self,
        permit: &SendPermit<'_>,
        transport: &dyn RadioTransport,
        peer: &LinkPeer,
        frame: &[u8],
        completion: Completion,
    ) -> Result<()> {
        // Armed before transmit: the completion may arrive before transmit returns.
        self.lock_slots().pending = Some(PendingSend {
            destination: peer.address,
            completion,
        });

        permit.enter(SendState::Transmitting);
        transport
            .transmit(&peer.address, frame)
            .map_err(|source| NodeError::TransmitRejected {
                address: peer.address,
                source,
            })?;
        tracing::trace!(to = %peer.address, len = frame.len(), "frame transmitted");

        permit.enter(SendState::AwaitingCompletion);
        Ok(())
    }

    fn outcome(&self, peer: &LinkPeer, success: bool) -> Result<()> {
        if success {
            Ok(())
        } else {
            tracing::debug!(to = %peer.address, "link reported delivery failure");
            Err(NodeError::DeliveryFailed(peer.address))
        }
    }

    fn timed_out(&self, peer: &LinkPeer) -> NodeError {
        tracing::warn!(to = %peer.address, timeout = ?self.timeout, "send timed out");
        NodeError::SendTimeout {
            address: peer.address,
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for SendCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendCoordinator")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Exclusive right to send. Dropping it disarms the pending slot and
/// returns the coordinator to [`SendState::Idle`].
pub(crate) struct SendPermit<'a> {
    coordinator: &'a SendCoordinator,
}

impl SendPermit<'_> {
    fn enter(&self, state: SendState) {
        self.coordinator.state.store(state as u8, Ordering::Release);
        tracing::trace!(%state, "send state");
    }
}

impl Drop for SendPermit<'_> {
    fn drop(&mut self) {
        self.coordinator.lock_slots().pending.take();
        self.enter(SendState::Idle);
        self.coordinator.busy.store(false, Ordering::Release);
    }
}

fn configure_channel(transport: &dyn RadioTransport, channel: Channel) -> Result<()> {
    if channel.is_current() {
        return Ok(());
    }
    let current = transport.current_channel();
    if current != channel {
        tracing::debug!(from = %current, to = %channel, "switching channel");
        transport.set_channel(channel)?;
    }
    Ok(())
}

/// Temporary link registration for a destination the link does not know.
/// Unregistered on drop, whatever the send's outcome.
struct LinkRegistration<'t> {
    transport: &'t dyn RadioTransport,
    address: Option<MacAddress>,
}

impl<'t> LinkRegistration<'t> {
    fn ensure(transport: &'t dyn RadioTransport, peer: &LinkPeer) -> Result<Self> {
        if transport.peer_exists(&peer.address) {
            return Ok(Self {
                transport,
                address: None,
            });
        }
        transport
            .register_peer(peer)
            .map_err(|source| NodeError::PeerRegistration {
                address: peer.address,
                source,
            })?;
        tracing::trace!(address = %peer.address, "temporary link registration");
        Ok(Self {
            transport,
            address: Some(peer.address),
        })
    }
}

impl Drop for LinkRegistration<'_> {
    fn drop(&mut self) {
        if let Some(address) = self.address.take() {
            if let Err(err) = self.transport.unregister_peer(&address) {
                tracing::warn!(%address, error = %err, "temporary registration not removed");
            }
        }
    }
}
