use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nowmsg_frame::{Message, Record, Tag, Value, WireValue};
use nowmsg_transport::{Channel, InterfaceMode, LinkPeer, MacAddress, PeerKey, RadioTransport};

use crate::config::{NodeConfig, DEFAULT_SEND_TIMEOUT_MS};
use crate::coordinator::{SendCoordinator, SendState};
use crate::error::{NodeError, Result};
use crate::inbound::{InboundCounters, InboundDispatch, InboundStats, NodeObserver, ObserverSlot};
use crate::queue::DeliveryQueue;
use crate::registry::{PeerFilter, PeerId, PeerRecord, PeerRegistry};
use crate::status::{IssueLog, SetupIssue, SetupStatus};

/// A messaging endpoint on one radio link.
///
/// Owns the peer registry, the delivery queue and the send coordinator, and
/// installs itself as the link's notification handler. Dropping the node
/// detaches the handler and unregisters its persistent peers.
pub struct Node<T: RadioTransport> {
    transport: T,
    config: NodeConfig,
    registry: Arc<RwLock<PeerRegistry>>,
    queue: Arc<DeliveryQueue>,
    coordinator: Arc<SendCoordinator>,
    counters: Arc<InboundCounters>,
    observer: Arc<ObserverSlot>,
    issues: Arc<IssueLog>,
}

impl<T: RadioTransport> Node<T> {
    /// Configure the link and start listening.
    ///
    /// Never fails. Problems applying `config` are recorded and reported by
    /// [`Node::status`].
    pub fn new(transport: T, mut config: NodeConfig) -> Self {
        let issues = Arc::new(IssueLog::default());
        if config.send_timeout_ms == 0 {
            issues.record(SetupIssue::ZeroSendTimeout {
                fallback_ms: DEFAULT_SEND_TIMEOUT_MS,
            });
            config.send_timeout_ms = DEFAULT_SEND_TIMEOUT_MS;
        }
        apply_channel(&transport, config.default_channel, &issues);
        if config.encryption {
            apply_encryption(&transport, config.shared_key.as_deref(), &issues);
        }

        let registry = Arc::new(RwLock::new(PeerRegistry::new(
            config.registration,
            issues.clone(),
        )));
        let queue = Arc::new(DeliveryQueue::new());
        let coordinator = Arc::new(SendCoordinator::new(config.send_timeout()));
        let counters = Arc::new(InboundCounters::default());
        let observer = Arc::new(ObserverSlot::default());

        transport.set_handler(Some(Arc::new(InboundDispatch::new(
            config.mode,
            config.verify_sender,
            registry.clone(),
            queue.clone(),
            coordinator.clone(),
            counters.clone(),
            observer.clone(),
        ))));

        tracing::info!(
            address = %transport.local_address(),
            mode = %config.mode,
            channel = %transport.current_channel(),
            "node started"
        );

        Self {
            transport,
            config,
            registry,
            queue,
            coordinator,
            counters,
            observer,
            issues,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Everything recorded since construction.
    pub fn status(&self) -> SetupStatus {
        self.issues.snapshot()
    }

    pub fn inbound_stats(&self) -> InboundStats {
        self.counters.snapshot()
    }

    pub fn local_address(&self) -> MacAddress {
        self.transport.local_address()
    }

    /// Retune the radio. Channel 0 is accepted and leaves it where it is.
    pub fn set_channel(&self, channel: i32) -> Result<()> {
        let channel = Channel::new(channel).ok_or(NodeError::ChannelOutOfRange(channel))?;
        if !channel.is_current() {
            self.transport.set_channel(channel)?;
        }
        Ok(())
    }

    pub fn send_state(&self) -> SendState {
        self.coordinator.state()
    }

    /// Install (or with `None`, remove) an observer of send completions and
    /// accepted frames. Queueing and send results are unaffected.
    pub fn set_observer(&self, observer: Option<Arc<dyn NodeObserver>>) {
        self.observer.set(observer);
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, PeerRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, PeerRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Peers

    pub fn add_peer(
        &self,
        id: PeerId,
        address: MacAddress,
        channel: i32,
        interface: InterfaceMode,
        key: Option<PeerKey>,
    ) -> Result<()> {
        self.write_registry()
            .add(&self.transport, id, address, channel, interface, key)
    }

    pub fn remove_peer(&self, id: PeerId) -> Result<PeerRecord> {
        self.write_registry().remove(&self.transport, id)
    }

    pub fn peer(&self, id: PeerId) -> Option<PeerRecord> {
        self.read_registry().get(id).cloned()
    }

    pub fn peer_by_address(&self, address: &MacAddress) -> Option<PeerRecord> {
        self.read_registry().get_by_address(address).cloned()
    }

    pub fn peer_id(&self, address: &MacAddress) -> Option<PeerId> {
        self.read_registry().id_for(address)
    }

    /// All peers in id order.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.read_registry().iter().cloned().collect()
    }

    pub fn peer_count(&self, filter: PeerFilter) -> Result<usize> {
        self.read_registry().count(&self.transport, filter)
    }

    // Sending

    fn ensure_can_send(&self, operation: &'static str) -> Result<()> {
        if self.config.mode.can_send() {
            Ok(())
        } else {
            Err(NodeError::ModeUnsupported {
                mode: self.config.mode,
                operation,
            })
        }
    }

    fn resolve(&self, id: PeerId) -> Result<LinkPeer> {
        self.read_registry()
            .get(id)
            .map(PeerRecord::link_peer)
            .ok_or(NodeError::UnknownPeer(id))
    }

    /// Send one scalar to peer `id` and wait for the link's verdict.
    pub fn send<V: WireValue>(&self, id: PeerId, value: V) -> Result<()> {
        self.send_message(id, &Message::scalar(value))
    }

    pub fn send_array<V: WireValue>(&self, id: PeerId, values: &[V]) -> Result<()> {
        self.send_message(id, &Message::array(values)?)
    }

    pub fn send_text(&self, id: PeerId, text: &str) -> Result<()> {
        self.send_message(id, &Message::text(text)?)
    }

    pub fn send_record(&self, id: PeerId, record: &Record) -> Result<()> {
        self.send_message(id, &Message::record(record))
    }

    pub fn send_message(&self, id: PeerId, msg: &Message) -> Result<()> {
        self.ensure_can_send("send")?;
        self.coordinator
            .send(&self.transport, || self.resolve(id), msg)
    }

    /// Send `msg` to each id in turn. Every id gets its own result; unknown
    /// ids fail with [`NodeError::UnknownPeer`] without stopping the rest.
    pub fn send_group(&self, ids: &[PeerId], msg: &Message) -> Vec<(PeerId, Result<()>)> {
        ids.iter()
            .map(|&id| {
                let result = self.send_message(id, msg);
                if let Err(err) = &result {
                    tracing::warn!(id, error = %err, "group send failed for peer");
                }
                (id, result)
            })
            .collect()
    }

    /// Send `msg` to every station in range.
    pub fn broadcast(&self, msg: &Message) -> Result<()> {
        self.ensure_can_send("broadcast")?;
        self.coordinator.send(
            &self.transport,
            || Ok(LinkPeer::plain(MacAddress::BROADCAST)),
            msg,
        )
    }

    /// Like [`Node::send_message`], suspending instead of blocking while the
    /// completion is outstanding.
    #[cfg(feature = "async")]
    pub async fn send_message_async(&self, id: PeerId, msg: &Message) -> Result<()> {
        self.ensure_can_send("send")?;
        self.coordinator
            .send_async(&self.transport, || self.resolve(id), msg)
            .await
    }

    // Receiving

    /// Whether anything is waiting to be received.
    pub fn available(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of queued messages.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether the head is an array, or `None` when nothing is queued.
    pub fn peek_is_array(&self) -> Option<bool> {
        self.queue.peek_is_array()
    }

    pub fn peek_type(&self) -> Option<Tag> {
        self.queue.peek_tag()
    }

    /// Take the head as a scalar `V`.
    ///
    /// `Ok(None)` when nothing is queued. A head of another type is left in
    /// place and reported as a frame error.
    pub fn receive<V: WireValue>(&self) -> Result<Option<V>> {
        Ok(self.queue.pop_with(Message::value::<V>).transpose()?)
    }

    /// Copy the head array into `out`, returning the element count.
    pub fn receive_array<V: WireValue>(&self, out: &mut [V]) -> Result<Option<usize>> {
        Ok(self
            .queue
            .pop_with(|msg| msg.read_array(out))
            .transpose()?)
    }

    /// Take the head whatever it holds.
    pub fn receive_message(&self) -> Option<Message> {
        self.queue.pop()
    }

    pub fn receive_value(&self) -> Result<Option<Value>> {
        Ok(self.queue.pop_with(Message::to_value).transpose()?)
    }

    /// Discard everything queued, returning how many messages were dropped.
    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }
}

impl<T: RadioTransport> Drop for Node<T> {
    fn drop(&mut self) {
        self.transport.set_handler(None);
        self.write_registry().release(&self.transport);
        tracing::debug!(address = %self.transport.local_address(), "node stopped");
    }
}

impl<T: RadioTransport> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.transport.local_address())
            .field("config", &self.config)
            .field("peers", &self.read_registry().len())
            .field("queued", &self.queue.len())
            .field("send_state", &self.coordinator.state())
            .finish()
    }
}

fn apply_channel(transport: &dyn RadioTransport, channel: i32, issues: &IssueLog) {
    match Channel::new(channel) {
        None => issues.record(SetupIssue::ChannelOutOfRange { channel }),
        Some(channel) if channel.is_current() => {}
        Some(channel) => {
            if let Err(err) = transport.set_channel(channel) {
                issues.record(SetupIssue::ChannelSetup {
                    channel: channel.get(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn apply_encryption(transport: &dyn RadioTransport, shared_key: Option<&str>, issues: &IssueLog) {
    let Some(hex) = shared_key else {
        issues.record(SetupIssue::MissingSharedKey);
        return;
    };
    let applied = PeerKey::from_hex(hex).and_then(|key| transport.set_primary_key(&key));
    if let Err(err) = applied {
        issues.record(SetupIssue::EncryptionSetup {
            reason: err.to_string(),
        });
    }
}
