use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nowmsg_frame::{decode_frame, Message};
use nowmsg_transport::{LinkHandler, MacAddress};
use serde::Serialize;

use crate::config::CommunicationMode;
use crate::coordinator::SendCoordinator;
use crate::queue::DeliveryQueue;
use crate::registry::PeerRegistry;

/// Counts of inbound frames by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InboundStats {
    pub accepted: u64,
    /// Dropped because the sender is not a registered peer.
    pub dropped_unverified: u64,
    /// Dropped because the frame did not decode.
    pub dropped_malformed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct InboundCounters {
    accepted: AtomicU64,
    dropped_unverified: AtomicU64,
    dropped_malformed: AtomicU64,
}

impl InboundCounters {
    pub(crate) fn snapshot(&self) -> InboundStats {
        InboundStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_unverified: self.dropped_unverified.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
        }
    }
}

/// Application hook for link activity.
///
/// Runs on the link's notification context once the node has handled the
/// event, so it must not block. Both methods default to doing nothing.
pub trait NodeObserver: Send + Sync {
    /// A send completion, after it was routed to the waiting send.
    fn on_send_complete(&self, _destination: &MacAddress, _success: bool) {}

    /// A frame that passed filtering and was queued.
    fn on_receive(&self, _source: &MacAddress, _msg: &Message) {}
}

#[derive(Default)]
pub(crate) struct ObserverSlot(RwLock<Option<Arc<dyn NodeObserver>>>);

impl ObserverSlot {
    pub(crate) fn set(&self, observer: Option<Arc<dyn NodeObserver>>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    fn get(&self) -> Option<Arc<dyn NodeObserver>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// The node's link handler: routes completions to the coordinator and
/// inbound frames, after filtering and decoding, to the delivery queue.
pub struct InboundDispatch {
    mode: CommunicationMode,
    verify_sender: bool,
    registry: Arc<RwLock<PeerRegistry>>,
    queue: Arc<DeliveryQueue>,
    coordinator: Arc<SendCoordinator>,
    counters: Arc<InboundCounters>,
    observer: Arc<ObserverSlot>,
}

impl InboundDispatch {
    pub(crate) fn new(
        mode: CommunicationMode,
        verify_sender: bool,
        registry: Arc<RwLock<PeerRegistry>>,
        queue: Arc<DeliveryQueue>,
        coordinator: Arc<SendCoordinator>,
        counters: Arc<InboundCounters>,
        observer: Arc<ObserverSlot>,
    ) -> Self {
        Self {
            mode,
            verify_sender,
            registry,
            queue,
            coordinator,
            counters,
            observer,
        }
    }

    fn is_known(&self, source: &MacAddress) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_address(source)
    }
}

impl LinkHandler for InboundDispatch {
    fn on_send_complete(&self, destination: &MacAddress, success: bool) {
        if self.mode.can_send() {
            self.coordinator.complete(destination, success);
        }
        if let Some(observer) = self.observer.get() {
            observer.on_send_complete(destination, success);
        }
    }

    fn on_receive(&self, source: &MacAddress, data: &[u8]) {
        if !self.mode.can_receive() {
            tracing::trace!(%source, "send-only node, frame ignored");
            return;
        }

        if self.verify_sender && !self.is_known(source) {
            self.counters
                .dropped_unverified
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%source, "frame from unregistered sender dropped");
            return;
        }

        match decode_frame(data) {
            Ok(msg) => {
                tracing::trace!(%source, tag = %msg.tag(), len = msg.len(), "frame queued");
                let observer = self.observer.get();
                let seen = observer.as_ref().map(|_| msg.clone());
                self.queue.push(msg);
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                if let (Some(observer), Some(msg)) = (observer, seen) {
                    observer.on_receive(source, &msg);
                }
            }
            Err(err) => {
                self.counters
                    .dropped_malformed
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%source, error = %err, len = data.len(), "malformed frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use nowmsg_transport::{InterfaceMode, LoopbackMedium};

    use super::*;
    use crate::config::RegistrationPolicy;
    use crate::status::IssueLog;

    const KNOWN: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0A]);
    const STRANGER: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0F]);

    struct Fixture {
        dispatch: InboundDispatch,
        queue: Arc<DeliveryQueue>,
        counters: Arc<InboundCounters>,
        observer: Arc<ObserverSlot>,
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(MacAddress, bool)>>,
        received: Mutex<Vec<(MacAddress, Message)>>,
    }

    impl NodeObserver for Recorder {
        fn on_send_complete(&self, destination: &MacAddress, success: bool) {
            self.sent.lock().unwrap().push((*destination, success));
        }

        fn on_receive(&self, source: &MacAddress, msg: &Message) {
            self.received.lock().unwrap().push((*source, msg.clone()));
        }
    }

    fn fixture(mode: CommunicationMode, verify_sender: bool) -> Fixture {
        let medium = LoopbackMedium::new();
        let radio = medium
            .station(MacAddress::new([0x02, 0, 0, 0, 0, 0x01]))
            .unwrap();
        let mut registry = PeerRegistry::new(
            RegistrationPolicy::Persistent,
            Arc::new(IssueLog::default()),
        );
        registry
            .add(&radio, 1, KNOWN, 0, InterfaceMode::Station, None)
            .unwrap();

        let queue = Arc::new(DeliveryQueue::new());
        let counters = Arc::new(InboundCounters::default());
        let observer = Arc::new(ObserverSlot::default());
        let dispatch = InboundDispatch::new(
            mode,
            verify_sender,
            Arc::new(RwLock::new(registry)),
            queue.clone(),
            Arc::new(SendCoordinator::new(Duration::from_millis(10))),
            counters.clone(),
            observer.clone(),
        );
        Fixture {
            dispatch,
            queue,
            counters,
            observer,
        }
    }

    fn frame(value: i32) -> Vec<u8> {
        Message::scalar(value).to_bytes().to_vec()
    }

    #[test]
    fn without_verification_everyone_is_accepted() {
        let f = fixture(CommunicationMode::TwoWay, false);
        f.dispatch.on_receive(&KNOWN, &frame(1));
        f.dispatch.on_receive(&STRANGER, &frame(2));
        assert_eq!(f.queue.len(), 2);
        assert_eq!(f.counters.snapshot().accepted, 2);
    }

    #[test]
    fn verification_drops_unknown_senders() {
        let f = fixture(CommunicationMode::TwoWay, true);
        f.dispatch.on_receive(&STRANGER, &frame(2));
        f.dispatch.on_receive(&KNOWN, &frame(1));

        assert_eq!(f.queue.len(), 1);
        assert_eq!(f.queue.pop().unwrap().value::<i32>(), Ok(1));
        assert_eq!(
            f.counters.snapshot(),
            InboundStats {
                accepted: 1,
                dropped_unverified: 1,
                dropped_malformed: 0
            }
        );
    }

    #[test]
    fn malformed_frames_are_counted() {
        let f = fixture(CommunicationMode::TwoWay, false);
        f.dispatch.on_receive(&KNOWN, b"not a frame");
        let mut bad_magic = frame(1);
        bad_magic[0] = 0;
        f.dispatch.on_receive(&KNOWN, &bad_magic);

        assert!(f.queue.is_empty());
        assert_eq!(f.counters.snapshot().dropped_malformed, 2);
    }

    #[test]
    fn send_only_node_ignores_frames() {
        let f = fixture(CommunicationMode::Sender, false);
        f.dispatch.on_receive(&KNOWN, &frame(1));
        assert!(f.queue.is_empty());
        assert_eq!(f.counters.snapshot(), InboundStats::default());
    }

    #[test]
    fn observer_sees_only_accepted_frames() {
        let f = fixture(CommunicationMode::TwoWay, true);
        let recorder = Arc::new(Recorder::default());
        f.observer.set(Some(recorder.clone()));

        f.dispatch.on_receive(&STRANGER, &frame(1));
        f.dispatch.on_receive(&KNOWN, b"junk");
        f.dispatch.on_receive(&KNOWN, &frame(2));

        let received = recorder.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, KNOWN);
        assert_eq!(received[0].1.value::<i32>(), Ok(2));
        assert_eq!(f.queue.len(), 1);
    }

    #[test]
    fn observer_sees_completions_after_routing() {
        let f = fixture(CommunicationMode::TwoWay, false);
        let recorder = Arc::new(Recorder::default());
        f.observer.set(Some(recorder.clone()));

        f.dispatch.on_send_complete(&KNOWN, false);
        assert_eq!(*recorder.sent.lock().unwrap(), vec![(KNOWN, false)]);

        f.observer.set(None);
        f.dispatch.on_send_complete(&KNOWN, true);
        f.dispatch.on_receive(&KNOWN, &frame(3));
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        assert!(recorder.received.lock().unwrap().is_empty());
    }
}
