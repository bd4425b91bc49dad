//! In-memory radio medium.
//!
//! Every [`LoopbackRadio`] attached to a [`LoopbackMedium`] behaves like a
//! station on a shared broadcast medium: frames reach stations tuned to the
//! same channel, and each station delivers its notifications from its own
//! notifier thread, never from the caller's thread.
//!
//! A unicast send completes only after the receiving station has run its
//! receive callback, which mirrors a link-layer acknowledgement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use bytes::Bytes;

use crate::address::{Channel, MacAddress, PeerKey};
use crate::error::{Result, TransportError};
use crate::traits::{LinkHandler, LinkPeer, PeerCounts, RadioTransport, MAX_DATA_LEN};

/// Default size of a station's peer table.
pub const DEFAULT_MAX_PEERS: usize = 20;

type HandlerSlot = Arc<RwLock<Option<Arc<dyn LinkHandler>>>>;

/// How a station reports the outcome of its own transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Report delivery or non-delivery.
    #[default]
    Report,
    /// Never report; the sender waits for a notification that never comes.
    Silent,
    /// Deliver the frame but always report failure.
    AlwaysFail,
}

impl CompletionMode {
    fn as_u8(self) -> u8 {
        match self {
            CompletionMode::Report => 0,
            CompletionMode::Silent => 1,
            CompletionMode::AlwaysFail => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CompletionMode::Silent,
            2 => CompletionMode::AlwaysFail,
            _ => CompletionMode::Report,
        }
    }
}

/// Station construction options.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackOptions {
    /// Initial radio channel.
    pub channel: u8,
    /// Peer table capacity.
    pub max_peers: usize,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            channel: 1,
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

struct Ack {
    to: mpsc::Sender<Event>,
    destination: MacAddress,
    success: bool,
}

enum Event {
    SendComplete {
        destination: MacAddress,
        success: bool,
    },
    Receive {
        source: MacAddress,
        data: Bytes,
        ack: Option<Ack>,
    },
    Shutdown,
}

#[derive(Clone)]
struct StationLink {
    channel: Arc<AtomicU8>,
    events: mpsc::Sender<Event>,
}

/// A shared in-memory medium that loopback stations attach to.
#[derive(Clone, Default)]
pub struct LoopbackMedium {
    stations: Arc<Mutex<HashMap<MacAddress, StationLink>>>,
}

impl LoopbackMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station with default options.
    pub fn station(&self, address: MacAddress) -> Result<Arc<LoopbackRadio>> {
        self.station_with(address, LoopbackOptions::default())
    }

    /// Attach a station with explicit options.
    pub fn station_with(
        &self,
        address: MacAddress,
        options: LoopbackOptions,
    ) -> Result<Arc<LoopbackRadio>> {
        let mut stations = self.stations.lock().unwrap_or_else(PoisonError::into_inner);
        if stations.contains_key(&address) {
            return Err(TransportError::AddressInUse(address));
        }

        let channel = Arc::new(AtomicU8::new(options.channel));
        let (events, inbox) = mpsc::channel();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));

        let worker_handler = handler.clone();
        let worker = std::thread::Builder::new()
            .name(format!("loopback-{address}"))
            .spawn(move || notifier_loop(inbox, worker_handler))
            .map_err(|_| TransportError::Shutdown)?;

        stations.insert(
            address,
            StationLink {
                channel: channel.clone(),
                events: events.clone(),
            },
        );
        tracing::debug!(%address, channel = options.channel, "loopback station attached");

        Ok(Arc::new(LoopbackRadio {
            address,
            stations: self.stations.clone(),
            channel,
            events,
            handler,
            peers: Mutex::new(HashMap::new()),
            primary_key: Mutex::new(None),
            max_peers: options.max_peers,
            completion: AtomicU8::new(CompletionMode::Report.as_u8()),
            transmitted: AtomicU64::new(0),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Number of stations currently attached.
    pub fn station_count(&self) -> usize {
        self.stations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn notifier_loop(inbox: mpsc::Receiver<Event>, handler: HandlerSlot) {
    while let Ok(event) = inbox.recv() {
        let current = handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match event {
            Event::SendComplete {
                destination,
                success,
            } => {
                if let Some(handler) = current {
                    handler.on_send_complete(&destination, success);
                }
            }
            Event::Receive { source, data, ack } => {
                if let Some(handler) = current {
                    handler.on_receive(&source, &data);
                }
                if let Some(ack) = ack {
                    let _ = ack.to.send(Event::SendComplete {
                        destination: ack.destination,
                        success: ack.success,
                    });
                }
            }
            Event::Shutdown => break,
        }
    }
}

/// One station on a [`LoopbackMedium`].
pub struct LoopbackRadio {
    address: MacAddress,
    stations: Arc<Mutex<HashMap<MacAddress, StationLink>>>,
    channel: Arc<AtomicU8>,
    events: mpsc::Sender<Event>,
    handler: HandlerSlot,
    peers: Mutex<HashMap<MacAddress, LinkPeer>>,
    primary_key: Mutex<Option<PeerKey>>,
    max_peers: usize,
    completion: AtomicU8,
    transmitted: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackRadio {
    /// Change how this station reports its own transmissions.
    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.completion.store(mode.as_u8(), Ordering::Release);
    }

    pub fn completion_mode(&self) -> CompletionMode {
        CompletionMode::from_u8(self.completion.load(Ordering::Acquire))
    }

    /// Deliver `data` to this station as if `source` had sent it.
    pub fn inject(&self, source: MacAddress, data: &[u8]) {
        let _ = self.events.send(Event::Receive {
            source,
            data: Bytes::copy_from_slice(data),
            ack: None,
        });
    }

    /// Frames accepted by `transmit` so far.
    pub fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    /// Whether a primary key has been installed.
    pub fn has_primary_key(&self) -> bool {
        self.primary_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Registered peer parameters for `address`, if any.
    pub fn peer(&self, address: &MacAddress) -> Option<LinkPeer> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    fn notify(&self, destination: MacAddress, success: bool) {
        let _ = self.events.send(Event::SendComplete {
            destination,
            success,
        });
    }
}

impl RadioTransport for LoopbackRadio {
    fn transmit(&self, destination: &MacAddress, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_DATA_LEN {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_DATA_LEN,
            });
        }
        if !self.peer_exists(destination) {
            return Err(TransportError::PeerNotFound(*destination));
        }

        let mode = self.completion_mode();
        let channel = self.channel.load(Ordering::Acquire);
        let data = Bytes::copy_from_slice(frame);
        self.transmitted.fetch_add(1, Ordering::Relaxed);

        let stations = self.stations.lock().unwrap_or_else(PoisonError::into_inner);
        let in_range = |link: &StationLink| link.channel.load(Ordering::Acquire) == channel;

        if destination.is_broadcast() {
            for (address, link) in stations.iter() {
                if *address != self.address && in_range(link) {
                    let _ = link.events.send(Event::Receive {
                        source: self.address,
                        data: data.clone(),
                        ack: None,
                    });
                }
            }
            drop(stations);
            match mode {
                CompletionMode::Report => self.notify(*destination, true),
                CompletionMode::AlwaysFail => self.notify(*destination, false),
                CompletionMode::Silent => {}
            }
            return Ok(());
        }

        let target = stations
            .get(destination)
            .filter(|link| in_range(link))
            .map(|link| link.events.clone());
        drop(stations);

        match target {
            Some(events) => {
                let ack = match mode {
                    CompletionMode::Silent => None,
                    CompletionMode::Report | CompletionMode::AlwaysFail => Some(Ack {
                        to: self.events.clone(),
                        destination: *destination,
                        success: mode == CompletionMode::Report,
                    }),
                };
                let _ = events.send(Event::Receive {
                    source: self.address,
                    data,
                    ack,
                });
                tracing::trace!(from = %self.address, to = %destination, "loopback frame delivered");
            }
            None => {
                tracing::trace!(from = %self.address, to = %destination, channel, "no station in range");
                if mode != CompletionMode::Silent {
                    self.notify(*destination, false);
                }
            }
        }
        Ok(())
    }

    fn register_peer(&self, peer: &LinkPeer) -> Result<()> {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        if peers.contains_key(&peer.address) {
            return Err(TransportError::PeerExists(peer.address));
        }
        if peers.len() >= self.max_peers {
            return Err(TransportError::PeerTableFull {
                max: self.max_peers,
            });
        }
        peers.insert(peer.address, peer.clone());
        Ok(())
    }

    fn unregister_peer(&self, address: &MacAddress) -> Result<()> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
            .map(|_| ())
            .ok_or(TransportError::PeerNotFound(*address))
    }

    fn peer_exists(&self, address: &MacAddress) -> bool {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    fn peer_counts(&self) -> Result<PeerCounts> {
        let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(PeerCounts {
            total: peers.len(),
            encrypted: peers.values().filter(|peer| peer.is_encrypted()).count(),
        })
    }

    fn current_channel(&self) -> Channel {
        Channel::new(i32::from(self.channel.load(Ordering::Acquire))).unwrap_or(Channel::CURRENT)
    }

    fn set_channel(&self, channel: Channel) -> Result<()> {
        self.channel.store(channel.get(), Ordering::Release);
        Ok(())
    }

    fn set_primary_key(&self, key: &PeerKey) -> Result<()> {
        *self
            .primary_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(())
    }

    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn set_handler(&self, handler: Option<Arc<dyn LinkHandler>>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

impl Drop for LoopbackRadio {
    fn drop(&mut self) {
        self.stations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.address);
        let _ = self.events.send(Event::Shutdown);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for LoopbackRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackRadio")
            .field("address", &self.address)
            .field("channel", &self.channel.load(Ordering::Relaxed))
            .field("completion", &self.completion_mode())
            .finish()
    }
}
