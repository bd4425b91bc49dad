use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use nowmsg_transport::{
    Channel, InterfaceMode, LinkPeer, MacAddress, PeerCounts, PeerKey, RadioTransport,
};

use crate::config::RegistrationPolicy;
use crate::error::{NodeError, Result};
use crate::status::{IssueLog, SetupIssue};

/// Application-chosen peer identifier.
pub type PeerId = u32;

/// One registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: PeerId,
    pub address: MacAddress,
    pub channel: Channel,
    pub interface: InterfaceMode,
    pub key: Option<PeerKey>,
}

impl PeerRecord {
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    pub(crate) fn link_peer(&self) -> LinkPeer {
        LinkPeer {
            address: self.address,
            channel: self.channel,
            interface: self.interface,
            key: self.key.clone(),
        }
    }
}

/// Which peers a count covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerFilter {
    #[default]
    All,
    Encrypted,
    Plain,
}

impl PeerFilter {
    fn pick(self, counts: PeerCounts) -> usize {
        match self {
            PeerFilter::All => counts.total,
            PeerFilter::Encrypted => counts.encrypted,
            PeerFilter::Plain => counts.plain(),
        }
    }
}

/// Peers indexed by id and by address.
///
/// Mutated only by the application; the inbound path takes read access for
/// sender verification.
#[derive(Debug)]
pub struct PeerRegistry {
    policy: RegistrationPolicy,
    by_id: BTreeMap<PeerId, PeerRecord>,
    by_address: HashMap<MacAddress, PeerId>,
    issues: Arc<IssueLog>,
}

impl PeerRegistry {
    pub(crate) fn new(policy: RegistrationPolicy, issues: Arc<IssueLog>) -> Self {
        Self {
            policy,
            by_id: BTreeMap::new(),
            by_address: HashMap::new(),
            issues,
        }
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Add a peer.
    ///
    /// Under [`RegistrationPolicy::Persistent`] the peer is registered with
    /// the link before it is recorded, so a link failure leaves no record;
    /// it is returned and also logged as a setup error. A duplicate address
    /// is rejected and recorded as a setup warning.
    pub fn add(
        &mut self,
        transport: &dyn RadioTransport,
        id: PeerId,
        address: MacAddress,
        channel: i32,
        interface: InterfaceMode,
        key: Option<PeerKey>,
    ) -> Result<()> {
        let channel = Channel::new(channel).ok_or(NodeError::ChannelOutOfRange(channel))?;
        if self.by_id.contains_key(&id) {
            return Err(NodeError::DuplicateId(id));
        }

        let existing = self.by_address.get(&address).copied();
        let on_link = self.policy == RegistrationPolicy::Persistent
            && existing.is_none()
            && transport.peer_exists(&address);
        if existing.is_some() || on_link {
            self.issues
                .record(SetupIssue::DuplicateAddress { address, id });
            return Err(NodeError::DuplicateAddress { address, existing });
        }

        let record = PeerRecord {
            id,
            address,
            channel,
            interface,
            key,
        };

        if self.policy == RegistrationPolicy::Persistent {
            transport.register_peer(&record.link_peer()).map_err(|source| {
                self.issues.record(SetupIssue::PeerRegistration {
                    address,
                    reason: source.to_string(),
                });
                NodeError::PeerRegistration { address, source }
            })?;
        }

        tracing::debug!(
            id,
            %address,
            %channel,
            %interface,
            encrypted = record.is_encrypted(),
            "peer added"
        );
        self.by_address.insert(address, id);
        self.by_id.insert(id, record);
        Ok(())
    }

    /// Remove a peer. The local record is gone even when the link refuses to
    /// unregister it; that failure is still returned.
    pub fn remove(&mut self, transport: &dyn RadioTransport, id: PeerId) -> Result<PeerRecord> {
        let record = self.by_id.remove(&id).ok_or(NodeError::UnknownPeer(id))?;
        self.by_address.remove(&record.address);
        tracing::debug!(id, address = %record.address, "peer removed");

        if self.policy == RegistrationPolicy::Persistent {
            transport
                .unregister_peer(&record.address)
                .map_err(|source| NodeError::PeerDeregistration {
                    address: record.address,
                    source,
                })?;
        }
        Ok(record)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerRecord> {
        self.by_id.get(&id)
    }

    pub fn get_by_address(&self, address: &MacAddress) -> Option<&PeerRecord> {
        self.by_address
            .get(address)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn id_for(&self, address: &MacAddress) -> Option<PeerId> {
        self.by_address.get(address).copied()
    }

    pub fn contains_address(&self, address: &MacAddress) -> bool {
        self.by_address.contains_key(address)
    }

    /// Peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn local_counts(&self) -> PeerCounts {
        PeerCounts {
            total: self.by_id.len(),
            encrypted: self.iter().filter(|peer| peer.is_encrypted()).count(),
        }
    }

    /// Count peers.
    ///
    /// With persistent registration the link's own table is authoritative;
    /// if it disagrees with the local records a `CountMismatch` warning is
    /// recorded and the link's number wins. With ephemeral registration the
    /// link only holds peers mid-send, so the local records are used.
    pub fn count(&self, transport: &dyn RadioTransport, filter: PeerFilter) -> Result<usize> {
        let local = self.local_counts();
        if self.policy == RegistrationPolicy::Ephemeral {
            return Ok(filter.pick(local));
        }

        let reported = transport.peer_counts().map_err(|err| {
            self.issues.record(SetupIssue::PeerCountQuery {
                reason: err.to_string(),
            });
            NodeError::Transport(err)
        })?;
        if reported != local {
            self.issues.record(SetupIssue::CountMismatch {
                local: local.total,
                transport: reported.total,
            });
        }
        Ok(filter.pick(reported))
    }

    /// Unregister every persistent peer from the link and forget all records.
    pub(crate) fn release(&mut self, transport: &dyn RadioTransport) {
        let records = std::mem::take(&mut self.by_id);
        self.by_address.clear();
        if self.policy == RegistrationPolicy::Ephemeral {
            return;
        }
        for record in records.values() {
            if let Err(err) = transport.unregister_peer(&record.address) {
                tracing::debug!(address = %record.address, error = %err, "peer release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nowmsg_transport::{LoopbackMedium, LoopbackRadio};

    use super::*;

    const LOCAL: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);
    const PEER: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    const OTHER: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x02]);

    fn setup(policy: RegistrationPolicy) -> (Arc<LoopbackRadio>, PeerRegistry, Arc<IssueLog>) {
        let medium = LoopbackMedium::new();
        let radio = medium.station(LOCAL).unwrap();
        let issues = Arc::new(IssueLog::default());
        (radio, PeerRegistry::new(policy, issues.clone()), issues)
    }

    #[test]
    fn add_registers_with_link() {
        let (radio, mut registry, issues) = setup(RegistrationPolicy::Persistent);
        registry
            .add(&radio, 7, PEER, 6, InterfaceMode::Station, None)
            .unwrap();

        let record = registry.get(7).unwrap();
        assert_eq!(record.address, PEER);
        assert_eq!(record.channel.get(), 6);
        assert_eq!(registry.id_for(&PEER), Some(7));
        assert_eq!(registry.get_by_address(&PEER).map(|r| r.id), Some(7));
        assert!(radio.peer_exists(&PEER));
        assert_eq!(radio.peer(&PEER).unwrap().channel.get(), 6);
        assert!(issues.snapshot().is_ok());
    }

    #[test]
    fn channel_out_of_range_touches_nothing() {
        let (radio, mut registry, _) = setup(RegistrationPolicy::Persistent);
        for channel in [-1, 14] {
            assert!(matches!(
                registry.add(&radio, 1, PEER, channel, InterfaceMode::Station, None),
                Err(NodeError::ChannelOutOfRange(c)) if c == channel
            ));
        }
        assert!(registry.is_empty());
        assert!(!radio.peer_exists(&PEER));

        registry
            .add(&radio, 1, PEER, 13, InterfaceMode::Station, None)
            .unwrap();
        registry
            .add(&radio, 2, OTHER, 0, InterfaceMode::AccessPoint, None)
            .unwrap();
    }

    #[test]
    fn duplicate_id_keeps_one_record() {
        let (radio, mut registry, _) = setup(RegistrationPolicy::Persistent);
        registry
            .add(&radio, 7, PEER, 1, InterfaceMode::Station, None)
            .unwrap();
        assert!(matches!(
            registry.add(&radio, 7, OTHER, 1, InterfaceMode::Station, None),
            Err(NodeError::DuplicateId(7))
        ));
        assert_eq!(registry.len(), 1);
        assert!(!radio.peer_exists(&OTHER));
    }

    #[test]
    fn duplicate_address_is_recorded_warning() {
        let (radio, mut registry, issues) = setup(RegistrationPolicy::Persistent);
        registry
            .add(&radio, 1, PEER, 1, InterfaceMode::Station, None)
            .unwrap();
        assert!(matches!(
            registry.add(&radio, 2, PEER, 1, InterfaceMode::Station, None),
            Err(NodeError::DuplicateAddress {
                existing: Some(1),
                ..
            })
        ));

        let status = issues.snapshot();
        assert!(!status.has_errors());
        assert_eq!(
            status.warnings().next(),
            Some(&SetupIssue::DuplicateAddress { address: PEER, id: 2 })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn address_already_on_link_is_duplicate() {
        let (radio, mut registry, _) = setup(RegistrationPolicy::Persistent);
        radio.register_peer(&LinkPeer::plain(PEER)).unwrap();
        assert!(matches!(
            registry.add(&radio, 1, PEER, 1, InterfaceMode::Station, None),
            Err(NodeError::DuplicateAddress { existing: None, .. })
        ));
    }

    #[test]
    fn link_refusal_is_logged_but_not_recorded() {
        let medium = LoopbackMedium::new();
        let radio = medium
            .station_with(
                LOCAL,
                nowmsg_transport::LoopbackOptions {
                    max_peers: 0,
                    ..Default::default()
                },
            )
            .unwrap();
        let issues = Arc::new(IssueLog::default());
        let mut registry = PeerRegistry::new(RegistrationPolicy::Persistent, issues.clone());
        assert!(matches!(
            registry.add(&radio, 1, PEER, 1, InterfaceMode::Station, None),
            Err(NodeError::PeerRegistration { address, .. }) if address == PEER
        ));
        assert!(registry.get(1).is_none());

        let status = issues.snapshot();
        assert!(status.has_errors());
        assert!(matches!(
            status.errors().next(),
            Some(SetupIssue::PeerRegistration { address, .. }) if *address == PEER
        ));
    }

    #[test]
    fn remove_clears_local_even_when_link_fails() {
        let (radio, mut registry, _) = setup(RegistrationPolicy::Persistent);
        registry
            .add(&radio, 1, PEER, 1, InterfaceMode::Station, None)
            .unwrap();
        radio.unregister_peer(&PEER).unwrap();

        assert!(matches!(
            registry.remove(&radio, 1),
            Err(NodeError::PeerDeregistration { .. })
        ));
        assert!(registry.get(1).is_none());
        assert!(!registry.contains_address(&PEER));
        assert!(matches!(
            registry.remove(&radio, 1),
            Err(NodeError::UnknownPeer(1))
        ));
    }

    #[test]
    fn counts_follow_link() {
        let (radio, mut registry, issues) = setup(RegistrationPolicy::Persistent);
        registry
            .add(
                &radio,
                1,
                PEER,
                1,
                InterfaceMode::Station,
                Some(PeerKey::new([1; 16])),
            )
            .unwrap();
        registry
            .add(&radio, 2, OTHER, 1, InterfaceMode::Station, None)
            .unwrap();

        assert_eq!(registry.count(&radio, PeerFilter::All).unwrap(), 2);
        assert_eq!(registry.count(&radio, PeerFilter::Encrypted).unwrap(), 1);
        assert_eq!(registry.count(&radio, PeerFilter::Plain).unwrap(), 1);
        assert!(issues.snapshot().is_ok());

        radio
            .register_peer(&LinkPeer::plain(MacAddress::BROADCAST))
            .unwrap();
        assert_eq!(registry.count(&radio, PeerFilter::All).unwrap(), 3);
        assert_eq!(
            issues.snapshot().warnings().next(),
            Some(&SetupIssue::CountMismatch {
                local: 2,
                transport: 3
            })
        );
    }

    #[test]
    fn ephemeral_defers_link_registration() {
        let (radio, mut registry, issues) = setup(RegistrationPolicy::Ephemeral);
        registry
            .add(&radio, 1, PEER, 1, InterfaceMode::Station, None)
            .unwrap();
        assert!(!radio.peer_exists(&PEER));
        assert_eq!(registry.count(&radio, PeerFilter::All).unwrap(), 1);
        assert!(issues.snapshot().is_ok());

        registry.remove(&radio, 1).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn release_unregisters_all() {
        let (radio, mut registry, _) = setup(RegistrationPolicy::Persistent);
        registry
            .add(&radio, 1, PEER, 1, InterfaceMode::Station, None)
            .unwrap();
        registry
            .add(&radio, 2, OTHER, 1, InterfaceMode::Station, None)
            .unwrap();
        registry.release(&radio);
        assert!(registry.is_empty());
        assert_eq!(radio.peer_counts().unwrap().total, 0);
    }
}
