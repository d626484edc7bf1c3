//! Transport collaborator and an in-process loopback implementation.
//!
//! The core needs two channels from the transport: a per-tick snapshot
//! stream (owner writes, remotes read) and a reliable, all-peer event
//! broadcast that also delivers to the sender. [`LoopbackHub`] provides
//! both over `crossbeam-channel` queues, encoding every packet with the
//! same codecs a socket transport would use. Snapshot delivery can be made
//! lossy or duplicated with [`SnapshotFaults`]; events are always reliable.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::authority::PeerId;
use crate::events::EventEnvelope;
use crate::snapshot::{CodecError, SnapshotFrame};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The local endpoint is no longer registered with the hub.
    #[error("peer {0:?} is not connected")]
    Disconnected(PeerId),
    /// A packet could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Something the transport delivered to the local peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A snapshot from another peer.
    Snapshot(SnapshotFrame),
    /// An event from any peer, including this one.
    Event(EventEnvelope),
    /// A peer entered the session.
    PeerJoined(PeerId),
    /// A peer left the session.
    PeerLeft(PeerId),
}

/// Network transport collaborator.
pub trait Transport {
    /// The local peer's identity.
    fn local_peer(&self) -> PeerId;

    /// The local peer's display name.
    fn nickname(&self) -> &str;

    /// Changes the local peer's display name.
    fn set_nickname(&mut self, nickname: String);

    /// Sends a snapshot to every other peer.
    fn send_snapshot(&mut self, frame: &SnapshotFrame) -> Result<(), TransportError>;

    /// Delivers an event to every peer, this one included.
    fn broadcast_event(&mut self, envelope: &EventEnvelope) -> Result<(), TransportError>;

    /// Everything received since the last call, in arrival order.
    fn drain(&mut self) -> Vec<Inbound>;
}

// ---------------------------------------------------------------------------
// Loopback hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Packet {
    Snapshot(Vec<u8>),
    Event(Vec<u8>),
    Joined(PeerId),
    Left(PeerId),
}

/// Fault injection for snapshot delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotFaults {
    /// Probability that a snapshot is dropped for a given receiver.
    pub drop_rate: f32,
    /// Probability that a delivered snapshot arrives twice.
    pub duplicate_rate: f32,
    /// Probability that a snapshot is held back and delivered after the
    /// next one to the same receiver.
    pub reorder_rate: f32,
    /// RNG seed, so runs are reproducible.
    pub seed: u64,
}

impl Default for SnapshotFaults {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

/// In-process message hub connecting any number of peers.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    peers: Arc<DashMap<PeerId, Sender<Packet>>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Connects a peer with reliable snapshot delivery.
    pub fn join(&self, peer: PeerId, nickname: impl Into<String>) -> PeerEndpoint {
        self.join_with_faults(peer, nickname, SnapshotFaults::default())
    }

    /// Connects a peer whose outgoing snapshots are subject to `faults`.
    ///
    /// Existing peers are told about the newcomer and the newcomer is told
    /// about every existing peer.
    pub fn join_with_faults(
        &self,
        peer: PeerId,
        nickname: impl Into<String>,
        faults: SnapshotFaults,
    ) -> PeerEndpoint {
        let (tx, rx) = unbounded();
        for entry in self.peers.iter() {
            let _ = entry.value().send(Packet::Joined(peer));
            let _ = tx.send(Packet::Joined(*entry.key()));
        }
        self.peers.insert(peer, tx);
        tracing::info!(peer = peer.0, "peer joined loopback hub");

        PeerEndpoint {
            local: peer,
            nickname: nickname.into(),
            inbox: rx,
            peers: Arc::clone(&self.peers),
            faults,
            rng: StdRng::seed_from_u64(faults.seed),
            held: FxHashMap::default(),
        }
    }
}

/// One peer's connection to a [`LoopbackHub`]. Leaving the hub happens on
/// drop.
#[derive(Debug)]
pub struct PeerEndpoint {
    local: PeerId,
    nickname: String,
    inbox: Receiver<Packet>,
    peers: Arc<DashMap<PeerId, Sender<Packet>>>,
    faults: SnapshotFaults,
    rng: StdRng,
    held: FxHashMap<PeerId, Vec<u8>>,
}

impl PeerEndpoint {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.peers.contains_key(&self.local) {
            Ok(())
        } else {
            Err(TransportError::Disconnected(self.local))
        }
    }
}

impl Transport for PeerEndpoint {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn set_nickname(&mut self, nickname: String) {
        self.nickname = nickname;
    }

    fn send_snapshot(&mut self, frame: &SnapshotFrame) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let bytes = frame.encode()?;
        for entry in self.peers.iter() {
            let receiver = *entry.key();
            if receiver == self.local {
                continue;
            }
            if self.rng.random::<f32>() < self.faults.drop_rate {
                continue;
            }
            if !self.held.contains_key(&receiver)
                && self.rng.random::<f32>() < self.faults.reorder_rate
            {
                self.held.insert(receiver, bytes.clone());
                continue;
            }
            let copies = if self.rng.random::<f32>() < self.faults.duplicate_rate {
                2
            } else {
                1
            };
            for _ in 0..copies {
                let _ = entry.value().send(Packet::Snapshot(bytes.clone()));
            }
            if let Some(late) = self.held.remove(&receiver) {
                let _ = entry.value().send(Packet::Snapshot(late));
            }
        }
        Ok(())
    }

    fn broadcast_event(&mut self, envelope: &EventEnvelope) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let bytes = envelope.encode()?;
        for entry in self.peers.iter() {
            if entry.value().send(Packet::Event(bytes.clone())).is_err() {
                tracing::debug!(peer = entry.key().0, "event receiver gone");
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Vec<Inbound> {
        let mut inbound = Vec::new();
        for packet in self.inbox.try_iter() {
            let decoded = match packet {
                Packet::Snapshot(bytes) => SnapshotFrame::decode(&bytes).map(Inbound::Snapshot),
                Packet::Event(bytes) => EventEnvelope::decode(&bytes).map(Inbound::Event),
                Packet::Joined(peer) => Ok(Inbound::PeerJoined(peer)),
                Packet::Left(peer) => Ok(Inbound::PeerLeft(peer)),
            };
            match decoded {
                Ok(item) => inbound.push(item),
                Err(err) => tracing::warn!(peer = self.local.0, "dropping bad packet: {err}"),
            }
        }
        inbound
    }
}

impl Drop for PeerEndpoint {
    fn drop(&mut self) {
        self.peers.remove(&self.local);
        for entry in self.peers.iter() {
            let _ = entry.value().send(Packet::Left(self.local));
        }
        tracing::info!(peer = self.local.0, "peer left loopback hub");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::NetworkId;
    use crate::events::{Event, EventChannel};
    use crate::snapshot::StateSampler;
    use glam::Vec2;

    #[test]
    fn test_join_announces_both_ways() {
        let hub = LoopbackHub::new();
        let mut a = hub.join(PeerId(1), "a");
        let mut b = hub.join(PeerId(2), "b");
        assert_eq!(a.drain(), vec![Inbound::PeerJoined(PeerId(2))]);
        assert_eq!(b.drain(), vec![Inbound::PeerJoined(PeerId(1))]);
        assert_eq!(hub.peer_count(), 2);
    }

    #[test]
    fn test_event_reaches_sender_and_others_in_order() {
        let hub = LoopbackHub::new();
        let mut a = hub.join(PeerId(1), "a");
        let mut b = hub.join(PeerId(2), "b");
        a.drain();
        b.drain();

        let mut channel = EventChannel::new(PeerId(1));
        let target = NetworkId::compose(PeerId(1), 0);
        let first = channel.stamp(target, Event::Injured);
        let second = channel.stamp(target, Event::HealthChanged { health: 90 });
        a.broadcast_event(&first).unwrap();
        a.broadcast_event(&second).unwrap();

        let expected = vec![Inbound::Event(first), Inbound::Event(second)];
        assert_eq!(a.drain(), expected);
        assert_eq!(b.drain(), expected);
    }

    #[test]
    fn test_snapshot_skips_sender() {
        let hub = LoopbackHub::new();
        let mut a = hub.join(PeerId(1), "a");
        let mut b = hub.join(PeerId(2), "b");
        a.drain();
        b.drain();

        let mut sampler = StateSampler::new(PeerId(1), NetworkId::compose(PeerId(1), 0));
        let frame = sampler.sample(Vec2::new(1.0, 2.0), true).unwrap();
        a.send_snapshot(&frame).unwrap();

        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![Inbound::Snapshot(frame)]);
    }

    #[test]
    fn test_total_drop_rate_loses_every_snapshot() {
        let hub = LoopbackHub::new();
        let faults = SnapshotFaults {
            drop_rate: 1.0,
            ..SnapshotFaults::default()
        };
        let mut a = hub.join_with_faults(PeerId(1), "a", faults);
        let mut b = hub.join(PeerId(2), "b");
        b.drain();

        let mut sampler = StateSampler::new(PeerId(1), NetworkId::compose(PeerId(1), 0));
        for _ in 0..10 {
            let frame = sampler.sample(Vec2::ZERO, false).unwrap();
            a.send_snapshot(&frame).unwrap();
        }
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_duplicate_rate_doubles_snapshots() {
        let hub = LoopbackHub::new();
        let faults = SnapshotFaults {
            duplicate_rate: 1.0,
            ..SnapshotFaults::default()
        };
        let mut a = hub.join_with_faults(PeerId(1), "a", faults);
        let mut b = hub.join(PeerId(2), "b");
        b.drain();

        let mut sampler = StateSampler::new(PeerId(1), NetworkId::compose(PeerId(1), 0));
        a.send_snapshot(&sampler.sample(Vec2::ZERO, false).unwrap())
            .unwrap();
        assert_eq!(b.drain().len(), 2);
    }

    #[test]
    fn test_reorder_delivers_held_frame_after_next() {
        let hub = LoopbackHub::new();
        let faults = SnapshotFaults {
            reorder_rate: 1.0,
            ..SnapshotFaults::default()
        };
        let mut a = hub.join_with_faults(PeerId(1), "a", faults);
        let mut b = hub.join(PeerId(2), "b");
        b.drain();

        let mut sampler = StateSampler::new(PeerId(1), NetworkId::compose(PeerId(1), 0));
        let first = sampler.sample(Vec2::ZERO, false).unwrap();
        let second = sampler.sample(Vec2::ONE, false).unwrap();
        a.send_snapshot(&first).unwrap();
        assert!(b.drain().is_empty());
        a.send_snapshot(&second).unwrap();
        assert_eq!(
            b.drain(),
            vec![Inbound::Snapshot(second), Inbound::Snapshot(first)]
        );
    }

    #[test]
    fn test_set_nickname() {
        let hub = LoopbackHub::new();
        let mut a = hub.join(PeerId(1), "a");
        a.set_nickname("renamed".to_owned());
        assert_eq!(a.nickname(), "renamed");
    }

    #[test]
    fn test_drop_announces_departure() {
        let hub = LoopbackHub::new();
        let a = hub.join(PeerId(1), "a");
        let mut b = hub.join(PeerId(2), "b");
        b.drain();

        drop(a);
        assert_eq!(b.drain(), vec![Inbound::PeerLeft(PeerId(1))]);
        assert_eq!(hub.peer_count(), 1);
    }
}
