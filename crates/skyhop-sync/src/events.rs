//! Reliable all-peer events.
//!
//! Events are broadcast by whichever peer raises them and delivered to every
//! peer, the sender included. Delivery is FIFO per sender and unordered
//! relative to snapshots. Each [`EventEnvelope`] carries a per-sender
//! sequence number; [`EventChannel::admit`] uses it to drop envelopes that
//! were already seen, so a duplicated delivery never runs a handler twice.
//!
//! Handlers still check ownership before touching authoritative state. The
//! sequence filter only removes exact repeats.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::authority::{NetworkId, PeerId};
use crate::snapshot::{CodecError, decode_exact, encode};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A discrete state transition request or notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The avatar's display name changed.
    NameChanged {
        /// New display name.
        name: String,
    },
    /// Someone asks the owner to apply one injury.
    Injured,
    /// The avatar is reset to full health at the spawn point.
    Respawned,
    /// The owner committed a new health value.
    HealthChanged {
        /// Committed health.
        health: i32,
    },
}

impl Event {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NameChanged { .. } => "NameChanged",
            Self::Injured => "Injured",
            Self::Respawned => "Respawned",
            Self::HealthChanged { .. } => "HealthChanged",
        }
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// An event addressed to one entity, stamped by its sender.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Peer that raised the event.
    pub sender: PeerId,
    /// Per-sender sequence number, starting at 1.
    pub sequence: u64,
    /// Entity the event is about.
    pub target: NetworkId,
    /// The event itself.
    pub event: Event,
}

impl EventEnvelope {
    /// Encodes the envelope for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    /// Decodes an envelope received from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_exact(bytes)
    }
}

// ---------------------------------------------------------------------------
// EventChannel
// ---------------------------------------------------------------------------

/// Stamps outgoing events and filters repeated incoming ones for one peer.
#[derive(Debug)]
pub struct EventChannel {
    local: PeerId,
    next_sequence: u64,
    last_seen: FxHashMap<PeerId, u64>,
}

impl EventChannel {
    /// Creates a channel for the local peer.
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            next_sequence: 1,
            last_seen: FxHashMap::default(),
        }
    }

    /// Wraps `event` for broadcast.
    pub fn stamp(&mut self, target: NetworkId, event: Event) -> EventEnvelope {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        EventEnvelope {
            sender: self.local,
            sequence,
            target,
            event,
        }
    }

    /// Returns `true` if the envelope is new and should be handled.
    pub fn admit(&mut self, envelope: &EventEnvelope) -> bool {
        let last = self.last_seen.entry(envelope.sender).or_insert(0);
        if envelope.sequence <= *last {
            tracing::debug!(
                sender = envelope.sender.0,
                sequence = envelope.sequence,
                "duplicate {} dropped",
                envelope.event.name()
            );
            return false;
        }
        *last = envelope.sequence;
        true
    }

    /// Drops sequence state for a peer that left.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.last_seen.remove(&peer);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
