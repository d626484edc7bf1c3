//! Per-tick state snapshots: sampling on the owner and the fixed wire codec.
//!
//! A snapshot body carries exactly two fields, in order: the facing flag
//! and the position. There is no version byte and no length prefix; both
//! sides share the schema by construction. With postcard this is one byte
//! for the bool followed by two little-endian `f32`.
//!
//! The transport wraps each body in a [`SnapshotFrame`] that adds the
//! sender, the target entity and a wrapping sequence number so receivers
//! can discard stale or duplicated frames.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::authority::{NetworkId, PeerId};

/// Encoded size of a [`StateSnapshot`] body.
pub const SNAPSHOT_WIRE_SIZE: usize = 9;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the snapshot and event codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
    /// The bytes do not decode to the expected shape.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The payload decoded but left bytes unconsumed.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Decodes a complete postcard payload, rejecting leftover bytes.
pub(crate) fn decode_exact<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CodecError> {
    let (value, rest) =
        postcard::take_from_bytes::<T>(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes(rest.len()));
    }
    Ok(value)
}

/// Encodes a value with postcard.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// Physical state the owner publishes every network tick.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    /// `true` when the sprite faces left (is flipped).
    pub facing_left: bool,
    /// Body position in world units.
    #[serde(with = "vec2_wire")]
    pub position: Vec2,
}

impl StateSnapshot {
    /// Encodes the snapshot body.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    /// Decodes a snapshot body. Truncated input and trailing bytes are
    /// both errors.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_exact(bytes)
    }
}

/// `Vec2` as a bare `(f32, f32)` tuple, which postcard writes without a
/// length prefix.
mod vec2_wire {
    use glam::Vec2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec2, s: S) -> Result<S::Ok, S::Error> {
        (v.x, v.y).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec2, D::Error> {
        let (x, y) = <(f32, f32)>::deserialize(d)?;
        Ok(Vec2::new(x, y))
    }
}

// ---------------------------------------------------------------------------
// SnapshotFrame
// ---------------------------------------------------------------------------

/// A snapshot body addressed to one entity, as carried by the transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFrame {
    /// Peer that produced the snapshot.
    pub sender: PeerId,
    /// Entity the snapshot describes.
    pub entity: NetworkId,
    /// Per-entity wrapping sequence number.
    pub sequence: u32,
    /// Encoded [`StateSnapshot`].
    pub payload: Vec<u8>,
}

impl SnapshotFrame {
    /// Encodes the whole frame for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    /// Decodes a frame received from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_exact(bytes)
    }

    /// Decodes the snapshot body.
    pub fn snapshot(&self) -> Result<StateSnapshot, CodecError> {
        StateSnapshot::decode(&self.payload)
    }
}

/// Returns `true` if `candidate` is newer than `last` under wrapping `u32`
/// arithmetic.
pub fn sequence_is_newer(candidate: u32, last: u32) -> bool {
    let delta = candidate.wrapping_sub(last);
    delta != 0 && delta < u32::MAX / 2
}

// ---------------------------------------------------------------------------
// StateSampler
// ---------------------------------------------------------------------------

/// Samples the owner's state once per network tick and frames it.
#[derive(Debug, Clone)]
pub struct StateSampler {
    sender: PeerId,
    entity: NetworkId,
    next_sequence: u32,
}

impl StateSampler {
    /// Creates a sampler for one owned entity.
    pub fn new(sender: PeerId, entity: NetworkId) -> Self {
        Self {
            sender,
            entity,
            next_sequence: 0,
        }
    }

    /// Captures `position` and `facing_left` into a new frame.
    pub fn sample(
        &mut self,
        position: Vec2,
        facing_left: bool,
    ) -> Result<SnapshotFrame, CodecError> {
        let payload = StateSnapshot {
            facing_left,
            position,
        }
        .encode()?;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Ok(SnapshotFrame {
            sender: self.sender,
            entity: self.entity,
            sequence,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
