//! Remote-side reconciliation: converges a mirrored avatar's displayed
//! position onto the owner's latest snapshot.
//!
//! Small errors are blended away exponentially so jitter stays invisible.
//! Large errors (lost packets, respawns, teleports) snap instantly so the
//! avatar never slides across the level. Facing is applied as soon as a
//! snapshot is accepted, without smoothing.

use glam::Vec2;
use skyhop_config::ReconcileConfig;

use crate::snapshot::{StateSnapshot, sequence_is_newer};

// ---------------------------------------------------------------------------
// Correction
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// No snapshot has been accepted yet; the displayed position is left alone.
    Idle,
    /// Displayed position moved part of the way toward the target.
    Blend(Vec2),
    /// Displayed position jumped onto the target.
    Snap(Vec2),
}

impl Correction {
    /// The new displayed position, if the step produced one.
    pub fn position(self) -> Option<Vec2> {
        match self {
            Self::Idle => None,
            Self::Blend(p) | Self::Snap(p) => Some(p),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Latest-wins snapshot consumer for one mirrored avatar.
#[derive(Debug, Clone)]
pub struct Reconciler {
    target: Option<Vec2>,
    facing_left: bool,
    last_sequence: Option<u32>,
    snap_distance: f32,
    blend_rate: f32,
}

impl Reconciler {
    /// Creates an idle reconciler.
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            target: None,
            facing_left: false,
            last_sequence: None,
            snap_distance: config.snap_distance,
            blend_rate: config.blend_rate,
        }
    }

    /// Accepts a decoded snapshot. Returns `false` and leaves state
    /// untouched when `sequence` is not newer than the last accepted one.
    pub fn accept(&mut self, sequence: u32, snapshot: StateSnapshot) -> bool {
        if let Some(last) = self.last_sequence
            && !sequence_is_newer(sequence, last)
        {
            tracing::trace!(sequence, last, "stale snapshot dropped");
            return false;
        }
        self.last_sequence = Some(sequence);
        self.target = Some(snapshot.position);
        self.facing_left = snapshot.facing_left;
        true
    }

    /// Latest target position, `None` before the first snapshot.
    pub fn target(&self) -> Option<Vec2> {
        self.target
    }

    /// Facing from the latest snapshot.
    pub fn facing_left(&self) -> bool {
        self.facing_left
    }

    /// Blend factor for a step of `dt` seconds.
    pub fn blend_factor(&self, dt: f32) -> f32 {
        1.0 - (-self.blend_rate * dt).exp()
    }

    /// Computes the displayed position after `dt` seconds.
    pub fn step(&self, displayed: Vec2, dt: f32) -> Correction {
        let Some(target) = self.target else {
            return Correction::Idle;
        };
        if displayed.distance(target) >= self.snap_distance {
            Correction::Snap(target)
        } else {
            Correction::Blend(displayed.lerp(target, self.blend_factor(dt)))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
