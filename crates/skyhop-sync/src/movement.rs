//! Owner-side movement: ground probe, smoothed horizontal velocity, jump,
//! and facing.
//!
//! Runs once per physics tick, only on the peer that owns the avatar. The
//! result is written to the body through the [`Physics`] collaborator and
//! is what the snapshot sampler later reads.

use glam::Vec2;
use skyhop_config::MovementConfig;

use crate::host::{BodyId, InputFrame, LayerMask, Physics};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Speed multiplier derived from health: `min(|health|, 100) / 100`.
///
/// Health is not floored, so at `health <= -100` this returns `1.0` and the
/// avatar moves at full speed again.
pub fn damping_factor(health: i32) -> f32 {
    (health.unsigned_abs().min(100) as f32 / 100.0).clamp(0.0, 1.0)
}

/// Critically damped spring toward `target` (smooth-damp).
///
/// `velocity` is the spring's rate of change and carries over between
/// calls. The result never overshoots `target`.
pub fn smooth_damp(
    current: f32,
    target: f32,
    velocity: &mut f32,
    smooth_time: f32,
    dt: f32,
) -> f32 {
    if dt <= 0.0 {
        return current;
    }
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * decay;
    let mut output = target + (change + temp) * decay;

    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = (output - target) / dt;
    }
    output
}

// ---------------------------------------------------------------------------
// MovementSimulator
// ---------------------------------------------------------------------------

/// What one physics tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementStep {
    /// Horizontal velocity the avatar is steering toward.
    pub target_speed: f32,
    /// Velocity written to the body.
    pub velocity: Vec2,
    /// Ground contact after the step.
    pub grounded: bool,
    /// Whether a jump was taken this tick.
    pub jumped: bool,
}

/// Owner-side movement state for one avatar.
#[derive(Debug, Clone)]
pub struct MovementSimulator {
    config: MovementConfig,
    horizontal: f32,
    jump_intent: bool,
    grounded: bool,
    facing_left: bool,
    damp_velocity: f32,
}

impl MovementSimulator {
    /// Creates a simulator with no pending input.
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            config: config.clone(),
            horizontal: 0.0,
            jump_intent: false,
            grounded: false,
            facing_left: false,
            damp_velocity: 0.0,
        }
    }

    /// Stores this frame's input for the next physics tick. A positive
    /// vertical axis latches a jump until the tick consumes it.
    pub fn latch_input(&mut self, input: &InputFrame) {
        self.horizontal = input.horizontal.clamp(-1.0, 1.0);
        if input.vertical > 0.0 {
            self.jump_intent = true;
        }
    }

    /// Whether the last ground probe found ground.
    pub fn grounded(&self) -> bool {
        self.grounded
    }

    /// Whether a jump is waiting for the next tick.
    pub fn jump_intent(&self) -> bool {
        self.jump_intent
    }

    /// Current facing.
    pub fn facing_left(&self) -> bool {
        self.facing_left
    }

    /// Clears spring state and pending input, e.g. after a respawn.
    pub fn reset(&mut self) {
        self.horizontal = 0.0;
        self.jump_intent = false;
        self.damp_velocity = 0.0;
    }

    /// Probes for ground beneath `body`, ignoring the body itself.
    pub fn probe_ground<P: Physics + ?Sized>(&self, physics: &P, body: BodyId) -> bool {
        let center = physics.position(body) + Vec2::from(self.config.ground_check_offset);
        physics
            .overlap_circle(
                center,
                self.config.ground_check_radius,
                LayerMask(self.config.ground_layers),
            )
            .into_iter()
            .any(|hit| hit != body)
    }

    /// Runs one physics tick.
    ///
    /// While `hurting`, horizontal input and jumps are ignored. The jump
    /// intent is cleared at the end of every tick, taken or not.
    pub fn step<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
        body: BodyId,
        hurting: bool,
        health: i32,
        dt: f32,
    ) -> MovementStep {
        self.grounded = self.probe_ground(physics, body);

        let factor = if hurting { 0.0 } else { damping_factor(health) };
        let target_speed = self.horizontal * self.config.speed * factor;

        let mut velocity = physics.velocity(body);
        velocity.x = smooth_damp(
            velocity.x,
            target_speed,
            &mut self.damp_velocity,
            self.config.smoothing_time,
            dt,
        );

        let jumped = self.jump_intent && self.grounded && !hurting;
        if jumped {
            velocity.y = self.config.jump_speed;
            self.grounded = false;
        }
        self.jump_intent = false;

        if target_speed < 0.0 {
            self.facing_left = true;
        } else if target_speed > 0.0 {
            self.facing_left = false;
        }

        physics.set_velocity(body, velocity);
        MovementStep {
            target_speed,
            velocity,
            grounded: self.grounded,
            jumped,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
