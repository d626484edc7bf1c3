//! One networked avatar.
//!
//! An avatar is either driven locally (its owner runs movement and samples
//! snapshots) or mirrored (a reconciler follows the owner's snapshots). The
//! role is fixed at spawn and selects exactly one driver, so a body's
//! transform has a single writer on every peer.

use std::time::Duration;

use glam::Vec2;
use skyhop_config::Config;

use crate::authority::{NetworkId, Ownership, PeerId, Role};
use crate::events::{Event, EventEnvelope};
use crate::health::HealthStateMachine;
use crate::host::{BodyId, BodyKind, InputFrame, Physics, Presenter};
use crate::movement::MovementSimulator;
use crate::reconciliation::{Correction, Reconciler};
use crate::snapshot::{CodecError, SnapshotFrame, StateSampler};

/// Vertical speed above which a mirrored avatar is shown as jumping.
const REMOTE_AIRBORNE_SPEED: f32 = 0.05;

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OwnerDriver {
    movement: MovementSimulator,
    sampler: StateSampler,
}

#[derive(Debug, Clone)]
enum Driver {
    Owner(OwnerDriver),
    Remote(Reconciler),
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// A replicated avatar as seen by one peer.
#[derive(Debug, Clone)]
pub struct Avatar {
    id: NetworkId,
    ownership: Ownership,
    body: BodyId,
    name: String,
    health: HealthStateMachine,
    driver: Driver,
    spawn_point: Vec2,
    fallout_y: f32,
    speed: f32,
    jumping: bool,
}

impl Avatar {
    /// Creates the avatar and its body at the configured spawn point.
    ///
    /// Owned avatars get a dynamic body; mirrored ones a kinematic body that
    /// only the reconciler moves.
    pub fn spawn<P: Physics + ?Sized>(
        id: NetworkId,
        ownership: Ownership,
        name: impl Into<String>,
        config: &Config,
        physics: &mut P,
    ) -> Self {
        let spawn_point = Vec2::from(config.world.spawn_point);
        let role = ownership.role();
        let kind = match role {
            Role::Owner => BodyKind::Dynamic,
            Role::Remote => BodyKind::Kinematic,
        };
        let body = physics.spawn_body(
            spawn_point,
            Vec2::from(config.movement.body_half_extents),
            kind,
        );
        let driver = match role {
            Role::Owner => Driver::Owner(OwnerDriver {
                movement: MovementSimulator::new(&config.movement),
                sampler: StateSampler::new(ownership.local(), id),
            }),
            Role::Remote => Driver::Remote(Reconciler::new(&config.reconcile)),
        };
        tracing::info!(
            entity = id.0,
            owner = ownership.owner().0,
            ?role,
            "avatar spawned"
        );

        Self {
            id,
            ownership,
            body,
            name: name.into(),
            health: HealthStateMachine::new(&config.health, role),
            driver,
            spawn_point,
            fallout_y: config.health.fallout_y,
            speed: 0.0,
            jumping: false,
        }
    }

    /// Removes the avatar's body.
    pub fn despawn<P: Physics + ?Sized>(self, physics: &mut P) {
        physics.despawn_body(self.body);
        tracing::info!(entity = self.id.0, "avatar despawned");
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn owner(&self) -> PeerId {
        self.ownership.owner()
    }

    pub fn role(&self) -> Role {
        self.ownership.role()
    }

    pub fn is_mine(&self) -> bool {
        self.ownership.is_mine()
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> &HealthStateMachine {
        &self.health
    }

    /// Sprite facing. Owners read it from movement, mirrors from the
    /// latest snapshot.
    pub fn facing_left(&self) -> bool {
        match &self.driver {
            Driver::Owner(owner) => owner.movement.facing_left(),
            Driver::Remote(reconciler) => reconciler.facing_left(),
        }
    }

    /// The mirror's reconciler, `None` on the owner.
    pub fn reconciler(&self) -> Option<&Reconciler> {
        match &self.driver {
            Driver::Owner(_) => None,
            Driver::Remote(reconciler) => Some(reconciler),
        }
    }

    /// Animator `speed` parameter.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Animator `isJumping` parameter.
    pub fn jumping(&self) -> bool {
        self.jumping
    }

    // --- Owner side ---

    /// Latches this frame's input. The respawn key yields a respawn to
    /// broadcast. Ignored on mirrors.
    pub fn latch_input(&mut self, input: &InputFrame) -> Option<Event> {
        let Driver::Owner(owner) = &mut self.driver else {
            return None;
        };
        owner.movement.latch_input(input);
        if input.respawn {
            return self.health.request_respawn();
        }
        None
    }

    /// Runs one physics tick before the world integrates.
    ///
    /// Advances the hurt window on every peer. On the owner, a body below
    /// the fallout height requests a respawn and movement writes the
    /// body's velocity.
    pub fn fixed_update<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
        dt: Duration,
    ) -> Option<Event> {
        self.health.advance(dt);
        let Driver::Owner(owner) = &mut self.driver else {
            return None;
        };

        let fallout = if physics.position(self.body).y < self.fallout_y {
            self.health.request_respawn()
        } else {
            None
        };

        let step = owner.movement.step(
            physics,
            self.body,
            self.health.is_hurting(),
            self.health.health(),
            dt.as_secs_f32(),
        );
        self.speed = step.velocity.x.abs();
        self.jumping = !step.grounded;
        fallout
    }

    /// A hazard touched this avatar's body.
    pub fn on_hazard_contact(&mut self) -> Option<Event> {
        let event = self.health.on_hazard_contact();
        if event.is_some() {
            tracing::debug!(entity = self.id.0, "hazard contact");
        }
        event
    }

    /// Samples the owner's state into a frame. `None` on mirrors.
    pub fn sample<P: Physics + ?Sized>(
        &mut self,
        physics: &P,
    ) -> Result<Option<SnapshotFrame>, CodecError> {
        let Driver::Owner(owner) = &mut self.driver else {
            return Ok(None);
        };
        let facing_left = owner.movement.facing_left();
        owner
            .sampler
            .sample(physics.position(self.body), facing_left)
            .map(Some)
    }

    // --- Mirror side ---

    /// Feeds a received frame to the reconciler. Returns whether it was
    /// accepted; the owner never accepts snapshots for its own avatar.
    pub fn apply_snapshot(&mut self, frame: &SnapshotFrame) -> Result<bool, CodecError> {
        let Driver::Remote(reconciler) = &mut self.driver else {
            return Ok(false);
        };
        let snapshot = frame.snapshot()?;
        Ok(reconciler.accept(frame.sequence, snapshot))
    }

    /// Moves a mirror's body toward its target for a frame of `dt`
    /// seconds. Does nothing on the owner or before the first snapshot.
    pub fn visual_update<P: Physics + ?Sized>(&mut self, physics: &mut P, dt: f32) -> Correction {
        let Driver::Remote(reconciler) = &self.driver else {
            return Correction::Idle;
        };
        let displayed = physics.position(self.body);
        let correction = reconciler.step(displayed, dt);
        if let Some(next) = correction.position() {
            physics.set_position(self.body, next);
            if dt > 0.0 {
                let moved = (next - displayed) / dt;
                self.speed = moved.x.abs();
                self.jumping = moved.y.abs() > REMOTE_AIRBORNE_SPEED;
            }
        }
        correction
    }

    // --- Events ---

    /// Applies a delivered event. Returns a follow-up event for the caller
    /// to broadcast.
    ///
    /// `NameChanged` and `HealthChanged` are only taken from the owner.
    /// `Injured` and `Respawned` may come from anyone; the health state
    /// machine decides what each peer may change.
    pub fn handle_event<P: Physics + ?Sized>(
        &mut self,
        envelope: &EventEnvelope,
        physics: &mut P,
    ) -> Option<Event> {
        let from_owner = envelope.sender == self.ownership.owner();
        match &envelope.event {
            Event::NameChanged { name } => {
                if from_owner {
                    name.clone_into(&mut self.name);
                } else {
                    tracing::debug!(
                        entity = self.id.0,
                        sender = envelope.sender.0,
                        "name change from non-owner ignored"
                    );
                }
                None
            }
            Event::Injured => self.health.apply_injured(),
            Event::Respawned => {
                let follow_up = self.health.apply_respawned();
                if let Driver::Owner(owner) = &mut self.driver {
                    physics.set_position(self.body, self.spawn_point);
                    physics.set_velocity(self.body, Vec2::ZERO);
                    owner.movement.reset();
                    tracing::info!(entity = self.id.0, "respawned at spawn point");
                }
                follow_up
            }
            Event::HealthChanged { health } => {
                if from_owner {
                    self.health.apply_health_changed(*health);
                } else {
                    tracing::debug!(
                        entity = self.id.0,
                        sender = envelope.sender.0,
                        "health change from non-owner ignored"
                    );
                }
                None
            }
        }
    }

    /// Writes the avatar's visual state to the presenter.
    pub fn present<R: Presenter + ?Sized>(&self, presenter: &mut R) {
        presenter.set_flip_x(self.id, self.facing_left());
        presenter.set_alpha(self.id, self.health.alpha());
        presenter.set_speed(self.id, self.speed);
        presenter.set_jumping(self.id, self.jumping);
        presenter.set_name_label(self.id, &self.name);
        presenter.set_health_label(self.id, &self.health.label());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
