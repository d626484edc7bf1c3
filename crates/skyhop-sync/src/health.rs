//! Health, hurt window and respawn state for one avatar.
//!
//! Health is owner-authoritative: every peer may *request* an injury by
//! broadcasting [`Event::Injured`], but only the owner's own delivery
//! commits damage. The owner then broadcasts [`Event::HealthChanged`] so all
//! peers can display the new value.
//!
//! Health is a signed integer and, unless [`HealthConfig::clamp_floor`] is
//! set, has no floor. Movement damping uses `min(|health|, 100) / 100`, so a
//! sufficiently negative health gives back full speed. That quirk is kept
//! as the default and is pinned by tests.

use std::time::Duration;

use skyhop_config::HealthConfig;

use crate::authority::{Authoritative, Role};
use crate::events::Event;

// ---------------------------------------------------------------------------
// HurtWindow
// ---------------------------------------------------------------------------

/// Timed blink sequence that runs after an injury.
///
/// Advanced once per physics tick. [`HurtWindow::reset`] ends it instantly,
/// which is how a respawn cancels it.
#[derive(Debug, Clone)]
pub struct HurtWindow {
    elapsed: Duration,
    step: Duration,
    steps: u32,
    active: bool,
}

impl HurtWindow {
    /// Creates an inactive window of `steps` blink steps of length `step`.
    pub fn new(step: Duration, steps: u32) -> Self {
        Self {
            elapsed: Duration::ZERO,
            step,
            steps,
            active: false,
        }
    }

    /// Starts the window. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = self.steps > 0 && !self.step.is_zero();
        self.elapsed = Duration::ZERO;
        self.active
    }

    /// Advances by `dt`, closing the window once its full length elapsed.
    pub fn advance(&mut self, dt: Duration) {
        if !self.active {
            return;
        }
        self.elapsed += dt;
        if self.elapsed >= self.duration() {
            self.reset();
        }
    }

    /// Ends the window immediately.
    pub fn reset(&mut self) {
        self.active = false;
        self.elapsed = Duration::ZERO;
    }

    /// Returns `true` while the window is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Full length of the window.
    pub fn duration(&self) -> Duration {
        self.step * self.steps
    }

    /// Time left before the window closes.
    pub fn remaining(&self) -> Duration {
        if self.active {
            self.duration().saturating_sub(self.elapsed)
        } else {
            Duration::ZERO
        }
    }

    /// Sprite alpha for the current blink step: `dim` on even steps,
    /// opaque on odd steps and when inactive.
    pub fn alpha(&self, dim: f32) -> f32 {
        if !self.active {
            return 1.0;
        }
        let index = self.elapsed.as_nanos() / self.step.as_nanos();
        if index % 2 == 0 { dim } else { 1.0 }
    }
}

// ---------------------------------------------------------------------------
// HealthStateMachine
// ---------------------------------------------------------------------------

/// Coarse health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthPhase {
    /// Accepting input and hazard contacts.
    Normal,
    /// Inside the hurt window: input suppressed, hazards ignored.
    Hurting,
}

/// Per-avatar health state.
#[derive(Debug, Clone)]
pub struct HealthStateMachine {
    health: Authoritative<i32>,
    displayed: i32,
    hurt: HurtWindow,
    respawn_pending: bool,
    config: HealthConfig,
}

impl HealthStateMachine {
    /// Creates full-health state for a peer with the given role.
    pub fn new(config: &HealthConfig, role: Role) -> Self {
        Self {
            health: Authoritative::new(config.max_health, role),
            displayed: config.max_health,
            hurt: HurtWindow::new(config.blink_interval(), config.blink_steps),
            respawn_pending: false,
            config: config.clone(),
        }
    }

    /// Authoritative health. On remote peers this never changes.
    pub fn health(&self) -> i32 {
        self.health.value()
    }

    /// Health last announced by the owner, shown in the label.
    pub fn displayed_health(&self) -> i32 {
        self.displayed
    }

    /// Current phase.
    pub fn phase(&self) -> HealthPhase {
        if self.hurt.is_active() {
            HealthPhase::Hurting
        } else {
            HealthPhase::Normal
        }
    }

    /// Returns `true` while the hurt window runs.
    pub fn is_hurting(&self) -> bool {
        self.hurt.is_active()
    }

    /// The blink timer.
    pub fn hurt_window(&self) -> &HurtWindow {
        &self.hurt
    }

    /// Returns `true` between raising a respawn and receiving it back.
    pub fn respawn_pending(&self) -> bool {
        self.respawn_pending
    }

    /// Sprite alpha for the current blink step.
    pub fn alpha(&self) -> f32 {
        self.hurt.alpha(self.config.blink_alpha)
    }

    /// Text for the health label.
    pub fn label(&self) -> String {
        format!("{} Health", self.displayed)
    }

    /// Advances the hurt window by one tick.
    pub fn advance(&mut self, dt: Duration) {
        self.hurt.advance(dt);
    }

    /// Hazard contact on the local body. On the owner in the normal phase
    /// this starts the hurt window and returns the injury to broadcast.
    pub fn on_hazard_contact(&mut self) -> Option<Event> {
        if self.health.role() != Role::Owner || self.hurt.is_active() {
            return None;
        }
        self.hurt.start();
        tracing::debug!(
            window_ms = self.config.hurt_duration().as_millis() as u64,
            "hurt window started"
        );
        Some(Event::Injured)
    }

    /// Fallout or respawn input on the owner. Returns the respawn to
    /// broadcast unless one is already in flight.
    pub fn request_respawn(&mut self) -> Option<Event> {
        if self.health.role() != Role::Owner || self.respawn_pending {
            return None;
        }
        self.respawn_pending = true;
        Some(Event::Respawned)
    }

    /// Handles a delivered [`Event::Injured`].
    ///
    /// Every peer starts the blink. Only the owner commits damage, in which
    /// case the resulting [`Event::HealthChanged`] is returned.
    pub fn apply_injured(&mut self) -> Option<Event> {
        if !self.hurt.start() {
            tracing::trace!(
                remaining_ms = self.hurt.remaining().as_millis() as u64,
                "injury inside a running hurt window"
            );
        }
        let damage = self.config.injury_damage;
        let clamp_floor = self.config.clamp_floor;
        let health = self.health.commit(|h| {
            *h = h.saturating_sub(damage);
            if clamp_floor {
                *h = (*h).max(0);
            }
            *h
        })?;
        Some(Event::HealthChanged { health })
    }

    /// Handles a delivered [`Event::Respawned`]: hard-resets the hurt
    /// window everywhere and, on the owner, restores full health.
    pub fn apply_respawned(&mut self) -> Option<Event> {
        self.hurt.reset();
        let max = self.config.max_health;
        let health = self.health.commit(|h| {
            *h = max;
            *h
        })?;
        self.respawn_pending = false;
        Some(Event::HealthChanged { health })
    }

    /// Handles a delivered [`Event::HealthChanged`]. Only the displayed
    /// value changes.
    pub fn apply_health_changed(&mut self, health: i32) {
        self.displayed = health;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
