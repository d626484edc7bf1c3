//! Interfaces to the engine-side collaborators: physics, input and
//! presentation.
//!
//! The core never integrates bodies, polls devices or draws anything
//! itself. It talks to the host engine only through these traits. The
//! transport collaborator lives in [`crate::transport`].

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::authority::NetworkId;

// ---------------------------------------------------------------------------
// Physics
// ---------------------------------------------------------------------------

/// Handle to a body or static collider in the host's physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

/// Bit set of collision layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Walkable level geometry.
    pub const GROUND: Self = Self(1);
    /// Damaging regions.
    pub const HAZARD: Self = Self(1 << 1);
    /// Avatar bodies.
    pub const AVATARS: Self = Self(1 << 2);

    /// Returns `true` if the two masks share a bit.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Integrated by the physics world (owned avatars).
    Dynamic,
    /// Positioned externally (mirrored avatars).
    Kinematic,
}

/// A new contact between a body and a static collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    /// The body that touched something.
    pub body: BodyId,
    /// Layers of the collider it touched.
    pub layers: LayerMask,
}

/// Physics collaborator.
pub trait Physics {
    /// Creates an avatar body at `position`.
    fn spawn_body(&mut self, position: Vec2, half_extents: Vec2, kind: BodyKind) -> BodyId;

    /// Removes a body. Unknown ids are ignored.
    fn despawn_body(&mut self, body: BodyId);

    /// Colliders on `layers` overlapping the given circle.
    fn overlap_circle(&self, center: Vec2, radius: f32, layers: LayerMask) -> Vec<BodyId>;

    /// Body position.
    fn position(&self, body: BodyId) -> Vec2;

    /// Moves a body, bypassing integration.
    fn set_position(&mut self, body: BodyId, position: Vec2);

    /// Body velocity.
    fn velocity(&self, body: BodyId) -> Vec2;

    /// Overwrites a body's velocity.
    fn set_velocity(&mut self, body: BodyId, velocity: Vec2);

    /// Integrates dynamic bodies over `dt` seconds.
    fn integrate(&mut self, dt: f32);

    /// Contacts that began since the last call.
    fn drain_contacts(&mut self) -> Vec<Contact>;
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Input polled for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    /// Horizontal axis in [-1, 1].
    pub horizontal: f32,
    /// Vertical axis in [-1, 1]; positive means jump.
    pub vertical: f32,
    /// Explicit respawn key.
    pub respawn: bool,
}

/// Input collaborator.
pub trait InputSource {
    /// Polls the devices for this frame.
    fn poll(&mut self) -> InputFrame;
}

/// Input that replays a fixed sequence of frames, then repeats the last.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    frames: Vec<InputFrame>,
    cursor: usize,
}

impl ScriptedInput {
    /// Creates a script from per-frame input.
    pub fn new(frames: Vec<InputFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Appends `count` copies of `frame`.
    pub fn hold(mut self, frame: InputFrame, count: usize) -> Self {
        self.frames.extend(std::iter::repeat_n(frame, count));
        self
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> InputFrame {
        let frame = self
            .frames
            .get(self.cursor)
            .or_else(|| self.frames.last())
            .copied()
            .unwrap_or_default();
        self.cursor += 1;
        frame
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Rendering collaborator. Write-only from the core's point of view.
pub trait Presenter {
    /// Mirrors the sprite horizontally.
    fn set_flip_x(&mut self, entity: NetworkId, flip: bool);
    /// Sprite opacity.
    fn set_alpha(&mut self, entity: NetworkId, alpha: f32);
    /// Animator `speed` parameter.
    fn set_speed(&mut self, entity: NetworkId, speed: f32);
    /// Animator `isJumping` parameter.
    fn set_jumping(&mut self, entity: NetworkId, jumping: bool);
    /// Name label above the avatar.
    fn set_name_label(&mut self, entity: NetworkId, name: &str);
    /// Health label above the avatar.
    fn set_health_label(&mut self, entity: NetworkId, text: &str);
}

/// Everything last written for one entity by a [`RecordingPresenter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresentedState {
    pub flip_x: bool,
    pub alpha: f32,
    pub speed: f32,
    pub jumping: bool,
    pub name_label: String,
    pub health_label: String,
}

/// Presenter that records the latest values per entity.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    entities: FxHashMap<NetworkId, PresentedState>,
}

impl RecordingPresenter {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest state written for `entity`.
    pub fn get(&self, entity: NetworkId) -> Option<&PresentedState> {
        self.entities.get(&entity)
    }

    fn entry(&mut self, entity: NetworkId) -> &mut PresentedState {
        self.entities.entry(entity).or_default()
    }
}

impl Presenter for RecordingPresenter {
    fn set_flip_x(&mut self, entity: NetworkId, flip: bool) {
        self.entry(entity).flip_x = flip;
    }

    fn set_alpha(&mut self, entity: NetworkId, alpha: f32) {
        self.entry(entity).alpha = alpha;
    }

    fn set_speed(&mut self, entity: NetworkId, speed: f32) {
        self.entry(entity).speed = speed;
    }

    fn set_jumping(&mut self, entity: NetworkId, jumping: bool) {
        self.entry(entity).jumping = jumping;
    }

    fn set_name_label(&mut self, entity: NetworkId, name: &str) {
        name.clone_into(&mut self.entry(entity).name_label);
    }

    fn set_health_label(&mut self, entity: NetworkId, text: &str) {
        text.clone_into(&mut self.entry(entity).health_label);
    }
}
