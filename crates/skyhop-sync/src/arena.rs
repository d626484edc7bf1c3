//! Minimal 2D physics world used by tests and the demo binary.
//!
//! Static colliders are axis-aligned boxes tagged with layers. Dynamic
//! bodies fall under gravity and land on top of ground boxes; there is no
//! side or ceiling resolution. Entering a non-ground collider reports a
//! [`Contact`] once until the body leaves it again.

use glam::Vec2;
use rustc_hash::FxHashSet;

use crate::host::{BodyId, BodyKind, Contact, LayerMask, Physics};

/// A static axis-aligned collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticBox {
    /// Collider handle.
    pub id: BodyId,
    /// Lower-left corner.
    pub min: Vec2,
    /// Upper-right corner.
    pub max: Vec2,
    /// Layers this collider sits on.
    pub layers: LayerMask,
}

impl StaticBox {
    fn overlaps_box(&self, center: Vec2, half: Vec2) -> bool {
        center.x + half.x > self.min.x
            && center.x - half.x < self.max.x
            && center.y + half.y > self.min.y
            && center.y - half.y < self.max.y
    }

    fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        center.clamp(self.min, self.max).distance_squared(center) <= radius * radius
    }
}

#[derive(Debug, Clone)]
struct ArenaBody {
    id: BodyId,
    position: Vec2,
    velocity: Vec2,
    half_extents: Vec2,
    kind: BodyKind,
}

/// In-memory physics world.
#[derive(Debug)]
pub struct ArenaPhysics {
    gravity: f32,
    next_id: u32,
    statics: Vec<StaticBox>,
    bodies: Vec<ArenaBody>,
    touching: FxHashSet<(BodyId, BodyId)>,
    contacts: Vec<Contact>,
}

impl ArenaPhysics {
    /// Creates an empty world with the given vertical gravity.
    pub fn new(gravity: f32) -> Self {
        Self {
            gravity,
            next_id: 0,
            statics: Vec::new(),
            bodies: Vec::new(),
            touching: FxHashSet::default(),
            contacts: Vec::new(),
        }
    }

    fn allocate(&mut self) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Adds a static box spanning `min`..`max`.
    pub fn add_static(&mut self, min: Vec2, max: Vec2, layers: LayerMask) -> BodyId {
        let id = self.allocate();
        self.statics.push(StaticBox {
            id,
            min,
            max,
            layers,
        });
        id
    }

    /// Adds walkable ground.
    pub fn add_ground(&mut self, min: Vec2, max: Vec2) -> BodyId {
        self.add_static(min, max, LayerMask::GROUND)
    }

    /// Adds a damaging region.
    pub fn add_hazard(&mut self, min: Vec2, max: Vec2) -> BodyId {
        self.add_static(min, max, LayerMask::HAZARD)
    }

    /// Number of live avatar bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn body(&self, id: BodyId) -> Option<&ArenaBody> {
        self.bodies.iter().find(|b| b.id == id)
    }

    fn body_mut(&mut self, id: BodyId) -> Option<&mut ArenaBody> {
        self.bodies.iter_mut().find(|b| b.id == id)
    }

    fn land(statics: &[StaticBox], body: &mut ArenaBody, previous_bottom: f32) {
        for ground in statics
            .iter()
            .filter(|s| s.layers.intersects(LayerMask::GROUND))
        {
            if body.velocity.y <= 0.0
                && previous_bottom >= ground.max.y - f32::EPSILON
                && ground.overlaps_box(body.position, body.half_extents)
            {
                body.position.y = ground.max.y + body.half_extents.y;
                body.velocity.y = 0.0;
            }
        }
    }

    fn detect_contacts(&mut self) {
        let mut now = FxHashSet::default();
        for body in &self.bodies {
            for collider in self
                .statics
                .iter()
                .filter(|s| !s.layers.intersects(LayerMask::GROUND))
            {
                if collider.overlaps_box(body.position, body.half_extents) {
                    now.insert((body.id, collider.id));
                    if !self.touching.contains(&(body.id, collider.id)) {
                        self.contacts.push(Contact {
                            body: body.id,
                            layers: collider.layers,
                        });
                    }
                }
            }
        }
        self.touching = now;
    }
}

impl Physics for ArenaPhysics {
    fn spawn_body(&mut self, position: Vec2, half_extents: Vec2, kind: BodyKind) -> BodyId {
        let id = self.allocate();
        self.bodies.push(ArenaBody {
            id,
            position,
            velocity: Vec2::ZERO,
            half_extents,
            kind,
        });
        id
    }

    fn despawn_body(&mut self, body: BodyId) {
        self.bodies.retain(|b| b.id != body);
        self.touching.retain(|(b, _)| *b != body);
    }

    fn overlap_circle(&self, center: Vec2, radius: f32, layers: LayerMask) -> Vec<BodyId> {
        let statics = self
            .statics
            .iter()
            .filter(|s| s.layers.intersects(layers) && s.overlaps_circle(center, radius))
            .map(|s| s.id);
        let bodies = self
            .bodies
            .iter()
            .filter(|b| {
                LayerMask::AVATARS.intersects(layers)
                    && StaticBox {
                        id: b.id,
                        min: b.position - b.half_extents,
                        max: b.position + b.half_extents,
                        layers: LayerMask::AVATARS,
                    }
                    .overlaps_circle(center, radius)
            })
            .map(|b| b.id);
        statics.chain(bodies).collect()
    }

    fn position(&self, body: BodyId) -> Vec2 {
        self.body(body).map_or(Vec2::ZERO, |b| b.position)
    }

    fn set_position(&mut self, body: BodyId, position: Vec2) {
        if let Some(b) = self.body_mut(body) {
            b.position = position;
        }
    }

    fn velocity(&self, body: BodyId) -> Vec2 {
        self.body(body).map_or(Vec2::ZERO, |b| b.velocity)
    }

    fn set_velocity(&mut self, body: BodyId, velocity: Vec2) {
        if let Some(b) = self.body_mut(body) {
            b.velocity = velocity;
        }
    }

    fn integrate(&mut self, dt: f32) {
        for body in self
            .bodies
            .iter_mut()
            .filter(|b| b.kind == BodyKind::Dynamic)
        {
            let previous_bottom = body.position.y - body.half_extents.y;
            body.velocity.y += self.gravity * dt;
            body.position += body.velocity * dt;
            Self::land(&self.statics, body, previous_bottom);
        }
        self.detect_contacts();
    }

    fn drain_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 50.0;
    const HALF: Vec2 = Vec2::new(0.25, 0.5);

    fn floor_world() -> ArenaPhysics {
        let mut world = ArenaPhysics::new(-9.81);
        world.add_ground(Vec2::new(-50.0, -1.0), Vec2::new(50.0, 0.0));
        world
    }

    #[test]
    fn test_body_lands_on_ground() {
        let mut world = floor_world();
        let body = world.spawn_body(Vec2::new(0.0, 3.0), HALF, BodyKind::Dynamic);
        for _ in 0..200 {
            world.integrate(DT);
        }
        assert!((world.position(body).y - 0.5).abs() < 1e-4);
        assert_eq!(world.velocity(body).y, 0.0);
    }

    #[test]
    fn test_kinematic_body_is_not_integrated() {
        let mut world = floor_world();
        let body = world.spawn_body(Vec2::new(0.0, 3.0), HALF, BodyKind::Kinematic);
        world.integrate(DT);
        assert_eq!(world.position(body), Vec2::new(0.0, 3.0));
    }

    #[test]
    fn test_overlap_circle_filters_layers() {
        let mut world = floor_world();
        world.add_hazard(Vec2::new(5.0, 0.0), Vec2::new(6.0, 0.2));
        let at_feet = world.overlap_circle(Vec2::new(0.0, 0.0), 0.075, LayerMask::GROUND);
        assert_eq!(at_feet.len(), 1);
        let over_hazard = world.overlap_circle(Vec2::new(5.5, 0.1), 0.075, LayerMask::GROUND);
        // The hazard is not ground; the floor below is out of reach.
        assert!(over_hazard.is_empty());
    }

    #[test]
    fn test_overlap_circle_reports_avatar_bodies() {
        let mut world = floor_world();
        let body = world.spawn_body(Vec2::new(0.0, 0.5), HALF, BodyKind::Dynamic);
        let hits = world.overlap_circle(
            Vec2::new(0.0, 0.0),
            0.075,
            LayerMask(LayerMask::GROUND.0 | LayerMask::AVATARS.0),
        );
        assert!(hits.contains(&body));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_hazard_contact_reported_once_per_entry() {
        let mut world = floor_world();
        world.add_hazard(Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.2));
        let body = world.spawn_body(Vec2::new(0.0, 0.5), HALF, BodyKind::Dynamic);

        world.set_position(body, Vec2::new(2.5, 0.5));
        world.integrate(DT);
        world.integrate(DT);
        let contacts = world.drain_contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].body, body);
        assert_eq!(contacts[0].layers, LayerMask::HAZARD);

        world.set_position(body, Vec2::new(10.0, 0.5));
        world.integrate(DT);
        world.set_position(body, Vec2::new(2.5, 0.5));
        world.integrate(DT);
        assert_eq!(world.drain_contacts().len(), 1);
    }

    #[test]
    fn test_despawned_body_reads_as_origin() {
        let mut world = floor_world();
        let body = world.spawn_body(Vec2::new(1.0, 1.0), HALF, BodyKind::Dynamic);
        world.despawn_body(body);
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.position(body), Vec2::ZERO);
    }
}
