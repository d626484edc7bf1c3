//! Unit tests for the per-peer session.

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use glam::Vec2;

use crate::arena::ArenaPhysics;
use crate::host::RecordingPresenter;
use crate::snapshot::StateSampler;
use crate::transport::{LoopbackHub, PeerEndpoint};

const FRAME: Duration = Duration::from_millis(20);
const ALICE: PeerId = PeerId(1);
const BOB: PeerId = PeerId(2);
const CAROL: PeerId = PeerId(3);

/// Helper: floor across the level and a hazard strip at x = 3..4.
fn level() -> ArenaPhysics {
    let mut world = ArenaPhysics::new(-9.81);
    world.add_ground(Vec2::new(-50.0, -1.0), Vec2::new(50.0, 0.0));
    world.add_hazard(Vec2::new(3.0, 0.0), Vec2::new(4.0, 0.2));
    world
}

struct Peer {
    session: PeerSession<PeerEndpoint>,
    world: ArenaPhysics,
}

impl Peer {
    fn join(hub: &LoopbackHub, id: PeerId, nickname: &str) -> Self {
        Self {
            session: PeerSession::new(hub.join(id, nickname), Config::default()),
            world: level(),
        }
    }

    fn frame(&mut self, input: InputFrame) -> FrameStats {
        self.session.frame(&mut self.world, &input, FRAME).unwrap()
    }

    fn idle(&mut self, frames: usize) {
        for _ in 0..frames {
            self.frame(InputFrame::default());
        }
    }

    fn presented(&self, id: NetworkId) -> crate::host::PresentedState {
        let mut presenter = RecordingPresenter::new();
        self.session.present(&mut presenter);
        presenter.get(id).cloned().unwrap()
    }
}

/// Helper: run every peer for `frames` idle frames, interleaved.
fn run(peers: &mut [&mut Peer], frames: usize) {
    for _ in 0..frames {
        for peer in peers.iter_mut() {
            peer.frame(InputFrame::default());
        }
    }
}

fn pair() -> (Peer, Peer, NetworkId) {
    let hub = LoopbackHub::new();
    let mut alice = Peer::join(&hub, ALICE, "alice");
    let bob = Peer::join(&hub, BOB, "bob");
    let id = alice.session.spawn_local(&mut alice.world).unwrap();
    (alice, bob, id)
}

#[test]
fn test_spawn_announces_name_to_remote() {
    let (mut alice, mut bob, id) = pair();
    run(&mut [&mut alice, &mut bob], 1);

    let mirror = bob.session.avatar(id).unwrap();
    assert_eq!(mirror.name(), "alice");
    assert!(!mirror.is_mine());
    assert_eq!(mirror.owner(), ALICE);
    assert_eq!(alice.session.avatar(id).unwrap().name(), "alice");
}

#[test]
fn test_local_ids_are_composed_from_peer() {
    let (mut alice, _bob, first) = pair();
    let second = alice.session.spawn_local(&mut alice.world).unwrap();
    assert_eq!(first.allocated_by(), ALICE);
    assert_eq!(first.index(), 0);
    assert_eq!(second.index(), 1);
    assert_eq!(alice.session.owned().count(), 2);
}

#[test]
fn test_hazard_contact_updates_every_label() {
    let (mut alice, mut bob, id) = pair();
    let body = alice.session.avatar(id).unwrap().body();
    alice.world.set_position(body, Vec2::new(3.5, 0.5));

    run(&mut [&mut alice, &mut bob], 4);

    assert_eq!(alice.session.avatar(id).unwrap().health().health(), 90);
    assert_eq!(alice.presented(id).health_label, "90 Health");
    assert_eq!(bob.presented(id).health_label, "90 Health");
    // The mirror's authoritative field never moves.
    assert_eq!(bob.session.avatar(id).unwrap().health().health(), 100);
}

#[test]
fn test_hurt_window_blocks_input_for_one_second() {
    let (mut alice, _bob, id) = pair();
    let body = alice.session.avatar(id).unwrap().body();
    alice.world.set_position(body, Vec2::new(3.5, 0.5));

    let right = InputFrame {
        horizontal: 1.0,
        ..InputFrame::default()
    };
    // The first tick touches the hazard and starts the window.
    alice.frame(InputFrame::default());
    assert!(alice.session.avatar(id).unwrap().health().is_hurting());
    let x = alice.world.position(body).x;

    for _ in 0..49 {
        alice.frame(right);
        assert!(alice.session.avatar(id).unwrap().health().is_hurting());
    }
    assert!((alice.world.position(body).x - x).abs() < 1e-4);

    alice.frame(right);
    assert!(!alice.session.avatar(id).unwrap().health().is_hurting());
    assert!(alice.world.position(body).x > x);
}

#[test]
fn test_respawn_input_restores_health() {
    let (mut alice, mut bob, id) = pair();
    let body = alice.session.avatar(id).unwrap().body();
    alice.world.set_position(body, Vec2::new(3.5, 0.5));
    run(&mut [&mut alice, &mut bob], 3);
    assert_eq!(alice.session.avatar(id).unwrap().health().health(), 90);

    alice.frame(InputFrame {
        respawn: true,
        ..InputFrame::default()
    });
    run(&mut [&mut alice, &mut bob], 3);

    let owner = alice.session.avatar(id).unwrap();
    assert_eq!(owner.health().health(), 100);
    assert!(!owner.health().is_hurting());
    assert!(!owner.health().respawn_pending());
    assert!(alice.world.position(body).distance(Vec2::new(0.0, 1.0)) < 1.0);
    assert_eq!(bob.presented(id).health_label, "100 Health");
}

#[test]
fn test_fallout_respawns_at_spawn_point() {
    let (mut alice, _bob, id) = pair();
    let body = alice.session.avatar(id).unwrap().body();
    alice.world.set_position(body, Vec2::new(80.0, -20.0));

    // Tick 1 raises the respawn; tick 2 applies it before integrating.
    alice.idle(2);
    let position = alice.world.position(body);
    assert!(position.distance(Vec2::new(0.0, 1.0)) < 0.01, "at {position}");
}

#[test]
fn test_remote_converges_on_owner() {
    let (mut alice, mut bob, id) = pair();
    let right = InputFrame {
        horizontal: 1.0,
        ..InputFrame::default()
    };
    for _ in 0..25 {
        alice.frame(right);
        bob.frame(InputFrame::default());
    }
    run(&mut [&mut alice, &mut bob], 100);

    let owner_position = alice.world.position(alice.session.avatar(id).unwrap().body());
    let mirror_position = bob.world.position(bob.session.avatar(id).unwrap().body());
    assert!(owner_position.x > 1.0);
    assert!(
        owner_position.distance(mirror_position) < 0.05,
        "owner {owner_position} mirror {mirror_position}"
    );
    assert!(!bob.presented(id).flip_x);
}

#[test]
fn test_net_clock_sends_twenty_snapshots_per_second() {
    let (mut alice, _bob, _id) = pair();
    let mut sent = 0;
    let mut ticks = 0;
    for _ in 0..50 {
        let stats = alice.frame(InputFrame::default());
        sent += stats.snapshots_sent;
        ticks += stats.physics_ticks;
    }
    assert_eq!(sent, 20);
    assert_eq!(ticks, 50);
}

#[test]
fn test_late_joiner_learns_name_and_health() {
    let hub = LoopbackHub::new();
    let mut alice = Peer::join(&hub, ALICE, "alice");
    let id = alice.session.spawn_local(&mut alice.world).unwrap();
    let body = alice.session.avatar(id).unwrap().body();
    alice.world.set_position(body, Vec2::new(3.5, 0.5));
    alice.idle(3);

    let mut carol = Peer::join(&hub, PeerId(3), "carol");
    carol.idle(1);
    alice.idle(1);
    carol.idle(1);

    let mirror = carol.session.avatar(id).unwrap();
    assert_eq!(mirror.name(), "alice");
    assert_eq!(carol.presented(id).health_label, "90 Health");
}

#[test]
fn test_nickname_change_propagates() {
    let (mut alice, mut bob, id) = pair();
    run(&mut [&mut alice, &mut bob], 1);
    alice.session.set_nickname("alicia").unwrap();
    run(&mut [&mut alice, &mut bob], 1);
    assert_eq!(alice.session.transport().nickname(), "alicia");
    assert_eq!(bob.session.avatar(id).unwrap().name(), "alicia");
}

#[test]
fn test_departed_peer_avatars_are_removed() {
    let (mut alice, mut bob, id) = pair();
    run(&mut [&mut alice, &mut bob], 2);
    assert_eq!(bob.world.body_count(), 1);

    drop(alice);
    bob.idle(1);
    assert!(bob.session.avatar(id).is_none());
    assert_eq!(bob.world.body_count(), 0);
}

#[test]
fn test_despawn_local_rejects_mirrors() {
    let (mut alice, mut bob, id) = pair();
    run(&mut [&mut alice, &mut bob], 1);
    assert!(matches!(
        bob.session.despawn_local(id, &mut bob.world),
        Err(SessionError::NotOwned(_))
    ));
    alice.session.despawn_local(id, &mut alice.world).unwrap();
    assert!(alice.session.avatar(id).is_none());
}

#[test]
fn test_snapshot_before_any_event_leaves_mirror_unnamed() {
    let hub = LoopbackHub::new();
    let mut bob = Peer::join(&hub, BOB, "bob");
    let mut alice = hub.join(ALICE, "alice");
    let id = NetworkId::compose(ALICE, 0);

    let frame = StateSampler::new(ALICE, id)
        .sample(Vec2::new(1.0, 0.0), false)
        .unwrap();
    alice.send_snapshot(&frame).unwrap();
    bob.idle(1);
    let mirror = bob.session.avatar(id).unwrap();
    assert!(!mirror.is_mine());
    assert_eq!(mirror.name(), "");

    let named = EventChannel::new(ALICE).stamp(
        id,
        Event::NameChanged {
            name: "alice".into(),
        },
    );
    alice.broadcast_event(&named).unwrap();
    bob.idle(1);
    assert_eq!(bob.session.avatar(id).unwrap().name(), "alice");
}

/// Shared state behind [`HandFedTransport`].
#[derive(Default)]
struct Wire {
    inbox: Vec<Inbound>,
    refuse_events: bool,
}

/// Transport fed directly by the test, with switchable event failures.
struct HandFedTransport {
    local: PeerId,
    wire: Rc<RefCell<Wire>>,
}

impl Transport for HandFedTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn nickname(&self) -> &str {
        "hand-fed"
    }

    fn set_nickname(&mut self, _nickname: String) {}

    fn send_snapshot(&mut self, _frame: &SnapshotFrame) -> Result<(), TransportError> {
        Ok(())
    }

    fn broadcast_event(&mut self, _envelope: &EventEnvelope) -> Result<(), TransportError> {
        if self.wire.borrow().refuse_events {
            Err(TransportError::Disconnected(self.local))
        } else {
            Ok(())
        }
    }

    fn drain(&mut self) -> Vec<Inbound> {
        std::mem::take(&mut self.wire.borrow_mut().inbox)
    }
}

#[test]
fn test_pump_finishes_batch_after_failed_broadcast() {
    let wire = Rc::new(RefCell::new(Wire::default()));
    let transport = HandFedTransport {
        local: ALICE,
        wire: Rc::clone(&wire),
    };
    let mut session = PeerSession::new(transport, Config::default());
    let mut world = level();
    session.spawn_local(&mut world).unwrap();

    let carol_id = NetworkId::compose(CAROL, 0);
    let frame = StateSampler::new(CAROL, carol_id)
        .sample(Vec2::new(1.0, 0.0), false)
        .unwrap();
    wire.borrow_mut().inbox.push(Inbound::Snapshot(frame));
    session.pump(&mut world, &mut FrameStats::default()).unwrap();
    assert!(session.avatar(carol_id).is_some());

    // The join triggers announcements that fail; the departure after it
    // must still be applied.
    {
        let mut wire = wire.borrow_mut();
        wire.refuse_events = true;
        wire.inbox.extend([Inbound::PeerJoined(BOB), Inbound::PeerLeft(CAROL)]);
    }
    let result = session.pump(&mut world, &mut FrameStats::default());
    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::Disconnected(ALICE)))
    ));
    assert!(session.avatar(carol_id).is_none());
    assert_eq!(world.body_count(), 1);
}
