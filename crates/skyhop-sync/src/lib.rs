//! Peer-owned avatar replication: owner-side movement and health, snapshot
//! sampling, remote reconciliation, and reliable all-peer events.

pub mod arena;
pub mod authority;
pub mod avatar;
pub mod clock;
pub mod events;
pub mod health;
pub mod host;
pub mod movement;
pub mod reconciliation;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use arena::{ArenaPhysics, StaticBox};
pub use authority::{Authoritative, NetworkId, Ownership, PeerId, Role};
pub use avatar::Avatar;
pub use clock::TickSchedule;
pub use events::{Event, EventChannel, EventEnvelope};
pub use health::{HealthPhase, HealthStateMachine, HurtWindow};
pub use host::{
    BodyId, BodyKind, Contact, InputFrame, InputSource, LayerMask, Physics, PresentedState,
    Presenter, RecordingPresenter, ScriptedInput,
};
pub use movement::{MovementSimulator, MovementStep, damping_factor, smooth_damp};
pub use reconciliation::{Correction, Reconciler};
pub use session::{FrameStats, PeerSession, SessionError};
pub use snapshot::{
    CodecError, SNAPSHOT_WIRE_SIZE, SnapshotFrame, StateSampler, StateSnapshot, sequence_is_newer,
};
pub use transport::{Inbound, LoopbackHub, PeerEndpoint, SnapshotFaults, Transport, TransportError};
