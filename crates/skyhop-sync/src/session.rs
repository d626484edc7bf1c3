//! Per-peer session: every avatar this peer knows about, driven by one
//! fixed-rate physics clock and one network clock.
//!
//! A frame runs in a fixed order: drain the transport, latch input, run
//! the due physics ticks (movement, integration, hazard contacts), send
//! snapshots for the due network ticks, then reconcile mirrors. Avatars of
//! other peers are created lazily from the first snapshot or event that
//! names them and removed when their owner leaves.

use std::collections::BTreeMap;
use std::time::Duration;

use skyhop_config::Config;

use crate::authority::{NetworkId, Ownership, PeerId};
use crate::avatar::Avatar;
use crate::clock::TickSchedule;
use crate::events::{Event, EventChannel, EventEnvelope};
use crate::host::{InputFrame, LayerMask, Physics, Presenter};
use crate::snapshot::{CodecError, SnapshotFrame};
use crate::transport::{Inbound, Transport, TransportError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while running a session frame.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The entity is not owned by this peer.
    #[error("entity {0:?} is not owned locally")]
    NotOwned(NetworkId),
}

// ---------------------------------------------------------------------------
// FrameStats
// ---------------------------------------------------------------------------

/// Counters for one call to [`PeerSession::frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub physics_ticks: u32,
    pub net_ticks: u32,
    pub snapshots_sent: u32,
    pub snapshots_applied: u32,
    pub events_handled: u32,
    pub events_broadcast: u32,
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// All replicated avatars as seen from one peer.
pub struct PeerSession<T: Transport> {
    transport: T,
    config: Config,
    channel: EventChannel,
    avatars: BTreeMap<NetworkId, Avatar>,
    physics_clock: TickSchedule,
    net_clock: TickSchedule,
    next_index: u32,
}

impl<T: Transport> PeerSession<T> {
    /// Creates a session with no avatars.
    pub fn new(transport: T, config: Config) -> Self {
        let local = transport.local_peer();
        Self {
            channel: EventChannel::new(local),
            physics_clock: TickSchedule::with_tick_rate(config.network.physics_tick_rate),
            net_clock: TickSchedule::with_tick_rate(config.network.net_tick_rate),
            avatars: BTreeMap::new(),
            next_index: 0,
            transport,
            config,
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.transport.local_peer()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn avatar(&self, id: NetworkId) -> Option<&Avatar> {
        self.avatars.get(&id)
    }

    /// Every known avatar, ordered by id.
    pub fn avatars(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.values()
    }

    /// Avatars owned by this peer.
    pub fn owned(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.values().filter(|a| a.is_mine())
    }

    /// Total physics ticks run so far.
    pub fn physics_ticks(&self) -> u64 {
        self.physics_clock.total_ticks()
    }

    // --- Lifecycle ---

    /// Spawns an avatar owned by this peer and announces its name.
    pub fn spawn_local<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
    ) -> Result<NetworkId, SessionError> {
        let local = self.local_peer();
        let id = NetworkId::compose(local, self.next_index);
        self.next_index += 1;

        let name = self.transport.nickname().to_owned();
        let ownership = Ownership::new(local, local);
        let avatar = Avatar::spawn(id, ownership, name.clone(), &self.config, physics);
        self.avatars.insert(id, avatar);
        self.broadcast(id, Event::NameChanged { name })?;
        Ok(id)
    }

    /// Despawns an avatar owned by this peer.
    pub fn despawn_local<P: Physics + ?Sized>(
        &mut self,
        id: NetworkId,
        physics: &mut P,
    ) -> Result<(), SessionError> {
        match self.avatars.get(&id) {
            Some(avatar) if avatar.is_mine() => {}
            _ => return Err(SessionError::NotOwned(id)),
        }
        if let Some(avatar) = self.avatars.remove(&id) {
            avatar.despawn(physics);
        }
        Ok(())
    }

    /// Changes the local nickname and renames every owned avatar.
    pub fn set_nickname(&mut self, nickname: impl Into<String>) -> Result<(), SessionError> {
        let nickname = nickname.into();
        self.transport.set_nickname(nickname.clone());
        let owned: Vec<NetworkId> = self.owned().map(Avatar::id).collect();
        for id in owned {
            self.broadcast(
                id,
                Event::NameChanged {
                    name: nickname.clone(),
                },
            )?;
        }
        Ok(())
    }

    /// Creates a mirror for an entity first seen in an inbound message.
    /// The mirror stays unnamed until its owner's `NameChanged` arrives.
    /// Returns `false` for locally allocated ids that no longer exist.
    fn ensure_mirror<P: Physics + ?Sized>(&mut self, id: NetworkId, physics: &mut P) -> bool {
        if self.avatars.contains_key(&id) {
            return true;
        }
        let owner = id.allocated_by();
        let local = self.local_peer();
        if owner == local {
            return false;
        }
        let avatar = Avatar::spawn(
            id,
            Ownership::new(owner, local),
            String::new(),
            &self.config,
            physics,
        );
        self.avatars.insert(id, avatar);
        true
    }

    fn remove_peer<P: Physics + ?Sized>(&mut self, peer: PeerId, physics: &mut P) {
        let gone: Vec<NetworkId> = self
            .avatars
            .values()
            .filter(|a| a.owner() == peer)
            .map(Avatar::id)
            .collect();
        for id in gone {
            if let Some(avatar) = self.avatars.remove(&id) {
                avatar.despawn(physics);
            }
        }
        self.channel.forget_peer(peer);
        tracing::info!(peer = peer.0, "peer left, avatars removed");
    }

    /// Re-announces name and health of owned avatars for a newcomer.
    fn announce_owned(&mut self) -> Result<u32, SessionError> {
        let announcements: Vec<(NetworkId, String, i32)> = self
            .owned()
            .map(|a| (a.id(), a.name().to_owned(), a.health().health()))
            .collect();
        let mut sent = 0;
        for (id, name, health) in announcements {
            self.broadcast(id, Event::NameChanged { name })?;
            self.broadcast(id, Event::HealthChanged { health })?;
            sent += 2;
        }
        Ok(sent)
    }

    // --- Messaging ---

    fn broadcast(&mut self, target: NetworkId, event: Event) -> Result<(), SessionError> {
        tracing::debug!(entity = target.0, "broadcasting {}", event.name());
        let envelope = self.channel.stamp(target, event);
        self.transport.broadcast_event(&envelope)?;
        Ok(())
    }

    fn route_snapshot<P: Physics + ?Sized>(
        &mut self,
        frame: &SnapshotFrame,
        physics: &mut P,
    ) -> bool {
        if !self.ensure_mirror(frame.entity, physics) {
            return false;
        }
        let Some(avatar) = self.avatars.get_mut(&frame.entity) else {
            return false;
        };
        match avatar.apply_snapshot(frame) {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(
                    entity = frame.entity.0,
                    sequence = frame.sequence,
                    "dropping snapshot: {err}"
                );
                false
            }
        }
    }

    fn route_event<P: Physics + ?Sized>(
        &mut self,
        envelope: &EventEnvelope,
        physics: &mut P,
    ) -> Result<Option<Event>, SessionError> {
        if !self.channel.admit(envelope) {
            return Ok(None);
        }
        if !self.ensure_mirror(envelope.target, physics) {
            tracing::debug!(
                entity = envelope.target.0,
                "{} for unknown entity",
                envelope.event.name()
            );
            return Ok(None);
        }
        let Some(avatar) = self.avatars.get_mut(&envelope.target) else {
            return Ok(None);
        };
        tracing::debug!(
            entity = envelope.target.0,
            sender = envelope.sender.0,
            "handling {}",
            envelope.event.name()
        );
        Ok(avatar.handle_event(envelope, physics))
    }

    fn apply_inbound<P: Physics + ?Sized>(
        &mut self,
        inbound: Inbound,
        physics: &mut P,
        stats: &mut FrameStats,
    ) -> Result<(), SessionError> {
        match inbound {
            Inbound::Snapshot(frame) => {
                if self.route_snapshot(&frame, physics) {
                    stats.snapshots_applied += 1;
                }
            }
            Inbound::Event(envelope) => {
                stats.events_handled += 1;
                if let Some(follow_up) = self.route_event(&envelope, physics)? {
                    self.broadcast(envelope.target, follow_up)?;
                    stats.events_broadcast += 1;
                }
            }
            Inbound::PeerJoined(peer) => {
                tracing::info!(peer = peer.0, "peer joined");
                stats.events_broadcast += self.announce_owned()?;
            }
            Inbound::PeerLeft(peer) => self.remove_peer(peer, physics),
        }
        Ok(())
    }

    /// Drains the transport and applies everything received.
    ///
    /// A failure while handling one message does not stop the rest of the
    /// batch. The first error is returned once the batch is done.
    pub fn pump<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
        stats: &mut FrameStats,
    ) -> Result<(), SessionError> {
        let mut first_error = None;
        for inbound in self.transport.drain() {
            if let Err(err) = self.apply_inbound(inbound, physics, stats) {
                tracing::warn!("inbound message failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // --- Frame ---

    /// Runs one presentation frame of `dt` wall time.
    pub fn frame<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
        input: &InputFrame,
        dt: Duration,
    ) -> Result<FrameStats, SessionError> {
        let mut stats = FrameStats::default();
        self.pump(physics, &mut stats)?;

        let mut raised: Vec<(NetworkId, Event)> = Vec::new();
        for avatar in self.avatars.values_mut().filter(|a| a.is_mine()) {
            if let Some(event) = avatar.latch_input(input) {
                raised.push((avatar.id(), event));
            }
        }

        let tick = self.physics_clock.tick_duration();
        stats.physics_ticks = self.physics_clock.accumulate(dt);
        for _ in 0..stats.physics_ticks {
            for avatar in self.avatars.values_mut() {
                if let Some(event) = avatar.fixed_update(physics, tick) {
                    raised.push((avatar.id(), event));
                }
            }
            physics.integrate(tick.as_secs_f32());
            for contact in physics.drain_contacts() {
                if !contact.layers.intersects(LayerMask::HAZARD) {
                    continue;
                }
                let hit = self
                    .avatars
                    .values_mut()
                    .find(|a| a.is_mine() && a.body() == contact.body);
                if let Some(avatar) = hit
                    && let Some(event) = avatar.on_hazard_contact()
                {
                    raised.push((avatar.id(), event));
                }
            }
        }

        for (target, event) in raised {
            self.broadcast(target, event)?;
            stats.events_broadcast += 1;
        }

        stats.net_ticks = self.net_clock.accumulate(dt);
        for _ in 0..stats.net_ticks {
            let mut frames = Vec::new();
            for avatar in self.avatars.values_mut() {
                if let Some(frame) = avatar.sample(&*physics)? {
                    frames.push(frame);
                }
            }
            for frame in &frames {
                self.transport.send_snapshot(frame)?;
                stats.snapshots_sent += 1;
            }
        }

        let visual_dt = dt.as_secs_f32();
        for avatar in self.avatars.values_mut() {
            avatar.visual_update(physics, visual_dt);
        }
        Ok(stats)
    }

    /// Writes every avatar's visual state to the presenter.
    pub fn present<R: Presenter + ?Sized>(&self, presenter: &mut R) {
        for avatar in self.avatars.values() {
            avatar.present(presenter);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
