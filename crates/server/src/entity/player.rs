//! Players: socket-backed clients and in-process bots.

use super::ConnectionId;
use crate::transport::{SendError, Transport};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use protocol::{Color, Event, PlayerId, Vector2D};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

/// Identity fields supplied by the client at Join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub username: String,
    pub color: Color,
    pub skin: Option<String>,
}

/// Hot gameplay fields, guarded by the per-player lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Body {
    pub position: Vector2D,
    pub radius: u32,
}

/// Per-match statistics, read when the player leaves.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Best score reached (radius / 10).
    pub score: u32,
    pub killed_players: u32,
    pub time_start: Option<SystemTime>,
    pub time_end: Option<SystemTime>,
}

impl Stats {
    /// Time between Join and removal; zero if either end is missing.
    pub fn time_played(&self) -> Duration {
        match (self.time_start, self.time_end) {
            (Some(start), Some(end)) => end.duration_since(start).unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

/// Score reported to the store for a given radius.
#[inline]
pub fn score_for_radius(radius: u32) -> u32 {
    radius / 10
}

/// A player in the world.
///
/// Socket players are created at accept time with no identity; the identity is
/// assigned exactly once by Join. Bots are created fully formed and have no
/// transport.
#[derive(Debug)]
pub struct Player {
    connection_id: Option<ConnectionId>,
    identity: OnceLock<Identity>,
    body: RwLock<Body>,
    stats: Mutex<Stats>,
    transport: Option<Arc<dyn Transport>>,
}

impl Player {
    /// A freshly accepted connection that has not joined yet.
    pub fn connected(
        connection_id: ConnectionId,
        transport: Arc<dyn Transport>,
        body: Body,
    ) -> Self {
        Self {
            connection_id: Some(connection_id),
            identity: OnceLock::new(),
            body: RwLock::new(body),
            stats: Mutex::new(Stats::default()),
            transport: Some(transport),
        }
    }

    /// An in-process bot.
    pub fn bot(identity: Identity, body: Body) -> Self {
        Self {
            connection_id: None,
            identity: OnceLock::from(identity),
            body: RwLock::new(body),
            stats: Mutex::new(Stats::default()),
            transport: None,
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn is_bot(&self) -> bool {
        self.transport.is_none()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.identity.get().map(|i| i.player_id)
    }

    /// Assign the Join identity. Fails if one was already assigned.
    pub fn assign_identity(&self, identity: Identity) -> Result<(), Identity> {
        self.identity.set(identity)
    }

    pub fn body(&self) -> Body {
        *self.body.read()
    }

    pub fn position(&self) -> Vector2D {
        self.body.read().position
    }

    pub fn radius(&self) -> u32 {
        self.body.read().radius
    }

    pub fn set_position(&self, position: Vector2D) {
        self.body.write().position = position;
    }

    /// Overwrite position and radius from persisted state. Only used before
    /// the player enters the match.
    pub fn restore(&self, body: Body) {
        *self.body.write() = body;
    }

    /// Apply `rule` to the current radius atomically and return the result.
    pub fn update_radius(&self, rule: impl FnOnce(u32) -> u32) -> u32 {
        let radius = {
            let mut body = self.body.write();
            body.radius = rule(body.radius);
            body.radius
        };
        let mut stats = self.stats.lock();
        stats.score = stats.score.max(score_for_radius(radius));
        radius
    }

    /// Stamp the join time and seed the score from the starting radius.
    pub fn record_start(&self) {
        let radius = self.radius();
        let mut stats = self.stats.lock();
        stats.time_start = Some(SystemTime::now());
        stats.score = stats.score.max(score_for_radius(radius));
    }

    pub fn record_end(&self) {
        self.stats.lock().time_end = Some(SystemTime::now());
    }

    pub fn add_kill(&self) {
        self.stats.lock().killed_players += 1;
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    /// Enqueue an encoded frame. Bots have nothing to deliver to.
    pub fn send_frame(&self, frame: Bytes) -> Result<(), SendError> {
        match &self.transport {
            Some(transport) => transport.send_binary(frame),
            None => Ok(()),
        }
    }

    pub fn send_event(&self, event: &Event) -> Result<(), SendError> {
        match &self.transport {
            Some(transport) => transport.send_binary(event.encode()),
            None => Ok(()),
        }
    }

    /// Close the transport, if any. Idempotent.
    pub fn disconnect(&self) {
        if let Some(transport) = &self.transport {
            transport.close();
        }
    }

    /// The NewPlayer event describing this player, if it has joined.
    pub fn new_player_event(&self) -> Option<Event> {
        let identity = self.identity()?;
        let body = self.body();
        Some(Event::NewPlayer {
            player_id: identity.player_id,
            position: body.position,
            radius: body.radius,
            color: identity.color,
            skin: identity.skin.clone(),
            username: identity.username.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> Player {
        Player::bot(
            Identity {
                player_id: PlayerId::from_u128(1),
                username: "Vela".into(),
                color: Color::new(60, 60, 60),
                skin: None,
            },
            Body {
                position: Vector2D::new(10, 10),
                radius: 50,
            },
        )
    }

    #[test]
    fn test_identity_assigned_once() {
        let player = bot();
        let again = player.identity().cloned().unwrap();
        assert!(player.assign_identity(again).is_err());
    }

    #[test]
    fn test_update_radius_tracks_best_score() {
        let player = bot();
        player.record_start();
        assert_eq!(player.update_radius(|_| 120), 120);
        assert_eq!(player.update_radius(|r| r.max(90)), 120);
        assert_eq!(player.stats().score, 12);
    }

    #[test]
    fn test_bot_delivery_is_noop() {
        let player = bot();
        assert!(player.is_bot());
        assert!(player.send_event(&Event::Pause).is_ok());
        player.disconnect();
    }

    #[test]
    fn test_time_played_needs_both_ends() {
        let mut stats = Stats::default();
        assert_eq!(stats.time_played(), Duration::ZERO);
        let start = SystemTime::now();
        stats.time_start = Some(start);
        stats.time_end = Some(start + Duration::from_secs(90));
        assert_eq!(stats.time_played().as_secs(), 90);
    }
}
