//! Authoritative world state.
//!
//! The world owns two registries: every accepted connection by ConnectionId,
//! and every player currently in the match by PlayerId. Each registry has its
//! own lock; per-player fields are guarded by the player's own locks.
//!
//! Lock order is `by_player_id` -> player body -> food pool. No registry lock
//! is ever held across an `.await`. Events that must stay ordered against a
//! Join snapshot are delivered while the registry lock is still held.

mod operations;
pub mod validation;

pub use operations::{JoinRequest, OperationError};

use crate::ai::bot_manager;
use crate::config::{BotConfig, Config, WorldConfig};
use crate::entity::{self, Body, ConnectionId, Food, Identity, Player};
use crate::persistence::{Persistence, PlayerState};
use crate::transport::Transport;
use parking_lot::RwLock;
use protocol::{Event, PlayerId, Vector2D};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Private-match binding. Held across the one-time load of saved state.
#[derive(Debug, Default)]
struct Session {
    game_id: Option<u32>,
    saved: HashMap<PlayerId, PlayerState>,
}

/// Another player as seen by a bot scan.
#[derive(Debug, Clone, Copy)]
pub struct Rival {
    pub player_id: PlayerId,
    pub position: Vector2D,
    pub radius: u32,
}

/// Counts used by the bot spawner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Population {
    pub humans: usize,
    pub total: usize,
}

/// The game world.
pub struct World {
    config: WorldConfig,
    bot_config: BotConfig,
    by_connection: RwLock<HashMap<ConnectionId, Arc<Player>>>,
    by_player_id: RwLock<HashMap<PlayerId, Arc<Player>>>,
    food: RwLock<Vec<Food>>,
    session: tokio::sync::Mutex<Session>,
    persistence: Arc<dyn Persistence>,
    bots_started: AtomicBool,
    next_connection_id: AtomicU64,
}

impl World {
    /// Create a world with a full food pool.
    pub fn new(config: &Config, persistence: Arc<dyn Persistence>) -> Arc<Self> {
        let world = &config.world;
        let food = entity::spawn_pool(world.food_count, world.width, world.height);
        info!(
            "World {}x{} created with {} food ({} match)",
            world.width,
            world.height,
            food.len(),
            if world.private { "private" } else { "public" }
        );
        Arc::new(Self {
            config: world.clone(),
            bot_config: config.bots.clone(),
            by_connection: RwLock::new(HashMap::new()),
            by_player_id: RwLock::new(HashMap::new()),
            food: RwLock::new(food),
            session: tokio::sync::Mutex::new(Session::default()),
            persistence,
            bots_started: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub fn bot_config(&self) -> &BotConfig {
        &self.bot_config
    }

    /// Reserve a ConnectionId for a socket about to be accepted.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an accepted socket as a pre-Join player.
    pub fn accept(&self, connection_id: ConnectionId, transport: Arc<dyn Transport>) -> Arc<Player> {
        let body = Body {
            position: entity::random_position(self.config.width, self.config.height),
            radius: self.config.start_radius,
        };
        let player = Arc::new(Player::connected(connection_id, transport, body));
        self.by_connection
            .write()
            .insert(connection_id, Arc::clone(&player));
        debug!("Connection {} accepted", connection_id);
        player
    }

    /// Socket teardown: forget the connection and take its player out of the match.
    pub async fn disconnect(self: &Arc<Self>, connection_id: ConnectionId) {
        let player = self.by_connection.write().remove(&connection_id);
        if let Some(player) = player {
            info!("Connection {} disconnected", connection_id);
            player.disconnect();
            self.remove_player(&player).await;
        }
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<Arc<Player>> {
        self.by_connection.read().get(&connection_id).cloned()
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<Arc<Player>> {
        self.by_player_id.read().get(player_id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.by_connection.read().len()
    }

    pub fn player_count(&self) -> usize {
        self.by_player_id.read().len()
    }

    pub fn food_count(&self) -> usize {
        self.food.read().len()
    }

    /// Bound private gameID; `None` also while a join or pause holds the session.
    pub fn game_id(&self) -> Option<u32> {
        self.session.try_lock().ok().and_then(|s| s.game_id)
    }

    /// PlayerId of `player` if this exact player is currently in the match.
    pub fn member_id(&self, player: &Arc<Player>) -> Option<PlayerId> {
        member_of(&self.by_player_id.read(), player)
    }

    pub fn is_in_match(&self, player: &Arc<Player>) -> bool {
        self.member_id(player).is_some()
    }

    pub fn population(&self) -> Population {
        let players = self.by_player_id.read();
        Population {
            humans: players.values().filter(|p| !p.is_bot()).count(),
            total: players.len(),
        }
    }

    /// Run `f` over the food pool under its read lock.
    pub fn with_food<R>(&self, f: impl FnOnce(&[Food]) -> R) -> R {
        f(&self.food.read())
    }

    /// Every in-match player except `me`.
    pub fn rivals(&self, me: &Arc<Player>) -> Vec<Rival> {
        let players = self.by_player_id.read();
        players
            .iter()
            .filter(|(_, p)| !Arc::ptr_eq(p, me))
            .map(|(id, p)| {
                let body = p.body();
                Rival {
                    player_id: *id,
                    position: body.position,
                    radius: body.radius,
                }
            })
            .collect()
    }

    /// Deliver `event` to every in-match player.
    pub fn broadcast(self: &Arc<Self>, event: &Event) {
        self.broadcast_except(event, None);
    }

    fn broadcast_except(self: &Arc<Self>, event: &Event, except: Option<&PlayerId>) {
        let mut failed = Vec::new();
        deliver(&self.by_player_id.read(), event, except, &mut failed);
        self.schedule_removals(failed);
    }

    /// Remove players whose delivery failed. Runs on a follow-up task so the
    /// removal never happens under the registry read lock that saw the failure.
    fn schedule_removals(self: &Arc<Self>, failed: Vec<Arc<Player>>) {
        if failed.is_empty() {
            return;
        }
        let world = Arc::clone(self);
        tokio::spawn(async move {
            for player in failed {
                debug!(
                    "Dropping {:?} after failed delivery",
                    player.player_id()
                );
                world.remove_player(&player).await;
            }
        });
    }

    /// Take `player` out of the match. Returns `false` if it was not in it.
    pub async fn remove_player(self: &Arc<Self>, player: &Arc<Player>) -> bool {
        let Some(player_id) = self.detach(player) else {
            return false;
        };
        self.broadcast(&Event::DestroyPlayer { player_id });
        self.retire(player_id, player);
        self.release_session_if_empty().await;
        true
    }

    /// Remove `player` from `by_player_id` if it is the registered entry.
    fn detach(&self, player: &Arc<Player>) -> Option<PlayerId> {
        let player_id = player.player_id()?;
        let mut players = self.by_player_id.write();
        match players.get(&player_id) {
            Some(current) if Arc::ptr_eq(current, player) => {
                players.remove(&player_id);
                Some(player_id)
            }
            _ => None,
        }
    }

    /// Close a detached player's transport and hand its stats to the store.
    fn retire(&self, player_id: PlayerId, player: &Arc<Player>) {
        player.disconnect();
        player.record_end();
        if player.is_bot() {
            debug!("Bot {} left the match", player_id);
            return;
        }
        info!(
            "Player {} (connection {:?}) left the match",
            player_id,
            player.connection_id()
        );
        let stats = player.stats();
        let persistence = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            persistence.post_achievements(player_id, stats).await;
        });
    }

    /// An emptied private match frees its gameID for the next session.
    async fn release_session_if_empty(&self) {
        if !self.config.private || self.player_count() > 0 {
            return;
        }
        let mut session = self.session.lock().await;
        // Joins hold the session lock through registration, so this is stable.
        if self.player_count() == 0 && session.game_id.is_some() {
            info!("Private game {:?} is empty, releasing", session.game_id);
            *session = Session::default();
        }
    }

    /// Persisted form of every in-match player.
    fn player_states(&self) -> Vec<PlayerState> {
        let players = self.by_player_id.read();
        players
            .iter()
            .map(|(id, p)| {
                let body = p.body();
                PlayerState {
                    player_id: *id,
                    x: body.position.x,
                    y: body.position.y,
                    score: entity::score_for_radius(body.radius),
                }
            })
            .collect()
    }

    /// Add a bot to the match and announce it.
    pub fn register_bot(self: &Arc<Self>, identity: Identity) -> Arc<Player> {
        let body = Body {
            position: entity::random_position(self.config.width, self.config.height),
            radius: self.config.start_radius,
        };
        let player_id = identity.player_id;
        let player = Arc::new(Player::bot(identity, body));
        player.record_start();
        self.by_player_id
            .write()
            .insert(player_id, Arc::clone(&player));
        if let Some(event) = player.new_player_event() {
            self.broadcast_except(&event, Some(&player_id));
        }
        info!("Bot {} joined the match", player_id);
        player
    }

    /// Start the bot spawner unless one is already running.
    fn ensure_bot_maintenance(self: &Arc<Self>) {
        if self.config.private || !self.bot_config.enabled {
            return;
        }
        if !self.bots_started.swap(true, Ordering::AcqRel) {
            bot_manager::start(Arc::clone(self));
        }
    }

    /// Called by a spawner that saw no humans. Returns `false` if a human
    /// joined meanwhile and this spawner keeps the slot; otherwise the next
    /// human Join starts a fresh one.
    pub fn stop_bot_maintenance(&self) -> bool {
        self.bots_started.store(false, Ordering::Release);
        if self.population().humans > 0 && !self.bots_started.swap(true, Ordering::AcqRel) {
            return false;
        }
        true
    }

    fn random_food(&self) -> Food {
        Food::random(self.config.width, self.config.height)
    }
}

/// PlayerId of `player` if it is the entry registered under its id.
fn member_of(players: &HashMap<PlayerId, Arc<Player>>, player: &Arc<Player>) -> Option<PlayerId> {
    let player_id = player.player_id()?;
    match players.get(&player_id) {
        Some(current) if Arc::ptr_eq(current, player) => Some(player_id),
        _ => None,
    }
}

/// Send `event` to every player of an already locked registry. Players whose
/// delivery fails are pushed onto `failed` for [`World::schedule_removals`].
fn deliver(
    players: &HashMap<PlayerId, Arc<Player>>,
    event: &Event,
    except: Option<&PlayerId>,
    failed: &mut Vec<Arc<Player>>,
) {
    let frame = event.encode();
    failed.extend(
        players
            .iter()
            .filter(|(id, _)| Some(*id) != except)
            .filter(|(_, p)| p.send_frame(frame.clone()).is_err())
            .map(|(_, p)| Arc::clone(p)),
    );
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("connections", &self.connection_count())
            .field("players", &self.player_count())
            .field("food", &self.food_count())
            .field("private", &self.config.private)
            .finish()
    }
}
