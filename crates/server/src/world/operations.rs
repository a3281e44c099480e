//! Operation dispatch.
//!
//! Socket operations arrive here keyed by ConnectionId. Bots call the same
//! handlers directly with their own player.

use super::{Session, World, deliver, member_of, validation};
use crate::entity::{Body, ConnectionId, Identity, Player};
use bytes::Bytes;
use protocol::{Color, Event, Operation, PlayerId, Vector2D};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why an operation was dropped. Always logged, never sent to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("player is not in the match")]
    NotInMatch,

    #[error("connection already joined as {0}")]
    AlreadyJoined(PlayerId),

    #[error("player {0} is already in the match")]
    DuplicatePlayer(PlayerId),

    #[error("game {got} does not match running game {expected}")]
    WrongGame { expected: u32, got: u32 },

    #[error("private match join without a gameID")]
    MissingGameId,

    #[error("eater radius {eater} is not larger than victim radius {victim}")]
    Undersized { eater: u32, victim: u32 },

    #[error("player cannot eat itself")]
    SelfEat,

    #[error("pause is only available in private matches")]
    NotPrivate,
}

/// Join fields as sent by the client.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub username: String,
    pub color: Color,
    pub skin: Option<String>,
    pub game_id: Option<u32>,
}

impl World {
    /// Decode and apply one inbound frame.
    pub async fn handle_frame(self: &Arc<Self>, connection_id: ConnectionId, frame: Bytes) {
        let operation = match Operation::decode(&frame) {
            Ok(operation) => operation,
            Err(e) => {
                warn!("Connection {} sent a bad frame: {}", connection_id, e);
                return;
            }
        };
        let kind = operation.operation_type();
        if let Err(e) = self.dispatch(connection_id, operation).await {
            warn!("Connection {} {:?} rejected: {}", connection_id, kind, e);
        }
    }

    /// Apply a decoded operation on behalf of a connection.
    pub async fn dispatch(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        operation: Operation,
    ) -> Result<(), OperationError> {
        let player = self
            .connection(connection_id)
            .ok_or(OperationError::UnknownConnection(connection_id))?;

        match operation {
            Operation::Join {
                player_id,
                username,
                color,
                skin,
                game_id,
            } => {
                let request = JoinRequest {
                    player_id,
                    username,
                    color,
                    skin,
                    game_id,
                };
                self.join(&player, request).await
            }
            Operation::Move { position } => self.move_player(&player, position),
            Operation::EatFood {
                food_position,
                new_radius,
            } => self.eat_food(&player, food_position, new_radius),
            Operation::EatPlayer {
                player_eaten,
                new_radius,
            } => self.eat_player(&player, player_eaten, new_radius).await,
            Operation::Leave => self.leave(&player).await,
            Operation::Pause => self.pause(&player).await,
        }
    }

    pub async fn join(
        self: &Arc<Self>,
        player: &Arc<Player>,
        request: JoinRequest,
    ) -> Result<(), OperationError> {
        if let Some(existing) = player.player_id() {
            return Err(OperationError::AlreadyJoined(existing));
        }
        let identity = Identity {
            player_id: request.player_id,
            username: validation::username(&request.username, self.config.max_username_length),
            color: request.color,
            skin: request.skin,
        };

        if !self.config.private {
            self.register(player, identity, None)?;
            self.ensure_bot_maintenance();
            return Ok(());
        }

        let game_id = request.game_id.ok_or(OperationError::MissingGameId)?;
        let mut session = self.session.lock().await;
        let bound_here = match session.game_id {
            Some(expected) if expected != game_id => {
                return Err(OperationError::WrongGame {
                    expected,
                    got: game_id,
                });
            }
            Some(_) => false,
            None => {
                self.open_session(&mut session, game_id).await;
                true
            }
        };

        let restored = session.saved.get(&identity.player_id).map(|state| Body {
            position: state.position(),
            radius: state.radius(),
        });
        let result = self.register(player, identity, restored);
        if result.is_err() && bound_here && self.player_count() == 0 {
            *session = Session::default();
        }
        result
    }

    /// Bind the private session to `game_id` and load its saved state.
    async fn open_session(&self, session: &mut Session, game_id: u32) {
        info!("Private game {} starting", game_id);
        session.game_id = Some(game_id);

        let persistence = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            persistence.start_private_game(game_id).await;
        });

        session.saved = self
            .persistence
            .get_values(game_id)
            .await
            .into_iter()
            .map(|state| (state.player_id, state))
            .collect();
    }

    /// Promote a connection into the match: ack, snapshot, insert, announce.
    /// Runs under the `by_player_id` write lock so no other join interleaves.
    fn register(
        self: &Arc<Self>,
        player: &Arc<Player>,
        identity: Identity,
        restored: Option<Body>,
    ) -> Result<(), OperationError> {
        let player_id = identity.player_id;
        let mut failed = Vec::new();
        {
            let mut players = self.by_player_id.write();
            if players.contains_key(&player_id) {
                return Err(OperationError::DuplicatePlayer(player_id));
            }
            if player.assign_identity(identity).is_err() {
                return Err(OperationError::AlreadyJoined(
                    player.player_id().unwrap_or(player_id),
                ));
            }
            if let Some(body) = restored {
                player.restore(body);
            }
            player.record_start();

            let body = player.body();
            let mut snapshot = vec![Event::Joined {
                player_id,
                position: body.position,
                radius: body.radius,
            }];
            snapshot.extend(players.values().filter_map(|p| p.new_player_event()));
            snapshot.push(Event::NewFood {
                food: self.food.read().iter().map(|f| f.to_item()).collect(),
            });
            if snapshot.iter().any(|event| player.send_event(event).is_err()) {
                failed.push(Arc::clone(player));
            }

            if let Some(event) = player.new_player_event() {
                deliver(&players, &event, None, &mut failed);
            }
            players.insert(player_id, Arc::clone(player));
        }

        info!("Player {} joined the match", player_id);
        self.schedule_removals(failed);
        Ok(())
    }

    pub fn move_player(
        self: &Arc<Self>,
        player: &Arc<Player>,
        position: Vector2D,
    ) -> Result<(), OperationError> {
        let player_id = self.member_id(player).ok_or(OperationError::NotInMatch)?;
        let position = validation::move_position(position);
        player.set_position(position);
        self.broadcast(&Event::PlayerMove {
            player_id,
            position,
        });
        Ok(())
    }

    /// Grow the eater and, on a match, replace the pellet in place.
    ///
    /// Holds the registry read lock from the membership check through the
    /// last delivery, so a concurrent Join sees the pool either before the
    /// swap or after every event about it.
    pub fn eat_food(
        self: &Arc<Self>,
        player: &Arc<Player>,
        food_position: Vector2D,
        new_radius: u32,
    ) -> Result<(), OperationError> {
        let mut failed = Vec::new();
        {
            let players = self.by_player_id.read();
            let player_id = member_of(&players, player).ok_or(OperationError::NotInMatch)?;
            let radius =
                player.update_radius(|current| validation::food_radius(current, new_radius));
            deliver(&players, &Event::PlayerGrow { player_id, radius }, None, &mut failed);

            // The pool size never changes: a match is replaced in place.
            let mut food = self.food.write();
            if let Some(index) = food.iter().position(|f| f.position == food_position) {
                let fresh = self.random_food();
                food[index] = fresh;
                let destroyed = Event::DestroyFood {
                    position: food_position,
                };
                deliver(&players, &destroyed, None, &mut failed);
                let spawned = Event::NewFood {
                    food: vec![fresh.to_item()],
                };
                deliver(&players, &spawned, None, &mut failed);
            }
        }
        self.schedule_removals(failed);
        Ok(())
    }

    pub async fn eat_player(
        self: &Arc<Self>,
        player: &Arc<Player>,
        victim_id: PlayerId,
        new_radius: u32,
    ) -> Result<(), OperationError> {
        let player_id = player.player_id().ok_or(OperationError::NotInMatch)?;
        if victim_id == player_id {
            return Err(OperationError::SelfEat);
        }

        // Membership, size check and detach in one step: only one eater wins
        // a victim, and an eater that was itself just eaten cannot win.
        let mut failed = Vec::new();
        let victim = {
            let mut players = self.by_player_id.write();
            if member_of(&players, player).is_none() {
                return Err(OperationError::NotInMatch);
            }
            let Some(victim) = players.get(&victim_id).cloned() else {
                debug!("{} tried to eat absent player {}", player_id, victim_id);
                return Ok(());
            };
            validation::eat_player(player.radius(), victim.radius())?;
            players.remove(&victim_id);

            let radius =
                player.update_radius(|current| validation::player_radius(current, new_radius));
            let destroyed = Event::DestroyPlayer {
                player_id: victim_id,
            };
            deliver(&players, &Event::PlayerGrow { player_id, radius }, None, &mut failed);
            deliver(&players, &destroyed, None, &mut failed);
            let _ = victim.send_event(&destroyed);
            victim
        };

        self.retire(victim_id, &victim);
        player.add_kill();
        info!("Player {} ate {}", player_id, victim_id);
        self.schedule_removals(failed);
        Ok(())
    }

    pub async fn leave(self: &Arc<Self>, player: &Arc<Player>) -> Result<(), OperationError> {
        if !self.remove_player(player).await {
            debug!("Leave from a player not in the match");
        }
        Ok(())
    }

    /// Stop a private match: notify everyone, save state and clear the match.
    pub async fn pause(self: &Arc<Self>, player: &Arc<Player>) -> Result<(), OperationError> {
        if !self.config.private {
            return Err(OperationError::NotPrivate);
        }
        let requester = self.member_id(player).ok_or(OperationError::NotInMatch)?;

        let mut session = self.session.lock().await;
        let states = self.player_states();
        self.broadcast(&Event::Pause);
        let cleared: Vec<_> = self.by_player_id.write().drain().collect();
        for (player_id, player) in &cleared {
            self.retire(*player_id, player);
        }

        if let Some(game_id) = session.game_id {
            info!(
                "Private game {} paused by {} ({} players saved)",
                game_id,
                requester,
                states.len()
            );
            let persistence = Arc::clone(&self.persistence);
            tokio::spawn(async move {
                persistence.pause_private_game(game_id).await;
                persistence.update_values(game_id, states).await;
            });
        }
        *session = Session::default();
        Ok(())
    }
}
