//! External score store.
//!
//! Every call is best-effort: implementations log failures and return
//! normally so gameplay never depends on the store being reachable.

mod http;

pub use http::HttpPersistence;

use crate::entity::Stats;
use async_trait::async_trait;
use protocol::{PlayerId, Vector2D};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted position and score of one player in a private match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(rename = "id_user")]
    pub player_id: PlayerId,
    #[serde(rename = "x_position")]
    pub x: u32,
    #[serde(rename = "y_position")]
    pub y: u32,
    pub score: u32,
}

impl PlayerState {
    pub fn position(&self) -> Vector2D {
        Vector2D::new(self.x, self.y)
    }

    /// Radius the store's score corresponds to.
    pub fn radius(&self) -> u32 {
        self.score.saturating_mul(10)
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn start_private_game(&self, game_id: u32);

    async fn pause_private_game(&self, game_id: u32);

    /// Saved state of a private match; empty if none or on failure.
    async fn get_values(&self, game_id: u32) -> Vec<PlayerState>;

    async fn update_values(&self, game_id: u32, players: Vec<PlayerState>);

    async fn post_achievements(&self, player_id: PlayerId, stats: Stats);
}

/// Used when no store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersistence;

#[async_trait]
impl Persistence for NullPersistence {
    async fn start_private_game(&self, _game_id: u32) {}

    async fn pause_private_game(&self, _game_id: u32) {}

    async fn get_values(&self, _game_id: u32) -> Vec<PlayerState> {
        Vec::new()
    }

    async fn update_values(&self, _game_id: u32, _players: Vec<PlayerState>) {}

    async fn post_achievements(&self, _player_id: PlayerId, _stats: Stats) {}
}
