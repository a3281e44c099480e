//! HTTP/JSON client for the score store.

use super::{Persistence, PersistenceError, PlayerState};
use crate::entity::Stats;
use async_trait::async_trait;
use protocol::PlayerId;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct GameRef {
    #[serde(rename = "gameId")]
    game_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Achievement {
    user_id: String,
    achievement_type: &'static str,
    quantity: u32,
}

fn achievements(player_id: PlayerId, stats: &Stats) -> [Achievement; 3] {
    let user_id = player_id.to_string();
    [
        Achievement {
            user_id: user_id.clone(),
            achievement_type: "maxScore",
            quantity: stats.score,
        },
        Achievement {
            user_id: user_id.clone(),
            achievement_type: "playersEliminated",
            quantity: stats.killed_players,
        },
        Achievement {
            user_id,
            achievement_type: "timePlayed",
            quantity: stats.time_played().as_secs().min(u32::MAX as u64) as u32,
        },
    ]
}

/// Store client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPersistence {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), PersistenceError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(PersistenceError::Status(resp.status()));
        }
        Ok(())
    }

    async fn fetch_values(&self, game_id: u32) -> Result<Vec<PlayerState>, PersistenceError> {
        let resp = self
            .client
            .get(self.url(&format!("/private/getValues/{}", game_id)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PersistenceError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Persistence for HttpPersistence {
    async fn start_private_game(&self, game_id: u32) {
        if let Err(e) = self.post_json("/private/startPrivateGame", &GameRef { game_id }).await {
            warn!("startPrivateGame for game {} failed: {}", game_id, e);
        }
    }

    async fn pause_private_game(&self, game_id: u32) {
        if let Err(e) = self.post_json("/private/pausePrivateGame", &GameRef { game_id }).await {
            warn!("pausePrivateGame for game {} failed: {}", game_id, e);
        }
    }

    async fn get_values(&self, game_id: u32) -> Vec<PlayerState> {
        match self.fetch_values(game_id).await {
            Ok(states) => {
                info!("Loaded {} saved players for game {}", states.len(), game_id);
                states
            }
            Err(e) => {
                warn!("getValues for game {} failed: {}", game_id, e);
                Vec::new()
            }
        }
    }

    async fn update_values(&self, game_id: u32, players: Vec<PlayerState>) {
        debug!("Uploading {} players for game {}", players.len(), game_id);
        let path = format!("/private/uploadValues/{}", game_id);
        if let Err(e) = self.post_json(&path, &players).await {
            warn!("uploadValues for game {} failed: {}", game_id, e);
        }
    }

    async fn post_achievements(&self, player_id: PlayerId, stats: Stats) {
        for achievement in achievements(player_id, &stats) {
            if let Err(e) = self
                .post_json("/achievements/update-achievement", &achievement)
                .await
            {
                warn!(
                    "Posting {} for {} failed: {}",
                    achievement.achievement_type, player_id, e
                );
            }
        }
    }
}
