use super::bot_player::Bot;
use crate::config::BotConfig;
use crate::entity::{self, Identity, Player};
use crate::world::World;
use protocol::PlayerId;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

/// Bot names to use.
const BOT_NAMES: &[&str] = &[
    "Andromeda", "Aquarius", "Aries", "Cassiopeia", "Cygnus", "Draco", "Gemini", "Lyra", "Orion",
    "Perseus", "Phoenix", "Pisces", "Sagittarius", "Scorpius", "Taurus", "Ursa", "Vela",
];

fn constellation_name() -> &'static str {
    let mut rng = rand::rng();
    BOT_NAMES[rng.random_range(0..BOT_NAMES.len())]
}

/// Keeps a public match populated while humans are playing.
#[derive(Debug)]
pub struct BotManager {
    world: Arc<World>,
    config: BotConfig,
}

/// Start the maintenance loop for `world` on its own task.
pub fn start(world: Arc<World>) {
    let config = world.bot_config().clone();
    tokio::spawn(BotManager::new(world, config).run());
}

impl BotManager {
    pub fn new(world: Arc<World>, config: BotConfig) -> Self {
        Self { world, config }
    }

    async fn run(self) {
        info!(
            "Bot maintenance started (every {:?}, up to {} players)",
            self.config.spawn_interval(),
            self.config.min_players
        );
        loop {
            tokio::time::sleep(self.config.spawn_interval()).await;
            if !self.tick() && self.world.stop_bot_maintenance() {
                info!("No human players left, bot maintenance stopped");
                break;
            }
        }
    }

    /// One maintenance pass. Returns `false` when no human is playing.
    pub fn tick(&self) -> bool {
        let population = self.world.population();
        if population.humans == 0 {
            return false;
        }
        if population.total < self.config.min_players {
            self.add_bot();
        }
        true
    }

    /// Register a new bot and start its control loop.
    pub fn add_bot(&self) -> Arc<Player> {
        let identity = Identity {
            player_id: PlayerId::new_v4(),
            username: constellation_name().to_string(),
            color: entity::random_color(),
            skin: None,
        };
        let player = self.world.register_bot(identity);
        Bot::new(Arc::clone(&player), self.config.clone()).spawn(Arc::clone(&self.world));
        player
    }
}
