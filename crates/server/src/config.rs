//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub bots: BotConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load configuration from `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.world.width == 0 || self.world.height == 0 {
            anyhow::bail!("world.width and world.height must be positive");
        }
        if self.bots.tick_ms == 0 {
            anyhow::bail!("bots.tick_ms must be positive");
        }
        if self.bots.spawn_interval_ms == 0 {
            anyhow::bail!("bots.spawn_interval_ms must be positive");
        }
        if self.transport.queue_capacity == 0 {
            anyhow::bail!("transport.queue_capacity must be positive");
        }
        if self.transport.heartbeat_secs == 0 {
            anyhow::bail!("transport.heartbeat_secs must be positive");
        }
        if self.transport.read_timeout_secs == 0 {
            anyhow::bail!("transport.read_timeout_secs must be positive");
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

/// Match and world settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Size of the food pool, kept constant for the life of the world.
    #[serde(default = "default_food_count")]
    pub food_count: usize,
    /// Radius every player starts with.
    #[serde(default = "default_start_radius")]
    pub start_radius: u32,
    /// Usernames longer than this are truncated at Join.
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,
    /// Host a private match (gameID-bound, persisted) instead of a public one.
    #[serde(default)]
    pub private: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            food_count: default_food_count(),
            start_radius: default_start_radius(),
            max_username_length: default_max_username_length(),
            private: false,
        }
    }
}

fn default_width() -> u32 {
    protocol::WORLD_WIDTH
}
fn default_height() -> u32 {
    protocol::WORLD_HEIGHT
}
fn default_food_count() -> usize {
    2000
}
fn default_start_radius() -> u32 {
    50
}
fn default_max_username_length() -> usize {
    24
}

/// Bot spawner and bot AI tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Fill sparse public matches with bots.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the spawner wakes up.
    #[serde(default = "default_spawn_interval_ms")]
    pub spawn_interval_ms: u64,
    /// Spawn bots while the match has fewer players than this.
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    /// Bot control loop period.
    #[serde(default = "default_bot_tick_ms")]
    pub tick_ms: u64,
    /// Targets farther than this (Manhattan) are ignored.
    #[serde(default = "default_max_range")]
    pub max_range: u32,
    /// Maximum movement per axis per tick.
    #[serde(default = "default_speed")]
    pub speed: u32,
    /// Distance bonus given to player targets over food.
    #[serde(default = "default_player_preference")]
    pub player_preference: u32,
    /// Steps taken toward one target before picking again.
    #[serde(default = "default_retarget_steps")]
    pub retarget_steps: u32,
    /// How much smaller a player must be before a bot tries to eat it.
    #[serde(default = "default_prey_margin")]
    pub prey_margin: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_interval_ms: default_spawn_interval_ms(),
            min_players: default_min_players(),
            tick_ms: default_bot_tick_ms(),
            max_range: default_max_range(),
            speed: default_speed(),
            player_preference: default_player_preference(),
            retarget_steps: default_retarget_steps(),
            prey_margin: default_prey_margin(),
        }
    }
}

impl BotConfig {
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_spawn_interval_ms() -> u64 {
    10_000
}
fn default_min_players() -> usize {
    5
}
fn default_bot_tick_ms() -> u64 {
    60
}
fn default_max_range() -> u32 {
    1100
}
fn default_speed() -> u32 {
    10
}
fn default_player_preference() -> u32 {
    500
}
fn default_retarget_steps() -> u32 {
    25
}
fn default_prey_margin() -> u32 {
    5
}

/// Per-connection transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Outbound frames buffered per connection before it is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Idle time before the write loop sends a ping.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// A peer silent for this long is considered dead.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Largest inbound message accepted.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl TransportConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_queue_capacity() -> usize {
    2048
}
fn default_heartbeat_secs() -> u64 {
    54
}
fn default_read_timeout_secs() -> u64 {
    60
}
fn default_max_frame_size() -> usize {
    512
}

/// External score store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// Base URL of the store; persistence is disabled when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_persistence_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_persistence_timeout_ms(),
        }
    }
}

impl PersistenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_persistence_timeout_ms() -> u64 {
    3000
}
