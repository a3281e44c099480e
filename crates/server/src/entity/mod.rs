//! Game entities.
//!
//! Players (human or bot) and food pellets.

mod food;
mod player;

pub use food::{Food, spawn_pool};
pub use player::{Body, Identity, Player, Stats, score_for_radius};

use protocol::{Color, Vector2D};
use rand::Rng;

/// Server-assigned transport identity, fixed for the life of a socket.
pub type ConnectionId = u64;

/// A uniformly random position inside a `width` x `height` world.
pub fn random_position(width: u32, height: u32) -> Vector2D {
    let mut rng = rand::rng();
    Vector2D::new(rng.random_range(0..width.max(1)), rng.random_range(0..height.max(1)))
}

/// A random, reasonably bright color.
pub fn random_color() -> Color {
    let mut rng = rand::rng();
    Color::new(
        rng.random_range(50..=255),
        rng.random_range(50..=255),
        rng.random_range(50..=255),
    )
}
