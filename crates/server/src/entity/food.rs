//! Food pellets.

use protocol::{Color, FoodItem, Vector2D};

/// A food pellet that any player can eat. Immutable once spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Food {
    pub position: Vector2D,
    pub color: Color,
}

impl Food {
    pub fn new(position: Vector2D, color: Color) -> Self {
        Self { position, color }
    }

    /// Spawn a pellet at a random spot inside a `width` x `height` world.
    pub fn random(width: u32, height: u32) -> Self {
        Self::new(super::random_position(width, height), super::random_color())
    }

    /// Wire representation.
    #[inline]
    pub fn to_item(&self) -> FoodItem {
        FoodItem {
            position: self.position,
            color: self.color,
        }
    }
}

/// Fill a fresh pool of `count` pellets.
pub fn spawn_pool(count: usize, width: u32, height: u32) -> Vec<Food> {
    (0..count).map(|_| Food::random(width, height)).collect()
}
