//! Shared protocol crate for the galaxy arena server.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Operation (client -> server) and Event (server -> client) codecs
//! - Shared types (Color, Vector2D, PlayerId)

mod binary;
mod error;
pub mod packets;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use packets::{Event, FoodItem, Operation};

/// Width of the playable world.
pub const WORLD_WIDTH: u32 = 10_000;
/// Height of the playable world.
pub const WORLD_HEIGHT: u32 = 10_000;

/// RGB color used for players and food.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A position in world units.
pub type Vector2D = glam::UVec2;

/// Stable game identity, shared with the persistence store.
pub type PlayerId = uuid::Uuid;

/// Manhattan distance between two positions, saturating at `u32::MAX`.
///
/// Positions come from clients unchecked and may lie far outside the world.
#[inline]
pub fn manhattan(a: Vector2D, b: Vector2D) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}
