//! Checks applied to client-reported physics.
//!
//! Positions and radii are taken from the client. Everything the server
//! decides about them lives here, one function per operation, so tightening
//! the rules does not touch dispatch.

use super::OperationError;
use protocol::Vector2D;

/// Move: positions are accepted as reported.
#[inline]
pub fn move_position(claimed: Vector2D) -> Vector2D {
    claimed
}

/// EatFood: the claimed radius is trusted but can never shrink the player.
#[inline]
pub fn food_radius(current: u32, claimed: u32) -> u32 {
    current.max(claimed)
}

/// EatPlayer: the only integrity check in the protocol. The eater must be
/// strictly larger than its victim at the time of the check.
pub fn eat_player(eater_radius: u32, victim_radius: u32) -> Result<(), OperationError> {
    if eater_radius <= victim_radius {
        return Err(OperationError::Undersized {
            eater: eater_radius,
            victim: victim_radius,
        });
    }
    Ok(())
}

/// EatPlayer: same growth rule as food.
#[inline]
pub fn player_radius(current: u32, claimed: u32) -> u32 {
    current.max(claimed)
}

/// Join: usernames are cut to `max_len` characters.
pub fn username(claimed: &str, max_len: usize) -> String {
    claimed.trim().chars().take(max_len).collect()
}
