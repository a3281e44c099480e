//! Client -> Server operations.

use super::{OperationType, begin_frame, end_frame, open_frame};
use crate::{Color, PlayerId, ProtocolError, Vector2D};
use bytes::Bytes;

/// A parsed client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Enter the match under a client-chosen identity.
    Join {
        player_id: PlayerId,
        username: String,
        color: Color,
        skin: Option<String>,
        game_id: Option<u32>,
    },
    /// Report a new avatar position.
    Move { position: Vector2D },
    /// Report that the avatar consumed the food at `food_position`.
    EatFood { food_position: Vector2D, new_radius: u32 },
    /// Report that the avatar consumed another player.
    EatPlayer { player_eaten: PlayerId, new_radius: u32 },
    /// Leave the match.
    Leave,
    /// Pause a private match.
    Pause,
}

impl Operation {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Operation::Join { .. } => OperationType::Join,
            Operation::Move { .. } => OperationType::Move,
            Operation::EatFood { .. } => OperationType::EatFood,
            Operation::EatPlayer { .. } => OperationType::EatPlayer,
            Operation::Leave => OperationType::Leave,
            Operation::Pause => OperationType::Pause,
        }
    }

    /// Parse an operation from a complete frame.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = open_frame(data)?;
        let op = match OperationType::try_from(reader.get_u8()?)? {
            OperationType::Join => Operation::Join {
                player_id: reader.get_player_id()?,
                username: reader.get_string()?,
                color: reader.get_color()?,
                skin: reader.get_optional_string()?,
                game_id: reader.get_optional_u32()?,
            },
            OperationType::Move => Operation::Move {
                position: reader.get_vector()?,
            },
            OperationType::EatFood => Operation::EatFood {
                food_position: reader.get_vector()?,
                new_radius: reader.get_u32()?,
            },
            OperationType::EatPlayer => Operation::EatPlayer {
                player_eaten: reader.get_player_id()?,
                new_radius: reader.get_u32()?,
            },
            OperationType::Leave => Operation::Leave,
            OperationType::Pause => Operation::Pause,
        };
        reader.finish()?;
        Ok(op)
    }

    /// Build the frame for this operation.
    pub fn encode(&self) -> Bytes {
        let mut w = begin_frame(self.operation_type() as u8, 32);
        match self {
            Operation::Join {
                player_id,
                username,
                color,
                skin,
                game_id,
            } => {
                w.put_player_id(player_id);
                w.put_string(username);
                w.put_color(*color);
                w.put_optional_string(skin.as_deref());
                w.put_optional_u32(*game_id);
            }
            Operation::Move { position } => w.put_vector(*position),
            Operation::EatFood {
                food_position,
                new_radius,
            } => {
                w.put_vector(*food_position);
                w.put_u32(*new_radius);
            }
            Operation::EatPlayer {
                player_eaten,
                new_radius,
            } => {
                w.put_player_id(player_eaten);
                w.put_u32(*new_radius);
            }
            Operation::Leave | Operation::Pause => {}
        }
        end_frame(w)
    }
}
