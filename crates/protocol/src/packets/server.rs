//! Server -> Client events.

use super::{EventType, begin_frame, end_frame, open_frame};
use crate::{Color, PlayerId, ProtocolError, Vector2D};
use bytes::Bytes;

/// Wire size of one food entry (position + color).
const FOOD_ITEM_LEN: usize = 11;

/// A food entry as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoodItem {
    pub position: Vector2D,
    pub color: Color,
}

/// A server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Private acknowledgement that the receiver entered the match.
    Joined {
        player_id: PlayerId,
        position: Vector2D,
        radius: u32,
    },
    NewFood { food: Vec<FoodItem> },
    NewPlayer {
        player_id: PlayerId,
        position: Vector2D,
        radius: u32,
        color: Color,
        skin: Option<String>,
        username: String,
    },
    PlayerMove { player_id: PlayerId, position: Vector2D },
    PlayerGrow { player_id: PlayerId, radius: u32 },
    DestroyFood { position: Vector2D },
    DestroyPlayer { player_id: PlayerId },
    Pause,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Joined { .. } => EventType::Joined,
            Event::NewFood { .. } => EventType::NewFood,
            Event::NewPlayer { .. } => EventType::NewPlayer,
            Event::PlayerMove { .. } => EventType::PlayerMove,
            Event::PlayerGrow { .. } => EventType::PlayerGrow,
            Event::DestroyFood { .. } => EventType::DestroyFood,
            Event::DestroyPlayer { .. } => EventType::DestroyPlayer,
            Event::Pause => EventType::Pause,
        }
    }

    /// Build the frame for this event.
    pub fn encode(&self) -> Bytes {
        let hint = match self {
            Event::NewFood { food } => 4 + food.len() * FOOD_ITEM_LEN,
            _ => 48,
        };
        let mut w = begin_frame(self.event_type() as u8, hint);
        match self {
            Event::Joined {
                player_id,
                position,
                radius,
            } => {
                w.put_player_id(player_id);
                w.put_vector(*position);
                w.put_u32(*radius);
            }
            Event::NewFood { food } => {
                w.put_u32(food.len() as u32);
                for item in food {
                    w.put_vector(item.position);
                    w.put_color(item.color);
                }
            }
            Event::NewPlayer {
                player_id,
                position,
                radius,
                color,
                skin,
                username,
            } => {
                w.put_player_id(player_id);
                w.put_vector(*position);
                w.put_u32(*radius);
                w.put_color(*color);
                w.put_optional_string(skin.as_deref());
                w.put_string(username);
            }
            Event::PlayerMove {
                player_id,
                position,
            } => {
                w.put_player_id(player_id);
                w.put_vector(*position);
            }
            Event::PlayerGrow { player_id, radius } => {
                w.put_player_id(player_id);
                w.put_u32(*radius);
            }
            Event::DestroyFood { position } => w.put_vector(*position),
            Event::DestroyPlayer { player_id } => w.put_player_id(player_id),
            Event::Pause => {}
        }
        end_frame(w)
    }

    /// Parse an event from a complete frame.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = open_frame(data)?;
        let event = match EventType::try_from(reader.get_u8()?)? {
            EventType::Joined => Event::Joined {
                player_id: reader.get_player_id()?,
                position: reader.get_vector()?,
                radius: reader.get_u32()?,
            },
            EventType::NewFood => {
                let count = reader.get_u32()? as usize;
                if reader.remaining() < count.saturating_mul(FOOD_ITEM_LEN) {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let mut food = Vec::with_capacity(count);
                for _ in 0..count {
                    food.push(FoodItem {
                        position: reader.get_vector()?,
                        color: reader.get_color()?,
                    });
                }
                Event::NewFood { food }
            }
            EventType::NewPlayer => Event::NewPlayer {
                player_id: reader.get_player_id()?,
                position: reader.get_vector()?,
                radius: reader.get_u32()?,
                color: reader.get_color()?,
                skin: reader.get_optional_string()?,
                username: reader.get_string()?,
            },
            EventType::PlayerMove => Event::PlayerMove {
                player_id: reader.get_player_id()?,
                position: reader.get_vector()?,
            },
            EventType::PlayerGrow => Event::PlayerGrow {
                player_id: reader.get_player_id()?,
                radius: reader.get_u32()?,
            },
            EventType::DestroyFood => Event::DestroyFood {
                position: reader.get_vector()?,
            },
            EventType::DestroyPlayer => Event::DestroyPlayer {
                player_id: reader.get_player_id()?,
            },
            EventType::Pause => Event::Pause,
        };
        reader.finish()?;
        Ok(event)
    }
}
