//! Wire protocol for client-server communication.
//!
//! Clients send small JSON objects (an action keyword or a chat line);
//! the server pushes tagged JSON messages: a one-shot `init` snapshot,
//! incremental `map` diffs, and batched `log` lines.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::position::Direction;
use crate::game::entity::Spread;

/// Messages sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// A movement or bomb keypress, e.g. `{"action": "left"}`.
    Action { action: PlayerAction },
    /// A chat line broadcast to every connected client.
    Chat { chat: String },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The five keys a player can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    Up,
    Down,
    Left,
    Right,
    Bomb,
}

impl PlayerAction {
    /// Movement actions map to a grid direction; `Bomb` has none.
    pub fn as_direction(self) -> Option<Direction> {
        match self {
            PlayerAction::Up => Some(Direction::Up),
            PlayerAction::Down => Some(Direction::Down),
            PlayerAction::Left => Some(Direction::Left),
            PlayerAction::Right => Some(Direction::Right),
            PlayerAction::Bomb => None,
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full board snapshot sent once, right after the handshake.
    Init(InitState),
    /// Incremental board diff, one per tick with visible changes.
    Map(EntityGroups),
    /// Chat and lifecycle lines accumulated during the tick.
    Log { logs: Vec<LogEntry> },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fields shared by every entity record on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseRecord {
    pub x: i32,
    pub y: i32,
    pub dead: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    #[serde(rename = "mod")]
    pub mod_id: u8,
    pub id: Uuid,
    pub can_drop: bool,
    pub deaths: u32,
    pub killed: u32,
    pub suicides: u32,
    #[serde(flatten)]
    pub base: BaseRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BombRecord {
    pub bomb_state: u8,
    #[serde(flatten)]
    pub base: BaseRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplosionRecord {
    pub explosion_state: u8,
    pub direction: Spread,
    #[serde(flatten)]
    pub base: BaseRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallRecord {
    pub wall_state: u8,
    #[serde(flatten)]
    pub base: BaseRecord,
}

/// One entity as it appears in a snapshot tile. `Cleared` marks a tile
/// that emptied out since the previous diff so clients can erase it.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(UserRecord),
    Bomb(BombRecord),
    Explosion(ExplosionRecord),
    Wall(WallRecord),
    Cleared(BaseRecord),
}

/// Records bucketed by entity kind, the shape clients render from.
/// Empty groups are omitted from the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityGroups {
    #[serde(rename = "user", skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserRecord>,
    #[serde(rename = "bomb", skip_serializing_if = "Vec::is_empty")]
    pub bombs: Vec<BombRecord>,
    #[serde(rename = "explosion", skip_serializing_if = "Vec::is_empty")]
    pub explosions: Vec<ExplosionRecord>,
    #[serde(rename = "wall", skip_serializing_if = "Vec::is_empty")]
    pub walls: Vec<WallRecord>,
    #[serde(rename = "entity", skip_serializing_if = "Vec::is_empty")]
    pub cleared: Vec<BaseRecord>,
}

impl EntityGroups {
    pub fn push(&mut self, record: Record) {
        match record {
            Record::User(r) => self.users.push(r),
            Record::Bomb(r) => self.bombs.push(r),
            Record::Explosion(r) => self.explosions.push(r),
            Record::Wall(r) => self.walls.push(r),
            Record::Cleared(r) => self.cleared.push(r),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.bombs.is_empty()
            && self.explosions.is_empty()
            && self.walls.is_empty()
            && self.cleared.is_empty()
    }
}

/// Payload of the `init` message: board dimensions, the receiving
/// client's public id, and every entity currently on the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitState {
    pub length: i32,
    pub width: i32,
    pub id: Uuid,
    #[serde(flatten)]
    pub groups: EntityGroups,
}

/// One chat or lifecycle line, attributed to a player slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "mod")]
    pub mod_id: u8,
    pub text: String,
}
