//! Tile Coordinates
//!
//! Integer grid positions with value equality, usable as map keys for
//! spatial lookups. Movement wraps at the board edges (toroidal grid);
//! explosion rays and pathfinding use the non-wrapping neighbor forms.

use serde::{Deserialize, Serialize};

use crate::{BOARD_LENGTH, BOARD_WIDTH};

/// A tile on the board. `0 <= x < BOARD_LENGTH`, `0 <= y < BOARD_WIDTH`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Column, along the board length.
    pub x: i32,
    /// Row, along the board width.
    pub y: i32,
}

impl Position {
    /// Create a position. Callers are responsible for bounds.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether this position lies inside the board.
    pub fn in_bounds(self) -> bool {
        self.x >= 0 && self.x < BOARD_LENGTH && self.y >= 0 && self.y < BOARD_WIDTH
    }

    /// One step in `direction`, wrapping at the board edges.
    pub fn step(self, direction: Direction) -> Self {
        match direction {
            Direction::Right => Self::new((self.x + 1).rem_euclid(BOARD_LENGTH), self.y),
            Direction::Left => Self::new((self.x - 1).rem_euclid(BOARD_LENGTH), self.y),
            Direction::Down => Self::new(self.x, (self.y + 1).rem_euclid(BOARD_WIDTH)),
            Direction::Up => Self::new(self.x, (self.y - 1).rem_euclid(BOARD_WIDTH)),
        }
    }

    /// The four cardinal neighbors without wrapping; may be out of bounds.
    pub fn raw_neighbors(self) -> [Self; 4] {
        [
            Self::new(self.x, self.y - 1),
            Self::new(self.x, self.y + 1),
            Self::new(self.x - 1, self.y),
            Self::new(self.x + 1, self.y),
        ]
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, {}>", self.x, self.y)
    }
}

/// A compass move request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// -y
    Up,
    /// +y
    Down,
    /// -x
    Left,
    /// +x
    Right,
}

impl Direction {
    /// All four directions.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}
