//! # Blastgrid Server
//!
//! Authoritative, tick-based arena server: players and bots move on a
//! toroidal grid, drop bombs, and die to explosions that propagate tile
//! by tile until blocked.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BLASTGRID SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Grid primitives                           │
//! │  └── position.rs - Tile coordinates, toroidal stepping       │
//! │                                                              │
//! │  game/           - Simulation kernel (transport-agnostic)    │
//! │  ├── mailbox.rs  - Double-buffered per-recipient message bus │
//! │  ├── entity.rs   - Entity state machine and variants         │
//! │  ├── path.rs     - A* pathfinder for bots                    │
//! │  ├── bot.rs      - Autonomous user driver                    │
//! │  └── board.rs    - Tick orchestrator, diffing, lifecycle     │
//! │                                                              │
//! │  network/        - WebSocket shim around the kernel          │
//! │  ├── protocol.rs - Wire messages and entity records          │
//! │  └── server.rs   - Accept loop, connections, tick task       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Update model
//!
//! All world mutation flows through the [`game::mailbox::Mailbox`]: within a
//! tick, producers write into the inbox while consumers drain the outbox
//! populated by the previous buffer swap. Each entity's `update` touches
//! only its own outbox slot, so the per-entity update phase is safe to run
//! in any order - the kernel never relies on completion order within a
//! phase, only on the strict ordering of the phases themselves.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

pub use crate::core::position::{Direction, Position};
pub use game::board::GameBoard;
pub use game::entity::EntityId;
pub use game::mailbox::{Mailbox, Message, Recipient};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz). 20 ms per tick.
pub const TICK_RATE: u32 = 50;

/// Board extent along x.
pub const BOARD_LENGTH: i32 = 10;

/// Board extent along y.
pub const BOARD_WIDTH: i32 = 10;

/// Walls regenerated when the board resets.
pub const WALL_COUNT: usize = 20;

/// Maximum concurrent users; connections beyond this are refused.
pub const MAX_USERS: usize = 4;

/// A* node-expansion budget per query.
pub const MAX_PATH_ITER: u32 = 100;
