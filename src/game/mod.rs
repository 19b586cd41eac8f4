//! Simulation kernel: message bus, entity state machines, pathfinding,
//! and the tick orchestrator. Transport-agnostic; the network layer only
//! posts control messages and consumes tick output.

pub mod board;
pub mod bot;
pub mod entity;
pub mod mailbox;
pub mod path;

use mailbox::MessageKind;
use thiserror::Error;

/// Fatal simulation-invariant violations.
///
/// These signal programmer errors in the message protocol, not runtime
/// conditions to recover from: they propagate out of the tick loop and
/// terminate it.
#[derive(Debug, Error)]
pub enum GameError {
    /// The outbox still held batches at a swap boundary; a previous tick
    /// did not fully drain its consumers.
    #[error("outbox not drained at swap boundary: {0} pending recipients")]
    UndrainedOutbox(usize),

    /// A message kind was delivered to a recipient that does not handle it.
    #[error("{kind:?} message delivered to {recipient} was not consumed")]
    UnhandledMessage {
        /// The offending message kind.
        kind: MessageKind,
        /// Name of the recipient that received it.
        recipient: &'static str,
    },
}
