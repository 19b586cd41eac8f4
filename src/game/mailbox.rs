//! Per-Recipient Message Bus
//!
//! Double-buffered mailbox that lets every entity update independently
//! without ordering bugs: within a tick all sends land in the inbox, all
//! reads drain the outbox populated by the previous buffer swap. A message
//! produced while a tick is processing is therefore never visible until the
//! next tick, and each recipient's batch is read exactly once per swap.
//!
//! The buffers are keyed by [`Recipient`]; per-recipient disjointness (not
//! delivery order) is the safety property the tick pipeline relies on.

use std::collections::HashMap;

use tracing::error;

use crate::core::position::{Direction, Position};
use crate::game::entity::{EntityId, Killer};
use crate::game::GameError;

/// Where a message is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// A live entity, by identity.
    Entity(EntityId),
    /// The board's own control slot (moves, bomb drops, detonations).
    Board,
    /// The chat/system log accumulator.
    Log,
}

/// A bomb detonation order posted to the board.
///
/// Carries the data the explosion needs rather than a handle to the bomb,
/// which is reaped in the same tick it expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detonation {
    /// Tile the bomb occupied.
    pub position: Position,
    /// User the bomb belonged to, for kill attribution.
    pub owner: Killer,
}

/// The closed set of message payloads.
///
/// Scalar kinds coalesce (last writer wins within a tick); list kinds
/// accumulate. Which kinds a recipient accepts is checked at dispatch;
/// an unexpected kind is a fatal protocol violation.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Set the recipient's position (ignored while blocked).
    Position(Position),
    /// Set or clear the recipient's blocked flag.
    Blocked(bool),
    /// Arm or clear a user's bomb-dropped flag (starts the cooldown).
    BombDropped(bool),
    /// The recipient was caught in a blast; first killer wins.
    Killed(Killer),
    /// Respawn a user at the given tile with flags reset.
    Reset(Position),
    /// Queue an entity for death when this explosion fades. Accumulates.
    ToKill(EntityId),
    /// A bomb expired; board control slot only. Accumulates.
    Boom(Detonation),
    /// A user asked to move; board control slot only. Accumulates.
    Move(EntityId, Direction),
    /// A user asked to drop a bomb; board control slot only. Accumulates.
    Bomb(EntityId),
    /// Chat or system text for the log channel. Accumulates.
    Log {
        /// Team slot the entry belongs to.
        mod_id: u8,
        /// Entry text.
        text: String,
    },
}

/// Discriminant of a [`Message`], used for coalescing and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MessageKind {
    Position,
    Blocked,
    BombDropped,
    Killed,
    Reset,
    ToKill,
    Boom,
    Move,
    Bomb,
    Log,
}

impl Message {
    /// The kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Position(_) => MessageKind::Position,
            Message::Blocked(_) => MessageKind::Blocked,
            Message::BombDropped(_) => MessageKind::BombDropped,
            Message::Killed(_) => MessageKind::Killed,
            Message::Reset(_) => MessageKind::Reset,
            Message::ToKill(_) => MessageKind::ToKill,
            Message::Boom(_) => MessageKind::Boom,
            Message::Move(_, _) => MessageKind::Move,
            Message::Bomb(_) => MessageKind::Bomb,
            Message::Log { .. } => MessageKind::Log,
        }
    }
}

impl MessageKind {
    /// Scalar kinds replace a pending message of the same kind within a
    /// tick; list kinds always append.
    pub fn coalesces(self) -> bool {
        matches!(
            self,
            MessageKind::Position
                | MessageKind::Blocked
                | MessageKind::BombDropped
                | MessageKind::Killed
                | MessageKind::Reset
        )
    }
}

/// The double-buffered message bus.
#[derive(Debug, Default)]
pub struct Mailbox {
    inbox: HashMap<Recipient, Vec<Message>>,
    outbox: HashMap<Recipient, Vec<Message>>,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `message` into the recipient's pending batch.
    ///
    /// Coalescing kinds overwrite an already-pending message of the same
    /// kind (last writer wins within a tick).
    pub fn send(&mut self, recipient: Recipient, message: Message) {
        let slot = self.inbox.entry(recipient).or_default();
        if message.kind().coalesces() {
            if let Some(pending) = slot.iter_mut().find(|m| m.kind() == message.kind()) {
                *pending = message;
                return;
            }
        }
        slot.push(message);
    }

    /// Append `message` to the recipient's pending batch unconditionally.
    pub fn send_to_list(&mut self, recipient: Recipient, message: Message) {
        self.inbox.entry(recipient).or_default().push(message);
    }

    /// Lift exactly one recipient's pending batch from inbox to outbox,
    /// ahead of the general swap.
    ///
    /// Used by the board to read its own control slot before any producer
    /// targets it this tick. A non-empty outbox here means a previous tick
    /// did not drain its consumers: fatal.
    pub fn drop_key(&mut self, recipient: Recipient) -> Result<(), GameError> {
        if !self.outbox.is_empty() {
            error!("outbox should be empty before lifting a key: {:?}", self.outbox);
            return Err(GameError::UndrainedOutbox(self.outbox.len()));
        }
        if let Some(batch) = self.inbox.remove(&recipient) {
            self.outbox.insert(recipient, batch);
        }
        Ok(())
    }

    /// Swap the buffers wholesale: the inbox becomes this tick's outbox for
    /// consumers, the drained outbox becomes the fresh inbox for producers.
    ///
    /// Precondition: the outbox is empty. Leftover batches are a fatal bug
    /// signal (silent divergence between buffers would corrupt future
    /// ticks).
    pub fn swap(&mut self) -> Result<(), GameError> {
        if !self.outbox.is_empty() {
            error!("outbox should be empty at swap: {:?}", self.outbox);
            return Err(GameError::UndrainedOutbox(self.outbox.len()));
        }
        std::mem::swap(&mut self.inbox, &mut self.outbox);
        Ok(())
    }

    /// Pop and return the recipient's batch from the outbox, empty if none.
    pub fn take(&mut self, recipient: Recipient) -> Vec<Message> {
        self.outbox.remove(&recipient).unwrap_or_default()
    }

    /// Remove every trace of a recipient from both buffers.
    ///
    /// Called when an entity is removed from the board; a dead entity is
    /// never delivered messages.
    pub fn discard(&mut self, recipient: Recipient) {
        self.inbox.remove(&recipient);
        self.outbox.remove(&recipient);
    }

    /// Drop batches addressed to recipients that are no longer live.
    ///
    /// Explosions may queue kills for entities another blast has already
    /// removed; those sends must not survive to trip the swap-boundary
    /// check.
    pub fn sweep<F>(&mut self, live: F)
    where
        F: Fn(&Recipient) -> bool,
    {
        self.inbox.retain(|recipient, _| live(recipient));
        self.outbox.retain(|recipient, _| live(recipient));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(n: u64) -> Recipient {
        Recipient::Entity(EntityId::new(n))
    }

    #[test]
    fn scalar_sends_coalesce_last_writer_wins() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(1), Message::Position(Position::new(1, 1)));
        mailbox.send(entity(1), Message::Position(Position::new(2, 2)));
        mailbox.send(entity(1), Message::Blocked(true));

        mailbox.swap().unwrap();
        let batch = mailbox.take(entity(1));
        assert_eq!(batch.len(), 2);
        assert!(batch.contains(&Message::Position(Position::new(2, 2))));
        assert!(batch.contains(&Message::Blocked(true)));
    }

    #[test]
    fn list_sends_accumulate() {
        let mut mailbox = Mailbox::new();
        mailbox.send_to_list(entity(9), Message::ToKill(EntityId::new(1)));
        mailbox.send_to_list(entity(9), Message::ToKill(EntityId::new(2)));

        mailbox.swap().unwrap();
        let batch = mailbox.take(entity(9));
        assert_eq!(
            batch,
            vec![
                Message::ToKill(EntityId::new(1)),
                Message::ToKill(EntityId::new(2))
            ]
        );
    }

    #[test]
    fn sends_are_invisible_until_swap_and_not_redelivered() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(1), Message::Blocked(true));

        // Not visible before the swap.
        assert!(mailbox.take(entity(1)).is_empty());

        mailbox.swap().unwrap();
        assert_eq!(mailbox.take(entity(1)), vec![Message::Blocked(true)]);

        // Gone on the next tick unless re-sent.
        mailbox.swap().unwrap();
        assert!(mailbox.take(entity(1)).is_empty());
    }

    #[test]
    fn drop_key_lifts_only_the_requested_slot() {
        let mut mailbox = Mailbox::new();
        mailbox.send_to_list(Recipient::Board, Message::Bomb(EntityId::new(3)));
        mailbox.send(entity(3), Message::Blocked(true));

        mailbox.drop_key(Recipient::Board).unwrap();
        assert_eq!(
            mailbox.take(Recipient::Board),
            vec![Message::Bomb(EntityId::new(3))]
        );
        // The entity slot stays pending for the general swap.
        assert!(mailbox.take(entity(3)).is_empty());
        mailbox.swap().unwrap();
        assert_eq!(mailbox.take(entity(3)), vec![Message::Blocked(true)]);
    }

    #[test]
    fn drop_key_of_missing_slot_is_a_no_op() {
        let mut mailbox = Mailbox::new();
        mailbox.drop_key(Recipient::Board).unwrap();
        assert!(mailbox.take(Recipient::Board).is_empty());
    }

    #[test]
    fn undrained_outbox_is_fatal_at_swap() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(1), Message::Blocked(true));
        mailbox.swap().unwrap();

        // Batch for entity 1 was never taken.
        let err = mailbox.swap().unwrap_err();
        assert!(matches!(err, GameError::UndrainedOutbox(1)));
    }

    #[test]
    fn undrained_outbox_is_fatal_at_drop_key() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(1), Message::Blocked(true));
        mailbox.swap().unwrap();

        let err = mailbox.drop_key(Recipient::Board).unwrap_err();
        assert!(matches!(err, GameError::UndrainedOutbox(1)));
    }

    #[test]
    fn sweep_drops_batches_for_removed_entities() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(1), Message::Killed(Killer::new(EntityId::new(7), 1)));
        mailbox.send(Recipient::Log, Message::Log { mod_id: 1, text: "hi".into() });
        mailbox.swap().unwrap();

        // Entity 1 was reaped; its batch must not trip the next swap.
        mailbox.sweep(|r| !matches!(r, Recipient::Entity(id) if *id == EntityId::new(1)));
        assert!(mailbox.take(entity(1)).is_empty());
        assert_eq!(mailbox.take(Recipient::Log).len(), 1);
        mailbox.swap().unwrap();
    }

    #[test]
    fn discard_clears_both_buffers() {
        let mut mailbox = Mailbox::new();
        mailbox.send(entity(5), Message::Blocked(true));
        mailbox.swap().unwrap();
        mailbox.send(entity(5), Message::Blocked(false));

        mailbox.discard(entity(5));
        assert!(mailbox.take(entity(5)).is_empty());
        mailbox.swap().unwrap();
        assert!(mailbox.take(entity(5)).is_empty());
    }
}
