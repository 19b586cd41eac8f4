//! Autonomous User Driver
//!
//! A bot is an ordinary [`User`](crate::game::entity::User) carrying a
//! [`BotState`]: every replan interval it picks a target among the other
//! users, asks the pathfinder for a route, and submits the first step
//! through the same validated movement path a human command takes.

use std::collections::HashMap;

use crate::game::entity::{EntityId, User};
use crate::TICK_RATE;

/// Ticks between bot replans (0.5 s).
pub const BOT_REPLAN_TICKS: u32 = TICK_RATE / 2;

/// Planner state stored on a bot user.
#[derive(Debug, Default)]
pub struct BotState {
    /// The user currently being pursued.
    pub target: Option<EntityId>,
    replan_left: u32,
}

impl BotState {
    /// Fresh planner state; the first plan happens on the next tick.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the replan countdown. Returns `true` when a plan is due.
    pub fn tick(&mut self) -> bool {
        if self.replan_left > 0 {
            self.replan_left -= 1;
            return false;
        }
        self.replan_left = BOT_REPLAN_TICKS;
        true
    }
}

/// Pick a pursuit target for `bot_id`.
///
/// Keeps the current target while it is still on the board; otherwise
/// falls back to the lowest-id other user, bot or human. Returns `None`
/// when the bot is alone.
pub fn select_target(
    users: &HashMap<EntityId, User>,
    bot_id: EntityId,
    current: Option<EntityId>,
) -> Option<EntityId> {
    if let Some(target) = current {
        if target != bot_id && users.contains_key(&target) {
            return Some(target);
        }
    }
    users.keys().filter(|id| **id != bot_id).min().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::Position;

    fn user(n: u64) -> (EntityId, User) {
        let id = EntityId::new(n);
        (id, User::new(id, Position::new(0, 0), 1, None))
    }

    #[test]
    fn replan_fires_every_interval() {
        let mut state = BotState::new();
        assert!(state.tick());
        for _ in 0..BOT_REPLAN_TICKS {
            assert!(!state.tick());
        }
        assert!(state.tick());
    }

    #[test]
    fn keeps_a_target_that_is_still_connected() {
        let mut users = HashMap::new();
        for n in [1, 2, 3] {
            let (id, u) = user(n);
            users.insert(id, u);
        }
        let bot = EntityId::new(1);

        let picked = select_target(&users, bot, Some(EntityId::new(3)));
        assert_eq!(picked, Some(EntityId::new(3)));
    }

    #[test]
    fn replaces_a_vanished_target_and_never_picks_itself() {
        let mut users = HashMap::new();
        for n in [1, 2] {
            let (id, u) = user(n);
            users.insert(id, u);
        }
        let bot = EntityId::new(1);

        let picked = select_target(&users, bot, Some(EntityId::new(9)));
        assert_eq!(picked, Some(EntityId::new(2)));

        users.remove(&EntityId::new(2));
        assert_eq!(select_target(&users, bot, picked), None);
    }
}
