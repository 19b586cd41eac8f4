//! Entity State Machines
//!
//! Base behavior shared by everything on the board (position, block/kill
//! flags, a finite timed state sequence) plus the four concrete variants:
//! users, bombs, explosions, and walls. Entities never mutate one another
//! directly; all cross-entity effects travel through the mailbox and take
//! effect on the next tick's delivery.

use serde::Serialize;
use uuid::Uuid;

use crate::core::position::Position;
use crate::game::bot::BotState;
use crate::game::mailbox::{Detonation, Mailbox, Message, Recipient};
use crate::game::GameError;
use crate::TICK_RATE;

/// Stable identity of a simulated entity, used as the mailbox key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw id. The board allocates these sequentially.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribution handle for a kill: the owning user's identity and team slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Killer {
    /// The user the kill is credited to.
    pub id: EntityId,
    /// That user's mod (team slot), for the kill log.
    pub mod_id: u8,
}

impl Killer {
    /// Build an attribution handle.
    pub const fn new(id: EntityId, mod_id: u8) -> Self {
        Self { id, mod_id }
    }
}

/// Variant tag; capability flags are a function of this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// Human- or bot-controlled player.
    User,
    /// Armed bomb, exploding after its state sequence expires.
    Bomb,
    /// One tile of a blast.
    Explosion,
    /// Destructible obstacle.
    Wall,
}

impl EntityKind {
    /// Whether this variant occupies its tile for collision purposes.
    pub fn blockable(self) -> bool {
        matches!(self, EntityKind::User | EntityKind::Bomb | EntityKind::Wall)
    }

    /// Whether an explosion can erase this variant.
    pub fn destructible(self) -> bool {
        matches!(self, EntityKind::User | EntityKind::Wall)
    }

    /// Lowercase wire/log name of the variant.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Bomb => "bomb",
            EntityKind::Explosion => "explosion",
            EntityKind::Wall => "wall",
        }
    }
}

/// Propagation direction tag carried by an explosion tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Spread {
    /// Along the x axis.
    #[serde(rename = "v")]
    Vertical,
    /// Along the y axis.
    #[serde(rename = "h")]
    Horizontal,
    /// The bomb's own tile.
    #[serde(rename = "f")]
    Omni,
}

/// State shared by every entity variant.
#[derive(Debug)]
pub struct EntityCore {
    /// Identity; also the mailbox key.
    pub id: EntityId,
    /// Current tile. Mutated only via message delivery or respawn.
    pub position: Position,
    /// While set, position updates are suppressed.
    pub blocked: bool,
    /// First killer wins; `Some` means death is committed for this life.
    pub killed: Option<Killer>,
    /// Terminal flag; reaped by the board once set.
    pub dead: bool,
    state_seq: &'static [u8],
    state_index: usize,
    state_interval: u32,
    state_left: Option<u32>,
}

impl EntityCore {
    fn new(
        id: EntityId,
        position: Position,
        state_seq: &'static [u8],
        state_interval: u32,
        armed: bool,
    ) -> Self {
        Self {
            id,
            position,
            blocked: false,
            killed: None,
            dead: false,
            state_seq,
            state_index: 0,
            state_interval,
            state_left: armed.then_some(state_interval),
        }
    }

    /// Current visible lifecycle phase.
    pub fn state(&self) -> u8 {
        self.state_seq[self.state_index]
    }

    /// Apply a delivered position unless blocked.
    fn apply_position(&mut self, position: Position) {
        if !self.blocked {
            self.position = position;
        }
    }

    /// Record a kill, first killer wins. Returns whether it took effect.
    fn note_killed(&mut self, killer: Killer) -> bool {
        if self.killed.is_some() {
            return false;
        }
        self.killed = Some(killer);
        true
    }

    /// Advance the timed state countdown by one tick.
    ///
    /// Returns `true` exactly once, when the countdown expires on the last
    /// element of the sequence; the variant then performs its death. The
    /// index only moves forward and never wraps.
    fn tick_state(&mut self) -> bool {
        let Some(left) = self.state_left else {
            return false;
        };
        if left == 0 {
            if self.state_index + 1 == self.state_seq.len() {
                self.state_left = None;
                return true;
            }
            self.state_index += 1;
            self.state_left = Some(self.state_interval);
        } else {
            self.state_left = Some(left - 1);
        }
        false
    }
}

// =============================================================================
// USER
// =============================================================================

/// A player, driven by a websocket connection or by the bot planner.
///
/// The transport handle itself lives in the network layer, keyed by
/// [`EntityId`]; the kernel never touches it.
#[derive(Debug)]
pub struct User {
    /// Shared entity state.
    pub core: EntityCore,
    /// Stable id surfaced on the wire.
    pub uuid: Uuid,
    /// Team slot, 1..=4.
    pub mod_id: u8,
    /// Autonomous driver state; `Some` makes this user a bot.
    pub bot: Option<BotState>,
    bomb_cooldown: u32,
    bomb_dropped: bool,
    /// Kills credited to this user.
    pub nb_kill: u32,
    /// Deaths to someone else's blast.
    pub nb_death: u32,
    /// Deaths to the user's own blast.
    pub nb_suicide: u32,
}

impl User {
    /// Ticks a fresh bomb stays unavailable after a drop (1 s).
    pub const BOMB_COOLDOWN_TICKS: u32 = TICK_RATE;

    const STATE: &'static [u8] = &[0];

    /// Create a user at a spawn tile.
    pub fn new(id: EntityId, position: Position, mod_id: u8, bot: Option<BotState>) -> Self {
        Self {
            core: EntityCore::new(id, position, Self::STATE, 0, false),
            uuid: Uuid::new_v4(),
            mod_id,
            bot,
            bomb_cooldown: 0,
            bomb_dropped: false,
            nb_kill: 0,
            nb_death: 0,
            nb_suicide: 0,
        }
    }

    /// Whether a bomb drop would be honored right now.
    pub fn can_drop_bomb(&self) -> bool {
        !self.bomb_dropped && self.core.killed.is_none() && !self.core.blocked
    }

    /// Drain this tick's message batch, then run the cooldown.
    pub fn update(&mut self, batch: Vec<Message>, mailbox: &mut Mailbox) -> Result<(), GameError> {
        for message in batch {
            match message {
                Message::Killed(killer) => self.handle_killed(killer, mailbox),
                Message::Position(position) => self.core.apply_position(position),
                Message::Blocked(blocked) => self.core.blocked = blocked,
                Message::BombDropped(armed) => {
                    self.bomb_dropped = armed;
                    if armed {
                        self.bomb_cooldown = Self::BOMB_COOLDOWN_TICKS;
                    }
                }
                Message::Reset(position) => self.respawn(position),
                other => {
                    return Err(GameError::UnhandledMessage {
                        kind: other.kind(),
                        recipient: EntityKind::User.name(),
                    })
                }
            }
        }

        // Cooldown runs on ticks, independent of message traffic.
        if self.bomb_cooldown == 0 {
            self.bomb_dropped = false;
        } else {
            self.bomb_cooldown -= 1;
        }
        Ok(())
    }

    fn handle_killed(&mut self, killer: Killer, mailbox: &mut Mailbox) {
        if !self.core.note_killed(killer) {
            return;
        }
        mailbox.send_to_list(
            Recipient::Log,
            Message::Log {
                mod_id: self.mod_id,
                text: format!("killed by *{}*", killer.mod_id),
            },
        );
        if killer.id == self.core.id {
            self.nb_suicide += 1;
        } else {
            self.nb_death += 1;
        }
        self.core.dead = true;
    }

    /// In-place respawn: same identity, fresh alive state at a new tile.
    /// The cooldown re-arms so a fresh life cannot bomb instantly.
    fn respawn(&mut self, position: Position) {
        self.core.position = position;
        self.core.killed = None;
        self.core.blocked = false;
        self.core.dead = false;
        self.bomb_dropped = true;
        self.bomb_cooldown = Self::BOMB_COOLDOWN_TICKS;
    }
}

// =============================================================================
// BOMB
// =============================================================================

/// An armed bomb; detonates when its state sequence expires.
#[derive(Debug)]
pub struct Bomb {
    /// Shared entity state.
    pub core: EntityCore,
    /// The user the detonation is attributed to.
    pub owner: Killer,
    /// Set when the detonation order has been posted.
    pub exploded: bool,
}

impl Bomb {
    const STATE: &'static [u8] = &[1, 2];

    /// Ticks per arming phase (1 s).
    pub const STATE_INTERVAL_TICKS: u32 = TICK_RATE;

    /// Arm a bomb at the owner's tile.
    pub fn new(id: EntityId, position: Position, owner: Killer) -> Self {
        Self {
            core: EntityCore::new(id, position, Self::STATE, Self::STATE_INTERVAL_TICKS, true),
            owner,
            exploded: false,
        }
    }

    /// Drain this tick's batch, then advance the fuse.
    pub fn update(&mut self, batch: Vec<Message>, mailbox: &mut Mailbox) -> Result<(), GameError> {
        for message in batch {
            match message {
                Message::Killed(killer) => {
                    if self.core.note_killed(killer) {
                        self.kill(mailbox);
                    }
                }
                Message::Position(position) => self.core.apply_position(position),
                Message::Blocked(blocked) => self.core.blocked = blocked,
                other => {
                    return Err(GameError::UnhandledMessage {
                        kind: other.kind(),
                        recipient: EntityKind::Bomb.name(),
                    })
                }
            }
        }

        if !self.core.dead && self.core.tick_state() {
            self.kill(mailbox);
        }
        Ok(())
    }

    /// Mark dead and post the detonation order to the board's control slot.
    fn kill(&mut self, mailbox: &mut Mailbox) {
        if self.exploded {
            return;
        }
        self.core.dead = true;
        self.exploded = true;
        mailbox.send_to_list(
            Recipient::Board,
            Message::Boom(Detonation {
                position: self.core.position,
                owner: self.owner,
            }),
        );
    }
}

// =============================================================================
// EXPLOSION
// =============================================================================

/// One tile of a blast. Fades after its state sequence, then delivers the
/// kill to every entity queued on it.
#[derive(Debug)]
pub struct Explosion {
    /// Shared entity state.
    pub core: EntityCore,
    /// The user the kills are attributed to.
    pub owner: Killer,
    /// Propagation direction this tile belongs to.
    pub spread: Spread,
    to_kill: std::collections::BTreeSet<EntityId>,
}

impl Explosion {
    const STATE: &'static [u8] = &[1, 2];

    /// Ticks per fade phase (0.5 s).
    pub const STATE_INTERVAL_TICKS: u32 = TICK_RATE / 2;

    /// Spawn a blast tile, already fading.
    pub fn new(id: EntityId, position: Position, owner: Killer, spread: Spread) -> Self {
        Self {
            core: EntityCore::new(id, position, Self::STATE, Self::STATE_INTERVAL_TICKS, true),
            owner,
            spread,
            to_kill: std::collections::BTreeSet::new(),
        }
    }

    /// Whether `id` is queued to die when this blast fades.
    pub fn will_kill(&self, id: EntityId) -> bool {
        self.to_kill.contains(&id)
    }

    /// Drain this tick's batch, then advance the fade.
    pub fn update(&mut self, batch: Vec<Message>, mailbox: &mut Mailbox) -> Result<(), GameError> {
        for message in batch {
            match message {
                Message::Killed(killer) => {
                    if self.core.note_killed(killer) {
                        self.kill(mailbox);
                    }
                }
                Message::Position(position) => self.core.apply_position(position),
                Message::Blocked(blocked) => self.core.blocked = blocked,
                Message::ToKill(entity) => {
                    self.to_kill.insert(entity);
                }
                other => {
                    return Err(GameError::UnhandledMessage {
                        kind: other.kind(),
                        recipient: EntityKind::Explosion.name(),
                    })
                }
            }
        }

        if !self.core.dead && self.core.tick_state() {
            self.kill(mailbox);
        }
        Ok(())
    }

    /// Mark dead and deliver the kill to everything caught in the blast.
    fn kill(&mut self, mailbox: &mut Mailbox) {
        if self.core.dead {
            return;
        }
        self.core.dead = true;
        for entity in std::mem::take(&mut self.to_kill) {
            mailbox.send(Recipient::Entity(entity), Message::Killed(self.owner));
        }
    }
}

// =============================================================================
// WALL
// =============================================================================

/// A destructible obstacle. No state beyond the shared base.
#[derive(Debug)]
pub struct Wall {
    /// Shared entity state.
    pub core: EntityCore,
}

impl Wall {
    const STATE: &'static [u8] = &[0];

    /// Place a wall.
    pub fn new(id: EntityId, position: Position) -> Self {
        Self {
            core: EntityCore::new(id, position, Self::STATE, 0, false),
        }
    }

    /// Drain this tick's batch.
    pub fn update(&mut self, batch: Vec<Message>) -> Result<(), GameError> {
        for message in batch {
            match message {
                Message::Killed(killer) => {
                    if self.core.note_killed(killer) {
                        self.core.dead = true;
                    }
                }
                Message::Position(position) => self.core.apply_position(position),
                Message::Blocked(blocked) => self.core.blocked = blocked,
                other => {
                    return Err(GameError::UnhandledMessage {
                        kind: other.kind(),
                        recipient: EntityKind::Wall.name(),
                    })
                }
            }
        }
        Ok(())
    }
}
