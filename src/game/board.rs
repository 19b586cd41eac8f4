//! The game board: entity collections, the seven-phase tick, explosion
//! propagation, map diffing, and entity lifecycle.
//!
//! The board owns every entity and the [`Mailbox`] they communicate
//! through. Network code never mutates entities directly; it enqueues
//! control messages and reads the [`TickOutput`] the tick produces.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::core::position::{Direction, Position};
use crate::game::bot::{self, BotState};
use crate::game::entity::{
    Bomb, EntityCore, EntityId, EntityKind, Explosion, Killer, Spread, User, Wall,
};
use crate::game::mailbox::{Detonation, Mailbox, Message, Recipient};
use crate::game::{path, GameError};
use crate::network::protocol::{
    BaseRecord, BombRecord, EntityGroups, ExplosionRecord, InitState, LogEntry, Record,
    ServerMessage, UserRecord, WallRecord,
};
use crate::{BOARD_LENGTH, BOARD_WIDTH, WALL_COUNT};

/// What a tick produced for broadcast: a map diff when anything visible
/// changed, and a log batch when any lines accumulated.
#[derive(Debug)]
pub struct TickOutput {
    pub map: Option<ServerMessage>,
    pub logs: Option<ServerMessage>,
}

/// The authoritative game state.
pub struct GameBoard {
    mailbox: Mailbox,
    users: HashMap<EntityId, User>,
    bombs: HashMap<EntityId, Bomb>,
    walls: HashMap<EntityId, Wall>,
    explosions: HashMap<EntityId, Explosion>,
    /// Player-slot occupancy; new users take the least-loaded slot.
    mods: BTreeMap<u8, u32>,
    /// Per-tile records from the previous tick, diffed against each tick.
    snapshot: HashMap<Position, BTreeMap<EntityId, Record>>,
    next_id: u64,
    rng: StdRng,
}

impl GameBoard {
    const KINDS: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::Bomb,
        EntityKind::Wall,
        EntityKind::Explosion,
    ];

    /// A fresh board with walls already placed. `seed` pins the RNG for
    /// deterministic runs; `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut board = Self {
            mailbox: Mailbox::new(),
            users: HashMap::new(),
            bombs: HashMap::new(),
            walls: HashMap::new(),
            explosions: HashMap::new(),
            mods: (1..=4).map(|mod_id| (mod_id, 0)).collect(),
            snapshot: HashMap::new(),
            next_id: 0,
            rng,
        };
        board.make_walls();
        board.snapshot = board.build_snapshot();
        board
    }

    // ------------------------------------------------------------------
    // Registration

    /// Add a human-controlled user on a random free tile. Returns `None`
    /// when no tile is free.
    pub fn register_user(&mut self) -> Option<EntityId> {
        self.register(None)
    }

    /// Add a bot-controlled user on a random free tile.
    pub fn register_bot(&mut self) -> Option<EntityId> {
        self.register(Some(BotState::new()))
    }

    fn register(&mut self, bot: Option<BotState>) -> Option<EntityId> {
        let position = self.random_spawn(1).into_iter().next()?;
        let id = self.alloc_id();
        let mod_id = self.take_mod();
        info!("{} user connected as mod {}", id, mod_id);
        self.users.insert(id, User::new(id, position, mod_id, bot));
        self.mailbox.send_to_list(
            Recipient::Log,
            Message::Log { mod_id, text: "connected".into() },
        );
        Some(id)
    }

    /// Remove a user, release its slot, and purge its mailbox traces.
    /// When the last user leaves, the walls regenerate.
    pub fn unregister_user(&mut self, id: EntityId) {
        let Some(user) = self.users.remove(&id) else {
            return;
        };
        if let Some(count) = self.mods.get_mut(&user.mod_id) {
            *count = count.saturating_sub(1);
        }
        self.mailbox.discard(Recipient::Entity(id));
        info!("{} user disconnected", id);
        self.mailbox.send_to_list(
            Recipient::Log,
            Message::Log { mod_id: user.mod_id, text: "disconnected".into() },
        );
        if self.users.is_empty() {
            info!("no more users, resetting walls");
            self.make_walls();
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// True while nobody is connected; the tick loop rests instead of
    /// simulating an empty board.
    pub fn is_idle(&self) -> bool {
        self.users.is_empty()
    }

    // ------------------------------------------------------------------
    // Control intake (called from the network layer between ticks)

    pub fn enqueue_move(&mut self, id: EntityId, direction: Direction) {
        self.mailbox
            .send_to_list(Recipient::Board, Message::Move(id, direction));
    }

    pub fn enqueue_bomb(&mut self, id: EntityId) {
        self.mailbox.send_to_list(Recipient::Board, Message::Bomb(id));
    }

    pub fn enqueue_chat(&mut self, id: EntityId, text: String) {
        let Some(user) = self.users.get(&id) else {
            return;
        };
        self.mailbox.send_to_list(
            Recipient::Log,
            Message::Log { mod_id: user.mod_id, text },
        );
    }

    // ------------------------------------------------------------------
    // The tick

    /// Advance the world by one tick.
    ///
    /// Phase order is the board's one hard guarantee; within a phase,
    /// iteration order carries no meaning. An `Err` here is a protocol
    /// violation in the kernel itself and poisons the board.
    pub fn tick(&mut self) -> Result<TickOutput, GameError> {
        // 1. lift the board's control slot; nothing may have been taken
        //    from it since the previous tick
        self.mailbox.drop_key(Recipient::Board)?;
        let control = self.mailbox.take(Recipient::Board);

        // 2. resolve control messages, then let bots plan
        for message in control {
            match message {
                Message::Boom(detonation) => self.boom(detonation),
                Message::Move(id, direction) => self.move_user(id, direction),
                Message::Bomb(id) => self.put_bomb(id),
                other => {
                    return Err(GameError::UnhandledMessage {
                        kind: other.kind(),
                        recipient: "board",
                    })
                }
            }
        }
        self.drive_bots();

        // 3. commit: everything sent so far becomes visible
        self.mailbox.swap()?;

        // 4. update every entity against its delivered batch
        self.update_entities()?;

        // 5. diff the visible state against the previous tick
        let map = self.diff();

        // 6. reap the dead, respawn users
        self.reap();

        // 7. flush accumulated log lines
        let logs = self.drain_logs();

        Ok(TickOutput { map, logs })
    }

    // ------------------------------------------------------------------
    // Action resolution

    /// Spawn the explosion cross for a detonation.
    ///
    /// The center tile always gets an omnidirectional explosion. Four
    /// rays then extend outward to the board edge (no wrap): each free
    /// tile gets an explosion; the first destructible occupant on a ray
    /// is queued to die with the most recent explosion and blocks the
    /// ray. x-axis rays spread vertically on screen, y-axis rays
    /// horizontally.
    fn boom(&mut self, detonation: Detonation) {
        let Detonation { position, owner } = detonation;
        debug!("{} bomb detonated at {}", owner.id, position);

        let destructible = self.destructible_by_pos();
        let mut last = self.spawn_explosion(position, owner, Spread::Omni);
        if let Some(victim) = destructible.get(&position).copied() {
            self.queue_blast_victim(last, victim);
        }

        let Position { x, y } = position;
        let rays: [(Vec<Position>, Spread); 4] = [
            ((0..x).rev().map(|nx| Position::new(nx, y)).collect(), Spread::Vertical),
            (((x + 1)..BOARD_LENGTH).map(|nx| Position::new(nx, y)).collect(), Spread::Vertical),
            ((0..y).rev().map(|ny| Position::new(x, ny)).collect(), Spread::Horizontal),
            (((y + 1)..BOARD_WIDTH).map(|ny| Position::new(x, ny)).collect(), Spread::Horizontal),
        ];

        for (tiles, spread) in rays {
            for tile in tiles {
                match destructible.get(&tile).copied() {
                    None => last = self.spawn_explosion(tile, owner, spread),
                    Some(victim) => {
                        self.queue_blast_victim(last, victim);
                        break;
                    }
                }
            }
        }
    }

    fn spawn_explosion(&mut self, position: Position, owner: Killer, spread: Spread) -> EntityId {
        let id = self.alloc_id();
        self.explosions
            .insert(id, Explosion::new(id, position, owner, spread));
        id
    }

    /// Queue `victim` to die when `explosion` fades, and pin it in place
    /// until then.
    fn queue_blast_victim(&mut self, explosion: EntityId, victim: EntityId) {
        self.mailbox
            .send_to_list(Recipient::Entity(explosion), Message::ToKill(victim));
        self.mailbox
            .send(Recipient::Entity(victim), Message::Blocked(true));
    }

    fn move_user(&mut self, id: EntityId, direction: Direction) {
        let Some(user) = self.users.get(&id) else {
            return;
        };
        if user.core.blocked {
            return;
        }
        let destination = user.core.position.step(direction);
        self.resolve_move_to(id, destination);
    }

    /// Apply a single-step move for `id` toward `destination`.
    ///
    /// The move lands only when the tile is free of blockable entities.
    /// Stepping toward a live blast is lethal either way: the user is
    /// queued on that explosion and pinned. The position message is
    /// sent first, so a doomed user still walks onto the blast tile.
    fn resolve_move_to(&mut self, id: EntityId, destination: Position) {
        if self.is_position_free(destination) {
            self.mailbox
                .send(Recipient::Entity(id), Message::Position(destination));
        }
        if let Some(explosion) = self.explosion_at(destination) {
            self.queue_blast_victim(explosion, id);
        }
    }

    fn put_bomb(&mut self, id: EntityId) {
        let Some(user) = self.users.get(&id) else {
            return;
        };
        if !user.can_drop_bomb() {
            return;
        }
        let owner = Killer::new(id, user.mod_id);
        let position = user.core.position;
        self.mailbox
            .send(Recipient::Entity(id), Message::BombDropped(true));
        let bomb_id = self.alloc_id();
        self.bombs.insert(bomb_id, Bomb::new(bomb_id, position, owner));
    }

    /// Let every bot whose replan countdown expired pick a target and
    /// take one step along an A* path toward it.
    fn drive_bots(&mut self) {
        let bot_ids: Vec<EntityId> = self
            .users
            .iter()
            .filter(|(_, user)| user.bot.is_some())
            .map(|(id, _)| *id)
            .collect();

        for id in bot_ids {
            let (due, origin) = {
                let Some(user) = self.users.get_mut(&id) else {
                    continue;
                };
                let Some(state) = user.bot.as_mut() else {
                    continue;
                };
                let due = state.tick() && !user.core.blocked;
                (due, user.core.position)
            };
            if !due {
                continue;
            }

            let current = self
                .users
                .get(&id)
                .and_then(|user| user.bot.as_ref())
                .and_then(|state| state.target);
            let target = bot::select_target(&self.users, id, current);
            if let Some(user) = self.users.get_mut(&id) {
                if let Some(state) = user.bot.as_mut() {
                    state.target = target;
                }
            }

            let Some(destination) = target
                .and_then(|target| self.users.get(&target))
                .map(|user| user.core.position)
            else {
                continue;
            };
            let path = self.find_path(origin, destination, None);
            if let Some(step) = path.first().copied() {
                self.resolve_move_to(id, step);
            }
        }
    }

    // ------------------------------------------------------------------
    // Update, diff, reap

    /// Deliver each entity's batch and run its update. Every entity
    /// updates every tick, batch or not; timers advance on empty input.
    fn update_entities(&mut self) -> Result<(), GameError> {
        let ids: Vec<EntityId> = self.users.keys().copied().collect();
        for id in ids {
            let batch = self.mailbox.take(Recipient::Entity(id));
            if let Some(user) = self.users.get_mut(&id) {
                user.update(batch, &mut self.mailbox)?;
            }
        }

        let ids: Vec<EntityId> = self.bombs.keys().copied().collect();
        for id in ids {
            let batch = self.mailbox.take(Recipient::Entity(id));
            if let Some(bomb) = self.bombs.get_mut(&id) {
                bomb.update(batch, &mut self.mailbox)?;
            }
        }

        let ids: Vec<EntityId> = self.explosions.keys().copied().collect();
        for id in ids {
            let batch = self.mailbox.take(Recipient::Entity(id));
            if let Some(explosion) = self.explosions.get_mut(&id) {
                explosion.update(batch, &mut self.mailbox)?;
            }
        }

        let ids: Vec<EntityId> = self.walls.keys().copied().collect();
        for id in ids {
            let batch = self.mailbox.take(Recipient::Entity(id));
            if let Some(wall) = self.walls.get_mut(&id) {
                wall.update(batch)?;
            }
        }

        Ok(())
    }

    /// Compare the current per-tile records against the previous tick's
    /// and emit one `map` message covering every changed tile. A tile
    /// that emptied out contributes a bare record in the `entity` group
    /// so clients can clear it.
    fn diff(&mut self) -> Option<ServerMessage> {
        let new = self.build_snapshot();
        let mut groups = EntityGroups::default();

        for x in 0..BOARD_LENGTH {
            for y in 0..BOARD_WIDTH {
                let position = Position::new(x, y);
                if self.snapshot.get(&position) == new.get(&position) {
                    continue;
                }
                match new.get(&position) {
                    Some(tile) => {
                        for record in tile.values() {
                            groups.push(record.clone());
                        }
                    }
                    None => groups.push(Record::Cleared(BaseRecord { x, y, dead: false })),
                }
            }
        }

        self.snapshot = new;
        if groups.is_empty() {
            None
        } else {
            Some(ServerMessage::Map(groups))
        }
    }

    fn build_snapshot(&self) -> HashMap<Position, BTreeMap<EntityId, Record>> {
        let mut map: HashMap<Position, BTreeMap<EntityId, Record>> = HashMap::new();
        for (id, user) in &self.users {
            map.entry(user.core.position)
                .or_default()
                .insert(*id, Record::User(self.user_record(user)));
        }
        for (id, bomb) in &self.bombs {
            let record = Record::Bomb(BombRecord {
                bomb_state: bomb.core.state(),
                base: Self::base_record(&bomb.core),
            });
            map.entry(bomb.core.position).or_default().insert(*id, record);
        }
        for (id, explosion) in &self.explosions {
            let record = Record::Explosion(ExplosionRecord {
                explosion_state: explosion.core.state(),
                direction: explosion.spread,
                base: Self::base_record(&explosion.core),
            });
            map.entry(explosion.core.position)
                .or_default()
                .insert(*id, record);
        }
        for (id, wall) in &self.walls {
            let record = Record::Wall(WallRecord {
                wall_state: wall.core.state(),
                base: Self::base_record(&wall.core),
            });
            map.entry(wall.core.position).or_default().insert(*id, record);
        }
        map
    }

    fn base_record(core: &EntityCore) -> BaseRecord {
        BaseRecord {
            x: core.position.x,
            y: core.position.y,
            dead: core.dead,
        }
    }

    fn user_record(&self, user: &User) -> UserRecord {
        UserRecord {
            mod_id: user.mod_id,
            id: user.uuid,
            can_drop: user.can_drop_bomb(),
            deaths: user.nb_death,
            killed: user.nb_kill,
            suicides: user.nb_suicide,
            base: Self::base_record(&user.core),
        }
    }

    /// Full-board snapshot for a freshly connected client.
    pub fn init_snapshot(&self, id: EntityId) -> Option<ServerMessage> {
        let user = self.users.get(&id)?;
        let mut groups = EntityGroups::default();
        for tile in self.build_snapshot().into_values() {
            for record in tile.into_values() {
                groups.push(record);
            }
        }
        Some(ServerMessage::Init(InitState {
            length: BOARD_LENGTH,
            width: BOARD_WIDTH,
            id: user.uuid,
            groups,
        }))
    }

    /// Remove dead bombs, walls, and explosions; credit kills and queue
    /// respawns for dead users. Users are never removed here - only an
    /// explicit unregister takes them off the board.
    fn reap(&mut self) {
        let dead_users: Vec<(EntityId, Option<Killer>)> = self
            .users
            .iter()
            .filter(|(_, user)| user.core.dead)
            .map(|(id, user)| (*id, user.core.killed))
            .collect();
        for (id, killed) in dead_users {
            if let Some(killer) = killed {
                if killer.id != id {
                    if let Some(credit) = self.users.get_mut(&killer.id) {
                        credit.nb_kill += 1;
                    }
                }
            }
            if let Some(spawn) = self.random_spawn(1).into_iter().next() {
                self.mailbox.send(Recipient::Entity(id), Message::Reset(spawn));
            }
        }

        let dead: Vec<EntityId> = self
            .bombs
            .iter()
            .filter(|(_, bomb)| bomb.core.dead)
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.bombs.remove(&id);
            self.mailbox.discard(Recipient::Entity(id));
        }

        let dead: Vec<EntityId> = self
            .explosions
            .iter()
            .filter(|(_, explosion)| explosion.core.dead)
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.explosions.remove(&id);
            self.mailbox.discard(Recipient::Entity(id));
        }

        let dead: Vec<EntityId> = self
            .walls
            .iter()
            .filter(|(_, wall)| wall.core.dead)
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.walls.remove(&id);
            self.mailbox.discard(Recipient::Entity(id));
        }

        // a blast may have queued kills for entities another blast
        // already removed; drop those batches before the next swap
        let live: HashSet<EntityId> = Self::KINDS
            .iter()
            .flat_map(|kind| self.entries_of(*kind))
            .map(|(id, _)| id)
            .collect();
        self.mailbox.sweep(|recipient| match recipient {
            Recipient::Entity(id) => live.contains(id),
            Recipient::Board | Recipient::Log => true,
        });
    }

    fn drain_logs(&mut self) -> Option<ServerMessage> {
        let batch = self.mailbox.take(Recipient::Log);
        if batch.is_empty() {
            return None;
        }
        let logs: Vec<LogEntry> = batch
            .into_iter()
            .filter_map(|message| match message {
                Message::Log { mod_id, text } => Some(LogEntry { mod_id, text }),
                _ => None,
            })
            .collect();
        Some(ServerMessage::Log { logs })
    }

    // ------------------------------------------------------------------
    // Geometry and spawning

    /// A* path between two tiles, avoiding blockable entities. `budget`
    /// caps node expansion; `None` uses the default.
    pub fn find_path(
        &self,
        origin: Position,
        destination: Position,
        budget: Option<u32>,
    ) -> Vec<Position> {
        path::find_path(origin, destination, budget, |position| {
            self.is_position_free(position)
        })
    }

    /// Up to `n` distinct unoccupied tiles, uniformly at random.
    fn random_spawn(&mut self, n: usize) -> Vec<Position> {
        let occupied = self.occupied_positions();
        let free: Vec<Position> = (0..BOARD_LENGTH)
            .flat_map(|x| (0..BOARD_WIDTH).map(move |y| Position::new(x, y)))
            .filter(|position| !occupied.contains(position))
            .collect();
        free.choose_multiple(&mut self.rng, n).copied().collect()
    }

    /// Clear and re-place the random walls.
    fn make_walls(&mut self) {
        self.walls.clear();
        for position in self.random_spawn(WALL_COUNT) {
            let id = self.alloc_id();
            self.walls.insert(id, Wall::new(id, position));
        }
    }

    /// True when no blockable entity occupies the tile.
    fn is_position_free(&self, position: Position) -> bool {
        Self::KINDS
            .iter()
            .filter(|kind| kind.blockable())
            .all(|kind| self.entries_of(*kind).all(|(_, p)| p != position))
    }

    fn occupied_positions(&self) -> HashSet<Position> {
        Self::KINDS
            .iter()
            .flat_map(|kind| self.entries_of(*kind))
            .map(|(_, position)| position)
            .collect()
    }

    fn destructible_by_pos(&self) -> HashMap<Position, EntityId> {
        Self::KINDS
            .iter()
            .filter(|kind| kind.destructible())
            .flat_map(|kind| self.entries_of(*kind))
            .map(|(id, position)| (position, id))
            .collect()
    }

    fn entries_of(&self, kind: EntityKind) -> Box<dyn Iterator<Item = (EntityId, Position)> + '_> {
        match kind {
            EntityKind::User => Box::new(
                self.users.iter().map(|(id, e)| (*id, e.core.position)),
            ),
            EntityKind::Bomb => Box::new(
                self.bombs.iter().map(|(id, e)| (*id, e.core.position)),
            ),
            EntityKind::Wall => Box::new(
                self.walls.iter().map(|(id, e)| (*id, e.core.position)),
            ),
            EntityKind::Explosion => Box::new(
                self.explosions.iter().map(|(id, e)| (*id, e.core.position)),
            ),
        }
    }

    fn explosion_at(&self, position: Position) -> Option<EntityId> {
        self.explosions
            .iter()
            .find(|(_, explosion)| explosion.core.position == position)
            .map(|(id, _)| *id)
    }

    fn take_mod(&mut self) -> u8 {
        let mod_id = self
            .mods
            .iter()
            .min_by_key(|(mod_id, count)| (**count, **mod_id))
            .map(|(mod_id, _)| *mod_id)
            .unwrap_or(1);
        *self.mods.entry(mod_id).or_insert(0) += 1;
        mod_id
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for GameBoard {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_USERS;

    /// Seeded board with the walls cleared so tests control the layout.
    fn empty_board() -> GameBoard {
        let mut board = GameBoard::new(Some(7));
        board.walls.clear();
        board.snapshot = board.build_snapshot();
        board
    }

    fn add_user_at(board: &mut GameBoard, position: Position) -> EntityId {
        let id = board.alloc_id();
        let mod_id = board.take_mod();
        board.users.insert(id, User::new(id, position, mod_id, None));
        id
    }

    fn add_bot_at(board: &mut GameBoard, position: Position) -> EntityId {
        let id = board.alloc_id();
        let mod_id = board.take_mod();
        board
            .users
            .insert(id, User::new(id, position, mod_id, Some(BotState::new())));
        id
    }

    fn add_wall_at(board: &mut GameBoard, position: Position) -> EntityId {
        let id = board.alloc_id();
        board.walls.insert(id, Wall::new(id, position));
        id
    }

    fn explosion_positions(board: &GameBoard) -> HashSet<Position> {
        board
            .explosions
            .values()
            .map(|e| e.core.position)
            .collect()
    }

    #[test]
    fn explosion_propagation_stops_at_the_first_destructible() {
        let mut board = empty_board();
        let wall = add_wall_at(&mut board, Position::new(7, 5));
        let owner = Killer::new(EntityId::new(999), 1);

        board.boom(Detonation { position: Position::new(5, 5), owner });

        let positions = explosion_positions(&board);
        assert!(positions.contains(&Position::new(5, 5)));
        assert!(positions.contains(&Position::new(6, 5)));
        // the wall blocks the ray at its own tile
        assert!(!positions.contains(&Position::new(7, 5)));
        assert!(!positions.contains(&Position::new(8, 5)));
        // the other three rays ran to the edge
        assert!(positions.contains(&Position::new(0, 5)));
        assert!(positions.contains(&Position::new(5, 0)));
        assert!(positions.contains(&Position::new(5, 9)));

        // the wall is queued on the last explosion spawned before the hit
        let nearest = board.explosion_at(Position::new(6, 5)).unwrap();
        board.mailbox.swap().unwrap();
        let batch = board.mailbox.take(Recipient::Entity(nearest));
        assert!(batch.contains(&Message::ToKill(wall)));
        let batch = board.mailbox.take(Recipient::Entity(wall));
        assert!(batch.contains(&Message::Blocked(true)));
    }

    #[test]
    fn blast_center_catches_its_occupant() {
        let mut board = empty_board();
        let victim = add_user_at(&mut board, Position::new(5, 5));
        let owner = Killer::new(victim, 1);

        board.boom(Detonation { position: Position::new(5, 5), owner });

        let center = board.explosion_at(Position::new(5, 5)).unwrap();
        board.mailbox.swap().unwrap();
        let batch = board.mailbox.take(Recipient::Entity(center));
        assert!(batch.contains(&Message::ToKill(victim)));
    }

    #[test]
    fn moves_wrap_and_walls_block() {
        let mut board = empty_board();
        let id = add_user_at(&mut board, Position::new(0, 0));
        add_wall_at(&mut board, Position::new(1, 0));

        board.enqueue_move(id, Direction::Right);
        board.tick().unwrap();
        assert_eq!(board.users[&id].core.position, Position::new(0, 0));

        board.enqueue_move(id, Direction::Left);
        board.tick().unwrap();
        assert_eq!(
            board.users[&id].core.position,
            Position::new(BOARD_LENGTH - 1, 0)
        );
    }

    #[test]
    fn stepping_onto_a_blast_is_lethal_but_still_lands() {
        let mut board = empty_board();
        let id = add_user_at(&mut board, Position::new(0, 0));
        let owner = Killer::new(EntityId::new(999), 3);
        let explosion = board.spawn_explosion(Position::new(1, 0), owner, Spread::Omni);

        board.enqueue_move(id, Direction::Right);
        board.tick().unwrap();

        // explosions are not blockable, so the move landed; the user is
        // now pinned and queued on the blast
        let user = &board.users[&id];
        assert_eq!(user.core.position, Position::new(1, 0));
        assert!(user.core.blocked);
        assert!(board.explosions[&explosion].will_kill(id));
    }

    #[test]
    fn bomb_drop_arms_the_cooldown() {
        let mut board = empty_board();
        let id = add_user_at(&mut board, Position::new(2, 2));

        board.enqueue_bomb(id);
        board.tick().unwrap();
        assert_eq!(board.bombs.len(), 1);
        assert!(!board.users[&id].can_drop_bomb());

        // a second drop during the cooldown is ignored
        board.enqueue_bomb(id);
        board.tick().unwrap();
        assert_eq!(board.bombs.len(), 1);
    }

    #[test]
    fn diff_reports_moves_and_cleared_tiles() {
        let mut board = empty_board();
        let id = add_user_at(&mut board, Position::new(2, 2));
        board.snapshot = board.build_snapshot();

        board.enqueue_move(id, Direction::Right);
        let output = board.tick().unwrap();

        let Some(ServerMessage::Map(groups)) = output.map else {
            panic!("expected a map diff");
        };
        assert_eq!(groups.users.len(), 1);
        assert_eq!(groups.users[0].base.x, 3);
        assert_eq!(groups.users[0].base.y, 2);
        assert_eq!(groups.cleared.len(), 1);
        assert_eq!((groups.cleared[0].x, groups.cleared[0].y), (2, 2));
    }

    #[test]
    fn quiet_tick_produces_no_output() {
        let mut board = empty_board();
        add_user_at(&mut board, Position::new(2, 2));
        board.snapshot = board.build_snapshot();

        board.tick().unwrap(); // drains the connect log, if any
        let output = board.tick().unwrap();
        assert!(output.map.is_none());
        assert!(output.logs.is_none());
    }

    #[test]
    fn chat_lines_flush_with_the_sender_mod() {
        let mut board = empty_board();
        let id = board.register_user().unwrap();

        board.enqueue_chat(id, "gl hf".into());
        // connect log and chat both drain on the next flush
        let output = board.tick().unwrap();
        let Some(ServerMessage::Log { logs }) = output.logs else {
            panic!("expected a log batch");
        };
        assert!(logs.iter().any(|entry| entry.text == "connected"));
        assert!(logs.iter().any(|entry| entry.text == "gl hf"));
        let mod_id = board.users[&id].mod_id;
        assert!(logs.iter().all(|entry| entry.mod_id == mod_id));
    }

    #[test]
    fn suicide_end_to_end_with_respawn() {
        let mut board = empty_board();
        let bomber = add_user_at(&mut board, Position::new(0, 0));
        let bystander = add_user_at(&mut board, Position::new(9, 9));

        board.enqueue_bomb(bomber);
        // fuse, blast, fade, reap, respawn all fit well inside 250 ticks
        for _ in 0..250 {
            board.tick().unwrap();
        }

        let user = &board.users[&bomber];
        assert_eq!(user.nb_suicide, 1);
        assert_eq!(user.nb_death, 0);
        assert_eq!(user.nb_kill, 0);
        assert!(!user.core.dead);
        assert!(!user.core.blocked);
        assert!(user.core.killed.is_none());
        assert_ne!(user.core.position, Position::new(0, 0));

        let other = &board.users[&bystander];
        assert_eq!(other.nb_death, 0);
        assert!(!other.core.dead);

        assert!(board.bombs.is_empty());
        assert!(board.explosions.is_empty());
    }

    #[test]
    fn kill_is_credited_to_the_bomb_owner() {
        let mut board = empty_board();
        let bomber = add_user_at(&mut board, Position::new(0, 0));
        let victim = add_user_at(&mut board, Position::new(0, 3));

        board.enqueue_bomb(bomber);
        board.tick().unwrap();
        // step off both blast rays before the fuse runs out
        board.enqueue_move(bomber, Direction::Right);
        board.tick().unwrap();
        board.enqueue_move(bomber, Direction::Down);
        for _ in 0..250 {
            board.tick().unwrap();
        }

        assert_eq!(board.users[&bomber].nb_kill, 1);
        assert_eq!(board.users[&bomber].nb_suicide, 0);
        assert_eq!(board.users[&victim].nb_death, 1);
        assert_eq!(board.users[&victim].nb_suicide, 0);
    }

    #[test]
    fn walls_die_to_blasts_and_get_reaped() {
        let mut board = empty_board();
        add_user_at(&mut board, Position::new(9, 9));
        add_wall_at(&mut board, Position::new(0, 2));
        let owner = Killer::new(EntityId::new(999), 1);
        board
            .mailbox
            .send_to_list(Recipient::Board, Message::Boom(Detonation {
                position: Position::new(0, 0),
                owner,
            }));

        for _ in 0..120 {
            board.tick().unwrap();
        }
        assert!(board.walls.is_empty());
        assert!(board.explosions.is_empty());
    }

    #[test]
    fn bot_steps_toward_its_target() {
        let mut board = empty_board();
        let bot = add_bot_at(&mut board, Position::new(0, 0));
        add_user_at(&mut board, Position::new(0, 3));

        board.tick().unwrap();
        assert_eq!(board.users[&bot].core.position, Position::new(0, 1));
    }

    #[test]
    fn bot_detours_around_walls() {
        let mut board = empty_board();
        let bot = add_bot_at(&mut board, Position::new(0, 0));
        add_user_at(&mut board, Position::new(0, 4));
        add_wall_at(&mut board, Position::new(0, 1));

        board.tick().unwrap();
        // the straight line is blocked, so the first step leaves the column
        assert_eq!(board.users[&bot].core.position, Position::new(1, 0));
    }

    #[test]
    fn mods_fill_least_loaded_first() {
        let mut board = GameBoard::new(Some(11));
        let mut ids = Vec::new();
        for _ in 0..MAX_USERS {
            ids.push(board.register_user().unwrap());
        }
        let mods: HashSet<u8> = ids.iter().map(|id| board.users[id].mod_id).collect();
        assert_eq!(mods, (1..=4).collect());

        let freed = board.users[&ids[1]].mod_id;
        board.unregister_user(ids[1]);
        let refill = board.register_user().unwrap();
        assert_eq!(board.users[&refill].mod_id, freed);
    }

    #[test]
    fn walls_regenerate_when_the_last_user_leaves() {
        let mut board = GameBoard::new(Some(3));
        let before: HashSet<Position> = board.walls.values().map(|w| w.core.position).collect();
        let id = board.register_user().unwrap();
        board.unregister_user(id);

        assert_eq!(board.walls.len(), WALL_COUNT);
        let after: HashSet<Position> = board.walls.values().map(|w| w.core.position).collect();
        // a reseeded layout; identical layouts are astronomically unlikely
        assert_ne!(before, after);
    }

    #[test]
    fn random_spawn_avoids_occupied_tiles() {
        let mut board = GameBoard::new(Some(5));
        add_user_at(&mut board, Position::new(4, 4));
        let occupied = board.occupied_positions();

        let spawns = board.random_spawn(30);
        assert_eq!(spawns.len(), 30);
        let distinct: HashSet<Position> = spawns.iter().copied().collect();
        assert_eq!(distinct.len(), 30);
        assert!(spawns.iter().all(|p| !occupied.contains(p)));
        assert!(spawns.iter().all(|p| p.in_bounds()));
    }

    #[test]
    fn init_snapshot_lists_the_whole_board() {
        let mut board = GameBoard::new(Some(9));
        let id = board.register_user().unwrap();

        let Some(ServerMessage::Init(state)) = board.init_snapshot(id) else {
            panic!("expected an init snapshot");
        };
        assert_eq!(state.length, BOARD_LENGTH);
        assert_eq!(state.width, BOARD_WIDTH);
        assert_eq!(state.id, board.users[&id].uuid);
        assert_eq!(state.groups.walls.len(), WALL_COUNT);
        assert_eq!(state.groups.users.len(), 1);

        assert!(board.init_snapshot(EntityId::new(4242)).is_none());
    }
}
