//! Entity value objects: players, mobs, bombs, explosions and the input
//! action sample that drives movement.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::game::constants::{cell, explosion as explosion_consts, mob as mob_consts, player as player_consts};
use crate::game::world::EntityId;
use crate::util::vec2::Vec2;

/// Unique player identifier
pub type PlayerId = Uuid;

/// Player flag bits. Must stay powers of two.
pub const FLAG_WALK_THROUGH_BOMBS: u8 = 1;
pub const FLAG_INVINCIBLE: u8 = 2;

/// One discrete input sample. `delta_time` is always overridden server-side
/// to the fixed tick interval so a client cannot speed-hack by inflating it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub dx: i8,
    pub dy: i8,
    pub fire: bool,
    pub sequence_id: u64,
    pub delta_time: f32,
}

impl Action {
    pub fn step(dx: i8, dy: i8, fire: bool) -> Self {
        Self {
            dx,
            dy,
            fire,
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.dx = 0;
        self.dy = 0;
        self.fire = false;
        self.delta_time = 0.0;
    }
}

/// A timed server-side effect acting on a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    SpeedUp,
    SlowDown,
    Invincible,
}

impl EffectKind {
    /// Floating pickup label shown on the client
    pub fn label(&self) -> &'static str {
        match self {
            EffectKind::SpeedUp => ">>",
            EffectKind::SlowDown => "<<",
            EffectKind::Invincible => "",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Effect {
    pub kind: EffectKind,
    pub remaining: f32,
}

/// Player state. Snapshots for the wire live in `net::protocol`.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub active: bool,
    pub position: Vec2,
    pub action: Action,
    /// Raw speed in pixels per second; effects may push this outside the
    /// safe window, the movement resolver clamps at apply time.
    pub speed: f32,
    /// Sprite label, purely cosmetic
    pub image: String,
    /// Blast range in tiles per direction
    pub range: u32,
    /// Bomb fuse in seconds
    pub bomb_time: f32,
    pub max_bombs: u32,
    pub cur_bombs: u32,
    pub flags: u8,
    pub score: i64,
    pub name: String,
    pub rank: u32,

    // Server only.
    pub effects: Vec<Effect>,
    pub last_contact: Instant,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            active: true,
            position: Vec2::ZERO,
            action: Action::default(),
            speed: player_consts::DEFAULT_SPEED,
            image: "p1".to_string(),
            range: player_consts::DEFAULT_RANGE,
            bomb_time: player_consts::DEFAULT_FUSE,
            max_bombs: player_consts::DEFAULT_MAX_BOMBS,
            cur_bombs: 0,
            flags: 0,
            score: 0,
            name,
            rank: 0,
            effects: Vec::new(),
            last_contact: Instant::now(),
        }
    }

    pub fn add_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    pub fn del_flag(&mut self, flag: u8) {
        self.flags &= !flag;
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Terrain passability for players: empty and walkable specials pass,
    /// bombs only with the walk-through flag, walls never.
    pub fn can_pass(&self, cell_value: u8) -> bool {
        if cell_value == cell::EMPTY {
            true
        } else if (cell::ITEM_BOMB..=10).contains(&cell_value) {
            true
        } else {
            cell_value == cell::BOMB && self.has_flag(FLAG_WALK_THROUGH_BOMBS)
        }
    }

    /// Attach a timed effect, applying its side effect immediately.
    pub fn push_effect(&mut self, kind: EffectKind, duration: f32) {
        match kind {
            EffectKind::SpeedUp => self.speed += 50.0,
            EffectKind::SlowDown => self.speed -= 50.0,
            EffectKind::Invincible => self.add_flag(FLAG_INVINCIBLE),
        }
        self.effects.push(Effect {
            kind,
            remaining: duration,
        });
    }

    /// Attach a random temporary effect and return its pickup label.
    pub fn add_random_effect(&mut self, rng: &mut impl Rng) -> &'static str {
        let duration = rng.gen_range(3.0..10.0);
        let kind = if rng.gen_range(0..2) == 0 {
            EffectKind::SpeedUp
        } else {
            EffectKind::SlowDown
        };
        self.push_effect(kind, duration);
        kind.label()
    }

    pub fn set_invincible(&mut self, duration: f32) {
        self.push_effect(EffectKind::Invincible, duration);
    }

    /// Tick active effects, undoing each one as it expires.
    pub fn update_effects(&mut self, dt: f32) {
        let mut speed = self.speed;
        let mut flags = self.flags;

        for effect in &mut self.effects {
            if effect.remaining <= 0.0 {
                continue;
            }
            effect.remaining -= dt;
            if effect.remaining <= 0.0 {
                effect.remaining = 0.0;
                match effect.kind {
                    EffectKind::SpeedUp => speed -= 50.0,
                    EffectKind::SlowDown => speed += 50.0,
                    EffectKind::Invincible => flags &= !FLAG_INVINCIBLE,
                }
            }
        }

        self.speed = speed;
        self.flags = flags;
        self.effects.retain(|e| e.remaining > 0.0);
    }
}

/// Cardinal facing used by the wall-follow target modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    /// Rotate by `steps` quarter turns; positive is clockwise.
    pub fn rotated(&self, steps: i32) -> Direction {
        let idx = match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        };
        match (idx + steps).rem_euclid(4) {
            0 => Direction::Up,
            1 => Direction::Right,
            2 => Direction::Down,
            _ => Direction::Left,
        }
    }
}

/// Mob navigation behavior selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Head for a random nearby blank cell
    Wander,
    /// Follow a nearby player
    Chase,
    /// Turn clockwise whenever blocked
    Clockwise,
    /// Turn counter-clockwise whenever blocked
    CounterClockwise,
    /// As Clockwise, but also turn as soon as the previous tile is left
    OpportunisticClockwise,
    /// As CounterClockwise, with the same early-turn rule
    OpportunisticCounterClockwise,
    /// Head for the nearest cell without an unexpired hazard stamp
    Flee,
}

impl TargetMode {
    /// Random non-flee mode; flee is only entered via the danger trigger.
    pub fn random(rng: &mut impl Rng) -> TargetMode {
        match rng.gen_range(0..6) {
            0 => TargetMode::Wander,
            1 => TargetMode::Chase,
            2 => TargetMode::Clockwise,
            3 => TargetMode::CounterClockwise,
            4 => TargetMode::OpportunisticClockwise,
            _ => TargetMode::OpportunisticCounterClockwise,
        }
    }

    /// Rotational sense for the wall-follow modes
    pub fn turn_sign(&self) -> i32 {
        match self {
            TargetMode::Clockwise | TargetMode::OpportunisticClockwise => 1,
            TargetMode::CounterClockwise | TargetMode::OpportunisticCounterClockwise => -1,
            _ => 0,
        }
    }

    pub fn is_opportunistic(&self) -> bool {
        matches!(
            self,
            TargetMode::OpportunisticClockwise | TargetMode::OpportunisticCounterClockwise
        )
    }
}

/// Autonomous hostile unit
#[derive(Debug, Clone)]
pub struct Mob {
    pub id: EntityId,
    pub active: bool,
    pub position: Vec2,
    pub action: Action,
    pub speed: f32,
    pub image: String,
    pub name: String,

    // Server only.
    pub target_mode: TargetMode,
    /// Seconds until the mode is re-rolled
    pub target_remaining: f32,
    /// Waypoint tile for wander/flee modes
    pub target_tile: (i32, i32),
    /// Chased player, held by stable id and revalidated every tick
    pub target_player: Option<PlayerId>,
    /// Facing for the wall-follow modes
    pub facing: Direction,
    /// Tile where the mob last turned; stops opportunistic modes spinning
    /// in place
    pub last_turn_tile: (i32, i32),
    /// Sight distance in tiles
    pub range: i32,
    /// Hazard-aware trait, rolled once at spawn
    pub smart: bool,
    /// Currently standing on a hazardous cell
    pub danger: bool,
}

impl Mob {
    pub fn new(id: EntityId, rng: &mut impl Rng) -> Self {
        Self {
            id,
            active: true,
            position: Vec2::ZERO,
            action: Action::default(),
            speed: mob_consts::SPEED,
            image: "mob1".to_string(),
            name: String::new(),
            target_mode: TargetMode::Wander,
            target_remaining: 0.0,
            target_tile: (0, 0),
            target_player: None,
            facing: Direction::Up,
            last_turn_tile: (0, 0),
            range: mob_consts::SIGHT_RANGE,
            smart: rng.gen_bool(mob_consts::SMART_PROBABILITY),
            danger: false,
        }
    }

    /// Terrain passability for mobs: like players, except bombs are never
    /// passable regardless of flags.
    pub fn can_pass(&self, cell_value: u8) -> bool {
        cell_value == cell::EMPTY || (cell::ITEM_BOMB..=10).contains(&cell_value)
    }
}

/// A placed bomb, snapped to its tile center
#[derive(Debug, Clone)]
pub struct Bomb {
    pub id: EntityId,
    pub owner: PlayerId,
    pub owner_name: String,
    pub active: bool,
    pub position: Vec2,
    /// Seconds of fuse left
    pub remaining: f32,
    pub range: u32,
    /// Simulation-clock placement timestamp, doubles as the hazard-map value
    pub placed_at: u64,
}

impl Bomb {
    pub fn new(id: EntityId, owner: &Player, position: Vec2, placed_at: u64) -> Self {
        Self {
            id,
            owner: owner.id,
            owner_name: owner.name.clone(),
            active: true,
            position,
            remaining: owner.bomb_time,
            range: owner.range,
            placed_at,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.remaining -= dt;
        if self.remaining < 0.0 {
            self.remaining = 0.0;
        }
    }
}

/// A live explosion cell. Lethal only during the leading harmful window.
#[derive(Debug, Clone)]
pub struct Explosion {
    pub id: EntityId,
    /// Absent for environment kills (mob touch, spawner touch)
    pub owner: Option<PlayerId>,
    pub owner_name: Option<String>,
    pub position: Vec2,
    pub remaining: f32,
    pub harmful: bool,
    /// Placement timestamp of the bomb that caused this explosion; the
    /// hazard map entry is only released if it still carries this stamp.
    pub hazard_ts: u64,
}

impl Explosion {
    pub fn from_bomb(id: EntityId, bomb: &Bomb, position: Vec2) -> Self {
        Self {
            id,
            owner: Some(bomb.owner),
            owner_name: Some(bomb.owner_name.clone()),
            position,
            remaining: explosion_consts::LIFETIME,
            harmful: true,
            hazard_ts: bomb.placed_at,
        }
    }

    /// Visual-only explosion for contact deaths; stamps no hazard and
    /// credits no owner.
    pub fn environmental(id: EntityId, position: Vec2) -> Self {
        Self {
            id,
            owner: None,
            owner_name: None,
            position,
            remaining: explosion_consts::LIFETIME,
            harmful: true,
            hazard_ts: 0,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.remaining -= dt;
        if self.remaining < explosion_consts::HARMLESS_BELOW {
            self.harmful = false;
        }
        if self.remaining < 0.0 {
            self.remaining = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_player_passability() {
        let mut player = Player::new(Uuid::new_v4(), "t".into());
        assert!(player.can_pass(cell::EMPTY));
        assert!(player.can_pass(cell::ITEM_BOMB));
        assert!(player.can_pass(cell::SPAWNER));
        assert!(!player.can_pass(cell::WALL));
        assert!(!player.can_pass(cell::BLOCK));
        assert!(!player.can_pass(cell::BOMB));

        player.add_flag(FLAG_WALK_THROUGH_BOMBS);
        assert!(player.can_pass(cell::BOMB));
    }

    #[test]
    fn test_mob_never_passes_bombs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mob = Mob::new(1, &mut rng);
        assert!(mob.can_pass(cell::EMPTY));
        assert!(mob.can_pass(cell::ITEM_RANGE));
        assert!(!mob.can_pass(cell::BOMB));
        assert!(!mob.can_pass(cell::WALL));
    }

    #[test]
    fn test_effect_apply_and_expire() {
        let mut player = Player::new(Uuid::new_v4(), "t".into());
        let base = player.speed;

        player.push_effect(EffectKind::SpeedUp, 1.0);
        assert_eq!(player.speed, base + 50.0);

        player.update_effects(0.5);
        assert_eq!(player.speed, base + 50.0);

        player.update_effects(0.6);
        assert_eq!(player.speed, base);
        assert!(player.effects.is_empty());
    }

    #[test]
    fn test_invincibility_flag_lifecycle() {
        let mut player = Player::new(Uuid::new_v4(), "t".into());
        player.set_invincible(2.0);
        assert!(player.has_flag(FLAG_INVINCIBLE));
        player.update_effects(2.5);
        assert!(!player.has_flag(FLAG_INVINCIBLE));
    }

    #[test]
    fn test_direction_rotation_wraps() {
        assert_eq!(Direction::Up.rotated(1), Direction::Right);
        assert_eq!(Direction::Up.rotated(-1), Direction::Left);
        assert_eq!(Direction::Left.rotated(1), Direction::Up);
        assert_eq!(Direction::Down.rotated(6), Direction::Up);
    }

    #[test]
    fn test_explosion_harmful_window() {
        let mut exp = Explosion::environmental(1, Vec2::ZERO);
        assert!(exp.harmful);

        exp.update(0.1);
        assert!(exp.harmful, "still inside the 0.2s kill window");

        exp.update(0.15);
        assert!(!exp.harmful, "harmless after remaining drops below 0.3s");
        assert!(exp.remaining > 0.0);

        exp.update(0.3);
        assert_eq!(exp.remaining, 0.0);
    }
}
