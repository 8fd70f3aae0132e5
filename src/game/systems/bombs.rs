//! Bomb placement, blast-path hazard stamping and detonation.
//!
//! Detonation is depth-first: when a blast ray reaches another bomb, that
//! bomb detonates completely (including its own chained bombs) before the
//! outer bomb's remaining rays are processed. The hazard layer is stamped at
//! placement time so hazard-aware mobs can start avoiding the blast area for
//! the whole fuse duration.

use rand::Rng;
use tracing::warn;

use crate::game::constants::{cell, drops};
use crate::game::entities::{Bomb, Explosion, Player};
use crate::game::world::{CellObject, EntityId, World};

const RAY_DIRECTIONS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Place a bomb on the player's tile if they have budget and the tile is
/// clear. The bomb snaps to the tile center regardless of where in the tile
/// the player stands.
pub fn place_bomb(
    world: &mut World,
    player: &mut Player,
    bombs: &mut Vec<Bomb>,
    next_id: &mut EntityId,
    clock_ms: u64,
) {
    if player.cur_bombs >= player.max_bombs {
        return;
    }

    let mx = world.to_tile_x(player.position.x);
    let my = world.to_tile_y(player.position.y);
    if world.get_cell(mx, my) != cell::EMPTY {
        return;
    }

    let id = *next_id;
    *next_id += 1;

    let position =
        crate::util::vec2::Vec2::new(world.to_pixel_x(mx), world.to_pixel_y(my));
    let bomb = Bomb::new(id, player, position, clock_ms);

    world.set_cell(mx, my, cell::BOMB);
    world.set_overlay(mx, my, CellObject::Bomb(id));
    world.set_hazard(mx, my, clock_ms);
    stamp_blast_path(world, mx, my, bomb.range, clock_ms);

    bombs.push(bomb);
    player.cur_bombs += 1;
}

/// Mark every cell the blast can reach with the bomb's placement timestamp.
/// Rays stop before the first wall, block or bomb; the blocking cell itself
/// is not stamped.
pub fn stamp_blast_path(world: &mut World, mx: i32, my: i32, range: u32, ts: u64) {
    for (dx, dy) in RAY_DIRECTIONS {
        let mut cx = mx;
        let mut cy = my;
        for _ in 0..range {
            cx += dx;
            cy += dy;

            let c = world.get_cell(cx, cy);
            if c == cell::WALL || c == cell::BLOCK || c == cell::BOMB {
                break;
            }
            world.set_hazard(cx, cy, ts);
        }
    }
}

/// Detonate the bomb with the given id, chaining into any bombs its blast
/// reaches. Inactive or unknown ids are ignored, which terminates chain
/// recursion cleanly.
pub fn detonate(
    world: &mut World,
    bombs: &mut Vec<Bomb>,
    explosions: &mut Vec<Explosion>,
    players: &mut [Player],
    rng: &mut impl Rng,
    next_explosion_id: &mut EntityId,
    bomb_id: EntityId,
) {
    let Some(idx) = bombs.iter().position(|b| b.id == bomb_id && b.active) else {
        return;
    };

    // Copy the bomb out so the list can be re-borrowed for chain recursion.
    let bomb = bombs[idx].clone();
    bombs[idx].active = false;
    bombs[idx].remaining = 0.0;

    let mx = world.to_tile_x(bomb.position.x);
    let my = world.to_tile_y(bomb.position.y);

    if world.get_cell(mx, my) == cell::BOMB {
        world.set_cell(mx, my, cell::EMPTY);
        world.clear_overlay(mx, my);
    } else {
        warn!(bomb = bomb.id, "bomb detonated but its tile holds no bomb");
    }

    spawn_explosion(world, explosions, next_explosion_id, &bomb, mx, my);

    for (dx, dy) in RAY_DIRECTIONS {
        let mut cx = mx;
        let mut cy = my;
        for _ in 0..bomb.range {
            cx += dx;
            cy += dy;

            if !process_ray_cell(
                world,
                bombs,
                explosions,
                players,
                rng,
                next_explosion_id,
                &bomb,
                cx,
                cy,
            ) {
                break;
            }
        }
    }

    // Return the bomb to its owner's budget. The owner may have died since
    // placing it.
    if let Some(owner) = players.iter_mut().find(|p| p.id == bomb.owner) {
        if owner.cur_bombs == 0 {
            warn!(player = %owner.id, "bomb budget underflow");
        } else {
            owner.cur_bombs -= 1;
        }
    }
}

/// Process one blast-ray cell. Returns whether the ray continues past it.
#[allow(clippy::too_many_arguments)]
fn process_ray_cell(
    world: &mut World,
    bombs: &mut Vec<Bomb>,
    explosions: &mut Vec<Explosion>,
    players: &mut [Player],
    rng: &mut impl Rng,
    next_explosion_id: &mut EntityId,
    bomb: &Bomb,
    cx: i32,
    cy: i32,
) -> bool {
    let c = world.get_cell(cx, cy);

    if c == cell::WALL {
        return false;
    }

    if c == cell::BOMB {
        if let Some(chained) = world.bomb_at(cx, cy) {
            detonate(world, bombs, explosions, players, rng, next_explosion_id, chained);
            return false;
        }
        // Stale marker with no bomb behind it; clean it up and let the ray
        // pass through like an empty cell.
        warn!(x = cx, y = cy, "bomb cell marker without a bomb");
        world.set_cell(cx, cy, cell::EMPTY);
    }

    spawn_explosion(world, explosions, next_explosion_id, bomb, cx, cy);

    if c == cell::BLOCK {
        // Roll for a drop; a single uniform sample, earlier bands win.
        let r: f64 = rng.gen();
        let item = if r > drops::BOMB_ITEM_ABOVE {
            cell::ITEM_BOMB
        } else if r > drops::RANGE_ITEM_ABOVE {
            cell::ITEM_RANGE
        } else if r > drops::MYSTERY_ITEM_ABOVE {
            cell::ITEM_MYSTERY
        } else {
            cell::EMPTY
        };

        if item != cell::EMPTY {
            // The zone keeps its block count until the item is consumed.
            world.set_cell(cx, cy, item);
        } else {
            world.del_block_at(cx, cy);
        }

        return false;
    }

    if (cell::ITEM_BOMB..=cell::ITEM_MYSTERY).contains(&c) {
        // Items burn up but do not stop the blast.
        world.del_block_at(cx, cy);
    }
    // Spawners are indestructible and also do not stop the blast.

    true
}

fn spawn_explosion(
    world: &mut World,
    explosions: &mut Vec<Explosion>,
    next_id: &mut EntityId,
    bomb: &Bomb,
    mx: i32,
    my: i32,
) {
    let id = *next_id;
    *next_id += 1;

    let position = crate::util::vec2::Vec2::new(world.to_pixel_x(mx), world.to_pixel_y(my));
    let explosion = Explosion::from_bomb(id, bomb, position);
    world.set_overlay(mx, my, CellObject::Explosion(id));
    explosions.push(explosion);
}

/// Expire one explosion: release its overlay cell and, when no newer bomb
/// has re-stamped the cell, its hazard entry.
pub fn remove_explosion(world: &mut World, explosion: &Explosion) {
    let mx = world.to_tile_x(explosion.position.x);
    let my = world.to_tile_y(explosion.position.y);
    world.clear_overlay(mx, my);
    world.clear_hazard_if_expired(mx, my, explosion.hazard_ts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Player;
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    struct Rig {
        world: World,
        players: Vec<Player>,
        bombs: Vec<Bomb>,
        explosions: Vec<Explosion>,
        rng: StdRng,
        next_bomb_id: EntityId,
        next_explosion_id: EntityId,
    }

    impl Rig {
        fn new() -> Self {
            let mut player = Player::new(Uuid::new_v4(), "bomber".into());
            player.range = 2;
            player.max_bombs = 3;
            Self {
                world: World::generate(21, 21),
                players: vec![player],
                bombs: Vec::new(),
                explosions: Vec::new(),
                rng: StdRng::seed_from_u64(42),
                next_bomb_id: 1,
                next_explosion_id: 1,
            }
        }

        fn place_at(&mut self, mx: i32, my: i32, clock_ms: u64) -> EntityId {
            self.players[0].position =
                Vec2::new(self.world.to_pixel_x(mx), self.world.to_pixel_y(my));
            let id = self.next_bomb_id;
            place_bomb(
                &mut self.world,
                &mut self.players[0],
                &mut self.bombs,
                &mut self.next_bomb_id,
                clock_ms,
            );
            id
        }

        fn detonate(&mut self, id: EntityId) {
            detonate(
                &mut self.world,
                &mut self.bombs,
                &mut self.explosions,
                &mut self.players,
                &mut self.rng,
                &mut self.next_explosion_id,
                id,
            );
        }
    }

    #[test]
    fn test_place_bomb_marks_world() {
        let mut rig = Rig::new();
        rig.place_at(1, 1, 100);

        assert_eq!(rig.bombs.len(), 1);
        assert_eq!(rig.players[0].cur_bombs, 1);
        assert_eq!(rig.world.get_cell(1, 1), cell::BOMB);
        assert!(rig.world.bomb_at(1, 1).is_some());
        assert_eq!(rig.world.get_hazard(1, 1), 100);
        // Range 2 rays along the open corridor.
        assert_eq!(rig.world.get_hazard(2, 1), 100);
        assert_eq!(rig.world.get_hazard(3, 1), 100);
        assert_eq!(rig.world.get_hazard(1, 2), 100);
        // Blocked by the border wall.
        assert_eq!(rig.world.get_hazard(0, 1), 0);
    }

    #[test]
    fn test_bomb_budget_enforced() {
        let mut rig = Rig::new();
        rig.players[0].max_bombs = 1;
        rig.place_at(1, 1, 100);
        rig.place_at(3, 1, 101);
        assert_eq!(rig.bombs.len(), 1);
    }

    #[test]
    fn test_cannot_place_on_occupied_cell() {
        let mut rig = Rig::new();
        rig.world.set_cell(1, 1, cell::ITEM_RANGE);
        rig.place_at(1, 1, 100);
        assert!(rig.bombs.is_empty());
    }

    #[test]
    fn test_detonation_clears_tile_and_returns_budget() {
        let mut rig = Rig::new();
        let id = rig.place_at(1, 1, 100);
        rig.detonate(id);

        assert_eq!(rig.world.get_cell(1, 1), cell::EMPTY);
        assert_eq!(rig.players[0].cur_bombs, 0);
        assert!(!rig.bombs[0].active);
        // Center plus both open rays.
        assert!(rig.explosions.len() > 1);
        assert!(rig.world.explosion_at(1, 1).is_some());
    }

    #[test]
    fn test_blast_stops_at_block_and_destroys_it() {
        let mut rig = Rig::new();
        rig.world.add_block_at(3, 1);
        let id = rig.place_at(1, 1, 100);
        rig.detonate(id);

        // The block is consumed (either into an item or cleared).
        assert_ne!(rig.world.get_cell(3, 1), cell::BLOCK);
        // No explosion past the block.
        assert!(rig.world.explosion_at(4, 1).is_none());
        assert!(rig.world.explosion_at(3, 1).is_some());
    }

    #[test]
    fn test_chain_detonation() {
        let mut rig = Rig::new();
        let first = rig.place_at(1, 1, 100);
        let second = rig.place_at(3, 1, 200);
        assert_eq!(rig.players[0].cur_bombs, 2);

        rig.detonate(first);

        assert!(rig.bombs.iter().all(|b| !b.active));
        assert_eq!(rig.players[0].cur_bombs, 0);
        assert_eq!(rig.world.get_cell(3, 1), cell::EMPTY);
        // Chained blast carries its own placement stamp.
        assert!(rig
            .explosions
            .iter()
            .any(|e| e.hazard_ts == 200));
    }

    #[test]
    fn test_spawner_survives_blast() {
        let mut rig = Rig::new();
        rig.world.set_cell(3, 1, cell::SPAWNER);
        let id = rig.place_at(1, 1, 100);
        rig.detonate(id);

        assert_eq!(rig.world.get_cell(3, 1), cell::SPAWNER);
        // The blast passes straight through.
        assert!(rig.world.explosion_at(3, 1).is_some());
    }

    #[test]
    fn test_explosion_expiry_respects_newer_hazard() {
        let mut rig = Rig::new();
        let id = rig.place_at(1, 1, 100);
        rig.detonate(id);

        // A newer bomb re-stamps a cell the explosion covered.
        rig.world.set_hazard(2, 1, 500);

        let explosions = rig.explosions.clone();
        for e in &explosions {
            remove_explosion(&mut rig.world, e);
        }

        assert_eq!(rig.world.get_hazard(2, 1), 500);
        assert_eq!(rig.world.get_hazard(1, 1), 0);
        assert!(rig.world.explosion_at(1, 1).is_none());
    }
}
