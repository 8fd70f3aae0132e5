//! Mob navigation and lifecycle.
//!
//! Mobs pick a behavior mode for a random duration and derive one input
//! action per tick from it. Route planning uses a depth-bounded incremental
//! best-first search over tiles that re-sorts its open list after every
//! expansion and returns only the first step of the best route; the full
//! path is recomputed every tick, which keeps mobs responsive to terrain
//! changes without storing paths.
//!
//! Hazard-aware ("smart") mobs treat cells with a pending blast as
//! impassable while safe, and flip into a flee mode the moment their own
//! tile becomes hazardous.

use rand::Rng;

use crate::game::constants::{cell, mob as mob_consts, world as world_consts};
use crate::game::entities::{Direction, Explosion, Mob, Player, TargetMode};
use crate::game::movement::{self, ResolvedStep};
use crate::game::world::World;
use crate::util::vec2::Vec2;

const SEARCH_DIRECTIONS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Terrain passability for one mob. Smart mobs additionally refuse
/// hazard-stamped cells, unless they are already standing in a blast area
/// and need to path out through it.
pub fn mob_can_pass(world: &World, mob: &Mob, mx: i32, my: i32) -> bool {
    let passable = mob.can_pass(world.get_cell(mx, my));

    if !mob.smart {
        return passable;
    }

    if passable && !mob.danger && world.get_hazard(mx, my) != 0 {
        return false;
    }

    passable
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    mx: i32,
    my: i32,
    travelled: i32,
    /// First step of the route that reached this node
    first_dx: i8,
    first_dy: i8,
}

/// Expand one node into the open list, skipping visited tiles. Returns
/// whether anything was added, in which case the caller re-sorts.
fn add_possible_moves(
    world: &World,
    mob: &Mob,
    node: &SearchNode,
    is_origin: bool,
    open: &mut Vec<SearchNode>,
    closed: &mut Vec<(i32, i32)>,
) -> bool {
    let travelled = node.travelled + 1;
    let mut added = false;

    for (dx, dy) in SEARCH_DIRECTIONS {
        let cx = node.mx + dx;
        let cy = node.my + dy;

        if closed.iter().any(|&(x, y)| x == cx && y == cy) {
            continue;
        }

        if mob_can_pass(world, mob, cx, cy) {
            let (first_dx, first_dy) = if is_origin {
                (dx as i8, dy as i8)
            } else {
                (node.first_dx, node.first_dy)
            };

            open.push(SearchNode {
                mx: cx,
                my: cy,
                travelled,
                first_dx,
                first_dy,
            });
            added = true;
        }
    }

    added
}

/// Best-first route search toward a target tile, bounded by travel depth.
/// Returns the first step of the best route, or `None` when the target is
/// unreachable within the bound.
pub fn path_find(
    world: &World,
    mob: &Mob,
    mx: i32,
    my: i32,
    target_mx: i32,
    target_my: i32,
    max_dist: i32,
) -> Option<(i8, i8)> {
    if mx == target_mx && my == target_my {
        return None;
    }

    let mut open: Vec<SearchNode> = Vec::new();
    let mut closed: Vec<(i32, i32)> = vec![(mx, my)];

    let origin = SearchNode {
        mx,
        my,
        travelled: 0,
        first_dx: 0,
        first_dy: 0,
    };
    add_possible_moves(world, mob, &origin, true, &mut open, &mut closed);

    while !open.is_empty() {
        open.sort_by_key(|n| (target_mx - n.mx).abs() + (target_my - n.my).abs());

        let mut processed = 0;
        let mut expanded = false;
        for i in 0..open.len() {
            let node = open[i];
            if node.mx == target_mx && node.my == target_my {
                return Some((node.first_dx, node.first_dy));
            }

            closed.push((node.mx, node.my));
            processed = i;

            if node.travelled < max_dist
                && add_possible_moves(world, mob, &node, false, &mut open, &mut closed)
            {
                // Re-sort before processing anything further.
                expanded = true;
                break;
            }
        }

        open.drain(0..=processed);
        let _ = expanded;
    }

    None
}

/// Breadth-bounded search for the best tile to flee to. Returns a truly safe
/// tile if one is reachable; otherwise the reachable tile whose pending
/// blast is the furthest in the future (a newer bomb means more time to keep
/// running).
pub fn find_safest_tile(world: &World, mob: &Mob, mx: i32, my: i32, max_dist: i32) -> (i32, i32) {
    if world.get_hazard(mx, my) == 0 {
        return (mx, my);
    }

    let mut open: Vec<SearchNode> = Vec::new();
    let mut closed: Vec<(i32, i32)> = vec![(mx, my)];
    let mut safest_ts = world.get_hazard(mx, my);
    let mut best = (mx, my);

    let origin = SearchNode {
        mx,
        my,
        travelled: 0,
        first_dx: 0,
        first_dy: 0,
    };
    add_possible_moves(world, mob, &origin, true, &mut open, &mut closed);

    while !open.is_empty() {
        open.sort_by_key(|n| n.travelled);

        let mut processed = 0;
        for i in 0..open.len() {
            let node = open[i];

            let ts = world.get_hazard(node.mx, node.my);
            if ts == 0 {
                return (node.mx, node.my);
            }
            if ts > safest_ts {
                safest_ts = ts;
                best = (node.mx, node.my);
            }

            closed.push((node.mx, node.my));
            processed = i;

            if node.travelled < max_dist
                && add_possible_moves(world, mob, &node, false, &mut open, &mut closed)
            {
                break;
            }
        }

        open.drain(0..=processed);
    }

    best
}

/// Re-roll the mob's behavior mode and its parameters. A mob in danger
/// always flips to flee; otherwise the roll repeats until the mode changes.
pub fn choose_new_target(world: &World, players: &[Player], rng: &mut impl Rng, mob: &mut Mob) {
    let mx = world.to_tile_x(mob.position.x);
    let my = world.to_tile_y(mob.position.y);

    if mob.danger {
        mob.target_mode = TargetMode::Flee;
    } else {
        let current = mob.target_mode;
        while mob.target_mode == current {
            mob.target_mode = TargetMode::random(rng);
        }
    }

    match mob.target_mode {
        TargetMode::Wander => {
            mob.target_remaining = rng.gen_range(5.0..25.0);
            let rx = mx + rng.gen_range(-mob.range..mob.range);
            let ry = my + rng.gen_range(-mob.range..mob.range);
            let blank = world.find_nearest_blank(rx, ry);
            if blank != world_consts::FALLBACK_CELL {
                mob.target_tile = blank;
            }
            // A fallback hit leaves the previous waypoint in place; the
            // action step re-rolls as soon as no route exists.
        }
        TargetMode::Chase => {
            mob.target_remaining = rng.gen_range(10.0..60.0);
            let xrange = (world.tile_size * mob.range) as f32;
            let yrange = xrange;

            mob.target_player = players
                .iter()
                .find(|p| {
                    p.position.x > mob.position.x - xrange
                        && p.position.x < mob.position.x + xrange
                        && p.position.y > mob.position.y - yrange
                        && p.position.y < mob.position.y + yrange
                })
                .map(|p| p.id);
        }
        TargetMode::Clockwise | TargetMode::CounterClockwise => {
            mob.target_remaining = rng.gen_range(1.0..6.0);
        }
        TargetMode::OpportunisticClockwise | TargetMode::OpportunisticCounterClockwise => {
            mob.last_turn_tile = (mx, my);
            mob.target_remaining = rng.gen_range(1.0..6.0);
        }
        TargetMode::Flee => {
            // Persists until the danger flag clears.
            mob.target_remaining = mob_consts::FLEE_REMAINING;
            mob.target_tile =
                find_safest_tile(world, mob, mx, my, mob_consts::FLEE_SEARCH_DEPTH);
        }
    }
}

/// Derive this tick's input action from the mob's behavior mode.
pub fn mob_action(
    world: &World,
    players: &[Player],
    rng: &mut impl Rng,
    mob: &mut Mob,
    dt: f32,
) {
    let mx = world.to_tile_x(mob.position.x);
    let my = world.to_tile_y(mob.position.y);
    mob.action.clear();

    let mut new_target = false;

    match mob.target_mode {
        TargetMode::Wander => {
            if (mx, my) == mob.target_tile {
                new_target = true;
            } else {
                match path_find(
                    world,
                    mob,
                    mx,
                    my,
                    mob.target_tile.0,
                    mob.target_tile.1,
                    mob.range * 2,
                ) {
                    Some((dx, dy)) => {
                        mob.action.dx = dx;
                        mob.action.dy = dy;
                    }
                    None => new_target = true,
                }
            }
        }
        TargetMode::Chase => {
            let target = mob
                .target_player
                .and_then(|id| players.iter().find(|p| p.id == id && p.active));

            match target {
                None => new_target = true,
                Some(player) => {
                    let px = world.to_tile_x(player.position.x);
                    let py = world.to_tile_y(player.position.y);

                    if mx == px && my == py {
                        // Same tile; close in on pixel coordinates.
                        if mob.position.x > player.position.x {
                            mob.action.dx = -1;
                        } else if mob.position.x < player.position.x {
                            mob.action.dx = 1;
                        }
                        if mob.position.y > player.position.y {
                            mob.action.dy = -1;
                        } else if mob.position.y < player.position.y {
                            mob.action.dy = 1;
                        }
                    } else {
                        match path_find(world, mob, mx, my, px, py, mob.range * 2) {
                            Some((dx, dy)) => {
                                mob.action.dx = dx;
                                mob.action.dy = dy;
                            }
                            None => new_target = true,
                        }
                    }
                }
            }
        }
        TargetMode::Flee => {
            // Re-plan if the chosen refuge went hazardous since.
            if world.get_hazard(mob.target_tile.0, mob.target_tile.1) != 0 {
                mob.target_tile =
                    find_safest_tile(world, mob, mx, my, mob_consts::FLEE_SEARCH_DEPTH);
            }

            if let Some((dx, dy)) = path_find(
                world,
                mob,
                mx,
                my,
                mob.target_tile.0,
                mob.target_tile.1,
                mob.range * 2,
            ) {
                mob.action.dx = dx;
                mob.action.dy = dy;
            }
            // No route out; stand and hope.
        }
        TargetMode::Clockwise
        | TargetMode::CounterClockwise
        | TargetMode::OpportunisticClockwise
        | TargetMode::OpportunisticCounterClockwise => {
            wall_follow(world, mob, mx, my);
        }
    }

    mob.target_remaining -= dt;
    if mob.target_remaining <= 0.0 {
        new_target = true;
    }

    if new_target {
        choose_new_target(world, players, rng, mob);
    }
}

/// Wall-follow movement: keep heading in the facing direction, turning in
/// the mode's rotational sense when blocked. Opportunistic variants also
/// turn as soon as a turn is possible after leaving the previous tile,
/// hugging the wall around corners.
fn wall_follow(world: &World, mob: &mut Mob, mx: i32, my: i32) {
    let sign = mob.target_mode.turn_sign();
    let mut done = false;

    if mob.target_mode.is_opportunistic() && (mx, my) != mob.last_turn_tile {
        let turned = mob.facing.rotated(sign);
        let (dx, dy) = turned.delta();
        if mob_can_pass(world, mob, mx + dx, my + dy) {
            mob.facing = turned;
            mob.last_turn_tile = (mx, my);
            done = true;
        }
    }

    if !done {
        // Probe half a tile ahead of the sprite edge rather than the next
        // tile over, so the turn happens while there is still room to pass.
        let half = world.tile_size / 2 - 1;
        let (mut cx, mut cy) = (mx, my);
        match mob.facing {
            Direction::Up => cy = world.to_tile_y(mob.position.y + half as f32) - 1,
            Direction::Right => cx = world.to_tile_x(mob.position.x - half as f32) + 1,
            Direction::Down => cy = world.to_tile_y(mob.position.y - half as f32) + 1,
            Direction::Left => cx = world.to_tile_x(mob.position.x + half as f32) - 1,
        }

        if mob_can_pass(world, mob, cx, cy) {
            let (dx, dy) = mob.facing.delta();
            mob.action.dx = dx as i8;
            mob.action.dy = dy as i8;
        } else {
            mob.facing = mob.facing.rotated(sign);
        }
    }
}

/// Apply the mob's action: danger-flag upkeep, grid-locked movement, then
/// the blast lethality check on the tile it started the tick on. Returns
/// the killing player's id and whether the mob was smart, when it died to a
/// blast whose owner is still around.
pub fn move_mob(
    world: &World,
    players: &[Player],
    explosions: &[Explosion],
    rng: &mut impl Rng,
    mob: &mut Mob,
    dt: f32,
) -> Option<(crate::game::entities::PlayerId, bool)> {
    if !mob.active {
        return None;
    }

    let mx = world.to_tile_x(mob.position.x);
    let my = world.to_tile_y(mob.position.y);

    // Danger flag is edge-triggered on mode: entering danger flips to flee,
    // leaving it re-rolls out of flee.
    if mob.smart && world.get_hazard(mx, my) != 0 {
        mob.danger = true;
        if mob.target_mode != TargetMode::Flee {
            choose_new_target(world, players, rng, mob);
        }
    } else {
        mob.danger = false;
        if mob.target_mode == TargetMode::Flee {
            choose_new_target(world, players, rng, mob);
        }
    }

    let step: ResolvedStep = movement::resolve_step(
        world,
        mob.position,
        mob.action.dx,
        mob.action.dy,
        dt,
        mob.speed,
        |x, y| mob_can_pass(world, mob, x, y),
    );
    mob.position = step.position;

    // Lethality is checked on the pre-move tile.
    let exp = world
        .explosion_at(mx, my)
        .and_then(|id| explosions.iter().find(|e| e.id == id));
    if let Some(exp) = exp {
        if exp.harmful {
            mob.active = false;
            if let Some(owner) = exp.owner {
                return Some((owner, mob.smart));
            }
        }
    }

    None
}

/// Spawn a mob at a free spawner, if any.
pub fn spawn_mob(
    world: &World,
    players: &[Player],
    mobs: &mut Vec<Mob>,
    spawners: &[(i32, i32)],
    rng: &mut impl Rng,
    next_id: &mut u64,
) {
    use crate::game::systems::zones::free_spawner;

    let Some((sx, sy)) = free_spawner(world, rng, spawners, mobs) else {
        return;
    };

    let id = *next_id;
    *next_id += 1;

    let mut mob = Mob::new(id, rng);
    mob.position = Vec2::new(world.to_pixel_x(sx), world.to_pixel_y(sy));
    if mob.smart {
        mob.image = "mob2".to_string();
    }
    choose_new_target(world, players, rng, &mut mob);
    mobs.push(mob);
}

/// Population cap derived from map area.
pub fn max_mobs(world: &World) -> usize {
    ((world.width * world.height) as f32 * mob_consts::DENSITY) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rig() -> (World, StdRng) {
        (World::generate(21, 21), StdRng::seed_from_u64(9))
    }

    fn mob_at(world: &World, rng: &mut StdRng, mx: i32, my: i32, smart: bool) -> Mob {
        let mut mob = Mob::new(1, rng);
        mob.smart = smart;
        mob.position = Vec2::new(world.to_pixel_x(mx), world.to_pixel_y(my));
        mob
    }

    #[test]
    fn test_path_find_straight_corridor() {
        let (world, mut rng) = rig();
        let mob = mob_at(&world, &mut rng, 1, 1, false);

        let step = path_find(&world, &mob, 1, 1, 5, 1, 16);
        assert_eq!(step, Some((1, 0)));
    }

    #[test]
    fn test_path_find_routes_around_blocks() {
        let (mut world, mut rng) = rig();
        let mob = mob_at(&world, &mut rng, 1, 1, false);

        // Wall off the direct route east; the only way to (3,1) is down
        // through row 3 and back up.
        world.set_cell(2, 1, cell::BLOCK);
        let step = path_find(&world, &mob, 1, 1, 3, 1, 16);
        assert_eq!(step, Some((0, 1)));
    }

    #[test]
    fn test_path_find_unreachable() {
        let (mut world, mut rng) = rig();
        let mob = mob_at(&world, &mut rng, 1, 1, false);

        world.set_cell(2, 1, cell::BLOCK);
        world.set_cell(1, 2, cell::BLOCK);
        assert_eq!(path_find(&world, &mob, 1, 1, 5, 5, 16), None);
    }

    #[test]
    fn test_smart_mob_avoids_hazard_cells() {
        let (mut world, mut rng) = rig();
        let smart = mob_at(&world, &mut rng, 1, 1, true);
        let dumb = mob_at(&world, &mut rng, 1, 1, false);

        world.set_hazard(2, 1, 100);
        assert!(!mob_can_pass(&world, &smart, 2, 1));
        assert!(mob_can_pass(&world, &dumb, 2, 1));

        // Once already in danger the same cell becomes passable again.
        let mut cornered = mob_at(&world, &mut rng, 1, 1, true);
        cornered.danger = true;
        assert!(mob_can_pass(&world, &cornered, 2, 1));
    }

    #[test]
    fn test_find_safest_tile_prefers_clean_cell() {
        let (mut world, mut rng) = rig();
        let mut mob = mob_at(&world, &mut rng, 1, 1, true);
        mob.danger = true;

        world.set_hazard(1, 1, 100);
        world.set_hazard(2, 1, 100);
        // (1,2) is unstamped and adjacent.
        assert_eq!(find_safest_tile(&world, &mob, 1, 1, 3), (1, 2));
    }

    #[test]
    fn test_find_safest_tile_falls_back_to_latest_stamp() {
        let (mut world, mut rng) = rig();
        let mut mob = mob_at(&world, &mut rng, 1, 1, true);
        mob.danger = true;

        // Everything reachable within the bound is stamped; the newest
        // stamp (furthest detonation) wins.
        for my in 0..world.height {
            for mx in 0..world.width {
                if world.get_cell(mx, my) == cell::EMPTY {
                    world.set_hazard(mx, my, 100);
                }
            }
        }
        world.set_hazard(3, 1, 900);

        assert_eq!(find_safest_tile(&world, &mob, 1, 1, 3), (3, 1));
    }

    #[test]
    fn test_danger_flag_flips_mode() {
        let (mut world, mut rng) = rig();
        let mut mob = mob_at(&world, &mut rng, 1, 1, true);
        mob.target_mode = TargetMode::Wander;
        mob.target_tile = (3, 1);
        mob.target_remaining = 10.0;

        world.set_hazard(1, 1, 100);
        move_mob(&world, &[], &[], &mut rng, &mut mob, 1.0 / 30.0);
        assert_eq!(mob.target_mode, TargetMode::Flee);
        assert!(mob.danger);

        world.set_hazard(1, 1, 0);
        // Re-center first; fleeing may have moved it within the tile.
        mob.position = Vec2::new(world.to_pixel_x(1), world.to_pixel_y(1));
        move_mob(&world, &[], &[], &mut rng, &mut mob, 1.0 / 30.0);
        assert_ne!(mob.target_mode, TargetMode::Flee);
        assert!(!mob.danger);
    }

    #[test]
    fn test_wall_follow_turns_when_blocked() {
        let (world, mut rng) = rig();
        let mut mob = mob_at(&world, &mut rng, 1, 1, false);
        mob.target_mode = TargetMode::Clockwise;
        mob.target_remaining = 100.0;
        mob.facing = Direction::Up;

        // Facing the border wall; first action tick turns clockwise without
        // moving, the next one heads right.
        mob_action(&world, &[], &mut rng, &mut mob, 1.0 / 30.0);
        assert_eq!(mob.facing, Direction::Right);
        assert_eq!((mob.action.dx, mob.action.dy), (0, 0));

        mob_action(&world, &[], &mut rng, &mut mob, 1.0 / 30.0);
        assert_eq!((mob.action.dx, mob.action.dy), (1, 0));
    }

    #[test]
    fn test_mob_killed_by_harmful_blast() {
        let (mut world, mut rng) = rig();
        let mut mob = mob_at(&world, &mut rng, 1, 1, false);

        let owner = uuid::Uuid::new_v4();
        let exp = Explosion {
            id: 7,
            owner: Some(owner),
            owner_name: Some("killer".into()),
            position: Vec2::new(world.to_pixel_x(1), world.to_pixel_y(1)),
            remaining: 0.5,
            harmful: true,
            hazard_ts: 100,
        };
        world.set_overlay(1, 1, crate::game::world::CellObject::Explosion(7));

        let kill = move_mob(&world, &[], &[exp.clone()], &mut rng, &mut mob, 1.0 / 30.0);
        assert_eq!(kill, Some((owner, false)));
        assert!(!mob.active);

        // Harmless tail of the explosion no longer kills.
        let mut mob2 = mob_at(&world, &mut rng, 1, 1, false);
        let mut faded = exp;
        faded.harmful = false;
        let kill = move_mob(&world, &[], &[faded], &mut rng, &mut mob2, 1.0 / 30.0);
        assert_eq!(kill, None);
        assert!(mob2.active);
    }

    #[test]
    fn test_spawn_respects_population_and_clearance() {
        let (world, _) = rig();
        assert_eq!(max_mobs(&world), ((21 * 21) as f32 * 0.002) as usize);
    }
}
