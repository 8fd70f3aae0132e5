//! Destructible-block seeding and replenishment.
//!
//! The map is divided into 16x16 zones, each with a block quota proportional
//! to its usable area. Initial seeding fills every zone to quota; afterwards
//! a periodic pass tops up the single quota-short zone with the largest
//! shortfall, skipping zones that currently contain players so terrain never
//! changes in front of someone.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::game::constants::{world as world_consts, zone};
use crate::game::entities::{Mob, Player};
use crate::game::world::World;

/// Placement attempt bound per replenish call, so a zone with no room left
/// cannot stall the tick loop.
const MAX_PLACEMENT_ATTEMPTS: u32 = 200;

/// Compute every zone's quota and seed it with blocks. Run once at startup,
/// after spawners are placed and before any player joins.
pub fn populate_blocks(
    world: &mut World,
    rng: &mut impl Rng,
    players: &[Player],
    mobs: &[Mob],
    spawners: &[(i32, i32)],
) {
    for zy in 0..world.zones_down {
        for zx in 0..world.zones_across {
            let ew = world.effective_zone_width(zx);
            let eh = world.effective_zone_height(zy);
            let quota = ((ew * eh) as f32 * zone::QUOTA_RATIO) as u32;

            let idx = world.zone_index(zx, zy);
            world.zone_quota[idx] = quota;

            replenish_zone(world, rng, zx, zy, None, players, mobs, spawners);
        }
    }
}

/// Top up one zone toward its quota. `count` bounds how many blocks a single
/// call may add; `None` fills to quota.
#[allow(clippy::too_many_arguments)]
pub fn replenish_zone(
    world: &mut World,
    rng: &mut impl Rng,
    zx: i32,
    zy: i32,
    count: Option<u32>,
    players: &[Player],
    mobs: &[Mob],
    spawners: &[(i32, i32)],
) {
    let mut ew = world.effective_zone_width(zx);
    let mut eh = world.effective_zone_height(zy);
    let idx = world.zone_index(zx, zy);
    let quota = world.zone_quota[idx];

    let mut zone_left = zx * zone::WIDTH;
    let mut zone_top = zy * zone::HEIGHT;

    // The border row and column are never valid placements.
    if zone_left == 0 {
        zone_left = 1;
        ew -= 1;
    }
    if zone_top == 0 {
        zone_top = 1;
        eh -= 1;
    }
    if ew <= 0 || eh <= 0 {
        return;
    }

    let mut added = 0u32;
    let mut attempts = 0u32;

    while world.blocks_per_zone[idx] < quota {
        attempts += 1;
        if attempts > MAX_PLACEMENT_ATTEMPTS {
            warn!(zone = idx, "gave up replenishing zone, no room found");
            break;
        }

        let bx = rng.gen_range(0..ew) + zone_left;
        let by = rng.gen_range(0..eh) + zone_top;

        let (px, py) = world.find_nearest_blank(bx, by);

        // The fallback corner is the emergency spawn cell; leave it open.
        if (px, py) == world_consts::FALLBACK_CELL {
            continue;
        }

        if nearby_player(world, players, px, py)
            || nearby_mob(world, mobs, px, py)
            || nearby_spawner(spawners, px, py)
        {
            continue;
        }

        world.add_block_at(px, py);
        added += 1;

        if let Some(limit) = count {
            if added >= limit {
                break;
            }
        }
    }
}

/// Pick the player-free zone with the largest quota shortfall and restock a
/// third of the shortfall. Called periodically from the tick loop.
pub fn replenish_one_zone(
    world: &mut World,
    rng: &mut impl Rng,
    players: &[Player],
    mobs: &[Mob],
    spawners: &[(i32, i32)],
) {
    let mut best: Option<(usize, u32)> = None;

    for i in 0..world.players_per_zone.len() {
        let quota = world.zone_quota[i];
        if world.players_per_zone[i] != 0 || world.blocks_per_zone[i] >= quota {
            continue;
        }
        let shortfall = quota - world.blocks_per_zone[i];
        if best.map_or(true, |(_, s)| shortfall > s) {
            best = Some((i, shortfall));
        }
    }

    if let Some((idx, shortfall)) = best {
        let zx = idx as i32 % world.zones_across;
        let zy = idx as i32 / world.zones_across;
        debug!(zone = idx, shortfall, "replenishing zone");
        replenish_zone(
            world,
            rng,
            zx,
            zy,
            Some(shortfall / 3 + 1),
            players,
            mobs,
            spawners,
        );
    }
}

/// Place the spawner grid: one spawner per map quadrant cell, snapped to the
/// nearest blank. Returns the spawner tile positions.
pub fn add_mob_spawners(world: &mut World, rng: &mut impl Rng) -> Vec<(i32, i32)> {
    let mut spawners = Vec::new();

    for py in 0..crate::game::constants::mob::SPAWNERS_Y {
        for px in 0..crate::game::constants::mob::SPAWNERS_X {
            let step_x = world.width as f32 / crate::game::constants::mob::SPAWNERS_X as f32;
            let step_y = world.height as f32 / crate::game::constants::mob::SPAWNERS_Y as f32;
            let mx = (step_x * px as f32 + step_x / 2.0) as i32;
            let my = (step_y * py as f32 + step_y / 2.0) as i32;

            let mut blank = world.find_nearest_blank(mx, my);
            if blank == world_consts::FALLBACK_CELL {
                // Try once more from a random interior cell.
                let bx = rng.gen_range(1..world.width - 1);
                let by = rng.gen_range(1..world.height - 1);
                blank = world.find_nearest_blank(bx, by);
                if blank == world_consts::FALLBACK_CELL {
                    warn!("unable to place mob spawner");
                    continue;
                }
            }

            world.set_cell(blank.0, blank.1, crate::game::constants::cell::SPAWNER);
            spawners.push(blank);
        }
    }

    spawners
}

/// Pick a spawner with no mob nearby and return it, preferring a random one.
pub fn free_spawner(
    world: &World,
    rng: &mut impl Rng,
    spawners: &[(i32, i32)],
    mobs: &[Mob],
) -> Option<(i32, i32)> {
    let mut shuffled = spawners.to_vec();
    shuffled.shuffle(rng);

    shuffled.into_iter().find(|&(sx, sy)| {
        !mobs.iter().any(|m| {
            let mmx = world.to_tile_x(m.position.x);
            let mmy = world.to_tile_y(m.position.y);
            mmx > sx - crate::game::constants::mob::SPAWN_CLEARANCE
                && mmx < sx + crate::game::constants::mob::SPAWN_CLEARANCE
                && mmy > sy - crate::game::constants::mob::SPAWN_CLEARANCE
                && mmy < sy + crate::game::constants::mob::SPAWN_CLEARANCE
        })
    })
}

fn nearby_player(world: &World, players: &[Player], mx: i32, my: i32) -> bool {
    let sx = world.to_pixel_x(mx);
    let sy = world.to_pixel_y(my);
    let xrange = (zone::PLAYER_CLEARANCE * world.tile_size) as f32;
    let yrange = xrange;

    players.iter().any(|p| {
        p.position.x > sx - xrange
            && p.position.x < sx + xrange
            && p.position.y > sy - yrange
            && p.position.y < sy + yrange
    })
}

fn nearby_mob(world: &World, mobs: &[Mob], mx: i32, my: i32) -> bool {
    let sx = world.to_pixel_x(mx);
    let sy = world.to_pixel_y(my);
    let xrange = (zone::MOB_CLEARANCE * world.tile_size) as f32;
    let yrange = xrange;

    mobs.iter().any(|m| {
        m.position.x > sx - xrange
            && m.position.x < sx + xrange
            && m.position.y > sy - yrange
            && m.position.y < sy + yrange
    })
}

fn nearby_spawner(spawners: &[(i32, i32)], mx: i32, my: i32) -> bool {
    spawners.iter().any(|&(sx, sy)| {
        sx > mx - zone::SPAWNER_CLEARANCE
            && sx < mx + zone::SPAWNER_CLEARANCE
            && sy > my - zone::SPAWNER_CLEARANCE
            && sy < my + zone::SPAWNER_CLEARANCE
    })
}
