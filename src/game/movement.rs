//! Grid-locked movement resolver.
//!
//! Players, mobs and the client-prediction replay all step through the same
//! resolver so that a replayed input lands on exactly the position the
//! authoritative tick produced. Movement is continuous in pixels but locked
//! to tile-center lanes; a blocked axis is only cancelled once the mover has
//! reached or passed the center of its current tile, which is what produces
//! the smooth slide up to a wall instead of a hard stop.

use crate::game::constants::{cell, player as player_consts, tick};
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Outcome of one resolver step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStep {
    pub position: Vec2,
    /// The direction actually applied after cancellation and lane steering
    pub dx: i8,
    pub dy: i8,
    /// Set when the mover was found inside a wall and snapped out
    pub recovered: bool,
}

/// Advance one mover by one input sample.
///
/// `can_pass` answers whether the mover may enter the tile at the given
/// coordinates; players and mobs supply different predicates (bomb flags,
/// hazard awareness). `speed` is the raw speed; the clamp to the safe window
/// is applied to the displacement only, while the lane tolerance uses the raw
/// value so that over-boosted movers do not oscillate around the lane center.
pub fn resolve_step(
    world: &World,
    position: Vec2,
    dx: i8,
    dy: i8,
    delta_time: f32,
    speed: f32,
    can_pass: impl Fn(i32, i32) -> bool,
) -> ResolvedStep {
    let mut pos = position;
    let mut recovered = false;

    let mut mx = world.to_tile_x(pos.x);
    let mut my = world.to_tile_y(pos.y);

    if world.get_cell(mx, my) == cell::WALL {
        // Inside a wall somehow; snap to the nearest blank cell.
        let (bx, by) = world.find_nearest_blank(mx, my);
        pos.x = world.to_pixel_x(bx);
        pos.y = world.to_pixel_y(by);
        mx = bx;
        my = by;
        recovered = true;
    }

    let target_x = world.to_pixel_x(mx);
    let target_y = world.to_pixel_y(my);

    let mut dx = dx.signum() as i32;
    let mut dy = dy.signum() as i32;

    // Cancel a blocked axis, but only once the mover has reached or passed
    // the center of its current tile.
    if dx != 0 && !can_pass(mx + dx, my) {
        if dx < 0 && pos.x <= target_x {
            dx = 0;
            pos.x = target_x;
        } else if dx > 0 && pos.x >= target_x {
            dx = 0;
            pos.x = target_x;
        }
    }
    if dy != 0 && !can_pass(mx, my + dy) {
        if dy < 0 && pos.y <= target_y {
            dy = 0;
            pos.y = target_y;
        } else if dy > 0 && pos.y >= target_y {
            dy = 0;
            pos.y = target_y;
        }
    }

    // Lock to lanes. Horizontal movement only happens on a row center;
    // if the mover is off-lane by more than one step, steer toward the
    // lane instead, otherwise snap onto it. Vertical is symmetric, and
    // horizontal wins when both axes are held.
    let tolerance = speed / tick::RATE as f32;
    if dx != 0 {
        if target_y > pos.y + tolerance {
            dx = 0;
            dy = 1;
        } else if target_y < pos.y - tolerance {
            dx = 0;
            dy = -1;
        } else {
            pos.y = target_y;
            dy = 0;
        }
    } else if dy != 0 {
        if target_x > pos.x + tolerance {
            dy = 0;
            dx = 1;
        } else if target_x < pos.x - tolerance {
            dy = 0;
            dx = -1;
        } else {
            pos.x = target_x;
            dx = 0;
        }
    }

    let effective_speed = speed.clamp(player_consts::MIN_SPEED, player_consts::MAX_SPEED);
    pos.x += dx as f32 * delta_time * effective_speed;
    pos.y += dy as f32 * delta_time * effective_speed;

    ResolvedStep {
        position: pos,
        dx: dx as i8,
        dy: dy as i8,
        recovered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tick;

    fn open_pass(world: &World) -> impl Fn(i32, i32) -> bool + '_ {
        move |x, y| world.get_cell(x, y) == cell::EMPTY
    }

    fn world() -> World {
        World::generate(21, 21)
    }

    #[test]
    fn test_free_movement() {
        let w = world();
        // Center of (1,1), moving right along an open corridor row.
        let pos = Vec2::new(48.0, 48.0);
        let step = resolve_step(&w, pos, 1, 0, tick::DT, 200.0, open_pass(&w));
        assert_eq!(step.dx, 1);
        assert_eq!(step.dy, 0);
        assert!((step.position.x - (48.0 + 200.0 * tick::DT)).abs() < 1e-4);
        assert_eq!(step.position.y, 48.0);
        assert!(!step.recovered);
    }

    #[test]
    fn test_blocked_axis_cancelled_at_center() {
        let w = world();
        // (1,1) center, pushing left into the border wall.
        let pos = Vec2::new(48.0, 48.0);
        let step = resolve_step(&w, pos, -1, 0, tick::DT, 200.0, open_pass(&w));
        assert_eq!(step.dx, 0);
        assert_eq!(step.position.x, 48.0);
    }

    #[test]
    fn test_blocked_axis_still_moves_before_center() {
        let w = world();
        // Past the center of (1,1) moving left: the wall at x=0 is blocked
        // but the mover has not yet reached the center, so it keeps sliding.
        let pos = Vec2::new(52.0, 48.0);
        let step = resolve_step(&w, pos, -1, 0, tick::DT, 200.0, open_pass(&w));
        assert_eq!(step.dx, -1);
        assert!(step.position.x < 52.0);
        assert!(step.position.x >= 48.0 - 200.0 * tick::DT);
    }

    #[test]
    fn test_lane_lock_snaps_within_tolerance() {
        let w = world();
        // Slightly off the row center, moving right; within one step of the
        // lane so the resolver snaps y to it.
        let pos = Vec2::new(48.0, 50.0);
        let step = resolve_step(&w, pos, 1, 0, tick::DT, 200.0, open_pass(&w));
        assert_eq!(step.position.y, 48.0);
        assert_eq!(step.dx, 1);
    }

    #[test]
    fn test_lane_lock_steers_toward_center() {
        let w = world();
        // Far off the row center; the horizontal press is converted into a
        // vertical correction toward the lane.
        let pos = Vec2::new(48.0, 62.0);
        let step = resolve_step(&w, pos, 1, 0, tick::DT, 200.0, open_pass(&w));
        assert_eq!(step.dx, 0);
        assert_eq!(step.dy, -1);
        assert!(step.position.y < 62.0);
    }

    #[test]
    fn test_wall_recovery() {
        let w = world();
        // Inside the pillar at (2,2).
        let pos = Vec2::new(80.0, 80.0);
        let step = resolve_step(&w, pos, 0, 0, tick::DT, 200.0, open_pass(&w));
        assert!(step.recovered);
        let mx = w.to_tile_x(step.position.x);
        let my = w.to_tile_y(step.position.y);
        assert_eq!(w.get_cell(mx, my), cell::EMPTY);
    }

    #[test]
    fn test_speed_clamped_to_safe_window() {
        let w = world();
        let pos = Vec2::new(48.0, 48.0);
        let step = resolve_step(&w, pos, 1, 0, tick::DT, 1000.0, open_pass(&w));
        assert!((step.position.x - (48.0 + 300.0 * tick::DT)).abs() < 1e-4);

        let step = resolve_step(&w, pos, 1, 0, tick::DT, 10.0, open_pass(&w));
        assert!((step.position.x - (48.0 + 50.0 * tick::DT)).abs() < 1e-4);
    }
}
