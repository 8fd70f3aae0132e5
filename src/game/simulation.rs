//! The authoritative simulation: all mutable game state plus the fixed-order
//! tick that advances it.
//!
//! Tick phases run in a strict order so that results are reproducible for a
//! given input stream: session timeouts, explosion expiry, bomb fuses and
//! detonations, player zone reset, player input and movement (with pickups
//! and lethality), mob AI and movement, zone occupancy marking, removal of
//! dead entities, and finally the delayed-eviction list.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::game::constants::{cell, mob as mob_consts, player as player_consts, score, tick};
use crate::game::entities::{
    Action, Bomb, Explosion, Mob, Player, PlayerId, FLAG_INVINCIBLE, FLAG_WALK_THROUGH_BOMBS,
};
use crate::game::input_queue::PendingInputs;
use crate::game::movement;
use crate::game::systems::{bombs, mobs, zones};
use crate::game::world::{Chunk, EntityId, World};
use crate::util::vec2::Vec2;

/// Side effects of a tick that the session layer must deliver to clients
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Player died or timed out; the reason is shown on their death screen
    Dead { player_id: PlayerId, reason: String },
    /// Player picked something up; text is the floating label
    Powerup { player_id: PlayerId, text: String },
    /// The post-death grace period expired; drop the connection
    Evict { player_id: PlayerId },
}

/// Everything one client can see this tick
pub struct LocalView<'a> {
    pub players: Vec<&'a Player>,
    pub bombs: Vec<&'a Bomb>,
    pub explosions: Vec<&'a Explosion>,
    pub mobs: Vec<&'a Mob>,
    pub chunk: Chunk,
    pub total_players: usize,
}

struct Casualty {
    player_id: PlayerId,
    remaining: f32,
}

pub struct Simulation {
    pub world: World,
    pub players: Vec<Player>,
    pub mobs: Vec<Mob>,
    pub bombs: Vec<Bomb>,
    pub explosions: Vec<Explosion>,
    pub spawners: Vec<(i32, i32)>,

    pending: PendingInputs,
    kill_list: Vec<Casualty>,
    rng: StdRng,

    next_bomb_id: EntityId,
    next_explosion_id: EntityId,
    next_mob_id: EntityId,

    mob_timer: f32,
    max_mobs: usize,
    ticks: u64,
}

impl Simulation {
    /// Build a world, place the spawner grid and seed the block quota.
    pub fn new(width: i32, height: i32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut world = World::generate(width, height);
        let spawners = zones::add_mob_spawners(&mut world, &mut rng);
        zones::populate_blocks(&mut world, &mut rng, &[], &[], &spawners);

        let max_mobs = mobs::max_mobs(&world);
        let mob_timer = rng.gen_range(0.0..mob_consts::SPAWN_INTERVAL_MAX);

        info!(
            width = world.width,
            height = world.height,
            spawners = spawners.len(),
            max_mobs,
            "world generated"
        );

        Self {
            world,
            players: Vec::new(),
            mobs: Vec::new(),
            bombs: Vec::new(),
            explosions: Vec::new(),
            spawners,
            pending: PendingInputs::new(),
            kill_list: Vec::new(),
            rng,
            next_bomb_id: 1,
            next_explosion_id: 1,
            next_mob_id: 1,
            mob_timer,
            max_mobs,
            ticks: 0,
        }
    }

    /// Simulation clock in milliseconds, derived from the tick counter so
    /// hazard timestamps are reproducible.
    #[inline]
    pub fn clock_ms(&self) -> u64 {
        self.ticks * tick::DURATION_MS
    }

    // --- Players -------------------------------------------------------------

    /// Join a new player: sanitize the name, grant join protection and drop
    /// them on an open spawn cell.
    pub fn add_player(&mut self, id: PlayerId, name: &str) -> &Player {
        let mut player = Player::new(id, sanitize_name(name));
        player.set_invincible(player_consts::JOIN_PROTECTION);

        let (sx, sy) = self.world.spawn_point(&mut self.rng);
        player.position = Vec2::new(self.world.to_pixel_x(sx), self.world.to_pixel_y(sy));

        let images = ["p1", "p2", "p3", "p4"];
        player.image = images[self.rng.gen_range(0..images.len())].to_string();

        info!(player = %player.id, name = %player.name, "player joined");
        let idx = self.players.len();
        self.players.push(player);
        &self.players[idx]
    }

    pub fn remove_player(&mut self, id: PlayerId) {
        self.players.retain(|p| p.id != id);
        self.pending.remove(id);
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Record a ping from a player's connection, refreshing their session.
    pub fn touch_player(&mut self, id: PlayerId) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
            player.last_contact = std::time::Instant::now();
        }
    }

    /// Queue one input sample. The client-supplied delta time is discarded.
    pub fn queue_input(&mut self, id: PlayerId, mut action: Action) {
        action.delta_time = tick::DT;
        self.pending.push(id, action);
    }

    // --- Tick ----------------------------------------------------------------

    /// Advance the simulation by one fixed step.
    pub fn tick(&mut self) -> Vec<SimEvent> {
        let dt = tick::DT;
        let mut events = Vec::new();
        self.ticks += 1;

        // Players who died last tick stayed in the roster so their final
        // frame was still visible in snapshots; drop them now.
        let dead: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| !p.active)
            .map(|p| p.id)
            .collect();
        for id in dead {
            self.remove_player(id);
        }

        self.expire_sessions(&mut events);
        self.update_explosions(dt);
        self.update_bombs(dt);

        self.world.reset_player_zones();
        self.update_players(dt, &mut events);
        self.update_mobs(dt);

        for i in 0..self.players.len() {
            let mx = self.world.to_tile_x(self.players[i].position.x);
            let my = self.world.to_tile_y(self.players[i].position.y);
            self.world.mark_player_at(mx, my);
        }

        for casualty in &mut self.kill_list {
            casualty.remaining -= dt;
            if casualty.remaining <= 0.0 {
                events.push(SimEvent::Evict {
                    player_id: casualty.player_id,
                });
            }
        }
        self.kill_list.retain(|c| c.remaining > 0.0);

        events
    }

    fn expire_sessions(&mut self, events: &mut Vec<SimEvent>) {
        let timeout = std::time::Duration::from_secs(player_consts::SESSION_TIMEOUT_SECS);
        let mut expired = Vec::new();

        for player in &mut self.players {
            if player.active && player.last_contact.elapsed() > timeout {
                player.active = false;
                expired.push(player.id);
            }
        }

        for player_id in expired {
            info!(player = %player_id, "session timed out");
            events.push(SimEvent::Dead {
                player_id,
                reason: "You were disconnected due to session timeout. Sorry!".to_string(),
            });
            self.kill_list.push(Casualty {
                player_id,
                remaining: player_consts::DEATH_GRACE,
            });
        }
    }

    fn update_explosions(&mut self, dt: f32) {
        for i in 0..self.explosions.len() {
            self.explosions[i].update(dt);
            if self.explosions[i].remaining <= 0.0 {
                bombs::remove_explosion(&mut self.world, &self.explosions[i]);
            }
        }
        self.explosions.retain(|e| e.remaining > 0.0);
    }

    fn update_bombs(&mut self, dt: f32) {
        for i in 0..self.bombs.len() {
            if !self.bombs[i].active {
                // Chained bombs detonate inside another bomb's ray pass.
                self.bombs[i].remaining = 0.0;
                continue;
            }

            self.bombs[i].update(dt);
            if self.bombs[i].remaining <= 0.0 {
                let id = self.bombs[i].id;
                bombs::detonate(
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
        self.bombs.retain(|b| b.remaining > 0.0);
    }

    fn update_players(&mut self, dt: f32, events: &mut Vec<SimEvent>) {
        for i in 0..self.players.len() {
            if !self.players[i].active {
                continue;
            }

            let mut queued = self.pending.take(self.players[i].id);
            if queued.is_empty() {
                // Keep the last action but freeze its displacement.
                self.players[i].action.delta_time = 0.0;
            } else {
                self.players[i].action = queued.remove(0);
                // Requeue the rest for following ticks.
                for action in queued {
                    self.pending.push(self.players[i].id, action);
                }
            }

            self.move_player(i, dt, events);
        }
    }

    fn move_player(&mut self, i: usize, dt: f32, events: &mut Vec<SimEvent>) {
        if self.players[i].action.fire {
            let clock = self.clock_ms();
            bombs::place_bomb(
                &mut self.world,
                &mut self.players[i],
                &mut self.bombs,
                &mut self.next_bomb_id,
                clock,
            );
            // One bomb per press; the client must release fire first.
            self.players[i].action.fire = false;
        }

        self.players[i].update_effects(dt);

        let action = self.players[i].action;
        let step = {
            let player = &self.players[i];
            movement::resolve_step(
                &self.world,
                player.position,
                action.dx,
                action.dy,
                action.delta_time,
                player.speed,
                |x, y| player.can_pass(self.world.get_cell(x, y)),
            )
        };
        self.players[i].position = step.position;

        let mx = self.world.to_tile_x(step.position.x);
        let my = self.world.to_tile_y(step.position.y);

        let mut died = false;
        let mut reason = String::new();

        // Pickups and spawner contact on the tile we ended up on.
        let item = self.world.get_cell(mx, my);
        if item != cell::EMPTY {
            if item == cell::SPAWNER {
                died = true;
                reason = "You touched a robot spawner".to_string();
                self.spawn_environmental_explosion(step.position);
            } else if self.pick_up_item(i, item, events) {
                self.world.del_block_at(mx, my);
            }
        }

        if !self.players[i].has_flag(FLAG_INVINCIBLE) {
            // Mob contact.
            if !died {
                for m in 0..self.mobs.len() {
                    let d = self.mobs[m].position.distance_to(step.position);
                    if d < mob_consts::TOUCH_RANGE {
                        reason = if self.mobs[m].smart {
                            "You were killed by a robot overlord".to_string()
                        } else {
                            "You were killed by a robot".to_string()
                        };
                        died = true;
                        self.spawn_environmental_explosion(step.position);
                        break;
                    }
                }
            }

            // Blast contact.
            if !died {
                let exp = self
                    .world
                    .explosion_at(mx, my)
                    .and_then(|id| self.explosions.iter().find(|e| e.id == id))
                    .filter(|e| e.harmful)
                    .cloned();

                if let Some(exp) = exp {
                    died = true;
                    let victim_id = self.players[i].id;

                    if exp.owner != Some(victim_id) {
                        let killer = exp
                            .owner
                            .and_then(|id| self.players.iter_mut().find(|p| p.id == id));
                        match killer {
                            Some(killer) => {
                                killer.score += score::PLAYER_KILL;
                                reason = format!("You were killed by '{}'", killer.name);
                            }
                            None => {
                                let name = match exp.owner_name.as_deref() {
                                    Some(n) if !n.is_empty() => format!("'{n}'"),
                                    _ => "an unknown player".to_string(),
                                };
                                reason = format!(
                                    "You were killed by {name}, who has already died \
                                     since placing that bomb"
                                );
                            }
                        }
                    } else {
                        reason = "Oops! You were killed by your own bomb".to_string();
                    }
                }
            }
        }

        if died {
            let player = &mut self.players[i];
            info!(
                player = %player.id,
                name = %player.name,
                score = player.score,
                reason = %reason,
                "player killed"
            );
            events.push(SimEvent::Dead {
                player_id: player.id,
                reason,
            });
            player.active = false;
            self.kill_list.push(Casualty {
                player_id: player.id,
                remaining: player_consts::DEATH_GRACE,
            });
        }
    }

    /// Apply an item pickup. Returns whether the item was consumed.
    fn pick_up_item(&mut self, i: usize, item: u8, events: &mut Vec<SimEvent>) -> bool {
        let player_id = self.players[i].id;
        let mut powerup = |events: &mut Vec<SimEvent>, text: &str| {
            events.push(SimEvent::Powerup {
                player_id,
                text: text.to_string(),
            });
        };

        match item {
            cell::ITEM_BOMB => {
                self.players[i].max_bombs += 1;
                powerup(events, "+B");
                true
            }
            cell::ITEM_RANGE => {
                self.players[i].range += 1;
                powerup(events, "+R");
                true
            }
            cell::ITEM_MYSTERY => {
                let text = self.apply_mystery(i);
                if let Some(text) = text {
                    powerup(events, &text);
                }
                true
            }
            _ => false,
        }
    }

    /// Mystery items roll one of ten outcomes. Each permanent outcome has a
    /// bounds guard; a failed guard falls through to the next outcome in
    /// order, with the score boost as the permanent catch-all and a timed
    /// effect for the last slot.
    fn apply_mystery(&mut self, i: usize) -> Option<String> {
        let roll = self.rng.gen_range(0..10);
        let money: i64 = (self.rng.gen_range(0..9) + 1) * 10;

        for outcome in roll..=9 {
            if outcome == 9 {
                let label = self.players[i].add_random_effect(&mut self.rng);
                return (!label.is_empty()).then(|| label.to_string());
            }

            let player = &mut self.players[i];
            match outcome {
                0 => {
                    if player.max_bombs < player_consts::MAX_MAX_BOMBS {
                        player.max_bombs += 1;
                        return Some("+B".to_string());
                    }
                }
                1 => {
                    if player.max_bombs > 1 {
                        player.max_bombs -= 1;
                        return Some("-B".to_string());
                    }
                }
                2 => {
                    if player.range < player_consts::MAX_RANGE {
                        player.range += 1;
                        return Some("+R".to_string());
                    }
                }
                3 => {
                    if player.range > 1 {
                        player.range -= 1;
                        return Some("-R".to_string());
                    }
                }
                4 => {
                    return if !player.has_flag(FLAG_WALK_THROUGH_BOMBS) {
                        player.add_flag(FLAG_WALK_THROUGH_BOMBS);
                        Some("+TB".to_string())
                    } else {
                        player.del_flag(FLAG_WALK_THROUGH_BOMBS);
                        Some("-TB".to_string())
                    };
                }
                5 => {
                    if player.bomb_time < player_consts::MAX_FUSE {
                        player.bomb_time += 1.0;
                        return Some("SB".to_string());
                    }
                }
                6 => {
                    if player.bomb_time > player_consts::MIN_FUSE {
                        player.bomb_time -= 1.0;
                        return Some("FB".to_string());
                    }
                }
                7 => {
                    if player.score > 100 {
                        player.score -= money;
                        return Some("-$".to_string());
                    }
                }
                _ => {
                    player.score += money;
                    return Some("+$".to_string());
                }
            }
            // Guard failed; fall through to the next outcome.
        }

        None
    }

    fn spawn_environmental_explosion(&mut self, position: Vec2) {
        let id = self.next_explosion_id;
        self.next_explosion_id += 1;
        // Visual only: no overlay registration, so it cannot kill.
        self.explosions.push(Explosion::environmental(id, position));
    }

    fn update_mobs(&mut self, dt: f32) {
        for i in 0..self.mobs.len() {
            {
                let mob = &mut self.mobs[i];
                mobs::mob_action(&self.world, &self.players, &mut self.rng, mob, dt);
            }
            let kill = {
                let mob = &mut self.mobs[i];
                mobs::move_mob(
                    &self.world,
                    &self.players,
                    &self.explosions,
                    &mut self.rng,
                    mob,
                    dt,
                )
            };

            if let Some((owner, smart)) = kill {
                if let Some(player) = self.players.iter_mut().find(|p| p.id == owner) {
                    player.score += if smart {
                        score::SMART_MOB_KILL
                    } else {
                        score::MOB_KILL
                    };
                }
            }
        }

        self.mobs.retain(|m| m.active);

        self.mob_timer -= dt;
        if self.mob_timer <= 0.0 {
            self.mob_timer = self.rng.gen_range(0.0..mob_consts::SPAWN_INTERVAL_MAX);
            if self.mobs.len() < self.max_mobs {
                mobs::spawn_mob(
                    &self.world,
                    &self.players,
                    &mut self.mobs,
                    &self.spawners,
                    &mut self.rng,
                    &mut self.next_mob_id,
                );
                debug!(mobs = self.mobs.len(), "mob spawned");
            }
        }
    }

    // --- Maintenance ---------------------------------------------------------

    /// Recompute every player's rank and return the top of the table.
    /// Ranks are dense: tied scores share a rank and the next distinct
    /// score takes the next one.
    pub fn update_leaderboard(&mut self) -> Vec<(PlayerId, String, i64, u32)> {
        let mut order: Vec<(PlayerId, String, i64)> = self
            .players
            .iter()
            .map(|p| (p.id, p.name.clone(), p.score))
            .collect();
        order.sort_by(|a, b| b.2.cmp(&a.2));

        let mut ranked = Vec::with_capacity(order.len());
        let mut rank = 0u32;
        let mut last_score = None;
        for (id, name, score) in order {
            if last_score != Some(score) {
                rank += 1;
                last_score = Some(score);
            }
            if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
                player.rank = rank;
            }
            ranked.push((id, name, score, rank));
        }

        ranked.truncate(crate::game::constants::net::LEADERBOARD_SIZE);
        ranked
    }

    /// Periodic terrain replenishment pass.
    pub fn replenish(&mut self) {
        zones::replenish_one_zone(
            &mut self.world,
            &mut self.rng,
            &self.players,
            &self.mobs,
            &self.spawners,
        );
    }

    // --- Views ---------------------------------------------------------------

    /// Everything visible to one player: the terrain chunk centered on them
    /// (clamped to the map) plus every entity inside that window.
    pub fn local_view(&self, player_id: PlayerId) -> Option<LocalView<'_>> {
        let player = self.player(player_id)?;

        let mx = self.world.to_tile_x(player.position.x);
        let my = self.world.to_tile_y(player.position.y);

        let mut tx = mx - self.world.chunk_width / 2;
        let mut ty = my - self.world.chunk_height / 2;

        if tx < 0 {
            tx = 0;
        } else if tx + self.world.chunk_width > self.world.width {
            tx = self.world.width - self.world.chunk_width;
        }
        if ty < 0 {
            ty = 0;
        } else if ty + self.world.chunk_height > self.world.height {
            ty = self.world.height - self.world.chunk_height;
        }

        let inside = |pos: &Vec2| {
            let ox = self.world.to_tile_x(pos.x);
            let oy = self.world.to_tile_y(pos.y);
            ox >= tx && ox < tx + self.world.chunk_width && oy >= ty && oy < ty + self.world.chunk_height
        };

        Some(LocalView {
            players: self.players.iter().filter(|p| inside(&p.position)).collect(),
            bombs: self.bombs.iter().filter(|b| inside(&b.position)).collect(),
            explosions: self
                .explosions
                .iter()
                .filter(|e| inside(&e.position))
                .collect(),
            mobs: self.mobs.iter().filter(|m| inside(&m.position)).collect(),
            chunk: self.world.chunk(tx, ty),
            total_players: self.players.len(),
        })
    }
}

/// Strip characters outside the allowed name alphabet and cap the length.
/// The client does the same check, but cannot be trusted to.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, ',' | '.' | '_' | ':' | '\'' | '!' | '^' | '*' | '(' | ')' | '=' | '-')
        })
        .take(player_consts::MAX_NAME_LEN)
        .collect()
}
