//! Game session manager: runs the tick loop and streams state to players.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::{net, tick, zone};
use crate::game::entities::PlayerId;
use crate::game::input_queue::{InputBuffer, InputSender};
use crate::game::simulation::{SimEvent, Simulation};
use crate::metrics::Metrics;
use crate::net::protocol::{encode, LeaderboardEntry, ServerMessage, StateUpdate};

/// A connected player's stream writer for sending messages
pub struct PlayerConnection {
    pub player_id: PlayerId,
    pub player_name: String,
    pub writer: Arc<RwLock<Option<wtransport::SendStream>>>,
}

/// Shared game session: the simulation plus every live connection
pub struct GameSession {
    pub simulation: Simulation,
    pub connections: HashMap<PlayerId, PlayerConnection>,
    pub metrics: Arc<Metrics>,
    input: InputBuffer,
}

impl GameSession {
    pub fn new(config: &ServerConfig, metrics: Arc<Metrics>) -> Self {
        let simulation = Simulation::new(config.world_width, config.world_height, config.seed);

        Self {
            simulation,
            connections: HashMap::new(),
            metrics,
            input: InputBuffer::new(net::INPUT_CHANNEL_CAPACITY),
        }
    }

    /// New input sender handle; each connection holds its own clone.
    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    /// Add a player to the session and spawn them into the simulation.
    pub fn add_player(
        &mut self,
        player_id: PlayerId,
        name: &str,
        writer: Arc<RwLock<Option<wtransport::SendStream>>>,
    ) {
        let player = self.simulation.add_player(player_id, name);
        let player_name = player.name.clone();
        info!("Adding player {} ({}) to game session", player_name, player_id);

        self.connections.insert(
            player_id,
            PlayerConnection {
                player_id,
                player_name,
                writer,
            },
        );
        self.metrics.set_player_count(self.connections.len() as u64);
    }

    /// Remove a player from the session and the simulation.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        if self.connections.remove(&player_id).is_some() {
            info!("Removing player {} from game session", player_id);
        }
        self.simulation.remove_player(player_id);
        self.metrics.set_player_count(self.connections.len() as u64);
    }

    /// Drop a connection without touching the simulation. Used on eviction,
    /// where the simulation has already removed the player.
    fn drop_connection(&mut self, player_id: PlayerId) {
        self.connections.remove(&player_id);
        self.metrics.set_player_count(self.connections.len() as u64);
    }

    /// File every buffered input into the per-player pending queues.
    fn drain_inputs(&mut self) {
        for message in self.input.drain() {
            self.metrics
                .messages_received
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.simulation.queue_input(message.player_id, message.action);
        }
    }
}

/// Broadcast a message to all connected players
pub async fn broadcast_message(session: &GameSession, message: &ServerMessage) {
    let encoded = match encode(message) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to encode message for broadcast: {}", e);
            return;
        }
    };

    let len_bytes = (encoded.len() as u32).to_le_bytes();

    for (player_id, conn) in session.connections.iter() {
        let writer = conn.writer.clone();
        let encoded = encoded.clone();
        let pid = *player_id;

        tokio::spawn(async move {
            if let Some(writer) = &mut *writer.write().await {
                if let Err(e) = writer.write_all(&len_bytes).await {
                    warn!("Broadcast to {}: failed to write length: {}", pid, e);
                    return;
                }
                if let Err(e) = writer.write_all(&encoded).await {
                    warn!("Broadcast to {}: failed to write data: {}", pid, e);
                }
            } else {
                debug!("Broadcast to {}: writer is None", pid);
            }
        });
    }
}

/// Send a message to a specific player
pub async fn send_to_player(
    writer: &Arc<RwLock<Option<wtransport::SendStream>>>,
    message: &ServerMessage,
) -> Result<(), String> {
    let encoded = encode(message).map_err(|e| e.to_string())?;
    let len_bytes = (encoded.len() as u32).to_le_bytes();

    if let Some(writer) = &mut *writer.write().await {
        writer
            .write_all(&len_bytes)
            .await
            .map_err(|e| e.to_string())?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    } else {
        Err("Writer not available".to_string())
    }
}

/// Start the game loop background task
pub fn start_game_loop(session: Arc<RwLock<GameSession>>) {
    tokio::spawn(async move {
        let tick_duration = Duration::from_millis(tick::DURATION_MS);
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let leaderboard_ticks = (net::LEADERBOARD_INTERVAL * tick::RATE as f32) as u64;
        let replenish_ticks = (zone::REPLENISH_INTERVAL * tick::RATE as f32) as u64;
        let watermark_ticks = (net::WATERMARK_INTERVAL * tick::RATE as f32) as u64;

        info!("Game loop started at {} Hz", tick::RATE);
        let start = Instant::now();
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            let tick_start = Instant::now();
            let mut updates = Vec::new();
            let mut personal = Vec::new();
            let mut leaderboard = None;

            let events = {
                let mut guard = session.write().await;

                guard.drain_inputs();
                let events = guard.simulation.tick();

                if tick_count % replenish_ticks == 0 {
                    guard.simulation.replenish();
                }

                if tick_count % leaderboard_ticks == 0 {
                    let top = guard.simulation.update_leaderboard();
                    let entries: Vec<LeaderboardEntry> = top
                        .into_iter()
                        .map(|(_, name, score, rank)| LeaderboardEntry { name, score, rank })
                        .collect();
                    leaderboard = Some(ServerMessage::Leaderboard(entries));
                }

                if tick_count % watermark_ticks == 0 {
                    guard.metrics.update_watermark();
                }

                // Per-player local views, captured while the state is locked.
                for conn in guard.connections.values() {
                    if let Some(view) = guard.simulation.local_view(conn.player_id) {
                        updates.push((
                            conn.writer.clone(),
                            conn.player_id,
                            ServerMessage::UpdatePlayers(StateUpdate::from_view(&view)),
                        ));
                    }
                }

                for event in &events {
                    match event {
                        SimEvent::Dead { player_id, reason } => {
                            if let Some(conn) = guard.connections.get(player_id) {
                                personal.push((
                                    conn.writer.clone(),
                                    *player_id,
                                    ServerMessage::Dead {
                                        reason: reason.clone(),
                                    },
                                ));
                            }
                        }
                        SimEvent::Powerup { player_id, text } => {
                            if let Some(conn) = guard.connections.get(player_id) {
                                personal.push((
                                    conn.writer.clone(),
                                    *player_id,
                                    ServerMessage::Powerup { text: text.clone() },
                                ));
                            }
                        }
                        SimEvent::Evict { .. } => {}
                    }
                }

                guard.metrics.messages_sent.fetch_add(
                    (updates.len() + personal.len()) as u64,
                    std::sync::atomic::Ordering::Relaxed,
                );
                guard.metrics.record_tick_time(tick_start.elapsed());
                events
            };

            // Deaths and pickups go out before the state update so the death
            // screen wins over a stale frame.
            for (writer, pid, message) in personal {
                if let Err(e) = send_to_player(&writer, &message).await {
                    debug!("Send to {}: {}", pid, e);
                }
            }

            for (writer, pid, message) in updates {
                tokio::spawn(async move {
                    if let Err(e) = send_to_player(&writer, &message).await {
                        debug!("Update to {}: {}", pid, e);
                    }
                });
            }

            if let Some(message) = leaderboard {
                let guard = session.read().await;
                broadcast_message(&guard, &message).await;
            }

            // Evictions drop the connection; the simulation already removed
            // the player when the death grace ran out.
            for event in &events {
                if let SimEvent::Evict { player_id } = event {
                    let mut guard = session.write().await;
                    guard.drop_connection(*player_id);
                }
            }

            // Log stats periodically (every 30 seconds)
            if tick_count % (tick::RATE as u64 * 30) == 0 {
                let guard = session.read().await;
                info!(
                    "Game: {}s, tick {}, {} players, {} mobs, {} bombs | tick time {}us",
                    start.elapsed().as_secs(),
                    tick_count,
                    guard.connections.len(),
                    guard.simulation.mobs.len(),
                    guard.simulation.bombs.len(),
                    guard
                        .metrics
                        .tick_time_us
                        .load(std::sync::atomic::Ordering::Relaxed)
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_session() -> GameSession {
        let config = ServerConfig {
            world_width: 21,
            world_height: 21,
            seed: Some(9),
            ..Default::default()
        };
        GameSession::new(&config, Arc::new(Metrics::new()))
    }

    #[test]
    fn test_add_and_remove_player() {
        let mut session = test_session();
        let pid = Uuid::new_v4();
        let writer = Arc::new(RwLock::new(None));

        session.add_player(pid, "tester", writer);
        assert_eq!(session.player_count(), 1);
        assert!(session.simulation.player(pid).is_some());
        assert_eq!(
            session
                .metrics
                .players_current
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );

        session.remove_player(pid);
        assert_eq!(session.player_count(), 0);
        assert!(session.simulation.player(pid).is_none());
    }

    #[test]
    fn test_inputs_reach_simulation() {
        let mut session = test_session();
        let pid = Uuid::new_v4();
        session.add_player(pid, "tester", Arc::new(RwLock::new(None)));

        let sender = session.input_sender();
        sender
            .try_send(pid, crate::game::entities::Action::step(1, 0, false))
            .unwrap();

        session.drain_inputs();
        let events = session.simulation.tick();
        assert!(events.is_empty());

        // The queued action became the player's current action.
        let player = session.simulation.player(pid).unwrap();
        assert_eq!(player.action.dx, 1);
    }
}
