//! Wire protocol: JSON messages tagged by event name.
//!
//! Every message is a `{"event": ..., "data": ...}` object serialized with
//! serde_json and carried inside a length-prefixed frame (see
//! [`crate::net::framing`]). Snapshot structs are the client-facing view of
//! the simulation entities; server-only fields never leave this module.

use serde::{Deserialize, Serialize};

use crate::game::entities::{Action, Bomb, Explosion, Mob, Player, PlayerId};
use crate::game::simulation::LocalView;
use crate::game::world::{Chunk, World};

/// Errors that can occur encoding or decoding protocol messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Join the game with a display name
    #[serde(rename = "create player")]
    CreatePlayer { name: String },

    /// One sampled input frame
    #[serde(rename = "player input")]
    PlayerInput(Action),

    /// Latency probe; also counts as a liveness signal
    #[serde(rename = "pingme")]
    Ping { ms: u64 },

    /// Request server statistics
    #[serde(rename = "get data")]
    GetData,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// The joining player's own starting state
    #[serde(rename = "spawn player")]
    SpawnPlayer(PlayerSnapshot),

    /// Full terrain, sent once after spawn
    #[serde(rename = "create world")]
    CreateWorld(WorldInit),

    /// Per-tick local state update
    #[serde(rename = "update players")]
    UpdatePlayers(StateUpdate),

    /// The recipient died; reason is shown on the death screen
    #[serde(rename = "dead")]
    Dead { reason: String },

    /// Floating pickup label for the recipient
    #[serde(rename = "powerup")]
    Powerup { text: String },

    /// Top scores, broadcast periodically
    #[serde(rename = "leaderboard")]
    Leaderboard(Vec<LeaderboardEntry>),

    /// Latency probe reply, echoes the client timestamp
    #[serde(rename = "pongme")]
    Pong { ms: u64 },

    /// Server statistics reply
    #[serde(rename = "server data")]
    ServerData { users: u64 },
}

/// Static world description sent at join time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldInit {
    pub width: i32,
    pub height: i32,
    pub tile_size: i32,
    pub chunk_width: i32,
    pub chunk_height: i32,
    pub data: Vec<u8>,
}

impl WorldInit {
    pub fn from_world(world: &World) -> Self {
        Self {
            width: world.width,
            height: world.height,
            tile_size: world.tile_size,
            chunk_width: world.chunk_width,
            chunk_height: world.chunk_height,
            data: world.terrain_data(),
        }
    }
}

/// Client-facing view of a player. The embedded action carries the last
/// sequence id the server applied, which the client uses to trim its
/// prediction buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub image: String,
    pub name: String,
    pub score: i64,
    pub rank: u32,
    pub flags: u8,
    pub speed: f32,
    pub range: u32,
    pub bomb_time: f32,
    pub max_bombs: u32,
    pub cur_bombs: u32,
    pub action: Action,
}

impl PlayerSnapshot {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            x: player.position.x,
            y: player.position.y,
            image: player.image.clone(),
            name: player.name.clone(),
            score: player.score,
            rank: player.rank,
            flags: player.flags,
            speed: player.speed,
            range: player.range,
            bomb_time: player.bomb_time,
            max_bombs: player.max_bombs,
            cur_bombs: player.cur_bombs,
            action: player.action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub remaining: f32,
}

impl BombSnapshot {
    pub fn from_bomb(bomb: &Bomb) -> Self {
        Self {
            id: bomb.id,
            x: bomb.position.x,
            y: bomb.position.y,
            remaining: bomb.remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplosionSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub remaining: f32,
    pub harmful: bool,
}

impl ExplosionSnapshot {
    pub fn from_explosion(explosion: &Explosion) -> Self {
        Self {
            id: explosion.id,
            x: explosion.position.x,
            y: explosion.position.y,
            remaining: explosion.remaining,
            harmful: explosion.harmful,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub image: String,
    pub name: String,
}

impl MobSnapshot {
    pub fn from_mob(mob: &Mob) -> Self {
        Self {
            id: mob.id,
            x: mob.position.x,
            y: mob.position.y,
            image: mob.image.clone(),
            name: mob.name.clone(),
        }
    }
}

/// Aggregate counters shipped with every state update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_players: usize,
}

/// One tick's worth of state around a player: nearby entities plus the
/// terrain chunk under their viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub players: Vec<PlayerSnapshot>,
    pub bombs: Vec<BombSnapshot>,
    pub explosions: Vec<ExplosionSnapshot>,
    pub mobs: Vec<MobSnapshot>,
    #[serde(rename = "worlddata")]
    pub chunk: Chunk,
    pub stats: Stats,
}

impl StateUpdate {
    pub fn from_view(view: &LocalView<'_>) -> Self {
        Self {
            players: view.players.iter().map(|p| PlayerSnapshot::from_player(p)).collect(),
            bombs: view.bombs.iter().map(|b| BombSnapshot::from_bomb(b)).collect(),
            explosions: view
                .explosions
                .iter()
                .map(|e| ExplosionSnapshot::from_explosion(e))
                .collect(),
            mobs: view.mobs.iter().map(|m| MobSnapshot::from_mob(m)).collect(),
            chunk: view.chunk.clone(),
            stats: Stats {
                total_players: view.total_players,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub rank: u32,
}

/// Serialize a server message to bytes
pub fn encode(message: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a client message from bytes
pub fn decode(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_event_names() {
        let msg = decode(br#"{"event":"create player","data":{"name":"ada"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreatePlayer { name } if name == "ada"));

        let msg = decode(br#"{"event":"pingme","data":{"ms":123}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { ms: 123 }));

        let msg = decode(br#"{"event":"get data"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetData));
    }

    #[test]
    fn test_player_input_round_trip() {
        let raw = br#"{"event":"player input","data":{"dx":1,"dy":0,"fire":true,"sequenceId":7,"deltaTime":0.033}}"#;
        let msg = decode(raw).unwrap();
        match msg {
            ClientMessage::PlayerInput(action) => {
                assert_eq!(action.dx, 1);
                assert_eq!(action.dy, 0);
                assert!(action.fire);
                assert_eq!(action.sequence_id, 7);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_server_message_tagging() {
        let json = serde_json::to_value(&ServerMessage::Dead {
            reason: "test".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "dead");
        assert_eq!(json["data"]["reason"], "test");

        let json = serde_json::to_value(&ServerMessage::Pong { ms: 42 }).unwrap();
        assert_eq!(json["event"], "pongme");
    }

    #[test]
    fn test_world_init_carries_terrain() {
        let world = World::generate(21, 21);
        let init = WorldInit::from_world(&world);
        assert_eq!(init.width, 21);
        assert_eq!(init.data.len(), 21 * 21);

        let encoded = encode(&ServerMessage::CreateWorld(init)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["event"], "create world");
        assert_eq!(value["data"]["tileSize"], 32);
    }

    #[test]
    fn test_update_players_wire_shape() {
        let mut sim = crate::game::simulation::Simulation::new(21, 21, Some(3));
        let id = crate::game::entities::PlayerId::new_v4();
        sim.add_player(id, "t");
        let view = sim.local_view(id).unwrap();
        let update = StateUpdate::from_view(&view);

        let value = serde_json::to_value(ServerMessage::UpdatePlayers(update)).unwrap();
        assert_eq!(value["event"], "update players");
        // The chunk travels as "worlddata" and the head count inside "stats".
        assert!(value["data"]["worlddata"]["data"].is_array());
        assert_eq!(value["data"]["stats"]["totalPlayers"], 1);
        assert_eq!(value["data"]["players"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"event":"no such event"}"#).is_err());
    }
}
