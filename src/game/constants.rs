/// Tick timing constants - the whole simulation is locked to 30 Hz
pub mod tick {
    /// Server tick rate in Hz
    pub const RATE: u32 = 30;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 30.0;
    /// Tick duration in milliseconds
    pub const DURATION_MS: u64 = 1000 / RATE as u64;
}

/// Terrain codes stored in the world's dense tile layer
pub mod cell {
    pub const EMPTY: u8 = 0;
    pub const WALL: u8 = 1;
    /// Destructible block
    pub const BLOCK: u8 = 2;
    /// Bomb-capacity powerup
    pub const ITEM_BOMB: u8 = 3;
    /// Blast-range powerup
    pub const ITEM_RANGE: u8 = 4;
    /// Mystery powerup - contents decided at pickup
    pub const ITEM_MYSTERY: u8 = 5;
    /// Mob spawner - walkable but lethal, indestructible
    pub const SPAWNER: u8 = 6;
    /// Cell occupied by a live bomb
    pub const BOMB: u8 = 100;
}

/// World geometry constants
pub mod world {
    /// Default map size in tiles. Width and height must be odd; smaller maps
    /// risk being cleared faster than the replenisher can restock them.
    pub const DEFAULT_WIDTH: i32 = 101;
    pub const DEFAULT_HEIGHT: i32 = 101;
    /// Tile edge length in pixels
    pub const TILE_SIZE: i32 = 32;
    /// Default visibility window in tiles (clients with a known screen size
    /// get floor(screen / TILE_SIZE) + 10 instead)
    pub const DEFAULT_CHUNK: i32 = 32;
    /// Extra tiles added around a screen-derived chunk so client-side
    /// prediction can run ahead of the server without leaving the window
    pub const CHUNK_MARGIN: i32 = 10;
    /// Search radius bound for the expanding-square blank-cell search
    pub const BLANK_SEARCH_RADIUS: i32 = 20;
    /// Where entities land when no blank cell can be found
    pub const FALLBACK_CELL: (i32, i32) = (1, 1);
}

/// Zone bookkeeping for terrain replenishment
pub mod zone {
    /// Zone edge lengths in tiles
    pub const WIDTH: i32 = 16;
    pub const HEIGHT: i32 = 16;
    /// Fraction of a zone's effective area kept stocked with blocks
    pub const QUOTA_RATIO: f32 = 0.2;
    /// Seconds between replenishment passes
    pub const REPLENISH_INTERVAL: f32 = 10.0;
    /// Candidate rejection radii, in tiles
    pub const PLAYER_CLEARANCE: i32 = 4;
    pub const MOB_CLEARANCE: i32 = 3;
    pub const SPAWNER_CLEARANCE: i32 = 3;
}

/// Player tuning
pub mod player {
    /// Default movement speed in pixels per second
    pub const DEFAULT_SPEED: f32 = 200.0;
    /// Speed clamp applied at movement time; effects may push the raw value
    /// outside this window
    pub const MIN_SPEED: f32 = 50.0;
    pub const MAX_SPEED: f32 = 300.0;
    /// Starting blast range in tiles per direction
    pub const DEFAULT_RANGE: u32 = 1;
    pub const MAX_RANGE: u32 = 8;
    /// Starting bomb fuse in seconds
    pub const DEFAULT_FUSE: f32 = 3.0;
    pub const MIN_FUSE: f32 = 2.0;
    pub const MAX_FUSE: f32 = 4.0;
    /// Bomb budget
    pub const DEFAULT_MAX_BOMBS: u32 = 1;
    pub const MAX_MAX_BOMBS: u32 = 6;
    /// Invincibility granted on join, in seconds
    pub const JOIN_PROTECTION: f32 = 10.0;
    /// Delay between a death notice and connection eviction, so the reason
    /// reaches the client before the disconnect
    pub const DEATH_GRACE: f32 = 2.0;
    /// Seconds without a ping before a session is treated as disconnected
    pub const SESSION_TIMEOUT_SECS: u64 = 5 * 60;
    /// Display name length cap
    pub const MAX_NAME_LEN: usize = 30;
}

/// Mob tuning
pub mod mob {
    /// Movement speed in pixels per second
    pub const SPEED: f32 = 60.0;
    /// Sight range in tiles per direction
    pub const SIGHT_RANGE: i32 = 8;
    /// Probability that a mob spawns with the hazard-aware trait
    pub const SMART_PROBABILITY: f64 = 0.3;
    /// Population cap as a fraction of total map cells
    pub const DENSITY: f32 = 0.002;
    /// Upper bound on the random respawn timer, in seconds
    pub const SPAWN_INTERVAL_MAX: f32 = 30.0;
    /// A spawner is skipped while another mob sits within this many tiles
    pub const SPAWN_CLEARANCE: i32 = 3;
    /// Contact-kill distance against players, in pixels
    pub const TOUCH_RANGE: f32 = 16.0;
    /// Node-depth bound for the flee-mode safe-cell search
    pub const FLEE_SEARCH_DEPTH: i32 = 3;
    /// Sentinel duration for flee mode - it persists until actually safe
    pub const FLEE_REMAINING: f32 = 99999.0;
    /// Spawner grid layout (SPAWNERS_X * SPAWNERS_Y spawners total)
    pub const SPAWNERS_X: i32 = 2;
    pub const SPAWNERS_Y: i32 = 2;
}

/// Bomb and explosion tuning
pub mod explosion {
    /// Total explosion lifetime in seconds
    pub const LIFETIME: f32 = 0.5;
    /// An explosion stops being lethal once remaining time drops below this
    pub const HARMLESS_BELOW: f32 = 0.3;
}

/// Drop probabilities when a destructible block is blown up.
/// Rolled as a single uniform sample; earlier bands win.
pub mod drops {
    /// r > 0.9 : bomb-capacity item (10%)
    pub const BOMB_ITEM_ABOVE: f64 = 0.9;
    /// r > 0.8 : range item (10%)
    pub const RANGE_ITEM_ABOVE: f64 = 0.8;
    /// r > 0.5 : mystery item (30%), otherwise nothing (50%)
    pub const MYSTERY_ITEM_ABOVE: f64 = 0.5;
}

/// Score awards
pub mod score {
    pub const PLAYER_KILL: i64 = 1000;
    pub const MOB_KILL: i64 = 500;
    /// Smart mobs are much harder to corner
    pub const SMART_MOB_KILL: i64 = 2000;
}

/// Networking constants
pub mod net {
    /// Maximum framed message size in bytes
    pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;
    /// Connection-to-loop input channel capacity
    pub const INPUT_CHANNEL_CAPACITY: usize = 1024;
    /// Client-side cap on unacknowledged buffered inputs
    pub const MAX_PENDING_INPUTS: usize = 30;
    /// Leaderboard entries broadcast to every client
    pub const LEADERBOARD_SIZE: usize = 10;
    /// Seconds between leaderboard recomputations
    pub const LEADERBOARD_INTERVAL: f32 = 1.0;
    /// Seconds between concurrency-watermark rollups
    pub const WATERMARK_INTERVAL: f32 = 300.0;
}
