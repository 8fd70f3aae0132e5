//! Server counters and the concurrent-user watermark.
//!
//! The watermark tracks a decaying average of peak concurrent players: every
//! roll period the average moves halfway toward the peak observed since the
//! last roll, and the peak resets to the current player count. The averaged
//! figure is what the server reports to "get data" queries.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tick-time samples kept for percentile calculation
const TICK_HISTORY_LEN: usize = 1000;

#[derive(Debug)]
pub struct Metrics {
    // Player counts
    pub players_current: AtomicU64,
    users_peak: AtomicU64,
    users_average: AtomicU64,

    // Network stats
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,

    // Tick timing
    pub tick_count: AtomicU64,
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players_current: AtomicU64::new(0),
            users_peak: AtomicU64::new(0),
            users_average: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record the current player count, raising the peak if needed.
    pub fn set_player_count(&self, count: u64) {
        self.players_current.store(count, Ordering::Relaxed);
        self.users_peak.fetch_max(count, Ordering::Relaxed);
    }

    /// Record one tick's duration and refresh the p95 over recent samples.
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95 = sorted[sorted.len() * 95 / 100];
            self.tick_time_p95_us.store(p95, Ordering::Relaxed);
        }
    }

    /// Roll the watermark: average moves halfway toward the peak (rounded
    /// up), peak resets to the current count.
    pub fn update_watermark(&self) {
        let peak = self.users_peak.load(Ordering::Relaxed);
        let avg = self.users_average.load(Ordering::Relaxed);
        let next = (avg + peak + 1) / 2;
        self.users_average.store(next, Ordering::Relaxed);
        self.users_peak
            .store(self.players_current.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    pub fn users_average(&self) -> u64 {
        self.users_average.load(Ordering::Relaxed)
    }

    pub fn users_peak(&self) -> u64 {
        self.users_peak.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
