//! Per-user win/loss/draw bookkeeping.
//!
//! Uses the same sharded layout as the game registry. The shard lock is only
//! held long enough to find (or lazily create) a user's counters; the
//! increments themselves are lock-free atomics.

use crate::game::GameSnapshot;
use crate::registry::{normalize_shard_count, DEFAULT_SHARD_COUNT};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Copy of a user's counters at one instant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl UserStats {
    pub fn total_games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}

/// Live counters for one user
#[derive(Debug, Default)]
struct StatsCounters {
    wins: AtomicU32,
    losses: AtomicU32,
    draws: AtomicU32,
}

/// Concurrent registry of user statistics
#[derive(Debug)]
pub struct StatsRegistry {
    users: DashMap<String, Arc<StatsCounters>>,
}

impl StatsRegistry {
    pub fn new(shard_count: usize) -> Self {
        Self {
            users: DashMap::with_shard_amount(normalize_shard_count(shard_count)),
        }
    }

    /// Counters for `user_id`; unknown users read as all zeros
    pub fn get(&self, user_id: &str) -> UserStats {
        let counters = self.counters(user_id);
        UserStats {
            user_id: user_id.to_string(),
            wins: counters.wins.load(Ordering::Relaxed),
            losses: counters.losses.load(Ordering::Relaxed),
            draws: counters.draws.load(Ordering::Relaxed),
        }
    }

    pub fn record_win(&self, user_id: &str) {
        self.counters(user_id).wins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loss(&self, user_id: &str) {
        self.counters(user_id).losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_draw(&self, user_id: &str) {
        self.counters(user_id).draws.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one game for both sides.
    ///
    /// Empty ids are skipped. On a draw both ids get a draw.
    pub fn record_game_result(&self, winner_id: &str, loser_id: &str, is_draw: bool) {
        if is_draw {
            if !winner_id.is_empty() {
                self.record_draw(winner_id);
            }
            if !loser_id.is_empty() {
                self.record_draw(loser_id);
            }
        } else {
            if !winner_id.is_empty() {
                self.record_win(winner_id);
            }
            if !loser_id.is_empty() {
                self.record_loss(loser_id);
            }
        }
    }

    /// Record the outcome of a finished game. Unfinished games are ignored.
    pub fn record_snapshot(&self, snapshot: &GameSnapshot) {
        if !snapshot.status.is_finished() {
            return;
        }

        let player_o = snapshot.player_o.as_deref().unwrap_or_default();
        if snapshot.is_draw() {
            self.record_game_result(&snapshot.player_x, player_o, true);
        } else {
            self.record_game_result(
                snapshot.winner().unwrap_or_default(),
                snapshot.loser().unwrap_or_default(),
                false,
            );
        }
        debug!(game_id = %snapshot.id, status = %snapshot.status, "Recorded game result");
    }

    /// Number of users with a stats record
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn counters(&self, user_id: &str) -> Arc<StatsCounters> {
        if let Some(counters) = self.users.get(user_id) {
            return Arc::clone(counters.value());
        }
        // The entry guard is dropped before the caller touches the atomics
        let entry = self.users.entry(user_id.to_string()).or_default();
        Arc::clone(entry.value())
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}
