//! Sharded concurrent store of live games.
//!
//! Games are kept in a `DashMap` with a fixed shard count. Every shard is an
//! independently locked map, and a game id always hashes to the same shard,
//! so traffic on one game only contends with games that share its shard.

use crate::game::{Game, GameError, GameSnapshot, GameStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Shard count used when none is configured
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// DashMap requires a power of two greater than one
pub(crate) fn normalize_shard_count(shard_count: usize) -> usize {
    shard_count.max(2).next_power_of_two()
}

/// One page of pending games
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPage {
    pub games: Vec<GameSnapshot>,
    /// Number of pending games before pagination was applied
    pub total: usize,
}

/// Concurrent registry of games keyed by id
#[derive(Debug)]
pub struct GameRegistry {
    games: DashMap<String, Arc<Game>>,
}

impl GameRegistry {
    pub fn new(shard_count: usize) -> Self {
        Self {
            games: DashMap::with_shard_amount(normalize_shard_count(shard_count)),
        }
    }

    /// Store a new game.
    ///
    /// The existence check and the insert happen under a single shard write
    /// lock, so two racing creates with the same id cannot both succeed.
    pub fn create(&self, game: Game) -> Result<Arc<Game>, GameError> {
        match self.games.entry(game.id().to_string()) {
            Entry::Occupied(_) => Err(GameError::GameAlreadyExists),
            Entry::Vacant(entry) => {
                let game = Arc::new(game);
                entry.insert(Arc::clone(&game));
                debug!(game_id = %game.id(), "Game registered");
                Ok(game)
            }
        }
    }

    /// The live game with this id
    pub fn get(&self, id: &str) -> Result<Arc<Game>, GameError> {
        self.games
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GameError::GameNotFound)
    }

    pub fn delete(&self, id: &str) -> Result<(), GameError> {
        match self.games.remove(id) {
            Some(_) => {
                debug!(game_id = %id, "Game removed");
                Ok(())
            }
            None => Err(GameError::GameNotFound),
        }
    }

    /// Page through games that are still waiting for an opponent.
    ///
    /// Every shard is scanned, so the cost is linear in the number of stored
    /// games. Results are ordered by creation time, then id. A `limit` of 0
    /// means no limit. The shards are not locked together: under concurrent
    /// creates and joins, `total` and the page can disagree slightly.
    pub fn list_pending(&self, limit: usize, offset: usize) -> PendingPage {
        // Collect handles first so no shard lock is held while snapshotting
        let candidates: Vec<Arc<Game>> = self
            .games
            .iter()
            .filter(|entry| entry.value().status() == GameStatus::Pending)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut pending: Vec<GameSnapshot> = candidates
            .iter()
            .map(|game| game.snapshot())
            .filter(|snapshot| snapshot.status == GameStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = pending.len();
        let limit = if limit == 0 { usize::MAX } else { limit };
        let games = pending.into_iter().skip(offset).take(limit).collect();

        PendingPage { games, total }
    }

    /// Total number of stored games
    pub fn count(&self) -> usize {
        self.games.len()
    }

    /// Drop every game that reached a terminal status.
    ///
    /// Returns how many games were removed.
    pub fn remove_finished(&self) -> usize {
        let mut removed = 0;
        self.games.retain(|_, game| {
            let keep = !game.status().is_finished();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}
