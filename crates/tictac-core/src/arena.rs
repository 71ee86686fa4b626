//! The operation surface offered to transport layers.
//!
//! `Arena` ties the game registry, the stats registry and the update hub
//! together: every successful mutation is followed by a broadcast, and a
//! move that finishes a game is recorded in the stats exactly once.

use crate::game::{Game, GameError, GameSnapshot};
use crate::hub::{GameUpdate, Observer, UpdateHub, DEFAULT_OBSERVER_BUFFER};
use crate::registry::{GameRegistry, PendingPage, DEFAULT_SHARD_COUNT};
use crate::stats::{StatsRegistry, UserStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Sizing knobs for an `Arena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Shards per registry; rounded up to a power of two
    pub shard_count: usize,
    /// Pending updates each observer may buffer before drops start
    pub observer_buffer: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
        }
    }
}

/// All games, stats and observers of one server
#[derive(Debug)]
pub struct Arena {
    games: GameRegistry,
    stats: StatsRegistry,
    updates: UpdateHub,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            games: GameRegistry::new(config.shard_count),
            stats: StatsRegistry::new(config.shard_count),
            updates: UpdateHub::new(config.observer_buffer),
        }
    }

    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    pub fn updates(&self) -> &UpdateHub {
        &self.updates
    }

    /// Create and store a pending game under a caller-chosen id
    pub fn create_game(
        &self,
        id: &str,
        creator_id: &str,
        size: usize,
        win_length: usize,
    ) -> Result<GameSnapshot, GameError> {
        let game = self.games.create(Game::new(id, creator_id, size, win_length)?)?;
        info!(game_id = %id, creator = %creator_id, size, win_length, "Game created");
        Ok(game.snapshot())
    }

    pub fn join_game(&self, game_id: &str, joiner_id: &str) -> Result<GameSnapshot, GameError> {
        let snapshot = self.games.get(game_id)?.join(joiner_id)?;

        self.publish(&snapshot, "Game started! Player X's turn.");
        Ok(snapshot)
    }

    pub fn make_move(
        &self,
        game_id: &str,
        player_id: &str,
        row: usize,
        col: usize,
    ) -> Result<GameSnapshot, GameError> {
        let snapshot = self.games.get(game_id)?.make_move(player_id, row, col)?;

        // Only the move that ends a game can succeed into a terminal status
        if snapshot.status.is_finished() {
            self.stats.record_snapshot(&snapshot);
        }

        self.publish(&snapshot, snapshot.status_message());
        Ok(snapshot)
    }

    pub fn get_game(&self, game_id: &str) -> Result<GameSnapshot, GameError> {
        Ok(self.games.get(game_id)?.snapshot())
    }

    pub fn delete_game(&self, game_id: &str) -> Result<(), GameError> {
        self.games.delete(game_id)
    }

    pub fn list_pending_games(&self, limit: usize, offset: usize) -> PendingPage {
        self.games.list_pending(limit, offset)
    }

    pub fn user_stats(&self, user_id: &str) -> UserStats {
        self.stats.get(user_id)
    }

    /// Observe an existing game
    pub fn subscribe(&self, game_id: &str) -> Result<Observer, GameError> {
        self.games.get(game_id)?;
        Ok(self.updates.subscribe(game_id))
    }

    pub fn unsubscribe(&self, observer: &Observer) -> bool {
        self.updates.unsubscribe(observer.game_id(), observer.id())
    }

    fn publish(&self, snapshot: &GameSnapshot, message: impl Into<String>) {
        let update = GameUpdate::new(snapshot.clone(), message);
        self.updates.broadcast(&snapshot.id, &update);
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}
