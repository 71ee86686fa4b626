//! Per-game state machine.
//!
//! A `Game` moves `Pending -> InProgress -> {XWon | OWon | Draw}` and never
//! leaves a terminal status. `join` and `make_move` are the only mutators;
//! everything else reads through an immutable `GameSnapshot`.

use crate::grid::{Grid, Mark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by the game engine.
///
/// Every variant is a caller-correctable rule violation; none of them leaves
/// a game or registry in a partially updated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("invalid board size: must be between 3 and 1024")]
    InvalidBoardSize,

    #[error("invalid win length: must be at least 3 and at most board size")]
    InvalidWinLength,

    #[error("invalid position: out of bounds")]
    InvalidPosition,

    #[error("cell is already occupied")]
    CellOccupied,

    #[error("game is not in progress")]
    GameNotInProgress,

    #[error("not your turn")]
    NotYourTurn,

    #[error("player is not part of this game")]
    PlayerNotInGame,

    #[error("game has already started")]
    GameAlreadyStarted,

    #[error("cannot join your own game")]
    CannotJoinOwnGame,

    #[error("game not found")]
    GameNotFound,

    #[error("game already exists")]
    GameAlreadyExists,
}

/// Lifecycle status of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Waiting for a second player
    Pending,
    InProgress,
    XWon,
    OWon,
    Draw,
}

impl GameStatus {
    /// True for the terminal statuses
    pub fn is_finished(self) -> bool {
        matches!(self, GameStatus::XWon | GameStatus::OWon | GameStatus::Draw)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Pending => "PENDING",
            GameStatus::InProgress => "IN_PROGRESS",
            GameStatus::XWon => "X_WON",
            GameStatus::OWon => "O_WON",
            GameStatus::Draw => "DRAW",
        };
        f.write_str(s)
    }
}

/// Mutable part of a game, only reachable through the game's lock
#[derive(Debug)]
struct GameState {
    player_o: Option<String>,
    grid: Grid,
    turn: Mark,
    status: GameStatus,
    updated_at: DateTime<Utc>,
}

/// A single game between two players.
///
/// The identity, creator and creation time never change and live outside
/// the lock. Everything else is guarded by a private `RwLock`, so two
/// concurrent moves on the same game are fully serialized.
#[derive(Debug)]
pub struct Game {
    id: String,
    player_x: String,
    created_at: DateTime<Utc>,
    state: RwLock<GameState>,
}

impl Game {
    /// Create a pending game. The creator plays X, and X moves first.
    pub fn new(
        id: impl Into<String>,
        creator_id: impl Into<String>,
        size: usize,
        win_length: usize,
    ) -> Result<Self, GameError> {
        let grid = Grid::new(size, win_length)?;
        let now = Utc::now();

        Ok(Self {
            id: id.into(),
            player_x: creator_id.into(),
            created_at: now,
            state: RwLock::new(GameState {
                player_o: None,
                grid,
                turn: Mark::X,
                status: GameStatus::Pending,
                updated_at: now,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn player_x(&self) -> &str {
        &self.player_x
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current status
    pub fn status(&self) -> GameStatus {
        self.read().status
    }

    /// Mark played by `player_id`, or Empty if they are not in this game
    pub fn player_mark(&self, player_id: &str) -> Mark {
        self.mark_for(&self.read(), player_id)
    }

    /// Seat the second player and start the game.
    ///
    /// Returns the snapshot taken right after the join.
    pub fn join(&self, player_id: &str) -> Result<GameSnapshot, GameError> {
        let mut state = self.write();

        if state.status != GameStatus::Pending {
            return Err(GameError::GameAlreadyStarted);
        }
        if player_id == self.player_x {
            return Err(GameError::CannotJoinOwnGame);
        }

        state.player_o = Some(player_id.to_string());
        state.status = GameStatus::InProgress;
        state.updated_at = Utc::now();

        info!(game_id = %self.id, player_o = %player_id, "Game started");
        Ok(self.snapshot_of(&state))
    }

    /// Place the mover's mark at `(row, col)`.
    ///
    /// Returns the snapshot taken right after the move.
    pub fn make_move(
        &self,
        player_id: &str,
        row: usize,
        col: usize,
    ) -> Result<GameSnapshot, GameError> {
        let mut state = self.write();

        if state.status != GameStatus::InProgress {
            return Err(GameError::GameNotInProgress);
        }

        let mark = self.mark_for(&state, player_id);
        if mark.is_empty() {
            return Err(GameError::PlayerNotInGame);
        }
        if mark != state.turn {
            return Err(GameError::NotYourTurn);
        }

        state.grid.set(row, col, mark)?;
        state.updated_at = Utc::now();

        let winner = state.grid.check_winner(row, col);
        match winner {
            Mark::X => state.status = GameStatus::XWon,
            Mark::O => state.status = GameStatus::OWon,
            Mark::Empty if state.grid.is_full() => state.status = GameStatus::Draw,
            Mark::Empty => state.turn = state.turn.opponent(),
        }

        if state.status.is_finished() {
            info!(game_id = %self.id, status = %state.status, "Game finished");
        } else {
            debug!(game_id = %self.id, %mark, row, col, "Move applied");
        }

        Ok(self.snapshot_of(&state))
    }

    /// Point-in-time copy of the game
    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot_of(&self.read())
    }

    fn snapshot_of(&self, state: &GameState) -> GameSnapshot {
        GameSnapshot {
            id: self.id.clone(),
            player_x: self.player_x.clone(),
            player_o: state.player_o.clone(),
            grid: state.grid.clone(),
            turn: state.turn,
            status: state.status,
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }

    fn mark_for(&self, state: &GameState, player_id: &str) -> Mark {
        if player_id == self.player_x {
            Mark::X
        } else if state.player_o.as_deref() == Some(player_id) {
            Mark::O
        } else {
            Mark::Empty
        }
    }

    // Critical sections never leave a half-applied move behind, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, GameState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GameState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable copy of a game's observable state at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: String,
    pub player_x: String,
    pub player_o: Option<String>,
    pub grid: Grid,
    /// Whose move is next; meaningless unless the game is in progress
    pub turn: Mark,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameSnapshot {
    /// Winning player's id, if the game was won
    pub fn winner(&self) -> Option<&str> {
        match self.status {
            GameStatus::XWon => Some(&self.player_x),
            GameStatus::OWon => self.player_o.as_deref(),
            _ => None,
        }
    }

    /// Losing player's id, if the game was won
    pub fn loser(&self) -> Option<&str> {
        match self.status {
            GameStatus::XWon => self.player_o.as_deref(),
            GameStatus::OWon => Some(&self.player_x),
            _ => None,
        }
    }

    pub fn is_draw(&self) -> bool {
        self.status == GameStatus::Draw
    }

    /// Short human-readable description of the current state
    pub fn status_message(&self) -> String {
        match self.status {
            GameStatus::Pending => "Waiting for opponent".to_string(),
            GameStatus::InProgress => format!("Player {}'s turn", self.turn),
            GameStatus::XWon => "Player X wins!".to_string(),
            GameStatus::OWon => "Player O wins!".to_string(),
            GameStatus::Draw => "Game ended in a draw!".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_game() -> Game {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        game.join("bob").unwrap();
        game
    }

    /// Alternate moves starting with X; X and O lists may differ by one.
    fn play(game: &Game, x_moves: &[(usize, usize)], o_moves: &[(usize, usize)]) -> GameSnapshot {
        let mut snapshot = game.snapshot();
        for i in 0..x_moves.len().max(o_moves.len()) {
            if let Some(&(row, col)) = x_moves.get(i) {
                snapshot = game.make_move("alice", row, col).unwrap();
            }
            if let Some(&(row, col)) = o_moves.get(i) {
                snapshot = game.make_move("bob", row, col).unwrap();
            }
        }
        snapshot
    }

    #[test]
    fn test_new_game_is_pending() {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        let snapshot = game.snapshot();

        assert_eq!(snapshot.status, GameStatus::Pending);
        assert_eq!(snapshot.turn, Mark::X);
        assert_eq!(snapshot.player_x, "alice");
        assert_eq!(snapshot.player_o, None);
        assert_eq!(snapshot.created_at, snapshot.updated_at);
    }

    #[test]
    fn test_new_game_propagates_grid_errors() {
        assert_eq!(
            Game::new("g1", "alice", 2, 3).unwrap_err(),
            GameError::InvalidBoardSize
        );
        assert_eq!(
            Game::new("g1", "alice", 3, 4).unwrap_err(),
            GameError::InvalidWinLength
        );
    }

    #[test]
    fn test_join() {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        let snapshot = game.join("bob").unwrap();

        assert_eq!(snapshot.status, GameStatus::InProgress);
        assert_eq!(snapshot.player_o.as_deref(), Some("bob"));
        assert_eq!(game.player_mark("bob"), Mark::O);
        assert_eq!(game.player_mark("alice"), Mark::X);
        assert_eq!(game.player_mark("carol"), Mark::Empty);
    }

    #[test]
    fn test_cannot_join_own_game() {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        assert_eq!(game.join("alice"), Err(GameError::CannotJoinOwnGame));
        assert_eq!(game.status(), GameStatus::Pending);
    }

    #[test]
    fn test_join_is_single_use() {
        let game = started_game();
        assert_eq!(game.join("carol"), Err(GameError::GameAlreadyStarted));
        assert_eq!(game.snapshot().player_o.as_deref(), Some("bob"));
    }

    #[test]
    fn test_move_before_join_fails() {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        assert_eq!(
            game.make_move("alice", 0, 0),
            Err(GameError::GameNotInProgress)
        );
    }

    #[test]
    fn test_move_validation() {
        let game = started_game();

        assert_eq!(game.make_move("carol", 0, 0), Err(GameError::PlayerNotInGame));
        assert_eq!(game.make_move("bob", 0, 0), Err(GameError::NotYourTurn));
        assert_eq!(game.make_move("alice", 3, 0), Err(GameError::InvalidPosition));

        game.make_move("alice", 0, 0).unwrap();
        assert_eq!(game.make_move("bob", 0, 0), Err(GameError::CellOccupied));

        // Failed moves leave the turn untouched
        assert_eq!(game.snapshot().turn, Mark::O);
    }

    #[test]
    fn test_turn_alternates() {
        let game = started_game();
        let moves = [(0, 0), (1, 1), (2, 2), (0, 1)];

        for (i, &(row, col)) in moves.iter().enumerate() {
            let (player, mark) = if i % 2 == 0 {
                ("alice", Mark::X)
            } else {
                ("bob", Mark::O)
            };
            let snapshot = game.make_move(player, row, col).unwrap();
            assert_eq!(snapshot.turn, mark.opponent());
            assert_eq!(snapshot.status, GameStatus::InProgress);
        }
    }

    #[test]
    fn test_x_wins_top_row() {
        let game = started_game();
        let snapshot = play(&game, &[(0, 0), (0, 1), (0, 2)], &[(1, 0), (1, 1)]);

        assert_eq!(snapshot.status, GameStatus::XWon);
        assert_eq!(snapshot.winner(), Some("alice"));
        assert_eq!(snapshot.loser(), Some("bob"));
        assert!(!snapshot.is_draw());
        assert_eq!(snapshot.status_message(), "Player X wins!");
        // The winning mover's turn is left in place
        assert_eq!(snapshot.turn, Mark::X);
    }

    #[test]
    fn test_o_wins() {
        let game = started_game();
        let snapshot = play(&game, &[(0, 0), (0, 1), (2, 2)], &[(1, 0), (1, 1), (1, 2)]);

        assert_eq!(snapshot.status, GameStatus::OWon);
        assert_eq!(snapshot.winner(), Some("bob"));
        assert_eq!(snapshot.loser(), Some("alice"));
    }

    #[test]
    fn test_draw() {
        let game = started_game();
        let snapshot = play(
            &game,
            &[(0, 0), (0, 2), (1, 0), (1, 1), (2, 1)],
            &[(0, 1), (1, 2), (2, 0), (2, 2)],
        );

        assert_eq!(snapshot.status, GameStatus::Draw);
        assert!(snapshot.is_draw());
        assert_eq!(snapshot.winner(), None);
        assert_eq!(snapshot.loser(), None);
        assert!(snapshot.grid.is_full());
    }

    #[test]
    fn test_no_moves_after_finish() {
        let game = started_game();
        play(&game, &[(0, 0), (0, 1), (0, 2)], &[(1, 0), (1, 1)]);

        assert_eq!(game.make_move("bob", 2, 2), Err(GameError::GameNotInProgress));
        assert_eq!(game.make_move("alice", 2, 2), Err(GameError::GameNotInProgress));
        assert_eq!(game.join("carol"), Err(GameError::GameAlreadyStarted));
        assert_eq!(game.status(), GameStatus::XWon);
    }

    #[test]
    fn test_snapshot_does_not_alias_game() {
        let game = started_game();
        let before = game.snapshot();

        game.make_move("alice", 1, 1).unwrap();

        assert_eq!(before.grid.get(1, 1), Ok(Mark::Empty));
        assert_eq!(before.turn, Mark::X);
        assert_eq!(game.snapshot().grid.get(1, 1), Ok(Mark::X));
    }

    #[test]
    fn test_status_messages() {
        let game = Game::new("g1", "alice", 3, 3).unwrap();
        assert_eq!(game.snapshot().status_message(), "Waiting for opponent");

        game.join("bob").unwrap();
        assert_eq!(game.snapshot().status_message(), "Player X's turn");

        game.make_move("alice", 0, 0).unwrap();
        assert_eq!(game.snapshot().status_message(), "Player O's turn");
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(GameStatus::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(
            serde_json::to_string(&GameStatus::XWon).unwrap(),
            "\"X_WON\""
        );
        assert!(GameStatus::Draw.is_finished());
        assert!(!GameStatus::Pending.is_finished());
    }
}
