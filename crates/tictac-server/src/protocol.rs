//! WebSocket protocol messages for Tictac.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tictac_core::{GameError, GameSnapshot, GameStatus, Mark, UserStats};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a game and wait for an opponent. Sizes default to 3 when
    /// absent or zero.
    CreateGame {
        user_id: String,
        board_size: Option<i64>,
        win_length: Option<i64>,
    },

    /// Page through games waiting for an opponent
    ListPendingGames {
        limit: Option<i64>,
        offset: Option<i64>,
    },

    /// Join a pending game as O
    JoinGame { game_id: String, user_id: String },

    /// Place a mark
    MakeMove {
        game_id: String,
        user_id: String,
        row: i64,
        col: i64,
    },

    /// Fetch the current state of a game
    GetGame { game_id: String },

    /// Fetch win/loss/draw counts for a user
    GetUserStats { user_id: String },

    /// Stream updates for a game until it finishes
    WatchGame { game_id: String },

    /// Stop streaming updates for a game
    UnwatchGame { game_id: String },

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Sent once when the connection opens
    Welcome { connection_id: Uuid },

    GameCreated { game: GameView },

    PendingGames { games: Vec<GameView>, total_count: usize },

    GameJoined { game: GameView },

    MoveMade { game: GameView },

    /// Reply to `GetGame`
    GameState { game: GameView },

    UserStats { stats: StatsView },

    /// Pushed to watchers whenever a game changes
    GameUpdate { game: GameView, message: String },

    /// Watch stopped at the client's request
    Unwatched { game_id: String },

    /// A request failed
    Error { code: ErrorCode, message: String },

    /// Pong response
    Pong,
}

/// Wire representation of a game snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: String,
    pub player_x_id: String,
    pub player_o_id: Option<String>,
    pub board_size: usize,
    pub win_length: usize,
    /// One entry per row, top to bottom
    pub board: Vec<Vec<Mark>>,
    pub current_turn: Mark,
    pub status: GameStatus,
    /// Unix seconds
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&GameSnapshot> for GameView {
    fn from(snapshot: &GameSnapshot) -> Self {
        Self {
            game_id: snapshot.id.clone(),
            player_x_id: snapshot.player_x.clone(),
            player_o_id: snapshot.player_o.clone(),
            board_size: snapshot.grid.size(),
            win_length: snapshot.grid.win_length(),
            board: snapshot.grid.rows().map(<[Mark]>::to_vec).collect(),
            current_turn: snapshot.turn,
            status: snapshot.status,
            created_at: snapshot.created_at.timestamp(),
            updated_at: snapshot.updated_at.timestamp(),
        }
    }
}

/// Wire representation of a user's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsView {
    pub user_id: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total_games: u32,
}

impl From<&UserStats> for StatsView {
    fn from(stats: &UserStats) -> Self {
        Self {
            user_id: stats.user_id.clone(),
            wins: stats.wins,
            losses: stats.losses,
            draws: stats.draws,
            total_games: stats.total_games(),
        }
    }
}

/// Error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    PermissionDenied,
}

/// A rejected request, ready to be sent back as `ServerMessage::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl RequestError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }
}

impl From<GameError> for RequestError {
    fn from(err: GameError) -> Self {
        let (code, message) = match err {
            GameError::InvalidBoardSize | GameError::InvalidWinLength => {
                (ErrorCode::InvalidArgument, err.to_string())
            }
            GameError::InvalidPosition => (ErrorCode::InvalidArgument, "invalid position".into()),
            GameError::CellOccupied => {
                (ErrorCode::InvalidArgument, "cell is already occupied".into())
            }
            GameError::CannotJoinOwnGame => {
                (ErrorCode::InvalidArgument, "cannot join your own game".into())
            }
            GameError::GameNotFound => (ErrorCode::NotFound, "game not found".into()),
            GameError::GameAlreadyExists => (ErrorCode::AlreadyExists, "game already exists".into()),
            GameError::GameAlreadyStarted => {
                (ErrorCode::FailedPrecondition, "game has already started".into())
            }
            GameError::GameNotInProgress => {
                (ErrorCode::FailedPrecondition, "game is not in progress".into())
            }
            GameError::NotYourTurn => (ErrorCode::FailedPrecondition, "it's not your turn".into()),
            GameError::PlayerNotInGame => (
                ErrorCode::PermissionDenied,
                "you are not a player in this game".into(),
            ),
        };
        Self { code, message }
    }
}

impl From<RequestError> for ServerMessage {
    fn from(err: RequestError) -> Self {
        ServerMessage::Error {
            code: err.code,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tictac_core::Game;

    #[test]
    fn test_client_message_format() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"MakeMove","payload":{"game_id":"g1","user_id":"alice","row":1,"col":2}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::MakeMove { row: 1, col: 2, .. }
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"CreateGame","payload":{"user_id":"alice"}}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::CreateGame {
                board_size: None,
                win_length: None,
                ..
            }
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_game_view_from_snapshot() {
        let game = Game::new("g1", "alice", 4, 3).unwrap();
        game.join("bob").unwrap();
        let snapshot = game.make_move("alice", 1, 2).unwrap();

        let view = GameView::from(&snapshot);
        assert_eq!(view.game_id, "g1");
        assert_eq!(view.player_o_id.as_deref(), Some("bob"));
        assert_eq!(view.board_size, 4);
        assert_eq!(view.win_length, 3);
        assert_eq!(view.board.len(), 4);
        assert!(view.board.iter().all(|row| row.len() == 4));
        assert_eq!(view.board[1][2], Mark::X);
        assert_eq!(view.board[2][1], Mark::Empty);
        assert_eq!(view.current_turn, Mark::O);
        assert_eq!(view.status, GameStatus::InProgress);
    }

    #[test]
    fn test_error_serialization() {
        let msg = ServerMessage::from(RequestError::from(GameError::NotYourTurn));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "Error",
                "payload": {"code": "FAILED_PRECONDITION", "message": "it's not your turn"}
            })
        );
    }

    #[test]
    fn test_game_error_codes() {
        let code = |err| RequestError::from(err).code;

        assert_eq!(code(GameError::GameNotFound), ErrorCode::NotFound);
        assert_eq!(code(GameError::PlayerNotInGame), ErrorCode::PermissionDenied);
        assert_eq!(code(GameError::CellOccupied), ErrorCode::InvalidArgument);
        assert_eq!(code(GameError::GameAlreadyStarted), ErrorCode::FailedPrecondition);
        assert_eq!(code(GameError::GameAlreadyExists), ErrorCode::AlreadyExists);
    }
}
