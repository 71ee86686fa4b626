//! WebSocket server and connection handling.

use crate::protocol::{
    ClientMessage, ErrorCode, GameView, RequestError, ServerMessage, StatsView,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tictac_core::{Arena, ArenaConfig, GameError, Observer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_BOARD_SIZE: usize = 3;
pub const DEFAULT_WIN_LENGTH: usize = 3;
pub const MIN_BOARD_SIZE: usize = 3;
pub const MAX_BOARD_SIZE: usize = 20;
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 100;

/// Server state shared across all connections.
pub struct ServerState {
    pub arena: Arena,
}

impl ServerState {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            arena: Arena::new(config),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

/// Per-connection bookkeeping.
struct Connection {
    id: Uuid,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
    /// Cancels the forwarding task of each watched game when fired or dropped
    watches: HashMap<String, oneshot::Sender<()>>,
}

impl Connection {
    fn new(id: Uuid, outgoing: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            outgoing,
            watches: HashMap::new(),
        }
    }

    fn send(&self, msg: ServerMessage) {
        let _ = self.outgoing.send(msg);
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Tictac server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut connection = Connection::new(connection_id, tx);

    // Send welcome message
    let welcome = ServerMessage::Welcome { connection_id };
    let msg_text = serde_json::to_string(&welcome)?;
    ws_sender.send(Message::Text(msg_text)).await?;

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(&mut connection, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, text);
                    connection.send(RequestError::invalid_argument(e.to_string()).into());
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // Dropping the connection cancels every watch it still owns
    drop(connection);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Handle a client message.
fn handle_message(connection: &mut Connection, msg: ClientMessage, state: &Arc<ServerState>) {
    let reply = match msg {
        ClientMessage::WatchGame { game_id } => {
            watch_game(connection, game_id, state).err().map(ServerMessage::from)
        }
        ClientMessage::UnwatchGame { game_id } => Some(unwatch_game(connection, game_id)),
        other => Some(handle_request(other, &state.arena).unwrap_or_else(ServerMessage::from)),
    };

    if let Some(reply) = reply {
        connection.send(reply);
    }
}

/// Answer a request that needs no per-connection state.
fn handle_request(msg: ClientMessage, arena: &Arena) -> Result<ServerMessage, RequestError> {
    match msg {
        ClientMessage::CreateGame {
            user_id,
            board_size,
            win_length,
        } => {
            require("user_id", &user_id)?;

            let board_size = match board_size {
                None | Some(0) => DEFAULT_BOARD_SIZE,
                Some(size) => bounded(size, MIN_BOARD_SIZE, MAX_BOARD_SIZE).ok_or_else(|| {
                    RequestError::invalid_argument(format!(
                        "board_size must be between {MIN_BOARD_SIZE} and {MAX_BOARD_SIZE}"
                    ))
                })?,
            };
            let win_length = match win_length {
                None | Some(0) => DEFAULT_WIN_LENGTH,
                Some(length) => bounded(length, MIN_BOARD_SIZE, board_size).ok_or_else(|| {
                    RequestError::invalid_argument(format!(
                        "win_length must be between {MIN_BOARD_SIZE} and board_size ({board_size})"
                    ))
                })?,
            };

            let game_id = Uuid::new_v4().to_string();
            let snapshot = arena.create_game(&game_id, &user_id, board_size, win_length)?;
            Ok(ServerMessage::GameCreated {
                game: GameView::from(&snapshot),
            })
        }

        ClientMessage::ListPendingGames { limit, offset } => {
            let limit = match limit {
                Some(limit) if limit > 0 => (limit as u64).min(MAX_LIST_LIMIT as u64) as usize,
                _ => DEFAULT_LIST_LIMIT,
            };
            let offset = offset
                .and_then(|offset| usize::try_from(offset).ok())
                .unwrap_or(0);

            let page = arena.list_pending_games(limit, offset);
            Ok(ServerMessage::PendingGames {
                games: page.games.iter().map(GameView::from).collect(),
                total_count: page.total,
            })
        }

        ClientMessage::JoinGame { game_id, user_id } => {
            require("user_id", &user_id)?;
            require("game_id", &game_id)?;

            let snapshot = arena.join_game(&game_id, &user_id)?;
            Ok(ServerMessage::GameJoined {
                game: GameView::from(&snapshot),
            })
        }

        ClientMessage::MakeMove {
            game_id,
            user_id,
            row,
            col,
        } => {
            require("user_id", &user_id)?;
            require("game_id", &game_id)?;

            let row = usize::try_from(row).map_err(|_| GameError::InvalidPosition)?;
            let col = usize::try_from(col).map_err(|_| GameError::InvalidPosition)?;
            let snapshot = arena.make_move(&game_id, &user_id, row, col)?;
            Ok(ServerMessage::MoveMade {
                game: GameView::from(&snapshot),
            })
        }

        ClientMessage::GetGame { game_id } => {
            require("game_id", &game_id)?;

            let snapshot = arena.get_game(&game_id)?;
            Ok(ServerMessage::GameState {
                game: GameView::from(&snapshot),
            })
        }

        ClientMessage::GetUserStats { user_id } => {
            require("user_id", &user_id)?;

            Ok(ServerMessage::UserStats {
                stats: StatsView::from(&arena.user_stats(&user_id)),
            })
        }

        ClientMessage::Ping => Ok(ServerMessage::Pong),

        ClientMessage::WatchGame { .. } | ClientMessage::UnwatchGame { .. } => Err(
            RequestError::invalid_argument("watching requires a live connection"),
        ),
    }
}

/// Start streaming updates of `game_id` to this connection.
fn watch_game(
    connection: &mut Connection,
    game_id: String,
    state: &Arc<ServerState>,
) -> Result<(), RequestError> {
    require("game_id", &game_id)?;

    let observer = state.arena.subscribe(&game_id)?;
    let initial = match state.arena.get_game(&game_id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            state.arena.unsubscribe(&observer);
            return Err(e.into());
        }
    };

    connection.send(ServerMessage::GameUpdate {
        game: GameView::from(&initial),
        message: "Connected to game".to_string(),
    });

    // A finished game has nothing more to stream
    if initial.status.is_finished() {
        state.arena.unsubscribe(&observer);
        return Ok(());
    }

    // Drop watches whose forwarding task already ended with its game
    connection.watches.retain(|_, cancel| !cancel.is_closed());

    let (cancel_tx, cancel_rx) = oneshot::channel();
    if let Some(previous) = connection.watches.insert(game_id.clone(), cancel_tx) {
        let _ = previous.send(());
    }

    debug!(connection_id = %connection.id, game_id = %game_id, "Watching game");
    tokio::spawn(forward_updates(
        observer,
        cancel_rx,
        connection.outgoing.clone(),
        Arc::clone(state),
    ));
    Ok(())
}

fn unwatch_game(connection: &mut Connection, game_id: String) -> ServerMessage {
    match connection.watches.remove(&game_id) {
        Some(cancel) if !cancel.is_closed() => {
            let _ = cancel.send(());
            ServerMessage::Unwatched { game_id }
        }
        _ => RequestError::new(
            ErrorCode::FailedPrecondition,
            format!("not watching game {game_id}"),
        )
        .into(),
    }
}

/// Relay fan-out updates to a connection until the game finishes, the
/// watch is cancelled, or the connection goes away. Always unsubscribes.
///
/// The outgoing channel is unbounded, so a client that stops reading does
/// not push this task into the observer's drop-on-full policy. The backlog
/// one watch can add is still bounded: a game emits at most one update per
/// cell plus the join, and the task ends with the final update.
async fn forward_updates(
    mut observer: Observer,
    mut cancel: oneshot::Receiver<()>,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
    state: Arc<ServerState>,
) {
    loop {
        tokio::select! {
            update = observer.recv() => {
                let Some(update) = update else { break };
                let is_final = update.is_final();
                let msg = ServerMessage::GameUpdate {
                    game: GameView::from(&update.game),
                    message: update.message,
                };
                if outgoing.send(msg).is_err() || is_final {
                    break;
                }
            }
            _ = &mut cancel => break,
        }
    }

    state.arena.unsubscribe(&observer);
    debug!(game_id = %observer.game_id(), "Watch ended");
}

fn require(field: &str, value: &str) -> Result<(), RequestError> {
    if value.is_empty() {
        return Err(RequestError::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

/// `value` as a usize if it lies within `[min, max]`
fn bounded(value: i64, min: usize, max: usize) -> Option<usize> {
    usize::try_from(value)
        .ok()
        .filter(|value| (min..=max).contains(value))
}
