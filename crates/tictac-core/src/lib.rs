//! Tictac - an in-memory engine for many concurrent grid games
//!
//! This crate provides the core game logic, including:
//! - An NxN grid with a configurable win length
//! - A per-game state machine enforcing turn order and move legality
//! - Sharded concurrent registries for games and per-user statistics
//! - A per-game fan-out of state updates to live observers
//!
//! # Architecture
//!
//! Nothing here performs I/O. A transport layer owns an [`Arena`], generates
//! game ids, and translates requests into arena calls. All values handed
//! back are snapshots, so games keep changing without invalidating them.
//!
//! # Modules
//!
//! - [`grid`]: Cell marks and the board matrix
//! - [`game`]: Game state machine, snapshots and errors
//! - [`registry`]: Sharded game store
//! - [`stats`]: Sharded win/loss/draw counters
//! - [`hub`]: Observer fan-out
//! - [`arena`]: The operation surface tying everything together

pub mod arena;
pub mod game;
pub mod grid;
pub mod hub;
pub mod registry;
pub mod stats;

// Re-export commonly used types
pub use arena::{Arena, ArenaConfig};
pub use game::{Game, GameError, GameSnapshot, GameStatus};
pub use grid::{Grid, Mark};
pub use hub::{GameUpdate, Observer, ObserverId, UpdateHub};
pub use registry::{GameRegistry, PendingPage};
pub use stats::{StatsRegistry, UserStats};
