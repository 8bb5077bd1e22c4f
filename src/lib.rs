//! # Battleship Match Server
//!
//! Server-authoritative, turn-based naval combat for two remote players over
//! persistent TCP connections, one UTF-8 line per message.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   BATTLESHIP SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Match rules (pure, synchronous)           │
//! │  ├── board.rs    - 10x10 grid, coordinates, ship runs        │
//! │  └── state.rs    - Placement/battle state machine            │
//! │                                                              │
//! │  network/        - Networking (tokio)                        │
//! │  ├── server.rs   - TCP accept loop, command dispatch         │
//! │  ├── protocol.rs - Line-protocol commands and replies        │
//! │  ├── registry.rs - Online-player registry                    │
//! │  ├── session.rs  - Per-match session (two participants)      │
//! │  └── auth.rs     - Flat-file credential store                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All rule decisions live in `game/`; the network layer only parses lines,
//! routes commands, and writes replies. Both participants' connection tasks
//! call into one shared [`network::session::MatchSession`] behind a mutex, so
//! placement and firing never interleave on the shared boards.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, CellState, Coord, Orientation, BOARD_SIZE};
pub use game::state::{MatchState, Phase, Side, FLEET_SIZES};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
