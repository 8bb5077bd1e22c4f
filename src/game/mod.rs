//! Match Rules
//!
//! All rule code for one match. Pure and synchronous; the network layer
//! serializes calls into it.
//!
//! - `board`: the 10x10 grid, coordinates, ship-run geometry
//! - `state`: placement order, turn order, firing, win condition

pub mod board;
pub mod state;

// Re-export key types
pub use board::{Board, CellState, Coord, Orientation, BOARD_SIZE};
pub use state::{
    fleet_cell_total, FireError, MatchState, Phase, PlacementError, PlacementReport, ShotReport,
    Side, FLEET_SIZES,
};
