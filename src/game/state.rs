//! Match State Machine
//!
//! Placement, turn order, firing, and the win condition for one match
//! between exactly two sides. Pure and synchronous: callers feed validated
//! coordinates in and get typed outcomes back, and the `Display` text of the
//! rejection enums is exactly the wire `ERROR:<reason>` payload.

use thiserror::Error;

use crate::game::board::{Board, CellState, Coord, Orientation};

/// Ship sizes in forced placement order. The next ship to place is implied by
/// how many the side has already placed.
pub const FLEET_SIZES: [u8; 5] = [5, 4, 3, 2, 1];

/// Total ship cells in one fleet. A side loses once it has taken this many
/// hits. Always derived from [`FLEET_SIZES`], never a free-standing constant.
pub fn fleet_cell_total() -> u32 {
    FLEET_SIZES.iter().map(|&s| u32::from(s)).sum()
}

/// One of the two sides bound to a match. `One` is the challenger and moves
/// first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// The challenger.
    One,
    /// The accepter.
    Two,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }
}

/// Match lifecycle. Strictly `Placement -> Battle -> Finished`, never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Sides are placing their fleets.
    Placement,
    /// Both fleets placed; sides alternate firing.
    Battle,
    /// A side has lost its whole fleet. Nothing further is accepted.
    Finished,
}

/// Rejected placement. `Display` is the wire error payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// The side has already placed its whole fleet.
    #[error("All ships placed")]
    AllShipsPlaced,
    /// The run would extend past the edge of the grid.
    #[error("Ship sticks out ({0})")]
    Overboard(Orientation),
    /// A covered cell already holds a ship segment.
    #[error("Overlap detected")]
    Overlap,
}

/// Rejected shot. `Display` is the wire error payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FireError {
    /// The match is not in the battle phase.
    #[error("Game not started")]
    NotStarted,
    /// It is the other side's move.
    #[error("Wait for turn")]
    OutOfTurn,
    /// The target cell was fired upon earlier in the match.
    #[error("Already fired there")]
    AlreadyFired,
}

/// Outcome of an accepted placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementReport {
    /// Size of the ship that was just placed.
    pub size: u8,
    /// True when this placement completed both fleets and battle began.
    pub battle_started: bool,
}

/// Outcome of an accepted shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShotReport {
    /// The cell that was fired upon.
    pub target: Coord,
    /// True when a ship segment was struck.
    pub hit: bool,
    /// True when this shot destroyed the defender's last fleet cell.
    pub winning: bool,
}

/// All mutable state of one match: two boards, two placement counters, two
/// hits-taken counters, and the turn flag.
///
/// Not internally synchronized; the owning session serializes access.
#[derive(Clone, Debug)]
pub struct MatchState {
    boards: [Board; 2],
    placed: [usize; 2],
    hits_taken: [u32; 2],
    turn: Side,
    phase: Phase,
}

impl MatchState {
    /// Fresh match in the placement phase, challenger to move first.
    pub fn new() -> Self {
        Self {
            boards: [Board::new(), Board::new()],
            placed: [0, 0],
            hits_taken: [0, 0],
            turn: Side::One,
            phase: Phase::Placement,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Side whose move it is.
    pub fn turn(&self) -> Side {
        self.turn
    }

    /// Ships the side has placed so far.
    pub fn ships_placed(&self, side: Side) -> usize {
        self.placed[side.index()]
    }

    /// Hits the side's fleet has taken so far.
    pub fn hits_taken(&self, side: Side) -> u32 {
        self.hits_taken[side.index()]
    }

    /// The side's own board.
    pub fn board(&self, side: Side) -> &Board {
        &self.boards[side.index()]
    }

    /// Place the side's next ship with its bow at `bow`, extending `heading`.
    ///
    /// The ship's size is implied by the side's placement counter. When the
    /// tenth ship lands, the match transitions to [`Phase::Battle`].
    pub fn place_ship(
        &mut self,
        side: Side,
        bow: Coord,
        heading: Orientation,
    ) -> Result<PlacementReport, PlacementError> {
        let next = self.placed[side.index()];
        if next >= FLEET_SIZES.len() {
            return Err(PlacementError::AllShipsPlaced);
        }
        let size = FLEET_SIZES[next];

        let cells = Board::run(bow, heading, size).ok_or(PlacementError::Overboard(heading))?;
        let board = &mut self.boards[side.index()];
        if board.overlaps(&cells) {
            return Err(PlacementError::Overlap);
        }

        for cell in cells {
            board.mark(cell, CellState::Ship);
        }
        self.placed[side.index()] += 1;

        let battle_started = self.placed == [FLEET_SIZES.len(); 2];
        if battle_started {
            self.phase = Phase::Battle;
        }

        Ok(PlacementReport { size, battle_started })
    }

    /// Fire at `target` on the opponent's board.
    ///
    /// Accepted shots flip the turn flag whether they hit or miss; rejected
    /// shots leave the whole match untouched.
    pub fn fire(&mut self, side: Side, target: Coord) -> Result<ShotReport, FireError> {
        if self.phase != Phase::Battle {
            return Err(FireError::NotStarted);
        }
        if self.turn != side {
            return Err(FireError::OutOfTurn);
        }

        let defender = side.opponent();
        let board = &mut self.boards[defender.index()];

        let hit = match board.cell(target) {
            CellState::Hit | CellState::Miss => return Err(FireError::AlreadyFired),
            CellState::Ship => {
                board.mark(target, CellState::Hit);
                self.hits_taken[defender.index()] += 1;
                true
            }
            CellState::Empty => {
                board.mark(target, CellState::Miss);
                false
            }
        };

        let winning = self.hits_taken[defender.index()] == fleet_cell_total();
        if winning {
            self.phase = Phase::Finished;
        }
        self.turn = self.turn.opponent();

        Ok(ShotReport { target, hit, winning })
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}
