//! Match Session
//!
//! Binds exactly two participants around one [`MatchState`] and translates
//! rule outcomes into protocol messages for one or both of them. Lives behind
//! an `Arc<Mutex<..>>` shared by both participants' connection tasks, so
//! every placement and shot serializes completely; the opponent never
//! observes a partial update.

use tracing::{debug, info};
use uuid::Uuid;

use crate::game::board::{Coord, Orientation};
use crate::game::state::{MatchState, Side};
use crate::network::protocol::ServerMessage;
use crate::network::registry::ClientHandle;

/// One of the two players bound to a session.
struct Participant {
    name: String,
    handle: ClientHandle,
}

/// The paired, stateful session between two participants, from
/// challenge-acceptance through game-over.
pub struct MatchSession {
    id: Uuid,
    participants: [Participant; 2],
    state: MatchState,
}

impl MatchSession {
    /// Create a session for a freshly accepted challenge. The challenger is
    /// [`Side::One`] and moves first.
    pub fn new(
        challenger_name: String,
        challenger: ClientHandle,
        accepter_name: String,
        accepter: ClientHandle,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(
            match_id = %id,
            challenger = %challenger_name,
            accepter = %accepter_name,
            "match created"
        );
        Self {
            id,
            participants: [
                Participant {
                    name: challenger_name,
                    handle: challenger,
                },
                Participant {
                    name: accepter_name,
                    handle: accepter,
                },
            ],
            state: MatchState::new(),
        }
    }

    /// Match identifier, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Username playing the given side.
    pub fn participant_name(&self, side: Side) -> &str {
        &self.participant(side).name
    }

    /// The underlying rules state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    fn participant(&self, side: Side) -> &Participant {
        match side {
            Side::One => &self.participants[0],
            Side::Two => &self.participants[1],
        }
    }

    async fn send(&self, side: Side, message: ServerMessage) {
        self.participant(side).handle.send(message).await;
    }

    /// Place the side's next ship, answering the actor and, when this
    /// completes both fleets, announcing battle to both participants.
    pub async fn place_ship(&mut self, side: Side, bow: Coord, heading: Orientation) {
        match self.state.place_ship(side, bow, heading) {
            Ok(report) => {
                self.send(side, ServerMessage::ShipPlaced).await;
                if report.battle_started {
                    let first = self.state.turn();
                    info!(
                        match_id = %self.id,
                        first = %self.participant_name(first),
                        "both fleets placed, battle begins"
                    );
                    self.send(first, ServerMessage::GameStarted { your_turn: true })
                        .await;
                    self.send(
                        first.opponent(),
                        ServerMessage::GameStarted { your_turn: false },
                    )
                    .await;
                }
            }
            Err(reason) => {
                debug!(
                    match_id = %self.id,
                    player = %self.participant_name(side),
                    %reason,
                    "placement rejected"
                );
                self.send(side, ServerMessage::error(reason)).await;
            }
        }
    }

    /// Fire at the opponent's board, reporting the outcome to both sides and
    /// announcing the result when the shot decides the match.
    pub async fn fire(&mut self, side: Side, target: Coord) {
        match self.state.fire(side, target) {
            Ok(report) => {
                let defender = side.opponent();
                if report.hit {
                    self.send(side, ServerMessage::Hit(target)).await;
                    self.send(defender, ServerMessage::EnemyHit(target)).await;
                } else {
                    self.send(side, ServerMessage::Miss(target)).await;
                    self.send(defender, ServerMessage::EnemyMissed(target)).await;
                }
                if report.winning {
                    info!(
                        match_id = %self.id,
                        winner = %self.participant_name(side),
                        loser = %self.participant_name(defender),
                        "match decided"
                    );
                    self.send(side, ServerMessage::GameOver { won: true }).await;
                    self.send(defender, ServerMessage::GameOver { won: false })
                        .await;
                }
            }
            Err(reason) => {
                debug!(
                    match_id = %self.id,
                    player = %self.participant_name(side),
                    %reason,
                    "shot rejected"
                );
                self.send(side, ServerMessage::error(reason)).await;
            }
        }
    }
}
