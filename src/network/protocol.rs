//! Line Protocol
//!
//! Wire format for client-server communication: one UTF-8 line per message,
//! `COMMAND` or `COMMAND:data`, newline-terminated in both directions.
//!
//! Inbound lines parse into the tagged [`Command`] enum so the dispatcher is
//! an exhaustive `match`; malformed input is a representable
//! [`ProtocolError`], answered with a single `ERROR:<reason>` line and never
//! allowed to kill a connection's read loop.

use std::fmt;
use thiserror::Error;

use crate::game::board::{Coord, Orientation};

/// A parse failure for one inbound line. `Display` is the wire error payload.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The command word is not part of the protocol.
    #[error("Unknown command")]
    UnknownCommand,
    /// LOGIN/REGISTER payload is not exactly `user@pass`.
    #[error("Malformed credentials")]
    MalformedCredentials,
    /// Wrong number of comma-separated fields.
    #[error("Wrong number of fields")]
    WrongFieldCount,
    /// Row letter outside A-J or column not a digit 0-9.
    #[error("Invalid coordinate")]
    InvalidCoordinate,
    /// Direction token is neither H nor V.
    #[error("Invalid direction")]
    InvalidDirection,
}

/// One inbound client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `LOGIN:user@pass`
    Login {
        /// Username to authenticate as.
        user: String,
        /// Plaintext password.
        pass: String,
    },
    /// `REGISTER:user@pass`
    Register {
        /// Username to create.
        user: String,
        /// Plaintext password.
        pass: String,
    },
    /// `PLAYER_LIST`
    PlayerList,
    /// `CHALLENGE:name`
    Challenge {
        /// Player being challenged.
        opponent: String,
    },
    /// `CHALLENGE_ACCEPTED:name`
    ChallengeAccepted {
        /// Player whose challenge is being accepted.
        challenger: String,
    },
    /// `CHALLENGE_DECLINED:name`
    ChallengeDeclined {
        /// Player whose challenge is being declined.
        challenger: String,
    },
    /// `PLACE_SHIP:Row,Col,Dir`
    PlaceShip {
        /// Bow cell of the ship.
        bow: Coord,
        /// Direction the ship extends.
        heading: Orientation,
    },
    /// `FIRE:Row,Col`
    Fire {
        /// Cell to fire at on the opponent's board.
        target: Coord,
    },
    /// `LOGOUT`
    Logout,
}

impl Command {
    /// Parse one protocol line (without its trailing newline).
    pub fn parse(line: &str) -> Result<Command, ProtocolError> {
        let (name, data) = line.split_once(':').unwrap_or((line, ""));

        match name {
            "LOGIN" => {
                let (user, pass) = parse_credentials(data)?;
                Ok(Command::Login { user, pass })
            }
            "REGISTER" => {
                let (user, pass) = parse_credentials(data)?;
                Ok(Command::Register { user, pass })
            }
            "PLAYER_LIST" => Ok(Command::PlayerList),
            "CHALLENGE" => Ok(Command::Challenge {
                opponent: data.to_string(),
            }),
            "CHALLENGE_ACCEPTED" => Ok(Command::ChallengeAccepted {
                challenger: data.to_string(),
            }),
            "CHALLENGE_DECLINED" => Ok(Command::ChallengeDeclined {
                challenger: data.to_string(),
            }),
            "PLACE_SHIP" => {
                let fields: Vec<&str> = data.split(',').collect();
                match fields.as_slice() {
                    [row, col, dir] => Ok(Command::PlaceShip {
                        bow: parse_cell(row, col)?,
                        heading: parse_direction(dir)?,
                    }),
                    _ => Err(ProtocolError::WrongFieldCount),
                }
            }
            "FIRE" => {
                let fields: Vec<&str> = data.split(',').collect();
                match fields.as_slice() {
                    [row, col] => Ok(Command::Fire {
                        target: parse_cell(row, col)?,
                    }),
                    _ => Err(ProtocolError::WrongFieldCount),
                }
            }
            "LOGOUT" => Ok(Command::Logout),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }
}

/// `user@pass`, exactly one `@`, both parts non-empty.
fn parse_credentials(data: &str) -> Result<(String, String), ProtocolError> {
    match data.split_once('@') {
        Some((user, pass))
            if !user.is_empty() && !pass.is_empty() && !pass.contains('@') =>
        {
            Ok((user.to_string(), pass.to_string()))
        }
        _ => Err(ProtocolError::MalformedCredentials),
    }
}

/// Row letter A-J plus column digit 0-9.
fn parse_cell(row: &str, col: &str) -> Result<Coord, ProtocolError> {
    let mut chars = row.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(c @ 'A'..='J'), None) => c,
        (Some(c @ 'a'..='j'), None) => c.to_ascii_uppercase(),
        _ => return Err(ProtocolError::InvalidCoordinate),
    };
    let col: u8 = col.parse().map_err(|_| ProtocolError::InvalidCoordinate)?;
    Coord::new(letter as u8 - b'A', col).ok_or(ProtocolError::InvalidCoordinate)
}

/// Direction token, first character H or V, case-insensitive.
fn parse_direction(dir: &str) -> Result<Orientation, ProtocolError> {
    match dir.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('H') => Ok(Orientation::Horizontal),
        Some('V') => Ok(Orientation::Vertical),
        _ => Err(ProtocolError::InvalidDirection),
    }
}

/// One outbound server message. `Display` is the exact wire line, without the
/// trailing newline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// Credentials accepted.
    LoginSuccess,
    /// Credentials rejected.
    LoginFailed,
    /// Account created.
    RegisterSuccess,
    /// Username already exists (or cannot be stored).
    RegisterFailed,
    /// Usernames of everyone currently online.
    PlayerList(Vec<String>),
    /// A challenge relayed to its target.
    ChallengeFrom(String),
    /// A match was created for this connection.
    GameStart {
        /// True for the side that moves first.
        you_begin: bool,
    },
    /// The named player declined the caller's challenge.
    ChallengeRejected {
        /// Player who declined.
        decliner: String,
    },
    /// Placement accepted.
    ShipPlaced,
    /// Both fleets are placed; battle begins.
    GameStarted {
        /// True for the side whose move it is.
        your_turn: bool,
    },
    /// The caller's shot struck a ship.
    Hit(Coord),
    /// The caller's shot struck open water.
    Miss(Coord),
    /// The opponent's shot struck one of the caller's ships.
    EnemyHit(Coord),
    /// The opponent's shot missed.
    EnemyMissed(Coord),
    /// The match is decided.
    GameOver {
        /// True for the winning side.
        won: bool,
    },
    /// Any rejected command, reported only to its sender.
    Error(String),
}

impl ServerMessage {
    /// Wrap any error's display text in an `ERROR:` reply.
    pub fn error(reason: impl fmt::Display) -> Self {
        ServerMessage::Error(reason.to_string())
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::LoginSuccess => f.write_str("LOGIN_SUCCESS"),
            ServerMessage::LoginFailed => f.write_str("LOGIN_FAILED:Invalid Credentials"),
            ServerMessage::RegisterSuccess => f.write_str("REGISTER_SUCCESS"),
            ServerMessage::RegisterFailed => f.write_str("REGISTER_FAILED:Username taken"),
            ServerMessage::PlayerList(names) => write!(f, "PLAYER_LIST:{}", names.join(",")),
            ServerMessage::ChallengeFrom(name) => write!(f, "CHALLENGE_FROM:{name}"),
            ServerMessage::GameStart { you_begin: true } => f.write_str("GAME_START:You go first"),
            ServerMessage::GameStart { you_begin: false } => {
                f.write_str("GAME_START:Opponent goes first")
            }
            ServerMessage::ChallengeRejected { decliner } => {
                write!(f, "CHALLENGE_REJECTED:{decliner} declined.")
            }
            ServerMessage::ShipPlaced => f.write_str("SHIP_PLACED"),
            ServerMessage::GameStarted { your_turn: true } => f.write_str("GAME_STARTED:Your turn"),
            ServerMessage::GameStarted { your_turn: false } => {
                f.write_str("GAME_STARTED:Enemy turn")
            }
            ServerMessage::Hit(at) => write!(f, "HIT:{at}"),
            ServerMessage::Miss(at) => write!(f, "MISS:{at}"),
            ServerMessage::EnemyHit(at) => write!(f, "ENEMY_HIT:{at}"),
            ServerMessage::EnemyMissed(at) => write!(f, "ENEMY_MISSED:{at}"),
            ServerMessage::GameOver { won: true } => f.write_str("GAME_OVER:YOU_WON"),
            ServerMessage::GameOver { won: false } => f.write_str("GAME_OVER:YOU_LOST"),
            ServerMessage::Error(reason) => write!(f, "ERROR:{reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(row: u8, col: u8) -> Coord {
        Coord::new(row, col).unwrap()
    }

    #[test]
    fn test_parse_auth_commands() {
        assert_eq!(
            Command::parse("LOGIN:alice@pw1").unwrap(),
            Command::Login {
                user: "alice".into(),
                pass: "pw1".into()
            }
        );
        assert_eq!(
            Command::parse("REGISTER:bob@hunter2").unwrap(),
            Command::Register {
                user: "bob".into(),
                pass: "hunter2".into()
            }
        );
    }

    #[test]
    fn test_parse_malformed_credentials() {
        for line in ["LOGIN:alice", "LOGIN:", "LOGIN:@pw", "LOGIN:alice@", "LOGIN:a@b@c"] {
            assert_eq!(
                Command::parse(line).unwrap_err(),
                ProtocolError::MalformedCredentials,
                "line: {line}"
            );
        }
    }

    #[test]
    fn test_parse_matchmaking_commands() {
        assert_eq!(Command::parse("PLAYER_LIST").unwrap(), Command::PlayerList);
        assert_eq!(
            Command::parse("CHALLENGE:alice").unwrap(),
            Command::Challenge {
                opponent: "alice".into()
            }
        );
        assert_eq!(
            Command::parse("CHALLENGE_ACCEPTED:bob").unwrap(),
            Command::ChallengeAccepted {
                challenger: "bob".into()
            }
        );
        assert_eq!(
            Command::parse("CHALLENGE_DECLINED:bob").unwrap(),
            Command::ChallengeDeclined {
                challenger: "bob".into()
            }
        );
        assert_eq!(Command::parse("LOGOUT").unwrap(), Command::Logout);
    }

    #[test]
    fn test_parse_place_ship() {
        assert_eq!(
            Command::parse("PLACE_SHIP:A,0,H").unwrap(),
            Command::PlaceShip {
                bow: at(0, 0),
                heading: Orientation::Horizontal
            }
        );
        // Lowercase row and direction tokens are tolerated.
        assert_eq!(
            Command::parse("PLACE_SHIP:j,9,v").unwrap(),
            Command::PlaceShip {
                bow: at(9, 9),
                heading: Orientation::Vertical
            }
        );
    }

    #[test]
    fn test_parse_fire() {
        assert_eq!(
            Command::parse("FIRE:B,5").unwrap(),
            Command::Fire { target: at(1, 5) }
        );
    }

    #[test]
    fn test_parse_rejects_bad_coordinates() {
        assert_eq!(
            Command::parse("FIRE:K,0").unwrap_err(),
            ProtocolError::InvalidCoordinate
        );
        assert_eq!(
            Command::parse("FIRE:A,10").unwrap_err(),
            ProtocolError::InvalidCoordinate
        );
        assert_eq!(
            Command::parse("FIRE:A,x").unwrap_err(),
            ProtocolError::InvalidCoordinate
        );
        assert_eq!(
            Command::parse("FIRE:AA,0").unwrap_err(),
            ProtocolError::InvalidCoordinate
        );
        assert_eq!(
            Command::parse("FIRE:B").unwrap_err(),
            ProtocolError::WrongFieldCount
        );
        assert_eq!(
            Command::parse("PLACE_SHIP:A,0").unwrap_err(),
            ProtocolError::WrongFieldCount
        );
        assert_eq!(
            Command::parse("PLACE_SHIP:A,0,X").unwrap_err(),
            ProtocolError::InvalidDirection
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("SELF_DESTRUCT").unwrap_err(),
            ProtocolError::UnknownCommand
        );
        // Command words are case-sensitive.
        assert_eq!(
            Command::parse("fire:A,0").unwrap_err(),
            ProtocolError::UnknownCommand
        );
    }

    #[test]
    fn test_reply_wire_format() {
        assert_eq!(ServerMessage::LoginSuccess.to_string(), "LOGIN_SUCCESS");
        assert_eq!(
            ServerMessage::LoginFailed.to_string(),
            "LOGIN_FAILED:Invalid Credentials"
        );
        assert_eq!(
            ServerMessage::RegisterFailed.to_string(),
            "REGISTER_FAILED:Username taken"
        );
        assert_eq!(
            ServerMessage::PlayerList(vec!["alice".into(), "bob".into()]).to_string(),
            "PLAYER_LIST:alice,bob"
        );
        assert_eq!(
            ServerMessage::ChallengeFrom("bob".into()).to_string(),
            "CHALLENGE_FROM:bob"
        );
        assert_eq!(
            ServerMessage::GameStart { you_begin: true }.to_string(),
            "GAME_START:You go first"
        );
        assert_eq!(
            ServerMessage::GameStart { you_begin: false }.to_string(),
            "GAME_START:Opponent goes first"
        );
        assert_eq!(
            ServerMessage::ChallengeRejected {
                decliner: "alice".into()
            }
            .to_string(),
            "CHALLENGE_REJECTED:alice declined."
        );
        assert_eq!(
            ServerMessage::GameStarted { your_turn: false }.to_string(),
            "GAME_STARTED:Enemy turn"
        );
        assert_eq!(ServerMessage::Hit(at(1, 5)).to_string(), "HIT:B,5");
        assert_eq!(
            ServerMessage::EnemyMissed(at(9, 0)).to_string(),
            "ENEMY_MISSED:J,0"
        );
        assert_eq!(
            ServerMessage::GameOver { won: true }.to_string(),
            "GAME_OVER:YOU_WON"
        );
        assert_eq!(
            ServerMessage::error(ProtocolError::UnknownCommand).to_string(),
            "ERROR:Unknown command"
        );
    }
}
