//! Network Layer
//!
//! TCP transport, line protocol, and everything shared between connection
//! tasks. All rule decisions are delegated to `game/`.

pub mod auth;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use auth::{CredentialError, CredentialStore};
pub use protocol::{Command, ProtocolError, ServerMessage};
pub use registry::{ClientHandle, MatchBinding, SessionRegistry};
pub use server::{GameServer, ServerConfig, ServerError};
pub use session::MatchSession;
