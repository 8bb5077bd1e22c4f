//! TCP Game Server
//!
//! Accept loop and per-connection workers. Each connection gets one task
//! performing awaited line reads plus a dedicated writer task fed through an
//! mpsc channel, so the worker is the sole writer to its own outbound stream.
//! All command routing happens here; rule decisions live in `game/`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::game::board::{Coord, Orientation};
use crate::game::state::Side;
use crate::network::auth::{CredentialError, CredentialStore};
use crate::network::protocol::{Command, ServerMessage};
use crate::network::registry::{ClientHandle, MatchBinding, SessionRegistry};
use crate::network::session::MatchSession;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections; excess sockets are dropped at accept.
    pub max_connections: usize,
    /// Path of the credential file.
    pub users_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8888".parse().expect("static bind address"),
            max_connections: 128,
            users_file: PathBuf::from("users.txt"),
        }
    }
}

impl ServerConfig {
    /// Build a config from environment variables, falling back to defaults:
    /// `BATTLESHIP_BIND`, `BATTLESHIP_MAX_CONNECTIONS`,
    /// `BATTLESHIP_USERS_FILE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BATTLESHIP_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("BATTLESHIP_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            users_file: std::env::var("BATTLESHIP_USERS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.users_file),
        }
    }
}

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind or accept on the listen address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// Could not load the credential store.
    #[error("Credential store error: {0}")]
    Credentials(#[from] CredentialError),
}

/// Rejected matchmaking command. `Display` is the wire error payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
enum MatchmakingError {
    /// Challenge target offline, unknown, or the caller itself.
    #[error("Player not found")]
    PlayerNotFound,
}

/// The game server: listener plus the state shared by every connection task.
pub struct GameServer {
    config: ServerConfig,
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    credentials: Arc<CredentialStore>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Bind the listen socket.
    pub async fn bind(
        config: ServerConfig,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Battleship server listening on {}", listener.local_addr()?);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            registry: Arc::new(SessionRegistry::new()),
            credentials,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        })
    }

    /// Actual bound address; useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, spawning one worker per socket.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::Acquire)
                                >= self.config.max_connections
                            {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("New connection from {}", addr);
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Authenticated users currently online.
    pub async fn online_count(&self) -> usize {
        self.registry.online_count().await
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let credentials = self.credentials.clone();
        let connections = self.connections.clone();
        connections.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(64);
            let writer_task = tokio::spawn(write_outbound(writer, msg_rx));

            let mut connection = Connection {
                addr,
                registry,
                credentials,
                handle: ClientHandle::new(msg_tx),
                username: None,
            };
            if let Err(error) = connection.serve(reader).await {
                debug!(peer = %addr, %error, "connection closed with error");
            }
            connection.teardown().await;

            writer_task.abort();
            connections.fetch_sub(1, Ordering::AcqRel);
            info!("Connection {} cleaned up", addr);
        });
    }
}

/// Writer task: the only place this connection's outbound stream is written.
async fn write_outbound(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = rx.recv().await {
        let line = format!("{message}\n");
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Per-connection dispatcher: owns the authentication state and routes every
/// parsed command to auth, matchmaking, or the bound match.
struct Connection {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    credentials: Arc<CredentialStore>,
    handle: ClientHandle,
    username: Option<String>,
}

impl Connection {
    /// Read and dispatch lines until LOGOUT or end-of-stream.
    async fn serve(&mut self, reader: OwnedReadHalf) -> std::io::Result<()> {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            debug!(
                peer = %self.addr,
                user = self.username.as_deref().unwrap_or("guest"),
                line,
                "command received"
            );

            // A parse failure answers this line only; the loop survives.
            let command = match Command::parse(line) {
                Ok(command) => command,
                Err(reason) => {
                    debug!(peer = %self.addr, %reason, "malformed line rejected");
                    self.handle.send(ServerMessage::error(reason)).await;
                    continue;
                }
            };

            if !self.dispatch(command).await {
                break;
            }
        }

        Ok(())
    }

    /// Route one command. Returns `false` when the connection should close.
    async fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::Login { user, pass } => self.on_login(user, pass).await,
            Command::Register { user, pass } => self.on_register(user, pass).await,
            Command::PlayerList => self.on_player_list().await,
            Command::Challenge { opponent } => self.on_challenge(opponent).await,
            Command::ChallengeAccepted { challenger } => {
                self.on_challenge_accepted(challenger).await
            }
            Command::ChallengeDeclined { challenger } => {
                self.on_challenge_declined(challenger).await
            }
            Command::PlaceShip { bow, heading } => self.on_place_ship(bow, heading).await,
            Command::Fire { target } => self.on_fire(target).await,
            Command::Logout => return false,
        }
        true
    }

    /// LOGIN. Re-login mid-session is accepted and silently rebinds the
    /// connection's identity; the registry entry for the new name overwrites
    /// any existing one.
    async fn on_login(&mut self, user: String, pass: String) {
        if self.credentials.check_login(&user, &pass).await {
            info!(peer = %self.addr, user = %user, "login successful");
            self.username = Some(user.clone());
            self.registry.put(user, self.handle.clone()).await;
            self.handle.send(ServerMessage::LoginSuccess).await;
        } else {
            debug!(peer = %self.addr, user = %user, "login rejected");
            self.handle.send(ServerMessage::LoginFailed).await;
        }
    }

    /// REGISTER. Creates the account without logging in.
    async fn on_register(&mut self, user: String, pass: String) {
        if self.credentials.register(&user, &pass).await {
            info!(user = %user, "new user registered");
            self.handle.send(ServerMessage::RegisterSuccess).await;
        } else {
            self.handle.send(ServerMessage::RegisterFailed).await;
        }
    }

    async fn on_player_list(&self) {
        let names = self.registry.usernames().await;
        self.handle.send(ServerMessage::PlayerList(names)).await;
    }

    /// CHALLENGE. Relayed to the target's handle; nothing is stored, so a
    /// target can hold any number of simultaneous challenges.
    async fn on_challenge(&self, opponent: String) {
        if let Some(me) = self.username.as_deref() {
            if me != opponent {
                if let Some(target) = self.registry.get(&opponent).await {
                    debug!(from = me, to = %opponent, "challenge relayed");
                    target.send(ServerMessage::ChallengeFrom(me.to_string())).await;
                    return;
                }
            }
        }
        self.handle
            .send(ServerMessage::error(MatchmakingError::PlayerNotFound))
            .await;
    }

    /// CHALLENGE_ACCEPTED. Any accept naming an online user creates the
    /// match; there is no check that a corresponding CHALLENGE was issued.
    /// The named challenger becomes [`Side::One`] and moves first.
    async fn on_challenge_accepted(&mut self, challenger: String) {
        let Some(me) = self.username.clone() else {
            debug!(peer = %self.addr, "accept from unauthenticated connection ignored");
            return;
        };
        let Some(challenger_handle) = self.registry.get(&challenger).await else {
            debug!(challenger = %challenger, "accepted challenger not online, ignored");
            return;
        };

        let session = Arc::new(Mutex::new(MatchSession::new(
            challenger.clone(),
            challenger_handle.clone(),
            me,
            self.handle.clone(),
        )));
        challenger_handle
            .bind(MatchBinding {
                session: session.clone(),
                side: Side::One,
            })
            .await;
        self.handle
            .bind(MatchBinding {
                session,
                side: Side::Two,
            })
            .await;

        challenger_handle
            .send(ServerMessage::GameStart { you_begin: true })
            .await;
        self.handle
            .send(ServerMessage::GameStart { you_begin: false })
            .await;
    }

    async fn on_challenge_declined(&self, challenger: String) {
        let Some(me) = self.username.clone() else {
            debug!(peer = %self.addr, "decline from unauthenticated connection ignored");
            return;
        };
        if let Some(challenger_handle) = self.registry.get(&challenger).await {
            challenger_handle
                .send(ServerMessage::ChallengeRejected { decliner: me })
                .await;
        }
    }

    async fn on_place_ship(&self, bow: Coord, heading: Orientation) {
        match self.handle.binding().await {
            Some(binding) => {
                binding
                    .session
                    .lock()
                    .await
                    .place_ship(binding.side, bow, heading)
                    .await;
            }
            None => debug!(peer = %self.addr, "PLACE_SHIP with no bound match ignored"),
        }
    }

    async fn on_fire(&self, target: Coord) {
        match self.handle.binding().await {
            Some(binding) => {
                binding.session.lock().await.fire(binding.side, target).await;
            }
            None => debug!(peer = %self.addr, "FIRE with no bound match ignored"),
        }
    }

    /// Remove this connection's registry entry; the opponent of any bound
    /// match is not proactively notified.
    async fn teardown(&mut self) {
        if let Some(name) = self.username.take() {
            self.registry.remove(&name).await;
            info!(user = %name, "user went offline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::Lines;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct TestServer {
        server: Arc<GameServer>,
        addr: SocketAddr,
        users_file: PathBuf,
    }

    impl TestServer {
        async fn start() -> Self {
            Self::start_with_limit(128).await
        }

        async fn start_with_limit(max_connections: usize) -> Self {
            let users_file =
                std::env::temp_dir().join(format!("battleship-users-{}.txt", Uuid::new_v4()));
            let config = ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                max_connections,
                users_file: users_file.clone(),
            };
            let credentials = Arc::new(CredentialStore::load(&users_file).unwrap());
            let server = Arc::new(GameServer::bind(config, credentials).await.unwrap());
            let addr = server.local_addr().unwrap();

            let runner = server.clone();
            tokio::spawn(async move {
                let _ = runner.run().await;
            });

            Self {
                server,
                addr,
                users_file,
            }
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.server.shutdown();
            let _ = std::fs::remove_file(&self.users_file);
        }
    }

    struct TestClient {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        /// Connect, register, and log in under `name`.
        async fn login(addr: SocketAddr, name: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send(&format!("REGISTER:{name}@pw")).await;
            assert_eq!(client.recv().await, "REGISTER_SUCCESS");
            client.send(&format!("LOGIN:{name}@pw")).await;
            assert_eq!(client.recv().await, "LOGIN_SUCCESS");
            client
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for a reply")
                .unwrap()
                .expect("connection closed unexpectedly")
        }

        async fn expect_eof(&mut self) {
            let line = timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for EOF")
                .unwrap();
            assert_eq!(line, None);
        }

        /// Place a whole fleet on even rows, bows in column 0.
        async fn place_fleet(&mut self) {
            for row in ["A", "C", "E", "G", "I"] {
                self.send(&format!("PLACE_SHIP:{row},0,H")).await;
                assert_eq!(self.recv().await, "SHIP_PLACED");
            }
        }
    }

    /// Bind bob (challenger) and alice (accepter) into a match.
    async fn start_match(addr: SocketAddr) -> (TestClient, TestClient) {
        let mut bob = TestClient::login(addr, "bob").await;
        let mut alice = TestClient::login(addr, "alice").await;

        bob.send("CHALLENGE:alice").await;
        assert_eq!(alice.recv().await, "CHALLENGE_FROM:bob");

        alice.send("CHALLENGE_ACCEPTED:bob").await;
        assert_eq!(bob.recv().await, "GAME_START:You go first");
        assert_eq!(alice.recv().await, "GAME_START:Opponent goes first");

        (bob, alice)
    }

    #[tokio::test]
    async fn test_register_and_login_flow() {
        let fixture = TestServer::start().await;
        let mut client = TestClient::connect(fixture.addr).await;

        client.send("REGISTER:alice@pw1").await;
        assert_eq!(client.recv().await, "REGISTER_SUCCESS");

        client.send("REGISTER:alice@other").await;
        assert_eq!(client.recv().await, "REGISTER_FAILED:Username taken");

        client.send("LOGIN:alice@pw1").await;
        assert_eq!(client.recv().await, "LOGIN_SUCCESS");

        client.send("LOGIN:alice@wrong").await;
        assert_eq!(client.recv().await, "LOGIN_FAILED:Invalid Credentials");
    }

    #[tokio::test]
    async fn test_player_list_shows_everyone_online() {
        let fixture = TestServer::start().await;
        let mut bob = TestClient::login(fixture.addr, "bob").await;
        let mut alice = TestClient::login(fixture.addr, "alice").await;

        bob.send("PLAYER_LIST").await;
        assert_eq!(bob.recv().await, "PLAYER_LIST:alice,bob");

        alice.send("PLAYER_LIST").await;
        assert_eq!(alice.recv().await, "PLAYER_LIST:alice,bob");
    }

    #[tokio::test]
    async fn test_challenge_unknown_player() {
        let fixture = TestServer::start().await;
        let mut bob = TestClient::login(fixture.addr, "bob").await;

        bob.send("CHALLENGE:nobody").await;
        assert_eq!(bob.recv().await, "ERROR:Player not found");

        // Challenging yourself is indistinguishable from a missing target.
        bob.send("CHALLENGE:bob").await;
        assert_eq!(bob.recv().await, "ERROR:Player not found");
    }

    #[tokio::test]
    async fn test_challenge_decline_is_relayed() {
        let fixture = TestServer::start().await;
        let mut bob = TestClient::login(fixture.addr, "bob").await;
        let mut alice = TestClient::login(fixture.addr, "alice").await;

        bob.send("CHALLENGE:alice").await;
        assert_eq!(alice.recv().await, "CHALLENGE_FROM:bob");

        alice.send("CHALLENGE_DECLINED:bob").await;
        assert_eq!(bob.recv().await, "CHALLENGE_REJECTED:alice declined.");
    }

    #[tokio::test]
    async fn test_full_match_turn_order_and_shots() {
        let fixture = TestServer::start().await;
        let (mut bob, mut alice) = start_match(fixture.addr).await;

        bob.place_fleet().await;
        alice.place_fleet().await;
        assert_eq!(bob.recv().await, "GAME_STARTED:Your turn");
        assert_eq!(alice.recv().await, "GAME_STARTED:Enemy turn");

        // Accepter moving first is rejected.
        alice.send("FIRE:B,5").await;
        assert_eq!(alice.recv().await, "ERROR:Wait for turn");

        // Challenger misses open water; both sides hear about it.
        bob.send("FIRE:B,5").await;
        assert_eq!(bob.recv().await, "MISS:B,5");
        assert_eq!(alice.recv().await, "ENEMY_MISSED:B,5");

        // Turn has passed; a hit lands on bob's size-5 ship at A,0.
        alice.send("FIRE:A,0").await;
        assert_eq!(alice.recv().await, "HIT:A,0");
        assert_eq!(bob.recv().await, "ENEMY_HIT:A,0");

        // Re-firing the same cell is rejected without consuming the turn.
        bob.send("FIRE:B,5").await;
        assert_eq!(bob.recv().await, "ERROR:Already fired there");
        bob.send("FIRE:A,0").await;
        assert_eq!(bob.recv().await, "HIT:A,0");
        assert_eq!(alice.recv().await, "ENEMY_HIT:A,0");
    }

    #[tokio::test]
    async fn test_fire_before_placement_complete() {
        let fixture = TestServer::start().await;
        let (mut bob, _alice) = start_match(fixture.addr).await;

        bob.place_fleet().await;
        bob.send("FIRE:A,0").await;
        assert_eq!(bob.recv().await, "ERROR:Game not started");

        // The sixth placement attempt is also turned away.
        bob.send("PLACE_SHIP:J,0,H").await;
        assert_eq!(bob.recv().await, "ERROR:All ships placed");

        // Unbound connections ignore game commands entirely.
        let mut carol = TestClient::login(fixture.addr, "carol").await;
        carol.send("FIRE:A,0").await;
        carol.send("PLAYER_LIST").await;
        assert_eq!(carol.recv().await, "PLAYER_LIST:alice,bob,carol");
    }

    #[tokio::test]
    async fn test_malformed_lines_keep_connection_alive() {
        let fixture = TestServer::start().await;
        let mut client = TestClient::connect(fixture.addr).await;

        client.send("FIRE:Z,9").await;
        assert_eq!(client.recv().await, "ERROR:Invalid coordinate");

        client.send("PLACE_SHIP:A,x,H").await;
        assert_eq!(client.recv().await, "ERROR:Invalid coordinate");

        client.send("PLACE_SHIP:A,0,Q").await;
        assert_eq!(client.recv().await, "ERROR:Invalid direction");

        client.send("FIRE:A").await;
        assert_eq!(client.recv().await, "ERROR:Wrong number of fields");

        client.send("LOGIN:no-separator").await;
        assert_eq!(client.recv().await, "ERROR:Malformed credentials");

        client.send("MAKE_ME_ADMIN").await;
        assert_eq!(client.recv().await, "ERROR:Unknown command");

        // Still serviceable after every rejection.
        client.send("PLAYER_LIST").await;
        assert_eq!(client.recv().await, "PLAYER_LIST:");
    }

    #[tokio::test]
    async fn test_logout_removes_user_from_registry() {
        let fixture = TestServer::start().await;
        let mut bob = TestClient::login(fixture.addr, "bob").await;
        let mut alice = TestClient::login(fixture.addr, "alice").await;

        bob.send("LOGOUT").await;
        bob.expect_eof().await;

        alice.send("PLAYER_LIST").await;
        assert_eq!(alice.recv().await, "PLAYER_LIST:alice");
    }

    #[tokio::test]
    async fn test_connection_limit_rejects_excess_sockets() {
        let fixture = TestServer::start_with_limit(1).await;
        let mut first = TestClient::connect(fixture.addr).await;

        first.send("PLAYER_LIST").await;
        assert_eq!(first.recv().await, "PLAYER_LIST:");

        let mut second = TestClient::connect(fixture.addr).await;
        second.expect_eof().await;
    }
}
