//! Per-connection state machine.
//!
//! ```text
//! AwaitingConnectHeader -> AwaitingRoleConnectData -> AwaitingEncryptionSetup -> MessageLoop -> Closed
//! ```
//!
//! Every protocol violation is fatal to the one connection: the wire format has
//! no generic length field, so an unread body cannot be skipped. [`Connection::run`]
//! is the error boundary. Whatever ends the connection (error, EOF or kick), it
//! removes the registry entry and calls the disconnect hook exactly once.
//!
//! Handlers reach the socket through the collaborator methods on [`Connection`]
//! and keep their state in the role's [`SessionData`] slot.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::accounts::Account;
use crate::core::stream::{StreamRead, StreamWrite, UUID_SIZE};
use crate::error::{ProtocolError, Result};
use crate::protocol::connect::{BuildType, ConnectHeader, ConnectionRole, RoleConnectData, HEADER_TAIL_LEN, PREFIX_LEN};
use crate::protocol::setup;
use crate::server::registry::{ConnectionSummary, ConnectionToken};
use crate::server::ServerState;
use crate::utils::metrics::{global_metrics, Timer};
use crate::utils::timeout::with_timeout;

/// Byte stream a connection runs over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingConnectHeader,
    AwaitingRoleConnectData,
    AwaitingEncryptionSetup,
    MessageLoop,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionState {
    None,
    /// Setup completed without enabling encryption.
    NegotiatedNone,
}

/// Client build metadata from the connect header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub build_id: u32,
    pub build_type: BuildType,
    pub branch_id: u32,
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    /// Challenge sent in reply to client registration.
    pub server_challenge: Option<u32>,
    /// Set once the login has been verified.
    pub account: Option<Account>,
    /// KI number of the selected avatar.
    pub player: Option<u32>,
}

impl AuthSession {
    pub fn is_logged_in(&self) -> bool {
        self.account.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub account_id: Uuid,
    pub age_instance_id: Uuid,
    pub age_mcp_id: Option<u32>,
    pub ki_number: Option<u32>,
}

/// Per-role session state.
#[derive(Debug, Clone, Default)]
pub enum SessionData {
    #[default]
    None,
    Auth(AuthSession),
    Game(GameSession),
    GateKeeper,
}

fn wrong_session(expected: &str) -> ProtocolError {
    ProtocolError::Custom(format!("{expected} session requested on a different connection role"))
}

pub struct Connection {
    stream: Box<dyn AsyncStream>,
    peer: SocketAddr,
    token: ConnectionToken,
    state: ConnectionState,
    role: Option<ConnectionRole>,
    build: Option<BuildInfo>,
    encryption: EncryptionState,
    session: SessionData,
    server: Arc<ServerState>,
    /// Cancelled by operator kicks through the registry.
    kick: CancellationToken,
    shutdown: CancellationToken,
    registered: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("token", &self.token)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("encryption", &self.encryption)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an accepted stream. Cancelling `shutdown` ends the connection at its
    /// next suspension point; kicks use a token of the connection's own.
    pub fn new<S: AsyncStream + 'static>(
        stream: S,
        peer: SocketAddr,
        server: Arc<ServerState>,
        shutdown: CancellationToken,
    ) -> Self {
        let token = server.registry().next_token();
        Self {
            stream: Box::new(stream),
            peer,
            token,
            state: ConnectionState::AwaitingConnectHeader,
            role: None,
            build: None,
            encryption: EncryptionState::None,
            session: SessionData::None,
            server,
            kick: CancellationToken::new(),
            shutdown,
            registered: false,
        }
    }

    /// Drive the connection until it closes.
    #[instrument(skip(self), fields(peer = %self.peer, token = self.token))]
    pub async fn run(mut self) -> Result<()> {
        global_metrics().connection_established();
        let kick = self.kick.clone();
        let shutdown = self.shutdown.clone();

        let result = tokio::select! {
            biased;
            _ = kick.cancelled() => Err(ProtocolError::Kicked),
            _ = shutdown.cancelled() => Err(ProtocolError::ShuttingDown),
            result = self.drive() => result,
        };

        self.finish(&result).await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        let role = self.read_connect_header().await?;

        self.state = ConnectionState::AwaitingRoleConnectData;
        self.read_role_connect_data(role).await?;

        self.state = ConnectionState::AwaitingEncryptionSetup;
        self.negotiate_encryption().await?;

        self.server.registry().register(self.summary(), self.kick.clone())?;
        self.registered = true;
        global_metrics().handshake_success();
        info!(role = role.name(), "Handshake complete");

        self.state = ConnectionState::MessageLoop;
        self.message_loop(role).await
    }

    async fn read_connect_header(&mut self) -> Result<ConnectionRole> {
        global_metrics().handshake_attempt();

        let mut prefix = [0u8; PREFIX_LEN];
        self.read_exact(&mut prefix).await?;
        let role = ConnectHeader::check_prefix(prefix)?;

        let mut tail = self.read_fixed(HEADER_TAIL_LEN).await?;
        let header = ConnectHeader::read_tail(role, &mut tail)?;

        if header.build_id != self.server.config().shard.expected_build_id {
            warn!(
                build_id = header.build_id,
                expected = self.server.config().shard.expected_build_id,
                "Client build differs from the expected build"
            );
        }
        debug!(
            role = role.name(),
            build_id = header.build_id,
            build_type = ?header.build_type,
            branch_id = header.branch_id,
            product_id = %header.product_id,
            "Connect header"
        );

        self.role = Some(role);
        self.build = Some(BuildInfo {
            build_id: header.build_id,
            build_type: header.build_type,
            branch_id: header.branch_id,
            product_id: header.product_id,
        });
        Ok(role)
    }

    async fn read_role_connect_data(&mut self, role: ConnectionRole) -> Result<()> {
        let declared = self.read_u32().await?;
        RoleConnectData::check_len(role, declared)?;

        let mut payload = self.read_fixed(declared as usize - 4).await?;
        let data = RoleConnectData::read_payload(role, &mut payload)?;

        self.session = match data {
            RoleConnectData::Auth { .. } => SessionData::Auth(AuthSession::default()),
            RoleConnectData::GateKeeper { .. } => SessionData::GateKeeper,
            RoleConnectData::Game {
                account_id,
                age_instance_id,
            } => SessionData::Game(GameSession {
                account_id,
                age_instance_id,
                age_mcp_id: None,
                ki_number: None,
            }),
        };
        Ok(())
    }

    async fn negotiate_encryption(&mut self) -> Result<()> {
        let mut header = [0u8; setup::SETUP_HEADER_LEN];
        self.read_exact(&mut header).await?;
        let payload_len = setup::check_header(header)?;
        if payload_len > 0 {
            // key material is read and dropped
            self.read_fixed(payload_len).await?;
            debug!(payload_len, "Encryption requested, answering with a dummy seed");
        }
        self.send(setup::reply_for(payload_len)).await?;
        self.encryption = EncryptionState::NegotiatedNone;
        Ok(())
    }

    async fn message_loop(&mut self, role: ConnectionRole) -> Result<()> {
        loop {
            let Some(message_type) = self.read_message_type().await? else {
                debug!("Peer closed the connection");
                return Ok(());
            };

            let server = Arc::clone(&self.server);
            let Some(handler) = server.dispatcher(role).get(message_type) else {
                return self.reject_unknown(role, message_type).await;
            };

            global_metrics().message_received();
            debug!(message_type, handler = handler.name, "Dispatching message");
            let _timer = Timer::start(handler.name);
            (handler.call)(self).await?;
        }
    }

    /// `None` on a clean close at a message boundary.
    async fn read_message_type(&mut self) -> Result<Option<u16>> {
        let mut tag = [0u8; 2];
        let first = self.stream.read(&mut tag[..1]).await?;
        if first == 0 {
            return Ok(None);
        }
        self.read_exact(&mut tag[1..]).await?;
        global_metrics().bytes_read(1);
        Ok(Some(u16::from_le_bytes(tag)))
    }

    async fn reject_unknown(&mut self, role: ConnectionRole, message_type: u16) -> Result<()> {
        global_metrics().unknown_message();

        let limits = &self.server.config().server;
        let mut trailing = vec![0u8; limits.diagnostic_read_bytes];
        let read = match with_timeout(limits.diagnostic_read_timeout, self.stream.read(&mut trailing)).await {
            Ok(Ok(read)) => read,
            _ => 0,
        };

        warn!(
            role = role.name(),
            message_type,
            trailing = %hex::encode(&trailing[..read]),
            "Unknown message type, closing connection"
        );
        Err(ProtocolError::UnknownMessageType {
            role: role.name(),
            message_type,
        })
    }

    async fn finish(&mut self, result: &Result<()>) {
        self.state = ConnectionState::Closed;
        let metrics = global_metrics();
        metrics.connection_closed();

        if self.registered {
            if let Err(e) = self.server.registry().remove(self.token) {
                warn!(error = %e, "Failed to remove connection from registry");
            }
            self.registered = false;
        } else {
            metrics.handshake_failed();
        }

        match result {
            Ok(()) => info!("Connection closed"),
            Err(ProtocolError::Kicked) => {
                metrics.kick();
                info!("Connection kicked");
            }
            Err(ProtocolError::ShuttingDown) => info!("Connection closed for shutdown"),
            Err(e) if e.is_premature_eof() => info!(error = %e, "Connection dropped"),
            Err(e @ ProtocolError::Io(_)) => {
                metrics.connection_error();
                warn!(error = %e, "Connection failed");
            }
            Err(e) => {
                metrics.protocol_error();
                warn!(error = %e, "Protocol error, connection closed");
            }
        }

        self.server.hooks().on_disconnect(&self.summary());

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Stream shutdown failed");
        }
    }

    // Collaborator interface for handlers.

    /// Fill `buf` completely. A peer that closes first yields `ConnectionClosed`.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.stream.read_exact(buf).await {
            Ok(_) => {
                global_metrics().bytes_read(buf.len() as u64);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::ConnectionClosed),
            Err(e) => Err(e.into()),
        }
    }

    /// Read exactly `len` bytes, to be parsed with [`StreamRead`].
    pub async fn read_fixed(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        self.read_fixed(1).await?.read_u8()
    }

    pub async fn read_u16(&mut self) -> Result<u16> {
        self.read_fixed(2).await?.read_u16()
    }

    pub async fn read_u32(&mut self) -> Result<u32> {
        self.read_fixed(4).await?.read_u32()
    }

    pub async fn read_uuid(&mut self) -> Result<Uuid> {
        self.read_fixed(UUID_SIZE).await?.read_uuid()
    }

    /// Read a counted UTF-16 string. The count is checked before the units are read.
    pub async fn read_string16(&mut self, max: usize) -> Result<String> {
        let units = self.read_u16().await?;
        if units as usize > max {
            return Err(ProtocolError::StringTooLong {
                length: units as usize,
                max,
            });
        }
        let body = self.read_fixed(units as usize * 2).await?;
        let mut raw = BytesMut::with_capacity(2 + body.len());
        raw.write_u16(units);
        raw.write_bytes(&body);
        raw.freeze().read_string16(max)
    }

    /// Write `data` and flush it.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        global_metrics().message_sent(data.len() as u64);
        Ok(())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn token(&self) -> ConnectionToken {
        self.token
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<ConnectionRole> {
        self.role
    }

    pub fn build(&self) -> Option<&BuildInfo> {
        self.build.as_ref()
    }

    pub fn encryption(&self) -> EncryptionState {
        self.encryption
    }

    pub fn server(&self) -> &Arc<ServerState> {
        &self.server
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    pub fn auth_session(&self) -> Result<&AuthSession> {
        match &self.session {
            SessionData::Auth(session) => Ok(session),
            _ => Err(wrong_session("auth")),
        }
    }

    pub fn auth_session_mut(&mut self) -> Result<&mut AuthSession> {
        match &mut self.session {
            SessionData::Auth(session) => Ok(session),
            _ => Err(wrong_session("auth")),
        }
    }

    pub fn game_session(&self) -> Result<&GameSession> {
        match &self.session {
            SessionData::Game(session) => Ok(session),
            _ => Err(wrong_session("game")),
        }
    }

    pub fn game_session_mut(&mut self) -> Result<&mut GameSession> {
        match &mut self.session {
            SessionData::Game(session) => Ok(session),
            _ => Err(wrong_session("game")),
        }
    }

    /// Registry view of this connection.
    pub fn summary(&self) -> ConnectionSummary {
        let mut summary = ConnectionSummary {
            token: self.token,
            peer: self.peer,
            role: self.role,
            build_id: self.build.map(|b| b.build_id),
            account_name: None,
            account_id: None,
            ki_number: None,
            age_instance_id: None,
        };
        match &self.session {
            SessionData::Auth(session) => {
                if let Some(account) = &session.account {
                    summary.account_name = Some(account.name.clone());
                    summary.account_id = Some(account.id);
                }
                summary.ki_number = session.player;
            }
            SessionData::Game(session) => {
                summary.account_id = Some(session.account_id);
                summary.age_instance_id = Some(session.age_instance_id);
                summary.ki_number = session.ki_number;
            }
            SessionData::GateKeeper | SessionData::None => {}
        }
        summary
    }

    /// Publish session changes to the registry.
    pub fn refresh_registry(&self) -> Result<()> {
        if self.registered {
            self.server.registry().update(self.summary())?;
        }
        Ok(())
    }
}
