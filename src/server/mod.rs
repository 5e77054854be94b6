//! # Server
//!
//! Shared server state and the TCP listener.
//!
//! [`ServerState`] is built once at startup: it owns the configuration, the
//! per-role dispatch tables, the message registry, the account store and the
//! live-connection registry. It also carries the operator interface (listing and
//! kicking connections, status text, online flag, log level).
//!
//! [`serve`] accepts connections until its shutdown token is cancelled, running
//! one task per connection.

pub mod registry;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::accounts::{AccountStore, MemoryAccountStore};
use crate::config::MoulaConfig;
use crate::error::{ProtocolError, Result};
use crate::message::MessageRegistry;
use crate::protocol::connect::ConnectionRole;
use crate::protocol::connection::Connection;
use crate::protocol::dispatcher::Dispatcher;
use crate::sdl::{GuessLimits, SdlBlob};
use crate::utils::logging::LogHandle;
use crate::utils::timeout::with_timeout;

pub use registry::{ConnectionRegistry, ConnectionSummary, ConnectionToken};

/// Callbacks into the embedding application.
pub trait ConnectionHooks: Send + Sync {
    /// Called exactly once per accepted connection, after it has left the registry.
    fn on_disconnect(&self, summary: &ConnectionSummary);
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ConnectionHooks for NoopHooks {
    fn on_disconnect(&self, _: &ConnectionSummary) {}
}

struct Dispatchers {
    auth: Dispatcher,
    game: Dispatcher,
    gatekeeper: Dispatcher,
}

pub struct ServerState {
    config: MoulaConfig,
    registry: ConnectionRegistry,
    dispatchers: Dispatchers,
    messages: MessageRegistry,
    sdl_limits: GuessLimits,
    accounts: Box<dyn AccountStore>,
    hooks: Arc<dyn ConnectionHooks>,
    status_message: RwLock<String>,
    online: AtomicBool,
    log: LogHandle,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("address", &self.config.server.address)
            .field("connections", &self.registry.len())
            .field("messages", &self.messages.len())
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Build the state from configuration. Duplicate registrations in any table fail here.
    pub fn new(config: MoulaConfig) -> Result<Self> {
        let dispatchers = Dispatchers {
            auth: Dispatcher::for_role(ConnectionRole::Auth)?,
            game: Dispatcher::for_role(ConnectionRole::Game)?,
            gatekeeper: Dispatcher::for_role(ConnectionRole::GateKeeper)?,
        };
        let messages = MessageRegistry::builtin()?;
        let accounts = MemoryAccountStore::from_config(&config.shard.accounts);
        info!(
            accounts = accounts.len(),
            message_classes = messages.len(),
            "Server state initialized"
        );

        Ok(Self {
            registry: ConnectionRegistry::new(),
            dispatchers,
            messages,
            sdl_limits: config.sdl.limits(),
            accounts: Box::new(accounts),
            hooks: Arc::new(NoopHooks),
            status_message: RwLock::new(config.shard.status_message.clone()),
            online: AtomicBool::new(true),
            log: LogHandle::detached(config.logging.log_level),
            config,
        })
    }

    pub fn with_accounts<A: AccountStore + 'static>(mut self, accounts: A) -> Self {
        self.accounts = Box::new(accounts);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ConnectionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Route log level changes to an installed subscriber.
    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &MoulaConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self, role: ConnectionRole) -> &Dispatcher {
        match role {
            ConnectionRole::Auth => &self.dispatchers.auth,
            ConnectionRole::Game => &self.dispatchers.game,
            ConnectionRole::GateKeeper => &self.dispatchers.gatekeeper,
        }
    }

    pub fn messages(&self) -> &MessageRegistry {
        &self.messages
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn hooks(&self) -> &dyn ConnectionHooks {
        self.hooks.as_ref()
    }

    pub fn sdl_limits(&self) -> &GuessLimits {
        &self.sdl_limits
    }

    /// Decode an SDL blob with the configured windows. Whether a failure is fatal
    /// to the connection that sent it is up to the caller.
    pub fn decode_sdl(&self, data: &[u8]) -> Result<SdlBlob> {
        SdlBlob::from_bytes_with(data, &self.sdl_limits)
    }

    // Operator interface.

    pub fn connections(&self) -> Result<Vec<ConnectionSummary>> {
        self.registry.list()
    }

    pub fn kick(&self, token: ConnectionToken) -> Result<()> {
        self.registry.kick(token)?;
        info!(token, "Kick requested");
        Ok(())
    }

    /// Kick every connection from `address`.
    pub fn kick_address(&self, address: IpAddr) -> Result<usize> {
        self.kick_matching(&format!("connection from {address}"), |s| s.peer.ip() == address)
    }

    /// Kick every connection logged in to `account_name`, ignoring ASCII case.
    pub fn kick_account(&self, account_name: &str) -> Result<usize> {
        self.kick_matching(&format!("account '{account_name}'"), |s| {
            s.account_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(account_name))
        })
    }

    /// Kick every connection playing the avatar `ki_number`.
    pub fn kick_avatar(&self, ki_number: u32) -> Result<usize> {
        self.kick_matching(&format!("avatar {ki_number}"), |s| s.ki_number == Some(ki_number))
    }

    fn kick_matching<F>(&self, target: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&ConnectionSummary) -> bool,
    {
        let kicked = self.registry.kick_where(predicate)?;
        if kicked == 0 {
            return Err(ProtocolError::NotFound(target.to_string()));
        }
        info!(kick_target = target, kicked, "Kick requested");
        Ok(kicked)
    }

    pub fn status_message(&self) -> String {
        self.status_message
            .read()
            .map(|message| message.clone())
            .unwrap_or_default()
    }

    pub fn set_status_message(&self, message: impl Into<String>) -> Result<()> {
        let mut current = self
            .status_message
            .write()
            .map_err(|_| ProtocolError::Custom("Failed to acquire status message lock".into()))?;
        *current = message.into();
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
        info!(online, "Online flag changed");
    }

    pub fn log_level(&self) -> Level {
        self.log.level()
    }

    /// Change the log level; unknown level names are `NotFound`.
    pub fn set_log_level(&self, level: &str) -> Result<Level> {
        let level = self.log.set_level(level)?;
        info!(level = %level, "Log level changed");
        Ok(level)
    }
}

/// Accept connections on `listener` until `shutdown` is cancelled.
///
/// Each connection runs on its own task holding `shutdown`, so cancelling it also
/// closes live connections. Returns once they have unwound or the configured
/// shutdown timeout has passed.
#[instrument(skip(listener, state, shutdown), fields(address = ?listener.local_addr().ok()))]
pub async fn serve(listener: TcpListener, state: Arc<ServerState>, shutdown: CancellationToken) -> Result<()> {
    let limit = Arc::new(Semaphore::new(state.config().server.max_connections));
    let tasks = TaskTracker::new();
    let mut incoming = TcpListenerStream::new(listener);
    info!("Listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutting down server. Waiting for connections to close...");
                break;
            }

            next = incoming.next() => {
                let stream = match next {
                    Some(Ok(stream)) => stream,
                    Some(Err(e)) => {
                        error!(error = %e, "Error accepting connection");
                        continue;
                    }
                    None => break,
                };

                let peer = match stream.peer_addr() {
                    Ok(peer) => peer,
                    Err(e) => {
                        warn!(error = %e, "Dropping connection without a peer address");
                        continue;
                    }
                };

                let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                    warn!(peer = %peer, "Connection limit reached, refusing connection");
                    continue;
                };

                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "Failed to disable Nagle");
                }

                let connection = Connection::new(stream, peer, Arc::clone(&state), shutdown.clone());
                tasks.spawn(async move {
                    // outcome is logged by the connection itself
                    let _ = connection.run().await;
                    drop(permit);
                });
            }
        }
    }

    tasks.close();
    if with_timeout(state.config().server.shutdown_timeout, tasks.wait()).await.is_err() {
        warn!(remaining = tasks.len(), "Shutdown timeout reached, abandoning connections");
    } else {
        info!("All connections closed, shutting down");
    }
    Ok(())
}

/// Bind the configured address and serve until CTRL+C.
pub async fn run_server(state: Arc<ServerState>) -> Result<SocketAddr> {
    let listener = TcpListener::bind(&state.config().server.address).await?;
    let address = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            signal.cancel();
        }
    });

    serve(listener, state, shutdown).await?;
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        ServerState::new(MoulaConfig::default()).unwrap()
    }

    #[test]
    fn test_dispatch_tables_built() {
        let state = state();
        for role in ConnectionRole::ALL {
            assert_eq!(state.dispatcher(role).role(), role);
            assert!(state.dispatcher(role).get(0).is_some(), "{role} has no ping");
        }
        assert!(state.dispatcher(ConnectionRole::Auth).get(0x7FFF).is_none());
    }

    #[test]
    fn test_kick_targets_not_found() {
        let state = state();
        assert!(matches!(state.kick(42), Err(ProtocolError::NotFound(_))));
        assert!(matches!(
            state.kick_address(IpAddr::from([10, 0, 0, 1])),
            Err(ProtocolError::NotFound(_))
        ));
        assert!(matches!(state.kick_account("nobody"), Err(ProtocolError::NotFound(_))));
        assert!(matches!(state.kick_avatar(7), Err(ProtocolError::NotFound(_))));
    }

    #[test]
    fn test_kick_account_matches_case_insensitively() {
        let state = state();
        let cancel = CancellationToken::new();
        state
            .registry()
            .register(
                ConnectionSummary {
                    token: state.registry().next_token(),
                    peer: SocketAddr::from(([127, 0, 0, 1], 5000)),
                    role: Some(ConnectionRole::Auth),
                    build_id: None,
                    account_name: Some("Explorer@Example.com".into()),
                    account_id: None,
                    ki_number: Some(31),
                    age_instance_id: None,
                },
                cancel.clone(),
            )
            .unwrap();

        assert_eq!(state.kick_account("explorer@example.com").unwrap(), 1);
        assert!(cancel.is_cancelled());
        assert_eq!(state.kick_avatar(31).unwrap(), 1);
    }

    #[test]
    fn test_status_and_log_level() {
        let state = state();
        assert_eq!(state.status_message(), MoulaConfig::default().shard.status_message);
        state.set_status_message("Maintenance at noon").unwrap();
        assert_eq!(state.status_message(), "Maintenance at noon");

        state.set_online(false);
        assert!(!state.is_online());

        assert_eq!(state.set_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(state.log_level(), Level::TRACE);
        assert!(matches!(state.set_log_level("loud"), Err(ProtocolError::NotFound(_))));
    }
}
