//! Listener, accept loop, and outbound routing (§4.4).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_compress::Compressor;
use courier_core::Container;
use courier_crypto::Crypto;
use courier_scheduler::Scheduler;
use courier_session::session::{Callbacks, SessionConfig};
use courier_session::{FrameCodes, Session, SessionKind};
use tokio::net::TcpListener;

use crate::error::{ServerError, ServerResult};
use crate::registry::SessionRegistry;

/// Server-wide configuration, negotiated into each accepted [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub server_id: String,
    pub connection_key: String,
    pub session_limit_count: usize,
    pub compress_mode: bool,
    pub encrypt_mode: bool,
    pub auto_echo: bool,
    pub auto_echo_interval_seconds: u16,
    pub frame_codes: FrameCodes,
}

/// Callbacks the server's owner wires up for application-level messages
/// and file/binary notifications arriving on any accepted session. These
/// are shared across every session the server accepts — a handler that
/// needs to reply looks the sending session back up in
/// [`Server::registry`] by the message's `source_id`/`source_sub_id`.
#[derive(Clone)]
pub struct ServerCallbacks {
    pub on_message: Arc<dyn Fn(Container) + Send + Sync>,
    pub on_file_saved: Arc<dyn Fn(courier_session::file_transfer::FileSaveNotification) + Send + Sync>,
    pub on_binary: Arc<dyn Fn(courier_session::binary::BinaryFrame) + Send + Sync>,
}

/// Binds a listener, wraps every accepted socket in a [`Session`], and
/// routes outbound containers by header (§4.4).
pub struct Server {
    config: ServerConfig,
    scheduler: Arc<dyn Scheduler>,
    compressor: Arc<dyn Compressor>,
    crypto: Arc<dyn Crypto>,
    callbacks: ServerCallbacks,
    registry: Arc<SessionRegistry>,
    stopped: AtomicBool,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        scheduler: Arc<dyn Scheduler>,
        compressor: Arc<dyn Compressor>,
        crypto: Arc<dyn Crypto>,
        callbacks: ServerCallbacks,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            scheduler,
            compressor,
            crypto,
            callbacks,
            registry: Arc::new(SessionRegistry::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Binds and runs the accept loop until [`Server::stop`] is called.
    /// Each accepted connection is handshaken concurrently so a slow or
    /// hostile peer cannot stall other connections.
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        tracing::info!(addr = %self.config.listen_addr, "server listening");

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            let (socket, peer_addr) = listener.accept().await?;

            if self.registry.len() >= self.config.session_limit_count {
                tracing::warn!(%peer_addr, limit = self.config.session_limit_count, "refusing connection: session limit reached");
                drop(socket);
                continue;
            }

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(error) = server.accept_one(socket).await {
                    tracing::warn!(%peer_addr, %error, "session handshake failed");
                }
            });
        }
    }

    async fn accept_one(self: Arc<Self>, socket: tokio::net::TcpStream) -> ServerResult<()> {
        let session_config = SessionConfig {
            source_id: self.config.server_id.clone(),
            source_sub_id: "0".into(),
            connection_key: self.config.connection_key.clone(),
            session_type: SessionKind::MessageLine,
            compress_mode: self.config.compress_mode,
            encrypt_mode: self.config.encrypt_mode,
            auto_echo: self.config.auto_echo,
            auto_echo_interval_seconds: self.config.auto_echo_interval_seconds,
            bridge_mode: false,
            snipping_targets: vec![],
            frame_codes: self.config.frame_codes,
        };

        let callbacks = Callbacks {
            on_connection: Arc::new(|_connected: bool| {
                // Registry insertion happens in `accept_one` after a
                // successful handshake; removal happens in the disconnect
                // sweep below. Nothing to do for either case here.
            }),
            on_message: self.callbacks.on_message.clone(),
            on_file_saved: self.callbacks.on_file_saved.clone(),
            on_binary: self.callbacks.on_binary.clone(),
        };

        let session = Session::accept(
            socket,
            &self.config.server_id,
            session_config,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.compressor),
            Arc::clone(&self.crypto),
            callbacks,
        )
        .await?;

        let key = (session.target_id(), session.target_sub_id());
        self.registry.insert(Arc::clone(&session));
        tracing::info!(target_id = %key.0, "session confirmed");

        let registry = Arc::clone(&self.registry);
        let watched = Arc::clone(&session);
        let removal_key = key.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                if watched.confirm_state() == courier_session::ConfirmState::Expired {
                    registry.remove(&removal_key);
                    tracing::info!(target_id = %removal_key.0, "session removed from registry");
                    return;
                }
            }
        });
        Ok(())
    }

    /// Routes `container` per §4.4: empty `target_id` broadcasts, empty
    /// `target_sub_id` fans out to every session with that `target_id`,
    /// otherwise the unique matching session. Sessions with `bridge_mode`
    /// set always receive the container in addition to any target match.
    pub async fn route(&self, container: Container) -> ServerResult<()> {
        let target_id = container.target_id();
        let target_sub_id = container.target_sub_id();

        let mut recipients = if target_id.is_empty() {
            self.registry.all()
        } else if target_sub_id.is_empty() {
            self.registry.all_with_target_id(&target_id)
        } else {
            self.registry
                .get(&(target_id.clone(), target_sub_id.clone()))
                .into_iter()
                .collect()
        };

        for bridge in self.registry.all_bridges() {
            if !recipients.iter().any(|s| Arc::ptr_eq(s, &bridge)) {
                recipients.push(bridge);
            }
        }

        if recipients.is_empty() {
            return Err(ServerError::NoMatchingSession { target_id, target_sub_id });
        }

        for session in recipients {
            let copy = container.copy(true)?;
            session.send(copy).await?;
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
