//! The middle-tier bridge: a downstream [`Server`] for local clients plus
//! two upstream [`Session`]s (`data_line`, `file_line`) to the main server,
//! grounded directly on
//! `examples/original_source/micro_services/file_managing/middle_server/
//! middle_server.cpp` (§4.5).

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use courier_compress::Compressor;
use courier_core::{Container, Value};
use courier_crypto::Crypto;
use courier_scheduler::Scheduler;
use courier_server::{Server, ServerCallbacks, ServerConfig};
use courier_session::file_transfer::FileSaveNotification;
use courier_session::session::{Callbacks, Session, SessionConfig};
use courier_session::{FrameCodes, SessionKind};
use tokio::sync::RwLock as AsyncRwLock;

use crate::error::{BridgeError, BridgeResult};
use crate::file_manager::FileManager;

const DOWNLOAD_FILES: &str = "download_files";
const UPLOAD_FILES: &str = "upload_files";
const UPLOADED_FILE: &str = "uploaded_file";
const REQUEST_FILES: &str = "request_files";
const TRANSFER_CONDITION: &str = "transfer_condition";
const NOT_CONNECTED_REASON: &str = "main_server has not been connected.";

/// Bridge-wide configuration: the downstream listener plus the upstream
/// main server the bridge forwards to.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_addr: SocketAddr,
    pub downstream_connection_key: String,
    pub downstream_session_limit_count: usize,
    pub upstream_addr: SocketAddr,
    pub upstream_connection_key: String,
    pub bridge_id: String,
    pub compress_mode: bool,
    pub encrypt_mode: bool,
    pub frame_codes: FrameCodes,
}

type SessionCell = Arc<AsyncRwLock<Option<Arc<Session>>>>;

/// Holds the downstream server and the two upstream lines, and wires the
/// forwarding table between them.
pub struct Bridge {
    downstream: Arc<Server>,
    data_line: SessionCell,
    file_line: SessionCell,
    file_manager: Arc<FileManager>,
}

impl Bridge {
    /// Starts the downstream listener and the two upstream connections
    /// (§4.5). Returns once the downstream server is accepting and the
    /// first connection attempt to each upstream line has been made; a
    /// line that is not yet confirmed is retried in the background (see
    /// [`run_upstream_session_loop`]) and, until confirmed, downstream
    /// requests that need it receive the synthesized
    /// `"main_server has not been connected."` reply the source emits.
    pub async fn start(
        config: BridgeConfig,
        scheduler: Arc<dyn Scheduler>,
        compressor: Arc<dyn Compressor>,
        crypto: Arc<dyn Crypto>,
    ) -> BridgeResult<Arc<Self>> {
        let file_manager = Arc::new(FileManager::new());
        let downstream_cell: Arc<OnceLock<Arc<Server>>> = Arc::new(OnceLock::new());
        let data_line: SessionCell = Arc::new(AsyncRwLock::new(None));
        let file_line: SessionCell = Arc::new(AsyncRwLock::new(None));

        let server_callbacks = {
            let downstream_cell = Arc::clone(&downstream_cell);
            let data_line = Arc::clone(&data_line);
            let file_line = Arc::clone(&file_line);
            let file_manager = Arc::clone(&file_manager);
            ServerCallbacks {
                on_message: Arc::new(move |container: Container| {
                    let downstream_cell = Arc::clone(&downstream_cell);
                    let data_line = Arc::clone(&data_line);
                    let file_line = Arc::clone(&file_line);
                    let file_manager = Arc::clone(&file_manager);
                    tokio::spawn(async move {
                        if let Err(error) =
                            handle_downstream_message(container, &downstream_cell, &data_line, &file_line, &file_manager).await
                        {
                            tracing::warn!(%error, "bridge: failed to handle downstream message");
                        }
                    });
                }),
                on_file_saved: Arc::new(|_| {}),
                on_binary: Arc::new(|_| {}),
            }
        };

        let downstream = Server::new(
            ServerConfig {
                listen_addr: config.listen_addr,
                server_id: config.bridge_id.clone(),
                connection_key: config.downstream_connection_key.clone(),
                session_limit_count: config.downstream_session_limit_count,
                compress_mode: config.compress_mode,
                encrypt_mode: config.encrypt_mode,
                auto_echo: false,
                auto_echo_interval_seconds: 0,
                frame_codes: config.frame_codes,
            },
            Arc::clone(&scheduler),
            Arc::clone(&compressor),
            Arc::clone(&crypto),
            server_callbacks,
        );
        downstream_cell.set(Arc::clone(&downstream)).ok();

        let run_downstream = Arc::clone(&downstream);
        tokio::spawn(async move {
            if let Err(error) = run_downstream.run().await {
                tracing::warn!(%error, "bridge: downstream server stopped");
            }
        });

        let data_line_config = SessionConfig {
            source_id: format!("{}-data", config.bridge_id),
            source_sub_id: "0".into(),
            connection_key: config.upstream_connection_key.clone(),
            session_type: SessionKind::MessageLine,
            compress_mode: config.compress_mode,
            encrypt_mode: config.encrypt_mode,
            auto_echo: false,
            auto_echo_interval_seconds: 0,
            bridge_mode: true,
            snipping_targets: vec![],
            frame_codes: config.frame_codes,
        };
        let data_line_downstream = Arc::clone(&downstream_cell);
        tokio::spawn(run_upstream_session_loop(
            config.upstream_addr,
            data_line_config,
            Arc::clone(&scheduler),
            Arc::clone(&compressor),
            Arc::clone(&crypto),
            Arc::clone(&data_line),
            Arc::new(move |container: Container| {
                let downstream = Arc::clone(&data_line_downstream);
                tokio::spawn(async move {
                    if let Some(server) = downstream.get() {
                        if let Err(error) = server.route(container).await {
                            tracing::debug!(%error, "bridge: no downstream session for data_line message");
                        }
                    }
                });
            }),
            Arc::new(|_| {}),
        ));

        let file_line_config = SessionConfig {
            source_id: format!("{}-file", config.bridge_id),
            source_sub_id: "0".into(),
            connection_key: config.upstream_connection_key.clone(),
            session_type: SessionKind::FileLine,
            compress_mode: config.compress_mode,
            encrypt_mode: config.encrypt_mode,
            auto_echo: false,
            auto_echo_interval_seconds: 0,
            bridge_mode: true,
            snipping_targets: vec![],
            frame_codes: config.frame_codes,
        };
        let file_line_downstream = Arc::clone(&downstream_cell);
        let file_line_manager = Arc::clone(&file_manager);
        let file_line_manager_for_saves = Arc::clone(&file_manager);
        let file_line_downstream_for_saves = Arc::clone(&downstream_cell);
        tokio::spawn(run_upstream_session_loop(
            config.upstream_addr,
            file_line_config,
            Arc::clone(&scheduler),
            Arc::clone(&compressor),
            Arc::clone(&crypto),
            Arc::clone(&file_line),
            Arc::new(move |container: Container| {
                let downstream = Arc::clone(&file_line_downstream);
                let file_manager = Arc::clone(&file_line_manager);
                tokio::spawn(async move {
                    handle_file_line_message(container, &downstream, &file_manager).await;
                });
            }),
            Arc::new(move |notification: FileSaveNotification| {
                let downstream = Arc::clone(&file_line_downstream_for_saves);
                let file_manager = Arc::clone(&file_line_manager_for_saves);
                tokio::spawn(async move {
                    if let Some(report) = file_manager.received(&notification.indication_id, &notification.saved_path) {
                        if let Some(server) = downstream.get() {
                            let _ = server.route(report).await;
                        }
                    }
                });
            }),
        ));

        Ok(Arc::new(Self {
            downstream,
            data_line,
            file_line,
            file_manager,
        }))
    }

    /// The downstream server, exposed so a caller can inspect its registry
    /// or call [`Server::stop`].
    pub fn downstream(&self) -> &Arc<Server> {
        &self.downstream
    }

    /// The file-transfer progress tracker.
    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.file_manager
    }
}

/// Keeps one upstream line connected: connects, waits for the session to
/// report a disconnect through `on_connection(false)`, then retries after a
/// short delay — mirroring the source's `connection_from_data_line`/
/// `connection_from_file_line` handlers, which re-`start()` their client
/// one second after a disconnect notification.
async fn run_upstream_session_loop(
    addr: SocketAddr,
    config: SessionConfig,
    scheduler: Arc<dyn Scheduler>,
    compressor: Arc<dyn Compressor>,
    crypto: Arc<dyn Crypto>,
    cell: SessionCell,
    on_message: Arc<dyn Fn(Container) + Send + Sync>,
    on_file_saved: Arc<dyn Fn(FileSaveNotification) + Send + Sync>,
) {
    loop {
        let (disconnect_tx, disconnect_rx) = tokio::sync::oneshot::channel();
        let disconnect_tx = std::sync::Mutex::new(Some(disconnect_tx));
        let callbacks = Callbacks {
            on_connection: Arc::new(move |connected: bool| {
                if !connected {
                    if let Some(tx) = disconnect_tx.lock().expect("poisoned").take() {
                        let _ = tx.send(());
                    }
                }
            }),
            on_message: Arc::clone(&on_message),
            on_file_saved: Arc::clone(&on_file_saved),
            on_binary: Arc::new(|_| {}),
        };

        match Session::connect(addr, config.clone(), Arc::clone(&scheduler), Arc::clone(&compressor), Arc::clone(&crypto), callbacks).await {
            Ok(session) => {
                tracing::info!(source_id = %config.source_id, "bridge: upstream line connected");
                *cell.write().await = Some(session);
                let _ = disconnect_rx.await;
                *cell.write().await = None;
                tracing::info!(source_id = %config.source_id, "bridge: upstream line disconnected, retrying");
            }
            Err(error) => {
                tracing::debug!(%error, source_id = %config.source_id, "bridge: upstream connect failed, retrying");
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

/// Builds the `swap_header` + `error=true` reply the source sends back
/// downstream when an upstream line is not yet confirmed.
fn not_connected_reply(container: &Container) -> BridgeResult<Container> {
    let reply = container.copy(false)?;
    reply.swap_header();
    reply.add(Value::bool("error", true))?;
    reply.add(Value::string("reason", NOT_CONNECTED_REASON))?;
    Ok(reply)
}

/// Dispatch table for a message arriving on the downstream server
/// (§4.5): `download_files`/`upload_files` are handled locally against the
/// `file_line`; everything else forwards to `data_line` unchanged.
async fn handle_downstream_message(
    container: Container,
    downstream_cell: &OnceLock<Arc<Server>>,
    data_line: &SessionCell,
    file_line: &SessionCell,
    file_manager: &Arc<FileManager>,
) -> BridgeResult<()> {
    match container.message_type().as_str() {
        DOWNLOAD_FILES => handle_download_files(container, downstream_cell, file_line, file_manager).await,
        UPLOAD_FILES => handle_upload_files(container, downstream_cell, file_line).await,
        _ => {
            let line = data_line.read().await.clone();
            match line {
                Some(session) if session.confirm_state() == courier_session::ConfirmState::Confirmed => {
                    session.send(container).await?;
                    Ok(())
                }
                _ => {
                    if let Some(server) = downstream_cell.get() {
                        server.route(not_connected_reply(&container)?).await?;
                    }
                    Ok(())
                }
            }
        }
    }
}

/// A message arriving on `file_line`: `uploaded_file` updates the file
/// manager and routes its progress report downstream; everything else
/// (e.g. a plain reply to a forwarded request) routes downstream as-is.
async fn handle_file_line_message(container: Container, downstream_cell: &OnceLock<Arc<Server>>, file_manager: &Arc<FileManager>) {
    let routed = if container.message_type() == UPLOADED_FILE {
        let indication_id = container.get_value("indication_id", 0).to_canonical_string();
        let target_path = container.get_value("target_path", 0).to_canonical_string();
        file_manager.received(&indication_id, &target_path)
    } else {
        Some(container)
    };

    if let Some(report) = routed {
        if let Some(server) = downstream_cell.get() {
            let _ = server.route(report).await;
        }
    }
}

/// Reads the `indication_id`/`pairs` shape `courier_session`'s
/// `request_files` handler expects, registers the expected count with the
/// file manager, reports the initial 0% progress downstream, and forwards
/// the request to `file_line` with its `message_type` rewritten to
/// `request_files`.
async fn handle_download_files(
    container: Container,
    downstream_cell: &OnceLock<Arc<Server>>,
    file_line: &SessionCell,
    file_manager: &Arc<FileManager>,
) -> BridgeResult<()> {
    let line = file_line.read().await.clone();
    let Some(session) = line.filter(|s| s.confirm_state() == courier_session::ConfirmState::Confirmed) else {
        if let Some(server) = downstream_cell.get() {
            server.route(not_connected_reply(&container)?).await?;
        }
        return Ok(());
    };

    let units = container.units()?;
    let indication_id = units
        .iter()
        .find(|v| v.name() == "indication_id")
        .map(|v| v.to_canonical_string())
        .unwrap_or_default();
    let pair_count = units.iter().find(|v| v.name() == "pairs").map(|v| v.children().len()).unwrap_or(0);

    file_manager.set(indication_id.clone(), container.source_id(), container.source_sub_id(), pair_count);

    if let Some(server) = downstream_cell.get() {
        server
            .route(Container::addressed(
                "",
                "",
                container.source_id(),
                container.source_sub_id(),
                TRANSFER_CONDITION,
                vec![Value::string("indication_id", indication_id), Value::ushort("percentage", 0)],
            ))
            .await?;
    }

    let forwarded = container.copy(true)?;
    forwarded.set_message_type(REQUEST_FILES);
    session.send(forwarded).await?;
    Ok(())
}

/// Stamps the original requester into `gateway_source_id`/
/// `gateway_source_sub_id`, re-addresses the container as coming from
/// `file_line` itself, and forwards it — matching the source's
/// `upload_files` handler, which lets the main server reply to the
/// bridge's own identity while the bridge still knows who to route the
/// eventual reply back to.
async fn handle_upload_files(container: Container, downstream_cell: &OnceLock<Arc<Server>>, file_line: &SessionCell) -> BridgeResult<()> {
    let line = file_line.read().await.clone();
    let Some(session) = line.filter(|s| s.confirm_state() == courier_session::ConfirmState::Confirmed) else {
        if let Some(server) = downstream_cell.get() {
            server.route(not_connected_reply(&container)?).await?;
        }
        return Ok(());
    };

    container.add(Value::string("gateway_source_id", container.source_id()))?;
    container.add(Value::string("gateway_source_sub_id", container.source_sub_id()))?;
    container.set_source(session.source_id().to_string(), session.source_sub_id().to_string());
    session.send(container).await?;
    Ok(())
}
