//! The TCP session: handshake state machine plus the packet/file/binary
//! send and receive pipelines (§4.3).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use courier_compress::Compressor;
use courier_core::{Container, Value};
use courier_crypto::{Crypto, Iv, Key};
use courier_scheduler::{Priority, Scheduler};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::Duration;

use crate::binary::BinaryFrame;
use crate::error::{SessionError, SessionResult};
use crate::file_transfer::{FileRecord, FileSaveNotification};
use crate::frame::{Frame, FrameCodes, Mode};
use crate::handshake::{self, ConnectionConfirm, ConnectionRequest, SessionKind};
use crate::pipeline;

/// `{waiting, confirmed, expired}` (§3.3), one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    Waiting,
    Confirmed,
    Expired,
}

/// Static, per-session configuration fixed at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub source_id: String,
    pub source_sub_id: String,
    pub connection_key: String,
    pub session_type: SessionKind,
    pub compress_mode: bool,
    pub encrypt_mode: bool,
    pub auto_echo: bool,
    pub auto_echo_interval_seconds: u16,
    pub bridge_mode: bool,
    pub snipping_targets: Vec<String>,
    pub frame_codes: FrameCodes,
}

/// Callbacks a session delivers to its owner. Mirrors the source's
/// `connection`/`received_message`/`received_file`/`received_data`
/// notification functions (§4.3/§6.3), expressed as boxed closures instead
/// of a virtual base class.
#[derive(Clone)]
pub struct Callbacks {
    pub on_connection: Arc<dyn Fn(bool) + Send + Sync>,
    pub on_message: Arc<dyn Fn(Container) + Send + Sync>,
    pub on_file_saved: Arc<dyn Fn(FileSaveNotification) + Send + Sync>,
    pub on_binary: Arc<dyn Fn(BinaryFrame) + Send + Sync>,
}

struct SessionState {
    confirm_state: ConfirmState,
    compress_mode: bool,
    encrypt_mode: bool,
    key: Option<Key>,
    iv: Option<Iv>,
    target_id: String,
    target_sub_id: String,
    snipping_targets: Vec<String>,
    disconnect_notified: bool,
}

/// One TCP peer (§3.3). Always held behind an `Arc` — the read loop and
/// echo loop both hold a clone so they can call back into `send`.
pub struct Session {
    writer: Arc<AsyncMutex<WriteHalf<TcpStream>>>,
    state: RwLock<SessionState>,
    config: SessionConfig,
    scheduler: Arc<dyn Scheduler>,
    compressor: Arc<dyn Compressor>,
    crypto: Arc<dyn Crypto>,
    callbacks: Callbacks,
    stopped: AtomicBool,
}

impl Session {
    /// Client side of the handshake (§4.3.2): connects, sends
    /// `request_connection`, and blocks for `confirm_connection` before
    /// returning. On success the read loop and (if configured) the echo
    /// loop are already running.
    pub async fn connect(
        addr: SocketAddr,
        config: SessionConfig,
        scheduler: Arc<dyn Scheduler>,
        compressor: Arc<dyn Compressor>,
        crypto: Arc<dyn Crypto>,
        callbacks: Callbacks,
    ) -> SessionResult<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = tokio::io::split(stream);

        let session = Arc::new(Session {
            writer: Arc::new(AsyncMutex::new(write_half)),
            state: RwLock::new(SessionState {
                confirm_state: ConfirmState::Waiting,
                compress_mode: config.compress_mode,
                encrypt_mode: config.encrypt_mode,
                key: None,
                iv: None,
                target_id: String::new(),
                target_sub_id: String::new(),
                snipping_targets: config.snipping_targets.clone(),
                disconnect_notified: false,
            }),
            scheduler,
            compressor,
            crypto,
            callbacks,
            stopped: AtomicBool::new(false),
            config,
        });

        let request = ConnectionRequest {
            source_id: session.config.source_id.clone(),
            source_sub_id: session.config.source_sub_id.clone(),
            connection_key: session.config.connection_key.clone(),
            auto_echo: session.config.auto_echo,
            auto_echo_interval_seconds: session.config.auto_echo_interval_seconds,
            session_type: session.config.session_type,
            bridge_mode: session.config.bridge_mode,
            snipping_targets: session.config.snipping_targets.clone(),
        }
        .into_container();
        session.write_handshake_frame(&request).await?;

        let frame = Frame::read(&mut read_half, &session.config.frame_codes).await?;
        if frame.mode != Mode::Packet {
            return Err(SessionError::Framing("expected packet-mode confirm_connection".into()));
        }
        let reply = Container::from_bytes(&frame.payload, false)?;
        if reply.message_type() != handshake::message_type::CONFIRM_CONNECTION {
            return Err(SessionError::HandshakeRejected(
                "peer did not reply with confirm_connection".into(),
            ));
        }
        let confirm = ConnectionConfirm::from_container(&reply)?;
        if !confirm.confirm {
            (session.callbacks.on_connection)(false);
            return Err(SessionError::HandshakeRejected(
                confirm.reason.unwrap_or_else(|| "connection rejected".into()),
            ));
        }

        {
            let mut state = session.state.write().expect("session lock poisoned");
            state.confirm_state = ConfirmState::Confirmed;
            state.encrypt_mode = confirm.encrypt_mode;
            state.key = confirm.key;
            state.iv = confirm.iv;
            state.target_id = reply.source_id();
            state.target_sub_id = reply.source_sub_id();
            if !confirm.snipping_targets.is_empty() {
                state.snipping_targets = confirm.snipping_targets;
            }
        }
        (session.callbacks.on_connection)(true);

        Arc::clone(&session).spawn_read_loop(read_half);
        if session.config.auto_echo {
            Arc::clone(&session).spawn_echo_loop();
        }

        Ok(session)
    }

    /// Server side of the handshake (§4.3.2): reads `request_connection`
    /// off `stream`, verifies `connection_key` and that the peer did not
    /// reuse `server_id`, and replies.
    pub async fn accept(
        stream: TcpStream,
        server_id: &str,
        config: SessionConfig,
        scheduler: Arc<dyn Scheduler>,
        compressor: Arc<dyn Compressor>,
        crypto: Arc<dyn Crypto>,
        callbacks: Callbacks,
    ) -> SessionResult<Arc<Self>> {
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = tokio::io::split(stream);

        let frame = Frame::read(&mut read_half, &config.frame_codes).await?;
        if frame.mode != Mode::Packet {
            return Err(SessionError::Framing("expected packet-mode request_connection".into()));
        }
        let request_container = Container::from_bytes(&frame.payload, false)?;
        if request_container.message_type() != handshake::message_type::REQUEST_CONNECTION {
            return Err(SessionError::HandshakeRejected("expected request_connection".into()));
        }
        let request = ConnectionRequest::from_container(&request_container)?;

        let session = Arc::new(Session {
            writer: Arc::new(AsyncMutex::new(write_half)),
            state: RwLock::new(SessionState {
                confirm_state: ConfirmState::Waiting,
                compress_mode: config.compress_mode,
                encrypt_mode: config.encrypt_mode,
                key: None,
                iv: None,
                target_id: request.source_id.clone(),
                target_sub_id: request.source_sub_id.clone(),
                snipping_targets: request.snipping_targets.clone(),
                disconnect_notified: false,
            }),
            scheduler,
            compressor,
            crypto,
            callbacks,
            stopped: AtomicBool::new(false),
            config,
        });

        if request.connection_key != session.config.connection_key {
            let reply = ConnectionConfirm::rejected("unknown connection key").into_container();
            let _ = session.write_handshake_frame(&reply).await;
            (session.callbacks.on_connection)(false);
            return Err(SessionError::HandshakeRejected("unknown connection key".into()));
        }
        if request.source_id == server_id {
            let reply = ConnectionConfirm::rejected("cannot use same id with server").into_container();
            let _ = session.write_handshake_frame(&reply).await;
            (session.callbacks.on_connection)(false);
            return Err(SessionError::HandshakeRejected(
                "cannot use same id with server".into(),
            ));
        }

        let (key, iv) = if session.config.encrypt_mode {
            let (k, i) = session.crypto.create_key()?;
            (Some(k), Some(i))
        } else {
            (None, None)
        };
        {
            let mut state = session.state.write().expect("session lock poisoned");
            state.confirm_state = ConfirmState::Confirmed;
            state.key = key;
            state.iv = iv;
        }

        let reply = ConnectionConfirm::accepted(session.config.encrypt_mode, key, iv, session.config.snipping_targets.clone())
            .into_container();
        reply.set_source(session.config.source_id.clone(), session.config.source_sub_id.clone());
        session.write_handshake_frame(&reply).await?;
        (session.callbacks.on_connection)(true);

        Arc::clone(&session).spawn_read_loop(read_half);
        if session.config.auto_echo {
            Arc::clone(&session).spawn_echo_loop();
        }

        Ok(session)
    }

    pub fn confirm_state(&self) -> ConfirmState {
        self.state.read().expect("session lock poisoned").confirm_state
    }

    pub fn target_id(&self) -> String {
        self.state.read().expect("session lock poisoned").target_id.clone()
    }

    pub fn target_sub_id(&self) -> String {
        self.state.read().expect("session lock poisoned").target_sub_id.clone()
    }

    /// This session's own identity, as set in its [`SessionConfig`] (not
    /// the peer's — see [`Session::target_id`] for that).
    pub fn source_id(&self) -> &str {
        &self.config.source_id
    }

    /// This session's own sub-identity, as set in its [`SessionConfig`].
    pub fn source_sub_id(&self) -> &str {
        &self.config.source_sub_id
    }

    pub fn session_type(&self) -> SessionKind {
        self.config.session_type
    }

    pub fn bridge_mode(&self) -> bool {
        self.config.bridge_mode
    }

    pub fn snipping_targets(&self) -> Vec<String> {
        self.state.read().expect("session lock poisoned").snipping_targets.clone()
    }

    /// Sends a container through the packet pipeline (§4.3.3). A no-op on a
    /// binary-line session, matching §4.3.6 ("any attempt returns without
    /// transmitting") rather than an error — binary sessions simply do not
    /// carry this traffic.
    pub async fn send(&self, container: Container) -> SessionResult<()> {
        if self.config.session_type == SessionKind::BinaryLine {
            return Ok(());
        }
        if self.confirm_state() != ConfirmState::Confirmed {
            return Err(SessionError::NotConfirmed);
        }
        if container.source_id().is_empty() {
            container.set_source(self.config.source_id.clone(), self.config.source_sub_id.clone());
        }
        let bytes = container.serialize_array();
        let (compress_mode, encrypt_mode, key, iv) = self.crypto_state();
        let payload = pipeline::compress_then_encrypt(
            &self.scheduler,
            &self.compressor,
            &self.crypto,
            compress_mode,
            encrypt_mode,
            key,
            iv,
            bytes,
        )
        .await?;
        self.write_frame(Mode::Packet, payload).await
    }

    /// Sends a whole-file transfer record (§4.3.5). Not restricted to
    /// file-line sessions: the control-plane `request_files` handler calls
    /// this from a message-line session.
    pub async fn send_file(&self, record: FileRecord) -> SessionResult<()> {
        if self.confirm_state() != ConfirmState::Confirmed {
            return Err(SessionError::NotConfirmed);
        }
        let (compress_mode, encrypt_mode, key, iv) = self.crypto_state();
        let payload = pipeline::compress_then_encrypt(
            &self.scheduler,
            &self.compressor,
            &self.crypto,
            compress_mode,
            encrypt_mode,
            key,
            iv,
            record.encode(),
        )
        .await?;
        self.write_frame(Mode::File, payload).await
    }

    /// Sends an opaque binary frame (§4.3.6). Binary frames bypass the
    /// compress/encrypt pipeline entirely and are delivered verbatim.
    pub async fn send_binary(&self, frame: BinaryFrame) -> SessionResult<()> {
        if self.config.session_type != SessionKind::BinaryLine {
            return Err(SessionError::WrongSessionType);
        }
        if self.confirm_state() != ConfirmState::Confirmed {
            return Err(SessionError::NotConfirmed);
        }
        self.write_frame(Mode::Binary, frame.encode()).await
    }

    /// Shuts the scheduler's view of this session down: stops the echo
    /// loop and read loop from doing further work, and half-closes the
    /// write side of the socket.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        {
            let mut state = self.state.write().expect("session lock poisoned");
            state.confirm_state = ConfirmState::Expired;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn crypto_state(&self) -> (bool, bool, Option<Key>, Option<Iv>) {
        let state = self.state.read().expect("session lock poisoned");
        (state.compress_mode, state.encrypt_mode, state.key, state.iv)
    }

    /// Handshake frames are sent in plaintext, before any key exists —
    /// they bypass `write_frame`'s scheduler round trip since there is no
    /// compress/encrypt work to schedule yet.
    async fn write_handshake_frame(&self, container: &Container) -> SessionResult<()> {
        let frame = Frame::new(Mode::Packet, container.serialize_array());
        let mut writer = self.writer.lock().await;
        frame.write(&mut *writer, &self.config.frame_codes).await
    }

    /// Submits the frame write itself to the scheduler's single `Top`
    /// worker (§4.3.3 step 5; §5's per-frame ordering guarantee), bridging
    /// back into the async socket write via the current Tokio runtime
    /// handle.
    async fn write_frame(&self, mode: Mode, payload: Vec<u8>) -> SessionResult<()> {
        let frame = Frame::new(mode, payload);
        let codes = self.config.frame_codes;
        let writer = Arc::clone(&self.writer);
        let handle = tokio::runtime::Handle::current();
        let (tx, rx) = oneshot::channel();
        self.scheduler.submit(
            Priority::Top,
            Box::new(move || {
                let result = handle.block_on(async move {
                    let mut writer = writer.lock().await;
                    frame.write(&mut *writer, &codes).await
                });
                let _ = tx.send(result);
            }),
        )?;
        rx.await.map_err(|_| SessionError::Framing("top-priority send job dropped".into()))?
    }

    fn spawn_read_loop(self: Arc<Self>, mut reader: ReadHalf<TcpStream>) {
        tokio::spawn(async move {
            loop {
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let frame = match Frame::read(&mut reader, &self.config.frame_codes).await {
                    Ok(frame) => frame,
                    Err(error) => {
                        tracing::debug!(%error, "session read loop ending");
                        self.mark_disconnected();
                        return;
                    }
                };
                let session = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(error) = session.handle_frame(frame).await {
                        tracing::warn!(%error, "failed to handle inbound frame");
                    }
                });
            }
        });
    }

    fn spawn_echo_loop(self: Arc<Self>) {
        if self.config.auto_echo_interval_seconds == 0 {
            return;
        }
        let period = Duration::from_secs(self.config.auto_echo_interval_seconds as u64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(error) = self.send(handshake::echo_probe()).await {
                    tracing::debug!(%error, "auto-echo send failed");
                }
            }
        });
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.write().expect("session lock poisoned");
        state.confirm_state = ConfirmState::Expired;
        if !state.disconnect_notified {
            state.disconnect_notified = true;
            drop(state);
            (self.callbacks.on_connection)(false);
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame) -> SessionResult<()> {
        match frame.mode {
            Mode::Packet => self.handle_packet_frame(frame.payload).await,
            Mode::File => self.handle_file_frame(frame.payload).await,
            Mode::Binary => self.handle_binary_frame(frame.payload),
        }
    }

    async fn handle_packet_frame(self: &Arc<Self>, payload: Vec<u8>) -> SessionResult<()> {
        let (compress_mode, encrypt_mode, key, iv) = self.crypto_state();
        let bytes = pipeline::decrypt_then_decompress(
            &self.scheduler,
            &self.compressor,
            &self.crypto,
            compress_mode,
            encrypt_mode,
            key,
            iv,
            payload,
        )
        .await?;
        let container = pipeline::parse_container(&self.scheduler, bytes).await?;
        self.dispatch_container(container).await
    }

    async fn dispatch_container(self: &Arc<Self>, container: Container) -> SessionResult<()> {
        match container.message_type().as_str() {
            handshake::message_type::ECHO => self.handle_echo(container).await,
            handshake::message_type::REQUEST_FILES => self.handle_request_files(container).await,
            handshake::message_type::CONFIRM_CONNECTION | handshake::message_type::REQUEST_CONNECTION => {
                tracing::trace!("ignoring handshake message received after handshake completed");
                Ok(())
            }
            _ => {
                if self.confirm_state() == ConfirmState::Confirmed {
                    (self.callbacks.on_message)(container);
                }
                Ok(())
            }
        }
    }

    /// §4.3.7: a probe gets a header-swapped reply with `response=true`; a
    /// reply (`response=true`) is logged and dropped, no retry.
    async fn handle_echo(self: &Arc<Self>, container: Container) -> SessionResult<()> {
        if !handshake::is_echo_probe(&container) {
            tracing::debug!("received echo reply, no retry tracking needed");
            return Ok(());
        }
        container.remove("response")?;
        container.add(Value::bool("response", true))?;
        container.swap_header();
        self.send(container).await
    }

    /// §4.3.4 step 4 / §6.3: loads each requested source file and sends it
    /// through the file pipeline, in the order the pairs were listed (§8
    /// property 9).
    async fn handle_request_files(self: &Arc<Self>, container: Container) -> SessionResult<()> {
        let units = container.units()?;
        let indication_id = units
            .iter()
            .find(|v| v.name() == "indication_id")
            .map(|v| v.to_canonical_string())
            .unwrap_or_default();
        let Some(pairs) = units.iter().find(|v| v.name() == "pairs") else {
            return Ok(());
        };

        for pair in pairs.children() {
            let source_path = pair
                .children()
                .iter()
                .find(|v| v.name() == "source")
                .map(|v| v.to_canonical_string())
                .unwrap_or_default();
            let target_path = pair
                .children()
                .iter()
                .find(|v| v.name() == "target")
                .map(|v| v.to_canonical_string())
                .unwrap_or_default();

            let file_bytes = match tokio::fs::read(&source_path).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::warn!(%error, source_path, "request_files: failed to load source file");
                    continue;
                }
            };

            let record = FileRecord {
                indication_id: indication_id.clone(),
                source_id: self.config.source_id.clone(),
                source_sub_id: self.config.source_sub_id.clone(),
                target_id: self.target_id(),
                target_sub_id: self.target_sub_id(),
                source_path,
                target_path,
                file_bytes,
            };
            self.send_file(record).await?;
        }
        Ok(())
    }

    async fn handle_file_frame(self: &Arc<Self>, payload: Vec<u8>) -> SessionResult<()> {
        let (compress_mode, encrypt_mode, key, iv) = self.crypto_state();
        let bytes = pipeline::decrypt_then_decompress(
            &self.scheduler,
            &self.compressor,
            &self.crypto,
            compress_mode,
            encrypt_mode,
            key,
            iv,
            payload,
        )
        .await?;
        let record = FileRecord::decode(&bytes)?;

        let saved_path = match write_file_creating_parents(&record.target_path, &record.file_bytes).await {
            Ok(()) => record.target_path.clone(),
            Err(error) => {
                tracing::warn!(%error, target_path = record.target_path, "failed to save incoming file");
                String::new()
            }
        };

        (self.callbacks.on_file_saved)(FileSaveNotification {
            indication_id: record.indication_id,
            target_id: record.target_id,
            target_sub_id: record.target_sub_id,
            saved_path,
        });
        Ok(())
    }

    fn handle_binary_frame(&self, payload: Vec<u8>) -> SessionResult<()> {
        let frame = BinaryFrame::decode(&payload)?;
        (self.callbacks.on_binary)(frame);
        Ok(())
    }
}

async fn write_file_creating_parents(path: &str, bytes: &[u8]) -> std::io::Result<()> {
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, bytes).await
}
