//! Hostile/malformed input at the transport and handshake layers. These
//! drive a real `TcpStream` rather than the session API, so they exercise
//! `Frame::read`'s resync and the server's handshake rejection end to end.

use std::sync::Arc;
use std::time::Duration;

use courier_compress::{Compressor, DeflateCompressor};
use courier_core::Container;
use courier_crypto::{AesGcmCrypto, Crypto};
use courier_scheduler::{Scheduler, WorkerPool, WorkerPoolConfig};
use courier_server::{Server, ServerCallbacks, ServerConfig};
use courier_session::frame::{Frame, FrameCodes, Mode};
use courier_session::handshake::{message_type, ConnectionConfirm, ConnectionRequest};
use courier_session::session::{Callbacks, Session, SessionConfig};
use courier_session::SessionKind;
use tokio::net::{TcpListener, TcpStream};

fn scheduler() -> Arc<dyn Scheduler> {
    Arc::new(WorkerPool::new(WorkerPoolConfig {
        worker_count: 2,
        queue_capacity: 256,
    }))
}

fn compressor() -> Arc<dyn Compressor> {
    Arc::new(DeflateCompressor)
}

fn crypto() -> Arc<dyn Crypto> {
    Arc::new(AesGcmCrypto)
}

async fn start_server(connection_key: &str) -> (Arc<Server>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: connection_key.into(),
            session_limit_count: 8,
            compress_mode: false,
            encrypt_mode: false,
            auto_echo: false,
            auto_echo_interval_seconds: 0,
            frame_codes: FrameCodes::default(),
        },
        scheduler(),
        compressor(),
        crypto(),
        ServerCallbacks {
            on_message: Arc::new(|_| {}),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        },
    );
    tokio::spawn(Arc::clone(&server).run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    (server, addr)
}

/// A hostile peer that writes random junk before a well-formed
/// `request_connection` frame still gets a handshake: the reader
/// resynchronizes on the next valid start code rather than erroring out
/// on the first corrupt byte.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn garbage_prefix_on_the_wire_does_not_prevent_a_handshake() {
    let (_server, addr) = start_server("hardening-secret").await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.set_nodelay(true).ok();

    // 37 bytes of noise that never happens to contain the real start code.
    let junk = vec![0xAAu8; 37];
    tokio::io::AsyncWriteExt::write_all(&mut socket, &junk).await.unwrap();

    let request = ConnectionRequest {
        source_id: "raw-client".into(),
        source_sub_id: "0".into(),
        connection_key: "hardening-secret".into(),
        auto_echo: false,
        auto_echo_interval_seconds: 0,
        session_type: SessionKind::MessageLine,
        bridge_mode: false,
        snipping_targets: vec![],
    };
    let frame = Frame::new(Mode::Packet, request.into_container().serialize_array());
    let codes = FrameCodes::default();
    frame.write(&mut socket, &codes).await.unwrap();

    let reply = Frame::read(&mut socket, &codes).await.unwrap();
    let reply_container = Container::from_bytes(&reply.payload, false).unwrap();
    assert_eq!(reply_container.message_type(), message_type::CONFIRM_CONNECTION);
    let confirm = ConnectionConfirm::from_container(&reply_container).unwrap();
    assert!(confirm.confirm, "expected the handshake to be accepted");
}

/// A `request_connection` carrying the wrong `connection_key` is rejected
/// with `confirm=false`, and the TCP connection is not added to the
/// server's routing registry.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_connection_key_is_rejected_with_a_reason() {
    let (server, addr) = start_server("correct-secret").await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.set_nodelay(true).ok();

    let request = ConnectionRequest {
        source_id: "impostor".into(),
        source_sub_id: "0".into(),
        connection_key: "wrong-secret".into(),
        auto_echo: false,
        auto_echo_interval_seconds: 0,
        session_type: SessionKind::MessageLine,
        bridge_mode: false,
        snipping_targets: vec![],
    };
    let frame = Frame::new(Mode::Packet, request.into_container().serialize_array());
    let codes = FrameCodes::default();
    frame.write(&mut socket, &codes).await.unwrap();

    let reply = Frame::read(&mut socket, &codes).await.unwrap();
    let reply_container = Container::from_bytes(&reply.payload, false).unwrap();
    let confirm = ConnectionConfirm::from_container(&reply_container).unwrap();
    assert!(!confirm.confirm);
    assert!(confirm.reason.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.registry().all().is_empty());
}

/// A frame whose declared length exceeds the configured maximum is
/// rejected outright rather than triggering an unbounded allocation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversized_frame_length_is_rejected() {
    let (_server, addr) = start_server("hardening-secret").await;
    let mut socket = TcpStream::connect(addr).await.unwrap();

    let codes = FrameCodes::default();
    tokio::io::AsyncWriteExt::write_all(&mut socket, &codes.start).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut socket, &[0x00]).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut socket, &(u32::MAX).to_le_bytes())
        .await
        .unwrap();
    tokio::io::AsyncWriteExt::flush(&mut socket).await.unwrap();

    // The server should close the connection rather than hang trying to
    // read a multi-gigabyte payload; a subsequent read returns EOF/closed.
    let mut probe = [0u8; 1];
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::io::AsyncReadExt::read(&mut socket, &mut probe),
    )
    .await;
    match result {
        Ok(Ok(n)) => assert_eq!(n, 0, "expected the server to close the connection"),
        Ok(Err(_)) => {}
        Err(_) => panic!("server did not close the connection after an oversized frame length"),
    }
}

/// A session that never completes its handshake is never registered and
/// its reply channel never opens, distinguishing "not confirmed yet" from
/// a rejected key.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_peer_that_never_sends_a_request_never_joins_the_registry() {
    let (server, addr) = start_server("hardening-secret").await;
    let _socket = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(server.registry().all().is_empty());
}

/// Sanity check that `Session::connect` itself surfaces a rejected
/// handshake as an error rather than returning a confirmed session.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_connect_errors_on_a_rejected_connection_key() {
    let (_server, addr) = start_server("correct-secret").await;

    let config = SessionConfig {
        source_id: "impostor".into(),
        source_sub_id: "0".into(),
        connection_key: "wrong-secret".into(),
        session_type: SessionKind::MessageLine,
        compress_mode: false,
        encrypt_mode: false,
        auto_echo: false,
        auto_echo_interval_seconds: 0,
        bridge_mode: false,
        snipping_targets: vec![],
        frame_codes: FrameCodes::default(),
    };
    let callbacks = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };
    let result = Session::connect(addr, config, scheduler(), compressor(), crypto(), callbacks).await;
    assert!(result.is_err());
}
