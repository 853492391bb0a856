//! Edge cases: zero-byte transfers, unmatched routing, empty strings, and
//! deeply nested container values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_compress::{Compressor, DeflateCompressor};
use courier_core::{Container, Value};
use courier_crypto::{AesGcmCrypto, Crypto};
use courier_scheduler::{Scheduler, WorkerPool, WorkerPoolConfig};
use courier_server::{Server, ServerCallbacks, ServerConfig, ServerError};
use courier_session::session::{Callbacks, Session, SessionConfig};
use courier_session::{FrameCodes, SessionKind};
use tokio::net::TcpListener;

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

fn noop_callbacks() -> Callbacks {
    Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    }
}

fn client_config(source_id: &str) -> SessionConfig {
    SessionConfig {
        source_id: source_id.into(),
        source_sub_id: "0".into(),
        connection_key: "edge-secret".into(),
        session_type: SessionKind::MessageLine,
        compress_mode: false,
        encrypt_mode: false,
        auto_echo: false,
        auto_echo_interval_seconds: 0,
        bridge_mode: false,
        snipping_targets: vec![],
        frame_codes: FrameCodes::default(),
    }
}

async fn start_server() -> (Arc<Server>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: "edge-secret".into(),
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

/// Routing a container to a `target_id` with no confirmed session at all
/// surfaces `ServerError::NoMatchingSession` rather than silently dropping
/// it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn routing_to_an_unknown_target_is_an_error() {
    let (server, _addr) = start_server().await;
    let err = server
        .route(Container::addressed("server", "0", "nobody", "0", "ping", vec![]))
        .await
        .unwrap_err();
    match err {
        ServerError::NoMatchingSession { target_id, target_sub_id } => {
            assert_eq!(target_id, "nobody");
            assert_eq!(target_sub_id, "0");
        }
        other => panic!("expected NoMatchingSession, got {other:?}"),
    }
}

/// A zero-byte file transfer is still saved to disk as an empty file
/// rather than being rejected or silently dropped.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_zero_byte_file_transfer_still_creates_an_empty_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("empty.bin");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let saved = Arc::new(AtomicBool::new(false));
    let saved_clone = Arc::clone(&saved);
    let target_path_clone = target_path.clone();
    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: "edge-secret".into(),
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
            on_file_saved: Arc::new(move |notification| {
                assert_eq!(notification.saved_path, target_path_clone.to_string_lossy());
                saved_clone.store(true, Ordering::SeqCst);
            }),
            on_binary: Arc::new(|_| {}),
        },
    );
    tokio::spawn(Arc::clone(&server).run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = Session::connect(addr, client_config("uploader"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();

    client
        .send_file(courier_session::file_transfer::FileRecord {
            indication_id: "empty-upload".into(),
            source_id: "uploader".into(),
            source_sub_id: "0".into(),
            target_id: "server".into(),
            target_sub_id: "0".into(),
            source_path: "ignored".into(),
            target_path: target_path.to_string_lossy().into_owned(),
            file_bytes: Vec::new(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(saved.load(Ordering::SeqCst));
    assert_eq!(std::fs::read(&target_path).unwrap(), Vec::<u8>::new());
}

/// An empty-string value round-trips through the server exactly as sent —
/// it is distinct from the field simply being absent.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn an_empty_string_value_is_not_confused_with_a_missing_field() {
    let (server, addr) = start_server().await;
    let received = Arc::new(Mutex::new(None));
    let received_clone = Arc::clone(&received);
    let _ = server; // kept alive via the outer scope's `run` task

    let client = Session::connect(addr, client_config("sender"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();
    // A second connection to observe what the server forwards back to it.
    let observer = Session::connect(
        addr,
        client_config("observer"),
        scheduler(),
        compressor(),
        crypto(),
        Callbacks {
            on_connection: Arc::new(|_| {}),
            on_message: Arc::new(move |c: Container| *received_clone.lock().unwrap() = Some(c)),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        },
    )
    .await
    .unwrap();

    client
        .send(Container::addressed(
            "sender",
            "0",
            "observer",
            "0",
            "note",
            vec![Value::string("body", ""), Value::bool("present", true)],
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let got = received.lock().unwrap().take().expect("observer should have received the message");
    assert_eq!(got.get_value("body", 0).to_canonical_string(), "");
    assert!(got.get_value("present", 0).to_bool());

    client.stop().await;
    observer.stop().await;
}

/// A value tree nested several levels deep round-trips through the wire
/// format intact.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_deeply_nested_container_value_round_trips_through_the_server() {
    let (server, addr) = start_server().await;
    let received = Arc::new(Mutex::new(None));
    let received_clone = Arc::clone(&received);

    let observer = Session::connect(
        addr,
        client_config("observer"),
        scheduler(),
        compressor(),
        crypto(),
        Callbacks {
            on_connection: Arc::new(|_| {}),
            on_message: Arc::new(move |c: Container| *received_clone.lock().unwrap() = Some(c)),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        },
    )
    .await
    .unwrap();

    let mut level3 = Value::container("level3", 1);
    level3.add_child(Value::int("leaf", 99));
    let mut level2 = Value::container("level2", 1);
    level2.add_child(level3);
    let mut level1 = Value::container("level1", 1);
    level1.add_child(level2);

    let client = Session::connect(addr, client_config("sender"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();
    client
        .send(Container::addressed("sender", "0", "observer", "0", "tree", vec![level1]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let got = received.lock().unwrap().take().expect("observer should have received the message");
    let units = got.units().unwrap();
    let level1 = &units[0];
    let level2 = &level1.children()[0];
    let level3 = &level2.children()[0];
    assert_eq!(level3.children()[0].to_i32(), 99);

    let _ = server;
    client.stop().await;
    observer.stop().await;
}
