//! End-to-end tests across `courier-session`/`courier-server`: real TCP
//! loopback connections, not mocked sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_compress::{Compressor, DeflateCompressor};
use courier_core::{Container, Value};
use courier_crypto::{AesGcmCrypto, Crypto};
use courier_scheduler::{Scheduler, WorkerPool, WorkerPoolConfig};
use courier_server::{Server, ServerCallbacks, ServerConfig};
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

fn client_config(source_id: &str, compress_mode: bool, encrypt_mode: bool) -> SessionConfig {
    SessionConfig {
        source_id: source_id.into(),
        source_sub_id: "0".into(),
        connection_key: "integration-secret".into(),
        session_type: SessionKind::MessageLine,
        compress_mode,
        encrypt_mode,
        auto_echo: false,
        auto_echo_interval_seconds: 0,
        bridge_mode: false,
        snipping_targets: vec![],
        frame_codes: FrameCodes::default(),
    }
}

async fn start_server(session_limit_count: usize) -> (Arc<Server>, std::net::SocketAddr, Arc<Mutex<Vec<Container>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: "integration-secret".into(),
            session_limit_count,
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
            on_message: Arc::new(move |c| received_clone.lock().unwrap().push(c)),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        },
    );
    tokio::spawn(Arc::clone(&server).run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    (server, addr, received)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_clients_exchange_a_message_through_the_server() {
    let (server, addr, _received) = start_server(8).await;

    let a_got = Arc::new(Mutex::new(None));
    let a_got_clone = Arc::clone(&a_got);
    let a_callbacks = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(move |c: Container| *a_got_clone.lock().unwrap() = Some(c)),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };
    let client_a = Session::connect(addr, client_config("client-a", false, false), scheduler(), compressor(), crypto(), a_callbacks)
        .await
        .unwrap();

    let noop = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };
    let _client_b = Session::connect(addr, client_config("client-b", false, false), scheduler(), compressor(), crypto(), noop)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server
        .route(Container::addressed(
            "server",
            "0",
            "client-a",
            "0",
            "greeting",
            vec![Value::string("text", "hello client-a")],
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let got = a_got.lock().unwrap().take().expect("client-a should have received a message");
    assert_eq!(got.message_type(), "greeting");

    client_a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compress_and_encrypt_both_enabled_round_trips_end_to_end() {
    let (server, addr, received) = start_server(8).await;

    let noop = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };
    let client = Session::connect(addr, client_config("secure-client", true, true), scheduler(), compressor(), crypto(), noop)
        .await
        .unwrap();

    let payload = "the quick brown fox jumps over the lazy dog".repeat(20);
    client
        .send(Container::addressed(
            "secure-client",
            "0",
            "server",
            "0",
            "payload",
            vec![Value::string("body", payload.clone())],
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let messages = received.lock().unwrap();
    assert_eq!(messages.len(), 1);
    let body = messages[0].get_value("body", 0).to_canonical_string();
    assert_eq!(body, payload);
    let _ = server;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_file_sent_to_the_server_is_saved_under_the_declared_target_path() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("incoming.bin");

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
            connection_key: "integration-secret".into(),
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

    let noop = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };
    let client = Session::connect(addr, client_config("uploader", false, false), scheduler(), compressor(), crypto(), noop)
        .await
        .unwrap();

    client
        .send_file(courier_session::file_transfer::FileRecord {
            indication_id: "upload-1".into(),
            source_id: "uploader".into(),
            source_sub_id: "0".into(),
            target_id: "server".into(),
            target_sub_id: "0".into(),
            source_path: "ignored".into(),
            target_path: target_path.to_string_lossy().into_owned(),
            file_bytes: b"payload bytes".to_vec(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(saved.load(Ordering::SeqCst));
    assert_eq!(std::fs::read(&target_path).unwrap(), b"payload bytes");
}
