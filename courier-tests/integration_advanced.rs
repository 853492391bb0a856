//! Multi-hop routing through `courier-bridge` and broadcast/fan-out
//! behavior on `courier-server`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_bridge::{Bridge, BridgeConfig};
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

async fn ephemeral_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn noop_callbacks() -> Callbacks {
    Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    }
}

fn client_config(source_id: &str, connection_key: &str) -> SessionConfig {
    SessionConfig {
        source_id: source_id.into(),
        source_sub_id: "0".into(),
        connection_key: connection_key.into(),
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

/// A downstream client connects to a bridge, which forwards the message
/// upstream to the main server, whose reply travels back through the
/// bridge to the original downstream client.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_message_travels_downstream_through_bridge_to_main_server_and_back() {
    let main_addr = ephemeral_addr().await;
    let received_on_main = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received_on_main);
    let main_server = Server::new(
        ServerConfig {
            listen_addr: main_addr,
            server_id: "main".into(),
            connection_key: "upstream-secret".into(),
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
            on_message: Arc::new(move |c: Container| {
                received_clone.lock().unwrap().push(c.clone());
            }),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        },
    );
    tokio::spawn(Arc::clone(&main_server).run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let bridge_addr = ephemeral_addr().await;
    let bridge = Bridge::start(
        BridgeConfig {
            listen_addr: bridge_addr,
            downstream_connection_key: "downstream-secret".into(),
            downstream_session_limit_count: 8,
            upstream_addr: main_addr,
            upstream_connection_key: "upstream-secret".into(),
            bridge_id: "bridge".into(),
            compress_mode: false,
            encrypt_mode: false,
            frame_codes: FrameCodes::default(),
        },
        scheduler(),
        compressor(),
        crypto(),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Session::connect(
        bridge_addr,
        client_config("downstream-client", "downstream-secret"),
        scheduler(),
        compressor(),
        crypto(),
        noop_callbacks(),
    )
    .await
    .unwrap();

    client
        .send(Container::addressed(
            "downstream-client",
            "0",
            "main",
            "0",
            "ping",
            vec![Value::string("text", "hello main server")],
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let got = received_on_main.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].message_type(), "ping");
    assert_eq!(got[0].get_value("text", 0).to_canonical_string(), "hello main server");

    client.stop().await;
    bridge.downstream().stop();
}

/// An empty `target_sub_id` on an addressed routing header fans a message
/// out to every confirmed session sharing that `target_id`.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_target_sub_id_fans_out_to_every_session_with_that_target_id() {
    let addr = ephemeral_addr().await;
    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: "fanout-secret".into(),
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

    let hit_count = Arc::new(AtomicUsize::new(0));

    let mut clients = Vec::new();
    for sub_id in ["0", "1", "2"] {
        let hit_count = Arc::clone(&hit_count);
        let config = SessionConfig {
            source_id: "worker".into(),
            source_sub_id: sub_id.into(),
            connection_key: "fanout-secret".into(),
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
            on_message: Arc::new(move |_: Container| {
                hit_count.fetch_add(1, Ordering::SeqCst);
            }),
            on_file_saved: Arc::new(|_| {}),
            on_binary: Arc::new(|_| {}),
        };
        let session = Session::connect(addr, config, scheduler(), compressor(), crypto(), callbacks)
            .await
            .unwrap();
        clients.push(session);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    server
        .route(Container::addressed("server", "0", "worker", "", "broadcast", vec![Value::int("n", 1)]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(hit_count.load(Ordering::SeqCst), 3);

    for client in clients {
        client.stop().await;
    }
}
