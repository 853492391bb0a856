//! End-to-end loopback tests for the accept loop, session registry, and
//! outbound routing (distilled spec §4.4, §8 routing properties).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_compress::{Compressor, DeflateCompressor};
use courier_core::{Container, Value};
use courier_crypto::{AesGcmCrypto, Crypto};
use courier_scheduler::{Scheduler, WorkerPool, WorkerPoolConfig};
use courier_server::{Server, ServerCallbacks, ServerConfig};
use courier_session::session::{Callbacks, Session, SessionConfig};
use courier_session::{FrameCodes, SessionKind};

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
        connection_key: "shared-secret".into(),
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

async fn start_server(session_limit_count: usize) -> (Arc<Server>, std::net::SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let received_clone = Arc::clone(&received);
    let callbacks = ServerCallbacks {
        on_message: Arc::new(move |c: Container| {
            received_clone.lock().unwrap().push(c.source_id());
        }),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };

    let server = Server::new(
        ServerConfig {
            listen_addr: addr,
            server_id: "server".into(),
            connection_key: "shared-secret".into(),
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
        callbacks,
    );

    let run_server = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = run_server.run().await;
    });
    // give the listener a moment to bind and start accepting
    tokio::time::sleep(Duration::from_millis(50)).await;

    (server, addr, received)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unique_target_routes_to_the_matching_session_only() {
    let (server, addr, received) = start_server(8).await;

    let client_a = Session::connect(addr, client_config("client-a"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();
    let _client_b = Session::connect(addr, client_config("client-b"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.registry().len(), 2);

    server
        .route(Container::addressed("server", "0", "client-a", "0", "chat", vec![Value::string("msg", "hi")]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client_a.confirm_state(), courier_session::ConfirmState::Confirmed);
    drop(received); // only used by the server's own on_message in this test
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_reaches_every_confirmed_session() {
    let (server, addr, _received) = start_server(8).await;

    let seen_a = Arc::new(AtomicUsize::new(0));
    let seen_a_clone = Arc::clone(&seen_a);
    let callbacks_a = Callbacks {
        on_message: Arc::new(move |_| {
            seen_a_clone.fetch_add(1, Ordering::SeqCst);
        }),
        ..noop_callbacks()
    };
    let seen_b = Arc::new(AtomicUsize::new(0));
    let seen_b_clone = Arc::clone(&seen_b);
    let callbacks_b = Callbacks {
        on_message: Arc::new(move |_| {
            seen_b_clone.fetch_add(1, Ordering::SeqCst);
        }),
        ..noop_callbacks()
    };

    let _client_a = Session::connect(addr, client_config("client-a"), scheduler(), compressor(), crypto(), callbacks_a)
        .await
        .unwrap();
    let _client_b = Session::connect(addr, client_config("client-b"), scheduler(), compressor(), crypto(), callbacks_b)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server
        .route(Container::addressed("server", "0", "", "", "announce", vec![Value::string("msg", "all hands")]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen_a.load(Ordering::SeqCst), 1);
    assert_eq!(seen_b.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connections_past_the_session_limit_are_refused() {
    let (_server, addr, _received) = start_server(1).await;

    let _client_a = Session::connect(addr, client_config("client-a"), scheduler(), compressor(), crypto(), noop_callbacks())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The TCP connect itself succeeds (the listener is still accepting
    // sockets), but the server drops it before a handshake begins, so the
    // client's own handshake read times out as a connection reset/EOF.
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        Session::connect(addr, client_config("client-b"), scheduler(), compressor(), crypto(), noop_callbacks()),
    )
    .await;
    match result {
        Ok(Ok(_)) => panic!("expected the second connection to be refused"),
        Ok(Err(_)) | Err(_) => {}
    }
}
