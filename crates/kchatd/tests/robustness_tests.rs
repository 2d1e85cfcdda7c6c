//! Robustness tests for the chat server.
//!
//! These tests verify the server handles edge cases and error conditions gracefully:
//! - Oversized input and input that is not valid UTF-8
//! - Clients vanishing during negotiation
//! - Rapid connect/disconnect
//! - Many concurrent sessions
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::time::Duration;

use kchat_core::ChatName;
use kchatd::config::ServerConfig;
use kchatd::registry::{spawn_registry, RegistryHandle};
use kchatd::server::ChatServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_ATTEMPTS: usize = 100;

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn(max_line_length: usize) -> Self {
        let config = ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_line_length,
            ..ServerConfig::default()
        };
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();
        let server = ChatServer::new(config, registry.clone(), cancel_token.clone());

        let listener = server.bind().await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            addr,
            registry,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        let (reader, writer) = stream.into_split();
        TestClient {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn join(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.expect_line("SUBMITNAME").await;
        client.send(name).await;
        client.expect_line("NAMEACCEPTED").await;
        client
    }

    /// Waits until the registry has released `name`.
    async fn wait_released(&self, name: &str) {
        for _ in 0..POLL_ATTEMPTS {
            if !self
                .registry
                .is_claimed(ChatName::from(name))
                .await
                .unwrap()
            {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("name {name} was never released");
    }

    /// Waits until exactly `expected` sessions receive broadcasts.
    async fn wait_active(&self, expected: usize) {
        for _ in 0..POLL_ATTEMPTS {
            if self.registry.active_count().await == expected {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!(
            "expected {expected} active sessions, found {}",
            self.registry.active_count().await
        );
    }

    fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn send(&mut self, line: &str) {
        self.send_raw(line.as_bytes()).await;
        self.send_raw(b"\n").await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("line within timeout")
            .expect("read line")
            .expect("line before EOF")
    }

    async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.recv().await, expected);
    }

    async fn expect_silence(&mut self) {
        if let Ok(line) = timeout(QUIET_PERIOD, self.lines.next_line()).await {
            panic!("expected silence, got {line:?}");
        }
    }

    async fn expect_eof(&mut self) {
        let next = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("EOF within timeout");
        assert!(matches!(next, Ok(None) | Err(_)), "expected EOF, got {next:?}");
    }
}

// ============================================================================
// Malformed Input
// ============================================================================

#[tokio::test]
async fn test_oversized_line_disconnects_sender_only() {
    let server = TestServer::spawn(64).await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bob").await;
    alice.expect_line("INFO bob has joined. Welcome!").await;

    bob.send(&"x".repeat(1024)).await;

    bob.expect_eof().await;
    alice.expect_line("INFO bob disconnected").await;
    server.wait_released("bob").await;

    // Alice is unaffected
    alice.send("still here").await;
    alice.expect_line("MESSAGE alice: still here").await;

    server.shutdown();
}

#[tokio::test]
async fn test_line_at_limit_is_accepted() {
    let server = TestServer::spawn(64).await;
    let mut alice = server.join("alice").await;

    let text = "y".repeat(64);
    alice.send(&text).await;
    alice.expect_line(&format!("MESSAGE alice: {text}")).await;

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_utf8_is_relayed_lossily() {
    let server = TestServer::spawn(8192).await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bob").await;
    alice.expect_line("INFO bob has joined. Welcome!").await;

    bob.send_raw(b"caf\xe9\n").await;

    alice.expect_line("MESSAGE bob: caf\u{fffd}").await;
    bob.expect_line("MESSAGE bob: caf\u{fffd}").await;

    // The session survives
    bob.send("/users").await;
    bob.expect_line("INFO Users in this server: alice, bob").await;

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_utf8_name_is_accepted() {
    let server = TestServer::spawn(8192).await;

    let mut client = server.connect().await;
    client.expect_line("SUBMITNAME").await;
    client.send_raw(&[0xff, b'x', b'\n']).await;
    client.expect_line("NAMEACCEPTED").await;

    assert_eq!(
        server.registry.snapshot_names().await,
        vec![ChatName::from("\u{fffd}x")]
    );

    server.shutdown();
}

#[tokio::test]
async fn test_empty_lines_are_chat() {
    let server = TestServer::spawn(8192).await;
    let mut alice = server.join("alice").await;

    alice.send("").await;
    alice.expect_line("MESSAGE alice: ").await;

    server.shutdown();
}

// ============================================================================
// Abrupt Disconnects
// ============================================================================

#[tokio::test]
async fn test_nameless_disconnect_is_silent() {
    let server = TestServer::spawn(8192).await;
    let mut alice = server.join("alice").await;

    let mut ghost = server.connect().await;
    ghost.expect_line("SUBMITNAME").await;
    drop(ghost);

    alice.expect_silence().await;
    assert_eq!(
        server.registry.snapshot_names().await,
        vec![ChatName::from("alice")]
    );

    server.shutdown();
}

#[tokio::test]
async fn test_disconnect_mid_negotiation_after_retry() {
    let server = TestServer::spawn(8192).await;
    let mut alice = server.join("alice").await;

    let mut ghost = server.connect().await;
    ghost.expect_line("SUBMITNAME").await;
    ghost.send("alice").await;
    ghost.expect_line("SUBMITNAME").await;
    drop(ghost);

    alice.expect_silence().await;
    assert!(server
        .registry
        .is_claimed(ChatName::from("alice"))
        .await
        .unwrap());

    server.shutdown();
}

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn(8192).await;

    for _ in 0..20 {
        let client = server.connect().await;
        drop(client);
    }

    // Server still accepts and negotiates
    let mut alice = server.join("alice").await;
    alice.send("/users").await;
    alice.expect_line("INFO Users in this server: alice").await;

    server.shutdown();
}

#[tokio::test]
async fn test_rapid_join_leave_frees_names() {
    let server = TestServer::spawn(8192).await;

    for _ in 0..10 {
        let client = server.join("cycler").await;
        drop(client);
        server.wait_released("cycler").await;
    }

    server.wait_active(0).await;
    server.shutdown();
}

// ============================================================================
// Load
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_sessions() {
    let server = TestServer::spawn(8192).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let addr = server.addr;
            tokio::spawn(async move {
                let stream = TcpStream::connect(addr).await.expect("connect");
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();

                assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("SUBMITNAME"));
                writer
                    .write_all(format!("user-{i}\n").as_bytes())
                    .await
                    .unwrap();
                assert_eq!(
                    lines.next_line().await.unwrap().as_deref(),
                    Some("NAMEACCEPTED")
                );
                (lines, writer)
            })
        })
        .collect();

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(timeout(RECV_TIMEOUT, task).await.unwrap().unwrap());
    }

    server.wait_active(20).await;
    assert_eq!(server.registry.snapshot_names().await.len(), 20);

    drop(clients);
    server.wait_active(0).await;
    for _ in 0..POLL_ATTEMPTS {
        if server.registry.snapshot_names().await.is_empty() {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }
    assert!(server.registry.snapshot_names().await.is_empty());

    server.shutdown();
}

#[tokio::test]
async fn test_shutdown_with_sessions_in_every_state() {
    let server = TestServer::spawn(8192).await;
    let mut active = server.join("active").await;
    let mut negotiating = server.connect().await;
    negotiating.expect_line("SUBMITNAME").await;
    negotiating.send("active").await;
    negotiating.expect_line("SUBMITNAME").await;

    server.shutdown();

    active.expect_eof().await;
    negotiating.expect_eof().await;
    server.wait_active(0).await;
    server.wait_released("active").await;
}
