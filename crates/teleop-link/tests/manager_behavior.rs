//! End-to-end behavior of the channel manager against scripted loopback
//! peers: handshake sequencing, the ack gate, keepalive scheduling, and
//! the reconnect-once retry policy.

use std::net::SocketAddr;
use std::time::Duration;

use teleop_link::{ChannelConfig, ChannelManager, ConnectionState, LinkError, TimingConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

fn fast_timing() -> TimingConfig {
    TimingConfig {
        bail_timeout: Duration::from_millis(300),
        connect_attempts: 2,
        connect_backoff_step: Duration::from_millis(10),
        keepalive_interval: Duration::from_millis(500),
        ..TimingConfig::default()
    }
}

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Reads from `sock` until `total` bytes have arrived.
async fn read_exact_bytes(sock: &mut TcpStream, total: usize) -> Vec<u8> {
    let mut received = vec![0u8; total];
    sock.read_exact(&mut received).await.unwrap();
    received
}

fn manager_for(channel: &str, config: ChannelConfig) -> ChannelManager {
    ChannelManager::new([(channel.to_string(), config)], fast_timing()).unwrap()
}

#[tokio::test]
async fn test_rover_handshake_then_command_crosses_the_wire_verbatim() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();

        // Handshake: greeting in, echo out.
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();

        // Initial all-stop command, then ack it.
        assert_eq!(read_exact_bytes(&mut sock, 10).await, b"+000\0+000\n");
        sock.write_all(b"C").await.unwrap();

        // The real command, byte for byte.
        read_exact_bytes(&mut sock, 10).await
    });

    let mut mgr = manager_for("rover", ChannelConfig::rover(addr));
    mgr.connect_all().await.unwrap();
    assert_eq!(mgr.state("rover").unwrap(), ConnectionState::Ready);

    mgr.send("rover", b"+050\0+050\n").await.unwrap();
    mgr.shutdown_all().await;

    assert_eq!(server.await.unwrap(), b"+050\0+050\n");
    assert_eq!(mgr.state("rover").unwrap(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_send_reconnects_once_after_peer_drops_mid_session() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        // First session: handshake completes, then the peer vanishes
        // before acking anything.
        let (mut sock, _) = listener.accept().await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 5).await, b"INIT\n");
        drop(sock);

        // Second session: full handshake, ack, then receive the command
        // the caller originally asked for.
        let (mut sock, _) = listener.accept().await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 5).await, b"INIT\n");
        sock.write_all(b"C").await.unwrap();
        read_exact_bytes(&mut sock, 3).await
    });

    let config = ChannelConfig {
        greeting: Some(b"C".to_vec()),
        await_after_greeting: Some(b"C".to_vec()),
        command_ack: Some(b"C".to_vec()),
        initial_command: Some(b"INIT\n".to_vec()),
        ..ChannelConfig::new(addr)
    };
    let mut mgr = manager_for("rover", config);
    mgr.connect_all().await.unwrap();

    // The dead first session is only discovered at the ack gate; the
    // manager must tear it down, reconnect, and deliver on the retry.
    mgr.send("rover", b"GO\n").await.unwrap();

    assert_eq!(server.await.unwrap(), b"GO\n");
}

#[tokio::test]
async fn test_ack_timeout_surfaces_after_exactly_one_retry() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let mut sessions = 0u32;
        // Both sessions handshake cleanly but never ack a command. Each
        // session is serviced on its own task so the second accept is not
        // delayed behind the first session's silence.
        for _ in 0..2 {
            let (mut sock, _) = listener.accept().await.unwrap();
            sessions += 1;
            tokio::spawn(async move {
                assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
                sock.write_all(b"C").await.unwrap();
                assert_eq!(read_exact_bytes(&mut sock, 5).await, b"INIT\n");
                // Hold the socket open, silently, past the bail timeout.
                tokio::time::sleep(Duration::from_millis(600)).await;
            });
        }
        sessions
    });

    let config = ChannelConfig {
        greeting: Some(b"C".to_vec()),
        await_after_greeting: Some(b"C".to_vec()),
        command_ack: Some(b"C".to_vec()),
        initial_command: Some(b"INIT\n".to_vec()),
        ..ChannelConfig::new(addr)
    };
    let mut mgr = manager_for("rover", config);
    mgr.connect_all().await.unwrap();

    let err = mgr.send("rover", b"GO\n").await.unwrap_err();

    assert!(matches!(err, LinkError::AckTimeout { .. }));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(server.await.unwrap(), 2, "one original attempt plus one retry");
}

#[tokio::test]
async fn test_second_send_waits_for_the_first_commands_ack() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 5).await, b"INIT\n");

        // Ack the initial command and receive the first telegram.
        sock.write_all(b"C").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 4).await, b"one\n");

        // While the first telegram is unacked, the second must not be on
        // the wire yet.
        let mut probe = [0u8; 1];
        let early = tokio::time::timeout(Duration::from_millis(100), sock.read(&mut probe)).await;
        assert!(early.is_err(), "second telegram arrived before the ack");

        // Ack, and only now does the second telegram arrive.
        sock.write_all(b"C").await.unwrap();
        read_exact_bytes(&mut sock, 4).await
    });

    let config = ChannelConfig {
        greeting: Some(b"C".to_vec()),
        await_after_greeting: Some(b"C".to_vec()),
        command_ack: Some(b"C".to_vec()),
        initial_command: Some(b"INIT\n".to_vec()),
        ..ChannelConfig::new(addr)
    };
    let mut mgr = manager_for("rover", config);
    mgr.connect_all().await.unwrap();

    mgr.send("rover", b"one\n").await.unwrap();
    mgr.send("rover", b"two\n").await.unwrap();

    assert_eq!(server.await.unwrap(), b"two\n");
}

#[tokio::test]
async fn test_reconnect_reaches_ready_from_disconnected_and_after_peer_close() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        // Two sessions; the first is closed from the server side.
        let (sock, _) = listener.accept().await.unwrap();
        drop(sock);
        let (_sock, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut mgr = manager_for("neck", ChannelConfig::new(addr));
    assert_eq!(mgr.state("neck").unwrap(), ConnectionState::Disconnected);

    // From Disconnected.
    mgr.reconnect("neck").await.unwrap();
    assert_eq!(mgr.state("neck").unwrap(), ConnectionState::Ready);

    // From Ready with the peer already gone: same end state.
    mgr.reconnect("neck").await.unwrap();
    assert_eq!(mgr.state("neck").unwrap(), ConnectionState::Ready);
    server.await.unwrap();
}

#[tokio::test]
async fn test_pre_greeting_marker_gates_the_greeting() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();

        // Nothing may arrive before the remote announces readiness.
        let mut probe = [0u8; 1];
        let early = tokio::time::timeout(Duration::from_millis(100), sock.read(&mut probe)).await;
        assert!(early.is_err(), "greeting arrived before the ready marker");

        sock.write_all(b"ready").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();

        read_exact_bytes(&mut sock, 10).await
    });

    let config = ChannelConfig {
        await_before_greeting: Some(b"ready".to_vec()),
        greeting: Some(b"C".to_vec()),
        await_after_greeting: Some(b"C".to_vec()),
        ..ChannelConfig::new(addr)
    };
    let mut mgr = manager_for("rover", config);
    mgr.connect_all().await.unwrap();
    assert_eq!(mgr.state("rover").unwrap(), ConnectionState::Ready);

    mgr.send("rover", b"+050\0+050\n").await.unwrap();

    assert_eq!(server.await.unwrap(), b"+050\0+050\n");
}

#[tokio::test]
async fn test_keepalive_fires_only_after_the_interval_elapses() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        // Greeting space, then exactly one keepalive space.
        read_exact_bytes(&mut sock, 2).await
    });

    let mut mgr = manager_for("neck", ChannelConfig::neck(addr));
    mgr.connect_all().await.unwrap();

    // Immediately after connecting nothing is due.
    mgr.tick(Instant::now()).await.unwrap();

    // Jump the clock past the interval: exactly one keepalive goes out.
    let later = Instant::now() + Duration::from_secs(2);
    mgr.tick(later).await.unwrap();
    mgr.tick(later).await.unwrap();

    assert_eq!(server.await.unwrap(), b"  ");
}

#[tokio::test]
async fn test_connect_failure_reports_the_full_attempt_budget() {
    // Bind then drop so the port is (momentarily) free and refused.
    let (listener, addr) = listener().await;
    drop(listener);

    let mut mgr = manager_for("rover", ChannelConfig::rover(addr));
    let err = mgr.connect_all().await.unwrap_err();

    match err {
        LinkError::ConnectFailure { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected ConnectFailure, got {other}"),
    }
    assert_eq!(mgr.state("rover").unwrap(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_read_position_returns_the_reported_degrees() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        // Consume the greeting space, then report a position with some
        // surrounding chatter.
        read_exact_bytes(&mut sock, 1).await;
        sock.write_all(b"ok pos: 90\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut mgr = manager_for("neck", ChannelConfig::neck(addr));
    mgr.connect_all().await.unwrap();

    let degrees = mgr.read_position("neck").await.unwrap();

    assert_eq!(degrees, 90);
    server.await.unwrap();
}

#[tokio::test]
async fn test_read_position_times_out_when_no_report_arrives() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_exact_bytes(&mut sock, 1).await;
        // Say nothing; hold the socket open past the bail timeout.
        tokio::time::sleep(Duration::from_millis(600)).await;
    });

    let mut mgr = manager_for("neck", ChannelConfig::neck(addr));
    mgr.connect_all().await.unwrap();

    let err = mgr.read_position("neck").await.unwrap_err();

    assert!(matches!(err, LinkError::ResponseTimeout { .. }));
    assert_eq!(err.exit_code(), 5);
    server.await.unwrap();
}

#[tokio::test]
async fn test_preshutdown_courtesy_byte_is_sent_on_teardown() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 1).await, b"C");
        sock.write_all(b"C").await.unwrap();
        assert_eq!(read_exact_bytes(&mut sock, 10).await, b"+000\0+000\n");

        // Everything after the initial command until EOF.
        let mut rest = Vec::new();
        sock.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let mut mgr = manager_for("rover", ChannelConfig::rover(addr));
    mgr.connect_all().await.unwrap();
    mgr.shutdown_all().await;

    assert_eq!(server.await.unwrap(), b"\\");
}
