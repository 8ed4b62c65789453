use color_eyre::eyre::{Context, Result};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;
use udprelay::common::{RecordingObserver, free_udp_port};
use udprelay::{DispatchMode, Observer, QueueCapacity, Relay, RelayConfig, RelayError};

fn loopback_sender() -> Result<UdpSocket> {
    UdpSocket::bind("127.0.0.1:0").wrap_err("Failed to bind sender socket")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduled_relay_delivers_in_arrival_order() -> Result<()> {
    let relay = Relay::load(RelayConfig::new(256, QueueCapacity::Records(32)))?;
    let recorder = Arc::new(RecordingObserver::default());
    relay.register_observer(recorder.clone())?;
    relay.bind(0)?;
    let port = relay.local_addr()?.port();

    let sender = loopback_sender()?;
    let messages: Vec<String> = (0..10).map(|i| format!("message {i}")).collect();
    for message in &messages {
        sender.send_to(message.as_bytes(), ("127.0.0.1", port))?;
    }

    let recorder_clone = Arc::clone(&recorder);
    let records = tokio::task::spawn_blocking(move || {
        recorder_clone.wait_for(10, Duration::from_secs(5))
    })
    .await?;

    let received: Vec<String> = records
        .iter()
        .map(|r| String::from_utf8_lossy(&r.payload).into_owned())
        .collect();
    assert_eq!(received, messages);

    let sender_port = sender.local_addr()?.port();
    assert!(records.iter().all(|r| r.source_ip == 0x7F00_0001 && r.source_port == sender_port));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_observer_sees_every_datagram() -> Result<()> {
    let relay = Relay::load(RelayConfig::default())?;
    let observers: Vec<Arc<RecordingObserver>> =
        (0..3).map(|_| Arc::new(RecordingObserver::default())).collect();
    for observer in &observers {
        relay.register_observer(observer.clone())?;
    }
    relay.bind(0)?;
    let port = relay.local_addr()?.port();

    let sender = loopback_sender()?;
    sender.send_to(b"fan out", ("127.0.0.1", port))?;

    for observer in observers {
        let records =
            tokio::task::spawn_blocking(move || observer.wait_for(1, Duration::from_secs(5)))
                .await?;
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"fan out");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_echo_observer_replies_through_transmitter() -> Result<()> {
    let relay = Relay::load(RelayConfig::default())?;
    let replies = relay.transmitter();
    let echo: Arc<dyn Observer> = Arc::new(move |payload: &[u8], ip: u32, port: u16| {
        replies.transmit(payload, ip, port);
    });
    relay.register_observer(echo)?;
    relay.bind(0)?;
    let port = relay.local_addr()?.port();

    let client = loopback_sender()?;
    client.set_read_timeout(Some(Duration::from_secs(5)))?;
    client.send_to(b"ping", ("127.0.0.1", port))?;

    let response = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 64];
        client.recv_from(&mut buf).map(|(n, from)| (buf[..n].to_vec(), from))
    })
    .await??;

    assert_eq!(response.0, b"ping");
    assert_eq!(response.1.port(), port);
    assert_eq!(relay.metrics().transmitted, 1);
    Ok(())
}

#[test]
fn test_transmit_reaches_destination_without_queue() -> Result<()> {
    let relay = Relay::load(RelayConfig::default().with_dispatch(DispatchMode::Manual))?;
    relay.bind(0)?;

    let peer = UdpSocket::bind("127.0.0.1:0")?;
    peer.set_read_timeout(Some(Duration::from_secs(5)))?;
    let peer_port = peer.local_addr()?.port();

    relay.transmit(b"ping", 0x7F00_0001, peer_port);

    let mut buf = [0u8; 16];
    let (n, from) = peer.recv_from(&mut buf)?;
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(from.port(), relay.local_addr()?.port());
    assert!(relay.queue().is_empty());
    assert_eq!(relay.metrics().transmitted, 1);
    Ok(())
}

#[test]
fn test_bind_twice_same_and_different_port() -> Result<()> {
    let relay = Relay::load(RelayConfig::default().with_dispatch(DispatchMode::Manual))?;
    let first = free_udp_port()?;
    let second = free_udp_port()?;

    relay.bind(first)?;
    relay.bind(first)?;

    if second != first {
        let result = relay.bind(second);
        assert!(matches!(result, Err(RelayError::AlreadyBound { .. })));
    }
    assert_eq!(relay.local_port(), Some(first));
    Ok(())
}

#[test]
fn test_overflow_drops_newest_over_the_wire() -> Result<()> {
    let relay = Relay::load(
        RelayConfig::new(100, QueueCapacity::Records(2)).with_dispatch(DispatchMode::Manual),
    )?;
    let recorder = Arc::new(RecordingObserver::default());
    relay.register_observer(recorder.clone())?;
    relay.bind(0)?;
    let port = relay.local_addr()?.port();

    let senders = [loopback_sender()?, loopback_sender()?, loopback_sender()?];
    for (tag, sender) in [b'a', b'b', b'c'].into_iter().zip(&senders) {
        sender.send_to(&[tag; 50], ("127.0.0.1", port))?;
        // Let the receiver drain the socket before the next datagram
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let expected = (tag - b'a' + 1) as u64;
        while relay.metrics().received < expected && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    // The receiver handles datagrams in order, so once C is dropped A and B are queued
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while relay.metrics().overflow_drops < 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(relay.metrics().overflow_drops, 1);
    assert_eq!(relay.dispatch().delivered, 2);

    let records = recorder.records();
    let tags: Vec<u8> = records.iter().map(|r| r.payload[0]).collect();
    assert_eq!(tags, vec![b'a', b'b']);
    assert_eq!(records[0].source_port, senders[0].local_addr()?.port());
    assert_eq!(records[1].source_port, senders[1].local_addr()?.port());
    Ok(())
}

#[test]
fn test_oversized_datagram_never_dispatched() -> Result<()> {
    let relay = Relay::load(
        RelayConfig::new(16, QueueCapacity::Records(4)).with_dispatch(DispatchMode::Manual),
    )?;
    let recorder = Arc::new(RecordingObserver::default());
    relay.register_observer(recorder.clone())?;
    relay.bind(0)?;
    let port = relay.local_addr()?.port();

    let sender = loopback_sender()?;
    sender.send_to(&[0u8; 17], ("127.0.0.1", port))?;
    sender.send_to(&[1u8; 16], ("127.0.0.1", port))?;

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while relay.queue().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    relay.dispatch();

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload.len(), 16);
    assert_eq!(relay.metrics().oversized, 1);
    Ok(())
}
