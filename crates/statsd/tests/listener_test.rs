// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loopback-socket tests for the three listeners.

use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use statsd::event::{CounterEvent, Event, Labels};
use statsd::listener::{StatsdTcpListener, StatsdUdpListener};
use statsd::queue::EventHandler;
use statsd::telemetry::{LineTelemetry, ListenerTelemetry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn simple_counter(name: &str, value: f64) -> Event {
    Event::Counter(CounterEvent {
        name: name.to_string(),
        value,
        labels: Labels::new(),
    })
}

#[tokio::test]
async fn udp_listener_end_to_end() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = socket.local_addr().expect("no local addr");

    let (events_tx, mut events_rx) = mpsc::channel(32);
    let listener = StatsdUdpListener::new(
        socket,
        EventHandler::Unbuffered(events_tx),
        ListenerTelemetry::disabled(),
        LineTelemetry::disabled(),
    );

    let shutdown = CancellationToken::new();
    let listen_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.listen(shutdown).await })
    };

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind failed");
    client
        .send_to(b"foo:2|c", addr)
        .await
        .expect("send failed");

    let batch = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(batch, vec![simple_counter("foo", 2.0)]);

    shutdown.cancel();
    listen_task.await.expect("listen task failed");
}

#[tokio::test]
async fn tcp_listener_reads_lines() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = tcp.local_addr().expect("no local addr");

    let (events_tx, mut events_rx) = mpsc::channel(32);
    let listener = StatsdTcpListener::new(
        tcp,
        EventHandler::Unbuffered(events_tx),
        ListenerTelemetry::disabled(),
        LineTelemetry::disabled(),
    );

    let shutdown = CancellationToken::new();
    let listen_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.listen(shutdown).await })
    };

    let mut client = TcpStream::connect(addr).await.expect("connect failed");
    client
        .write_all(b"foo:2|c\nbar:5|ms\n")
        .await
        .expect("write failed");
    client.shutdown().await.expect("shutdown failed");

    let first = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(first, vec![simple_counter("foo", 2.0)]);

    let second = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].metric_name(), "bar");

    shutdown.cancel();
    listen_task.await.expect("listen task failed");
}

#[tokio::test]
#[traced_test]
async fn tcp_line_over_limit_closes_connection() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let telemetry =
        metrics::with_local_recorder(&recorder, ListenerTelemetry::new);

    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = tcp.local_addr().expect("no local addr");

    let (events_tx, _events_rx) = mpsc::channel(32);
    let listener = StatsdTcpListener::new(
        tcp,
        EventHandler::Unbuffered(events_tx),
        telemetry,
        LineTelemetry::disabled(),
    )
    .with_line_limit(64);

    let shutdown = CancellationToken::new();
    let listen_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.listen(shutdown).await })
    };

    let mut client = TcpStream::connect(addr).await.expect("connect failed");
    client
        .write_all(&[b'a'; 200])
        .await
        .expect("write failed");

    // The server drops the connection; the read drains to EOF or errors
    // out with a reset, either of which proves the disconnect.
    let mut buf = [0u8; 16];
    loop {
        match client.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    let too_long: u64 = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| key.key().name() == "tcp_line_too_long_total")
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(n) => n,
            _ => 0,
        })
        .sum();
    assert_eq!(too_long, 1);
    assert!(logs_contain("line too long"));

    shutdown.cancel();
    listen_task.await.expect("listen task failed");
}

#[tokio::test]
async fn tcp_handle_conn_drives_a_single_connection() {
    // The accepted stream comes from a plain socket so the connection can
    // be driven directly, without the accept loop.
    let server = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = server.local_addr().expect("no local addr");

    let client_task = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.expect("connect failed");
        client.write_all(b"foo:7|c\n").await.expect("write failed");
    });
    let (stream, peer) = server.accept().await.expect("accept failed");

    let unused = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let (events_tx, mut events_rx) = mpsc::channel(32);
    let listener = StatsdTcpListener::new(
        unused,
        EventHandler::Unbuffered(events_tx),
        ListenerTelemetry::disabled(),
        LineTelemetry::disabled(),
    );

    listener.handle_conn(stream, peer).await;
    client_task.await.expect("client task failed");

    let batch = events_rx.try_recv().expect("no batch received");
    assert_eq!(batch, vec![simple_counter("foo", 7.0)]);
}

#[cfg(unix)]
#[tokio::test]
async fn unixgram_listener_end_to_end() {
    use statsd::listener::StatsdUnixgramListener;
    use tokio::net::UnixDatagram;

    let path = std::env::temp_dir().join(format!("statsd-unixgram-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let socket = UnixDatagram::bind(&path).expect("bind failed");
    let (events_tx, mut events_rx) = mpsc::channel(32);
    let listener = StatsdUnixgramListener::new(
        socket,
        EventHandler::Unbuffered(events_tx),
        ListenerTelemetry::disabled(),
        LineTelemetry::disabled(),
    );

    let shutdown = CancellationToken::new();
    let listen_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.listen(shutdown).await })
    };

    let client = UnixDatagram::unbound().expect("socket failed");
    client
        .send_to(b"foo:1|c\nbar:2|c", &path)
        .await
        .expect("send failed");

    let first = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(first, vec![simple_counter("foo", 1.0)]);

    let second = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(second, vec![simple_counter("bar", 2.0)]);

    shutdown.cancel();
    listen_task.await.expect("listen task failed");
    let _ = std::fs::remove_file(&path);
}
