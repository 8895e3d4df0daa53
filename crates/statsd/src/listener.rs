// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Socket listeners feeding the parser.
//!
//! Each listener owns one long-running read task; TCP additionally spawns
//! one task per accepted connection. Datagram listeners are stateless
//! between packets: a datagram is self-contained and lines never
//! continue across reads.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
#[cfg(unix)]
use tokio::net::UnixDatagram;
use tokio_stream::StreamExt;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::line::line_to_events;
use crate::queue::EventHandler;
use crate::telemetry::{LineTelemetry, ListenerTelemetry};

/// Default datagram read-buffer size. A read never spans datagrams, so
/// this bounds the largest packet accepted.
pub const DEFAULT_READ_BUFFER: usize = 65535;

/// Default upper bound on one TCP line. Past it the stream is
/// desynchronized and the connection has to go.
pub const DEFAULT_TCP_LINE_LIMIT: usize = 4096;

async fn dispatch_lines(
    packet: &[u8],
    handler: &EventHandler,
    telemetry: &ListenerTelemetry,
    line_telemetry: &LineTelemetry,
) {
    for line in packet.split(|&b| b == b'\n') {
        telemetry.lines_received.increment(1);
        handler.queue(line_to_events(line, line_telemetry)).await;
    }
}

/// Reads StatsD lines from a UDP socket.
pub struct StatsdUdpListener {
    socket: UdpSocket,
    handler: EventHandler,
    telemetry: ListenerTelemetry,
    line_telemetry: LineTelemetry,
    read_buffer: usize,
}

impl StatsdUdpListener {
    pub fn new(
        socket: UdpSocket,
        handler: EventHandler,
        telemetry: ListenerTelemetry,
        line_telemetry: LineTelemetry,
    ) -> Self {
        Self {
            socket,
            handler,
            telemetry,
            line_telemetry,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }

    #[must_use]
    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes;
        self
    }

    pub fn set_event_handler(&mut self, handler: EventHandler) {
        self.handler = handler;
    }

    /// Run the read loop until shutdown or a socket failure. A persistent
    /// read error on a datagram socket is not recoverable, so it ends the
    /// task.
    pub async fn listen(&self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; self.read_buffer];
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, _)) => self.handle_packet(&buf[..n]).await,
                    Err(error) => {
                        error!(%error, "udp receive failed");
                        return;
                    }
                }
            }
        }
    }

    /// Handle one datagram: split on newlines and queue each parsed line.
    pub async fn handle_packet(&self, packet: &[u8]) {
        self.telemetry.udp_packets.increment(1);
        dispatch_lines(packet, &self.handler, &self.telemetry, &self.line_telemetry).await;
    }
}

/// Reads StatsD lines from a Unix datagram socket.
#[cfg(unix)]
pub struct StatsdUnixgramListener {
    socket: UnixDatagram,
    handler: EventHandler,
    telemetry: ListenerTelemetry,
    line_telemetry: LineTelemetry,
    read_buffer: usize,
}

#[cfg(unix)]
impl StatsdUnixgramListener {
    pub fn new(
        socket: UnixDatagram,
        handler: EventHandler,
        telemetry: ListenerTelemetry,
        line_telemetry: LineTelemetry,
    ) -> Self {
        Self {
            socket,
            handler,
            telemetry,
            line_telemetry,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }

    #[must_use]
    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes;
        self
    }

    pub fn set_event_handler(&mut self, handler: EventHandler) {
        self.handler = handler;
    }

    pub async fn listen(&self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; self.read_buffer];
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, _)) => self.handle_packet(&buf[..n]).await,
                    Err(error) => {
                        error!(%error, "unixgram receive failed");
                        return;
                    }
                }
            }
        }
    }

    pub async fn handle_packet(&self, packet: &[u8]) {
        self.telemetry.unixgram_packets.increment(1);
        dispatch_lines(packet, &self.handler, &self.telemetry, &self.line_telemetry).await;
    }
}

/// Accepts StatsD connections over TCP, one task per connection.
pub struct StatsdTcpListener {
    listener: TcpListener,
    handler: EventHandler,
    telemetry: ListenerTelemetry,
    line_telemetry: LineTelemetry,
    line_limit: usize,
}

impl StatsdTcpListener {
    pub fn new(
        listener: TcpListener,
        handler: EventHandler,
        telemetry: ListenerTelemetry,
        line_telemetry: LineTelemetry,
    ) -> Self {
        Self {
            listener,
            handler,
            telemetry,
            line_telemetry,
            line_limit: DEFAULT_TCP_LINE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_line_limit(mut self, bytes: usize) -> Self {
        self.line_limit = bytes;
        self
    }

    pub fn set_event_handler(&mut self, handler: EventHandler) {
        self.handler = handler;
    }

    /// Accept connections until shutdown or the listening socket fails.
    /// Returns only once every connection task has finished, so no
    /// handler call is still in flight afterwards.
    pub async fn listen(&self, shutdown: CancellationToken) {
        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.telemetry.tcp_connections.increment(1);
                        let handler = self.handler.clone();
                        let telemetry = self.telemetry.clone();
                        let line_telemetry = self.line_telemetry.clone();
                        let line_limit = self.line_limit;
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            handle_conn(
                                stream,
                                peer,
                                &handler,
                                &telemetry,
                                &line_telemetry,
                                line_limit,
                                shutdown,
                            )
                            .await;
                        });
                    }
                    Err(error) => {
                        error!(%error, "tcp accept failed");
                        break;
                    }
                }
            }
        }

        // Connection tasks watch the same token, so this wait is bounded.
        connections.close();
        connections.wait().await;
    }

    /// Drive a single connection to completion on the caller's task.
    pub async fn handle_conn(&self, stream: TcpStream, peer: SocketAddr) {
        handle_conn(
            stream,
            peer,
            &self.handler,
            &self.telemetry,
            &self.line_telemetry,
            self.line_limit,
            CancellationToken::new(),
        )
        .await;
    }
}

async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &EventHandler,
    telemetry: &ListenerTelemetry,
    line_telemetry: &LineTelemetry,
    line_limit: usize,
    shutdown: CancellationToken,
) {
    let codec = AnyDelimiterCodec::new_with_max_length(vec![b'\n'], Vec::new(), line_limit);
    let mut lines = FramedRead::new(stream, codec);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            frame = lines.next() => match frame {
                // EOF: the peer closed cleanly.
                None => return,
                Some(Ok(line)) => {
                    telemetry.lines_received.increment(1);
                    handler.queue(line_to_events(&line, line_telemetry)).await;
                }
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    // The rest of the stream can no longer be framed.
                    telemetry.tcp_line_too_long.increment(1);
                    debug!(%peer, "line too long, closing connection");
                    return;
                }
                Some(Err(AnyDelimiterCodecError::Io(error))) => {
                    telemetry.tcp_errors.increment(1);
                    debug!(%peer, %error, "read failed");
                    return;
                }
            }
        }
    }
}
