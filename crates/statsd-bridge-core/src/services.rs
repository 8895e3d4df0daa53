// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Supervisor for the ingestion pipeline.
//!
//! Owns the event queue and one task per enabled listener. Listeners and
//! the flush loop hang off separate cancellation tokens so shutdown can
//! drain the listeners before the last flush runs. The batch channel is
//! handed to the caller, who owns every batch the moment it is received.

use std::sync::Arc;

use statsd::event::Events;
#[cfg(unix)]
use statsd::listener::StatsdUnixgramListener;
use statsd::listener::{StatsdTcpListener, StatsdUdpListener};
use statsd::queue::{EventHandler, EventQueue, FlushTicker};
use statsd::telemetry::{LineTelemetry, ListenerTelemetry, QueueTelemetry};
use statsd::util::{tcp_addr, udp_addr};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// How many undelivered batches the exporter channel holds before queue
/// flushes start blocking.
const BATCH_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle of the bridge services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

/// The running pipeline.
pub struct BridgeServices {
    config: BridgeConfig,
}

/// Handle to the running pipeline: the batch channel for the exporter and
/// the shutdown control.
pub struct BridgeHandle {
    /// Batches flushed by the queue. Closes after [`BridgeHandle::stop`]
    /// once the final flush went through.
    pub events: mpsc::Receiver<Events>,
    queue: Option<Arc<EventQueue>>,
    listener_shutdown: CancellationToken,
    flush_shutdown: CancellationToken,
    listener_tasks: Vec<JoinHandle<()>>,
    flush_task: Option<JoinHandle<()>>,
}

impl BridgeServices {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Bind the configured sockets and start the listener and flush tasks.
    pub async fn start(self) -> Result<BridgeHandle, BridgeError> {
        let config = self.config;
        config.validate()?;

        #[cfg(not(unix))]
        if config.listen_unixgram.is_some() {
            return Err(BridgeError::InvalidConfig(
                "unixgram listener is only supported on unix".to_string(),
            ));
        }

        let listener_shutdown = CancellationToken::new();
        let flush_shutdown = CancellationToken::new();
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

        let queue = Arc::new(EventQueue::new(
            batch_tx,
            config.queue_size,
            config.queue_interval,
            QueueTelemetry::new(),
        ));
        let handler = EventHandler::Queue(Arc::clone(&queue));

        let listener_telemetry = ListenerTelemetry::new();
        let line_telemetry = LineTelemetry::new();

        let mut listener_tasks = Vec::new();

        let ticker = queue.flush_ticker();
        let flush_task = tokio::spawn(
            Arc::clone(&queue).run_flush_loop(ticker, flush_shutdown.clone()),
        );

        if let Some(ref addr) = config.listen_udp {
            let resolved = udp_addr(addr).map_err(|source| BridgeError::Addr {
                listener: "udp",
                addr: addr.clone(),
                source,
            })?;
            let socket = UdpSocket::bind(resolved)
                .await
                .map_err(|source| BridgeError::Bind {
                    listener: "udp",
                    addr: addr.clone(),
                    source,
                })?;
            info!(addr = %resolved, "statsd-udp: listening");

            let listener = StatsdUdpListener::new(
                socket,
                handler.clone(),
                listener_telemetry.clone(),
                line_telemetry.clone(),
            )
            .with_read_buffer(config.read_buffer);
            let token = listener_shutdown.clone();
            listener_tasks.push(tokio::spawn(async move { listener.listen(token).await }));
        }

        if let Some(ref addr) = config.listen_tcp {
            let resolved = tcp_addr(addr).map_err(|source| BridgeError::Addr {
                listener: "tcp",
                addr: addr.clone(),
                source,
            })?;
            let socket = TcpListener::bind(resolved)
                .await
                .map_err(|source| BridgeError::Bind {
                    listener: "tcp",
                    addr: addr.clone(),
                    source,
                })?;
            info!(addr = %resolved, "statsd-tcp: listening");

            let listener = StatsdTcpListener::new(
                socket,
                handler.clone(),
                listener_telemetry.clone(),
                line_telemetry.clone(),
            )
            .with_line_limit(config.tcp_line_limit);
            let token = listener_shutdown.clone();
            listener_tasks.push(tokio::spawn(async move { listener.listen(token).await }));
        }

        #[cfg(unix)]
        if let Some(ref path) = config.listen_unixgram {
            // A socket file left behind by a previous run would make the
            // bind fail forever.
            let _ = std::fs::remove_file(path);
            let socket = tokio::net::UnixDatagram::bind(path).map_err(|source| {
                BridgeError::Bind {
                    listener: "unixgram",
                    addr: path.clone(),
                    source,
                }
            })?;
            info!(path = %path, "statsd-unixgram: listening");

            let listener = StatsdUnixgramListener::new(
                socket,
                handler.clone(),
                listener_telemetry.clone(),
                line_telemetry.clone(),
            )
            .with_read_buffer(config.read_buffer);
            let token = listener_shutdown.clone();
            listener_tasks.push(tokio::spawn(async move { listener.listen(token).await }));
        }

        Ok(BridgeHandle {
            events: batch_rx,
            queue: Some(queue),
            listener_shutdown,
            flush_shutdown,
            listener_tasks,
            flush_task: Some(flush_task),
        })
    }
}

impl BridgeHandle {
    pub fn status(&self) -> ServiceStatus {
        if self.listener_shutdown.is_cancelled() {
            ServiceStatus::Stopped
        } else {
            ServiceStatus::Running
        }
    }

    /// Stop the pipeline in order: close the listeners and wait for every
    /// in-flight packet and connection to finish, stop the periodic flush
    /// loop, then flush the remainder once. Idempotent. The batch channel
    /// closes after the final flush; keep draining `events` to observe it.
    pub async fn stop(&mut self) {
        if self.listener_shutdown.is_cancelled() {
            return;
        }

        self.listener_shutdown.cancel();
        for task in self.listener_tasks.drain(..) {
            let _ = task.await;
        }

        self.flush_shutdown.cancel();
        if let Some(task) = self.flush_task.take() {
            let _ = task.await;
        }

        // Every producer is gone now, so this is the one final flush.
        if let Some(queue) = self.queue.take() {
            queue.flush().await;
        }
        info!("statsd listeners stopped");
    }
}
