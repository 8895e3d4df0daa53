// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched hand-off between the listeners and the exporter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{Event, Events};
use crate::telemetry::QueueTelemetry;

/// Size- and time-triggered event batcher.
///
/// Events accumulate in an internal buffer; whenever the buffer reaches
/// the flush threshold a batch of exactly that size is sent on the
/// outgoing channel, so the buffer holds fewer than the threshold at any
/// resting point. Partial batches are drained by the periodic flush loop.
/// A lagging consumer blocks the channel send, which is the only
/// back-pressure path in the pipeline.
pub struct EventQueue {
    out: mpsc::Sender<Events>,
    flush_threshold: usize,
    flush_interval: Duration,
    inner: Mutex<Buffer>,
    telemetry: QueueTelemetry,
}

struct Buffer {
    events: Vec<Event>,
    last_flush: Instant,
}

impl EventQueue {
    pub fn new(
        out: mpsc::Sender<Events>,
        flush_threshold: usize,
        flush_interval: Duration,
        telemetry: QueueTelemetry,
    ) -> Self {
        Self {
            out,
            flush_threshold,
            flush_interval,
            inner: Mutex::new(Buffer {
                events: Vec::with_capacity(flush_threshold),
                last_flush: Instant::now(),
            }),
            telemetry,
        }
    }

    /// Append events, sending every full batch before returning. Events
    /// keep their insertion order within a batch, and batches leave in
    /// flush order.
    pub async fn queue(&self, events: Events) {
        let mut inner = self.inner.lock().await;
        inner.events.extend(events);
        while inner.events.len() >= self.flush_threshold {
            let batch: Events = inner.events.drain(..self.flush_threshold).collect();
            self.send_batch(&mut inner, batch).await;
        }
    }

    /// Number of currently buffered events.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.events.len()
    }

    /// Send whatever is buffered as one batch, which may be smaller than
    /// the flush threshold. An empty buffer is left alone.
    pub async fn flush(&self) {
        let mut inner = self.inner.lock().await;
        if inner.events.is_empty() {
            return;
        }
        let batch: Events = inner.events.drain(..).collect();
        self.send_batch(&mut inner, batch).await;
    }

    async fn send_batch(&self, inner: &mut Buffer, batch: Events) {
        debug!(
            events = batch.len(),
            since_last_flush_ms = inner.last_flush.elapsed().as_millis() as u64,
            "flushing batch"
        );
        if self.out.send(batch).await.is_err() {
            debug!("batch receiver dropped, discarding events");
            return;
        }
        self.telemetry.events_flushed.increment(1);
        inner.last_flush = Instant::now();
    }

    /// A production tick source matching this queue's flush interval.
    pub fn flush_ticker(&self) -> FlushTicker {
        FlushTicker::interval(self.flush_interval)
    }

    /// Drain partial batches on every tick until shutdown. Cancellation
    /// only stops the ticking: the final flush belongs to the supervisor,
    /// which issues it once every producer has stopped queueing.
    pub async fn run_flush_loop(self: Arc<Self>, mut ticker: FlushTicker, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = ticker.tick() => self.flush().await,
                () = shutdown.cancelled() => return,
            }
        }
    }
}

/// Tick source for the periodic flush. The interval variant is the real
/// clock; the manual variant lets tests drive flushes deterministically.
pub enum FlushTicker {
    Interval(Interval),
    Manual(mpsc::Receiver<()>),
}

impl FlushTicker {
    pub fn interval(period: Duration) -> Self {
        FlushTicker::Interval(interval_at(Instant::now() + period, period))
    }

    pub fn manual() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (tx, FlushTicker::Manual(rx))
    }

    pub async fn tick(&mut self) {
        match self {
            FlushTicker::Interval(interval) => {
                interval.tick().await;
            }
            FlushTicker::Manual(ticks) => {
                if ticks.recv().await.is_none() {
                    // All tick senders are gone; never fire again.
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

/// Hand-off the listeners push parsed events through.
#[derive(Clone)]
pub enum EventHandler {
    /// Batch through an [`EventQueue`].
    Queue(Arc<EventQueue>),
    /// Forward every parsed slice as its own batch, bypassing batching.
    /// Tests use this to observe parser output directly.
    Unbuffered(mpsc::Sender<Events>),
}

impl EventHandler {
    pub async fn queue(&self, events: Events) {
        match self {
            EventHandler::Queue(queue) => queue.queue(events).await,
            EventHandler::Unbuffered(out) => {
                let _ = out.send(events).await;
            }
        }
    }
}
