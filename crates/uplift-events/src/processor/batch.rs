// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The batching engine: a bounded intake queue drained by a single worker
//! task that accumulates context-homogeneous batches and flushes them on
//! whichever of size, deadline, explicit request, or shutdown comes first.
//!
//! Producers only ever perform a non-blocking enqueue; when the queue is at
//! capacity the event is shed and the drop logged. The accumulation buffer
//! is guarded by a per-instance mutex held for append and for the
//! swap-and-clear at flush time, and released before any encode/notify/
//! dispatch I/O, so a slow delivery never stalls intake.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::builder::PayloadBuilder;
use crate::dispatcher::EventDispatcher;
use crate::event::UserEvent;
use crate::notification::{Notifier, LOG_EVENT_TOPIC};

use super::EventProcessor;

const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the worker waits on the queue before re-checking the flush
/// deadline. Bounds deadline latency without busy-spinning.
const POLL_WAIT: Duration = Duration::from_millis(50);

/// Construction options for [`BatchProcessor`]. Non-positive values fall
/// back to the documented defaults.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Bounded intake queue capacity, in entries (default 1000).
    pub queue_capacity: usize,
    /// Events accumulated before a size-triggered flush (default 10).
    pub batch_size: usize,
    /// Longest time an event sits in the accumulation buffer, measured
    /// from the oldest pending event (default 30s).
    pub flush_interval: Duration,
    /// How long [`BatchProcessor::close`] waits for the worker to drain
    /// (default 5s).
    pub shutdown_timeout: Duration,
    /// Spawn the worker from the constructor instead of waiting for an
    /// explicit [`BatchProcessor::start`] call (default false).
    pub start_on_build: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            start_on_build: false,
        }
    }
}

impl BatchConfig {
    /// Replaces non-positive values with the defaults.
    fn sanitized(self) -> Self {
        let mut config = self;
        if config.queue_capacity == 0 {
            warn!("queue capacity must be positive, using default of {DEFAULT_QUEUE_CAPACITY}");
            config.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        if config.batch_size == 0 {
            warn!("batch size must be positive, using default of {DEFAULT_BATCH_SIZE}");
            config.batch_size = DEFAULT_BATCH_SIZE;
        }
        if config.flush_interval.is_zero() {
            warn!(
                "flush interval must be positive, using default of {:?}",
                DEFAULT_FLUSH_INTERVAL
            );
            config.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if config.shutdown_timeout.is_zero() {
            warn!(
                "shutdown timeout must be positive, using default of {:?}",
                DEFAULT_SHUTDOWN_TIMEOUT
            );
            config.shutdown_timeout = DEFAULT_SHUTDOWN_TIMEOUT;
        }
        config
    }
}

/// One entry on the intake queue: an event to accumulate or a control
/// signal. Signals share the channel with events so they are processed in
/// arrival order.
#[derive(Debug)]
enum QueueEntry {
    Event(UserEvent),
    Flush,
    Shutdown,
}

/// Worker bookkeeping behind the processor's state lock. The receive half
/// of the queue lives here between runs so the processor can be restarted
/// after a clean close.
struct WorkerState {
    started: bool,
    rx: Option<mpsc::Receiver<QueueEntry>>,
    worker: Option<JoinHandle<mpsc::Receiver<QueueEntry>>>,
}

/// Batching [`EventProcessor`]: a single consumer task pulls events off the
/// bounded queue and buffers them until the configured batch size is
/// reached or the flush interval expires, then dispatches the batch as one
/// payload.
pub struct BatchProcessor {
    config: BatchConfig,
    tx: mpsc::Sender<QueueEntry>,
    buffer: Arc<Mutex<Vec<UserEvent>>>,
    builder: Arc<dyn PayloadBuilder>,
    dispatcher: Arc<dyn EventDispatcher>,
    notifier: Option<Arc<dyn Notifier>>,
    state: Mutex<WorkerState>,
}

impl BatchProcessor {
    /// Creates a processor with the given collaborators. Must be called in
    /// a tokio runtime context when `config.start_on_build` is set.
    pub fn new(
        config: BatchConfig,
        builder: Arc<dyn PayloadBuilder>,
        dispatcher: Arc<dyn EventDispatcher>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let config = config.sanitized();
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let processor = BatchProcessor {
            config,
            tx,
            buffer: Arc::new(Mutex::new(Vec::new())),
            builder,
            dispatcher,
            notifier,
            state: Mutex::new(WorkerState {
                started: false,
                rx: Some(rx),
                worker: None,
            }),
        };
        if processor.config.start_on_build {
            processor.start();
        }
        processor
    }

    /// Whether the worker task is currently running.
    pub fn is_started(&self) -> bool {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("state lock poisoned");
        state.started
    }

    /// Spawns the background worker and arms the first flush deadline.
    /// A warning-level no-op when the processor is already started.
    pub fn start(&self) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("state lock poisoned");
        if state.started {
            warn!("batch processor already started");
            return;
        }
        let Some(rx) = state.rx.take() else {
            error!("batch processor cannot be restarted after a timed out close");
            return;
        };

        let worker = Worker {
            rx,
            buffer: Arc::clone(&self.buffer),
            builder: Arc::clone(&self.builder),
            dispatcher: Arc::clone(&self.dispatcher),
            notifier: self.notifier.clone(),
            batch_size: self.config.batch_size,
            flush_interval: self.config.flush_interval,
        };
        state.worker = Some(tokio::spawn(worker.run()));
        state.started = true;
        info!("batch processor started");
    }

    /// Validates and enqueues one event. Non-blocking: when the queue is
    /// at capacity the event is dropped and the drop logged — producers
    /// are never stalled by a slow intake.
    pub fn process(&self, event: UserEvent) {
        if let Err(e) = event.validate() {
            error!("dropping malformed event: {e}");
            return;
        }
        debug!("received user event {}", event.uuid());

        if self.tx.try_send(QueueEntry::Event(event)).is_err() {
            error!(
                "event not accepted by the queue, dropping it (current size: {})",
                self.queue_depth()
            );
        }
    }

    /// Requests an asynchronous flush of whatever is buffered. Non-blocking;
    /// the flush happens on the worker once the signal is dequeued.
    pub fn flush(&self) {
        if self.tx.try_send(QueueEntry::Flush).is_err() {
            error!(
                "flush signal not accepted by the queue (current size: {})",
                self.queue_depth()
            );
        }
    }

    /// Signals shutdown, then waits up to the configured timeout for the
    /// worker to drain and exit. The worker is never aborted: on timeout an
    /// error is logged and the call returns with the worker detached.
    pub async fn close(&self) {
        info!("closing batch processor");
        let worker = {
            #[allow(clippy::expect_used)]
            let mut state = self.state.lock().expect("state lock poisoned");
            if !state.started {
                warn!("batch processor already stopped");
                return;
            }
            state.started = false;
            state.worker.take()
        };
        let Some(worker) = worker else {
            return;
        };

        if self.tx.send(QueueEntry::Shutdown).await.is_err() {
            error!("event queue closed before the shutdown signal could be sent");
        }

        match timeout(self.config.shutdown_timeout, worker).await {
            Ok(Ok(rx)) => {
                #[allow(clippy::expect_used)]
                let mut state = self.state.lock().expect("state lock poisoned");
                state.rx = Some(rx);
                info!("batch processor stopped");
            }
            Ok(Err(e)) => error!("batch worker failed before exiting: {e}"),
            Err(_) => error!(
                "timeout of {:?} exceeded while waiting for the batch worker to stop",
                self.config.shutdown_timeout
            ),
        }
    }

    fn queue_depth(&self) -> usize {
        self.config.queue_capacity - self.tx.capacity()
    }
}

#[async_trait::async_trait]
impl EventProcessor for BatchProcessor {
    async fn process(&self, event: UserEvent) {
        BatchProcessor::process(self, event);
    }
}

/// Single consumer for one processor's queue. Owns the receive half while
/// running and returns it on exit so the processor can be restarted.
struct Worker {
    rx: mpsc::Receiver<QueueEntry>,
    buffer: Arc<Mutex<Vec<UserEvent>>>,
    builder: Arc<dyn PayloadBuilder>,
    dispatcher: Arc<dyn EventDispatcher>,
    notifier: Option<Arc<dyn Notifier>>,
    batch_size: usize,
    flush_interval: Duration,
}

impl Worker {
    async fn run(mut self) -> mpsc::Receiver<QueueEntry> {
        debug!("batch worker running");
        let mut deadline = Instant::now() + self.flush_interval;

        loop {
            if Instant::now() > deadline {
                debug!("flush deadline exceeded, flushing current batch");
                self.flush_buffer().await;
                deadline = Instant::now() + self.flush_interval;
            }

            let entry = match timeout(POLL_WAIT, self.rx.recv()).await {
                // Empty queue for a poll interval; go back to the deadline
                // check.
                Err(_) => continue,
                Ok(None) => {
                    debug!("event queue closed, stopping worker");
                    break;
                }
                Ok(Some(entry)) => entry,
            };

            match entry {
                QueueEntry::Shutdown => {
                    debug!("received shutdown signal");
                    break;
                }
                QueueEntry::Flush => {
                    debug!("received flush signal");
                    self.flush_buffer().await;
                }
                QueueEntry::Event(event) => {
                    deadline = self.append(event, deadline).await;
                }
            }
        }

        info!("exiting processing loop, flushing pending events");
        self.flush_buffer().await;
        self.rx
    }

    /// Appends one event to the accumulation buffer, flushing first on a
    /// context change and after on reaching the batch size. Returns the
    /// (possibly re-armed) flush deadline.
    async fn append(&mut self, event: UserEvent, deadline: Instant) -> Instant {
        let splits = {
            #[allow(clippy::expect_used)]
            let buffer = self.buffer.lock().expect("buffer lock poisoned");
            buffer
                .last()
                .map_or(false, |last| !last.context().is_compatible(event.context()))
        };
        if splits {
            debug!("event context changed, flushing current batch");
            self.flush_buffer().await;
        }

        let mut deadline = deadline;
        let buffered = {
            #[allow(clippy::expect_used)]
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            if buffer.is_empty() {
                // The timer measures time since the oldest pending event,
                // not time since the worker started.
                deadline = Instant::now() + self.flush_interval;
            }
            buffer.push(event);
            buffer.len()
        };

        if buffered >= self.batch_size {
            debug!(
                "batch size of {} reached, flushing current batch",
                self.batch_size
            );
            self.flush_buffer().await;
        }
        deadline
    }

    /// Detaches the current batch under the buffer lock, then encodes,
    /// notifies, and dispatches it with the lock released.
    async fn flush_buffer(&mut self) {
        let batch = {
            #[allow(clippy::expect_used)]
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        let payload = match self.builder.build_request(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode batch of {} events: {e}", batch.len());
                return;
            }
        };

        if let Some(notifier) = &self.notifier {
            notifier.notify(LOG_EVENT_TOPIC, &payload);
        }
        if let Err(e) = self.dispatcher.dispatch(&payload).await {
            error!(
                "error dispatching {} events to {}: {e}",
                batch.len(),
                payload.url
            );
        }
    }
}
