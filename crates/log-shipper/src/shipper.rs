// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The shipper handle and its background flush task.
//!
//! # Flow
//!
//! ```text
//!   producers ──push──> EventQueue ──take_batch──> Transport ──> collector
//!                          ^                          │
//!                          └──── requeue_front ───────┘ (on failure, within budget)
//! ```
//!
//! A flush is triggered by the periodic timer or, right after an enqueue, by
//! the queue reaching `batch_size`. Both triggers wake the same task, and
//! flushes are serialized, so at most one batch is ever in flight.
//!
//! The task stops when [`LogShipper::shutdown`] is called or when the last
//! handle is dropped, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use log_collector_proto::{LogEvent, Severity};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::availability::AvailabilityTracker;
use crate::config::ShipperConfig;
use crate::error::ShipperError;
use crate::queue::EventQueue;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{HttpTransport, Transport};

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty; nothing was sent.
    Idle,
    /// A batch of this many events was accepted.
    Sent(usize),
    /// The batch failed and went back to the front of the queue.
    Requeued(usize),
    /// The batch failed with the retry budget exhausted and was discarded.
    Dropped(usize),
}

impl FlushOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, FlushOutcome::Requeued(_) | FlushOutcome::Dropped(_))
    }
}

struct Inner {
    config: ShipperConfig,
    queue: EventQueue,
    transport: Arc<dyn Transport>,
    availability: AvailabilityTracker,
    retry: Mutex<RetryPolicy>,
    flush_requested: Notify,
    cancel_token: CancellationToken,
    started: AtomicBool,
    task: StdMutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to one shipping client.
#[derive(Clone)]
pub struct LogShipper {
    inner: Arc<Inner>,
    // Held only by handles, never by the flush task.
    _lifetime: Arc<DropGuard>,
}

impl std::fmt::Debug for LogShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogShipper")
            .field("config", &self.inner.config)
            .field("queue_len", &self.inner.queue.len())
            .field("available", &self.inner.availability.is_available())
            .finish()
    }
}

impl LogShipper {
    /// Creates a shipper posting to the configured collector over HTTP.
    pub fn new(config: ShipperConfig) -> Result<Self, ShipperError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(config, transport)
    }

    /// Creates a shipper that hands its batches to `transport`.
    pub fn with_transport(
        config: ShipperConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ShipperError> {
        config.validate()?;
        let inner = Inner {
            queue: EventQueue::new(
                config.queue_capacity,
                config.overflow_policy,
                config.warning_cooldown,
            ),
            availability: AvailabilityTracker::new(config.warning_cooldown),
            retry: Mutex::new(RetryPolicy::new(config.max_retries)),
            transport,
            flush_requested: Notify::new(),
            cancel_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            task: StdMutex::new(None),
            config,
        };
        let lifetime = inner.cancel_token.clone().drop_guard();
        Ok(LogShipper {
            inner: Arc::new(inner),
            _lifetime: Arc::new(lifetime),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.inner.config
    }

    /// Spawns the background flush task on the current tokio runtime.
    ///
    /// A disabled shipper starts nothing. Either way a second call fails with
    /// [`ShipperError::AlreadyStarted`]. Outside a runtime the call fails with
    /// [`ShipperError::NoRuntime`] and may be retried from within one.
    pub fn start(&self) -> Result<(), ShipperError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ShipperError::NoRuntime)?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ShipperError::AlreadyStarted);
        }
        if !self.inner.config.enabled {
            debug!("SHIPPER | Shipping disabled, not starting flush task");
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move { inner.run().await });
        *self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(
            "SHIPPER | Started for service {} (batch size {}, flush every {:?})",
            self.inner.config.service_name,
            self.inner.config.batch_size,
            self.inner.config.flush_interval
        );
        Ok(())
    }

    /// Enqueues an event. Never blocks and never fails.
    pub fn log(&self, event: LogEvent) {
        if !self.inner.config.enabled {
            return;
        }
        let len = self.inner.queue.push(event);
        if len >= self.inner.config.batch_size {
            self.inner.flush_requested.notify_one();
        }
    }

    /// Builds an event for this shipper's service and enqueues it.
    ///
    /// The correlation id provider, if any, is consulted now rather than at
    /// flush time.
    pub fn emit(&self, severity: Severity, message: impl Into<String>, logger: Option<&str>) {
        if !self.inner.config.enabled {
            return;
        }
        self.log(self.build_event(severity, message.into(), logger));
    }

    fn build_event(
        &self,
        severity: Severity,
        message: String,
        logger: Option<&str>,
    ) -> LogEvent {
        let correlation_id = self
            .inner
            .config
            .correlation_id_fn
            .as_ref()
            .and_then(|provider| provider());
        LogEvent::new(self.inner.config.service_name.clone(), severity, message)
            .with_correlation_id(correlation_id)
            .with_logger(logger.map(String::from))
            .with_thread(std::thread::current().name().map(String::from))
    }

    pub fn debug(&self, message: impl Into<String>, logger: Option<&str>) {
        self.emit(Severity::Debug, message, logger);
    }

    pub fn info(&self, message: impl Into<String>, logger: Option<&str>) {
        self.emit(Severity::Info, message, logger);
    }

    pub fn warn(&self, message: impl Into<String>, logger: Option<&str>) {
        self.emit(Severity::Warn, message, logger);
    }

    pub fn error(&self, message: impl Into<String>, logger: Option<&str>) {
        self.emit(Severity::Error, message, logger);
    }

    /// Sends one event immediately to the single-event endpoint, bypassing
    /// the queue. Failures are returned to the caller and not retried.
    pub async fn send_now(&self, event: LogEvent) -> Result<(), ShipperError> {
        if !self.inner.config.enabled {
            return Err(ShipperError::Disabled);
        }
        match self.inner.transport.send_one(&event).await {
            Ok(()) => {
                self.inner.availability.record_success();
                Ok(())
            }
            Err(e) => {
                self.inner.availability.record_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Runs one flush now, serialized with the background task.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Events lost to queue overflow.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.queue.dropped()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.availability.is_available()
    }

    #[cfg(test)]
    pub(crate) fn take_queued(&self, max: usize) -> Vec<LogEvent> {
        self.inner.queue.take_batch(max)
    }

    /// Consecutive failed flushes counted against the retry budget.
    pub async fn retry_count(&self) -> u32 {
        self.inner.retry.lock().await.failures()
    }

    /// Stops the timer, then drains the queue.
    ///
    /// Draining stops early after `max_retries` consecutive failed flushes
    /// (at least one), so an unreachable collector cannot hang shutdown.
    /// Returns the number of events left undelivered.
    pub async fn shutdown(&self) -> usize {
        self.inner.cancel_token.cancel();
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("SHIPPER | Flush task ended abnormally: {e}");
            }
        }

        let attempts = self.inner.config.max_retries.max(1);
        let mut failures = 0;
        while !self.inner.queue.is_empty() {
            match self.inner.flush().await {
                FlushOutcome::Idle => break,
                FlushOutcome::Sent(_) => failures = 0,
                FlushOutcome::Requeued(_) | FlushOutcome::Dropped(_) => {
                    failures += 1;
                    if failures >= attempts {
                        break;
                    }
                }
            }
        }

        let abandoned = self.inner.queue.clear();
        if abandoned > 0 {
            warn!("SHIPPER | Shutting down with collector unreachable, dropped {abandoned} pending event(s)");
        }
        abandoned
    }
}

impl Inner {
    async fn run(&self) {
        let mut ticker = interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("SHIPPER | Received shutdown signal, stopping flush timer");
                    break;
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
                () = self.flush_requested.notified() => {
                    self.flush_full_batches().await;
                }
            }
        }
    }

    /// Sends full batches until fewer than `batch_size` events remain or a
    /// send fails.
    async fn flush_full_batches(&self) {
        while self.queue.len() >= self.config.batch_size {
            if self.flush().await.is_failure() {
                break;
            }
        }
    }

    async fn flush(&self) -> FlushOutcome {
        let mut retry = self.retry.lock().await;

        let batch = self.queue.take_batch(self.config.batch_size);
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }
        let size = batch.len();

        match self.transport.send(&batch).await {
            Ok(()) => {
                retry.on_success();
                self.availability.record_success();
                debug!("SHIPPER | Flushed {size} log(s)");
                FlushOutcome::Sent(size)
            }
            Err(e) => {
                self.availability.record_failure(&e);
                match retry.on_failure() {
                    RetryDecision::Requeue => {
                        debug!(
                            "SHIPPER | Failed to flush {size} log(s) (attempt {} of {}), re-queued",
                            retry.failures(),
                            self.config.max_retries
                        );
                        self.queue.requeue_front(batch);
                        FlushOutcome::Requeued(size)
                    }
                    RetryDecision::Drop => {
                        warn!("SHIPPER | Max retries reached. Dropping {size} log(s).");
                        FlushOutcome::Dropped(size)
                    }
                }
            }
        }
    }
}
