//! # Flush Worker
//!
//! Background task that drains the pending write.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Flush Worker Loop                                │
//! │                                                                         │
//! │   interval tick ──┐                                                     │
//! │                   ├──► inside retry window? ── yes ──► skip             │
//! │                   │            │ no                                     │
//! │   trigger() ──────┴────────────┴──► engine.flush_pending_payload()      │
//! │                                          │                              │
//! │                  ┌───────────────────────┼──────────────────┐           │
//! │                  ▼                       ▼                  ▼           │
//! │          Flushed / Nothing        BackedOff / ...          Err          │
//! │          reset backoff            leave schedule     retry_at = now +   │
//! │                                                      next_backoff()     │
//! │                                                                         │
//! │   shutdown() ──► loop exits                                            │
//! │                                                                         │
//! │  • Poll interval: 60 seconds (configurable)                            │
//! │  • Retry delay: exponential, 1s doubling up to 15 minutes              │
//! │  • trigger() bypasses the retry window                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FlushSettings;
use crate::engine::{FlushOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};

/// Drives [`SyncEngine::flush_pending_payload`] in the background.
pub struct FlushWorker {
    engine: Arc<SyncEngine>,
    settings: FlushSettings,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the flush worker.
#[derive(Clone)]
pub struct FlushWorkerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl FlushWorkerHandle {
    /// Requests an immediate flush. Requests made while one is queued
    /// collapse into it.
    pub fn trigger(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => {
                Err(SyncError::ChannelError("Flush worker stopped".into()))
            }
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

impl FlushWorker {
    /// Creates a new worker and returns its handle.
    pub fn new(engine: Arc<SyncEngine>, settings: FlushSettings) -> (Self, FlushWorkerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = FlushWorker {
            engine,
            settings,
            trigger_rx,
            shutdown_rx,
        };
        let handle = FlushWorkerHandle {
            trigger_tx,
            shutdown_tx,
        };

        (worker, handle)
    }

    /// Creates the worker and spawns it on the current runtime.
    pub fn spawn(engine: Arc<SyncEngine>, settings: FlushSettings) -> (FlushWorkerHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(engine, settings);
        (handle, tokio::spawn(worker.run()))
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            "Flush worker starting"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut backoff = self.create_backoff();
        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if retry_at.is_some_and(|at| Instant::now() < at) {
                        debug!("Inside retry window, skipping tick");
                        continue;
                    }
                    self.flush_once(&mut backoff, &mut retry_at).await;
                }

                Some(()) = self.trigger_rx.recv() => {
                    self.flush_once(&mut backoff, &mut retry_at).await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Flush worker shutting down");
                    break;
                }
            }
        }

        info!("Flush worker stopped");
    }

    async fn flush_once(&self, backoff: &mut ExponentialBackoff, retry_at: &mut Option<Instant>) {
        match self.engine.flush_pending_payload().await {
            Ok(FlushOutcome::Flushed | FlushOutcome::NothingPending) => {
                backoff.reset();
                *retry_at = None;
            }
            Ok(outcome) => debug!(?outcome, "Flush skipped"),
            Err(err) => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| self.settings.max_backoff());
                *retry_at = Some(Instant::now() + delay);
                warn!(
                    error = %err,
                    retryable = err.is_retryable(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Flush failed, retrying later"
                );
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
