//! Background Expiry Sweeper
//!
//! Lazy expiry (checking on access) keeps reads correct, but a key that
//! expires and is never touched again would stay in memory forever. The
//! sweeper is a tokio task that wakes on a fixed interval and removes every
//! string key whose expiration has passed.
//!
//! The task holds only an `Arc<StorageEngine>`. It stops when
//! [`ExpirySweeper::stop`] is called or the handle is dropped.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Shortest accepted sweep interval.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task is stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweeper onto the current tokio runtime.
    ///
    /// An interval below one millisecond is raised to one millisecond.
    ///
    /// # Example
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use gredis::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// sweeper.shutdown().await;
    /// # });
    /// ```
    pub fn start(engine: Arc<StorageEngine>, mut config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        config.interval = config.interval.max(MIN_INTERVAL);
        let interval = config.interval;
        let task = tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!(interval_ms = interval.as_millis() as u64, "Background expiry sweeper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the sweeper to stop. Does not wait for it.
    pub fn stop(&self) {
        // Err means the task is already gone.
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }

    /// Signals the sweeper to stop and waits for the task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.cleanup_expired();
        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
