//! # Background Refresh
//!
//! A single task per validator that reloads the document once it is older
//! than the configured TTL. The task sleeps until the current document is
//! due to expire, reloads, and goes back to sleep. A failed reload leaves
//! the previous document in the cache and is retried one TTL later.
//!
//! Cancelling the token (directly, through [`RefreshScheduler::stop`], or by
//! dropping the scheduler) ends the task at its next await point, including
//! mid-reload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::SpecCache;
use crate::error::LoadError;
use crate::source::SpecSource;

/// Handle to a running refresh task.
#[derive(Debug)]
pub struct RefreshScheduler {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    exited: Arc<AtomicBool>,
}

impl RefreshScheduler {
    /// Spawn the refresh task on the current Tokio runtime.
    pub fn start(
        source: Arc<SpecSource>,
        cache: Arc<SpecCache>,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let token = cancel.clone();
        let exited = Arc::new(AtomicBool::new(false));
        let exit_flag = Arc::clone(&exited);
        let handle = tokio::spawn(async move {
            tracing::debug!(ttl = ?ttl, "schema refresh task started");
            loop {
                let wait = next_wait(&cache, ttl);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                let stale = cache.snapshot().map_or(true, |spec| spec.is_stale(ttl));
                if !stale {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = reload(&source, &cache) => {}
                }
            }
            tracing::debug!("schema refresh task stopped");
            exit_flag.store(true, Ordering::Release);
        });
        Self {
            cancel,
            handle: Mutex::new(Some(handle)),
            exited,
        }
    }

    /// Whether the task has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "schema refresh task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Time until the cached document expires. A document that is already
/// stale (a refresh just failed) is retried after a full TTL.
fn next_wait(cache: &SpecCache, ttl: Duration) -> Duration {
    match cache.snapshot() {
        Some(spec) => {
            let remaining = spec.remaining(ttl);
            if remaining.is_zero() {
                ttl
            } else {
                remaining
            }
        }
        None => ttl,
    }
}

/// Load the document again and publish it. On failure the cache is left
/// untouched.
pub(crate) async fn reload(source: &SpecSource, cache: &SpecCache) -> Result<(), LoadError> {
    match source.load().await {
        Ok(document) => {
            tracing::info!(
                location = source.location(),
                operations = document.operations().len(),
                version = document.version().unwrap_or(""),
                "schema document reloaded"
            );
            cache.replace(document);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(
                location = source.location(),
                error = %e,
                "schema reload failed; keeping previous document"
            );
            Err(e)
        }
    }
}
