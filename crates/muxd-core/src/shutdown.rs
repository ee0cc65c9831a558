//! Process-wide shutdown coordination.
//!
//! Subsystems register named cleanup hooks; the first `trigger` runs every
//! hook concurrently, exactly once in total, and `wait` blocks until the run
//! has completed. Hook failures are logged, never propagated.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;

type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct Hook {
    name: String,
    run: Box<dyn FnOnce() -> HookFuture + Send>,
}

/// Registry of shutdown hooks with once-only concurrent execution.
pub struct ShutdownCoordinator {
    hooks: Mutex<Vec<Hook>>,
    fired: AtomicBool,
    done: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            hooks: Mutex::new(Vec::new()),
            fired: AtomicBool::new(false),
            done,
        }
    }

    /// Registers a cleanup hook to run on shutdown. Safe to call from any
    /// task at any time; a registration racing with `trigger` may be skipped.
    pub fn add<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let hook = Hook {
            name: name.into(),
            run: Box::new(move || Box::pin(hook()) as HookFuture),
        };
        self.hooks.lock().unwrap().push(hook);
    }

    /// Runs all registered hooks concurrently, then marks completion. Only
    /// the first call has any effect; later calls return immediately without
    /// waiting for the run (use `wait` for that).
    pub async fn trigger(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = mem::take(&mut *self.hooks.lock().unwrap());
        tracing::info!(hooks = hooks.len(), "shutdown triggered");

        let mut set = JoinSet::new();
        for Hook { name, run } in hooks {
            set.spawn(async move { (name, run().await) });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => tracing::debug!(hook = %name, "shutdown hook finished"),
                Ok((name, Err(err))) => {
                    tracing::error!(hook = %name, "shutdown hook failed: {err:#}");
                }
                Err(err) => tracing::error!("shutdown hook panicked: {err}"),
            }
        }

        let _ = self.done.send(true);
        tracing::info!("shutdown complete");
    }

    /// Blocks until the hook run has completed. Returns immediately if it
    /// already has; callable before or after `trigger`.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|complete| *complete).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
