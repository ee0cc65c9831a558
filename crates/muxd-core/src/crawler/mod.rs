//! Fan-out fetch dispatcher.
//!
//! One `crawl` call fans a URL list out to a bounded pool of fetch workers
//! and fans the results back in. The first failure cancels the run and the
//! whole batch is discarded; otherwise every result is returned, in
//! completion order.

mod error;
mod fetch;

pub use error::{CrawlError, FetchError};
pub use fetch::FetchResult;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Settings for one [`Crawler`] instance.
#[derive(Debug, Clone, Copy)]
pub struct CrawlerConfig {
    /// Upper bound on simultaneous outbound requests per `crawl` call.
    pub max_connections: usize,
    /// Timeout applied to each outbound request independently.
    pub request_timeout: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            request_timeout: Duration::from_secs(1),
        }
    }
}

/// Reusable fetch dispatcher. Cheap to share behind an `Arc`; one HTTP
/// client with a capped connection pool backs all calls.
#[derive(Debug)]
pub struct Crawler {
    config: CrawlerConfig,
    client: reqwest::Client,
}

type TaskOutcome = Result<FetchResult, (String, FetchError)>;

impl Crawler {
    /// Builds a crawler and its HTTP client.
    pub fn new(config: CrawlerConfig) -> reqwest::Result<Self> {
        let max_connections = config.max_connections.max(1);
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(max_connections)
            .build()?;
        Ok(Self { config, client })
    }

    /// Fetches every URL in `urls` with at most
    /// `min(max_connections, urls.len())` requests in flight.
    ///
    /// Returns all results in completion order, or exactly the first error
    /// observed; on error the remaining work is cancelled, drained and
    /// discarded. Cancelling `cancel` ends the run with
    /// [`CrawlError::Cancelled`]. Every worker has stopped by the time this
    /// returns.
    pub async fn crawl(
        &self,
        cancel: &CancellationToken,
        urls: &[String],
    ) -> Result<Vec<FetchResult>, CrawlError> {
        if cancel.is_cancelled() {
            tracing::debug!("crawl aborted before start: caller cancelled");
            return Err(CrawlError::Cancelled);
        }
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        // Child token scoped to this call: the first failure cancels it
        // without touching the caller's token.
        let run = cancel.child_token();
        let queue: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(urls.iter().cloned().collect()));
        let num_workers = self.config.max_connections.min(urls.len()).max(1);
        let (tx, mut rx) = mpsc::channel::<TaskOutcome>(num_workers);

        tracing::debug!(urls = urls.len(), workers = num_workers, "dispatching fetches");
        let mut workers = JoinSet::new();
        for _ in 0..num_workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let token = run.clone();
            let client = self.client.clone();
            workers.spawn(async move {
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    let Some(url) = queue.lock().unwrap().pop_front() else {
                        break;
                    };
                    let outcome = match fetch::fetch_url(&client, &token, &url).await {
                        Ok(result) => Ok(result),
                        Err(err) => Err((url, err)),
                    };
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Fan-in. The channel closes once every worker has dropped its
        // sender; results arriving after the first error are drained so no
        // worker blocks on the channel, but they are not reported.
        let mut results = Vec::with_capacity(urls.len());
        let mut first_error: Option<CrawlError> = None;
        while let Some(outcome) = rx.recv().await {
            if first_error.is_some() {
                continue;
            }
            match outcome {
                Ok(result) => results.push(result),
                Err((url, FetchError::Cancelled)) => {
                    tracing::debug!(%url, "fetch cancelled");
                    first_error = Some(CrawlError::Cancelled);
                    run.cancel();
                }
                Err((url, source)) => {
                    tracing::warn!(%url, error = %source, "fetch failed, cancelling run");
                    first_error = Some(CrawlError::Fetch { url, source });
                    run.cancel();
                }
            }
        }
        while workers.join_next().await.is_some() {}

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::debug!(results = results.len(), "all fetches done");
                Ok(results)
            }
        }
    }
}
