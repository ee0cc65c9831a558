//! Dispatcher error taxonomy.

/// Failure of a single fetch task.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be constructed (e.g. malformed URL).
    #[error("build request: {0}")]
    BuildRequest(#[source] reqwest::Error),
    /// Sending the request failed (connect, timeout, transport).
    #[error("send request: {0}")]
    Request(#[source] reqwest::Error),
    /// The server answered with a status other than 200.
    #[error("unexpected response status code: {0}")]
    UnexpectedStatus(u16),
    /// Reading the response body failed.
    #[error("read response body: {0}")]
    ReadBody(#[source] reqwest::Error),
    /// The body is not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The run was cancelled before or while this task executed.
    #[error("fetch cancelled")]
    Cancelled,
}

/// Outcome of a whole `crawl` call when it does not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The caller's token was cancelled. Distinct from fetch failures so the
    /// boundary can tell "client went away" from "fetch failed".
    #[error("crawl cancelled")]
    Cancelled,
    /// First task failure observed; carries the originating URL.
    #[error("failed to fetch {url:?}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}
