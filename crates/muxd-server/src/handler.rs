//! `POST /crawler`: request validation, dispatch, response encoding.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use muxd_core::crawler::{CrawlError, Crawler, FetchResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<Crawler>,
    pub max_urls: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/crawler", post(crawl)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct UrlsRequest {
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UrlsResponse<'a> {
    results: Vec<UrlResult<'a>>,
}

#[derive(Debug, Serialize)]
struct UrlResult<'a> {
    url: &'a str,
    response: UrlPayload<'a>,
}

#[derive(Debug, Serialize)]
struct UrlPayload<'a> {
    code: u16,
    body: &'a RawValue,
}

async fn crawl(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let urls = match validate_request(&headers, &body, state.max_urls) {
        Ok(urls) => urls,
        Err(rejection) => {
            tracing::debug!("rejected request: {}", rejection.message);
            return rejection.into_response();
        }
    };

    let cancel = CancellationToken::new();
    match state.crawler.crawl(&cancel, &urls).await {
        Ok(results) => encode_results(&results),
        Err(err @ CrawlError::Cancelled) => {
            tracing::info!("client went away: {err}");
            Rejection::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            tracing::warn!("crawl failed: {err}");
            Rejection::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn encode_results(results: &[FetchResult]) -> Response {
    let payload = UrlsResponse {
        results: results
            .iter()
            .map(|result| UrlResult {
                url: &result.source_url,
                response: UrlPayload {
                    code: result.status_code,
                    body: &result.body,
                },
            })
            .collect(),
    };
    Json(payload).into_response()
}

/// A rejected request: status code plus a JSON error body.
#[derive(Debug)]
struct Rejection {
    status: StatusCode,
    message: String,
}

impl Rejection {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

fn validate_request(
    headers: &HeaderMap,
    body: &[u8],
    max_urls: usize,
) -> Result<Vec<String>, Rejection> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_json_content_type(content_type) {
        return Err(Rejection::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported content type: expected \"application/json\", got {content_type:?}"),
        ));
    }
    if body.is_empty() {
        return Err(Rejection::bad_request("empty request body"));
    }

    let request: UrlsRequest = serde_json::from_slice(body)
        .map_err(|err| Rejection::bad_request(format!("invalid request body: {err}")))?;
    if request.urls.is_empty() {
        return Err(Rejection::bad_request("no URLs passed"));
    }
    if request.urls.len() > max_urls {
        return Err(Rejection::bad_request(format!(
            "max number of URLs exceeded: {} of {}",
            request.urls.len(),
            max_urls
        )));
    }
    for raw in &request.urls {
        if !is_fetchable_url(raw) {
            return Err(Rejection::bad_request(format!("invalid url: {raw:?}")));
        }
    }
    Ok(request.urls)
}

/// Accepts `application/json` with optional parameters (e.g. a charset).
fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|main| main.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Absolute http/https URL with a host, per the upstream validation contract.
fn is_fetchable_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}
