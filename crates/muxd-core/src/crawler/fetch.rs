//! Single-URL fetch: GET, status check, JSON validation, canonical body.

use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;

/// One successfully fetched URL.
#[derive(Debug)]
pub struct FetchResult {
    /// URL this result was fetched from.
    pub source_url: String,
    /// HTTP status code of the response.
    pub status_code: u16,
    /// Response body, reserialized as compact JSON.
    pub body: Box<RawValue>,
}

/// Fetches one URL and validates the response.
///
/// Checks cancellation before issuing the request and races the transfer
/// against it. A 200 status and a body that parses as JSON are required; the
/// body is reserialized without insignificant whitespace.
pub(super) async fn fetch_url(
    client: &reqwest::Client,
    token: &CancellationToken,
    url: &str,
) -> Result<FetchResult, FetchError> {
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let request = client.get(url).build().map_err(FetchError::BuildRequest)?;
    let response = tokio::select! {
        () = token.cancelled() => return Err(FetchError::Cancelled),
        res = client.execute(request) => {
            res.map_err(|err| classify_transport(token, err, FetchError::Request))?
        }
    };

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::UnexpectedStatus(status.as_u16()));
    }

    let body = tokio::select! {
        () = token.cancelled() => return Err(FetchError::Cancelled),
        res = response.bytes() => {
            res.map_err(|err| classify_transport(token, err, FetchError::ReadBody))?
        }
    };

    let body = canonicalize(&body).map_err(FetchError::InvalidJson)?;
    Ok(FetchResult {
        source_url: url.to_owned(),
        status_code: status.as_u16(),
        body,
    })
}

/// A transport error observed after cancellation counts as cancellation, not
/// as a fetch failure.
fn classify_transport(
    token: &CancellationToken,
    err: reqwest::Error,
    wrap: fn(reqwest::Error) -> FetchError,
) -> FetchError {
    if token.is_cancelled() {
        FetchError::Cancelled
    } else {
        wrap(err)
    }
}

/// Parses `body` as JSON and reserializes it without insignificant
/// whitespace.
fn canonicalize(body: &[u8]) -> Result<Box<RawValue>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    serde_json::value::to_raw_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_compacts_whitespace() {
        let body = b"{\n  \"name\": \"debian\",\n  \"tags\": [1, 2, 3]\n}";
        let raw = canonicalize(body).unwrap();
        assert_eq!(raw.get(), r#"{"name":"debian","tags":[1,2,3]}"#);
    }

    #[test]
    fn canonicalize_accepts_any_json_value() {
        assert_eq!(canonicalize(b" [1, 2] ").unwrap().get(), "[1,2]");
        assert_eq!(canonicalize(b"\"ok\"").unwrap().get(), "\"ok\"");
    }

    #[test]
    fn canonicalize_rejects_non_json() {
        assert!(canonicalize(b"<html></html>").is_err());
        assert!(canonicalize(b"").is_err());
    }
}
