//! Minimal HTTP/1.1 server for dispatcher integration tests.
//!
//! Thread-per-connection; serves a fixed body with a configurable status and
//! an optional response delay, and tracks request counts plus the maximum
//! number of simultaneously in-flight requests.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JsonServerOptions {
    /// Status code for every response.
    pub status: u16,
    /// Body served verbatim.
    pub body: String,
    /// Delay before writing the response (for cancellation/concurrency tests).
    pub delay: Duration,
}

impl Default for JsonServerOptions {
    fn default() -> Self {
        Self {
            status: 200,
            body: r#"{"ok":true}"#.to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Running test server; counters are shared with the serving threads.
pub struct JsonServer {
    pub url: String,
    max_in_flight: Arc<AtomicUsize>,
    hits: Arc<AtomicUsize>,
}

impl JsonServer {
    /// Highest number of requests that were being served at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Total requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server with default options (200, small JSON body).
pub fn start() -> JsonServer {
    start_with_options(JsonServerOptions::default())
}

/// Starts a server in a background thread. The server runs until the process
/// exits.
pub fn start_with_options(opts: JsonServerOptions) -> JsonServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_in_flight);
                let hits = Arc::clone(&hits);
                let opts = opts.clone();
                thread::spawn(move || {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(current, Ordering::SeqCst);
                    hits.fetch_add(1, Ordering::SeqCst);
                    handle(stream, &opts);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }
    JsonServer {
        url: format!("http://127.0.0.1:{}/", port),
        max_in_flight,
        hits,
    }
}

fn handle(mut stream: std::net::TcpStream, opts: &JsonServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut buf = [0u8; 8192];
    match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    if !opts.delay.is_zero() {
        thread::sleep(opts.delay);
    }
    let reason = match opts.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        opts.status,
        reason,
        opts.body.len(),
        opts.body
    );
    let _ = stream.write_all(response.as_bytes());
}
