//! Server wiring: admission-capped listener, axum serving, shutdown hooks.

use anyhow::{Context, Result};
use axum::serve::Listener;
use muxd_core::config::MuxdConfig;
use muxd_core::crawler::{Crawler, CrawlerConfig};
use muxd_core::listener::{AcceptError, BoundedListener, ManagedStream};
use muxd_core::shutdown::ShutdownCoordinator;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::handler;
use crate::signal;

/// Binds and serves until shutdown completes.
pub async fn run(config: MuxdConfig) -> Result<()> {
    App::bind(config).await?.run().await
}

/// A bound server, ready to serve. Split from [`run`] so embedders and tests
/// can learn the local address and drive shutdown themselves.
pub struct App {
    config: MuxdConfig,
    listener: BoundedListener,
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
}

impl App {
    /// Binds the listener and creates the shutdown coordinator. Failing to
    /// bind is the one fatal error of the process.
    pub async fn bind(config: MuxdConfig) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
        let listener = BoundedListener::bind(addr, config.max_connections as usize)
            .await
            .with_context(|| format!("listen on tcp port {}", config.http_port))?;
        let local_addr = listener.local_addr().context("listener local addr")?;
        Ok(Self {
            config,
            listener,
            local_addr,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        })
    }

    /// Address the server is bound to (useful when the configured port is 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shutdown coordinator handle, for embedders and tests.
    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.shutdown)
    }

    /// Serves until shutdown completes: spawns the signal watcher and the
    /// HTTP server, registers the graceful-drain hook, then blocks on the
    /// coordinator.
    pub async fn run(self) -> Result<()> {
        let App {
            config,
            listener,
            local_addr,
            shutdown,
        } = self;

        {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                match signal::wait_for_shutdown_signal().await {
                    Ok(()) => {
                        tracing::info!("termination signal received");
                        shutdown.trigger().await;
                    }
                    Err(err) => tracing::warn!("signal listener failed: {err}"),
                }
            });
        }

        let crawler = Arc::new(
            Crawler::new(CrawlerConfig {
                max_connections: config.max_fetch_connections.max(1) as usize,
                request_timeout: config.fetch_timeout(),
            })
            .context("build fetch client")?,
        );

        let gate = listener.gate();
        let router = handler::router(handler::AppState {
            crawler,
            max_urls: config.max_urls_per_request,
        });

        tracing::info!(addr = %local_addr, "muxd listening");

        let stop = CancellationToken::new();
        let server = axum::serve(AdmissionListener { inner: listener }, router)
            .with_graceful_shutdown(stop.clone().cancelled_owned());

        let serve_task = tokio::spawn({
            let shutdown = Arc::clone(&shutdown);
            async move {
                if let Err(err) = server.await {
                    tracing::error!("http server failed: {err}");
                    // Trigger from a fresh task; this one must exit so the
                    // drain hook can join it.
                    let shutdown = Arc::clone(&shutdown);
                    tokio::spawn(async move { shutdown.trigger().await });
                }
            }
        });

        let grace_delay = config.graceful_delay();
        let grace_timeout = config.graceful_timeout();
        shutdown.add("http-server", move || async move {
            tracing::info!(
                "awaiting in-flight traffic for {}s before closing",
                grace_delay.as_secs()
            );
            tokio::time::sleep(grace_delay).await;

            tracing::info!("closing http server");
            stop.cancel();
            if let Some(gate) = gate {
                gate.shutdown();
            }

            match tokio::time::timeout(grace_timeout, serve_task).await {
                Ok(Ok(())) => {
                    tracing::info!("http server stopped");
                    Ok(())
                }
                Ok(Err(join_err)) => Err(anyhow::anyhow!("http server task: {join_err}")),
                Err(_elapsed) => Err(anyhow::anyhow!(
                    "graceful shutdown timed out after {}s",
                    grace_timeout.as_secs()
                )),
            }
        });

        shutdown.wait().await;
        Ok(())
    }
}

/// Adapter letting axum accept connections from the admission-capped
/// listener.
struct AdmissionListener {
    inner: BoundedListener,
}

impl Listener for AdmissionListener {
    type Io = ManagedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok(conn) => return conn,
                Err(AcceptError::Closed) => {
                    // No further connections; park until graceful shutdown
                    // ends the serve loop.
                    std::future::pending::<()>().await;
                }
                Err(AcceptError::Io(err)) => {
                    tracing::warn!("accept failed: {err}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
