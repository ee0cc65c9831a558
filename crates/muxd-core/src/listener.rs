//! Connection-capped TCP listener.
//!
//! Wraps `tokio::net::TcpListener` behind an [`AdmissionGate`]: excess
//! connection attempts queue on the gate instead of being rejected at the
//! handshake. Capacity 0 disables the gate entirely.

use crate::admission::{AdmissionGate, AdmissionSlot};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Error from [`BoundedListener::accept`].
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// The listener was closed; no further connections will be accepted.
    #[error("listener closed")]
    Closed,
    /// The underlying accept failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// TCP listener admitting at most `capacity` concurrently-open connections.
#[derive(Debug)]
pub struct BoundedListener {
    inner: TcpListener,
    gate: Option<Arc<AdmissionGate>>,
    closed: CancellationToken,
}

impl BoundedListener {
    /// Binds to `addr`. `capacity` caps concurrently-open accepted
    /// connections; 0 means unbounded pass-through.
    pub async fn bind(addr: SocketAddr, capacity: usize) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        let gate = match capacity {
            0 => None,
            n => Some(Arc::new(AdmissionGate::new(n))),
        };
        Ok(Self {
            inner,
            gate,
            closed: CancellationToken::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Handle to the admission gate, if one is configured.
    pub fn gate(&self) -> Option<Arc<AdmissionGate>> {
        self.gate.clone()
    }

    /// Waits for a free admission slot, then for the next connection.
    ///
    /// The returned stream gives its slot back exactly once when it is closed
    /// or dropped. Fails with [`AcceptError::Closed`] once the listener is
    /// closed, including for calls already blocked on the gate or the socket.
    pub async fn accept(&self) -> Result<(ManagedStream, SocketAddr), AcceptError> {
        let slot = match &self.gate {
            Some(gate) => {
                if !gate.acquire().await {
                    return Err(AcceptError::Closed);
                }
                AdmissionSlot::held(Arc::clone(gate))
            }
            None => AdmissionSlot::unbounded(),
        };

        // Dropping `slot` on either early return below gives the slot back.
        let (stream, peer) = tokio::select! {
            () = self.closed.cancelled() => return Err(AcceptError::Closed),
            res = self.inner.accept() => res?,
        };

        Ok((ManagedStream { stream, slot }, peer))
    }

    /// Closes the listener, then shuts the admission gate so blocked and
    /// future `accept` calls fail instead of deadlocking. Connections already
    /// handed out are unaffected; the socket itself is released on drop.
    pub fn close(&self) {
        self.closed.cancel();
        if let Some(gate) = &self.gate {
            gate.shutdown();
        }
    }
}

/// An accepted connection holding one admission slot.
///
/// Reads and writes pass through to the underlying `TcpStream`; the slot is
/// released exactly once no matter how often the stream is closed.
#[derive(Debug)]
pub struct ManagedStream {
    stream: TcpStream,
    slot: AdmissionSlot,
}

impl ManagedStream {
    /// Shuts down the write half and releases the admission slot. Safe to
    /// call repeatedly; the slot is only given back once.
    pub async fn close(&mut self) -> io::Result<()> {
        let res = self.stream.shutdown().await;
        self.slot.release();
        res
    }

    /// Remote peer address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl AsyncRead for ManagedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ManagedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }
}
