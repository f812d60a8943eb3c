//! PUB/SUB socket adapter: one-to-many fan-out for broadcasts and
//! keepalives.
//!
//! Silk does not filter on `libzmq` subscription topics: every subscriber
//! subscribes to the empty prefix and filtering on message `type` happens
//! above this layer, in the dispatcher. The same bridging-thread-plus-flume
//! design as [`crate::router_socket::RouterSocket`] applies here, since a
//! `libzmq` socket handle cannot be shared across threads.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;

use silk_core::error::{Result, SilkError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A bound PUB socket, driven by a background I/O thread.
pub struct PubSocket {
    outbound_tx: flume::Sender<Bytes>,
    shutdown_tx: flume::Sender<()>,
    io_thread: Option<JoinHandle<()>>,
}

impl PubSocket {
    /// Bind a PUB socket to `endpoint` and spawn its I/O thread.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::Bind`] if the underlying `libzmq` socket cannot
    /// be created or bound.
    pub fn bind(ctx: &zmq::Context, endpoint: &str, send_hwm: i32, linger_ms: i32) -> Result<Self> {
        let socket = ctx.socket(zmq::PUB).map_err(|e| SilkError::Bind {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        socket.set_sndhwm(send_hwm).ok();
        socket.set_linger(linger_ms).ok();
        socket.bind(endpoint).map_err(|e| SilkError::Bind {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;

        let (outbound_tx, outbound_rx) = flume::unbounded::<Bytes>();
        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);

        let io_thread = thread::Builder::new()
            .name(format!("silk-pub-{endpoint}"))
            .spawn(move || pub_io_loop(socket, outbound_rx, shutdown_rx))
            .map_err(SilkError::Io)?;

        Ok(Self { outbound_tx, shutdown_tx, io_thread: Some(io_thread) })
    }

    /// Queue a payload for broadcast. Returns once handed to the I/O
    /// thread, not once every subscriber has received it.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn publish(&self, payload: Bytes) -> Result<()> {
        self.outbound_tx
            .send_async(payload)
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn pub_io_loop(socket: zmq::Socket, outbound_rx: flume::Receiver<Bytes>, shutdown_rx: flume::Receiver<()>) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }
        match outbound_rx.recv_timeout(POLL_INTERVAL) {
            Ok(payload) => {
                let _ = socket.send(payload.as_ref(), 0);
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// A SUB socket that can grow new peer connections over its lifetime,
/// driven by a background I/O thread.
///
/// A single `libzmq` SUB socket may `connect` to any number of PUB
/// endpoints; messages from all of them interleave on the same `recv`.
/// Silk relies on this to avoid one SUB socket per cluster peer: as new
/// peers are discovered, their publish endpoint is added to the same
/// socket via [`SubSocket::connect_peer`].
pub struct SubSocket {
    inbound_rx: flume::Receiver<Bytes>,
    connect_tx: flume::Sender<String>,
    shutdown_tx: flume::Sender<()>,
    io_thread: Option<JoinHandle<()>>,
}

impl SubSocket {
    /// Create a SUB socket subscribed to every topic, with no peer
    /// connections yet, and spawn its I/O thread.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::Transport`] if the underlying `libzmq` socket
    /// cannot be created.
    pub fn new(ctx: &zmq::Context, recv_hwm: i32) -> Result<Self> {
        let socket = ctx
            .socket(zmq::SUB)
            .map_err(|e| SilkError::Transport(e.to_string()))?;
        socket.set_rcvhwm(recv_hwm).ok();
        socket
            .set_subscribe(b"")
            .map_err(|e| SilkError::Transport(e.to_string()))?;

        let (inbound_tx, inbound_rx) = flume::unbounded::<Bytes>();
        let (connect_tx, connect_rx) = flume::unbounded::<String>();
        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);

        let io_thread = thread::Builder::new()
            .name("silk-sub".to_string())
            .spawn(move || sub_io_loop(socket, inbound_tx, connect_rx, shutdown_rx))
            .map_err(SilkError::Io)?;

        Ok(Self { inbound_rx, connect_tx, shutdown_tx, io_thread: Some(io_thread) })
    }

    /// Add a connection to a newly discovered peer's publish endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn connect_peer(&self, endpoint: impl Into<String>) -> Result<()> {
        self.connect_tx
            .send_async(endpoint.into())
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }

    /// Await the next inbound broadcast payload.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn recv(&self) -> Result<Bytes> {
        self.inbound_rx
            .recv_async()
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }
}

impl Drop for SubSocket {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn sub_io_loop(
    socket: zmq::Socket,
    inbound_tx: flume::Sender<Bytes>,
    connect_rx: flume::Receiver<String>,
    shutdown_rx: flume::Receiver<()>,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }

        while let Ok(endpoint) = connect_rx.try_recv() {
            if let Err(err) = socket.connect(&endpoint) {
                tracing::warn!(%endpoint, error = %err, "failed to connect subscriber to peer");
            }
        }

        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if let Ok(n) = zmq::poll(&mut items, POLL_INTERVAL.as_millis() as i64) {
            if n > 0 && items[0].is_readable() {
                if let Ok(raw) = socket.recv_bytes(0) {
                    if inbound_tx.send(Bytes::from(raw)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}
