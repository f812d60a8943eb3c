//! ROUTER socket adapter: identity-addressed duplex transport for direct
//! messages and the membership handshake.
//!
//! `libzmq`'s socket handle is neither `Send` nor safe to drive from two
//! threads at once, so each socket is owned by one dedicated OS thread that
//! alternates between polling for inbound frames and draining a queue of
//! outbound ones. That thread is the only thing that ever calls into
//! `libzmq`; everything else talks to it over a pair of [`flume`] channels,
//! which is how the async event loop above this crate awaits socket I/O
//! with `futures::select!` without blocking its executor.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use silk_core::error::{Result, SilkError};

use crate::frame::RouterFrame;

/// Poll timeout for the ROUTER I/O thread's recv/send loop.
///
/// Short enough that outbound frames queued between polls are not held up
/// for long, long enough not to spin the thread hot while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Parameters applied to a bound ROUTER socket.
#[derive(Debug, Clone, Copy)]
pub struct RouterParams {
    pub recv_hwm: i32,
    pub send_hwm: i32,
    pub linger_ms: i32,
}

impl RouterParams {
    /// Build socket parameters from node-wide options.
    #[must_use]
    pub fn from_node_options(opts: &silk_core::options::NodeOptions) -> Self {
        Self {
            recv_hwm: i32::try_from(opts.recv_hwm).unwrap_or(i32::MAX),
            send_hwm: i32::try_from(opts.send_hwm).unwrap_or(i32::MAX),
            linger_ms: i32::try_from(opts.linger.as_millis()).unwrap_or(i32::MAX),
        }
    }
}

/// A bound ROUTER socket, driven by a background I/O thread.
///
/// # Examples
///
/// ```no_run
/// use silk_transport::router_socket::{RouterParams, RouterSocket};
/// use zmq::Context;
///
/// # async fn doc() -> silk_core::error::Result<()> {
/// let ctx = Context::new();
/// let router = RouterSocket::bind(&ctx, "tcp://127.0.0.1:5000", "node-a", RouterParams {
///     recv_hwm: 1000,
///     send_hwm: 1000,
///     linger_ms: 500,
/// })?;
/// let frame = router.recv().await?;
/// router.send(frame).await?;
/// # Ok(())
/// # }
/// ```
pub struct RouterSocket {
    outbound_tx: flume::Sender<RouterFrame>,
    inbound_rx: flume::Receiver<RouterFrame>,
    connect_tx: flume::Sender<(String, bytes::Bytes)>,
    shutdown_tx: flume::Sender<()>,
    io_thread: Option<JoinHandle<()>>,
}

impl RouterSocket {
    /// Bind a ROUTER socket to `endpoint` and spawn its I/O thread.
    ///
    /// `own_id` becomes this socket's `ZMQ_ROUTING_ID`: the identity every
    /// peer — whether it connected to us or we connected to it — sees on
    /// frames we send. This is what lets a receiver populate its cluster
    /// view's identity map straight from `frame.identity` with no separate
    /// introduction step.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::Bind`] if the underlying `libzmq` socket cannot
    /// be created or bound.
    pub fn bind(ctx: &zmq::Context, endpoint: &str, own_id: &str, params: RouterParams) -> Result<Self> {
        let socket = ctx.socket(zmq::ROUTER).map_err(|e| SilkError::Bind {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        apply_params(&socket, params);
        socket.set_router_mandatory(false).ok();
        socket.set_identity(own_id.as_bytes()).map_err(|e| SilkError::Bind {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        socket.bind(endpoint).map_err(|e| SilkError::Bind {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;

        let (outbound_tx, outbound_rx) = flume::unbounded::<RouterFrame>();
        let (inbound_tx, inbound_rx) = flume::unbounded::<RouterFrame>();
        let (connect_tx, connect_rx) = flume::unbounded::<(String, bytes::Bytes)>();
        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);

        let endpoint_owned = endpoint.to_string();
        let io_thread = thread::Builder::new()
            .name(format!("silk-router-{endpoint_owned}"))
            .spawn(move || io_loop(socket, outbound_rx, inbound_tx, connect_rx, shutdown_rx))
            .map_err(SilkError::Io)?;

        Ok(Self {
            outbound_tx,
            inbound_rx,
            connect_tx,
            shutdown_tx,
            io_thread: Some(io_thread),
        })
    }

    /// Initiate an outbound connection to a peer's ROUTER endpoint.
    ///
    /// `connect_rid` is the routing id this socket will use to address its
    /// own outbound sends on that connection (`ZMQ_CONNECT_RID`) — the
    /// peer's node id if already known, or any caller-chosen unique label
    /// otherwise (e.g. the endpoint string, for a seed whose id is not yet
    /// known at `join` time). Callers are responsible for remembering which
    /// label they used so later sends address the same connection.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn connect_peer(&self, endpoint: impl Into<String>, connect_rid: bytes::Bytes) -> Result<()> {
        self.connect_tx
            .send_async((endpoint.into(), connect_rid))
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }

    /// Queue a frame for delivery. Returns once the frame is handed to the
    /// I/O thread, not once it reaches the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn send(&self, frame: RouterFrame) -> Result<()> {
        self.outbound_tx
            .send_async(frame)
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }

    /// Await the next inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::ChannelClosed`] if the I/O thread has exited.
    pub async fn recv(&self) -> Result<RouterFrame> {
        self.inbound_rx
            .recv_async()
            .await
            .map_err(|_| SilkError::ChannelClosed)
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn apply_params(socket: &zmq::Socket, params: RouterParams) {
    socket.set_rcvhwm(params.recv_hwm).ok();
    socket.set_sndhwm(params.send_hwm).ok();
    socket.set_linger(params.linger_ms).ok();
}

fn io_loop(
    socket: zmq::Socket,
    outbound_rx: flume::Receiver<RouterFrame>,
    inbound_tx: flume::Sender<RouterFrame>,
    connect_rx: flume::Receiver<(String, bytes::Bytes)>,
    shutdown_rx: flume::Receiver<()>,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }

        while let Ok((endpoint, connect_rid)) = connect_rx.try_recv() {
            if socket.set_connect_rid(&connect_rid).is_ok() {
                if let Err(err) = socket.connect(&endpoint) {
                    tracing::warn!(%endpoint, error = %err, "failed to connect router to peer");
                }
            }
        }

        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        let poll_result = zmq::poll(&mut items, POLL_INTERVAL.as_millis() as i64);
        if let Ok(n) = poll_result {
            if n > 0 && items[0].is_readable() {
                if let Ok(raw) = socket.recv_multipart(0) {
                    let frames: Vec<bytes::Bytes> = raw.into_iter().map(bytes::Bytes::from).collect();
                    match RouterFrame::from_multipart(frames) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping malformed router frame");
                        }
                    }
                }
            }
        }

        while let Ok(frame) = outbound_rx.try_recv() {
            let _ = socket.send_multipart(frame.into_multipart(), 0);
        }
    }
}
