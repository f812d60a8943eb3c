//! The node engine: the public API surface and the single task that owns
//! all of a node's mutable state.
//!
//! Every public method on [`NodeHandle`] is a thin wrapper that sends a
//! [`Command`] over a mailbox channel and awaits the engine's reply; the
//! engine task itself is the only thing that ever touches the cluster
//! view, subscription table, or pending tables, so none of it needs a
//! lock. This resolves the node/transport/peer-record/pending-entry
//! ownership cycle by making the engine the sole owner: everything else is
//! referenced by id, never by shared pointer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;

use silk_core::descriptor::{KeepaliveAdvert, MessagePolicy, NodeDescriptor};
use silk_core::envelope::Envelope;
use silk_core::error::{Result, SilkError};
use silk_core::events::{NodeEvent, NodeEventSender, PeerRemovedReason};
use silk_core::factory::EnvelopeFactory;
use silk_core::id::{IdGenerator, UuidGenerator};
use silk_core::options::NodeOptions;
use silk_transport::{PubSocket, RouterFrame, RouterParams, RouterSocket, SlowJoinerBuffer, SubSocket};

use crate::cluster::ClusterView;
use crate::dispatch::{classify, Decision};
use crate::handshake::{descriptor_payload, join_reply_payload, parse_descriptor, parse_join_reply};
use crate::keepalive::Ticker;
use crate::pending_ack::{ExpiryAction, PendingAckTable};
use crate::pending_reply::{PendingReplyTable, ReplyOutcome, SilkErrorKind};
use crate::subscription::{Handler, HandlerId, ReplyContext, SubscriptionTable};

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    Stopped = 0,
    Started = 1,
    Joining = 2,
    Joined = 3,
}

impl NodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Started,
            2 => Self::Joining,
            3 => Self::Joined,
            _ => Self::Stopped,
        }
    }
}

/// A request issued to the node engine over its mailbox.
enum Command {
    Start { reply: flume::Sender<Result<()>> },
    Stop { reply: flume::Sender<()> },
    Join { seed_endpoint: String, reply: flume::Sender<Result<()>> },
    On { ty: String, policy: MessagePolicy, handler: Handler, reply: flume::Sender<HandlerId> },
    OffHandler { id: HandlerId },
    OffType { ty: String },
    OffAll,
    SendTo { dest: String, ty: String, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>, ack: flume::Sender<Result<()>> },
    SendLoadBalance { ty: String, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>, ack: flume::Sender<Result<()>> },
    SendAll { ty: String, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>, period: Duration, ack: flume::Sender<Result<()>> },
    Reply { original: Envelope, data: Option<Value>, ack: flume::Sender<Result<()>> },
    Info { reply: flume::Sender<NodeDescriptor> },
    ClusterSnapshot { reply: flume::Sender<Vec<NodeDescriptor>> },
}

/// Public handle to a node. Cheap to clone; every clone talks to the same
/// underlying engine task.
#[derive(Clone)]
pub struct NodeHandle {
    mailbox: flume::Sender<Command>,
    state: Arc<AtomicU8>,
    id: String,
    events: NodeEventSender,
}

impl NodeHandle {
    /// Construct a node in the `Stopped` state. Call [`NodeHandle::start`]
    /// to bind its sockets and begin processing.
    #[must_use]
    pub fn new(options: NodeOptions) -> (Self, silk_core::events::NodeEventReceiver) {
        Self::with_id_generator(options, Arc::new(UuidGenerator))
    }

    /// Construct a node with an injected id generator, e.g. for
    /// deterministic ids in tests.
    #[must_use]
    pub fn with_id_generator(
        options: NodeOptions,
        ids: Arc<dyn IdGenerator>,
    ) -> (Self, silk_core::events::NodeEventReceiver) {
        let id = ids.next_id();
        let (mailbox_tx, mailbox_rx) = flume::unbounded();
        let (events_tx, events_rx) = silk_core::events::create_event_channel();
        let state = Arc::new(AtomicU8::new(NodeState::Stopped as u8));

        let engine = Engine::new(id.clone(), options, mailbox_rx, events_tx.clone(), Arc::clone(&state));
        compio::runtime::spawn(engine.run()).detach();

        (Self { mailbox: mailbox_tx, state, id, events: events_tx }, events_rx)
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Bind the router and publish sockets and begin the dispatch loop.
    /// Idempotent once `Started`.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::Bind`] if either endpoint fails to bind.
    pub async fn start(&self) -> Result<()> {
        let (tx, rx) = flume::bounded(1);
        self.send_command(Command::Start { reply: tx })?;
        rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// Close all sockets, cancel timers, and clear subscriptions. Idempotent.
    pub async fn stop(&self) {
        let (tx, rx) = flume::bounded(1);
        if self.send_command(Command::Stop { reply: tx }).is_ok() {
            let _ = rx.recv_async().await;
        }
    }

    /// Initiate membership via `_join` to `seed_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed never replies. Failures connecting to
    /// individual cluster members discovered via the seed are logged and
    /// do not fail this call.
    pub async fn join(&self, seed_endpoint: impl Into<String>) -> Result<()> {
        let (tx, rx) = flume::bounded(1);
        self.send_command(Command::Join { seed_endpoint: seed_endpoint.into(), reply: tx })?;
        rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// Register `handler` for `ty` with the given reply policy.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is a reserved protocol type (starts with `_`); those
    /// may only be registered by the engine itself.
    pub async fn on(&self, ty: impl Into<String>, policy: MessagePolicy, handler: Handler) -> HandlerId {
        let ty = ty.into();
        assert!(!silk_core::envelope::is_reserved_type(&ty), "reserved types cannot be registered by callers");
        let (tx, rx) = flume::bounded(1);
        let _ = self.send_command(Command::On { ty, policy, handler, reply: tx });
        rx.recv_async().await.expect("engine task outlives this call")
    }

    /// Remove one handler by id.
    pub fn off_handler(&self, id: HandlerId) {
        let _ = self.send_command(Command::OffHandler { id });
    }

    /// Remove every handler registered for `ty`.
    pub fn off_type(&self, ty: impl Into<String>) {
        let _ = self.send_command(Command::OffType { ty: ty.into() });
    }

    /// Remove every handler for every type.
    pub fn off_all(&self) {
        let _ = self.send_command(Command::OffAll);
    }

    /// Fire-and-forget load-balanced send: picks one peer advertising `ty`
    /// uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::NoSubscribers`] synchronously if no peer
    /// currently advertises `ty`.
    pub async fn send(&self, ty: impl Into<String>, data: Option<Value>) -> Result<()> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.send_command(Command::SendLoadBalance { ty: ty.into(), data, reply_tx: None, ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// Load-balanced send expecting a single reply.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::NoSubscribers`] synchronously if no peer
    /// currently advertises `ty`.
    pub async fn request(&self, ty: impl Into<String>, data: Option<Value>) -> Result<flume::Receiver<ReplyOutcome>> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        let (reply_tx, reply_rx) = flume::unbounded();
        self.send_command(Command::SendLoadBalance { ty: ty.into(), data, reply_tx: Some(reply_tx), ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)??;
        Ok(reply_rx)
    }

    /// Fire-and-forget direct send to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::UnknownPeer`] synchronously if `dest` is not in
    /// the cluster view.
    pub async fn send_to(&self, dest: impl Into<String>, ty: impl Into<String>, data: Option<Value>) -> Result<()> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.send_command(Command::SendTo { dest: dest.into(), ty: ty.into(), data, reply_tx: None, ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// Direct send to `dest` expecting a single reply.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::UnknownPeer`] synchronously if `dest` is not in
    /// the cluster view.
    pub async fn request_to(
        &self,
        dest: impl Into<String>,
        ty: impl Into<String>,
        data: Option<Value>,
    ) -> Result<flume::Receiver<ReplyOutcome>> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        let (reply_tx, reply_rx) = flume::unbounded();
        self.send_command(Command::SendTo { dest: dest.into(), ty: ty.into(), data, reply_tx: Some(reply_tx), ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)??;
        Ok(reply_rx)
    }

    /// Broadcast `ty` with `dest = _all`, fire-and-forget.
    pub async fn send_all(&self, ty: impl Into<String>, data: Option<Value>) -> Result<()> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.send_command(Command::SendAll {
            ty: ty.into(),
            data,
            reply_tx: None,
            period: Duration::from_secs(1),
            ack: ack_tx,
        })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// Broadcast `ty` with `dest = _all`, collecting a stream of replies
    /// for `period` (delivered in arrival order; completes with an empty
    /// stream if nobody responds).
    pub async fn request_all(
        &self,
        ty: impl Into<String>,
        data: Option<Value>,
        period: Duration,
    ) -> Result<flume::Receiver<ReplyOutcome>> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        let (reply_tx, reply_rx) = flume::unbounded();
        self.send_command(Command::SendAll { ty: ty.into(), data, reply_tx: Some(reply_tx), period, ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)??;
        Ok(reply_rx)
    }

    /// Emit a `_reply` to `original`, addressed back to its sender.
    pub async fn reply(&self, original: Envelope, data: Option<Value>) -> Result<()> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.send_command(Command::Reply { original, data, ack: ack_tx })?;
        ack_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?
    }

    /// This node's current descriptor.
    pub async fn info(&self) -> NodeDescriptor {
        let (tx, rx) = flume::bounded(1);
        let _ = self.send_command(Command::Info { reply: tx });
        rx.recv_async().await.expect("engine task outlives this call")
    }

    /// Every peer descriptor currently in this node's cluster view.
    pub async fn cluster_view(&self) -> Vec<NodeDescriptor> {
        let (tx, rx) = flume::bounded(1);
        let _ = self.send_command(Command::ClusterSnapshot { reply: tx });
        rx.recv_async().await.expect("engine task outlives this call")
    }

    fn send_command(&self, cmd: Command) -> Result<()> {
        self.mailbox.send(cmd).map_err(|_| SilkError::ChannelClosed)
    }
}

/// The engine task: owns every piece of mutable node state and is the only
/// thing ever touching `libzmq` sockets for this node.
struct Engine {
    id: String,
    options: NodeOptions,
    mailbox: flume::Receiver<Command>,
    events: NodeEventSender,
    state: Arc<AtomicU8>,
    descriptor: NodeDescriptor,
    subscriptions: SubscriptionTable,
    cluster: ClusterView,
    pending_acks: PendingAckTable,
    pending_replies: PendingReplyTable,
    factory: EnvelopeFactory,
    identities: HashMap<String, bytes::Bytes>,
    zmq_ctx: zmq::Context,
    router: Option<RouterSocket>,
    publisher: Option<PubSocket>,
    subscriber: Option<SubSocket>,
    slow_joiner: Option<SlowJoinerBuffer>,
}

impl Engine {
    fn new(
        id: String,
        options: NodeOptions,
        mailbox: flume::Receiver<Command>,
        events: NodeEventSender,
        state: Arc<AtomicU8>,
    ) -> Self {
        let keepalive = KeepaliveAdvert { period_ms: options.keepalive.period.as_millis() as u64 };
        let descriptor = NodeDescriptor::new(id.clone(), options.router_endpoint.clone(), options.pub_endpoint.clone(), keepalive);
        let factory = EnvelopeFactory::new(id.clone(), Arc::new(UuidGenerator));
        Self {
            id,
            options,
            mailbox,
            events,
            state,
            descriptor,
            subscriptions: SubscriptionTable::new(),
            cluster: ClusterView::new(),
            pending_acks: PendingAckTable::new(),
            pending_replies: PendingReplyTable::new(),
            factory,
            identities: HashMap::new(),
            zmq_ctx: zmq::Context::new(),
            router: None,
            publisher: None,
            subscriber: None,
            slow_joiner: None,
        }
    }

    fn set_state(&self, s: NodeState) {
        self.state.store(s as u8, Ordering::Release);
    }

    fn current_state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn run(mut self) {
        let mut keepalive_ticker = Ticker::new(self.options.keepalive.period);
        let mut prune_ticker = Ticker::new(self.options.keepalive.prune_interval);
        let mut ack_ticker = Ticker::new(Duration::from_millis(50));

        loop {
            if self.current_state() == NodeState::Stopped && self.router.is_none() {
                // Stopped before ever starting: nothing to select on but the mailbox.
                if let Ok(cmd) = self.mailbox.recv_async().await {
                    self.handle_command(cmd).await;
                    continue;
                }
                return;
            }

            let router_recv = async {
                match &self.router {
                    Some(r) => r.recv().await,
                    None => futures::future::pending().await,
                }
            };
            let sub_recv = async {
                match &self.subscriber {
                    Some(s) => s.recv().await,
                    None => futures::future::pending().await,
                }
            };

            futures::select! {
                cmd = self.mailbox.recv_async().fuse() => {
                    match cmd {
                        Ok(cmd) => {
                            let is_stop = matches!(cmd, Command::Stop { .. });
                            self.handle_command(cmd).await;
                            if is_stop {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
                frame = router_recv.fuse() => {
                    if let Ok(frame) = frame {
                        self.handle_router_frame(frame).await;
                    }
                }
                payload = sub_recv.fuse() => {
                    if let Ok(payload) = payload {
                        self.handle_broadcast_payload(payload).await;
                    }
                }
                _ = keepalive_ticker.tick().fuse() => {
                    self.broadcast_keepalive().await;
                }
                _ = prune_ticker.tick().fuse() => {
                    self.prune_expired_peers();
                }
                _ = ack_ticker.tick().fuse() => {
                    self.process_ack_retries().await;
                    self.pending_replies.sweep_expired_streams(Instant::now());
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { reply } => {
                let result = self.do_start().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.do_stop().await;
                let _ = reply.send(());
            }
            Command::Join { seed_endpoint, reply } => {
                let result = self.do_join(&seed_endpoint).await;
                let _ = reply.send(result);
            }
            Command::On { ty, policy, handler, reply } => {
                let id = self.subscriptions.register(ty.clone(), policy, handler);
                self.descriptor.advertise(ty, policy);
                let _ = reply.send(id);
            }
            Command::OffHandler { id } => {
                if let Some(ty) = self.subscriptions.remove_handler(id) {
                    self.descriptor.withdraw(&ty);
                }
            }
            Command::OffType { ty } => {
                self.subscriptions.remove_type(&ty);
                self.descriptor.withdraw(&ty);
            }
            Command::OffAll => {
                let types: Vec<String> = self.descriptor.messages.keys().cloned().collect();
                self.subscriptions.clear();
                for ty in types {
                    self.descriptor.withdraw(&ty);
                }
            }
            Command::SendTo { dest, ty, data, reply_tx, ack } => {
                let result = self.do_send_to(&dest, &ty, data, reply_tx).await;
                let _ = ack.send(result);
            }
            Command::SendLoadBalance { ty, data, reply_tx, ack } => {
                let result = self.do_send_load_balance(&ty, data, reply_tx).await;
                let _ = ack.send(result);
            }
            Command::SendAll { ty, data, reply_tx, period, ack } => {
                let result = self.do_send_all(&ty, data, reply_tx, period).await;
                let _ = ack.send(result);
            }
            Command::Reply { original, data, ack } => {
                let result = self.do_reply(&original, data).await;
                let _ = ack.send(result);
            }
            Command::Info { reply } => {
                let _ = reply.send(self.descriptor.clone());
            }
            Command::ClusterSnapshot { reply } => {
                let _ = reply.send(self.cluster.iter().map(|p| p.descriptor.clone()).collect());
            }
        }
    }

    async fn do_start(&mut self) -> Result<()> {
        if self.current_state() != NodeState::Stopped || self.router.is_some() {
            return Ok(());
        }
        let params = RouterParams::from_node_options(&self.options);
        let router = RouterSocket::bind(&self.zmq_ctx, &self.options.router_endpoint, &self.id, params)?;
        let publisher = PubSocket::bind(
            &self.zmq_ctx,
            &self.options.pub_endpoint,
            params.send_hwm,
            params.linger_ms,
        )?;
        let subscriber = SubSocket::new(&self.zmq_ctx, params.recv_hwm)?;

        self.router = Some(router);
        self.publisher = Some(publisher);
        self.subscriber = Some(subscriber);
        self.slow_joiner = Some(SlowJoinerBuffer::new(self.options.slow_joiner_delay));
        self.set_state(NodeState::Started);
        let _ = self.events.send(NodeEvent::Started);
        Ok(())
    }

    async fn do_stop(&mut self) {
        if self.current_state() == NodeState::Stopped {
            return;
        }
        // Publish `_leave` before tearing down sockets so peers drop this
        // node immediately rather than waiting on keepalive expiry.
        if let Some(publisher) = &self.publisher {
            if let Ok(bytes) = self.factory.leave().to_bytes() {
                let _ = publisher.publish(bytes).await;
            }
        }
        self.subscriptions.clear();
        self.cluster.clear();
        self.pending_replies.fail_all(SilkErrorKind::NodeStopped);
        self.router = None;
        self.publisher = None;
        self.subscriber = None;
        self.set_state(NodeState::Stopped);
        let _ = self.events.send(NodeEvent::Stopped);
    }

    async fn do_join(&mut self, seed_endpoint: &str) -> Result<()> {
        if self.current_state() == NodeState::Started {
            self.set_state(NodeState::Joining);
        }

        let Some(router) = &self.router else {
            return Err(SilkError::Transport("node not started".to_string()));
        };

        // The seed's node id isn't known yet, so this connection is addressed
        // by the endpoint string itself; once the reply reveals the seed's
        // real id, that mapping is recorded in `identities` below.
        let seed_rid = bytes::Bytes::from(seed_endpoint.to_string().into_bytes());
        router.connect_peer(seed_endpoint.to_string(), seed_rid.clone()).await?;

        let request = self.factory.join(seed_endpoint, descriptor_payload(&self.descriptor));
        let (reply_tx, reply_rx) = flume::unbounded();
        self.pending_replies.register_single(request.id.clone(), reply_tx);

        let bytes = request.to_bytes()?;
        router.send(RouterFrame::new(seed_rid.clone(), bytes)).await?;

        let outcome = reply_rx.recv_async().await.map_err(|_| SilkError::ChannelClosed)?;
        let envelope = match outcome {
            ReplyOutcome::Reply(env) => env,
            ReplyOutcome::Error(kind) => return Err(kind.into()),
        };
        let join_reply = parse_join_reply(envelope.data.as_ref())?;

        self.identities.insert(join_reply.me.id.clone(), seed_rid);

        for member in join_reply.cluster {
            if member.id == self.id {
                continue;
            }
            let identity = if member.id == join_reply.me.id {
                self.identities.get(&member.id).cloned().unwrap_or_default()
            } else {
                bytes::Bytes::from(member.id.clone().into_bytes())
            };
            self.merge_peer(identity.clone(), member.clone()).await;
            if member.id != join_reply.me.id {
                let connect_env = self.factory.connect(member.id.clone(), descriptor_payload(&self.descriptor));
                if let (Ok(bytes), Some(router)) = (connect_env.to_bytes(), &self.router) {
                    let _ = router.send(RouterFrame::new(identity, bytes)).await;
                }
            }
        }

        self.set_state(NodeState::Joined);
        let _ = self.events.send(NodeEvent::Joined);
        Ok(())
    }

    /// Add-or-update a peer's record, wiring fresh transport connections the
    /// first time this id is seen.
    ///
    /// A genuinely new peer gets its pub endpoint subscribed so broadcasts
    /// and keepalives start flowing, and — if nothing has connected under
    /// this identity yet — its router endpoint connected too, so a peer
    /// learned purely through gossip becomes directly reachable.
    async fn merge_peer(&mut self, identity: bytes::Bytes, descriptor: NodeDescriptor) {
        let id = descriptor.id.clone();
        let is_new = !self.cluster.contains(&id);
        let already_wired = self.identities.get(&id) == Some(&identity);
        let deadline = Instant::now()
            + Duration::from_millis(descriptor.keepalive.period_ms * u64::from(self.options.keepalive.missed_periods));
        if !identity.is_empty() {
            self.identities.insert(id.clone(), identity.clone());
        }
        self.cluster.upsert(identity.clone(), descriptor.clone(), deadline);

        if is_new {
            if !already_wired && !identity.is_empty() {
                if let Some(router) = &self.router {
                    let _ = router.connect_peer(descriptor.router.clone(), identity.clone()).await;
                }
            }
            if let Some(subscriber) = &self.subscriber {
                let _ = subscriber.connect_peer(descriptor.pub_endpoint.clone()).await;
            }
        }
        let _ = self.events.send(NodeEvent::PeerAdded(descriptor));
    }

    async fn handle_router_frame(&mut self, frame: RouterFrame) {
        let envelope = match Envelope::from_bytes(&frame.payload) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed envelope on router socket");
                return;
            }
        };
        self.identities.insert(envelope.src.clone(), frame.identity.clone());
        self.handle_envelope(envelope).await;
    }

    async fn handle_broadcast_payload(&mut self, payload: bytes::Bytes) {
        let envelope = match Envelope::from_bytes(&payload) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed envelope on subscribe socket");
                return;
            }
        };
        self.handle_envelope(envelope).await;
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        if envelope.src == self.id {
            return;
        }
        match classify(&envelope) {
            Decision::Join => self.handle_join_request(envelope).await,
            Decision::Connect => self.handle_connect_request(envelope).await,
            Decision::Leave => self.handle_leave(envelope),
            Decision::Keepalive => self.handle_keepalive(envelope),
            Decision::Ack => self.handle_ack(envelope),
            Decision::Reply => self.handle_reply(envelope),
            Decision::Application => self.handle_application(envelope).await,
        }
    }

    async fn handle_join_request(&mut self, envelope: Envelope) {
        let Ok(peer) = parse_descriptor(envelope.data.as_ref()) else {
            tracing::warn!(src = %envelope.src, "bad descriptor in _join");
            return;
        };
        let identity = self.identities.get(&envelope.src).cloned().unwrap_or_default();
        self.merge_peer(identity, peer).await;

        let mut cluster: Vec<NodeDescriptor> = self.cluster.iter().map(|p| p.descriptor.clone()).collect();
        cluster.push(self.descriptor.clone());
        let reply = self
            .factory
            .reply(envelope.src.clone(), envelope.id.clone(), Some(join_reply_payload(cluster, self.descriptor.clone())));
        self.send_envelope_to_identity(&envelope.src, reply).await;
        self.send_ack(&envelope).await;
    }

    async fn handle_connect_request(&mut self, envelope: Envelope) {
        let Ok(peer) = parse_descriptor(envelope.data.as_ref()) else {
            tracing::warn!(src = %envelope.src, "bad descriptor in _connect");
            return;
        };
        let identity = self.identities.get(&envelope.src).cloned().unwrap_or_default();
        self.merge_peer(identity, peer).await;

        let reply = self
            .factory
            .reply(envelope.src.clone(), envelope.id.clone(), Some(descriptor_payload(&self.descriptor)));
        self.send_envelope_to_identity(&envelope.src, reply).await;
        self.send_ack(&envelope).await;
    }

    fn handle_leave(&mut self, envelope: Envelope) {
        if self.cluster.remove(&envelope.src).is_some() {
            let evicted = self.pending_acks.evict_peer(self.identities.get(&envelope.src).map_or(&[][..], |b| b.as_ref()));
            for id in evicted {
                self.pending_replies.fail(&id, SilkErrorKind::PeerLost);
            }
            let _ = self.events.send(NodeEvent::PeerRemoved { id: envelope.src, reason: PeerRemovedReason::Graceful });
        }
    }

    fn handle_keepalive(&mut self, envelope: Envelope) {
        if let Some(record) = self.cluster.get(&envelope.src) {
            let deadline = Instant::now() + Duration::from_millis(record.descriptor.keepalive.period_ms * u64::from(self.options.keepalive.missed_periods));
            self.cluster.refresh_deadline(&envelope.src, deadline);
        }
    }

    fn handle_ack(&mut self, envelope: Envelope) {
        if let Some(parent) = envelope.parent {
            self.pending_acks.fulfill(&parent);
        }
    }

    fn handle_reply(&mut self, envelope: Envelope) {
        if let Some(parent) = envelope.parent.clone() {
            self.pending_acks.fulfill(&parent);
            self.pending_replies.deliver_reply(&parent, envelope);
        }
    }

    async fn handle_application(&mut self, envelope: Envelope) {
        let should_ack = self.options.should_ack(&envelope.ty);
        let handlers = self.subscriptions.handlers_for(&envelope.ty);
        if !handlers.is_empty() {
            let (reply_tx, reply_rx) = flume::unbounded::<(Envelope, Value)>();
            let ctx = ReplyContext::new(envelope.clone(), reply_tx);
            for handler in &handlers {
                handler(&envelope, &ctx);
            }
            drop(ctx);
            while let Ok((original, data)) = reply_rx.try_recv() {
                let reply = self.factory.reply(original.src.clone(), original.id.clone(), Some(data));
                self.send_envelope_to_identity(&original.src, reply).await;
            }
        }
        if should_ack {
            self.send_ack(&envelope).await;
        }
    }

    async fn send_ack(&mut self, envelope: &Envelope) {
        let ack = self.factory.ack(envelope.src.clone(), envelope.id.clone());
        self.send_envelope_to_identity(&envelope.src, ack).await;
    }

    async fn send_envelope_to_identity(&mut self, dest_id: &str, envelope: Envelope) {
        let Some(router) = &self.router else { return };
        let Ok(bytes) = envelope.to_bytes() else { return };
        let identity = self.identities.get(dest_id).cloned().unwrap_or_else(|| bytes::Bytes::from(dest_id.to_string().into_bytes()));
        let _ = router.send(RouterFrame::new(identity, bytes)).await;
    }

    async fn do_send_to(&mut self, dest: &str, ty: &str, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>) -> Result<()> {
        if !self.cluster.contains(dest) {
            return Err(SilkError::unknown_peer(dest));
        }
        let envelope = self.factory.application(dest, ty, data);
        let identity = self.identities.get(dest).cloned().unwrap_or_default();

        let expects_reply = reply_tx.is_some();
        if let Some(reply_tx) = reply_tx {
            self.pending_replies.register_single(envelope.id.clone(), reply_tx);
        }

        if expects_reply {
            let policy = self.cluster.get(dest).and_then(|p| p.descriptor.messages.get(ty).copied()).unwrap_or(MessagePolicy::new(
                self.options.default_message_policy_ms,
                self.options.default_message_attempts,
            ));
            self.pending_acks.register(envelope.clone(), identity.clone(), self.options.retry_profile, policy.attempts);
        }

        let Some(router) = &self.router else { return Err(SilkError::Transport("node not started".to_string())) };
        let bytes = envelope.to_bytes()?;
        router.send(RouterFrame::new(identity, bytes)).await
    }

    async fn do_send_load_balance(&mut self, ty: &str, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>) -> Result<()> {
        let candidates = self.cluster.peers_for_type(ty);
        if candidates.is_empty() {
            return Err(SilkError::no_subscribers(ty));
        }
        let index = (rand::random::<u32>() as usize) % candidates.len();
        let dest = candidates[index].to_string();
        self.do_send_to(&dest, ty, data, reply_tx).await
    }

    async fn do_send_all(&mut self, ty: &str, data: Option<Value>, reply_tx: Option<flume::Sender<ReplyOutcome>>, period: Duration) -> Result<()> {
        let envelope = self.factory.broadcast(ty, data);
        if let Some(reply_tx) = reply_tx {
            self.pending_replies.register_stream(envelope.id.clone(), reply_tx, period);
        }
        let Some(publisher) = &self.publisher else { return Err(SilkError::Transport("node not started".to_string())) };
        let bytes = envelope.to_bytes()?;
        if let Some(buffer) = &mut self.slow_joiner {
            if let Some(ready) = buffer.submit(bytes) {
                publisher.publish(ready).await
            } else {
                Ok(())
            }
        } else {
            publisher.publish(bytes).await
        }
    }

    async fn do_reply(&mut self, original: &Envelope, data: Option<Value>) -> Result<()> {
        let reply = self.factory.reply(original.src.clone(), original.id.clone(), data);
        self.send_envelope_to_identity(&original.src, reply).await;
        Ok(())
    }

    async fn broadcast_keepalive(&mut self) {
        let Some(publisher) = &self.publisher else { return };
        if let Ok(bytes) = self.factory.keepalive().to_bytes() {
            if let Some(buffer) = &mut self.slow_joiner {
                if buffer.is_open() {
                    for queued in buffer.drain() {
                        let _ = publisher.publish(queued).await;
                    }
                }
            }
            let _ = publisher.publish(bytes).await;
        }
    }

    fn prune_expired_peers(&mut self) {
        let now = Instant::now();
        for id in self.cluster.expired(now) {
            if self.cluster.remove(&id).is_some() {
                let identity = self.identities.get(&id).cloned().unwrap_or_default();
                let evicted = self.pending_acks.evict_peer(&identity);
                for msg_id in evicted {
                    self.pending_replies.fail(&msg_id, SilkErrorKind::PeerLost);
                }
                let _ = self.events.send(NodeEvent::PeerRemoved { id, reason: PeerRemovedReason::KeepaliveExpired });
            }
        }
    }

    async fn process_ack_retries(&mut self) {
        let actions = self.pending_acks.tick(Instant::now());
        for (message_id, action) in actions {
            match action {
                ExpiryAction::Retry { envelope, dest_identity } => {
                    let Some(router) = &self.router else { continue };
                    if let Ok(bytes) = envelope.to_bytes() {
                        let _ = router.send(RouterFrame::new(dest_identity, bytes)).await;
                    }
                }
                ExpiryAction::GiveUp => {
                    self.pending_replies.fail(&message_id, SilkErrorKind::DeliveryFailed);
                }
            }
        }
    }
}
