//! Peer transport: discovery, handshake, and best-effort room fan-out.
//!
//! The transport depends abstractly on a [`Rendezvous`] provider — anything
//! that can open a frame pipe into a named room. Two providers ship here:
//!
//! - [`WebSocketRendezvous`] — a signaling relay reached over
//!   tokio-tungstenite; frames sent into the room come back out on every
//!   other member's pipe.
//! - [`MemoryRendezvous`] — an in-process hub over tokio broadcast
//!   channels, used by tests and single-process setups.
//!
//! On top of a pipe the transport runs the room handshake: every peer
//! announces a `Hello` carrying its presence record and a fingerprint of
//! the derived room key. Peers whose fingerprints differ never become
//! visible to each other — a wrong secret isolates a peer without touching
//! the rest of the room or the session's own status.
//!
//! Delivery is best-effort: no acknowledgments, silent drops toward dead
//! peers. Per-peer order is preserved by the single pipe; cross-peer
//! interleaving is the document store's problem, not ours.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::document::{TextOp, VersionVector};
use crate::presence::PresenceRecord;
use crate::protocol::{MessageType, ProtocolError, WireMessage};

/// Derive the room-key fingerprint from the room id and optional secret.
///
/// The secret is treated as opaque bytes; no format is imposed on it.
pub fn derive_key_tag(room_id: &str, secret: Option<&[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(room_id.as_bytes());
    hasher.update([0u8]);
    if let Some(secret) = secret {
        hasher.update(secret);
    }
    hasher.finalize().into()
}

/// Lifecycle of a single remote peer, as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Discovering,
    Connected,
    Disconnected,
}

/// A remote peer the transport has completed the handshake with.
#[derive(Debug, Clone)]
pub struct PeerState {
    pub record: PresenceRecord,
    pub state: ConnectionState,
}

/// Transport failures. Connection-level problems surface as events, never
/// as panics into the host.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Signaling endpoint unreachable at join time
    Discovery(String),
    /// Reconnect retries exhausted mid-session
    Unavailable,
    /// Transport already torn down
    Closed,
    Protocol(ProtocolError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery(e) => write!(f, "Discovery failed: {e}"),
            Self::Unavailable => write!(f, "Transport unavailable: retries exhausted"),
            Self::Closed => write!(f, "Transport closed"),
            Self::Protocol(e) => write!(f, "Protocol error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

/// Inbound traffic, decoded and verified, for the session dispatcher.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peer completed the handshake (fires again on re-announce)
    PeerJoined(PresenceRecord),
    /// A peer left cleanly
    PeerLeft(Uuid),
    /// Incremental document operations from one peer, in its send order
    Ops { peer: Uuid, ops: Vec<TextOp> },
    /// A peer asks for everything missing from its version vector
    SyncRequest { peer: Uuid, version: VersionVector },
    /// Catch-up operations answering a sync request
    SyncReply { peer: Uuid, ops: Vec<TextOp> },
    /// Whole-record presence update
    Presence(PresenceRecord),
    /// Reconnect retries exhausted; the room is out of reach
    Unavailable,
}

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Signaling (re)connect attempts before giving up
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub base_backoff: Duration,
    /// Buffered frames/events per channel
    pub channel_capacity: usize,
    /// How often to ping the room
    pub heartbeat_interval: Duration,
    /// A peer silent for this long is treated as disconnected
    pub peer_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            channel_capacity: 256,
            heartbeat_interval: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(30),
        }
    }
}

/// A frame pipe into one room: bytes in, every other member's bytes out.
pub struct RendezvousConn {
    pub outgoing: mpsc::Sender<Vec<u8>>,
    pub incoming: mpsc::Receiver<Vec<u8>>,
}

/// Pluggable peer-discovery provider.
#[async_trait]
pub trait Rendezvous: Send + Sync + 'static {
    /// Open a frame pipe into `room_id`.
    async fn open(&self, room_id: &str) -> Result<RendezvousConn, TransportError>;
}

// ───────────────────────────────────────────────────────────────────
// In-process rendezvous hub
// ───────────────────────────────────────────────────────────────────

/// In-memory rendezvous: rooms are broadcast channels inside one process.
///
/// Cloning shares the hub, so several sessions built on clones of the same
/// `MemoryRendezvous` can reach each other. `set_reachable(false)` makes
/// `open` fail, which is how tests exercise discovery errors and retry
/// exhaustion.
#[derive(Clone)]
pub struct MemoryRendezvous {
    inner: Arc<HubInner>,
}

struct HubInner {
    rooms: StdMutex<HashMap<String, RoomChannel>>,
    next_conn: AtomicU64,
    reachable: AtomicBool,
    capacity: usize,
}

struct RoomChannel {
    tx: broadcast::Sender<(u64, Arc<Vec<u8>>)>,
    /// Dropped (or signalled) when the room is closed; every bridge exits.
    kill: watch::Sender<bool>,
}

impl MemoryRendezvous {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: StdMutex::new(HashMap::new()),
                next_conn: AtomicU64::new(1),
                reachable: AtomicBool::new(true),
                capacity: 256,
            }),
        }
    }

    /// Simulate signaling outage/recovery.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Sever every established pipe into `room_id`, as if the relay died
    /// mid-session. Members see their incoming stream end; whether they can
    /// get back in is governed by `set_reachable`.
    pub fn close_room(&self, room_id: &str) {
        let room = self
            .inner
            .rooms
            .lock()
            .expect("rendezvous room table poisoned")
            .remove(room_id);
        if let Some(room) = room {
            let _ = room.kill.send(true);
        }
    }
}

impl Default for MemoryRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rendezvous for MemoryRendezvous {
    async fn open(&self, room_id: &str) -> Result<RendezvousConn, TransportError> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Discovery(
                "signaling endpoint unreachable".into(),
            ));
        }

        let (room_tx, mut kill_in, mut kill_out) = {
            let mut rooms = self
                .inner
                .rooms
                .lock()
                .expect("rendezvous room table poisoned");
            let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
                RoomChannel {
                    tx: broadcast::channel(self.inner.capacity).0,
                    kill: watch::channel(false).0,
                }
            });
            (room.tx.clone(), room.kill.subscribe(), room.kill.subscribe())
        };

        let conn_id = self.inner.next_conn.fetch_add(1, Ordering::SeqCst);
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(self.inner.capacity);
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(self.inner.capacity);

        // Inbound bridge: room broadcast → pipe, filtering our own frames.
        // Exits when the room is closed, which ends the member's incoming
        // stream and lets the transport notice the loss.
        let mut sub = room_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = sub.recv() => match frame {
                        Ok((sender, bytes)) => {
                            if sender == conn_id {
                                continue;
                            }
                            if in_tx.send((*bytes).clone()).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("rendezvous receiver lagged, dropped {n} frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = kill_in.changed() => break,
                }
            }
        });

        // Outbound bridge: pipe → room broadcast. Ends when the conn drops
        // or the room is closed.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    bytes = out_rx.recv() => match bytes {
                        Some(bytes) => {
                            let _ = room_tx.send((conn_id, Arc::new(bytes)));
                        }
                        None => break,
                    },
                    _ = kill_out.changed() => break,
                }
            }
        });

        Ok(RendezvousConn {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

// ───────────────────────────────────────────────────────────────────
// WebSocket rendezvous
// ───────────────────────────────────────────────────────────────────

/// Rendezvous over a WebSocket signaling relay.
///
/// The relay is expected to echo binary frames to every other socket that
/// joined the same room path. Channel confidentiality is the relay
/// deployment's concern (wss); admission is enforced end-to-end by the
/// room-key fingerprint in the handshake.
pub struct WebSocketRendezvous {
    url: String,
}

impl WebSocketRendezvous {
    /// `url` is the relay base, e.g. `ws://signal.example.net:4444`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Rendezvous for WebSocketRendezvous {
    async fn open(&self, room_id: &str) -> Result<RendezvousConn, TransportError> {
        let url = format!("{}/{}", self.url, room_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::Discovery(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(256);

        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if ws_writer
                    .send(tokio_tungstenite::tungstenite::Message::Binary(bytes.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                        if in_tx.send(data.into()).await.is_err() {
                            break;
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            // dropping in_tx closes the pipe and lets the transport reconnect
        });

        Ok(RendezvousConn {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

// ───────────────────────────────────────────────────────────────────
// Peer transport
// ───────────────────────────────────────────────────────────────────

/// The room transport owned by one session.
///
/// Owns every connection resource; the session only ever sees peer ids.
pub struct PeerTransport {
    peer_id: Uuid,
    doc_id: Uuid,
    out_tx: mpsc::Sender<Vec<u8>>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    peers: Arc<RwLock<HashMap<Uuid, PeerState>>>,
    supervisor: Option<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
}

struct SupervisorCtx {
    room_id: String,
    doc_id: Uuid,
    local: PresenceRecord,
    key_tag: [u8; 32],
    config: TransportConfig,
    rendezvous: Arc<dyn Rendezvous>,
    peers: Arc<RwLock<HashMap<Uuid, PeerState>>>,
    event_tx: mpsc::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl PeerTransport {
    /// Begin peer discovery for a room.
    ///
    /// Connects to the rendezvous with bounded exponential backoff and
    /// announces the local peer. Fails with [`TransportError::Discovery`]
    /// when no attempt gets through.
    pub async fn join(
        room_id: impl Into<String>,
        doc_id: Uuid,
        local: PresenceRecord,
        key_tag: [u8; 32],
        rendezvous: Arc<dyn Rendezvous>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let room_id = room_id.into();
        let conn = connect_with_backoff(rendezvous.as_ref(), &room_id, &config).await?;

        let peer_id = local.peer_id;
        let peers = Arc::new(RwLock::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (out_tx, out_rx) = mpsc::channel(config.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);

        let ctx = SupervisorCtx {
            room_id,
            doc_id,
            local,
            key_tag,
            config,
            rendezvous,
            peers: peers.clone(),
            event_tx,
            closed: closed.clone(),
        };
        let supervisor = tokio::spawn(run_supervisor(ctx, conn, out_rx));

        Ok(Self {
            peer_id,
            doc_id,
            out_tx,
            event_rx: Some(event_rx),
            peers,
            supervisor: Some(supervisor),
            closed,
        })
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    /// Send a message to every connected peer, best-effort.
    pub async fn broadcast(&self, msg: &WireMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let encoded = msg.encode()?;
        // a full or dropped pipe is a silent drop, not a fault
        if let Err(e) = self.out_tx.try_send(encoded) {
            log::debug!("broadcast dropped: {e}");
        }
        Ok(())
    }

    /// Remote peers currently past the handshake.
    pub async fn peers(&self) -> Vec<PeerState> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Tear down every connection. Idempotent.
    pub async fn leave(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // best-effort departure note, then cut everything
        let bye = WireMessage::bye(self.peer_id, self.doc_id);
        if let Ok(encoded) = bye.encode() {
            let _ = self.out_tx.send(encoded).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
        self.peers.write().await.clear();
    }
}

impl Drop for PeerTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
    }
}

async fn connect_with_backoff(
    rendezvous: &dyn Rendezvous,
    room_id: &str,
    config: &TransportConfig,
) -> Result<RendezvousConn, TransportError> {
    let mut last_err = TransportError::Unavailable;
    for attempt in 0..config.max_retries {
        match rendezvous.open(room_id).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                log::warn!(
                    "rendezvous attempt {}/{} for room {room_id} failed: {e}",
                    attempt + 1,
                    config.max_retries
                );
                last_err = e;
            }
        }
        if attempt + 1 < config.max_retries {
            tokio::time::sleep(backoff_delay(config.base_backoff, attempt)).await;
        }
    }
    Err(last_err)
}

/// Exponential backoff delay for the given attempt, saturating instead of
/// overflowing for large retry counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Per-pipe bookkeeping for the supervisor.
struct PumpState {
    /// Peers rejected for a mismatched room key; logged once each
    rejected: HashSet<Uuid>,
    /// When each verified peer was last heard from
    last_seen: HashMap<Uuid, Instant>,
}

/// Connection supervisor: pumps one rendezvous pipe, reconnecting with
/// backoff when it breaks, until the transport is closed or retries run out.
async fn run_supervisor(
    ctx: SupervisorCtx,
    mut conn: RendezvousConn,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
) {
    let mut state = PumpState {
        rejected: HashSet::new(),
        last_seen: HashMap::new(),
    };

    loop {
        if announce(&ctx, &conn).await.is_err() {
            log::debug!("announce failed; reconnecting");
        }

        let lost = pump(&ctx, &mut conn, &mut out_rx, &mut state).await;
        if !lost || ctx.closed.load(Ordering::SeqCst) {
            return;
        }

        // transient loss: peers must re-handshake after we come back
        ctx.peers.write().await.clear();
        state.last_seen.clear();
        match connect_with_backoff(ctx.rendezvous.as_ref(), &ctx.room_id, &ctx.config).await {
            Ok(new_conn) => {
                log::info!("rendezvous reconnected for room {}", ctx.room_id);
                conn = new_conn;
            }
            Err(_) => {
                log::warn!("rendezvous retries exhausted for room {}", ctx.room_id);
                let _ = ctx.event_tx.send(TransportEvent::Unavailable).await;
                return;
            }
        }
    }
}

async fn announce(ctx: &SupervisorCtx, conn: &RendezvousConn) -> Result<(), TransportError> {
    let hello = WireMessage::hello(ctx.local.peer_id, ctx.doc_id, &ctx.local, ctx.key_tag, false)?;
    conn.outgoing
        .send(hello.encode()?)
        .await
        .map_err(|_| TransportError::Closed)
}

/// Pump until the pipe breaks (returns true) or the transport side hangs up
/// (returns false). Pings the room on the heartbeat interval and evicts
/// peers that have been silent past the timeout.
async fn pump(
    ctx: &SupervisorCtx,
    conn: &mut RendezvousConn,
    out_rx: &mut mpsc::Receiver<Vec<u8>>,
    state: &mut PumpState,
) -> bool {
    let mut heartbeat = tokio::time::interval(ctx.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = conn.incoming.recv() => match frame {
                Some(bytes) => handle_frame(ctx, conn, state, &bytes).await,
                None => return true,
            },
            outbound = out_rx.recv() => match outbound {
                Some(bytes) => {
                    if conn.outgoing.send(bytes).await.is_err() {
                        return true;
                    }
                }
                None => return false,
            },
            _ = heartbeat.tick() => {
                if let Ok(encoded) = WireMessage::ping(ctx.local.peer_id).encode() {
                    if conn.outgoing.send(encoded).await.is_err() {
                        return true;
                    }
                }
                evict_silent_peers(ctx, state).await;
            }
        }
    }
}

/// Drop peers that have not been heard from within the timeout, reporting
/// each as departed. A crashed peer never sends Bye; this is how its
/// record eventually goes away.
async fn evict_silent_peers(ctx: &SupervisorCtx, state: &mut PumpState) {
    let timeout = ctx.config.peer_timeout;
    let silent: Vec<Uuid> = state
        .last_seen
        .iter()
        .filter(|(_, seen)| seen.elapsed() > timeout)
        .map(|(peer, _)| *peer)
        .collect();

    for peer in silent {
        state.last_seen.remove(&peer);
        let known = ctx.peers.write().await.remove(&peer).is_some();
        if known {
            log::info!("peer {peer} timed out after {timeout:?}");
            let _ = ctx.event_tx.send(TransportEvent::PeerLeft(peer)).await;
        }
    }
}

async fn handle_frame(
    ctx: &SupervisorCtx,
    conn: &RendezvousConn,
    state: &mut PumpState,
    bytes: &[u8],
) {
    let msg = match WireMessage::decode(bytes) {
        Ok(msg) => msg,
        Err(e) => {
            log::debug!("dropping undecodable frame: {e}");
            return;
        }
    };
    if msg.peer_id == ctx.local.peer_id {
        return;
    }
    if msg.doc_id != ctx.doc_id && !msg.doc_id.is_nil() {
        return;
    }

    // any traffic from a verified peer counts as a liveness signal
    if state.last_seen.contains_key(&msg.peer_id) {
        state.last_seen.insert(msg.peer_id, Instant::now());
    }

    match msg.msg_type {
        MessageType::Hello => {
            let payload = match msg.hello_payload() {
                Ok(p) => p,
                Err(e) => {
                    log::debug!("malformed hello from {}: {e}", msg.peer_id);
                    return;
                }
            };
            if payload.key_tag != ctx.key_tag {
                if state.rejected.insert(msg.peer_id) {
                    log::warn!(
                        "peer {} failed the room-key handshake; ignoring it",
                        msg.peer_id
                    );
                }
                return;
            }
            let newly_known = {
                let mut peers = ctx.peers.write().await;
                peers
                    .insert(
                        msg.peer_id,
                        PeerState {
                            record: payload.record.clone(),
                            state: ConnectionState::Connected,
                        },
                    )
                    .is_none()
            };
            state.last_seen.insert(msg.peer_id, Instant::now());
            if payload.reply {
                // a reply never triggers another reply, and only a first
                // sighting is worth reporting upstream
                if newly_known {
                    let _ = ctx
                        .event_tx
                        .send(TransportEvent::PeerJoined(payload.record))
                        .await;
                }
            } else {
                // answer announcements so the sender learns us, and always
                // report them: a re-announce means the peer reconnected and
                // wants to resynchronize
                if let Ok(reply) = WireMessage::hello(
                    ctx.local.peer_id,
                    ctx.doc_id,
                    &ctx.local,
                    ctx.key_tag,
                    true,
                ) {
                    if let Ok(encoded) = reply.encode() {
                        let _ = conn.outgoing.send(encoded).await;
                    }
                }
                let _ = ctx
                    .event_tx
                    .send(TransportEvent::PeerJoined(payload.record))
                    .await;
            }
        }
        MessageType::Bye => {
            state.last_seen.remove(&msg.peer_id);
            let known = ctx.peers.write().await.remove(&msg.peer_id).is_some();
            if known {
                let _ = ctx.event_tx.send(TransportEvent::PeerLeft(msg.peer_id)).await;
            }
        }
        MessageType::Ops => {
            if !verified(ctx, msg.peer_id).await {
                return;
            }
            if let Ok(ops) = msg.text_ops() {
                let _ = ctx
                    .event_tx
                    .send(TransportEvent::Ops {
                        peer: msg.peer_id,
                        ops,
                    })
                    .await;
            }
        }
        MessageType::SyncRequest => {
            if !verified(ctx, msg.peer_id).await {
                return;
            }
            if let Ok(version) = msg.version_vector() {
                let _ = ctx
                    .event_tx
                    .send(TransportEvent::SyncRequest {
                        peer: msg.peer_id,
                        version,
                    })
                    .await;
            }
        }
        MessageType::SyncReply => {
            if !verified(ctx, msg.peer_id).await {
                return;
            }
            if let Ok(ops) = msg.text_ops() {
                let _ = ctx
                    .event_tx
                    .send(TransportEvent::SyncReply {
                        peer: msg.peer_id,
                        ops,
                    })
                    .await;
            }
        }
        MessageType::Presence => {
            if !verified(ctx, msg.peer_id).await {
                return;
            }
            if let Ok(record) = msg.presence_record() {
                let _ = ctx.event_tx.send(TransportEvent::Presence(record)).await;
            }
        }
        MessageType::Ping => {
            if let Ok(encoded) = WireMessage::pong(ctx.local.peer_id).encode() {
                let _ = conn.outgoing.send(encoded).await;
            }
        }
        MessageType::Pong => {}
    }
}

async fn verified(ctx: &SupervisorCtx, peer: Uuid) -> bool {
    if ctx.peers.read().await.contains_key(&peer) {
        true
    } else {
        log::debug!("dropping frame from unverified peer {peer}");
        false
    }
}
