//! Session controller: owns one room's document store, presence channel,
//! and transport, and exposes the whole thing to a host as a single handle.
//!
//! ```text
//! host ──► Session::join(room, secret, editor content)
//!              │
//!              ├─► DocumentStore (created per room)
//!              ├─► reconcile: room state wins, else import editor content
//!              ├─► PeerTransport (rendezvous + handshake)
//!              └─► dispatcher task: transport events ──► store/presence
//!                                            │
//!                                            └──► SessionEvent stream
//! ```
//!
//! State machine: `Disconnected → Connecting → Live → Disconnected`, with
//! `Live ⇄ Suspended` as a user-toggled pause. Suspension stops the
//! transport but keeps the store, so edits made offline are delivered on
//! resume through the version-vector catch-up.
//!
//! All store/presence mutation funnels through this controller and its
//! dispatcher; nothing else holds the handles.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::document::{
    doc_id_for_room, AppliedEdit, ContentDelta, DocumentStore, Edit, TextOp,
};
use crate::presence::{CursorRange, PresenceChannel, PresenceRecord};
use crate::protocol::WireMessage;
use crate::transport::{
    derive_key_tag, PeerTransport, Rendezvous, TransportConfig, TransportError, TransportEvent,
};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Live,
    Suspended,
}

impl SessionStatus {
    /// The status string hosts render in their indicator.
    pub fn indicator(&self) -> &'static str {
        match self {
            SessionStatus::Live => "Online",
            _ => "Offline",
        }
    }
}

/// Validated join parameters. The secret is opaque bytes used only for
/// room-key derivation; no format is imposed on it.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_id: String,
    pub secret: Option<Vec<u8>>,
}

impl JoinRequest {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.room_id.trim().is_empty() {
            return Err(SessionError::InvalidRequest("room id must not be empty".into()));
        }
        Ok(())
    }
}

/// Session-level failures, reported synchronously to the caller.
/// Connection trouble after a successful join arrives as status events
/// instead — it never throws into the host.
#[derive(Debug)]
pub enum SessionError {
    InvalidRequest(String),
    /// A session for this room is already active in this process
    RoomBusy(String),
    /// Operation requires a Live (or Suspended) session
    NotLive,
    /// The session was left; the handle is spent
    Terminated,
    Transport(TransportError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(e) => write!(f, "Invalid join request: {e}"),
            Self::RoomBusy(room) => write!(f, "Room {room} already has an active session"),
            Self::NotLive => write!(f, "Session is not live"),
            Self::Terminated => write!(f, "Session has been left"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Events pushed to the host and the editor binding.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    /// A remote change to apply to the visible buffer
    RemoteDelta(ContentDelta),
    /// Replace the whole buffer (join-time reconciliation)
    ContentReset(String),
    /// A peer's presence was updated (`Some`) or removed (`None`)
    PresenceChanged {
        peer_id: Uuid,
        record: Option<PresenceRecord>,
    },
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    /// How long join waits for an initial sync reply before treating the
    /// room as empty
    pub sync_window: Duration,
    /// Buffered session events
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            sync_window: Duration::from_millis(400),
            event_capacity: 256,
        }
    }
}

// One active session per room id per process. The claim is released on
// leave or drop.
fn room_claims() -> &'static StdMutex<HashSet<String>> {
    static CLAIMS: OnceLock<StdMutex<HashSet<String>>> = OnceLock::new();
    CLAIMS.get_or_init(|| StdMutex::new(HashSet::new()))
}

fn claim_room(room_id: &str) -> Result<(), SessionError> {
    let mut claims = room_claims().lock().expect("room claim table poisoned");
    if !claims.insert(room_id.to_string()) {
        return Err(SessionError::RoomBusy(room_id.to_string()));
    }
    Ok(())
}

fn release_room(room_id: &str) {
    let mut claims = room_claims().lock().expect("room claim table poisoned");
    claims.remove(room_id);
}

/// Handles shared between the session facade and its dispatcher task.
#[derive(Clone)]
struct SessionShared {
    store: Arc<Mutex<DocumentStore>>,
    presence: Arc<Mutex<PresenceChannel>>,
    status: Arc<RwLock<SessionStatus>>,
    transport: Arc<Mutex<Option<PeerTransport>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    peer_id: Uuid,
    doc_id: Uuid,
}

impl SessionShared {
    async fn set_status(&self, status: SessionStatus) {
        *self.status.write().await = status;
        let _ = self
            .event_tx
            .send(SessionEvent::StatusChanged(status))
            .await;
    }

    /// Best-effort broadcast through the current transport, if any.
    async fn broadcast(&self, msg: WireMessage) {
        let transport = self.transport.lock().await;
        if let Some(t) = transport.as_ref() {
            if let Err(e) = t.broadcast(&msg).await {
                log::debug!("session broadcast skipped: {e}");
            }
        }
    }
}

/// One collaborative editing session.
///
/// Obtained from [`Session::join`]; the host holds at most one handle per
/// room, enforced by the process-wide claim. `leave` is terminal.
pub struct Session {
    room_id: String,
    doc_id: Uuid,
    peer_id: Uuid,
    key_tag: [u8; 32],
    config: SessionConfig,
    rendezvous: Arc<dyn Rendezvous>,
    shared: SessionShared,
    event_rx: StdMutex<Option<mpsc::Receiver<SessionEvent>>>,
    dispatcher: StdMutex<Option<JoinHandle<()>>>,
    left: AtomicBool,
}

impl Session {
    /// Join a room with default configuration.
    pub async fn join(
        request: JoinRequest,
        local_content: &str,
        rendezvous: Arc<dyn Rendezvous>,
    ) -> Result<Self, SessionError> {
        Self::join_with_config(request, local_content, rendezvous, SessionConfig::default())
            .await
    }

    /// Join a room: create the store, reconcile content, start the
    /// transport, and go Live.
    ///
    /// Reconciliation: if the room already holds content after the initial
    /// sync window, that content wins and the host gets a
    /// [`SessionEvent::ContentReset`] overwriting the editor; otherwise
    /// `local_content` seeds the room. A failed join leaves the editor
    /// untouched.
    pub async fn join_with_config(
        request: JoinRequest,
        local_content: &str,
        rendezvous: Arc<dyn Rendezvous>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        request.validate()?;
        claim_room(&request.room_id)?;

        match Self::join_inner(&request, local_content, rendezvous, config).await {
            Ok(session) => Ok(session),
            Err(e) => {
                release_room(&request.room_id);
                Err(e)
            }
        }
    }

    async fn join_inner(
        request: &JoinRequest,
        local_content: &str,
        rendezvous: Arc<dyn Rendezvous>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let room_id = request.room_id.clone();
        let doc_id = doc_id_for_room(&room_id);
        let key_tag = derive_key_tag(&room_id, request.secret.as_deref());

        // ephemeral identity, regenerated every session by design
        let peer_id = Uuid::new_v4();
        let local_record = PresenceRecord::generated(peer_id);

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let shared = SessionShared {
            store: Arc::new(Mutex::new(DocumentStore::new(doc_id, peer_id))),
            presence: Arc::new(Mutex::new(PresenceChannel::new(local_record.clone()))),
            status: Arc::new(RwLock::new(SessionStatus::Connecting)),
            transport: Arc::new(Mutex::new(None)),
            event_tx,
            peer_id,
            doc_id,
        };
        let _ = shared
            .event_tx
            .send(SessionEvent::StatusChanged(SessionStatus::Connecting))
            .await;

        let mut transport = PeerTransport::join(
            room_id.clone(),
            doc_id,
            local_record,
            key_tag,
            rendezvous.clone(),
            config.transport.clone(),
        )
        .await?;
        let mut transport_rx = transport
            .take_event_rx()
            .expect("fresh transport always has an event receiver");
        *shared.transport.lock().await = Some(transport);

        // Initial-state window: pump transport events inline until the room
        // answers with state or the window closes. Deltas stay suppressed —
        // the editor is reconciled in one step below.
        let deadline = Instant::now() + config.sync_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, transport_rx.recv()).await {
                Ok(Some(event)) => {
                    let caught_up = matches!(event, TransportEvent::SyncReply { .. });
                    handle_transport_event(&shared, event, false).await;
                    if caught_up {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        // Reconciliation tie-break: room state always wins, including over
        // anything typed during the sync window.
        let import = {
            let store = shared.store.lock().await;
            store.is_empty()
        };
        if import {
            if !local_content.is_empty() {
                let (applied, clock) = {
                    let mut store = shared.store.lock().await;
                    let applied = store.import_initial(local_content);
                    (applied, store.clock())
                };
                log::info!("seeded room {room_id} with {} characters", local_content.chars().count());
                if let Ok(msg) = WireMessage::ops(peer_id, doc_id, clock, &applied.ops) {
                    shared.broadcast(msg).await;
                }
            }
        } else {
            let snapshot = {
                let store = shared.store.lock().await;
                store.snapshot()
            };
            log::info!("room {room_id} already has state; overwriting editor");
            let _ = shared
                .event_tx
                .send(SessionEvent::ContentReset(snapshot))
                .await;
        }

        shared.set_status(SessionStatus::Live).await;

        let dispatcher = tokio::spawn(dispatch_loop(shared.clone(), transport_rx));

        Ok(Self {
            room_id,
            doc_id,
            peer_id,
            key_tag,
            config,
            rendezvous,
            shared,
            event_rx: StdMutex::new(Some(event_rx)),
            dispatcher: StdMutex::new(Some(dispatcher)),
            left: AtomicBool::new(false),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    /// This session's ephemeral peer identity.
    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.lock().expect("event receiver slot poisoned").take()
    }

    pub async fn status(&self) -> SessionStatus {
        *self.shared.status.read().await
    }

    /// `"Online"` / `"Offline"` for the host's status indicator.
    pub async fn status_indicator(&self) -> &'static str {
        self.status().await.indicator()
    }

    /// Current visible document content.
    pub async fn content(&self) -> String {
        self.shared.store.lock().await.snapshot()
    }

    /// Remote peers' presence records.
    pub async fn peers(&self) -> Vec<PresenceRecord> {
        self.shared.presence.lock().await.records()
    }

    /// This session's own presence record.
    pub async fn local_presence(&self) -> PresenceRecord {
        self.shared.presence.lock().await.local().clone()
    }

    /// Integrate a local edit and propagate it when Live.
    ///
    /// Local editing keeps working while Suspended or Disconnected; the
    /// operations accumulate in the log and reach peers through catch-up.
    pub async fn apply_local(&self, edit: Edit) -> Result<AppliedEdit, SessionError> {
        self.ensure_usable()?;
        let (applied, clock) = {
            let mut store = self.shared.store.lock().await;
            let applied = store.apply_local(edit);
            (applied, store.clock())
        };
        self.broadcast_ops(&applied.ops, clock).await;
        Ok(applied)
    }

    /// Apply the inverse of previously applied local operations (undo/redo).
    pub async fn revert(&self, ops: &[TextOp]) -> Result<AppliedEdit, SessionError> {
        self.ensure_usable()?;
        let (applied, clock) = {
            let mut store = self.shared.store.lock().await;
            let applied = store.revert(ops);
            (applied, store.clock())
        };
        self.broadcast_ops(&applied.ops, clock).await;
        Ok(applied)
    }

    /// Update the local cursor; broadcasts are throttled by the presence
    /// channel.
    pub async fn set_cursor(&self, cursor: Option<CursorRange>) -> Result<(), SessionError> {
        self.ensure_usable()?;
        let broadcastable = {
            let mut presence = self.shared.presence.lock().await;
            presence.set_local_cursor(cursor)
        };
        if let Some(record) = broadcastable {
            if self.status().await == SessionStatus::Live {
                if let Ok(msg) = WireMessage::presence(self.peer_id, self.doc_id, &record) {
                    self.shared.broadcast(msg).await;
                }
            }
        }
        Ok(())
    }

    /// Rename the local peer and announce it.
    pub async fn set_display_name(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_usable()?;
        let record = {
            let mut presence = self.shared.presence.lock().await;
            let updated = presence.local().clone().with_name(name);
            presence.set_local(updated)
        };
        if self.status().await == SessionStatus::Live {
            if let Ok(msg) = WireMessage::presence(self.peer_id, self.doc_id, &record) {
                self.shared.broadcast(msg).await;
            }
        }
        Ok(())
    }

    /// Pause or resume network participation.
    ///
    /// Live → Suspended stops the transport but keeps the store alive.
    /// Suspended → Live reconnects; the hello/sync-request exchange pulls
    /// both sides up to date without duplicating anything.
    pub async fn toggle(&self) -> Result<SessionStatus, SessionError> {
        self.ensure_usable()?;
        let current = self.status().await;
        match current {
            SessionStatus::Live => {
                self.stop_transport().await;
                self.shared.set_status(SessionStatus::Suspended).await;
                Ok(SessionStatus::Suspended)
            }
            SessionStatus::Suspended => {
                let record = self.shared.presence.lock().await.announce();
                let mut transport = PeerTransport::join(
                    self.room_id.clone(),
                    self.doc_id,
                    record,
                    self.key_tag,
                    self.rendezvous.clone(),
                    self.config.transport.clone(),
                )
                .await?;
                let transport_rx = transport
                    .take_event_rx()
                    .expect("fresh transport always has an event receiver");
                *self.shared.transport.lock().await = Some(transport);
                self.shared.set_status(SessionStatus::Live).await;
                let handle = tokio::spawn(dispatch_loop(self.shared.clone(), transport_rx));
                *self.dispatcher.lock().expect("dispatcher slot poisoned") = Some(handle);
                Ok(SessionStatus::Live)
            }
            _ => Err(SessionError::NotLive),
        }
    }

    /// Leave the room. Terminal and idempotent: the handle is spent and the
    /// room claim is released.
    pub async fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_transport().await;
        self.shared.presence.lock().await.clear();
        self.shared.set_status(SessionStatus::Disconnected).await;
        release_room(&self.room_id);
        log::info!("left room {}", self.room_id);
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        if self.left.load(Ordering::SeqCst) {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }

    async fn stop_transport(&self) {
        let transport = self.shared.transport.lock().await.take();
        if let Some(mut t) = transport {
            t.leave().await;
        }
        if let Some(handle) = self
            .dispatcher
            .lock()
            .expect("dispatcher slot poisoned")
            .take()
        {
            handle.abort();
        }
    }

    async fn broadcast_ops(&self, ops: &[TextOp], clock: u64) {
        if ops.is_empty() || self.status().await != SessionStatus::Live {
            return;
        }
        match WireMessage::ops(self.peer_id, self.doc_id, clock, ops) {
            Ok(msg) => self.shared.broadcast(msg).await,
            Err(e) => log::error!("failed to encode op batch: {e}"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.left.swap(true, Ordering::SeqCst) {
            release_room(&self.room_id);
        }
        if let Some(handle) = self
            .dispatcher
            .lock()
            .expect("dispatcher slot poisoned")
            .take()
        {
            handle.abort();
        }
        // the transport's own Drop aborts its supervisor
    }
}

/// Dispatcher: the single writer for store and presence once a session is
/// live. Exits when the transport side closes.
async fn dispatch_loop(shared: SessionShared, mut rx: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = rx.recv().await {
        handle_transport_event(&shared, event, true).await;
    }
}

async fn handle_transport_event(shared: &SessionShared, event: TransportEvent, emit_deltas: bool) {
    match event {
        TransportEvent::PeerJoined(record) => {
            let peer_id = record.peer_id;
            log::debug!("peer {peer_id} joined the room");
            {
                let mut presence = shared.presence.lock().await;
                presence.apply_remote(record.clone());
            }
            let _ = shared
                .event_tx
                .send(SessionEvent::PresenceChanged {
                    peer_id,
                    record: Some(record),
                })
                .await;

            // pull whatever they have that we don't, and show them our face
            let version = shared.store.lock().await.version().clone();
            if let Ok(msg) = WireMessage::sync_request(shared.peer_id, shared.doc_id, &version) {
                shared.broadcast(msg).await;
            }
            let announce = shared.presence.lock().await.announce();
            if let Ok(msg) = WireMessage::presence(shared.peer_id, shared.doc_id, &announce) {
                shared.broadcast(msg).await;
            }
        }
        TransportEvent::PeerLeft(peer_id) => {
            log::debug!("peer {peer_id} left the room");
            shared.presence.lock().await.remove_peer(peer_id);
            let _ = shared
                .event_tx
                .send(SessionEvent::PresenceChanged {
                    peer_id,
                    record: None,
                })
                .await;
        }
        TransportEvent::Ops { ops, .. } | TransportEvent::SyncReply { ops, .. } => {
            let deltas = {
                let mut store = shared.store.lock().await;
                let mut deltas = Vec::new();
                for op in ops {
                    deltas.extend(store.apply_remote(op));
                }
                deltas
            };
            if emit_deltas {
                for delta in deltas {
                    let _ = shared.event_tx.send(SessionEvent::RemoteDelta(delta)).await;
                }
            }
        }
        TransportEvent::SyncRequest { peer, version } => {
            let ops = shared.store.lock().await.diff_since(&version);
            log::debug!("sync request from {peer}: {} ops behind", ops.len());
            // an empty reply still tells the requester it is caught up
            if let Ok(msg) = WireMessage::sync_reply(shared.peer_id, shared.doc_id, &ops) {
                shared.broadcast(msg).await;
            }
        }
        TransportEvent::Presence(record) => {
            let peer_id = record.peer_id;
            shared.presence.lock().await.apply_remote(record.clone());
            let _ = shared
                .event_tx
                .send(SessionEvent::PresenceChanged {
                    peer_id,
                    record: Some(record),
                })
                .await;
        }
        TransportEvent::Unavailable => {
            log::warn!("transport unavailable; session is now offline");
            // nobody is reachable anymore; stop rendering their cursors
            let dropped: Vec<Uuid> = {
                let mut presence = shared.presence.lock().await;
                let ids = presence.records().iter().map(|r| r.peer_id).collect();
                presence.clear();
                ids
            };
            for peer_id in dropped {
                let _ = shared
                    .event_tx
                    .send(SessionEvent::PresenceChanged {
                        peer_id,
                        record: None,
                    })
                    .await;
            }
            shared.set_status(SessionStatus::Disconnected).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryRendezvous;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            transport: TransportConfig {
                max_retries: 2,
                base_backoff: Duration::from_millis(5),
                channel_capacity: 64,
                ..TransportConfig::default()
            },
            sync_window: Duration::from_millis(50),
            event_capacity: 64,
        }
    }

    #[test]
    fn test_join_request_validation() {
        assert!(JoinRequest::new("room").validate().is_ok());
        assert!(JoinRequest::new("").validate().is_err());
        assert!(JoinRequest::new("   ").validate().is_err());
    }

    #[test]
    fn test_status_indicator() {
        assert_eq!(SessionStatus::Live.indicator(), "Online");
        assert_eq!(SessionStatus::Disconnected.indicator(), "Offline");
        assert_eq!(SessionStatus::Suspended.indicator(), "Offline");
        assert_eq!(SessionStatus::Connecting.indicator(), "Offline");
    }

    #[tokio::test]
    async fn test_solo_join_imports_local_content() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("solo-import"),
            "hello",
            hub,
            fast_config(),
        )
        .await
        .unwrap();

        assert_eq!(session.status().await, SessionStatus::Live);
        assert_eq!(session.content().await, "hello");
        session.leave().await;
    }

    #[tokio::test]
    async fn test_join_rejects_empty_room_id() {
        let hub = Arc::new(MemoryRendezvous::new());
        let result =
            Session::join_with_config(JoinRequest::new(""), "", hub, fast_config()).await;
        assert!(matches!(result, Err(SessionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_room_claim_is_exclusive() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("claimed"),
            "",
            hub.clone(),
            fast_config(),
        )
        .await
        .unwrap();

        let second = Session::join_with_config(
            JoinRequest::new("claimed"),
            "",
            hub.clone(),
            fast_config(),
        )
        .await;
        assert!(matches!(second, Err(SessionError::RoomBusy(_))));

        // leaving releases the claim
        session.leave().await;
        let third =
            Session::join_with_config(JoinRequest::new("claimed"), "", hub, fast_config()).await;
        assert!(third.is_ok());
        third.unwrap().leave().await;
    }

    #[tokio::test]
    async fn test_failed_join_releases_claim() {
        let hub = Arc::new(MemoryRendezvous::new());
        hub.set_reachable(false);
        let result = Session::join_with_config(
            JoinRequest::new("flaky"),
            "",
            hub.clone(),
            fast_config(),
        )
        .await;
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Discovery(_)))
        ));

        hub.set_reachable(true);
        let retry =
            Session::join_with_config(JoinRequest::new("flaky"), "", hub, fast_config()).await;
        assert!(retry.is_ok());
        retry.unwrap().leave().await;
    }

    #[tokio::test]
    async fn test_local_editing_while_suspended() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("suspended-edit"),
            "base",
            hub,
            fast_config(),
        )
        .await
        .unwrap();

        assert_eq!(session.toggle().await.unwrap(), SessionStatus::Suspended);
        session
            .apply_local(Edit::Insert {
                pos: 4,
                text: "!".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.content().await, "base!");

        assert_eq!(session.toggle().await.unwrap(), SessionStatus::Live);
        session.leave().await;
    }

    #[tokio::test]
    async fn test_leave_is_terminal() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("terminal"),
            "",
            hub,
            fast_config(),
        )
        .await
        .unwrap();

        session.leave().await;
        session.leave().await; // idempotent

        assert_eq!(session.status().await, SessionStatus::Disconnected);
        assert!(matches!(
            session
                .apply_local(Edit::Insert {
                    pos: 0,
                    text: "x".into()
                })
                .await,
            Err(SessionError::Terminated)
        ));
        assert!(matches!(session.toggle().await, Err(SessionError::Terminated)));
    }

    #[tokio::test]
    async fn test_toggle_requires_live_or_suspended() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("toggle-guard"),
            "",
            hub,
            fast_config(),
        )
        .await
        .unwrap();

        // force Disconnected (as after retry exhaustion)
        session.shared.set_status(SessionStatus::Disconnected).await;
        assert!(matches!(session.toggle().await, Err(SessionError::NotLive)));
        session.leave().await;
    }

    #[tokio::test]
    async fn test_event_rx_taken_once() {
        let hub = Arc::new(MemoryRendezvous::new());
        let session = Session::join_with_config(
            JoinRequest::new("events-once"),
            "",
            hub,
            fast_config(),
        )
        .await
        .unwrap();

        assert!(session.take_event_rx().is_some());
        assert!(session.take_event_rx().is_none());
        session.leave().await;
    }
}
