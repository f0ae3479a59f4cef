//! # cowrite — Real-time collaborative text-editing session layer
//!
//! Peer-to-peer multiplayer editing: a CRDT document store, an ephemeral
//! presence channel, and a rendezvous-based peer transport, wrapped in a
//! session controller a host editor drives through a single handle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   SessionEvent    ┌─────────────┐
//! │EditorBinding│ ◄──────────────── │   Session   │
//! │ (per host)  │ ──────────────► │ (controller) │
//! └──────┬──────┘   Edit/undo       └──────┬──────┘
//!        │                                 │
//!        ▼                          ┌──────┴──────┐
//! ┌─────────────┐                   │             │
//! │EditorSurface│            ┌──────▼─────┐ ┌─────▼──────┐
//! │ (buffer)    │            │ Document   │ │  Peer      │
//! └─────────────┘            │ Store      │ │  Transport │
//!                            │ (RGA CRDT) │ └─────┬──────┘
//!                            └────────────┘       │
//!                                          ┌──────▼──────┐
//!                                          │ Rendezvous  │
//!                                          │ (room relay)│
//!                                          └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded [`protocol::WireMessage`])
//! - [`document`] — Replicated text store with op log and version vectors
//! - [`presence`] — Ephemeral per-peer cursors, names, and colors
//! - [`transport`] — Rendezvous discovery, room-key handshake, reconnection
//! - [`session`] — Join/leave lifecycle, reconciliation, event stream
//! - [`editor`] — Host editor binding with origin-filtered undo
//!
//! Content flows through the store and converges on every peer; presence
//! flows past the store and is forgotten on disconnect. Nothing is
//! persisted: a room lives exactly as long as someone is in it.

pub mod document;
pub mod editor;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use document::{
    AppliedEdit, ContentDelta, DocumentStore, Edit, OpId, PeerId, TextOp, VersionVector,
    doc_id_for_room,
};
pub use editor::{BufferEditor, EditorBinding, EditorSurface};
pub use presence::{CursorRange, PeerColor, PresenceChannel, PresenceRecord};
pub use protocol::{MessageType, ProtocolError, WireMessage};
pub use session::{
    JoinRequest, Session, SessionConfig, SessionError, SessionEvent, SessionStatus,
};
pub use transport::{
    ConnectionState, MemoryRendezvous, PeerTransport, Rendezvous, RendezvousConn,
    TransportConfig, TransportError, TransportEvent, WebSocketRendezvous, derive_key_tag,
};
