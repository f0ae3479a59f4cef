//! Editor binding: the adapter between a host text editor and a session.
//!
//! The binding relays local edits into the session, replays remote deltas
//! into the editor surface, and keeps an origin-filtered undo history so
//! that undo only ever reverts this peer's own operations. Remote changes
//! are written straight into the surface and never re-enter the session,
//! so nothing a peer sends can echo back out as a local edit.
//!
//! Hosts implement [`EditorSurface`] for their buffer; [`BufferEditor`] is
//! the in-memory implementation used by tests and headless hosts.

use std::collections::HashMap;

use uuid::Uuid;

use crate::document::{AppliedEdit, Edit, TextOp};
use crate::presence::{CursorRange, PresenceRecord};
use crate::session::{Session, SessionError, SessionEvent, SessionStatus};

/// The editor-side surface a binding drives.
///
/// All positions are character offsets into the visible buffer, matching
/// the coordinates the document store emits.
pub trait EditorSurface {
    fn content(&self) -> String;

    /// Replace `removed` characters at `pos` with `text`.
    fn replace_range(&mut self, pos: usize, removed: usize, text: &str);

    /// Replace the entire buffer (join-time reconciliation).
    fn set_content(&mut self, text: &str);

    /// Render or move a remote peer's cursor.
    fn set_remote_cursor(&mut self, record: &PresenceRecord);

    fn clear_remote_cursor(&mut self, peer_id: Uuid);
}

/// A plain in-memory surface: a char buffer plus tracked remote cursors.
#[derive(Debug, Default)]
pub struct BufferEditor {
    buffer: Vec<char>,
    cursors: HashMap<Uuid, PresenceRecord>,
}

impl BufferEditor {
    pub fn new(content: &str) -> Self {
        Self {
            buffer: content.chars().collect(),
            cursors: HashMap::new(),
        }
    }

    pub fn remote_cursors(&self) -> &HashMap<Uuid, PresenceRecord> {
        &self.cursors
    }
}

impl EditorSurface for BufferEditor {
    fn content(&self) -> String {
        self.buffer.iter().collect()
    }

    fn replace_range(&mut self, pos: usize, removed: usize, text: &str) {
        let pos = pos.min(self.buffer.len());
        let end = (pos + removed).min(self.buffer.len());
        self.buffer.splice(pos..end, text.chars());
    }

    fn set_content(&mut self, text: &str) {
        self.buffer = text.chars().collect();
    }

    fn set_remote_cursor(&mut self, record: &PresenceRecord) {
        self.cursors.insert(record.peer_id, record.clone());
    }

    fn clear_remote_cursor(&mut self, peer_id: Uuid) {
        self.cursors.remove(&peer_id);
    }
}

/// Binds one editor surface to one session.
///
/// Owns the undo/redo stacks. Each stack entry is the op batch of one
/// local edit; undo asks the session to revert the batch and pushes the
/// inverse batch onto the redo stack. Remote operations never enter the
/// stacks, so undoing cannot destroy another peer's work.
pub struct EditorBinding<E: EditorSurface> {
    surface: E,
    undo_stack: Vec<Vec<TextOp>>,
    redo_stack: Vec<Vec<TextOp>>,
}

impl<E: EditorSurface> EditorBinding<E> {
    pub fn new(surface: E) -> Self {
        Self {
            surface,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn surface(&self) -> &E {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut E {
        &mut self.surface
    }

    pub fn content(&self) -> String {
        self.surface.content()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Apply an edit the user made in the editor.
    ///
    /// The edit is integrated into the session's store, replayed into the
    /// surface, and recorded for undo. A fresh local edit clears the redo
    /// stack.
    pub async fn local_edit(&mut self, session: &Session, edit: Edit) -> Result<(), SessionError> {
        let applied = session.apply_local(edit).await?;
        self.replay(&applied);
        if !applied.ops.is_empty() {
            self.undo_stack.push(applied.ops);
            self.redo_stack.clear();
        }
        Ok(())
    }

    /// Revert this peer's most recent edit. Remote edits interleaved since
    /// then are untouched.
    pub async fn undo(&mut self, session: &Session) -> Result<bool, SessionError> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let applied = session.revert(&batch).await?;
        self.replay(&applied);
        if !applied.ops.is_empty() {
            self.redo_stack.push(applied.ops);
        }
        Ok(true)
    }

    /// Re-apply the most recently undone edit.
    pub async fn redo(&mut self, session: &Session) -> Result<bool, SessionError> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let applied = session.revert(&batch).await?;
        self.replay(&applied);
        if !applied.ops.is_empty() {
            self.undo_stack.push(applied.ops);
        }
        Ok(true)
    }

    /// Drain pending session events into the surface without blocking.
    ///
    /// Returns the session status carried by the last `StatusChanged`
    /// event seen, if any, so hosts can refresh their indicator.
    pub fn process_pending(
        &mut self,
        events: &mut tokio::sync::mpsc::Receiver<SessionEvent>,
    ) -> Option<SessionStatus> {
        let mut last_status = None;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::StatusChanged(status) => last_status = Some(status),
                SessionEvent::RemoteDelta(delta) => {
                    self.surface
                        .replace_range(delta.pos, delta.removed, &delta.inserted);
                }
                SessionEvent::ContentReset(text) => {
                    self.surface.set_content(&text);
                    // the old buffer is gone; histories referring to it too
                    self.undo_stack.clear();
                    self.redo_stack.clear();
                }
                SessionEvent::PresenceChanged { peer_id, record } => match record {
                    Some(record) => self.surface.set_remote_cursor(&record),
                    None => self.surface.clear_remote_cursor(peer_id),
                },
            }
        }
        last_status
    }

    /// Forward the local cursor to the session's presence channel.
    pub async fn cursor_moved(
        &mut self,
        session: &Session,
        cursor: Option<CursorRange>,
    ) -> Result<(), SessionError> {
        session.set_cursor(cursor).await
    }

    fn replay(&mut self, applied: &AppliedEdit) {
        for delta in &applied.deltas {
            self.surface
                .replace_range(delta.pos, delta.removed, &delta.inserted);
        }
    }
}
