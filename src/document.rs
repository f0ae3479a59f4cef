//! Shared document store: a replicated text buffer with deterministic merge.
//!
//! Content is a sequence of character elements, each stamped with a unique
//! [`OpId`] (Lamport clock + peer id). Concurrent inserts anchored at the
//! same origin are ordered by descending `OpId`, independent of arrival
//! order, so every replica that has seen the same operations renders the
//! same string. Deletes are tombstones — elements are never physically
//! removed, which is what makes the ordering stable.
//!
//! ```text
//! local edit ──► apply_local ──► TextOp(s) ──► broadcast
//!                                   │
//! remote op  ──► apply_remote ──────┴──► elements (tombstoned sequence)
//!                    │                        │
//!              pending buffer           snapshot() / deltas
//!        (dependency not yet seen)
//! ```
//!
//! Reference: Kleppmann, Chapter 5 — Replication

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Peer identity. Ephemeral — regenerated for every session.
pub type PeerId = Uuid;

/// Unique, causally ordered operation identifier.
///
/// Ordered by `(lamport, peer)`. The Lamport clock advances past every
/// remote id a replica integrates, so an element's id always exceeds its
/// origin's id. That property is what lets insertion resolve concurrent
/// siblings with a plain id comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OpId {
    pub lamport: u64,
    pub peer: PeerId,
}

impl OpId {
    pub fn new(lamport: u64, peer: PeerId) -> Self {
        Self { lamport, peer }
    }
}

/// A single document operation as it travels between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextOp {
    /// Insert `ch` directly after the element `origin` (document head if None).
    Insert {
        id: OpId,
        origin: Option<OpId>,
        ch: char,
    },
    /// Tombstone the element identified by `target`.
    Delete { id: OpId, target: OpId },
}

impl TextOp {
    pub fn id(&self) -> OpId {
        match self {
            TextOp::Insert { id, .. } | TextOp::Delete { id, .. } => *id,
        }
    }
}

/// Per-peer maximum Lamport value seen, used to compute catch-up diffs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(HashMap<PeerId, u64>);

impl VersionVector {
    /// Whether `id` falls inside the observed range for its peer.
    pub fn contains(&self, id: OpId) -> bool {
        self.0.get(&id.peer).is_some_and(|&max| max >= id.lamport)
    }

    /// Advance the observed range for `id`'s peer.
    pub fn observe(&mut self, id: OpId) {
        let entry = self.0.entry(id.peer).or_insert(0);
        if id.lamport > *entry {
            *entry = id.lamport;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A local edit expressed in visible character positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
}

/// A visible-content change: replace `removed` characters at `pos` with
/// `inserted`. Positions are character indices into the visible string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDelta {
    pub pos: usize,
    pub removed: usize,
    pub inserted: String,
}

/// Result of integrating a local edit (or an undo revert).
#[derive(Debug, Clone, Default)]
pub struct AppliedEdit {
    /// Operations to broadcast, in generation order.
    pub ops: Vec<TextOp>,
    /// Visible changes to replay into an editor, in order.
    pub deltas: Vec<ContentDelta>,
}

#[derive(Debug, Clone)]
struct Element {
    id: OpId,
    ch: char,
    deleted: bool,
}

/// The replicated text buffer for one room.
///
/// Owned by exactly one session; all mutation goes through the session's
/// dispatcher, so no internal locking is needed here.
pub struct DocumentStore {
    doc_id: Uuid,
    local_peer: PeerId,
    clock: u64,
    elements: Vec<Element>,
    log: Vec<TextOp>,
    seen: HashSet<OpId>,
    version: VersionVector,
    /// Operations whose causal dependency has not arrived yet.
    pending: Vec<TextOp>,
}

/// Derive the stable document id for a room name.
pub fn doc_id_for_room(room_id: &str) -> Uuid {
    let digest = Sha256::digest(room_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

impl DocumentStore {
    pub fn new(doc_id: Uuid, local_peer: PeerId) -> Self {
        Self {
            doc_id,
            local_peer,
            clock: 0,
            elements: Vec::new(),
            log: Vec::new(),
            seen: HashSet::new(),
            version: VersionVector::default(),
            pending: Vec::new(),
        }
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Current Lamport clock value.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn version(&self) -> &VersionVector {
        &self.version
    }

    /// Visible content with tombstones excluded.
    pub fn snapshot(&self) -> String {
        self.elements
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.ch)
            .collect()
    }

    pub fn visible_len(&self) -> usize {
        self.elements.iter().filter(|e| !e.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.visible_len() == 0
    }

    /// Number of buffered operations waiting for a dependency.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations the holder of `remote` has not observed, in log order.
    pub fn diff_since(&self, remote: &VersionVector) -> Vec<TextOp> {
        self.log
            .iter()
            .filter(|op| !remote.contains(op.id()))
            .copied()
            .collect()
    }

    /// Integrate a local insert or delete.
    ///
    /// Positions are clamped to the visible content, so this never fails;
    /// an edit that clamps down to nothing produces an empty result.
    pub fn apply_local(&mut self, edit: Edit) -> AppliedEdit {
        match edit {
            Edit::Insert { pos, text } => self.local_insert(pos, &text),
            Edit::Delete { pos, len } => self.local_delete(pos, len),
        }
    }

    /// Bulk-import initial content as a single local insert at the head.
    pub fn import_initial(&mut self, text: &str) -> AppliedEdit {
        self.local_insert(0, text)
    }

    /// Integrate one remote operation.
    ///
    /// Idempotent: an already-seen id is a no-op. An operation whose
    /// dependency (insert origin or delete target) has not arrived is
    /// buffered and replayed once the dependency lands, so out-of-order
    /// delivery can never corrupt the sequence. Returns every visible
    /// change produced, including drained buffered operations.
    pub fn apply_remote(&mut self, op: TextOp) -> Vec<ContentDelta> {
        let mut deltas = Vec::new();
        if self.seen.contains(&op.id()) {
            return deltas;
        }
        if !self.dependency_ready(&op) {
            self.pending.push(op);
            return deltas;
        }
        if let Some(delta) = self.integrate(op) {
            deltas.push(delta);
        }
        self.drain_pending(&mut deltas);
        deltas
    }

    /// Build and integrate the inverse of previously applied local ops.
    ///
    /// Inverting an insert tombstones its element; inverting a delete
    /// re-inserts the character anchored directly after its tombstone.
    /// The result is a fresh batch of ordinary local operations, so undo
    /// propagates to peers exactly like typing does — and never touches
    /// elements another peer created.
    pub fn revert(&mut self, ops: &[TextOp]) -> AppliedEdit {
        let mut applied = AppliedEdit::default();
        for op in ops.iter().rev() {
            match *op {
                TextOp::Insert { id, .. } => {
                    let Some(idx) = self.index_of(id) else { continue };
                    if self.elements[idx].deleted {
                        continue; // already gone, nothing to revert
                    }
                    self.clock += 1;
                    let inverse = TextOp::Delete {
                        id: OpId::new(self.clock, self.local_peer),
                        target: id,
                    };
                    if let Some(delta) = self.integrate(inverse) {
                        applied.deltas.push(delta);
                    }
                    applied.ops.push(inverse);
                }
                TextOp::Delete { target, .. } => {
                    let Some(idx) = self.index_of(target) else {
                        continue;
                    };
                    if !self.elements[idx].deleted {
                        continue;
                    }
                    let ch = self.elements[idx].ch;
                    self.clock += 1;
                    let inverse = TextOp::Insert {
                        id: OpId::new(self.clock, self.local_peer),
                        origin: Some(target),
                        ch,
                    };
                    if let Some(delta) = self.integrate(inverse) {
                        applied.deltas.push(delta);
                    }
                    applied.ops.push(inverse);
                }
            }
        }
        applied
    }

    fn local_insert(&mut self, pos: usize, text: &str) -> AppliedEdit {
        let mut applied = AppliedEdit::default();
        if text.is_empty() {
            return applied;
        }
        let pos = pos.min(self.visible_len());
        let mut origin = if pos == 0 {
            None
        } else {
            self.visible_element(pos - 1).map(|e| e.id)
        };

        for ch in text.chars() {
            self.clock += 1;
            let op = TextOp::Insert {
                id: OpId::new(self.clock, self.local_peer),
                origin,
                ch,
            };
            self.integrate(op);
            applied.ops.push(op);
            origin = Some(op.id());
        }
        applied.deltas.push(ContentDelta {
            pos,
            removed: 0,
            inserted: text.to_string(),
        });
        applied
    }

    fn local_delete(&mut self, pos: usize, len: usize) -> AppliedEdit {
        let mut applied = AppliedEdit::default();
        let visible = self.visible_len();
        if pos >= visible || len == 0 {
            return applied;
        }
        let len = len.min(visible - pos);

        let targets: Vec<OpId> = self
            .elements
            .iter()
            .filter(|e| !e.deleted)
            .skip(pos)
            .take(len)
            .map(|e| e.id)
            .collect();

        for target in targets {
            self.clock += 1;
            let op = TextOp::Delete {
                id: OpId::new(self.clock, self.local_peer),
                target,
            };
            if let Some(delta) = self.integrate(op) {
                applied.deltas.push(delta);
            }
            applied.ops.push(op);
        }
        applied
    }

    fn dependency_ready(&self, op: &TextOp) -> bool {
        match op {
            TextOp::Insert { origin, .. } => match origin {
                None => true,
                Some(o) => self.index_of(*o).is_some(),
            },
            TextOp::Delete { target, .. } => self.index_of(*target).is_some(),
        }
    }

    fn drain_pending(&mut self, deltas: &mut Vec<ContentDelta>) {
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < self.pending.len() {
                let op = self.pending[i];
                if self.seen.contains(&op.id()) {
                    self.pending.swap_remove(i);
                    progressed = true;
                    continue;
                }
                if self.dependency_ready(&op) {
                    self.pending.swap_remove(i);
                    if let Some(delta) = self.integrate(op) {
                        deltas.push(delta);
                    }
                    progressed = true;
                    continue;
                }
                i += 1;
            }
            if !progressed {
                break;
            }
        }
    }

    /// Place one operation into the element sequence.
    ///
    /// Insert rule: start just after the origin, then skip every element
    /// whose id is greater than the new one. Because ids are Lamport
    /// clocks, everything inside a higher-priority sibling's subtree also
    /// carries a greater id, so the scan lands exactly past it.
    fn integrate(&mut self, op: TextOp) -> Option<ContentDelta> {
        let id = op.id();
        debug_assert!(!self.seen.contains(&id));
        if id.lamport > self.clock {
            self.clock = id.lamport;
        }
        self.seen.insert(id);
        self.version.observe(id);
        self.log.push(op);

        match op {
            TextOp::Insert { id, origin, ch } => {
                let start = match origin {
                    None => 0,
                    // dependency_ready guaranteed the origin exists
                    Some(o) => self.index_of(o)? + 1,
                };
                let mut idx = start;
                while idx < self.elements.len() && self.elements[idx].id > id {
                    idx += 1;
                }
                self.elements.insert(
                    idx,
                    Element {
                        id,
                        ch,
                        deleted: false,
                    },
                );
                Some(ContentDelta {
                    pos: self.visible_index(idx),
                    removed: 0,
                    inserted: ch.to_string(),
                })
            }
            TextOp::Delete { target, .. } => {
                let idx = self.index_of(target)?;
                if self.elements[idx].deleted {
                    return None; // concurrent delete of the same element
                }
                let pos = self.visible_index(idx);
                self.elements[idx].deleted = true;
                Some(ContentDelta {
                    pos,
                    removed: 1,
                    inserted: String::new(),
                })
            }
        }
    }

    fn index_of(&self, id: OpId) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    /// Visible characters preceding element index `idx`.
    fn visible_index(&self, idx: usize) -> usize {
        self.elements[..idx].iter().filter(|e| !e.deleted).count()
    }

    fn visible_element(&self, pos: usize) -> Option<&Element> {
        self.elements.iter().filter(|e| !e.deleted).nth(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_local_insert_and_snapshot() {
        let mut doc = store();
        let applied = doc.apply_local(Edit::Insert {
            pos: 0,
            text: "hello".into(),
        });
        assert_eq!(doc.snapshot(), "hello");
        assert_eq!(applied.ops.len(), 5);
        assert_eq!(
            applied.deltas,
            vec![ContentDelta {
                pos: 0,
                removed: 0,
                inserted: "hello".into()
            }]
        );

        doc.apply_local(Edit::Insert {
            pos: 5,
            text: " world".into(),
        });
        assert_eq!(doc.snapshot(), "hello world");

        doc.apply_local(Edit::Insert {
            pos: 5,
            text: ",".into(),
        });
        assert_eq!(doc.snapshot(), "hello, world");
    }

    #[test]
    fn test_local_delete() {
        let mut doc = store();
        doc.apply_local(Edit::Insert {
            pos: 0,
            text: "hello world".into(),
        });
        let applied = doc.apply_local(Edit::Delete { pos: 5, len: 6 });
        assert_eq!(doc.snapshot(), "hello");
        assert_eq!(applied.ops.len(), 6);
        // Every per-character delta lands at the same visible position
        assert!(applied
            .deltas
            .iter()
            .all(|d| d.pos == 5 && d.removed == 1 && d.inserted.is_empty()));
    }

    #[test]
    fn test_positions_are_clamped() {
        let mut doc = store();
        doc.apply_local(Edit::Insert {
            pos: 99,
            text: "abc".into(),
        });
        assert_eq!(doc.snapshot(), "abc");

        let applied = doc.apply_local(Edit::Delete { pos: 1, len: 99 });
        assert_eq!(doc.snapshot(), "a");
        assert_eq!(applied.ops.len(), 2);

        let empty = doc.apply_local(Edit::Delete { pos: 9, len: 1 });
        assert!(empty.ops.is_empty());
    }

    #[test]
    fn test_remote_ops_converge() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let from_a = a.apply_local(Edit::Insert {
            pos: 0,
            text: "abc".into(),
        });
        let from_b = b.apply_local(Edit::Insert {
            pos: 0,
            text: "xyz".into(),
        });

        for op in &from_b.ops {
            a.apply_remote(*op);
        }
        for op in &from_a.ops {
            b.apply_remote(*op);
        }

        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.snapshot().len(), 6);
    }

    #[test]
    fn test_concurrent_inserts_same_origin_deterministic() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut c = DocumentStore::new(doc_id, Uuid::new_v4());

        let from_a = a.apply_local(Edit::Insert {
            pos: 0,
            text: "A".into(),
        });
        let from_b = b.apply_local(Edit::Insert {
            pos: 0,
            text: "B".into(),
        });

        // c receives them in both orders
        for op in from_a.ops.iter().chain(&from_b.ops) {
            c.apply_remote(*op);
        }
        let mut d = DocumentStore::new(doc_id, Uuid::new_v4());
        for op in from_b.ops.iter().chain(&from_a.ops) {
            d.apply_remote(*op);
        }

        assert_eq!(c.snapshot(), d.snapshot());
    }

    #[test]
    fn test_idempotent_reapplication() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let applied = a.apply_local(Edit::Insert {
            pos: 0,
            text: "dup".into(),
        });
        for op in &applied.ops {
            b.apply_remote(*op);
        }
        let before = b.snapshot();
        for op in &applied.ops {
            let deltas = b.apply_remote(*op);
            assert!(deltas.is_empty());
        }
        assert_eq!(b.snapshot(), before);
        assert_eq!(b.snapshot(), "dup");
    }

    #[test]
    fn test_delete_before_insert_is_buffered() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let insert = a.apply_local(Edit::Insert {
            pos: 0,
            text: "x".into(),
        });
        let delete = a.apply_local(Edit::Delete { pos: 0, len: 1 });

        // delete arrives first
        let deltas = b.apply_remote(delete.ops[0]);
        assert!(deltas.is_empty());
        assert_eq!(b.pending_len(), 1);
        assert_eq!(b.snapshot(), "");

        // insert arrives; buffered delete drains in the same call
        b.apply_remote(insert.ops[0]);
        assert_eq!(b.pending_len(), 0);
        assert_eq!(b.snapshot(), "");
        assert_eq!(b.visible_len(), 0);
    }

    #[test]
    fn test_insert_before_origin_is_buffered() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let first = a.apply_local(Edit::Insert {
            pos: 0,
            text: "a".into(),
        });
        let second = a.apply_local(Edit::Insert {
            pos: 1,
            text: "b".into(),
        });

        b.apply_remote(second.ops[0]);
        assert_eq!(b.snapshot(), "");
        assert_eq!(b.pending_len(), 1);

        b.apply_remote(first.ops[0]);
        assert_eq!(b.snapshot(), "ab");
        assert_eq!(b.pending_len(), 0);
    }

    #[test]
    fn test_diff_since_catches_up() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        a.apply_local(Edit::Insert {
            pos: 0,
            text: "sync me".into(),
        });

        let diff = a.diff_since(b.version());
        assert_eq!(diff.len(), 7);
        for op in diff {
            b.apply_remote(op);
        }
        assert_eq!(b.snapshot(), "sync me");

        // no-op diff once caught up
        assert!(a.diff_since(b.version()).is_empty());
    }

    #[test]
    fn test_diff_since_is_incremental() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        a.apply_local(Edit::Insert {
            pos: 0,
            text: "one".into(),
        });
        for op in a.diff_since(b.version()) {
            b.apply_remote(op);
        }

        a.apply_local(Edit::Insert {
            pos: 3,
            text: " two".into(),
        });
        let diff = a.diff_since(b.version());
        assert_eq!(diff.len(), 4);
        for op in diff {
            b.apply_remote(op);
        }
        assert_eq!(b.snapshot(), "one two");
    }

    #[test]
    fn test_revert_insert() {
        let mut doc = store();
        doc.apply_local(Edit::Insert {
            pos: 0,
            text: "keep".into(),
        });
        let typed = doc.apply_local(Edit::Insert {
            pos: 4,
            text: "!!".into(),
        });

        let undo = doc.revert(&typed.ops);
        assert_eq!(doc.snapshot(), "keep");
        assert_eq!(undo.ops.len(), 2);

        // redo: revert the revert
        doc.revert(&undo.ops);
        assert_eq!(doc.snapshot(), "keep!!");
    }

    #[test]
    fn test_revert_delete() {
        let mut doc = store();
        doc.apply_local(Edit::Insert {
            pos: 0,
            text: "abcdef".into(),
        });
        let removed = doc.apply_local(Edit::Delete { pos: 1, len: 3 });
        assert_eq!(doc.snapshot(), "aef");

        doc.revert(&removed.ops);
        assert_eq!(doc.snapshot(), "abcdef");
    }

    #[test]
    fn test_revert_skips_remotely_deleted_elements() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let typed = a.apply_local(Edit::Insert {
            pos: 0,
            text: "x".into(),
        });
        for op in &typed.ops {
            b.apply_remote(*op);
        }
        let remote_delete = b.apply_local(Edit::Delete { pos: 0, len: 1 });
        for op in &remote_delete.ops {
            a.apply_remote(*op);
        }

        // the element is already tombstoned; undo has nothing to do
        let undo = a.revert(&typed.ops);
        assert!(undo.ops.is_empty());
        assert_eq!(a.snapshot(), "");
    }

    #[test]
    fn test_lamport_clock_advances_past_remote() {
        let doc_id = Uuid::new_v4();
        let mut a = DocumentStore::new(doc_id, Uuid::new_v4());
        let mut b = DocumentStore::new(doc_id, Uuid::new_v4());

        let burst = a.apply_local(Edit::Insert {
            pos: 0,
            text: "abcdefgh".into(),
        });
        for op in &burst.ops {
            b.apply_remote(*op);
        }
        assert!(b.clock() >= 8);

        // b's next local op must order after everything it has seen
        let next = b.apply_local(Edit::Insert {
            pos: 8,
            text: "!".into(),
        });
        assert!(next.ops[0].id().lamport > 8);
    }

    #[test]
    fn test_version_vector_contains() {
        let peer = Uuid::new_v4();
        let mut vv = VersionVector::default();
        assert!(!vv.contains(OpId::new(1, peer)));
        vv.observe(OpId::new(3, peer));
        assert!(vv.contains(OpId::new(2, peer)));
        assert!(vv.contains(OpId::new(3, peer)));
        assert!(!vv.contains(OpId::new(4, peer)));
        assert!(!vv.contains(OpId::new(1, Uuid::new_v4())));
    }

    #[test]
    fn test_doc_id_for_room_is_stable() {
        assert_eq!(doc_id_for_room("standup"), doc_id_for_room("standup"));
        assert_ne!(doc_id_for_room("standup"), doc_id_for_room("retro"));
    }

    #[test]
    fn test_import_initial() {
        let mut doc = store();
        let applied = doc.import_initial("seed text");
        assert_eq!(doc.snapshot(), "seed text");
        assert_eq!(applied.ops.len(), 9);
    }

    #[test]
    fn test_tombstones_are_not_physically_removed() {
        let mut doc = store();
        doc.apply_local(Edit::Insert {
            pos: 0,
            text: "abc".into(),
        });
        doc.apply_local(Edit::Delete { pos: 0, len: 3 });
        assert_eq!(doc.snapshot(), "");
        assert_eq!(doc.visible_len(), 0);
        // elements survive as tombstones for merge stability
        assert_eq!(doc.elements.len(), 3);
    }
}
