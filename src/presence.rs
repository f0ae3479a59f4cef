//! Presence channel: ephemeral per-peer metadata, separate from content.
//!
//! Each peer broadcasts its whole record (name, color, cursor) whenever it
//! changes; receivers replace wholesale, never field-merge. Nothing here is
//! authoritative or persistent — the channel is cleared on session teardown
//! and identities are regenerated on every join by design.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RGBA color used to render a peer's cursor and selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl PeerColor {
    /// Generate a stable, visually distinct color from a peer id.
    ///
    /// Hue comes from the uuid, saturation/lightness are fixed high so
    /// cursors stay vivid against most themes.
    pub fn from_uuid(id: Uuid) -> Self {
        let hue = ((id.as_u128() % 360) as f32) / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// A cursor or selection as character offsets into the visible document.
/// `anchor == head` is a plain caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub anchor: usize,
    pub head: usize,
}

impl CursorRange {
    pub fn caret(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn is_caret(&self) -> bool {
        self.anchor == self.head
    }
}

/// One peer's ephemeral presence, sent whole on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub peer_id: Uuid,
    pub display_name: String,
    pub color: PeerColor,
    pub cursor: Option<CursorRange>,
}

impl PresenceRecord {
    /// Generate the default ephemeral identity for a fresh session.
    pub fn generated(peer_id: Uuid) -> Self {
        let short = &peer_id.simple().to_string()[..4];
        Self {
            peer_id,
            display_name: format!("Anonymous-{short}"),
            color: PeerColor::from_uuid(peer_id),
            cursor: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Tracks the local record and every remote peer's latest record.
///
/// Mutated only by the owning session (and its dispatcher); no locking here.
pub struct PresenceChannel {
    local: PresenceRecord,
    remote: HashMap<Uuid, PresenceRecord>,
    /// None until the first broadcast, which is never throttled.
    last_cursor_broadcast: Option<Instant>,
    cursor_interval: Duration,
}

impl PresenceChannel {
    pub fn new(local: PresenceRecord) -> Self {
        Self {
            local,
            remote: HashMap::new(),
            last_cursor_broadcast: None,
            cursor_interval: Duration::from_millis(33),
        }
    }

    /// Custom cursor throttle interval (tests use zero).
    pub fn with_interval(local: PresenceRecord, interval: Duration) -> Self {
        let mut channel = Self::new(local);
        channel.cursor_interval = interval;
        channel
    }

    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    /// Replace the local record outright. Always broadcastable.
    pub fn set_local(&mut self, record: PresenceRecord) -> PresenceRecord {
        self.local = record;
        self.local.clone()
    }

    /// Update the local cursor. Returns the record to broadcast, or `None`
    /// when throttled — cursor updates are rate-limited to ~30 fps while
    /// name/color changes always go out.
    pub fn set_local_cursor(&mut self, cursor: Option<CursorRange>) -> Option<PresenceRecord> {
        self.local.cursor = cursor;
        if let Some(last) = self.last_cursor_broadcast {
            if last.elapsed() < self.cursor_interval {
                return None;
            }
        }
        self.last_cursor_broadcast = Some(Instant::now());
        Some(self.local.clone())
    }

    /// The record to announce when (re)joining a room.
    pub fn announce(&self) -> PresenceRecord {
        self.local.clone()
    }

    /// Upsert a remote record wholesale. The local peer's own echoes are
    /// ignored.
    pub fn apply_remote(&mut self, record: PresenceRecord) {
        if record.peer_id == self.local.peer_id {
            return;
        }
        self.remote.insert(record.peer_id, record);
    }

    /// Drop a peer's record when the transport reports disconnection.
    pub fn remove_peer(&mut self, peer_id: Uuid) -> Option<PresenceRecord> {
        self.remote.remove(&peer_id)
    }

    pub fn get(&self, peer_id: Uuid) -> Option<&PresenceRecord> {
        self.remote.get(&peer_id)
    }

    /// All remote records, unordered.
    pub fn records(&self) -> Vec<PresenceRecord> {
        self.remote.values().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.remote.len()
    }

    /// Forget every remote peer. Called on session teardown.
    pub fn clear(&mut self) {
        self.remote.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_record() {
        let peer = Uuid::new_v4();
        let record = PresenceRecord::generated(peer);
        assert_eq!(record.peer_id, peer);
        assert!(record.display_name.starts_with("Anonymous-"));
        assert!(record.cursor.is_none());
    }

    #[test]
    fn test_color_stable_from_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(PeerColor::from_uuid(id), PeerColor::from_uuid(id));
    }

    #[test]
    fn test_remote_upsert_is_wholesale() {
        let local = PresenceRecord::generated(Uuid::new_v4());
        let mut channel = PresenceChannel::new(local);

        let peer = Uuid::new_v4();
        let mut record = PresenceRecord::generated(peer);
        record.cursor = Some(CursorRange::caret(3));
        channel.apply_remote(record.clone());
        assert_eq!(channel.get(peer).unwrap().cursor, Some(CursorRange::caret(3)));

        // a record without a cursor replaces the whole thing
        let replacement = PresenceRecord::generated(peer).with_name("Renamed");
        channel.apply_remote(replacement);
        let stored = channel.get(peer).unwrap();
        assert_eq!(stored.display_name, "Renamed");
        assert!(stored.cursor.is_none());
    }

    #[test]
    fn test_own_echo_ignored() {
        let local_id = Uuid::new_v4();
        let mut channel = PresenceChannel::new(PresenceRecord::generated(local_id));
        channel.apply_remote(PresenceRecord::generated(local_id));
        assert_eq!(channel.peer_count(), 0);
    }

    #[test]
    fn test_remove_peer() {
        let mut channel = PresenceChannel::new(PresenceRecord::generated(Uuid::new_v4()));
        let peer = Uuid::new_v4();
        channel.apply_remote(PresenceRecord::generated(peer));
        assert_eq!(channel.peer_count(), 1);

        assert!(channel.remove_peer(peer).is_some());
        assert_eq!(channel.peer_count(), 0);
        assert!(channel.remove_peer(peer).is_none());
    }

    #[test]
    fn test_cursor_throttling() {
        let local = PresenceRecord::generated(Uuid::new_v4());
        let mut channel =
            PresenceChannel::with_interval(local, Duration::from_secs(60));

        // first update passes, second is throttled
        assert!(channel.set_local_cursor(Some(CursorRange::caret(1))).is_some());
        assert!(channel.set_local_cursor(Some(CursorRange::caret(2))).is_none());
        // the local record still tracked the throttled update
        assert_eq!(channel.local().cursor, Some(CursorRange::caret(2)));
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let local = PresenceRecord::generated(Uuid::new_v4());
        let mut channel = PresenceChannel::with_interval(local, Duration::ZERO);
        for i in 0..10 {
            assert!(channel.set_local_cursor(Some(CursorRange::caret(i))).is_some());
        }
    }

    #[test]
    fn test_clear() {
        let mut channel = PresenceChannel::new(PresenceRecord::generated(Uuid::new_v4()));
        channel.apply_remote(PresenceRecord::generated(Uuid::new_v4()));
        channel.apply_remote(PresenceRecord::generated(Uuid::new_v4()));
        assert_eq!(channel.peer_count(), 2);
        channel.clear();
        assert_eq!(channel.peer_count(), 0);
    }
}
