//! Event handler templates.
//!
//! A handler is never executed in place: triggering constructs a fresh
//! sequencer over the template's (shared) opcode list.  Deactivation
//! tombstones the entry; tombstones are swept by a periodic cleanup so
//! ids handed out earlier stay stable within a tick.

use std::sync::Arc;

use super::opcode::Opcode;
use super::timing::TimingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Periodic, spawned at registration and looping at completion.
    Time,
    /// Like `Time`, but stepped by the MIDI clock.
    MidiTime,
    /// MIDI playback finished.
    MidiEnd,
    /// Right mouse button down.
    RbDown,
    /// Right double-click.
    RbDblClk,
    /// Left mouse button down.
    LbDown,
    /// Left double-click.
    LbDblClk,
    /// Key press.
    KeyDown,
    /// User-raised by integer id.
    User,
}

impl EventKind {
    /// TIME-family handlers spawn immediately and rewind at completion.
    pub fn is_looping(self) -> bool {
        matches!(self, EventKind::Time | EventKind::MidiTime)
    }
}

pub struct EventHandler {
    pub id: i64,
    pub kind: EventKind,
    pub ops: Arc<[Opcode]>,
    pub mode: TimingMode,
    pub parent: Option<i64>,
    /// Matched against `trigger_event` for `User` events only.
    pub user_id: i64,
    pub active: bool,
}

pub struct HandlerRegistry {
    handlers: Vec<EventHandler>,
    next_id: i64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn register(
        &mut self,
        kind: EventKind,
        ops: Arc<[Opcode]>,
        mode: TimingMode,
        parent: Option<i64>,
        user_id: i64,
    ) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push(EventHandler {
            id,
            kind,
            ops,
            mode,
            parent,
            user_id,
            active: true,
        });
        id
    }

    /// Tombstone a template.  Best effort: unknown ids are ignored.
    pub fn deactivate(&mut self, id: i64) {
        if let Some(h) = self.handlers.iter_mut().find(|h| h.id == id) {
            h.active = false;
        }
    }

    /// Active templates matching `kind` (and `user_id` for USER events).
    pub fn matching(&self, kind: EventKind, user_id: i64) -> Vec<&EventHandler> {
        self.handlers
            .iter()
            .filter(|h| h.active && h.kind == kind)
            .filter(|h| kind != EventKind::User || h.user_id == user_id)
            .collect()
    }

    pub fn any_active(&self) -> bool {
        self.handlers.iter().any(|h| h.active)
    }

    /// Sweep tombstoned entries.
    pub fn cleanup(&mut self) {
        self.handlers.retain(|h| h.active);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
