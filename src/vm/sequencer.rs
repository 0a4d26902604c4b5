//! Per-script execution state and the arena that owns it.
//!
//! Parent scopes are plain sequencer ids looked up in the table — an
//! upward chain, never cyclic, never an owning handle.

use std::collections::HashMap;
use std::sync::Arc;

use super::eval::Frame;
use super::opcode::Opcode;
use super::timing::TimingMode;
use super::value::Value;

pub type OnComplete = Box<dyn FnOnce() + Send>;

pub struct Sequencer {
    pub id: i64,
    /// Bulk-deactivation group (`del_us`).
    pub group: i64,
    pub mode: TimingMode,
    pub commands: Arc<[Opcode]>,
    pub pc: usize,
    /// Ticks remaining before the next step may execute.
    pub wait_ticks: u64,
    pub ticks_per_step: u64,
    /// Variable map, keyed by lowercase name.
    vars: HashMap<String, Value>,
    /// Lexical parent for scope-chain lookup.
    pub parent: Option<i64>,
    pub active: bool,
    /// Persistent handlers rewind to pc 0 at completion instead of dying.
    pub looping: bool,
    /// Set once the first opcode has executed (MIDI bootstrap rule).
    pub has_run: bool,
    /// Saved suspension path for composite opcodes holding a wait.
    pub resume: Vec<Frame>,
    pub on_complete: Option<OnComplete>,
}

impl Sequencer {
    pub fn new(id: i64, group: i64, commands: Arc<[Opcode]>, mode: TimingMode) -> Self {
        Self {
            id,
            group,
            mode,
            commands,
            pc: 0,
            wait_ticks: 0,
            ticks_per_step: mode.default_ticks_per_step(),
            vars: HashMap::new(),
            parent: None,
            active: true,
            looping: false,
            has_run: false,
            resume: Vec::new(),
            on_complete: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_complete(&self) -> bool {
        self.pc >= self.commands.len()
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_ticks > 0
    }

    pub fn current_command(&self) -> Option<&Opcode> {
        self.commands.get(self.pc)
    }

    pub fn increment_pc(&mut self) {
        self.pc += 1;
    }

    pub fn decrement_wait(&mut self) {
        if self.wait_ticks > 0 {
            self.wait_ticks -= 1;
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn set_on_complete(&mut self, f: OnComplete) {
        self.on_complete = Some(f);
    }

    /// Local (single-scope) variable read.
    pub fn local_var(&self, name_lower: &str) -> Option<&Value> {
        self.vars.get(name_lower)
    }

    pub fn has_var(&self, name_lower: &str) -> bool {
        self.vars.contains_key(name_lower)
    }

    pub fn insert_var(&mut self, name: &str, v: Value) {
        self.vars.insert(name.to_lowercase(), v);
    }
}

// ── Sequencer arena ────────────────────────────────────────────

/// Ordered sequencer table.  Iteration order is registration order;
/// lookup is linear (the language never has more than a handful of
/// concurrent scripts).
pub struct SequencerTable {
    seqs: Vec<Sequencer>,
    next_id: i64,
    next_group: i64,
}

impl SequencerTable {
    pub fn new() -> Self {
        Self {
            seqs: Vec::new(),
            next_id: 1,
            next_group: 1,
        }
    }

    pub fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn alloc_group(&mut self) -> i64 {
        let g = self.next_group;
        self.next_group += 1;
        g
    }

    pub fn push(&mut self, seq: Sequencer) {
        self.seqs.push(seq);
    }

    pub fn get(&self, id: i64) -> Option<&Sequencer> {
        self.seqs.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Sequencer> {
        self.seqs.iter_mut().find(|s| s.id == id)
    }

    /// Ids of currently active sequencers, registration order.
    pub fn active_ids(&self) -> Vec<i64> {
        self.seqs
            .iter()
            .filter(|s| s.active)
            .map(|s| s.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequencer> {
        self.seqs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sequencer> {
        self.seqs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Drop inactive sequencers.  Called at the end of a tick, never
    /// during one: a sequencer deactivated mid-tick must stay visible to
    /// later lookups in the same tick.
    pub fn cleanup(&mut self) {
        self.seqs.retain(|s| s.active);
    }

    pub fn remove(&mut self, id: i64) {
        self.seqs.retain(|s| s.id != id);
    }

    // ── Variables ──────────────────────────────────────────────

    /// Case-insensitive lookup walking the scope chain.  Unset variables
    /// read as integer 0 (legacy behavior — not an error).
    pub fn get_var(&self, id: i64, name: &str) -> Value {
        let key = name.to_lowercase();
        let mut cur = Some(id);
        while let Some(sid) = cur {
            match self.get(sid) {
                Some(seq) => {
                    if let Some(v) = seq.local_var(&key) {
                        return v.clone();
                    }
                    cur = seq.parent;
                }
                None => break,
            }
        }
        Value::Int(0)
    }

    /// Store into the nearest scope containing `name`, else the current
    /// sequencer's scope.
    pub fn set_var(&mut self, id: i64, name: &str, v: Value) {
        let key = name.to_lowercase();
        let mut target = None;
        let mut cur = Some(id);
        while let Some(sid) = cur {
            let Some(seq) = self.get(sid) else { break };
            if seq.has_var(&key) {
                target = Some(sid);
                break;
            }
            cur = seq.parent;
        }
        if let Some(seq) = self.get_mut(target.unwrap_or(id)) {
            seq.insert_var(&key, v);
        }
    }
}

impl Default for SequencerTable {
    fn default() -> Self {
        Self::new()
    }
}
