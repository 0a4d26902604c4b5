//! The per-tick VM driver.
//!
//! One pass steps every active sequencer in registration order: waiting
//! sequencers burn a tick, everything else executes at most one
//! top-level opcode.  Side effects are visible to later sequencers
//! within the same pass.  Cleanup of inactive sequencers is delayed to
//! the end of the tick so same-tick lookups still see them.

use super::eval::{self, Flow, ResumeState};
use crate::engine::EngineState;

/// Result of stepping a single sequencer once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Executed one opcode; more remain.
    Stepped,
    /// Executed an opcode that set a wait.
    Yielded,
    /// The program counter reached the end of the command list.
    Complete,
    /// Nothing to do (missing or deactivated).
    Inactive,
}

/// Execute the current opcode of `id`.  Wait handling is the caller's
/// job; this only steps.
pub fn step_once(state: &mut EngineState, id: i64) -> StepOutcome {
    let Some(s) = state.seqs.get_mut(id) else {
        return StepOutcome::Inactive;
    };
    if !s.active {
        return StepOutcome::Inactive;
    }
    if s.is_complete() {
        return StepOutcome::Complete;
    }

    let cmds = s.commands.clone();
    let pc = s.pc;
    let mut rs = ResumeState::resume(std::mem::take(&mut s.resume));
    let flow = eval::eval(state, id, &cmds[pc], &mut rs);

    let Some(s) = state.seqs.get_mut(id) else {
        return StepOutcome::Inactive;
    };
    s.has_run = true;
    let yielded = matches!(flow, Flow::Yield);
    if yielded && !rs.saved.is_empty() {
        // Suspended inside a composite: stay on this opcode and keep
        // the path, root-first.
        rs.saved.reverse();
        s.resume = rs.saved;
    } else {
        // Completed the opcode (a bare wait included): move on.
        s.resume.clear();
        s.increment_pc();
    }

    if !s.active {
        StepOutcome::Inactive
    } else if yielded {
        StepOutcome::Yielded
    } else if s.is_complete() {
        StepOutcome::Complete
    } else {
        StepOutcome::Stepped
    }
}

/// One scheduler pass over the active list.  With `bootstrap`, only
/// sequencers that have never executed get their first opcode (the
/// MIDI_TIME rule that lets a leading `play_midi` start the clock).
pub fn pass(state: &mut EngineState, bootstrap: bool) {
    // Snapshot: sequencers spawned during the pass start next tick.
    let ids = state.seqs.active_ids();
    for id in ids {
        let Some(s) = state.seqs.get_mut(id) else {
            continue;
        };
        if !s.active || (bootstrap && s.has_run) {
            continue;
        }

        if s.wait_ticks > 0 {
            s.decrement_wait();
            if s.wait_ticks > 0 {
                continue;
            }
            // The wait just drained; the sequencer runs this tick.
        }

        if s.is_complete() {
            finish(state, id);
            continue;
        }

        if let StepOutcome::Complete = step_once(state, id) {
            finish(state, id);
        }
    }
}

/// Completion: looping handlers rewind, everything else deactivates and
/// fires its callback.
fn finish(state: &mut EngineState, id: i64) {
    let Some(s) = state.seqs.get_mut(id) else {
        return;
    };
    if s.looping {
        s.pc = 0;
        s.resume.clear();
    } else {
        s.deactivate();
        if let Some(f) = s.on_complete.take() {
            f();
        }
    }
}

/// Drain a sequencer to completion synchronously, ignoring waits.  Used
/// for user-function bodies and `execute_top_level`.
pub fn drain(state: &mut EngineState, id: i64) {
    const DRAIN_FUEL: u32 = 1_000_000;
    for _ in 0..DRAIN_FUEL {
        match step_once(state, id) {
            StepOutcome::Stepped | StepOutcome::Yielded => {
                if let Some(s) = state.seqs.get_mut(id) {
                    if s.wait_ticks > 0 {
                        log::debug!("sequence {id}: wait skipped in synchronous execution");
                        s.wait_ticks = 0;
                    }
                }
            }
            StepOutcome::Complete | StepOutcome::Inactive => return,
        }
    }
    log::error!("vm error: synchronous sequence {id} did not complete, deactivating");
    if let Some(s) = state.seqs.get_mut(id) {
        s.deactivate();
    }
}
