//! The tree-walking opcode evaluator.
//!
//! Evaluation of one top-level opcode returns a control-flow signal.
//! `Yield` means a wait was set and the scheduler must stop stepping the
//! sequencer this tick.  A wait inside a composite opcode (loop body,
//! branch, step block) suspends it mid-flight: the path down to the
//! suspension point is saved as a stack of [`Frame`]s on the sequencer,
//! and the next eligible tick replays that path to resume inside the
//! composite.  A bare top-level wait saves nothing — the program counter
//! simply advances past it.

use std::sync::Arc;

use super::opcode::{BinOp, Opcode, UnOp};
use super::scheduler;
use super::sequencer::Sequencer;
use super::value::{self, Value};
use super::{builtins, timing::TimingMode};
use crate::engine::EngineState;
use crate::error::EngineError;

/// Iteration bound for loops that never yield; a script spinning inside
/// one tick is broken and gets cut off instead of hanging the host.
const LOOP_FUEL: u32 = 1_000_000;

/// Control-flow signal of one opcode evaluation.
pub enum Flow {
    Done(Value),
    /// A wait was set; stop stepping this sequencer for the tick.
    Yield,
    Break,
    Continue,
}

/// One level of a saved suspension path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Position inside an opcode list: the next child to run.
    Block { index: usize },
    /// Chosen branch of an `If` (0/1) or `Switch` (case index,
    /// `usize::MAX` = default).
    Branch { arm: usize },
    /// Suspended inside a `For`/`While`/`DoWhile` body.
    Loop,
    /// Suspended inside a `Step` body with this many iterations left.
    Step { remaining: i64 },
}

/// Resume bookkeeping for one top-level evaluation: the previous
/// suspension path is consumed on the way down, a new one is collected
/// on the way back up.
pub struct ResumeState {
    path: Vec<Frame>,
    depth: usize,
    /// Collected leaf-first while a yield unwinds; reversed into
    /// root-first order by the scheduler.
    pub saved: Vec<Frame>,
    fuel: u32,
}

impl ResumeState {
    pub fn fresh() -> Self {
        Self::resume(Vec::new())
    }

    pub fn resume(path: Vec<Frame>) -> Self {
        Self {
            path,
            depth: 0,
            saved: Vec::new(),
            fuel: LOOP_FUEL,
        }
    }

    /// Next frame of the resumed path, if any remains.
    fn enter(&mut self) -> Option<Frame> {
        let f = self.path.get(self.depth).cloned();
        if f.is_some() {
            self.depth += 1;
        }
        f
    }

    fn suspend(&mut self, f: Frame) {
        self.saved.push(f);
    }

    /// One loop iteration of budget.  False once the fuel runs out.
    fn burn(&mut self) -> bool {
        if self.fuel == 0 {
            return false;
        }
        self.fuel -= 1;
        true
    }
}

// ── Entry points ───────────────────────────────────────────────

/// Evaluate an opcode in expression position.  Expressions cannot
/// suspend; stray flow signals collapse to 0.
pub fn eval_expr(state: &mut EngineState, seq: i64, op: &Opcode) -> Value {
    match eval(state, seq, op, &mut ResumeState::fresh()) {
        Flow::Done(v) => v,
        _ => Value::Int(0),
    }
}

/// Evaluate one opcode for `seq`.
pub fn eval(state: &mut EngineState, seq: i64, op: &Opcode, rs: &mut ResumeState) -> Flow {
    match op {
        // ── Values ─────────────────────────────────────────────
        Opcode::Literal(v) => Flow::Done(v.clone()),
        Opcode::Variable(name) => Flow::Done(state.seqs.get_var(seq, name)),

        // ── Assignment ─────────────────────────────────────────
        Opcode::Assign { name, rhs } => {
            let v = eval_expr(state, seq, rhs);
            state.seqs.set_var(seq, name, v.clone());
            Flow::Done(v)
        }

        // ── Expressions ────────────────────────────────────────
        Opcode::Infix { op, left, right } => Flow::Done(eval_infix(state, seq, *op, left, right)),
        Opcode::Prefix { op, operand } => {
            let v = eval_expr(state, seq, operand);
            Flow::Done(match op {
                UnOp::Not => Value::Bool(!v.truthy()),
                UnOp::Neg => match v {
                    Value::Float(f) => Value::Float(-f),
                    other => Value::Int(other.as_int().wrapping_neg()),
                },
            })
        }
        Opcode::Index { array, index } => {
            let arr = eval_expr(state, seq, array);
            let i = eval_expr(state, seq, index).as_int();
            match arr {
                Value::IntList(list) => {
                    if i < 0 || i as usize >= list.len() {
                        EngineError::InvalidArgument {
                            op: "index",
                            detail: format!("{i} outside 0..{}", list.len()),
                        }
                        .report();
                        Flow::Done(Value::Int(0))
                    } else {
                        Flow::Done(Value::Int(list[i as usize]))
                    }
                }
                _ => {
                    EngineError::VmError {
                        detail: "indexing a non-array value".into(),
                    }
                    .report();
                    Flow::Done(Value::Int(0))
                }
            }
        }
        Opcode::Call { name, args } => eval_call(state, seq, name, args),

        // ── Control flow ───────────────────────────────────────
        Opcode::If {
            cond,
            then_ops,
            else_ops,
        } => {
            let arm = match rs.enter() {
                Some(Frame::Branch { arm }) => arm,
                _ => {
                    if eval_expr(state, seq, cond).truthy() {
                        0
                    } else {
                        1
                    }
                }
            };
            let ops = if arm == 0 { then_ops } else { else_ops };
            match run_block(state, seq, ops, rs) {
                Flow::Yield => {
                    rs.suspend(Frame::Branch { arm });
                    Flow::Yield
                }
                other => other,
            }
        }

        Opcode::While { cond, body } => {
            if matches!(rs.enter(), Some(Frame::Loop)) {
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Loop);
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
            }
            loop {
                if !rs.burn() {
                    return loop_fuel_exhausted(seq);
                }
                if !eval_expr(state, seq, cond).truthy() {
                    return Flow::Done(Value::None);
                }
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Loop);
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
            }
        }

        Opcode::DoWhile { cond, body } => {
            // Consume a pending Loop frame; the body runs first either way.
            let _ = matches!(rs.enter(), Some(Frame::Loop));
            loop {
                if !rs.burn() {
                    return loop_fuel_exhausted(seq);
                }
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Loop);
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
                if !eval_expr(state, seq, cond).truthy() {
                    return Flow::Done(Value::None);
                }
            }
        }

        Opcode::For {
            init,
            cond,
            post,
            body,
        } => {
            let resumed = matches!(rs.enter(), Some(Frame::Loop));
            if !resumed {
                let _ = eval_expr(state, seq, init);
            } else {
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Loop);
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
                let _ = eval_expr(state, seq, post);
            }
            loop {
                if !rs.burn() {
                    return loop_fuel_exhausted(seq);
                }
                if !eval_expr(state, seq, cond).truthy() {
                    return Flow::Done(Value::None);
                }
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Loop);
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
                let _ = eval_expr(state, seq, post);
            }
        }

        Opcode::Switch {
            value,
            cases,
            default,
        } => {
            let arm = match rs.enter() {
                Some(Frame::Branch { arm }) => arm,
                _ => {
                    let v = eval_expr(state, seq, value);
                    cases
                        .iter()
                        .position(|(test, _)| {
                            let t = eval_expr(state, seq, test);
                            value::equals(&t, &v)
                        })
                        .unwrap_or(usize::MAX)
                }
            };
            let ops = if arm == usize::MAX {
                default
            } else {
                &cases[arm].1
            };
            match run_block(state, seq, ops, rs) {
                Flow::Yield => {
                    rs.suspend(Frame::Branch { arm });
                    Flow::Yield
                }
                other => other,
            }
        }

        Opcode::Break => Flow::Break,
        Opcode::Continue => Flow::Continue,

        // ── Scheduler primitives ───────────────────────────────
        Opcode::Wait(n) => {
            let n = eval_expr(state, seq, n).as_int().max(0) as u64;
            if let Some(s) = state.seqs.get_mut(seq) {
                s.wait_ticks = n * s.ticks_per_step;
            }
            Flow::Yield
        }

        Opcode::SetStep(n) => {
            let n = eval_expr(state, seq, n).as_int();
            if let Some(s) = state.seqs.get_mut(seq) {
                s.ticks_per_step = s.mode.ticks_per_step(n);
            }
            Flow::Done(Value::None)
        }

        Opcode::Step { count, body } => {
            let (mut remaining, resumed) = match rs.enter() {
                Some(Frame::Step { remaining }) => (remaining, true),
                _ => (eval_expr(state, seq, count).as_int(), false),
            };
            if resumed {
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Step { remaining });
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
                remaining -= 1;
            }
            while remaining > 0 {
                if !rs.burn() {
                    return loop_fuel_exhausted(seq);
                }
                match run_block(state, seq, body, rs) {
                    Flow::Yield => {
                        rs.suspend(Frame::Step { remaining });
                        return Flow::Yield;
                    }
                    Flow::Break => return Flow::Done(Value::None),
                    _ => {}
                }
                remaining -= 1;
            }
            Flow::Done(Value::None)
        }

        Opcode::RegisterSequence { mode, body } => {
            let (group, parent) = match state.seqs.get(seq) {
                Some(s) => (Some(s.group), Some(seq)),
                None => (None, None),
            };
            let id = state.spawn(body.clone(), *mode, parent, group, false);
            Flow::Done(Value::Int(id))
        }

        Opcode::DefineFunc { name, params, body } => {
            state.funcs.insert(
                fold_name(name),
                UserFunc {
                    params: params.clone(),
                    body: body.clone(),
                },
            );
            Flow::Done(Value::None)
        }

        Opcode::DeleteMe => {
            if let Some(s) = state.seqs.get_mut(seq) {
                s.deactivate();
            }
            Flow::Yield
        }

        Opcode::DeleteUs => {
            delete_group(state, seq);
            Flow::Yield
        }

        Opcode::DeleteAll => {
            for s in state.seqs.iter_mut() {
                s.deactivate();
            }
            Flow::Yield
        }
    }
}

// ── Blocks ─────────────────────────────────────────────────────

/// Run an opcode list sequentially, resuming mid-list when a suspension
/// path points into it.  On yield, the position to resume at is the
/// suspended child itself when it carries deeper frames, or the child
/// after a bare wait.
fn run_block(state: &mut EngineState, seq: i64, ops: &[Opcode], rs: &mut ResumeState) -> Flow {
    let start = match rs.enter() {
        Some(Frame::Block { index }) => index.min(ops.len()),
        _ => 0,
    };
    let mut i = start;
    while i < ops.len() {
        let saved_before = rs.saved.len();
        match eval(state, seq, &ops[i], rs) {
            Flow::Yield => {
                let resume_at = if rs.saved.len() > saved_before { i } else { i + 1 };
                rs.suspend(Frame::Block { index: resume_at });
                return Flow::Yield;
            }
            Flow::Break => return Flow::Break,
            Flow::Continue => return Flow::Continue,
            Flow::Done(_) => {}
        }
        i += 1;
    }
    Flow::Done(Value::None)
}

fn loop_fuel_exhausted(seq: i64) -> Flow {
    EngineError::VmError {
        detail: format!("sequence {seq}: loop exceeded {LOOP_FUEL} iterations in one tick"),
    }
    .report();
    Flow::Break
}

// ── Operators ──────────────────────────────────────────────────

fn eval_infix(state: &mut EngineState, seq: i64, op: BinOp, left: &Opcode, right: &Opcode) -> Value {
    // Short-circuit forms first.
    match op {
        BinOp::And => {
            let l = eval_expr(state, seq, left);
            if !l.truthy() {
                return Value::Bool(false);
            }
            return Value::Bool(eval_expr(state, seq, right).truthy());
        }
        BinOp::Or => {
            let l = eval_expr(state, seq, left);
            if l.truthy() {
                return Value::Bool(true);
            }
            return Value::Bool(eval_expr(state, seq, right).truthy());
        }
        _ => {}
    }

    let l = eval_expr(state, seq, left);
    let r = eval_expr(state, seq, right);
    let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let coercible = match op {
        BinOp::Add => {
            (numeric(&l) && numeric(&r)) || matches!((&l, &r), (Value::Str(_), Value::Str(_)))
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => numeric(&l) && numeric(&r),
        _ => true,
    };
    if !coercible {
        EngineError::VmError {
            detail: format!("cannot apply {op:?} to {l:?} and {r:?}"),
        }
        .report();
        return Value::Int(0);
    }
    match op {
        BinOp::Add => value::add(&l, &r),
        BinOp::Sub => value::sub(&l, &r),
        BinOp::Mul => value::mul(&l, &r),
        BinOp::Div => value::div(&l, &r),
        BinOp::Rem => value::rem(&l, &r),
        BinOp::Eq => Value::Bool(value::equals(&l, &r)),
        BinOp::Ne => Value::Bool(!value::equals(&l, &r)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => match value::compare(&l, &r) {
            Some(ord) => Value::Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Gt => ord.is_gt(),
                BinOp::Le => ord.is_le(),
                _ => ord.is_ge(),
            }),
            None => {
                EngineError::VmError {
                    detail: format!("incomparable operands {l:?} and {r:?}"),
                }
                .report();
                Value::Int(0)
            }
        },
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

// ── Calls ──────────────────────────────────────────────────────

/// A user-defined function: parameter names plus a shared body.
#[derive(Clone)]
pub struct UserFunc {
    pub params: Vec<String>,
    pub body: Arc<[Opcode]>,
}

/// Fold a call name the way the engine-function table is keyed:
/// lowercase, underscores dropped — `LoadPic`, `loadpic` and `load_pic`
/// all land on the same entry.
pub fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn eval_call(state: &mut EngineState, seq: i64, name: &str, args: &[Opcode]) -> Flow {
    let key = fold_name(name);

    // Flow-affecting built-ins cannot go through the value dispatcher.
    match key.as_str() {
        "delme" => return eval(state, seq, &Opcode::DeleteMe, &mut ResumeState::fresh()),
        "delus" => return eval(state, seq, &Opcode::DeleteUs, &mut ResumeState::fresh()),
        "delall" => return eval(state, seq, &Opcode::DeleteAll, &mut ResumeState::fresh()),
        "exittitle" => {
            log::info!("exit_title: terminating");
            state.request_terminate();
            return Flow::Yield;
        }
        _ => {}
    }

    let vals: Vec<Value> = args.iter().map(|a| eval_expr(state, seq, a)).collect();

    if let Some(v) = builtins::dispatch(state, seq, &key, &vals, args) {
        return Flow::Done(v);
    }

    if let Some(func) = state.funcs.get(&key).cloned() {
        return Flow::Done(call_user_func(state, seq, &func, &vals));
    }

    EngineError::VmError {
        detail: format!("unknown function {name}"),
    }
    .report();
    Flow::Done(Value::Int(0))
}

/// Expand a user-function body as a child sequencer parented on the
/// caller's scope and drain it synchronously.  Waits inside do execute
/// but cannot suspend the caller mid-expression; their counters are
/// cleared.  The return value is the callee's `result` variable.
fn call_user_func(state: &mut EngineState, caller: i64, func: &UserFunc, vals: &[Value]) -> Value {
    let (group, mode) = match state.seqs.get(caller) {
        Some(s) => (s.group, s.mode),
        None => (state.seqs.alloc_group(), TimingMode::Time),
    };
    let id = state.seqs.alloc_id();
    let mut child = Sequencer::new(id, group, func.body.clone(), mode);
    child.parent = Some(caller);
    for (i, p) in func.params.iter().enumerate() {
        child.insert_var(p, vals.get(i).cloned().unwrap_or(Value::Int(0)));
    }
    state.seqs.push(child);

    scheduler::drain(state, id);

    let ret = state
        .seqs
        .get(id)
        .and_then(|s| s.local_var("result").cloned())
        .unwrap_or(Value::Int(0));
    state.seqs.remove(id);
    ret
}

fn delete_group(state: &mut EngineState, seq: i64) {
    let Some(group) = state.seqs.get(seq).map(|s| s.group) else {
        return;
    };
    for s in state.seqs.iter_mut() {
        if s.group == group {
            s.deactivate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineState;
    use crate::vm::opcode::commands;

    fn state_with_seq(ops: Vec<Opcode>) -> (EngineState, i64) {
        let mut state = EngineState::headless();
        let id = state.spawn(commands(ops), TimingMode::Time, None, None, false);
        (state, id)
    }

    fn run_one(state: &mut EngineState, id: i64, op: &Opcode) -> Flow {
        eval(state, id, op, &mut ResumeState::fresh())
    }

    #[test]
    fn assignment_and_case_insensitive_readback() {
        let (mut state, id) = state_with_seq(vec![]);
        run_one(&mut state, id, &Opcode::assign("Score", Opcode::int(42)));
        assert_eq!(eval_expr(&mut state, id, &Opcode::var("SCORE")), Value::Int(42));
        assert_eq!(eval_expr(&mut state, id, &Opcode::var("score")), Value::Int(42));
    }

    #[test]
    fn if_takes_the_right_branch() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::If {
            cond: Box::new(Opcode::int(0)),
            then_ops: vec![Opcode::assign("x", Opcode::int(1))],
            else_ops: vec![Opcode::assign("x", Opcode::int(2))],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "x"), Value::Int(2));
    }

    #[test]
    fn while_counts_and_break_stops() {
        let (mut state, id) = state_with_seq(vec![]);
        // i = 0; while (i < 10) { i = i + 1; if (i == 4) break; }
        run_one(&mut state, id, &Opcode::assign("i", Opcode::int(0)));
        let op = Opcode::While {
            cond: Box::new(Opcode::infix(BinOp::Lt, Opcode::var("i"), Opcode::int(10))),
            body: vec![
                Opcode::assign("i", Opcode::infix(BinOp::Add, Opcode::var("i"), Opcode::int(1))),
                Opcode::If {
                    cond: Box::new(Opcode::infix(BinOp::Eq, Opcode::var("i"), Opcode::int(4))),
                    then_ops: vec![Opcode::Break],
                    else_ops: vec![],
                },
            ],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "i"), Value::Int(4));
    }

    #[test]
    fn for_loop_runs_init_cond_post() {
        let (mut state, id) = state_with_seq(vec![]);
        // for (i = 0; i < 5; i = i + 1) sum = sum + i;
        let op = Opcode::For {
            init: Box::new(Opcode::assign("i", Opcode::int(0))),
            cond: Box::new(Opcode::infix(BinOp::Lt, Opcode::var("i"), Opcode::int(5))),
            post: Box::new(Opcode::assign(
                "i",
                Opcode::infix(BinOp::Add, Opcode::var("i"), Opcode::int(1)),
            )),
            body: vec![Opcode::assign(
                "sum",
                Opcode::infix(BinOp::Add, Opcode::var("sum"), Opcode::var("i")),
            )],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "sum"), Value::Int(10));
    }

    #[test]
    fn switch_matches_a_case_else_default() {
        let (mut state, id) = state_with_seq(vec![]);
        let mk = |v: i64| Opcode::Switch {
            value: Box::new(Opcode::int(v)),
            cases: vec![
                (Opcode::int(1), vec![Opcode::assign("r", Opcode::int(10))]),
                (Opcode::int(2), vec![Opcode::assign("r", Opcode::int(20))]),
            ],
            default: vec![Opcode::assign("r", Opcode::int(-1))],
        };
        run_one(&mut state, id, &mk(2));
        assert_eq!(state.seqs.get_var(id, "r"), Value::Int(20));
        run_one(&mut state, id, &mk(7));
        assert_eq!(state.seqs.get_var(id, "r"), Value::Int(-1));
    }

    #[test]
    fn wait_converts_steps_to_ticks() {
        let (mut state, id) = state_with_seq(vec![]);
        let flow = run_one(&mut state, id, &Opcode::wait(5));
        assert!(matches!(flow, Flow::Yield));
        // TIME default: 12 ticks per step.
        assert_eq!(state.seqs.get(id).unwrap().wait_ticks, 60);
    }

    #[test]
    fn set_step_rescales_later_waits() {
        let (mut state, id) = state_with_seq(vec![]);
        run_one(&mut state, id, &Opcode::SetStep(Box::new(Opcode::int(2))));
        assert_eq!(state.seqs.get(id).unwrap().ticks_per_step, 6);
        run_one(&mut state, id, &Opcode::wait(4));
        assert_eq!(state.seqs.get(id).unwrap().wait_ticks, 24);
    }

    #[test]
    fn wait_inside_while_saves_a_resume_path() {
        let (mut state, id) = state_with_seq(vec![]);
        run_one(&mut state, id, &Opcode::assign("n", Opcode::int(0)));
        let op = Opcode::While {
            cond: Box::new(Opcode::infix(BinOp::Lt, Opcode::var("n"), Opcode::int(3))),
            body: vec![
                Opcode::assign("n", Opcode::infix(BinOp::Add, Opcode::var("n"), Opcode::int(1))),
                Opcode::wait(1),
                Opcode::assign("after", Opcode::var("n")),
            ],
        };

        // First entry: one increment, then the wait suspends the loop.
        let mut rs = ResumeState::fresh();
        assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Yield));
        assert_eq!(state.seqs.get_var(id, "n"), Value::Int(1));
        assert_eq!(state.seqs.get_var(id, "after"), Value::Int(0));
        let mut path = rs.saved;
        path.reverse();
        assert_eq!(path, vec![Frame::Loop, Frame::Block { index: 2 }]);

        // Resume: the statement after the wait runs, then the loop goes
        // around and suspends on the wait again.
        let mut rs = ResumeState::resume(path);
        assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Yield));
        assert_eq!(state.seqs.get_var(id, "after"), Value::Int(1));
        assert_eq!(state.seqs.get_var(id, "n"), Value::Int(2));
    }

    #[test]
    fn user_function_defines_calls_and_returns() {
        let (mut state, id) = state_with_seq(vec![]);
        run_one(
            &mut state,
            id,
            &Opcode::DefineFunc {
                name: "Double".into(),
                params: vec!["v".into()],
                body: commands(vec![Opcode::assign(
                    "result",
                    Opcode::infix(BinOp::Mul, Opcode::var("v"), Opcode::int(2)),
                )]),
            },
        );
        let v = eval_expr(&mut state, id, &Opcode::call("dOuBlE", vec![Opcode::int(21)]));
        assert_eq!(v, Value::Int(42));
        // The child sequencer is gone after the call.
        assert_eq!(state.seqs.len(), 1);
    }

    #[test]
    fn user_function_reads_the_callers_scope() {
        let (mut state, id) = state_with_seq(vec![]);
        run_one(&mut state, id, &Opcode::assign("base", Opcode::int(100)));
        run_one(
            &mut state,
            id,
            &Opcode::DefineFunc {
                name: "addbase".into(),
                params: vec!["v".into()],
                body: commands(vec![Opcode::assign(
                    "result",
                    Opcode::infix(BinOp::Add, Opcode::var("v"), Opcode::var("base")),
                )]),
            },
        );
        let v = eval_expr(&mut state, id, &Opcode::call("AddBase", vec![Opcode::int(1)]));
        assert_eq!(v, Value::Int(101));
    }

    #[test]
    fn unknown_function_yields_zero() {
        let (mut state, id) = state_with_seq(vec![]);
        let v = eval_expr(&mut state, id, &Opcode::call("no_such_fn", vec![]));
        assert_eq!(v, Value::Int(0));
    }

    #[test]
    fn short_circuit_does_not_evaluate_the_right_side() {
        let (mut state, id) = state_with_seq(vec![]);
        // 0 && (x = 5) — the assignment must not run.
        let op = Opcode::infix(
            BinOp::And,
            Opcode::int(0),
            Opcode::assign("x", Opcode::int(5)),
        );
        assert_eq!(eval_expr(&mut state, id, &op), Value::Bool(false));
        assert_eq!(state.seqs.get_var(id, "x"), Value::Int(0));
    }

    #[test]
    fn runaway_loop_is_cut_off() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::While {
            cond: Box::new(Opcode::int(1)),
            body: vec![Opcode::assign("x", Opcode::int(1))],
        };
        // Must return (as Break → Done at top level), not hang.
        let flow = run_one(&mut state, id, &op);
        assert!(matches!(flow, Flow::Break));
    }

    #[test]
    fn name_folding_drops_underscores_and_case() {
        assert_eq!(fold_name("LoadPic"), "loadpic");
        assert_eq!(fold_name("load_pic"), "loadpic");
        assert_eq!(fold_name("LOAD_PIC"), "loadpic");
    }

    #[test]
    fn step_runs_the_body_count_times() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::Step {
            count: Box::new(Opcode::int(4)),
            body: vec![Opcode::assign(
                "n",
                Opcode::infix(BinOp::Add, Opcode::var("n"), Opcode::int(1)),
            )],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "n"), Value::Int(4));
    }

    #[test]
    fn step_with_inner_wait_keeps_its_iteration_count() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::Step {
            count: Box::new(Opcode::int(3)),
            body: vec![
                Opcode::assign("n", Opcode::infix(BinOp::Add, Opcode::var("n"), Opcode::int(1))),
                Opcode::wait(1),
            ],
        };

        let mut path = Vec::new();
        for round in 1..=3i64 {
            let mut rs = ResumeState::resume(path);
            assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Yield));
            assert_eq!(state.seqs.get_var(id, "n"), Value::Int(round));
            path = rs.saved;
            path.reverse();
        }
        // Final resume: the last iteration's wait is behind us and the
        // step block completes.
        let mut rs = ResumeState::resume(path);
        assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Done(_)));
        assert_eq!(state.seqs.get_var(id, "n"), Value::Int(3));
    }

    #[test]
    fn do_while_runs_at_least_once() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::DoWhile {
            cond: Box::new(Opcode::int(0)),
            body: vec![Opcode::assign("ran", Opcode::int(1))],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "ran"), Value::Int(1));
    }

    #[test]
    fn wait_inside_a_switch_case_resumes_in_the_same_case() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::Switch {
            value: Box::new(Opcode::int(2)),
            cases: vec![
                (Opcode::int(1), vec![Opcode::assign("hit", Opcode::int(10))]),
                (
                    Opcode::int(2),
                    vec![
                        Opcode::wait(1),
                        Opcode::assign("hit", Opcode::int(20)),
                    ],
                ),
            ],
            default: vec![Opcode::assign("hit", Opcode::int(-1))],
        };

        let mut rs = ResumeState::fresh();
        assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Yield));
        assert_eq!(state.seqs.get_var(id, "hit"), Value::Int(0));

        let mut path = rs.saved;
        path.reverse();
        let mut rs = ResumeState::resume(path);
        assert!(matches!(eval(&mut state, id, &op, &mut rs), Flow::Done(_)));
        assert_eq!(state.seqs.get_var(id, "hit"), Value::Int(20));
    }

    #[test]
    fn continue_skips_the_rest_of_the_iteration() {
        let (mut state, id) = state_with_seq(vec![]);
        // for (i = 0; i < 5; i = i + 1) { if (i == 2) continue; n = n + 1; }
        let op = Opcode::For {
            init: Box::new(Opcode::assign("i", Opcode::int(0))),
            cond: Box::new(Opcode::infix(BinOp::Lt, Opcode::var("i"), Opcode::int(5))),
            post: Box::new(Opcode::assign(
                "i",
                Opcode::infix(BinOp::Add, Opcode::var("i"), Opcode::int(1)),
            )),
            body: vec![
                Opcode::If {
                    cond: Box::new(Opcode::infix(BinOp::Eq, Opcode::var("i"), Opcode::int(2))),
                    then_ops: vec![Opcode::Continue],
                    else_ops: vec![],
                },
                Opcode::assign("n", Opcode::infix(BinOp::Add, Opcode::var("n"), Opcode::int(1))),
            ],
        };
        run_one(&mut state, id, &op);
        assert_eq!(state.seqs.get_var(id, "n"), Value::Int(4));
    }

    #[test]
    fn delete_me_deactivates_the_caller() {
        let (mut state, id) = state_with_seq(vec![]);
        let flow = run_one(&mut state, id, &Opcode::call("del_me", vec![]));
        assert!(matches!(flow, Flow::Yield));
        assert!(!state.seqs.get(id).unwrap().is_active());
    }

    #[test]
    fn delete_us_takes_the_whole_group_and_only_the_group() {
        let mut state = EngineState::headless();
        let a = state.spawn(commands(vec![]), TimingMode::Time, None, None, false);
        let group = state.seqs.get(a).unwrap().group;
        let b = state.spawn(commands(vec![]), TimingMode::Time, None, Some(group), false);
        let other = state.spawn(commands(vec![]), TimingMode::Time, None, None, false);

        run_one(&mut state, a, &Opcode::DeleteUs);
        assert!(!state.seqs.get(a).unwrap().is_active());
        assert!(!state.seqs.get(b).unwrap().is_active());
        assert!(state.seqs.get(other).unwrap().is_active());
    }

    #[test]
    fn delete_all_deactivates_everything() {
        let mut state = EngineState::headless();
        let a = state.spawn(commands(vec![]), TimingMode::Time, None, None, false);
        let b = state.spawn(commands(vec![]), TimingMode::Time, None, None, false);
        run_one(&mut state, a, &Opcode::DeleteAll);
        assert!(!state.seqs.get(a).unwrap().is_active());
        assert!(!state.seqs.get(b).unwrap().is_active());
    }

    #[test]
    fn register_sequence_spawns_a_sibling_in_the_callers_group() {
        let (mut state, id) = state_with_seq(vec![]);
        let op = Opcode::RegisterSequence {
            mode: TimingMode::Time,
            body: commands(vec![Opcode::assign("x", Opcode::int(1))]),
        };
        let flow = run_one(&mut state, id, &op);
        let Flow::Done(Value::Int(child)) = flow else {
            panic!("expected the new sequence id");
        };
        assert_ne!(child, id);
        let parent_group = state.seqs.get(id).unwrap().group;
        let child_seq = state.seqs.get(child).unwrap();
        assert_eq!(child_seq.group, parent_group);
        assert_eq!(child_seq.parent, Some(id));
        // The child has not executed anything yet.
        assert_eq!(child_seq.pc, 0);
    }
}
