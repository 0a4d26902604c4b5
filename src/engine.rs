//! The engine façade.
//!
//! One coarse mutex guards the whole engine state; every host-facing
//! operation takes it for its duration, and `update()` holds it for the
//! full tick.  The only cross-thread entry that bypasses the lock is
//! `notify_tick` — an atomic store of the MIDI target tick from the
//! audio backend's thread.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::assets::{AssetLoader, DirLoader, ImageDecoder, MemLoader, StockDecoder};
use crate::audio::{AudioBackend, NullAudio};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gfx::{GfxState, DESKTOP_HEIGHT, DESKTOP_WIDTH};
use crate::renderer::{FrameSnapshot, NullRenderer, Renderer, WindowView};
use crate::vm::builtins::FileTable;
use crate::vm::events::{EventKind, HandlerRegistry};
use crate::vm::opcode::{commands, Opcode};
use crate::vm::scheduler;
use crate::vm::sequencer::{Sequencer, SequencerTable};
use crate::vm::timing::{TimingMode, MAX_CATCHUP_PASSES};
use crate::vm::value::Value;
use crate::vm::UserFunc;

/// Tombstoned handler templates are swept this often (ticks).
const HANDLER_SWEEP_INTERVAL: u64 = 600;

/// What one `update()` told the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Stop calling `update()`: terminated, timed out, or everything
    /// ran to completion.
    Terminated,
}

// ── Engine state ───────────────────────────────────────────────

/// Everything behind the engine mutex.  There is deliberately no global
/// singleton: the VM, graphics state, and capabilities all live here
/// and are passed down explicitly.
pub struct EngineState {
    pub gfx: GfxState,
    pub seqs: SequencerTable,
    pub handlers: HandlerRegistry,
    /// User-function table, keyed by folded name.
    pub funcs: HashMap<String, UserFunc>,
    pub files: FileTable,
    /// Global tick counter; +1 per `update()`.
    pub tick: u64,
    /// Local MIDI clock progress (MIDI_TIME catch-up).
    pub midi_tick: u64,
    pub mode: TimingMode,
    pub debug_level: u8,
    pub headless: bool,
    /// Engine-local working directory for the file built-ins.
    pub cwd: PathBuf,
    pub loader: Box<dyn AssetLoader>,
    pub decoder: Box<dyn ImageDecoder>,
    pub renderer: Box<dyn Renderer>,
    pub audio: Box<dyn AudioBackend>,
    terminate: Arc<AtomicBool>,
    started_at: Option<Instant>,
    /// True once any sequencer was registered; gates the
    /// everything-complete termination predicate.
    ever_registered: bool,
}

impl EngineState {
    /// A state wired with null/in-memory capabilities.  Unit tests and
    /// headless embeddings use this.
    pub fn headless() -> Self {
        Self {
            gfx: GfxState::new(),
            seqs: SequencerTable::new(),
            handlers: HandlerRegistry::new(),
            funcs: HashMap::new(),
            files: FileTable::new(),
            tick: 0,
            midi_tick: 0,
            mode: TimingMode::Time,
            debug_level: 0,
            headless: true,
            cwd: PathBuf::from("."),
            loader: Box::new(MemLoader::new()),
            decoder: Box::new(StockDecoder),
            renderer: Box::new(NullRenderer),
            audio: Box::new(NullAudio::default()),
            terminate: Arc::new(AtomicBool::new(false)),
            started_at: None,
            ever_registered: false,
        }
    }

    /// Register a sequencer over `ops`.  Fresh group unless one is
    /// inherited; never blocks.
    pub fn spawn(
        &mut self,
        ops: Arc<[Opcode]>,
        mode: TimingMode,
        parent: Option<i64>,
        group: Option<i64>,
        looping: bool,
    ) -> i64 {
        let id = self.seqs.alloc_id();
        let group = group.unwrap_or_else(|| self.seqs.alloc_group());
        let mut seq = Sequencer::new(id, group, ops, mode);
        seq.parent = parent;
        seq.looping = looping;
        self.seqs.push(seq);
        self.ever_registered = true;
        if self.debug_level >= 2 {
            log::debug!("spawned sequence {id} (group {group}, {mode:?})");
        }
        id
    }

    /// Instantiate every active template matching the event.  Each
    /// spawn gets its own `MesP1..MesP4` bindings from `params`.
    pub fn trigger(&mut self, kind: EventKind, user_id: i64, params: &[Value]) -> Vec<i64> {
        let templates: Vec<(Arc<[Opcode]>, TimingMode, Option<i64>)> = self
            .handlers
            .matching(kind, user_id)
            .into_iter()
            .map(|h| (h.ops.clone(), h.mode, h.parent))
            .collect();

        let mut spawned = Vec::with_capacity(templates.len());
        for (ops, mode, parent) in templates {
            let id = self.spawn(ops, mode, parent, None, kind.is_looping());
            for (i, slot) in ["mesp1", "mesp2", "mesp3", "mesp4"].iter().enumerate() {
                let v = params.get(i).cloned().unwrap_or(Value::Int(0));
                if let Some(s) = self.seqs.get_mut(id) {
                    s.insert_var(slot, v);
                }
            }
            if self.debug_level >= 1 {
                log::info!("event {kind:?} -> sequence {id}");
            }
            spawned.push(id);
        }
        spawned
    }

    /// Append a handler template; TIME-family handlers also spawn their
    /// looping sequencer immediately.
    pub fn register_handler(
        &mut self,
        kind: EventKind,
        ops: Arc<[Opcode]>,
        mode: TimingMode,
        parent: Option<i64>,
        user_id: i64,
    ) -> i64 {
        let id = self.handlers.register(kind, ops.clone(), mode, parent, user_id);
        if kind.is_looping() {
            self.spawn(ops, mode, parent, None, true);
        }
        if self.debug_level >= 1 {
            log::info!("registered {kind:?} handler {id}");
        }
        id
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }
}

// ── Capabilities ───────────────────────────────────────────────

/// The collaborator set injected at construction.
pub struct Capabilities {
    pub loader: Box<dyn AssetLoader>,
    pub decoder: Box<dyn ImageDecoder>,
    /// Required unless the engine is headless.
    pub renderer: Option<Box<dyn Renderer>>,
    pub audio: Box<dyn AudioBackend>,
}

impl Capabilities {
    /// Null everything: in-memory assets, stock decoder, no renderer,
    /// silent audio.
    pub fn null() -> Self {
        Self {
            loader: Box::new(MemLoader::new()),
            decoder: Box::new(StockDecoder),
            renderer: None,
            audio: Box::new(NullAudio::default()),
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────

pub struct Engine {
    state: Mutex<EngineState>,
    terminate: Arc<AtomicBool>,
    /// MIDI target tick, stored by the audio thread, read per frame.
    midi_target: Arc<AtomicU64>,
    timeout: Option<Duration>,
}

impl Engine {
    pub fn new(config: EngineConfig, caps: Capabilities) -> Result<Self, EngineError> {
        let renderer: Box<dyn Renderer> = match (config.headless, caps.renderer) {
            (_, Some(r)) => r,
            (true, None) => Box::new(NullRenderer),
            (false, None) => return Err(EngineError::MissingCapability("renderer")),
        };

        let mut state = EngineState::headless();
        state.headless = config.headless;
        state.debug_level = config.debug_level;
        state.mode = config.timing;
        state.loader = caps.loader;
        state.decoder = caps.decoder;
        state.renderer = renderer;
        state.audio = caps.audio;
        if let Some(root) = &config.asset_root {
            state.cwd = root.clone();
        }

        Ok(Self {
            terminate: state.terminate.clone(),
            state: Mutex::new(state),
            midi_target: Arc::new(AtomicU64::new(0)),
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
        })
    }

    /// Headless engine with null capabilities.
    pub fn headless() -> Self {
        Self::new(EngineConfig::headless(), Capabilities::null())
            .expect("headless construction cannot fail")
    }

    /// Headless engine loading assets from a directory.
    pub fn headless_with_assets(root: &std::path::Path) -> Self {
        let mut caps = Capabilities::null();
        caps.loader = Box::new(DirLoader::new(root));
        let mut config = EngineConfig::headless();
        config.asset_root = Some(root.to_path_buf());
        Self::new(config, caps).expect("headless construction cannot fail")
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Start the wall clock.  `update()` does this implicitly on its
    /// first call.
    pub fn start(&self) {
        self.lock().started_at = Some(Instant::now());
    }

    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    /// Advance the VM one host frame.
    pub fn update(&self) -> Result<TickOutcome, EngineError> {
        if self.is_terminated() {
            return Ok(TickOutcome::Terminated);
        }
        let mut state = self.lock();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
        if let Some(limit) = self.timeout {
            let elapsed = state.started_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed > limit {
                log::info!("wall-clock timeout after {elapsed:?}, terminating");
                self.terminate.store(true, Ordering::Relaxed);
                return Ok(TickOutcome::Terminated);
            }
        }

        state.tick += 1;
        match state.mode {
            TimingMode::Time => scheduler::pass(&mut state, false),
            TimingMode::MidiTime => {
                let target = self.midi_target.load(Ordering::Acquire);
                if target == 0 {
                    // Clock not running yet: fresh sequencers may run
                    // their first opcode so a play_midi can start it.
                    scheduler::pass(&mut state, true);
                } else {
                    let mut passes = 0;
                    while state.midi_tick < target && passes < MAX_CATCHUP_PASSES {
                        state.midi_tick += 1;
                        scheduler::pass(&mut state, false);
                        passes += 1;
                    }
                }
            }
        }

        state.seqs.cleanup();
        if state.tick % HANDLER_SWEEP_INTERVAL == 0 {
            state.handlers.cleanup();
        }

        if self.is_terminated() {
            return Ok(TickOutcome::Terminated);
        }
        let all_done = state.ever_registered
            && state.seqs.active_ids().is_empty()
            && !state.handlers.any_active();
        if all_done {
            if state.debug_level >= 1 {
                log::info!("all sequences complete at tick {}", state.tick);
            }
            return Ok(TickOutcome::Terminated);
        }
        Ok(TickOutcome::Continue)
    }

    /// Snapshot the visible windows under the lock and hand them to the
    /// renderer.  A no-op in headless mode.
    pub fn render(&self) {
        let mut state = self.lock();
        if state.headless {
            return;
        }
        let EngineState { gfx, renderer, .. } = &mut *state;
        let mut windows = Vec::new();
        for w in gfx.windows.values().filter(|w| w.visible) {
            let Some(pic) = gfx.pictures.get(&w.pic) else {
                continue;
            };
            windows.push(WindowView {
                id: w.id,
                x: w.x,
                y: w.y,
                width: w.width,
                height: w.height,
                pic_x: -w.pic_x_neg,
                pic_y: -w.pic_y_neg,
                pic_width: pic.width,
                pic_height: pic.height,
                pixels: &pic.buf,
                caption: &w.caption,
                bg_color: w.bg_color,
            });
        }
        let frame = FrameSnapshot {
            desktop_width: DESKTOP_WIDTH as u32,
            desktop_height: DESKTOP_HEIGHT as u32,
            windows,
        };
        renderer.render_frame(&frame);
    }

    /// Atomic store of the MIDI target tick.  Safe to call from the
    /// audio thread; never takes the engine lock.
    pub fn notify_tick(&self, midi_tick: u64) {
        self.midi_target.store(midi_tick, Ordering::Release);
    }

    pub fn current_tick(&self) -> u64 {
        self.lock().tick
    }

    pub fn set_timing_mode(&self, mode: TimingMode) {
        self.lock().mode = mode;
    }

    // ── Sequencers & events ────────────────────────────────────

    /// Register a sequencer over `ops`.  Always non-blocking, in both
    /// timing modes.
    pub fn register_sequence(&self, ops: Vec<Opcode>, mode: TimingMode) -> i64 {
        self.lock().spawn(commands(ops), mode, None, None, false)
    }

    pub fn register_event_handler(
        &self,
        kind: EventKind,
        ops: Vec<Opcode>,
        mode: TimingMode,
        user_id: i64,
    ) -> i64 {
        self.lock()
            .register_handler(kind, commands(ops), mode, None, user_id)
    }

    pub fn deactivate_event_handler(&self, id: i64) {
        self.lock().handlers.deactivate(id);
    }

    pub fn cleanup_inactive_event_handlers(&self) {
        self.lock().handlers.cleanup();
    }

    /// Spawn fresh sequencers from every matching template.  Returns
    /// their ids, in template order.
    pub fn trigger_event(&self, kind: EventKind, params: &[Value]) -> Vec<i64> {
        self.lock().trigger(kind, 0, params)
    }

    /// USER events match on the handler's user id.
    pub fn trigger_user_event(&self, user_id: i64, params: &[Value]) -> Vec<i64> {
        self.lock().trigger(EventKind::User, user_id, params)
    }

    // ── Host input routing ─────────────────────────────────────
    // Convenience wrappers: the host feeds raw input here and the
    // matching handlers see the coordinates in MesP1/MesP2.

    pub fn mouse_right_down(&self, x: i64, y: i64) -> Vec<i64> {
        self.lock()
            .trigger(EventKind::RbDown, 0, &[Value::Int(x), Value::Int(y)])
    }

    pub fn mouse_right_double_click(&self, x: i64, y: i64) -> Vec<i64> {
        self.lock()
            .trigger(EventKind::RbDblClk, 0, &[Value::Int(x), Value::Int(y)])
    }

    pub fn mouse_left_down(&self, x: i64, y: i64) -> Vec<i64> {
        self.lock()
            .trigger(EventKind::LbDown, 0, &[Value::Int(x), Value::Int(y)])
    }

    pub fn key_down(&self, code: i64) -> Vec<i64> {
        self.lock().trigger(EventKind::KeyDown, 0, &[Value::Int(code)])
    }

    /// Synchronous drain-until-complete evaluation, the bootstrap path
    /// for function definitions.  Waits are not honored here.
    pub fn execute_top_level(&self, ops: Vec<Opcode>) {
        let mut state = self.lock();
        let id = state.spawn(commands(ops), TimingMode::Time, None, None, false);
        scheduler::drain(&mut state, id);
        state.seqs.remove(id);
    }

    /// Spawn the registered `main` user function as a root sequencer.
    pub fn call_main(&self) -> Result<i64, EngineError> {
        let mut state = self.lock();
        let Some(func) = state.funcs.get("main").cloned() else {
            return Err(EngineError::VmError {
                detail: "main is not defined".into(),
            });
        };
        let mode = state.mode;
        Ok(state.spawn(func.body, mode, None, None, false))
    }

    // ── Test & host observability ──────────────────────────────

    /// Read a variable of a live sequencer (scope chain included).
    pub fn sequence_variable(&self, id: i64, name: &str) -> Value {
        self.lock().seqs.get_var(id, name)
    }

    pub fn sequence_active(&self, id: i64) -> bool {
        self.lock().seqs.get(id).map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn sequence_pc(&self, id: i64) -> Option<usize> {
        self.lock().seqs.get(id).map(|s| s.pc)
    }

    // ── Pictures ───────────────────────────────────────────────

    pub fn load_pic(&self, path: &str) -> i64 {
        let mut state = self.lock();
        crate::vm::builtins::dispatch(
            &mut state,
            0,
            "loadpic",
            &[Value::Str(path.to_string())],
            &[],
        )
        .map(|v| v.as_int())
        .unwrap_or(0)
    }

    pub fn create_pic(&self, w: u32, h: u32) -> i64 {
        self.lock().gfx.create_picture(w, h)
    }

    pub fn del_pic(&self, id: i64) -> Result<(), EngineError> {
        self.lock().gfx.delete_picture(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_pic(
        &self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
        mode: i64,
    ) -> Result<(), EngineError> {
        self.lock()
            .gfx
            .move_picture(src, sx, sy, sw, sh, dst, dx, dy, mode)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_s_pic(
        &self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
        dw: i64,
        dh: i64,
        key: Option<(u8, u8, u8)>,
    ) -> Result<(), EngineError> {
        let key = key.map(|(r, g, b)| crate::gfx::Rgb { r, g, b });
        self.lock()
            .gfx
            .move_scaled_picture(src, sx, sy, sw, sh, dst, dx, dy, dw, dh, key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reverse_pic(
        &self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
    ) -> Result<(), EngineError> {
        self.lock().gfx.reverse_picture(src, sx, sy, sw, sh, dst, dx, dy)
    }

    pub fn pic_width(&self, id: i64) -> Result<u32, EngineError> {
        self.lock().gfx.picture(id).map(|p| p.width)
    }

    pub fn pic_height(&self, id: i64) -> Result<u32, EngineError> {
        self.lock().gfx.picture(id).map(|p| p.height)
    }

    pub fn get_color(&self, id: i64, x: i64, y: i64) -> Result<i64, EngineError> {
        self.lock().gfx.color_at(id, x, y)
    }

    /// Flood a picture with one color; hosts and tests use this to set
    /// up backdrops.
    pub fn fill_pic(&self, id: i64, color: i64) -> Result<(), EngineError> {
        let mut state = self.lock();
        let rgb = crate::gfx::Rgb::from_packed(color);
        let p = state.gfx.picture_mut(id)?;
        p.paint(|buf, w, h| {
            crate::gfx::compositor::fill_rect(buf, w, h, 0, 0, w as i64, h as i64, rgb)
        });
        Ok(())
    }

    // ── Windows ────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn open_win(
        &self,
        pic: i64,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        pic_x: i64,
        pic_y: i64,
        bg_color: i64,
    ) -> Result<i64, EngineError> {
        self.lock()
            .gfx
            .open_window(pic, x, y, w, h, pic_x, pic_y, bg_color)
    }

    pub fn close_win(&self, id: i64) -> Result<(), EngineError> {
        self.lock().gfx.close_window(id)
    }

    pub fn close_win_all(&self) {
        self.lock().gfx.close_all_windows();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_win(
        &self,
        id: i64,
        pic: i64,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        pic_x: i64,
        pic_y: i64,
    ) -> Result<(), EngineError> {
        self.lock().gfx.move_window(id, pic, x, y, w, h, pic_x, pic_y)
    }

    pub fn cap_title(&self, id: i64, caption: &str) -> Result<(), EngineError> {
        self.lock().gfx.set_caption(id, caption)
    }

    pub fn get_pic_no(&self, id: i64) -> Result<i64, EngineError> {
        self.lock().gfx.window_picture(id)
    }

    pub fn start_drag(&self, mx: i64, my: i64) -> Option<i64> {
        self.lock().gfx.start_drag(mx, my)
    }

    pub fn update_drag(&self, mx: i64, my: i64) {
        self.lock().gfx.update_drag(mx, my)
    }

    pub fn stop_drag(&self) {
        self.lock().gfx.stop_drag()
    }

    // ── Casts ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn put_cast(
        &self,
        dest_pic: i64,
        src_pic: i64,
        x: i64,
        y: i64,
        src_x: i64,
        src_y: i64,
        w: i64,
        h: i64,
        transparent: i64,
    ) -> Result<i64, EngineError> {
        self.lock()
            .gfx
            .put_cast(dest_pic, src_pic, x, y, src_x, src_y, w, h, transparent)
    }

    pub fn move_cast(
        &self,
        id: i64,
        x: i64,
        y: i64,
        clip: Option<(i64, i64, i64, i64)>,
    ) -> Result<(), EngineError> {
        self.lock().gfx.move_cast(id, x, y, clip)
    }

    pub fn del_cast(&self, id: i64) -> Result<(), EngineError> {
        self.lock().gfx.delete_cast(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::opcode::Opcode;

    #[test]
    fn tick_increments_by_exactly_one_in_time_mode() {
        let engine = Engine::headless();
        // Keep it alive with a looping handler.
        engine.register_event_handler(
            EventKind::Time,
            vec![Opcode::assign("x", Opcode::int(1))],
            TimingMode::Time,
            0,
        );
        for expected in 1..=20u64 {
            engine.update().unwrap();
            assert_eq!(engine.current_tick(), expected);
        }
    }

    #[test]
    fn two_sequences_complete_independently() {
        let engine = Engine::headless();
        // A waits 5 steps (60 ticks), B waits 10 (120 ticks).
        let a = engine.register_sequence(vec![Opcode::wait(5)], TimingMode::Time);
        let b = engine.register_sequence(vec![Opcode::wait(10)], TimingMode::Time);

        let mut a_done_at = None;
        let mut b_done_at = None;
        for tick in 1..=200u64 {
            let _ = engine.update();
            if a_done_at.is_none() && !engine.sequence_active(a) {
                a_done_at = Some(tick);
            }
            if b_done_at.is_none() && !engine.sequence_active(b) {
                b_done_at = Some(tick);
            }
        }
        let a_done = a_done_at.expect("A never completed");
        let b_done = b_done_at.expect("B never completed");
        assert!((59..=61).contains(&a_done), "A completed at {a_done}");
        assert!((119..=121).contains(&b_done), "B completed at {b_done}");
        assert!(a_done < b_done);
    }

    #[test]
    fn update_terminates_once_everything_completes() {
        let engine = Engine::headless();
        engine.register_sequence(vec![Opcode::assign("x", Opcode::int(1))], TimingMode::Time);
        // Tick 1 executes; completion is observed and reported.
        let mut outcome = TickOutcome::Continue;
        for _ in 0..5 {
            outcome = engine.update().unwrap();
            if outcome == TickOutcome::Terminated {
                break;
            }
        }
        assert_eq!(outcome, TickOutcome::Terminated);
    }

    #[test]
    fn an_empty_engine_keeps_running() {
        let engine = Engine::headless();
        for _ in 0..10 {
            assert_eq!(engine.update().unwrap(), TickOutcome::Continue);
        }
    }

    #[test]
    fn terminate_aborts_before_any_step() {
        let engine = Engine::headless();
        let id = engine.register_sequence(
            vec![Opcode::assign("x", Opcode::int(1))],
            TimingMode::Time,
        );
        engine.terminate();
        assert_eq!(engine.update().unwrap(), TickOutcome::Terminated);
        assert_eq!(engine.sequence_variable(id, "x"), Value::Int(0));
    }

    #[test]
    fn exit_title_terminates_from_inside_a_script() {
        let engine = Engine::headless();
        engine.register_sequence(vec![Opcode::call("exit_title", vec![])], TimingMode::Time);
        engine.update().unwrap();
        assert!(engine.is_terminated());
        assert_eq!(engine.update().unwrap(), TickOutcome::Terminated);
    }

    #[test]
    fn midi_time_catches_up_bounded() {
        let engine = Engine::headless();
        engine.set_timing_mode(TimingMode::MidiTime);
        let id = engine.register_sequence(
            vec![
                Opcode::assign("n", Opcode::int(1)),
                Opcode::assign("n", Opcode::int(2)),
                Opcode::assign("n", Opcode::int(3)),
                Opcode::wait(1), // stay alive for inspection
            ],
            TimingMode::MidiTime,
        );
        // Clock far ahead: catch-up is bounded at 10 passes per frame,
        // which is plenty to run all three assignments in one update.
        engine.notify_tick(100);
        engine.update().unwrap();
        assert_eq!(engine.sequence_variable(id, "n"), Value::Int(3));
        // The bound kept the local clock from chasing the whole gap.
        assert!(engine.lock().midi_tick <= 10);
    }

    #[test]
    fn midi_bootstrap_runs_the_first_opcode_only() {
        let engine = Engine::headless();
        engine.set_timing_mode(TimingMode::MidiTime);
        let id = engine.register_sequence(
            vec![
                Opcode::assign("a", Opcode::int(1)),
                Opcode::assign("b", Opcode::int(2)),
            ],
            TimingMode::MidiTime,
        );
        // Target still 0: exactly one opcode runs, however many frames
        // pass.
        for _ in 0..5 {
            engine.update().unwrap();
        }
        assert_eq!(engine.sequence_variable(id, "a"), Value::Int(1));
        assert_eq!(engine.sequence_variable(id, "b"), Value::Int(0));
    }

    #[test]
    fn registration_in_midi_time_does_not_run_the_handler() {
        use std::time::Instant;
        let engine = Engine::headless();
        engine.set_timing_mode(TimingMode::MidiTime);
        // A handler whose body would loop for a long time if executed.
        let body = vec![Opcode::While {
            cond: Box::new(Opcode::int(1)),
            body: vec![Opcode::wait(1)],
        }];
        let t0 = Instant::now();
        engine.register_event_handler(EventKind::MidiEnd, body, TimingMode::MidiTime, 0);
        assert!(t0.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn event_triggers_spawn_fresh_sequencers_each_time() {
        let engine = Engine::headless();
        engine.register_event_handler(
            EventKind::MidiEnd,
            vec![
                Opcode::assign("v", Opcode::var("MesP1")),
                Opcode::wait(100), // keep the spawn alive for inspection
            ],
            TimingMode::Time,
            0,
        );

        let first = engine.trigger_event(EventKind::MidiEnd, &[Value::Int(7)]);
        assert_eq!(first.len(), 1);
        engine.update().unwrap();
        assert_eq!(engine.sequence_variable(first[0], "v"), Value::Int(7));

        let second = engine.trigger_event(EventKind::MidiEnd, &[Value::Int(9)]);
        assert_ne!(first[0], second[0]);
        engine.update().unwrap();
        assert_eq!(engine.sequence_variable(second[0], "v"), Value::Int(9));
        // The first spawn kept its own binding.
        assert_eq!(engine.sequence_variable(first[0], "v"), Value::Int(7));
    }

    #[test]
    fn time_handler_loops_forever() {
        let engine = Engine::headless();
        engine.register_event_handler(
            EventKind::Time,
            vec![Opcode::assign("x", Opcode::int(1))],
            TimingMode::Time,
            0,
        );
        // The handler spawned a looping sequencer with id 1.
        for _ in 0..10 {
            engine.update().unwrap();
        }
        assert!(engine.sequence_active(1));
        assert_eq!(engine.sequence_pc(1), Some(0));
    }

    #[test]
    fn deactivated_handler_stops_matching() {
        let engine = Engine::headless();
        let h = engine.register_event_handler(
            EventKind::RbDown,
            vec![Opcode::assign("x", Opcode::int(1))],
            TimingMode::Time,
            0,
        );
        assert_eq!(engine.trigger_event(EventKind::RbDown, &[]).len(), 1);
        engine.deactivate_event_handler(h);
        assert!(engine.trigger_event(EventKind::RbDown, &[]).is_empty());
        engine.cleanup_inactive_event_handlers();
    }

    #[test]
    fn execute_top_level_defines_functions_for_call_main() {
        let engine = Engine::headless();
        engine.execute_top_level(vec![Opcode::DefineFunc {
            name: "main".into(),
            params: vec![],
            body: commands(vec![Opcode::assign("ran", Opcode::int(1))]),
        }]);
        let id = engine.call_main().unwrap();
        engine.update().unwrap();
        assert_eq!(engine.sequence_variable(id, "ran"), Value::Int(1));
    }

    #[test]
    fn call_main_without_a_main_is_an_error() {
        let engine = Engine::headless();
        assert!(engine.call_main().is_err());
    }

    #[test]
    fn timeout_synthesizes_termination() {
        let mut config = EngineConfig::headless();
        config.timeout_secs = 1;
        let engine = Engine::new(config, Capabilities::null()).unwrap();
        engine.register_event_handler(
            EventKind::Time,
            vec![Opcode::assign("x", Opcode::int(1))],
            TimingMode::Time,
            0,
        );
        assert_eq!(engine.update().unwrap(), TickOutcome::Continue);
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(engine.update().unwrap(), TickOutcome::Terminated);
        assert!(engine.is_terminated());
    }

    #[test]
    fn missing_renderer_is_a_construction_error() {
        let config = EngineConfig::default(); // not headless
        let err = Engine::new(config, Capabilities::null());
        assert!(matches!(err, Err(EngineError::MissingCapability("renderer"))));
    }

    #[test]
    fn render_hands_the_window_stack_to_the_renderer() {
        use crate::gfx::{Rgb, TITLE_BAR_HEIGHT};
        use crate::renderer::SoftwareRenderer;

        let (renderer, frame) = SoftwareRenderer::new();
        let mut caps = Capabilities::null();
        caps.renderer = Some(Box::new(renderer));
        let config = EngineConfig::default(); // presenting, not headless
        let engine = Engine::new(config, caps).unwrap();

        let pic = engine.create_pic(30, 30);
        engine.fill_pic(pic, 0xFF0000).unwrap();
        engine.open_win(pic, 100, 50, 30, 30, 0, 0, 0xFFFFFF).unwrap();
        engine.render();

        let f = frame.lock().unwrap();
        assert_eq!(f.width, 1280);
        assert_eq!(f.height, 720);
        // Picture content sits below the caption bar.
        assert_eq!(
            f.pixel(110, 50 + TITLE_BAR_HEIGHT + 5),
            Some(Rgb { r: 255, g: 0, b: 0 })
        );
        // Caption bar is not picture content.
        assert_ne!(f.pixel(110, 55), Some(Rgb { r: 255, g: 0, b: 0 }));
    }

    #[test]
    fn input_helpers_seed_coordinates_into_mesp() {
        let engine = Engine::headless();
        engine.register_event_handler(
            EventKind::RbDown,
            vec![
                Opcode::assign("mx", Opcode::var("MesP1")),
                Opcode::assign("my", Opcode::var("MesP2")),
                Opcode::wait(100),
            ],
            TimingMode::Time,
            0,
        );
        let spawned = engine.mouse_right_down(320, 240);
        assert_eq!(spawned.len(), 1);
        engine.update().unwrap();
        engine.update().unwrap();
        assert_eq!(engine.sequence_variable(spawned[0], "mx"), Value::Int(320));
        assert_eq!(engine.sequence_variable(spawned[0], "my"), Value::Int(240));
    }

    #[test]
    fn user_events_route_by_id() {
        let engine = Engine::headless();
        engine.register_event_handler(
            EventKind::User,
            vec![Opcode::assign("x", Opcode::int(1)), Opcode::wait(100)],
            TimingMode::Time,
            7,
        );
        assert!(engine.trigger_user_event(3, &[]).is_empty());
        assert_eq!(engine.trigger_user_event(7, &[]).len(), 1);
    }
}
