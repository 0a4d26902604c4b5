//! Picture, window, cast, audio, text, and drawing built-ins — thin
//! wrappers that unpack script arguments, call into the graphics state
//! or a capability, and absorb failures the legacy way (report, return
//! 0, keep running).

use super::{int_arg, int_arg_or, str_arg};
use crate::engine::EngineState;
use crate::error::EngineError;
use crate::gfx::Rgb;
use crate::vm::timing::TimingMode;
use crate::vm::value::Value;

fn ok() -> Value {
    Value::Int(0)
}

fn report_and_zero(err: EngineError) -> Value {
    err.report();
    Value::Int(0)
}

// ── Pictures ───────────────────────────────────────────────────

pub fn load_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = str_arg(vals, 0);
    let bytes = match state.loader.read_file(&path) {
        Ok(b) => b,
        Err(detail) => return report_and_zero(EngineError::AssetError { path, detail }),
    };
    let img = match state.decoder.decode(&bytes) {
        Ok(i) => i,
        Err(detail) => return report_and_zero(EngineError::AssetError { path, detail }),
    };
    let id = state.gfx.insert_decoded(img);
    if state.debug_level >= 1 {
        log::info!("load_pic {path} -> {id}");
    }
    Value::Int(id)
}

pub fn create_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    let w = int_arg(vals, 0).max(1) as u32;
    let h = int_arg(vals, 1).max(1) as u32;
    let id = state.gfx.create_picture(w, h);
    if state.debug_level >= 1 {
        log::info!("create_pic {w}x{h} -> {id}");
    }
    Value::Int(id)
}

pub fn del_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.delete_picture(int_arg(vals, 0)) {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn move_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.move_picture(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg(vals, 7),
        int_arg_or(vals, 8, 0),
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn move_s_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    let key = if vals.len() >= 13 {
        Some(Rgb {
            r: int_arg(vals, 10) as u8,
            g: int_arg(vals, 11) as u8,
            b: int_arg(vals, 12) as u8,
        })
    } else {
        None
    };
    let r = state.gfx.move_scaled_picture(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg(vals, 7),
        int_arg(vals, 8),
        int_arg(vals, 9),
        key,
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn reverse_pic(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.reverse_picture(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg(vals, 7),
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn pic_width(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.picture(int_arg(vals, 0)) {
        Ok(p) => Value::Int(p.width as i64),
        Err(e) => report_and_zero(e),
    }
}

pub fn pic_height(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.picture(int_arg(vals, 0)) {
        Ok(p) => Value::Int(p.height as i64),
        Err(e) => report_and_zero(e),
    }
}

pub fn get_color(state: &mut EngineState, vals: &[Value]) -> Value {
    match state
        .gfx
        .color_at(int_arg(vals, 0), int_arg(vals, 1), int_arg(vals, 2))
    {
        Ok(c) => Value::Int(c),
        Err(e) => report_and_zero(e),
    }
}

// ── Windows ────────────────────────────────────────────────────

pub fn open_win(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.open_window(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg_or(vals, 7, 0xFFFFFF),
    );
    match r {
        Ok(id) => {
            if state.debug_level >= 1 {
                log::info!("open_win -> {id}");
            }
            Value::Int(id)
        }
        Err(e) => report_and_zero(e),
    }
}

pub fn move_win(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.move_window(
        int_arg(vals, 0),
        int_arg_or(vals, 1, -1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg(vals, 7),
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn close_win(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.close_window(int_arg(vals, 0)) {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn close_win_all(state: &mut EngineState) -> Value {
    state.gfx.close_all_windows();
    ok()
}

pub fn cap_title(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.set_caption(int_arg(vals, 0), &str_arg(vals, 1)) {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn get_pic_no(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.window_picture(int_arg(vals, 0)) {
        Ok(pic) => Value::Int(pic),
        Err(e) => report_and_zero(e),
    }
}

// ── Casts ──────────────────────────────────────────────────────

/// The destination may be a window (its bound picture is used) or a
/// picture id.
fn resolve_surface(state: &EngineState, id: i64) -> i64 {
    state
        .gfx
        .windows
        .get(&id)
        .map(|w| w.pic)
        .unwrap_or(id)
}

pub fn put_cast(state: &mut EngineState, vals: &[Value]) -> Value {
    let dest = resolve_surface(state, int_arg(vals, 0));
    let r = state.gfx.put_cast(
        dest,
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg(vals, 5),
        int_arg(vals, 6),
        int_arg(vals, 7),
        int_arg_or(vals, 8, -1),
    );
    match r {
        Ok(id) => {
            if state.debug_level >= 1 {
                log::info!("put_cast -> {id} on picture {dest}");
            }
            Value::Int(id)
        }
        Err(e) => report_and_zero(e),
    }
}

pub fn move_cast(state: &mut EngineState, vals: &[Value]) -> Value {
    let clip = if vals.len() >= 7 {
        Some((
            int_arg(vals, 3),
            int_arg(vals, 4),
            int_arg(vals, 5),
            int_arg(vals, 6),
        ))
    } else {
        None
    };
    let r = state
        .gfx
        .move_cast(int_arg(vals, 0), int_arg(vals, 1), int_arg(vals, 2), clip);
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn del_cast(state: &mut EngineState, vals: &[Value]) -> Value {
    match state.gfx.delete_cast(int_arg(vals, 0)) {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

// ── Audio ──────────────────────────────────────────────────────

pub fn play_midi(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = str_arg(vals, 0);
    let bytes = match state.loader.read_file(&path) {
        Ok(b) => b,
        Err(detail) => return report_and_zero(EngineError::AssetError { path, detail }),
    };
    match state.audio.play_midi(&bytes) {
        Ok(()) => {
            // The MIDI clock owns playback from here on.
            state.mode = TimingMode::MidiTime;
            if state.debug_level >= 1 {
                log::info!("play_midi {path}: switched to MIDI clock");
            }
            ok()
        }
        Err(detail) => report_and_zero(EngineError::AssetError { path, detail }),
    }
}

pub fn play_wave(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = str_arg(vals, 0);
    let bytes = match state.loader.read_file(&path) {
        Ok(b) => b,
        Err(detail) => return report_and_zero(EngineError::AssetError { path, detail }),
    };
    match state.audio.play_wave(&bytes) {
        Ok(()) => ok(),
        Err(detail) => report_and_zero(EngineError::AssetError { path, detail }),
    }
}

pub fn load_rsc(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = str_arg(vals, 0);
    let bytes = match state.loader.read_file(&path) {
        Ok(b) => b,
        Err(detail) => return report_and_zero(EngineError::AssetError { path, detail }),
    };
    match state.audio.load_resource(&bytes) {
        Ok(handle) => Value::Int(handle),
        Err(detail) => report_and_zero(EngineError::AssetError { path, detail }),
    }
}

pub fn play_rsc(state: &mut EngineState, vals: &[Value]) -> Value {
    if let Err(e) = state.audio.play_resource(int_arg(vals, 0)) {
        log::warn!("play_rsc: {e}");
    }
    ok()
}

pub fn stop_midi(state: &mut EngineState) -> Value {
    state.audio.stop_midi();
    ok()
}

// ── Text ───────────────────────────────────────────────────────

pub fn set_font(state: &mut EngineState, vals: &[Value]) -> Value {
    let mut size = int_arg(vals, 0);
    let name = str_arg(vals, 1);
    let mut charset = int_arg(vals, 2);
    // Legacy scripts sometimes pass (charset, name, size); a size over
    // 200 is the tell.
    if size > 200 {
        log::warn!("set_font: size {size} looks like a charset, swapping arguments");
        std::mem::swap(&mut size, &mut charset);
    }
    state.gfx.font.size = size;
    state.gfx.font.name = name;
    state.gfx.font.charset = charset;
    ok()
}

pub fn text_color(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.text.color = Rgb {
        r: int_arg(vals, 0) as u8,
        g: int_arg(vals, 1) as u8,
        b: int_arg(vals, 2) as u8,
    };
    ok()
}

pub fn bg_color(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.text.bg = Rgb {
        r: int_arg(vals, 0) as u8,
        g: int_arg(vals, 1) as u8,
        b: int_arg(vals, 2) as u8,
    };
    ok()
}

pub fn back_mode(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.text.back_mode = int_arg(vals, 0);
    ok()
}

pub fn text_write(state: &mut EngineState, vals: &[Value]) -> Value {
    let text = str_arg(vals, 0);
    let pic = int_arg(vals, 1);
    let x = int_arg(vals, 2);
    let y = int_arg(vals, 3);
    let font = state.gfx.font.clone();
    let Some(raster) = state.renderer.draw_text(&text, &font, state.gfx.text.color) else {
        // Headless backends cannot rasterize; the write is a no-op.
        return ok();
    };
    match state.gfx.composite_text(pic, x, y, &raster) {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

// ── Drawing ────────────────────────────────────────────────────

pub fn set_line_size(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.set_line_size(int_arg(vals, 0));
    ok()
}

pub fn set_paint_color(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.set_paint_color(int_arg(vals, 0));
    ok()
}

pub fn set_rop(state: &mut EngineState, vals: &[Value]) -> Value {
    state.gfx.set_rop(int_arg(vals, 0));
    ok()
}

pub fn draw_line(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.draw_line(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn draw_rect(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.draw_rect(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg_or(vals, 5, 0) != 0,
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}

pub fn draw_circle(state: &mut EngineState, vals: &[Value]) -> Value {
    let r = state.gfx.draw_circle(
        int_arg(vals, 0),
        int_arg(vals, 1),
        int_arg(vals, 2),
        int_arg(vals, 3),
        int_arg(vals, 4),
        int_arg_or(vals, 5, 0) != 0,
    );
    match r {
        Ok(()) => ok(),
        Err(e) => report_and_zero(e),
    }
}
