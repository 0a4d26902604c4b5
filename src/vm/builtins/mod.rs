//! The engine-function table.
//!
//! `Call` opcodes land here after name folding (lowercase, underscores
//! dropped): `LoadPic`, `loadpic` and `load_pic` are the same entry.
//! Unknown names fall through to the user-function table; flow-control
//! built-ins (`del_me` and friends) are intercepted by the evaluator
//! before this table is consulted.

mod files;
mod media;
mod strings;

pub use files::FileTable;

use super::value::Value;
use crate::engine::EngineState;
use crate::vm::opcode::Opcode;

/// Argument helpers.  Missing arguments read as 0 / empty, matching the
/// forgiving legacy runtime.
pub(crate) fn int_arg(vals: &[Value], i: usize) -> i64 {
    vals.get(i).map(Value::as_int).unwrap_or(0)
}

pub(crate) fn int_arg_or(vals: &[Value], i: usize, default: i64) -> i64 {
    vals.get(i).map(Value::as_int).unwrap_or(default)
}

pub(crate) fn str_arg(vals: &[Value], i: usize) -> String {
    vals.get(i).map(Value::as_str).unwrap_or_default()
}

/// Dispatch a folded call name.  `None` means "not a built-in".
pub fn dispatch(
    state: &mut EngineState,
    seq: i64,
    name: &str,
    vals: &[Value],
    arg_ops: &[Opcode],
) -> Option<Value> {
    let v = match name {
        // ── Pictures ───────────────────────────────────────────
        "loadpic" => media::load_pic(state, vals),
        "createpic" => media::create_pic(state, vals),
        "delpic" => media::del_pic(state, vals),
        "movepic" => media::move_pic(state, vals),
        "movespic" => media::move_s_pic(state, vals),
        "reversepic" => media::reverse_pic(state, vals),
        "picwidth" => media::pic_width(state, vals),
        "picheight" => media::pic_height(state, vals),
        "getcolor" => media::get_color(state, vals),

        // ── Windows ────────────────────────────────────────────
        "openwin" => media::open_win(state, vals),
        "movewin" => media::move_win(state, vals),
        "closewin" => media::close_win(state, vals),
        "closewinall" => media::close_win_all(state),
        "captitle" => media::cap_title(state, vals),
        "getpicno" => media::get_pic_no(state, vals),

        // ── Casts ──────────────────────────────────────────────
        "putcast" => media::put_cast(state, vals),
        "movecast" => media::move_cast(state, vals),
        "delcast" => media::del_cast(state, vals),

        // ── Audio ──────────────────────────────────────────────
        "playmidi" => media::play_midi(state, vals),
        "playwave" => media::play_wave(state, vals),
        "loadrsc" => media::load_rsc(state, vals),
        "playrsc" => media::play_rsc(state, vals),
        "stopmidi" => media::stop_midi(state),

        // ── Text ───────────────────────────────────────────────
        "setfont" => media::set_font(state, vals),
        "textcolor" => media::text_color(state, vals),
        "bgcolor" => media::bg_color(state, vals),
        "backmode" => media::back_mode(state, vals),
        "textwrite" => media::text_write(state, vals),

        // ── Drawing ────────────────────────────────────────────
        "setlinesize" => media::set_line_size(state, vals),
        "setpaintcolor" => media::set_paint_color(state, vals),
        "setrop" => media::set_rop(state, vals),
        "drawline" => media::draw_line(state, vals),
        "drawrect" => media::draw_rect(state, vals),
        "drawcircle" => media::draw_circle(state, vals),

        // ── Strings ────────────────────────────────────────────
        "strlen" => strings::str_len(vals),
        "substr" => strings::sub_str(vals),
        "strfind" => strings::str_find(vals),
        "charcode" => strings::char_code(vals),
        "strcode" => strings::str_code(vals),
        "strup" => strings::str_up(vals),
        "strlow" => strings::str_low(vals),
        "strprint" => strings::str_print(vals),

        // ── Arrays ─────────────────────────────────────────────
        "arraysize" => strings::array_size(vals),
        "insarrayat" => strings::ins_array_at(state, seq, vals, arg_ops),
        "delarrayat" => strings::del_array_at(state, seq, vals, arg_ops),
        "delarrayall" => strings::del_array_all(state, seq, arg_ops),

        // ── Bits ───────────────────────────────────────────────
        "makelong" => strings::make_long(vals),
        "gethiword" => strings::get_hi_word(vals),
        "getlowword" => strings::get_low_word(vals),

        // ── Files / INI ────────────────────────────────────────
        "openf" => files::open_f(state, vals),
        "closef" => files::close_f(state, vals),
        "seekf" => files::seek_f(state, vals),
        "readf" => files::read_f(state, vals),
        "writef" => files::write_f(state, vals),
        "strreadf" => files::str_read_f(state, vals),
        "strwritef" => files::str_write_f(state, vals),
        "copyfile" => files::copy_file(state, vals),
        "delfile" => files::del_file(state, vals),
        "isexist" => files::is_exist(state, vals),
        "mkdir" => files::mk_dir(state, vals),
        "rmdir" => files::rm_dir(state, vals),
        "chdir" => files::ch_dir(state, vals),
        "getcwd" => files::get_cwd(state),
        "writeiniint" => files::write_ini_int(state, vals),
        "getiniint" => files::get_ini_int(state, vals),
        "writeinistr" => files::write_ini_str(state, vals),
        "getinistr" => files::get_ini_str(state, vals),

        _ => return None,
    };
    Some(v)
}
