//! File and INI built-ins.
//!
//! Scripts manage their own save data through numbered file handles.
//! Paths resolve against an engine-local working directory — `ch_dir`
//! never touches the process CWD.  The INI helpers parse the classic
//! `[section] key=value` shape with case-insensitive matching.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::{int_arg, int_arg_or, str_arg};
use crate::engine::EngineState;
use crate::vm::value::Value;

/// Numbered open-file table.  Handle 0 is never issued; it doubles as
/// the failure value.
pub struct FileTable {
    files: std::collections::HashMap<i64, File>,
    next_id: i64,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            files: std::collections::HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, f: File) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.files.insert(id, f);
        id
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut File> {
        self.files.get_mut(&id)
    }

    fn remove(&mut self, id: i64) -> Option<File> {
        self.files.remove(&id)
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(state: &EngineState, path: &str) -> PathBuf {
    let p = PathBuf::from(path.replace('\\', "/"));
    if p.is_absolute() {
        p
    } else {
        state.cwd.join(p)
    }
}

// ── File handles ───────────────────────────────────────────────

/// `open_f(path, mode)`: 0 = read, 1 = write (create/truncate),
/// 2 = append.  Returns the handle, 0 on failure.
pub fn open_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    let mode = int_arg(vals, 1);
    let opened = match mode {
        0 => OpenOptions::new().read(true).open(&path),
        1 => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path),
        2 => OpenOptions::new().append(true).create(true).open(&path),
        _ => {
            log::warn!("open_f: unknown mode {mode}");
            return Value::Int(0);
        }
    };
    match opened {
        Ok(f) => Value::Int(state.files.insert(f)),
        Err(e) => {
            log::warn!("open_f {}: {e}", path.display());
            Value::Int(0)
        }
    }
}

pub fn close_f(state: &mut EngineState, vals: &[Value]) -> Value {
    state.files.remove(int_arg(vals, 0));
    Value::Int(0)
}

pub fn seek_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let id = int_arg(vals, 0);
    let pos = int_arg(vals, 1).max(0) as u64;
    if let Some(f) = state.files.get_mut(id) {
        if let Err(e) = f.seek(SeekFrom::Start(pos)) {
            log::warn!("seek_f {id}: {e}");
        }
    }
    Value::Int(0)
}

/// Read one byte; −1 at end of file or on a bad handle.
pub fn read_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let id = int_arg(vals, 0);
    let Some(f) = state.files.get_mut(id) else {
        return Value::Int(-1);
    };
    let mut byte = [0u8; 1];
    match f.read(&mut byte) {
        Ok(1) => Value::Int(byte[0] as i64),
        _ => Value::Int(-1),
    }
}

/// Write one byte (the value's low 8 bits).
pub fn write_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let id = int_arg(vals, 0);
    let b = [(int_arg(vals, 1) & 0xFF) as u8];
    if let Some(f) = state.files.get_mut(id) {
        if let Err(e) = f.write_all(&b) {
            log::warn!("write_f {id}: {e}");
            return Value::Int(0);
        }
        return Value::Int(1);
    }
    Value::Int(0)
}

/// Read one line, CR/LF stripped.  Empty string at end of file.
pub fn str_read_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let id = int_arg(vals, 0);
    let Some(f) = state.files.get_mut(id) else {
        return Value::Str(String::new());
    };
    let mut bytes = Vec::new();
    let mut one = [0u8; 1];
    loop {
        match f.read(&mut one) {
            Ok(1) => {
                if one[0] == b'\n' {
                    break;
                }
                bytes.push(one[0]);
            }
            _ => break,
        }
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    Value::Str(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a line with a CRLF terminator (the scripts' native format).
pub fn str_write_f(state: &mut EngineState, vals: &[Value]) -> Value {
    let id = int_arg(vals, 0);
    let line = str_arg(vals, 1);
    if let Some(f) = state.files.get_mut(id) {
        if let Err(e) = write!(f, "{line}\r\n") {
            log::warn!("str_write_f {id}: {e}");
            return Value::Int(0);
        }
        return Value::Int(1);
    }
    Value::Int(0)
}

// ── Whole-file helpers ─────────────────────────────────────────

pub fn copy_file(state: &mut EngineState, vals: &[Value]) -> Value {
    let from = resolve(state, &str_arg(vals, 0));
    let to = resolve(state, &str_arg(vals, 1));
    match std::fs::copy(&from, &to) {
        Ok(_) => Value::Int(1),
        Err(e) => {
            log::warn!("copy_file {} -> {}: {e}", from.display(), to.display());
            Value::Int(0)
        }
    }
}

pub fn del_file(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    match std::fs::remove_file(&path) {
        Ok(()) => Value::Int(1),
        Err(e) => {
            log::warn!("del_file {}: {e}", path.display());
            Value::Int(0)
        }
    }
}

pub fn is_exist(state: &mut EngineState, vals: &[Value]) -> Value {
    Value::Int(resolve(state, &str_arg(vals, 0)).exists() as i64)
}

pub fn mk_dir(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    Value::Int(std::fs::create_dir_all(&path).is_ok() as i64)
}

pub fn rm_dir(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    Value::Int(std::fs::remove_dir(&path).is_ok() as i64)
}

/// Change the engine-local working directory.
pub fn ch_dir(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    if path.is_dir() {
        state.cwd = path;
        Value::Int(1)
    } else {
        log::warn!("ch_dir: {} is not a directory", path.display());
        Value::Int(0)
    }
}

pub fn get_cwd(state: &mut EngineState) -> Value {
    Value::Str(state.cwd.to_string_lossy().into_owned())
}

// ── INI ────────────────────────────────────────────────────────

fn ini_get(content: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.eq_ignore_ascii_case(section);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim().eq_ignore_ascii_case(key) {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Rewrite `content` with `section/key` set to `value`, appending the
/// section and/or key when absent.
fn ini_set(content: &str, section: &str, key: &str, value: &str) -> String {
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    let mut section_start = None;
    for (i, line) in lines.iter().enumerate() {
        let t = line.trim();
        if let Some(name) = t.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if name.eq_ignore_ascii_case(section) {
                section_start = Some(i);
                break;
            }
        }
    }

    match section_start {
        None => {
            lines.push(format!("[{section}]"));
            lines.push(format!("{key}={value}"));
        }
        Some(start) => {
            let mut end = lines.len();
            for (i, line) in lines.iter().enumerate().skip(start + 1) {
                if line.trim().starts_with('[') {
                    end = i;
                    break;
                }
            }
            let mut replaced = false;
            for line in lines.iter_mut().take(end).skip(start + 1) {
                if let Some((k, _)) = line.split_once('=') {
                    if k.trim().eq_ignore_ascii_case(key) {
                        *line = format!("{key}={value}");
                        replaced = true;
                        break;
                    }
                }
            }
            if !replaced {
                lines.insert(end, format!("{key}={value}"));
            }
        }
    }
    lines.join("\n") + "\n"
}

/// `write_ini_int(file, section, key, value)`
pub fn write_ini_int(state: &mut EngineState, vals: &[Value]) -> Value {
    let v = int_arg(vals, 3).to_string();
    write_ini(state, vals, &v)
}

/// `write_ini_str(file, section, key, value)`
pub fn write_ini_str(state: &mut EngineState, vals: &[Value]) -> Value {
    let v = str_arg(vals, 3);
    write_ini(state, vals, &v)
}

fn write_ini(state: &mut EngineState, vals: &[Value], value: &str) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    let section = str_arg(vals, 1);
    let key = str_arg(vals, 2);
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    let updated = ini_set(&content, &section, &key, value);
    match std::fs::write(&path, updated) {
        Ok(()) => Value::Int(1),
        Err(e) => {
            log::warn!("write_ini {}: {e}", path.display());
            Value::Int(0)
        }
    }
}

/// `get_ini_int(file, section, key, default)`
pub fn get_ini_int(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    let v = ini_get(&content, &str_arg(vals, 1), &str_arg(vals, 2))
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or_else(|| int_arg_or(vals, 3, 0));
    Value::Int(v)
}

/// `get_ini_str(file, section, key, default)`
pub fn get_ini_str(state: &mut EngineState, vals: &[Value]) -> Value {
    let path = resolve(state, &str_arg(vals, 0));
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    let v = ini_get(&content, &str_arg(vals, 1), &str_arg(vals, 2))
        .unwrap_or_else(|| str_arg(vals, 3));
    Value::Str(v)
}
