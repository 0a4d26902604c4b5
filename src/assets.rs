// Asset I/O and image decoding capabilities.
//
// Lookups are case-insensitive to match the legacy Windows 3.1 scripts the
// engine runs: a script asking for "TITLE.BMP" must find "title.bmp".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

// ── Capability traits ──────────────────────────────────────────

/// Byte-level access to script assets.
pub trait AssetLoader: Send {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, String>;
    fn read_dir(&self, path: &str) -> Result<Vec<String>, String>;
}

/// A decoded RGBA8 image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// Decodes asset bytes into RGBA images.
pub trait ImageDecoder: Send {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, String>;
}

// ── DirLoader ──────────────────────────────────────────────────

/// Loads assets from a directory tree with case-insensitive matching.
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` under the root, ignoring case and accepting both
    /// `\` and `/` as separators.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let wanted = path.replace('\\', "/").to_lowercase();
        let direct = self.root.join(wanted.trim_start_matches('/'));
        if direct.exists() {
            return Some(direct);
        }
        for entry in WalkDir::new(&self.root).into_iter().flatten() {
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/").to_lowercase();
            if rel == wanted.trim_start_matches('/') {
                return Some(entry.path().to_path_buf());
            }
        }
        None
    }
}

impl AssetLoader for DirLoader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, String> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| format!("file not found: {path}"))?;
        std::fs::read(&resolved).map_err(|e| format!("cannot read {}: {e}", resolved.display()))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>, String> {
        let resolved = if path.is_empty() || path == "." {
            self.root.clone()
        } else {
            self.resolve(path)
                .ok_or_else(|| format!("directory not found: {path}"))?
        };
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&resolved)
            .map_err(|e| format!("cannot list {}: {e}", resolved.display()))?;
        for entry in entries.flatten() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

// ── MemLoader ──────────────────────────────────────────────────

/// In-memory asset table, mainly for tests and embedded assets.
#[derive(Default)]
pub struct MemLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.files.insert(name.to_lowercase(), bytes);
    }
}

impl AssetLoader for MemLoader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, String> {
        self.files
            .get(&path.replace('\\', "/").to_lowercase())
            .cloned()
            .ok_or_else(|| format!("file not found: {path}"))
    }

    fn read_dir(&self, _path: &str) -> Result<Vec<String>, String> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

// ── StockDecoder ───────────────────────────────────────────────

/// Image decoder backed by the `image` crate (BMP, PNG, and friends).
pub struct StockDecoder;

impl ImageDecoder for StockDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, String> {
        let img = image::load_from_memory(bytes).map_err(|e| format!("decode failed: {e}"))?;
        let rgba = img.to_rgba8();
        Ok(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}

/// Create the stock loader/decoder pair rooted at `root`.
pub fn stock_assets(root: &Path) -> (Box<dyn AssetLoader>, Box<dyn ImageDecoder>) {
    (Box::new(DirLoader::new(root)), Box::new(StockDecoder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_loader_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pics")).unwrap();
        std::fs::write(dir.path().join("pics/Title.bmp"), b"x").unwrap();

        let loader = DirLoader::new(dir.path());
        assert_eq!(loader.read_file("PICS\\TITLE.BMP").unwrap(), b"x");
        assert_eq!(loader.read_file("pics/title.bmp").unwrap(), b"x");
        assert!(loader.read_file("pics/other.bmp").is_err());
    }

    #[test]
    fn mem_loader_round_trip() {
        let mut loader = MemLoader::new();
        loader.insert("Data/Notes.txt", vec![1, 2, 3]);
        assert_eq!(loader.read_file("data/notes.txt").unwrap(), vec![1, 2, 3]);
    }
}
