//! Engine error taxonomy.
//!
//! Script-level failures are reported through `log` and absorbed — the VM
//! keeps running.  `EngineError` values cross the engine façade only for
//! construction problems and terminal conditions.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Unknown picture/window/cast/sequence id.
    #[error("{kind} {id} not found")]
    ResourceNotFound { kind: &'static str, id: i64 },

    /// Malformed argument list or out-of-bounds index.
    #[error("invalid argument to {op}: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// Asset loader or image decoder failure.
    #[error("asset error for {path:?}: {detail}")]
    AssetError { path: String, detail: String },

    /// Self-blit, zero-sized region, or other compositor misuse.
    #[error("compositor error: {detail}")]
    CompositorError { detail: String },

    /// Unknown built-in name or uncoercible type mismatch.
    #[error("vm error: {detail}")]
    VmError { detail: String },

    /// A required capability was not injected at construction.
    #[error("missing capability: {0}")]
    MissingCapability(&'static str),
}

impl EngineError {
    /// Log the error at the severity the debug level mandates.
    /// `ResourceNotFound` and terminal conditions always surface (level 0);
    /// everything else is demoted to `warn`.
    pub fn report(&self) {
        match self {
            EngineError::ResourceNotFound { .. } => log::error!("{self}"),
            EngineError::MissingCapability(_) => log::error!("{self}"),
            _ => log::warn!("{self}"),
        }
    }
}
