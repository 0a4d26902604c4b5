//! Filly — a runtime for the FILLY/TFY multimedia scripting language.
//!
//! Scripts from a 1990s Japanese desktop describe time-coordinated
//! animations, sprite choreography, and MIDI-synchronized effects over
//! a fixed 1280×720 virtual desktop.  This crate takes the compiled
//! opcode tree of such a script and drives it at 60 Hz:
//!
//! * a cooperative bytecode VM where every script advances at most one
//!   opcode per tick and `wait` is a scheduler counter, not a thread;
//! * pictures, windows, and casts (sprites) with a double-buffered
//!   redraw that keeps moving sprites from ghosting;
//! * an event registry that spawns fresh script instances from
//!   registered handler templates.
//!
//! The embedding host owns the frame loop: it calls [`Engine::update`]
//! once per frame and [`Engine::render`] when it wants to present.
//! Rendering, asset I/O, image decoding, and audio are capabilities
//! injected at construction; the crate ships null and directory-backed
//! implementations.

pub mod assets;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod gfx;
pub mod renderer;
pub mod vm;

pub use assets::{AssetLoader, DecodedImage, DirLoader, ImageDecoder, MemLoader, StockDecoder};
pub use audio::{AudioBackend, NullAudio};
pub use config::EngineConfig;
pub use engine::{Capabilities, Engine, EngineState, TickOutcome};
pub use error::EngineError;
pub use renderer::{
    DesktopFrame, FontSpec, FrameSnapshot, NullRenderer, RasterImage, Renderer, SoftwareRenderer,
    WindowView,
};
pub use vm::{commands, BinOp, EventKind, Opcode, TimingMode, UnOp, Value};
