#![forbid(unsafe_code)]

pub mod animation;
pub mod audio;
pub mod config;
pub mod encode;
pub mod foundation;
pub mod logging;
pub mod player;
pub mod render;
pub mod session;

pub use config::{AppConfig, DecoderSettings, EncoderSettings, Resolution};
pub use foundation::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use foundation::core::{COMPOSITION_DURATION_MS, Canvas, Fps};
pub use foundation::error::{MontageError, MontageResult};
pub use render::compositor::{Compositor, ExportTarget};
pub use session::{ExportRequest, ExportSession, RenderCommand, SessionEvent, SessionOptions};
