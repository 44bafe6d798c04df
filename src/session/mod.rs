//! Control-thread orchestration: commands in, events out.

/// Render loop driving the compositor, decoder retries and exports.
pub mod export;

use std::path::PathBuf;

use crate::foundation::core::Canvas;
use crate::foundation::error::MontageError;
use crate::render::compositor::ExportTarget;

pub use export::{ExportSession, SessionOptions};

/// Commands accepted by a running session.
#[derive(Debug)]
pub enum RenderCommand {
    Play,
    Pause,
    /// Move to a composition time in milliseconds.
    Seek(i64),
    Export(ExportRequest),
    SetOpacity { track: usize, alpha: f32 },
    ResizePreview(Canvas),
    Stop,
}

#[derive(Debug)]
pub struct ExportRequest {
    pub target: ExportTarget,
    /// File written by the muxer backend; removed when the export fails.
    pub out_path: Option<PathBuf>,
}

/// Everything reported to the control thread. Worker threads report their failures here too.
#[derive(Debug)]
pub enum SessionEvent {
    ExportStarted {
        width: u32,
        height: u32,
    },
    /// A track's audio joined the export mix.
    TrackActive(usize),
    TrackInactive(usize),
    /// Every track has finished its slot.
    ExportComplete,
    /// Both encoders finished and the muxer was released.
    EncoderStopped,
    ExportFinished {
        out_path: Option<PathBuf>,
        success: bool,
    },
    /// Playback reached the end of the composition.
    TimelineEnded,
    Error {
        origin: &'static str,
        error: MontageError,
    },
    Stopped,
}
