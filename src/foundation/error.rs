pub type MontageResult<T> = Result<T, MontageError>;

#[derive(thiserror::Error, Debug)]
pub enum MontageError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Codec or container configuration rejected while a session was being set up.
    #[error("setup error: {0}")]
    Setup(String),

    #[error("buffer geometry error: {len} samples is not a multiple of {channels} channels")]
    BufferGeometry { len: usize, channels: usize },

    #[error("decoder error: track {track} not ready after {attempts} attempts")]
    Decoder { track: usize, attempts: u32 },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("mux error: {0}")]
    Mux(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MontageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Whether the error should abort a running session rather than a single track.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decoder { .. } | Self::BufferGeometry { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
