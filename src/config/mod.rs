//! Runtime configuration: encoder targets, decoder retry policy, logging and the effect table.

/// Reference track line-ups.
pub mod cases;
/// Keyframe tables keyed by effect id.
pub mod effects;

use std::path::{Path, PathBuf};

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{MontageError, MontageResult};

/// Target sample rate of the mixed audio track.
pub const AUDIO_SAMPLE_RATE_HZ: u32 = 48_000;
pub const AUDIO_CHANNEL_COUNT: u16 = 2;
pub const AUDIO_BIT_RATE: u32 = 320_000;
/// Size in bytes of one PCM block handed to the audio encoder.
pub const AUDIO_BUFFER_SIZE: usize = 4096;
pub const AUDIO_MAX_AMPLITUDE: i32 = 32_767;

/// Video codec of the exported file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderCodec {
    #[default]
    H264,
    H265,
}

impl EncoderCodec {
    pub fn mime_type(self) -> &'static str {
        match self {
            EncoderCodec::H264 => "video/avc",
            EncoderCodec::H265 => "video/hevc",
        }
    }

    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            EncoderCodec::H264 => "libx264",
            EncoderCodec::H265 => "libx265",
        }
    }

    /// Bitrate the reference encoder considers optimal for the frame size.
    pub fn optimal_bitrate(self, width: u32, height: u32) -> u32 {
        let size = u64::from(width) * u64::from(height);
        let bitrate = if size <= 640 * 480 {
            1_000_000
        } else if size <= 1280 * 720 {
            2_000_000
        } else if size <= 1920 * 1080 {
            7_000_000
        } else {
            10_000_000
        };
        match self {
            EncoderCodec::H264 => bitrate,
            EncoderCodec::H265 => bitrate / 2,
        }
    }
}

impl std::str::FromStr for EncoderCodec {
    type Err = MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            other => Err(MontageError::validation(format!("unknown codec '{other}'"))),
        }
    }
}

/// Output frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const SD: Resolution = Resolution::new(640, 480);
    pub const HD: Resolution = Resolution::new(1280, 720);
    pub const FULL_HD: Resolution = Resolution::new(1920, 1080);
    pub const UHD: Resolution = Resolution::new(3840, 2160);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn canvas(self) -> MontageResult<Canvas> {
        Canvas::new(self.width, self.height)
    }

    /// Same frame size in portrait orientation.
    pub fn portrait(self) -> Self {
        Self::new(self.height.min(self.width), self.height.max(self.width))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FULL_HD
    }
}

impl std::str::FromStr for Resolution {
    type Err = MontageError;

    /// Accepts `480p`, `720p`, `1080p`, `2160p`/`4k`, or an explicit `WxH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "480p" => return Ok(Self::SD),
            "720p" => return Ok(Self::HD),
            "1080p" => return Ok(Self::FULL_HD),
            "2160p" | "4k" => return Ok(Self::UHD),
            _ => {}
        }
        let (w, h) = lower
            .split_once('x')
            .ok_or_else(|| MontageError::validation(format!("invalid resolution '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| MontageError::validation(format!("invalid resolution '{s}'")))
        };
        let res = Self::new(parse(w)?, parse(h)?);
        if res.width == 0 || res.height == 0 {
            return Err(MontageError::validation(format!("invalid resolution '{s}'")));
        }
        Ok(res)
    }
}

/// How the audio mixer lays out its output block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixLane {
    /// Signed 16-bit little-endian samples with a per-sample volume ramp.
    #[default]
    Pcm16,
    /// Byte-wise mix that keeps only the low byte of each result, with a constant volume per block.
    LegacyLowByte,
}

/// Encoder targets consumed by the export pipeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub codec: EncoderCodec,
    pub resolution: Resolution,
    /// Composition time advanced per wall-clock unit while exporting.
    pub speed_factor: f64,
    pub mix_lane: MixLane,
    pub frame_rate: u32,
    pub i_frame_interval_secs: u32,
    /// `false` produces a video-only file.
    pub with_audio: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: EncoderCodec::H264,
            resolution: Resolution::FULL_HD,
            speed_factor: 0.5,
            mix_lane: MixLane::Pcm16,
            frame_rate: 30,
            i_frame_interval_secs: 4,
            with_audio: true,
        }
    }
}

impl EncoderSettings {
    pub fn fps(&self) -> MontageResult<Fps> {
        Fps::new(self.frame_rate, 1)
    }

    /// Half of the optimal bitrate for the frame size.
    pub fn video_bitrate(&self) -> u32 {
        self.codec
            .optimal_bitrate(self.resolution.width, self.resolution.height)
            / 2
    }

    pub fn validate(&self) -> MontageResult<()> {
        if !(self.speed_factor > 0.0 && self.speed_factor.is_finite()) {
            return Err(MontageError::validation(format!(
                "speed factor must be positive, got {}",
                self.speed_factor
            )));
        }
        if self.frame_rate == 0 {
            return Err(MontageError::validation("frame rate must be > 0"));
        }
        if !self.resolution.width.is_multiple_of(2) || !self.resolution.height.is_multiple_of(2) {
            return Err(MontageError::validation(format!(
                "resolution {}x{} must be even",
                self.resolution.width, self.resolution.height
            )));
        }
        self.resolution.canvas()?;
        Ok(())
    }
}

/// Retry policy for decoders that fall back to idle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Proxy frame size relative to the clip size.
    pub proxy_divisor: u32,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 10,
            retry_backoff_ms: 150,
            proxy_divisor: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub encoder: EncoderSettings,
    pub decoder: DecoderSettings,
    pub logging: LoggingConfig,
    pub output_dir: Option<PathBuf>,
    /// Replaces the built-in effect table when set.
    pub composition: Option<effects::CompositionConfig>,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("ignoring config '{}': {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> MontageResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.encoder.validate()?;
        if let Some(comp) = cfg.composition.as_ref() {
            comp.validate()?;
        }
        Ok(cfg)
    }

    pub fn composition(&self) -> effects::CompositionConfig {
        self.composition.clone().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/settings.rs"]
mod tests;
