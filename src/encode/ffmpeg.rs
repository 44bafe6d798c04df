use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::encode::codec::TrackFormat;
use crate::encode::muxer::MuxerBackend;
use crate::foundation::error::{MontageError, MontageResult};

/// Options for [`FfmpegMuxer`].
#[derive(Clone, Debug)]
pub struct FfmpegMuxerOpts {
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl FfmpegMuxerOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
        }
    }
}

struct Spool {
    path: PathBuf,
    writer: BufWriter<File>,
    format: TrackFormat,
}

/// Muxer backend that spools raw elementary streams and hands them to the system `ffmpeg`.
///
/// Video samples are expected as RGBA8 frames at the track's size and audio samples as
/// interleaved s16le. The MP4 is written when the muxer stops.
pub struct FfmpegMuxer {
    opts: FfmpegMuxerOpts,
    formats: Vec<TrackFormat>,
    spools: Vec<Spool>,
}

impl FfmpegMuxer {
    pub fn new(opts: FfmpegMuxerOpts) -> MontageResult<Self> {
        ensure_parent_dir(&opts.out_path)?;
        if !opts.overwrite && opts.out_path.exists() {
            return Err(MontageError::validation(format!(
                "output file '{}' already exists",
                opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(MontageError::setup(
                "ffmpeg is required for MP4 output, but was not found on PATH",
            ));
        }
        Ok(Self {
            opts,
            formats: Vec::new(),
            spools: Vec::new(),
        })
    }

    fn spool_path(&self, index: usize) -> PathBuf {
        let mut name = self
            .opts
            .out_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".track{index}.raw"));
        self.opts.out_path.with_file_name(name)
    }

    fn remove_spools(&mut self) {
        for spool in self.spools.drain(..) {
            drop(spool.writer);
            if let Err(e) = std::fs::remove_file(&spool.path) {
                tracing::debug!("failed to remove spool '{}': {e}", spool.path.display());
            }
        }
    }

    fn build_command(&self) -> MontageResult<Command> {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });
        cmd.args(["-loglevel", "error"]);

        let mut video_bitrate = None;
        let mut video_codec = None;
        let mut has_audio = false;
        for spool in &self.spools {
            match &spool.format {
                TrackFormat::Video {
                    codec,
                    width,
                    height,
                    frame_rate,
                    bit_rate,
                    ..
                } => {
                    cmd.args([
                        "-f",
                        "rawvideo",
                        "-pix_fmt",
                        "rgba",
                        "-s",
                        &format!("{width}x{height}"),
                        "-r",
                        &frame_rate.to_string(),
                        "-i",
                    ])
                    .arg(&spool.path);
                    video_bitrate = Some(*bit_rate);
                    video_codec = Some(*codec);
                }
                TrackFormat::Audio {
                    sample_rate_hz,
                    channel_count,
                    ..
                } => {
                    cmd.args([
                        "-f",
                        "s16le",
                        "-ar",
                        &sample_rate_hz.to_string(),
                        "-ac",
                        &channel_count.to_string(),
                        "-i",
                    ])
                    .arg(&spool.path);
                    has_audio = true;
                }
            }
        }

        let codec =
            video_codec.ok_or_else(|| MontageError::mux("ffmpeg muxer has no video track"))?;
        cmd.args(["-c:v", codec.ffmpeg_encoder(), "-pix_fmt", "yuv420p"]);
        if let Some(bit_rate) = video_bitrate {
            cmd.args(["-b:v", &bit_rate.to_string()]);
        }
        for spool in &self.spools {
            if let TrackFormat::Audio { bit_rate, .. } = spool.format {
                cmd.args(["-c:a", "aac", "-b:a", &bit_rate.to_string()]);
            }
        }
        if !has_audio {
            cmd.arg("-an");
        }
        cmd.args(["-movflags", "+faststart"]).arg(&self.opts.out_path);
        Ok(cmd)
    }
}

impl MuxerBackend for FfmpegMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> MontageResult<usize> {
        self.formats.push(format.clone());
        Ok(self.formats.len() - 1)
    }

    fn start(&mut self) -> MontageResult<()> {
        use anyhow::Context as _;
        for (index, format) in self.formats.iter().enumerate() {
            let path = self.spool_path(index);
            let file = File::create(&path)
                .with_context(|| format!("failed to create spool '{}'", path.display()))?;
            self.spools.push(Spool {
                path,
                writer: BufWriter::new(file),
                format: format.clone(),
            });
        }
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: usize,
        data: &[u8],
        _pts_us: i64,
        _key_frame: bool,
    ) -> MontageResult<()> {
        let spool = self
            .spools
            .get_mut(track)
            .ok_or_else(|| MontageError::mux(format!("unknown track {track}")))?;
        if let TrackFormat::Video { width, height, .. } = spool.format {
            let expected = width as usize * height as usize * 4;
            if data.len() != expected {
                return Err(MontageError::mux(format!(
                    "video sample is {} bytes, expected {expected}",
                    data.len()
                )));
            }
        }
        spool.writer.write_all(data)?;
        Ok(())
    }

    fn stop(&mut self) -> MontageResult<()> {
        for spool in &mut self.spools {
            spool.writer.flush()?;
        }
        let result = self.build_command().and_then(|mut cmd| {
            tracing::info!(out = %self.opts.out_path.display(), "running ffmpeg");
            let output = cmd.output().map_err(|e| {
                MontageError::mux(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(MontageError::mux(format!(
                    "ffmpeg exited with status {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            Ok(())
        });
        self.remove_spools();
        result
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        self.remove_spools();
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MontageResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
