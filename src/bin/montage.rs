use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use montage::config::cases::{self, TestCase};
use montage::config::effects::CompositionConfig;
use montage::config::{AppConfig, EncoderCodec};
use montage::encode::codec::PassthroughCodecFactory;
use montage::encode::ffmpeg::{FfmpegMuxer, FfmpegMuxerOpts};
use montage::encode::muxer::{InMemoryMuxer, MuxEvent, MuxLog, MuxerBackend};
use montage::player::synthetic::SyntheticPlayer;
use montage::render::sprite::Sprite;
use montage::{
    Canvas, Compositor, ExportRequest, ExportSession, ExportTarget, ManualClock, RenderCommand,
    Resolution, SessionEvent, SessionOptions, SystemClock,
};

/// Wall time between render passes.
const PASS_INTERVAL: Duration = Duration::from_millis(8);

#[derive(Parser, Debug)]
#[command(name = "montage", version)]
struct Cli {
    /// Configuration file (JSON). Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "montage.json")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a reference line-up in real time.
    Export(ExportArgs),
    /// Draw one preview frame of a line-up as a PNG.
    Frame(FrameArgs),
    /// List the reference line-ups.
    Cases,
    /// Print the effective configuration.
    Config,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Test case number (1-20).
    #[arg(long = "case")]
    case: u32,

    #[arg(long, value_enum)]
    codec: Option<CodecChoice>,

    /// `480p`, `720p`, `1080p`, `4k` or `WxH`.
    #[arg(long)]
    resolution: Option<Resolution>,

    /// Composition time advanced per wall-clock unit.
    #[arg(long)]
    speed_factor: Option<f64>,

    /// Output MP4 path (requires `ffmpeg` on PATH).
    #[arg(long, required_unless_present = "dry_run")]
    out: Option<PathBuf>,

    /// Record muxer calls in memory instead of writing a file.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[arg(long = "case")]
    case: u32,

    /// Composition time in milliseconds.
    #[arg(long, default_value_t = 0)]
    at_ms: i64,

    #[arg(long, default_value = "640x360")]
    size: Resolution,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecChoice {
    H264,
    H265,
}

impl From<CodecChoice> for EncoderCodec {
    fn from(value: CodecChoice) -> Self {
        match value {
            CodecChoice::H264 => EncoderCodec::H264,
            CodecChoice::H265 => EncoderCodec::H265,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config);
    montage::logging::init_logging(&config.logging);
    match cli.cmd {
        Command::Export(args) => cmd_export(args, &config),
        Command::Frame(args) => cmd_frame(args, &config),
        Command::Cases => cmd_cases(&config),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn cmd_export(args: ExportArgs, config: &AppConfig) -> anyhow::Result<()> {
    let case = cases::find(args.case)?;
    let mut settings = config.encoder.clone();
    if let Some(codec) = args.codec {
        settings.codec = codec.into();
    }
    if let Some(resolution) = args.resolution {
        settings.resolution = resolution;
    }
    if let Some(speed) = args.speed_factor {
        settings.speed_factor = speed;
    }
    settings.validate()?;

    let mut log: Option<MuxLog> = None;
    let backend: Box<dyn MuxerBackend> = match (&args.out, args.dry_run) {
        (Some(out), false) => Box::new(FfmpegMuxer::new(FfmpegMuxerOpts::new(out))?),
        _ => {
            let (backend, mux_log) = InMemoryMuxer::new();
            log = Some(mux_log);
            Box::new(backend)
        }
    };

    let clock = SystemClock::shared();
    let options = SessionOptions {
        decoder: config.decoder.clone(),
        ..SessionOptions::default()
    };
    let (session, events) = ExportSession::for_case(
        &case,
        &config.composition(),
        Canvas::new(320, 180)?,
        clock,
        options,
    )?;
    let (commands, rx) = mpsc::channel();
    let render = session.spawn(rx, PASS_INTERVAL)?;

    let out_path = if args.dry_run { None } else { args.out.clone() };
    let target = ExportTarget {
        settings,
        codecs: Arc::new(PassthroughCodecFactory::default()),
        backend,
        release_poll: Duration::from_millis(50),
    };
    commands
        .send(RenderCommand::Export(ExportRequest { target, out_path }))
        .map_err(|_| anyhow::anyhow!("render thread exited early"))?;

    let mut success = false;
    for event in events.iter() {
        match event {
            SessionEvent::ExportStarted { width, height } => {
                eprintln!("exporting case {} at {width}x{height}", case.number);
            }
            SessionEvent::TrackActive(track) => tracing::info!(track, "track active"),
            SessionEvent::TrackInactive(track) => tracing::info!(track, "track inactive"),
            SessionEvent::Error { origin, error } => eprintln!("{origin}: {error}"),
            SessionEvent::ExportFinished {
                out_path,
                success: ok,
            } => {
                success = ok;
                if let Some(path) = out_path.filter(|_| ok) {
                    eprintln!("wrote {}", path.display());
                }
                break;
            }
            _ => {}
        }
    }
    let _ = commands.send(RenderCommand::Stop);
    if render.join().is_err() {
        anyhow::bail!("render thread panicked");
    }

    if let Some(log) = log {
        print_mux_summary(&log);
    }
    if !success {
        anyhow::bail!("export of case {} failed", case.number);
    }
    Ok(())
}

fn print_mux_summary(log: &MuxLog) {
    let Ok(events) = log.lock() else {
        return;
    };
    let mut tracks = 0usize;
    let mut samples = [0usize; 2];
    let mut bytes = [0usize; 2];
    let mut last_pts = [0i64; 2];
    for event in events.iter() {
        match event {
            MuxEvent::TrackAdded { .. } => tracks += 1,
            MuxEvent::Sample { track, pts_us, len } if *track < 2 => {
                samples[*track] += 1;
                bytes[*track] += len;
                last_pts[*track] = *pts_us;
            }
            _ => {}
        }
    }
    println!("tracks: {tracks}");
    for track in 0..tracks.min(2) {
        println!(
            "track {track}: {} samples, {} bytes, last pts {} us",
            samples[track], bytes[track], last_pts[track]
        );
    }
}

fn sprites_for(
    case: &TestCase,
    composition: &CompositionConfig,
    proxy_divisor: u32,
    clock: &ManualClock,
) -> anyhow::Result<Vec<Sprite>> {
    case.tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let params = composition.params(track.effect)?.clone();
            let player = SyntheticPlayer::new(i, track.clip, proxy_divisor, clock.shared())?;
            Ok(Sprite::new(params, Box::new(player)))
        })
        .collect()
}

fn cmd_frame(args: FrameArgs, config: &AppConfig) -> anyhow::Result<()> {
    let case = cases::find(args.case)?;
    let clock = ManualClock::starting_at_ms(1);
    let sprites = sprites_for(
        &case,
        &config.composition(),
        config.decoder.proxy_divisor,
        &clock,
    )?;
    let (events, _rx) = mpsc::channel();
    let mut compositor = Compositor::new(sprites, args.size.canvas()?, clock.shared(), events);
    compositor.seek(args.at_ms);
    compositor.render();

    write_png(
        &args.out,
        compositor.preview().data(),
        compositor.preview().width(),
        compositor.preview().height(),
    )?;
    compositor.release();
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn write_png(path: &Path, data: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        data,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}

fn cmd_cases(config: &AppConfig) -> anyhow::Result<()> {
    let composition = config.composition();
    for case in cases::builtin() {
        let tracks: Vec<String> = case
            .tracks
            .iter()
            .map(|t| format!("{}:effect{}", t.clip.label(), t.effect.number()))
            .collect();
        let heaviest = case.heaviest_track(|effect| {
            composition
                .params(effect)
                .map_or(1.0, |p| p.play_speed())
        });
        println!(
            "case {:>2}: {} (heaviest track {})",
            case.number,
            tracks.join(", "),
            heaviest.map_or_else(|| "-".to_owned(), |i| i.to_string())
        );
    }
    Ok(())
}
