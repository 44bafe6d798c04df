use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::DecoderSettings;
use crate::config::cases::TestCase;
use crate::config::effects::CompositionConfig;
use crate::foundation::clock::SharedClock;
use crate::foundation::core::{COMPOSITION_DURATION_MS, Canvas};
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::supervisor::{ReadinessSupervisor, Verdict};
use crate::player::synthetic::SyntheticPlayer;
use crate::player::PlayerEvent;
use crate::render::compositor::{Compositor, PassReport};
use crate::render::sprite::{PlayerState, Sprite};
use crate::session::{ExportRequest, RenderCommand, SessionEvent};

/// Grace period for a stopping export when the session itself is shut down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub decoder: DecoderSettings,
    pub duration_ms: i64,
    /// Clock interval between end-of-timeline checks.
    pub watchdog_interval_ms: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            decoder: DecoderSettings::default(),
            duration_ms: COMPOSITION_DURATION_MS,
            watchdog_interval_ms: 50,
        }
    }
}

#[derive(Debug)]
struct ActiveExport {
    out_path: Option<PathBuf>,
    failed: bool,
    /// The encoder was asked to stop and its release is pending.
    stopping: bool,
}

/// Owns the compositor and everything that reacts to it on the control thread.
pub struct ExportSession {
    compositor: Compositor,
    supervisor: ReadinessSupervisor,
    clock: SharedClock,
    options: SessionOptions,
    internal: Receiver<SessionEvent>,
    outbound: Sender<SessionEvent>,
    last_watchdog_ms: i64,
    export: Option<ActiveExport>,
}

impl ExportSession {
    pub fn new(
        sprites: Vec<Sprite>,
        preview: Canvas,
        clock: SharedClock,
        options: SessionOptions,
    ) -> (Self, Receiver<SessionEvent>) {
        let (internal_tx, internal) = mpsc::channel();
        let (outbound, outbound_rx) = mpsc::channel();
        let compositor = Compositor::new(sprites, preview, clock.clone(), internal_tx);
        let last_watchdog_ms = clock.now_ms();
        let session = Self {
            compositor,
            supervisor: ReadinessSupervisor::new(&options.decoder),
            clock,
            options,
            internal,
            outbound,
            last_watchdog_ms,
            export: None,
        };
        (session, outbound_rx)
    }

    /// Session over synthetic decoders for a reference line-up.
    pub fn for_case(
        case: &TestCase,
        composition: &CompositionConfig,
        preview: Canvas,
        clock: SharedClock,
        options: SessionOptions,
    ) -> MontageResult<(Self, Receiver<SessionEvent>)> {
        let mut sprites = Vec::with_capacity(case.tracks.len());
        for (i, track) in case.tracks.iter().enumerate() {
            let params = composition.params(track.effect)?.clone();
            let player = SyntheticPlayer::new(
                i,
                track.clip,
                options.decoder.proxy_divisor,
                clock.clone(),
            )?;
            sprites.push(Sprite::new(params, Box::new(player)));
        }
        Ok(Self::new(sprites, preview, clock, options))
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn is_exporting(&self) -> bool {
        self.export.is_some()
    }

    fn emit(&self, event: SessionEvent) {
        if self.outbound.send(event).is_err() {
            tracing::debug!("session event receiver dropped");
        }
    }

    /// Apply one command. Returns `false` once the session should shut down.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn handle(&mut self, command: RenderCommand) -> bool {
        match command {
            RenderCommand::Play => {
                if self.compositor.time_position_ms() >= self.options.duration_ms {
                    self.compositor.set_begin_time_position();
                }
                self.compositor.play();
            }
            RenderCommand::Pause => {
                if self.compositor.pause() {
                    self.mark_stopping();
                } else {
                    self.finish_export();
                }
            }
            RenderCommand::Seek(t_ms) => {
                self.compositor
                    .seek(t_ms.clamp(0, self.options.duration_ms));
            }
            RenderCommand::Export(request) => self.start_export(request),
            RenderCommand::SetOpacity { track, alpha } => self.compositor.set_opacity(track, alpha),
            RenderCommand::ResizePreview(canvas) => self.compositor.resize_preview(canvas),
            RenderCommand::Stop => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn start_export(&mut self, request: ExportRequest) {
        if self.export.is_some() {
            tracing::warn!("export already running");
            return;
        }
        if !self.supervisor.all_ready() {
            let track = self.supervisor.not_ready().iter().next().copied().unwrap_or(0);
            self.emit(SessionEvent::Error {
                origin: "session",
                error: MontageError::Decoder {
                    track,
                    attempts: self.supervisor.attempts(),
                },
            });
            return;
        }
        tracing::info!(out = ?request.out_path, "export requested");
        self.supervisor.reset();
        self.compositor.set_begin_time_position();
        self.compositor.export(request.target);
        self.export = Some(ActiveExport {
            out_path: request.out_path,
            failed: false,
            stopping: false,
        });
    }

    fn mark_stopping(&mut self) {
        if let Some(export) = self.export.as_mut() {
            export.stopping = true;
        }
    }

    /// Stop a running export. `failed` marks the output for removal.
    fn stop_export(&mut self, failed: bool) {
        let Some(export) = self.export.as_mut() else {
            return;
        };
        export.failed |= failed;
        if export.stopping {
            return;
        }
        if self.compositor.pause() {
            self.mark_stopping();
        } else {
            self.finish_export();
        }
    }

    fn finish_export(&mut self) {
        let Some(export) = self.export.take() else {
            return;
        };
        if export.failed
            && let Some(path) = export.out_path.as_ref()
            && path.exists()
        {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!("removed partial export '{}'", path.display()),
                Err(e) => tracing::warn!("failed to remove '{}': {e}", path.display()),
            }
        }
        tracing::info!(success = !export.failed, "export finished");
        self.emit(SessionEvent::ExportFinished {
            out_path: export.out_path,
            success: !export.failed,
        });
    }

    fn on_internal(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Error { origin, error } => {
                tracing::error!(origin, "{error}");
                let fatal = error.is_fatal();
                self.emit(SessionEvent::Error { origin, error });
                if fatal {
                    self.stop_export(true);
                }
            }
            SessionEvent::ExportComplete => {
                self.emit(SessionEvent::ExportComplete);
                self.stop_export(false);
            }
            SessionEvent::EncoderStopped => {
                self.emit(SessionEvent::EncoderStopped);
                self.finish_export();
            }
            other => self.emit(other),
        }
    }

    fn supervise_players(&mut self, now_ms: i64) {
        let exporting = self.export.is_some();
        let mut events: Vec<(usize, PlayerEvent)> = Vec::new();
        for (i, sprite) in self.compositor.sprites_mut().iter_mut().enumerate() {
            while let Some(event) = sprite.player_mut().poll_event() {
                events.push((i, event));
            }
        }
        for (track, event) in events {
            match self.supervisor.observe(track, &event, exporting, now_ms) {
                Verdict::Fine | Verdict::Retrying(_) => {}
                Verdict::TrackFailed(error) => self.emit(SessionEvent::Error {
                    origin: "decoder",
                    error,
                }),
                Verdict::AbortExport(error) => {
                    self.emit(SessionEvent::Error {
                        origin: "decoder",
                        error,
                    });
                    self.stop_export(true);
                }
            }
        }

        let sprites = self.compositor.sprites_mut();
        let retried = self.supervisor.poll(now_ms, |track| match sprites.get_mut(track) {
            Some(sprite) => sprite.player_mut().retry(),
            None => Err(MontageError::validation(format!("no track {track}"))),
        });
        if let Err(error) = retried {
            self.emit(SessionEvent::Error {
                origin: "decoder",
                error,
            });
        }
    }

    fn watchdog(&mut self, now_ms: i64) {
        if now_ms - self.last_watchdog_ms < self.options.watchdog_interval_ms {
            return;
        }
        self.last_watchdog_ms = now_ms;
        if self.compositor.time_position_ms() < self.options.duration_ms {
            return;
        }
        let running = self
            .compositor
            .sprites()
            .first()
            .is_some_and(|s| matches!(s.state(), PlayerState::Play | PlayerState::Export));
        if !running {
            return;
        }
        tracing::debug!("end of timeline");
        if self.export.is_some() {
            self.stop_export(false);
        } else {
            self.compositor.pause();
        }
        self.emit(SessionEvent::TimelineEnded);
    }

    /// One iteration of the render loop.
    pub fn tick(&mut self) -> PassReport {
        while let Ok(event) = self.internal.try_recv() {
            self.on_internal(event);
        }
        let now_ms = self.clock.now_ms();
        self.supervise_players(now_ms);
        let report = self.compositor.render();
        self.watchdog(now_ms);
        report
    }

    fn shutdown(&mut self) {
        if self.compositor.pause() {
            self.mark_stopping();
        }
        self.compositor.release();
        if self.export.as_ref().is_some_and(|e| e.stopping) {
            loop {
                match self.internal.recv_timeout(SHUTDOWN_GRACE) {
                    Ok(event) => {
                        self.on_internal(event);
                        if self.export.is_none() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                        tracing::warn!("export did not finish before shutdown");
                        break;
                    }
                }
            }
        }
        self.finish_export();
        self.emit(SessionEvent::Stopped);
    }

    /// Drive the session until [`RenderCommand::Stop`] or until `commands` disconnects.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn run(mut self, commands: Receiver<RenderCommand>, pass_interval: Duration) {
        loop {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.shutdown();
                        return;
                    }
                }
            }
            self.tick();
            std::thread::sleep(pass_interval);
        }
    }

    /// Run the session on its own `render` thread.
    pub fn spawn(
        self,
        commands: Receiver<RenderCommand>,
        pass_interval: Duration,
    ) -> MontageResult<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("render".to_owned())
            .spawn(move || self.run(commands, pass_interval))
            .map_err(|e| MontageError::setup(format!("failed to spawn render thread: {e}")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/export.rs"]
mod tests;
