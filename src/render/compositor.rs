use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::config::EncoderSettings;
use crate::encode::codec::CodecFactory;
use crate::encode::media::{MediaEncoder, MediaEncoderSetup};
use crate::encode::muxer::MuxerBackend;
use crate::encode::video::{EncoderFrameData, SpriteTrackData};
use crate::foundation::clock::SharedClock;
use crate::foundation::core::Canvas;
use crate::player::AudioObserver;
use crate::render::sprite::{PlayerState, Sprite, TrackActivity};
use crate::render::surface::Surface;
use crate::session::SessionEvent;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordingStatus {
    #[default]
    Off,
    On,
    /// Recording survived a render target change and the encoder needs the new canvas.
    Resumed,
}

/// Where and how an export is encoded.
pub struct ExportTarget {
    pub settings: EncoderSettings,
    pub codecs: Arc<dyn CodecFactory>,
    pub backend: Box<dyn MuxerBackend>,
    pub release_poll: Duration,
}

impl std::fmt::Debug for ExportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTarget")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// What a draw pass did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassReport {
    pub drawn: usize,
    pub encoding: bool,
    /// Every track finished its export slot during this pass.
    pub export_complete: bool,
}

/// Draws the sprites every pass and, while recording, hands snapshots to the encoder.
pub struct Compositor {
    sprites: Vec<Sprite>,
    clock: SharedClock,
    preview: Surface,
    opacity: Vec<f32>,
    recording_enabled: bool,
    status: RecordingStatus,
    target: Option<ExportTarget>,
    export_canvas: Option<Canvas>,
    speed_factor: f64,
    encoder: Option<MediaEncoder>,
    played: BTreeSet<usize>,
    events: Sender<SessionEvent>,
}

impl Compositor {
    pub fn new(
        mut sprites: Vec<Sprite>,
        preview: Canvas,
        clock: SharedClock,
        events: Sender<SessionEvent>,
    ) -> Self {
        for sprite in &mut sprites {
            sprite.pause();
            sprite.set_play_when_ready(false);
        }
        let opacity = vec![1.0; sprites.len()];
        Self {
            sprites,
            clock,
            preview: Surface::new(preview),
            opacity,
            recording_enabled: false,
            status: RecordingStatus::Off,
            target: None,
            export_canvas: None,
            speed_factor: EncoderSettings::default().speed_factor,
            encoder: None,
            played: BTreeSet::new(),
            events,
        }
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn sprites_mut(&mut self) -> &mut [Sprite] {
        &mut self.sprites
    }

    pub fn preview(&self) -> &Surface {
        &self.preview
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn is_exporting(&self) -> bool {
        self.recording_enabled || self.status != RecordingStatus::Off
    }

    /// Composition position of the first track.
    pub fn time_position_ms(&self) -> i64 {
        self.sprites.first().map_or(0, Sprite::time_position_ms)
    }

    pub fn set_opacity(&mut self, track: usize, alpha: f32) {
        match self.opacity.get_mut(track) {
            Some(slot) => *slot = alpha.clamp(0.0, 1.0),
            None => tracing::warn!(track, "opacity for unknown track"),
        }
    }

    pub fn play(&mut self) {
        let now = self.clock.now_ms();
        for sprite in &mut self.sprites {
            sprite.play(now);
        }
    }

    /// Stop playback, ending any export in progress.
    ///
    /// Returns whether an encoder was stopped; its release is reported later as
    /// [`SessionEvent::EncoderStopped`].
    pub fn pause(&mut self) -> bool {
        self.recording_enabled = false;
        self.target = None;
        let stopping = self.stop_encoder();
        for sprite in &mut self.sprites {
            sprite.pause();
        }
        stopping
    }

    pub fn seek(&mut self, t_ms: i64) {
        for sprite in &mut self.sprites {
            sprite.seek(t_ms);
        }
    }

    pub fn set_begin_time_position(&mut self) {
        self.seek(0);
    }

    /// Arm an export; the encoder starts on the next draw pass.
    pub fn export(&mut self, target: ExportTarget) {
        self.speed_factor = target.settings.speed_factor;
        self.target = Some(target);
        self.recording_enabled = true;
        self.played.clear();
        let now = self.clock.now_ms();
        for sprite in &mut self.sprites {
            sprite.export(now, self.speed_factor);
        }
    }

    /// Replace the preview target. A running export picks the change up on the next pass.
    pub fn resize_preview(&mut self, canvas: Canvas) {
        self.preview = Surface::new(canvas);
        if self.status == RecordingStatus::On {
            self.status = RecordingStatus::Resumed;
        }
    }

    /// One pass of the render loop.
    pub fn render(&mut self) -> PassReport {
        self.preview.clear([0, 0, 0, 255]);
        let mut report = PassReport::default();
        if self.sprites.is_empty() {
            return report;
        }

        if self.recording_enabled {
            match self.status {
                RecordingStatus::Off => self.start_encoder(),
                RecordingStatus::Resumed => {
                    if let (Some(encoder), Some(canvas)) = (&self.encoder, self.export_canvas) {
                        encoder.update_canvas(canvas);
                    }
                    self.status = RecordingStatus::On;
                }
                RecordingStatus::On => {
                    if let Some(encoder) = &self.encoder {
                        encoder.frame_available(self.snapshot());
                    }
                    report.encoding = true;
                    report.export_complete = self.draw_sprites(&mut report.drawn);
                }
            }
        } else {
            self.draw_sprites(&mut report.drawn);
            self.stop_encoder();
        }
        report
    }

    fn snapshot(&self) -> EncoderFrameData {
        let now_ms = self.clock.now_ms();
        let start = self.sprites[0].system_start_ms();
        EncoderFrameData {
            composition_time_ms: (self.speed_factor * (now_ms - start) as f64) as i64,
            timestamp_ns: self.clock.now_ns(),
            sprites: self
                .sprites
                .iter()
                .zip(&self.opacity)
                .map(|(s, &alpha)| SpriteTrackData {
                    play_when_ready: s.play_when_ready(),
                    geometry: s.geometry(),
                    frame: s.frame().cloned(),
                    alpha,
                })
                .collect(),
        }
    }

    /// Update every sprite and draw the visible ones to the preview.
    ///
    /// Returns whether the last export slot finished in this pass.
    fn draw_sprites(&mut self, drawn: &mut usize) -> bool {
        let now = self.clock.now_ms();
        let mut complete = false;
        for i in 0..self.sprites.len() {
            let update = self.sprites[i].update(now);
            for activity in update.activity {
                complete |= self.on_activity(activity);
            }
            let Some(mut effect) = update.effect else {
                continue;
            };
            let sprite = &self.sprites[i];
            if sprite.state() == PlayerState::Export {
                continue;
            }
            if let Some(frame) = sprite.frame() {
                effect.opacity *= self.opacity[i];
                self.preview.draw_sprite(frame, &effect);
                *drawn += 1;
            }
        }
        complete
    }

    fn on_activity(&mut self, activity: TrackActivity) -> bool {
        match activity {
            TrackActivity::Started(track) => {
                if let Some(encoder) = &self.encoder {
                    encoder.notify_start_track(track);
                }
                let _ = self.events.send(SessionEvent::TrackActive(track));
                false
            }
            TrackActivity::Finished(track) => {
                self.played.insert(track);
                let _ = self.events.send(SessionEvent::TrackInactive(track));
                if self.played.len() < self.sprites.len() {
                    if let Some(encoder) = &self.encoder {
                        encoder.notify_pause_track(track);
                    }
                    false
                } else {
                    let _ = self.events.send(SessionEvent::ExportComplete);
                    true
                }
            }
        }
    }

    fn start_encoder(&mut self) {
        let Some(target) = self.target.take() else {
            self.recording_enabled = false;
            return;
        };
        let resolution = target.settings.resolution;
        let setup = MediaEncoderSetup {
            settings: target.settings,
            tracks: self.sprites.iter().map(|s| s.params().clone()).collect(),
            codecs: target.codecs,
            backend: target.backend,
            clock: self.clock.clone(),
            events: self.events.clone(),
            release_poll: target.release_poll,
        };
        match MediaEncoder::start(setup) {
            Ok(encoder) => {
                let tap = encoder
                    .audio_tap()
                    .map(|tap| tap as Arc<dyn AudioObserver>);
                for sprite in &mut self.sprites {
                    sprite.player_mut().set_audio_observer(tap.clone());
                }
                self.encoder = Some(encoder);
                self.export_canvas = resolution.canvas().ok();
                self.status = RecordingStatus::On;
                let _ = self.events.send(SessionEvent::ExportStarted {
                    width: resolution.width,
                    height: resolution.height,
                });
            }
            Err(error) => {
                tracing::error!("failed to start export: {error}");
                self.recording_enabled = false;
                let _ = self.events.send(SessionEvent::Error {
                    origin: "compositor",
                    error,
                });
            }
        }
    }

    fn stop_encoder(&mut self) -> bool {
        if self.status == RecordingStatus::Off {
            return false;
        }
        self.status = RecordingStatus::Off;
        for sprite in &mut self.sprites {
            sprite.player_mut().set_audio_observer(None);
        }
        self.target = None;
        self.export_canvas = None;
        let Some(encoder) = self.encoder.take() else {
            return false;
        };
        match encoder.stop() {
            Ok(_release) => true,
            Err(error) => {
                let _ = self.events.send(SessionEvent::Error {
                    origin: "compositor",
                    error,
                });
                false
            }
        }
    }

    pub fn release(&mut self) {
        let _ = self.pause();
        for sprite in &mut self.sprites {
            sprite.release();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
