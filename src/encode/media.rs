use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::encoder::{AudioEncoder, AudioEncoderSetup, AudioTap};
use crate::config::EncoderSettings;
use crate::config::effects::TrackParams;
use crate::encode::codec::CodecFactory;
use crate::encode::muxer::{Muxer, MuxerBackend};
use crate::encode::video::{EncoderFrameData, VideoEncoder, VideoEncoderSetup};
use crate::foundation::clock::SharedClock;
use crate::foundation::core::Canvas;
use crate::foundation::error::{MontageError, MontageResult};
use crate::session::SessionEvent;

/// Polls made for both encoders to finish before the muxer is released anyway.
pub const RELEASE_POLLS: u32 = 10;
pub const DEFAULT_RELEASE_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    VideoAndAudio,
    OnlyVideo,
}

impl MediaType {
    pub fn track_count(self) -> usize {
        match self {
            MediaType::VideoAndAudio => 2,
            MediaType::OnlyVideo => 1,
        }
    }
}

pub struct MediaEncoderSetup {
    pub settings: EncoderSettings,
    pub tracks: Vec<TrackParams>,
    pub codecs: Arc<dyn CodecFactory>,
    pub backend: Box<dyn MuxerBackend>,
    pub clock: SharedClock,
    pub events: Sender<SessionEvent>,
    pub release_poll: Duration,
}

/// One export: a video encoder, an optional audio encoder and the muxer they share.
pub struct MediaEncoder {
    media_type: MediaType,
    muxer: Muxer,
    video: VideoEncoder,
    audio: Option<AudioEncoder>,
    track_count: usize,
    release_poll: Duration,
    events: Sender<SessionEvent>,
}

impl std::fmt::Debug for MediaEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaEncoder")
            .field("media_type", &self.media_type)
            .field("muxer", &self.muxer)
            .finish_non_exhaustive()
    }
}

impl MediaEncoder {
    pub fn start(setup: MediaEncoderSetup) -> MontageResult<Self> {
        let media_type = if setup.settings.with_audio {
            MediaType::VideoAndAudio
        } else {
            MediaType::OnlyVideo
        };
        let muxer = Muxer::new(setup.backend, media_type.track_count())?;
        let track_count = setup.tracks.len();

        let video = VideoEncoder::start(VideoEncoderSetup {
            settings: setup.settings.clone(),
            tracks: setup.tracks.clone(),
            codecs: setup.codecs.clone(),
            muxer: muxer.clone(),
            clock: setup.clock.clone(),
            events: setup.events.clone(),
        })?;
        let audio = match media_type {
            MediaType::VideoAndAudio => Some(AudioEncoder::start(AudioEncoderSetup {
                tracks: setup.tracks,
                mix_lane: setup.settings.mix_lane,
                codecs: setup.codecs,
                muxer: muxer.clone(),
                clock: setup.clock,
                events: setup.events.clone(),
            })?),
            MediaType::OnlyVideo => None,
        };
        tracing::info!(
            ?media_type,
            width = setup.settings.resolution.width,
            height = setup.settings.resolution.height,
            codec = setup.settings.codec.mime_type(),
            "media encoder started"
        );
        Ok(Self {
            media_type,
            muxer,
            video,
            audio,
            track_count,
            release_poll: setup.release_poll,
            events: setup.events,
        })
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Observer forwarding decoder PCM into the mix, `None` for video-only exports.
    pub fn audio_tap(&self) -> Option<Arc<AudioTap>> {
        self.audio.as_ref().map(|a| a.tap(self.track_count))
    }

    pub fn notify_start_track(&self, track: usize) {
        if let Some(audio) = &self.audio {
            audio.notify_track_started(track);
        }
    }

    pub fn notify_pause_track(&self, track: usize) {
        if let Some(audio) = &self.audio {
            audio.notify_track_paused(track);
        }
    }

    pub fn frame_available(&self, data: EncoderFrameData) {
        self.video.frame_available(data);
    }

    pub fn update_canvas(&self, canvas: Canvas) {
        self.video.update_canvas(canvas);
    }

    /// Stop both encoders and release the muxer once they are done.
    ///
    /// Release happens on a helper thread: after both encoders report idle, or after
    /// [`RELEASE_POLLS`] polls regardless. [`SessionEvent::EncoderStopped`] follows it.
    pub fn stop(self) -> MontageResult<JoinHandle<()>> {
        self.video.stop();
        if let Some(audio) = &self.audio {
            audio.stop();
        }
        std::thread::Builder::new()
            .name("muxer-release".to_owned())
            .spawn(move || self.release())
            .map_err(|e| MontageError::export(format!("failed to spawn muxer release: {e}")))
    }

    fn encoders_idle(&self) -> bool {
        !self.video.is_recording() && self.audio.as_ref().is_none_or(|a| !a.is_recording())
    }

    fn release(mut self) {
        let mut released = false;
        for _ in 0..RELEASE_POLLS {
            std::thread::sleep(self.release_poll);
            if self.encoders_idle() {
                if let Err(error) = self.muxer.release() {
                    self.report(error);
                }
                released = true;
                break;
            }
        }
        if !released {
            tracing::warn!("encoders still running, forcing muxer release");
            if let Err(error) = self.muxer.release() {
                self.report(error);
            }
        }
        if self.encoders_idle() {
            self.video.join();
            if let Some(audio) = self.audio.as_mut() {
                audio.join();
            }
        }
        tracing::info!("media encoder stopped");
        let _ = self.events.send(SessionEvent::EncoderStopped);
    }

    fn report(&self, error: MontageError) {
        tracing::error!("muxer release: {error}");
        let _ = self.events.send(SessionEvent::Error {
            origin: "muxer",
            error,
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/media.rs"]
mod tests;
