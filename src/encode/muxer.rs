use std::sync::{Arc, Mutex, MutexGuard};

use crate::encode::codec::TrackFormat;
use crate::foundation::error::{MontageError, MontageResult};

/// Container writer. Track indices are handed out in registration order.
pub trait MuxerBackend: Send {
    fn add_track(&mut self, format: &TrackFormat) -> MontageResult<usize>;
    fn start(&mut self) -> MontageResult<()>;
    fn write_sample(&mut self, track: usize, data: &[u8], pts_us: i64, key_frame: bool)
    -> MontageResult<()>;
    fn stop(&mut self) -> MontageResult<()>;
}

struct MuxerState {
    backend: Box<dyn MuxerBackend>,
    expected_tracks: usize,
    registered: usize,
    started: bool,
    released: bool,
}

/// Container writer shared by the video and audio encoders.
///
/// Starts by itself once every expected track is registered; samples are only accepted after
/// that point.
#[derive(Clone)]
pub struct Muxer {
    inner: Arc<Mutex<MuxerState>>,
}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer").finish_non_exhaustive()
    }
}

impl Muxer {
    pub fn new(backend: Box<dyn MuxerBackend>, expected_tracks: usize) -> MontageResult<Self> {
        if expected_tracks == 0 {
            return Err(MontageError::setup("muxer needs at least one track"));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(MuxerState {
                backend,
                expected_tracks,
                registered: 0,
                started: false,
                released: false,
            })),
        })
    }

    fn lock(&self) -> MontageResult<MutexGuard<'_, MuxerState>> {
        self.inner
            .lock()
            .map_err(|_| MontageError::mux("muxer lock poisoned"))
    }

    pub fn is_started(&self) -> bool {
        self.lock().map(|s| s.started).unwrap_or(false)
    }

    /// Register a track; the call that completes the set starts the container.
    pub fn add_track(&self, format: &TrackFormat) -> MontageResult<usize> {
        let mut state = self.lock()?;
        if state.started {
            return Err(MontageError::mux("track added after the muxer started"));
        }
        if state.released {
            return Err(MontageError::mux("muxer already released"));
        }
        let index = state.backend.add_track(format)?;
        state.registered += 1;
        tracing::debug!(index, registered = state.registered, "muxer track added");
        if state.registered == state.expected_tracks {
            state.backend.start()?;
            state.started = true;
            tracing::info!(tracks = state.registered, "muxer started");
        }
        Ok(index)
    }

    pub fn write_sample(
        &self,
        track: usize,
        data: &[u8],
        pts_us: i64,
        key_frame: bool,
    ) -> MontageResult<()> {
        let mut state = self.lock()?;
        if !state.started || state.released {
            return Err(MontageError::mux("sample written while the muxer is not running"));
        }
        state.backend.write_sample(track, data, pts_us, key_frame)
    }

    /// Stop the container if it ever started. Further calls do nothing.
    pub fn release(&self) -> MontageResult<()> {
        let mut state = self.lock()?;
        if state.released {
            return Ok(());
        }
        state.released = true;
        if state.started {
            state.started = false;
            state.backend.stop()?;
            tracing::info!("muxer stopped");
        }
        Ok(())
    }
}

/// Everything an [`InMemoryMuxer`] saw, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum MuxEvent {
    TrackAdded { index: usize, video: bool },
    Started,
    Sample { track: usize, pts_us: i64, len: usize },
    Stopped,
}

pub type MuxLog = Arc<Mutex<Vec<MuxEvent>>>;

/// Backend that records calls instead of writing a file.
#[derive(Debug)]
pub struct InMemoryMuxer {
    log: MuxLog,
    tracks: usize,
}

impl InMemoryMuxer {
    pub fn new() -> (Self, MuxLog) {
        let log: MuxLog = Arc::default();
        (
            Self {
                log: log.clone(),
                tracks: 0,
            },
            log,
        )
    }

    fn record(&self, event: MuxEvent) -> MontageResult<()> {
        self.log
            .lock()
            .map_err(|_| MontageError::mux("mux log lock poisoned"))?
            .push(event);
        Ok(())
    }
}

impl MuxerBackend for InMemoryMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> MontageResult<usize> {
        let index = self.tracks;
        self.tracks += 1;
        self.record(MuxEvent::TrackAdded {
            index,
            video: format.is_video(),
        })?;
        Ok(index)
    }

    fn start(&mut self) -> MontageResult<()> {
        self.record(MuxEvent::Started)
    }

    fn write_sample(
        &mut self,
        track: usize,
        data: &[u8],
        pts_us: i64,
        _key_frame: bool,
    ) -> MontageResult<()> {
        if track >= self.tracks {
            return Err(MontageError::mux(format!("unknown track {track}")));
        }
        self.record(MuxEvent::Sample {
            track,
            pts_us,
            len: data.len(),
        })
    }

    fn stop(&mut self) -> MontageResult<()> {
        self.record(MuxEvent::Stopped)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/muxer.rs"]
mod tests;
