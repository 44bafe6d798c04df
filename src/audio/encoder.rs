use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::audio::buffer_pool::{AudioBuffer, AudioBufferPool};
use crate::audio::mixer::{BUFFER_DURATION_US, MixInput, mix_block};
use crate::config::effects::TrackParams;
use crate::config::{
    AUDIO_BIT_RATE, AUDIO_BUFFER_SIZE, AUDIO_CHANNEL_COUNT, AUDIO_SAMPLE_RATE_HZ, MixLane,
};
use crate::encode::codec::{CodecFactory, EncoderCodec, TrackFormat};
use crate::encode::drain::{DrainState, queue_input_with_retry};
use crate::encode::muxer::Muxer;
use crate::encode::worker::{WorkerGate, spawn_worker};
use crate::foundation::clock::SharedClock;
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::{AudioObserver, PcmChunk};
use crate::session::SessionEvent;

/// Format of the mixed track.
pub fn audio_track_format() -> TrackFormat {
    TrackFormat::Audio {
        sample_rate_hz: AUDIO_SAMPLE_RATE_HZ,
        channel_count: AUDIO_CHANNEL_COUNT,
        bit_rate: AUDIO_BIT_RATE,
    }
}

#[derive(Debug)]
pub enum AudioMessage {
    Start,
    Stop,
    BufferAvailable {
        track: usize,
        chunk: PcmChunk,
        timestamp_ns: i64,
    },
    TrackStarted(usize),
    TrackPaused(usize),
    Quit,
}

/// Everything the audio worker needs for one session.
pub struct AudioEncoderSetup {
    pub tracks: Vec<TrackParams>,
    pub mix_lane: MixLane,
    pub codecs: Arc<dyn CodecFactory>,
    pub muxer: Muxer,
    pub clock: SharedClock,
    pub events: Sender<SessionEvent>,
}

/// Mixes the tracks' PCM into one stream and feeds it to an audio codec on a worker thread.
pub struct AudioEncoder {
    tx: Sender<AudioMessage>,
    gate: Arc<WorkerGate>,
    accepting: Arc<AtomicBool>,
    clock: SharedClock,
    handle: Option<JoinHandle<()>>,
}

impl AudioEncoder {
    /// Spawn the worker and queue the start message.
    pub fn start(setup: AudioEncoderSetup) -> MontageResult<Self> {
        let (tx, rx) = mpsc::channel();
        let accepting = Arc::new(AtomicBool::new(false));
        let clock = setup.clock.clone();
        let mut worker = AudioWorker::new(setup, accepting.clone());
        let (gate, handle) = spawn_worker("audio-encoder", move || worker.run(rx))?;
        tx.send(AudioMessage::Start)
            .map_err(|_| MontageError::setup("audio encoder exited before start"))?;
        Ok(Self {
            tx,
            gate,
            accepting,
            clock,
            handle: Some(handle),
        })
    }

    /// Observer to install on every track's player.
    pub fn tap(&self, track_count: usize) -> Arc<AudioTap> {
        Arc::new(AudioTap {
            tx: self.tx.clone(),
            accepting: self.accepting.clone(),
            clock: self.clock.clone(),
            last_stamp: (0..track_count).map(|_| AtomicI64::new(i64::MIN)).collect(),
        })
    }

    pub fn notify_track_started(&self, track: usize) {
        self.post(AudioMessage::TrackStarted(track));
    }

    pub fn notify_track_paused(&self, track: usize) {
        self.post(AudioMessage::TrackPaused(track));
    }

    /// Queue stop and quit behind any pending buffers.
    pub fn stop(&self) {
        self.post(AudioMessage::Stop);
        self.post(AudioMessage::Quit);
    }

    pub fn is_recording(&self) -> bool {
        self.gate.is_running()
    }

    /// The worker has a running codec and takes PCM from the tap.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("audio encoder thread panicked");
        }
    }

    fn post(&self, msg: AudioMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("audio encoder already exited");
        }
    }
}

impl Drop for AudioEncoder {
    /// Asks a still-attached worker to finish; the thread is left to exit on its own.
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// Forwards decoder PCM to the audio worker, stamped with the session clock.
pub struct AudioTap {
    tx: Sender<AudioMessage>,
    accepting: Arc<AtomicBool>,
    clock: SharedClock,
    /// Per-track stamps stay strictly increasing even when chunks share a clock reading.
    last_stamp: Vec<AtomicI64>,
}

impl AudioObserver for AudioTap {
    fn on_audio(&self, track: usize, chunk: PcmChunk) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        let Some(last) = self.last_stamp.get(track) else {
            tracing::warn!(track, "audio from unknown track");
            return;
        };
        let now = self.clock.now_ns();
        let prev = last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(now.max(prev.saturating_add(1)))
            })
            .unwrap_or(i64::MIN);
        let timestamp_ns = now.max(prev.saturating_add(1));
        let _ = self.tx.send(AudioMessage::BufferAvailable {
            track,
            chunk,
            timestamp_ns,
        });
    }
}

struct AudioWorker {
    tracks: Vec<TrackParams>,
    lane: MixLane,
    codecs: Arc<dyn CodecFactory>,
    muxer: Muxer,
    clock: SharedClock,
    events: Sender<SessionEvent>,
    accepting: Arc<AtomicBool>,

    codec: Option<Box<dyn EncoderCodec>>,
    drain: DrainState,
    pools: Vec<AudioBufferPool>,
    active: BTreeSet<usize>,
    frame_count: i64,
    start_ns: i64,
    start_shift_us: i64,
}

impl AudioWorker {
    fn new(setup: AudioEncoderSetup, accepting: Arc<AtomicBool>) -> Self {
        Self {
            tracks: setup.tracks,
            lane: setup.mix_lane,
            codecs: setup.codecs,
            muxer: setup.muxer,
            clock: setup.clock,
            events: setup.events,
            accepting,
            codec: None,
            drain: DrainState::new("audio"),
            pools: Vec::new(),
            active: BTreeSet::new(),
            frame_count: 0,
            start_ns: 0,
            start_shift_us: 0,
        }
    }

    fn run(&mut self, rx: Receiver<AudioMessage>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                AudioMessage::Start => self.handle_start(),
                AudioMessage::Stop => self.handle_stop(),
                AudioMessage::BufferAvailable {
                    track,
                    chunk,
                    timestamp_ns,
                } => self.handle_buffer(track, chunk, timestamp_ns),
                AudioMessage::TrackStarted(track) => {
                    self.active.insert(track);
                }
                AudioMessage::TrackPaused(track) => {
                    self.active.remove(&track);
                }
                AudioMessage::Quit => break,
            }
        }
        self.accepting.store(false, Ordering::Release);
        tracing::debug!(blocks = self.frame_count, "audio encoder loop exited");
    }

    fn report(&self, error: MontageError) {
        tracing::error!("audio encoder: {error}");
        let _ = self.events.send(SessionEvent::Error {
            origin: "audio encoder",
            error,
        });
    }

    fn open_codec(&self) -> MontageResult<Box<dyn EncoderCodec>> {
        let mut codec = self.codecs.create(&audio_track_format())?;
        codec.start()?;
        Ok(codec)
    }

    fn handle_start(&mut self) {
        let result = self.open_codec();
        match result {
            Ok(codec) => {
                self.codec = Some(codec);
                self.frame_count = 0;
                self.start_ns = self.clock.now_ns();
                self.pools = self
                    .tracks
                    .iter()
                    .map(|t| {
                        let speed = t.play_speed();
                        AudioBufferPool::new(
                            (f64::from(AUDIO_SAMPLE_RATE_HZ) / speed) as u32,
                            AUDIO_BUFFER_SIZE,
                            speed,
                        )
                    })
                    .collect();
                self.accepting.store(true, Ordering::Release);
                tracing::debug!(tracks = self.pools.len(), "audio encoder started");
            }
            Err(e) => self.report(e),
        }
    }

    fn handle_stop(&mut self) {
        self.accepting.store(false, Ordering::Release);
        let Some(mut codec) = self.codec.take() else {
            return;
        };
        let result = self
            .drain
            .drain(codec.as_mut(), &self.muxer, true)
            .and_then(|()| codec.stop());
        if let Err(e) = result {
            self.report(e);
        }
        tracing::debug!(
            blocks = self.frame_count,
            written = self.drain.samples_written(),
            dropped = self.drain.samples_dropped(),
            "audio encoder stopped"
        );
    }

    fn handle_buffer(&mut self, track: usize, chunk: PcmChunk, timestamp_ns: i64) {
        if self.codec.is_none() {
            return;
        }
        let Some(pool) = self.pools.get_mut(track) else {
            tracing::warn!(track, "audio buffer for unknown track");
            return;
        };
        let queued = pool.queue(AudioBuffer {
            data: chunk.data,
            timestamp_ns,
            sample_rate_hz: chunk.sample_rate_hz,
            channel_count: chunk.channel_count,
            is_ready: true,
        });
        if let Err(e) = queued {
            tracing::warn!(track, "dropping audio chunk: {e}");
            return;
        }

        if let Err(e) = self.mix_ready_blocks() {
            if let Some(mut codec) = self.codec.take()
                && let Err(stop_err) = codec.stop()
            {
                tracing::warn!("audio codec stop failed: {stop_err}");
            }
            self.accepting.store(false, Ordering::Release);
            self.report(e);
        }
    }

    fn active_pools_ready(&self) -> bool {
        !self.active.is_empty()
            && self
                .active
                .iter()
                .all(|&i| self.pools.get(i).is_some_and(|p| p.is_ready()))
    }

    fn mix_ready_blocks(&mut self) -> MontageResult<()> {
        while self.active_pools_ready() {
            let mut blocks = Vec::with_capacity(self.active.len());
            for &i in &self.active {
                if let Some(buffer) = self.pools[i].dequeue() {
                    blocks.push((i, buffer.data));
                }
            }

            if self.frame_count == 0 {
                self.start_shift_us = (self.clock.now_ns() - self.start_ns) / 1_000 + BUFFER_DURATION_US;
            }
            let pts_us = presentation_time_us(self.frame_count, self.start_shift_us);
            self.frame_count += 1;

            let inputs: Vec<MixInput<'_>> = blocks
                .iter()
                .map(|(i, data)| MixInput {
                    data,
                    effects: &self.tracks[*i].effects,
                })
                .collect();
            let mixed = mix_block(self.lane, &inputs, pts_us / 1_000);

            let codec = self
                .codec
                .as_mut()
                .ok_or_else(|| MontageError::codec("audio codec missing"))?;
            queue_input_with_retry(codec.as_mut(), &mixed, pts_us)?;
            self.drain.drain(codec.as_mut(), &self.muxer, false)?;
        }
        Ok(())
    }
}

/// Timestamp of the `frame_count`-th mixed block.
pub fn presentation_time_us(frame_count: i64, start_shift_us: i64) -> i64 {
    frame_count * BUFFER_DURATION_US + start_shift_us
}

#[cfg(test)]
#[path = "../../tests/unit/audio/encoder.rs"]
mod tests;
