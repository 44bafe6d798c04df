use std::time::Duration;

use crate::encode::codec::{EncoderCodec, OutputEvent};
use crate::encode::muxer::Muxer;
use crate::foundation::error::{MontageError, MontageResult};

pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);
/// Empty polls tolerated while waiting for the end-of-stream packet.
pub const MAX_EOS_TRIES: u32 = 1_000;
pub const INPUT_TIMEOUT: Duration = Duration::from_millis(10);
/// Input claims attempted before the codec is considered stuck.
pub const MAX_INPUT_ATTEMPTS: u32 = 500;

/// Claim an input slot, polling with [`INPUT_TIMEOUT`], and queue `data` into it.
pub fn queue_input_with_retry(
    codec: &mut dyn EncoderCodec,
    data: &[u8],
    pts_us: i64,
) -> MontageResult<()> {
    for _ in 0..MAX_INPUT_ATTEMPTS {
        if let Some(slot) = codec.dequeue_input(INPUT_TIMEOUT)? {
            return codec.queue_input(slot, data, pts_us);
        }
    }
    Err(MontageError::codec(format!(
        "no input slot after {MAX_INPUT_ATTEMPTS} attempts"
    )))
}

/// Per-encoder bookkeeping for moving codec output into the muxer.
#[derive(Debug)]
pub struct DrainState {
    label: &'static str,
    track: Option<usize>,
    samples_written: u64,
    samples_dropped: u64,
}

impl DrainState {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            track: None,
            samples_written: 0,
            samples_dropped: 0,
        }
    }

    pub fn track(&self) -> Option<usize> {
        self.track
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Packets that arrived before the container was running.
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }

    /// Move everything the codec has ready into the muxer.
    ///
    /// Without `end_of_stream` this returns on the first empty poll. With it, input is closed
    /// first and the loop keeps polling until the codec reports end of stream.
    pub fn drain(
        &mut self,
        codec: &mut dyn EncoderCodec,
        muxer: &Muxer,
        end_of_stream: bool,
    ) -> MontageResult<()> {
        if end_of_stream {
            codec.signal_end_of_input()?;
        }
        let mut empty_polls = 0u32;
        loop {
            match codec.dequeue_output(DRAIN_TIMEOUT)? {
                OutputEvent::TryAgainLater => {
                    if !end_of_stream {
                        break;
                    }
                    empty_polls += 1;
                    if empty_polls > MAX_EOS_TRIES {
                        return Err(MontageError::codec(format!(
                            "{}: no end of stream after {MAX_EOS_TRIES} polls",
                            self.label
                        )));
                    }
                }
                OutputEvent::OutputBuffersChanged => {
                    tracing::warn!(encoder = self.label, "output buffers changed");
                }
                OutputEvent::FormatChanged(format) => {
                    if muxer.is_started() || self.track.is_some() {
                        tracing::warn!(encoder = self.label, "format changed twice");
                    } else {
                        self.track = Some(muxer.add_track(&format)?);
                    }
                }
                OutputEvent::Packet(packet) => {
                    let size = if packet.codec_config {
                        0
                    } else {
                        packet.data.len()
                    };
                    if size != 0 {
                        match self.track {
                            Some(track) if muxer.is_started() => {
                                muxer.write_sample(
                                    track,
                                    &packet.data,
                                    packet.pts_us,
                                    packet.key_frame,
                                )?;
                                self.samples_written += 1;
                            }
                            _ => self.samples_dropped += 1,
                        }
                    }
                    if packet.end_of_stream {
                        if !end_of_stream {
                            tracing::warn!(encoder = self.label, "reached end of stream unexpectedly");
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/drain.rs"]
mod tests;
