use std::collections::VecDeque;
use std::time::Duration;

use crate::config::EncoderCodec as CodecKind;
use crate::foundation::error::{MontageError, MontageResult};

/// Format of one elementary stream, reported by the codec once it has seen input.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackFormat {
    Video {
        codec: CodecKind,
        width: u32,
        height: u32,
        frame_rate: u32,
        bit_rate: u32,
        i_frame_interval_secs: u32,
    },
    Audio {
        sample_rate_hz: u32,
        channel_count: u16,
        bit_rate: u32,
    },
}

impl TrackFormat {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub pts_us: i64,
    /// Out-of-band codec setup data; never written as a sample.
    pub codec_config: bool,
    pub key_frame: bool,
    pub end_of_stream: bool,
}

/// What one poll of the codec's output side produced.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    TryAgainLater,
    OutputBuffersChanged,
    FormatChanged(TrackFormat),
    Packet(EncodedPacket),
}

/// Slot-based codec interface: input slots are claimed, filled, and queued; output is polled.
pub trait EncoderCodec: Send {
    fn start(&mut self) -> MontageResult<()>;

    /// Claim an input slot, or `None` if none frees up within `timeout`.
    fn dequeue_input(&mut self, timeout: Duration) -> MontageResult<Option<usize>>;

    fn queue_input(&mut self, slot: usize, data: &[u8], pts_us: i64) -> MontageResult<()>;

    fn signal_end_of_input(&mut self) -> MontageResult<()>;

    fn dequeue_output(&mut self, timeout: Duration) -> MontageResult<OutputEvent>;

    fn stop(&mut self) -> MontageResult<()>;
}

/// Builds codecs for a session; one call per elementary stream.
pub trait CodecFactory: Send + Sync {
    fn create(&self, format: &TrackFormat) -> MontageResult<Box<dyn EncoderCodec>>;
}

/// Codec that forwards its input unchanged as packets.
///
/// Output order follows a hardware encoder: the format is announced after the first input, then
/// a codec-config packet, then one packet per input, then an end-of-stream packet once input is
/// closed and everything queued has been handed out.
pub struct PassthroughCodec {
    format: TrackFormat,
    started: bool,
    claimed: Option<usize>,
    next_slot: usize,
    pending: VecDeque<OutputEvent>,
    announced: bool,
    input_closed: bool,
    eos_sent: bool,
    /// Input claims to refuse before slots become available again.
    stall_inputs: u32,
}

impl PassthroughCodec {
    pub fn new(format: TrackFormat) -> Self {
        Self {
            format,
            started: false,
            claimed: None,
            next_slot: 0,
            pending: VecDeque::new(),
            announced: false,
            input_closed: false,
            eos_sent: false,
            stall_inputs: 0,
        }
    }

    /// Refuse the next `count` input claims, as a busy codec would.
    pub fn with_input_stall(mut self, count: u32) -> Self {
        self.stall_inputs = count;
        self
    }

    fn ensure_started(&self) -> MontageResult<()> {
        if self.started {
            Ok(())
        } else {
            Err(MontageError::codec("codec used before start"))
        }
    }
}

impl EncoderCodec for PassthroughCodec {
    fn start(&mut self) -> MontageResult<()> {
        self.started = true;
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout: Duration) -> MontageResult<Option<usize>> {
        self.ensure_started()?;
        if self.input_closed {
            return Err(MontageError::codec("input claimed after end of stream"));
        }
        if self.stall_inputs > 0 {
            self.stall_inputs -= 1;
            return Ok(None);
        }
        if self.claimed.is_some() {
            return Ok(None);
        }
        let slot = self.next_slot;
        self.next_slot = self.next_slot.wrapping_add(1);
        self.claimed = Some(slot);
        Ok(Some(slot))
    }

    fn queue_input(&mut self, slot: usize, data: &[u8], pts_us: i64) -> MontageResult<()> {
        self.ensure_started()?;
        if self.claimed != Some(slot) {
            return Err(MontageError::codec(format!(
                "input slot {slot} was not claimed"
            )));
        }
        self.claimed = None;
        if !self.announced {
            self.announced = true;
            self.pending
                .push_back(OutputEvent::FormatChanged(self.format.clone()));
            self.pending.push_back(OutputEvent::Packet(EncodedPacket {
                data: vec![0, 0, 0, 1],
                pts_us: 0,
                codec_config: true,
                key_frame: false,
                end_of_stream: false,
            }));
        }
        self.pending.push_back(OutputEvent::Packet(EncodedPacket {
            data: data.to_vec(),
            pts_us,
            codec_config: false,
            key_frame: true,
            end_of_stream: false,
        }));
        Ok(())
    }

    fn signal_end_of_input(&mut self) -> MontageResult<()> {
        self.ensure_started()?;
        self.input_closed = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> MontageResult<OutputEvent> {
        self.ensure_started()?;
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if self.input_closed && !self.eos_sent {
            self.eos_sent = true;
            return Ok(OutputEvent::Packet(EncodedPacket {
                data: Vec::new(),
                pts_us: 0,
                codec_config: false,
                key_frame: false,
                end_of_stream: true,
            }));
        }
        Ok(OutputEvent::TryAgainLater)
    }

    fn stop(&mut self) -> MontageResult<()> {
        self.started = false;
        self.pending.clear();
        Ok(())
    }
}

/// Factory for [`PassthroughCodec`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughCodecFactory {
    pub input_stall: u32,
}

impl CodecFactory for PassthroughCodecFactory {
    fn create(&self, format: &TrackFormat) -> MontageResult<Box<dyn EncoderCodec>> {
        Ok(Box::new(
            PassthroughCodec::new(format.clone()).with_input_stall(self.input_stall),
        ))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/codec.rs"]
mod tests;
