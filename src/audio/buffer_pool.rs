use std::collections::VecDeque;

use crate::audio::resampler::Resampler;
use crate::foundation::error::MontageResult;

/// Buffers kept per track before the oldest are dropped.
pub const POOL_CAPACITY: usize = 30;
/// Buffers that must have been queued before the pool reports ready.
pub const READY_LIMIT: usize = 3;
/// Staging holds at most this many blocks of not-yet-emitted input.
const STAGING_BLOCKS: usize = 7;

/// A chunk of signed 16-bit little-endian interleaved PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub data: Vec<u8>,
    pub timestamp_ns: i64,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub is_ready: bool,
}

/// Per-track queue that turns decoder output into fixed-size blocks at the encoder rate.
///
/// Only the audio encoder thread touches a pool, so it carries no locking.
#[derive(Debug)]
pub struct AudioBufferPool {
    encoder_sample_rate_hz: u32,
    buffer_size: usize,
    /// Samples per emitted block.
    block_samples: usize,
    speed: f64,
    stack: VecDeque<AudioBuffer>,
    fill: usize,
    queued_total: u64,
    last_dequeued_ts: Option<i64>,
    last_queued_ts: Option<i64>,
    last_input_ts: Option<i64>,
    staging: Vec<u8>,
    max_input_chunk: usize,
    resampler: Option<Resampler>,
    output: Vec<i16>,
}

impl AudioBufferPool {
    pub fn new(encoder_sample_rate_hz: u32, buffer_size: usize, speed: f64) -> Self {
        Self {
            encoder_sample_rate_hz,
            buffer_size,
            block_samples: buffer_size / 2,
            speed,
            stack: VecDeque::with_capacity(POOL_CAPACITY + 1),
            fill: 0,
            queued_total: 0,
            last_dequeued_ts: None,
            last_queued_ts: None,
            last_input_ts: None,
            staging: Vec::with_capacity(STAGING_BLOCKS * buffer_size),
            max_input_chunk: 0,
            resampler: None,
            output: Vec::new(),
        }
    }

    pub fn encoder_sample_rate_hz(&self) -> u32 {
        self.encoder_sample_rate_hz
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Blocks emitted into the queue over the pool's lifetime, evicted ones included.
    pub fn queued_total(&self) -> u64 {
        self.queued_total
    }

    /// Head block exists, warm-up is over, and the head is not a repeat of the last dequeue.
    pub fn is_ready(&self) -> bool {
        let Some(head) = self.stack.front() else {
            return false;
        };
        self.fill >= READY_LIMIT && head.is_ready && Some(head.timestamp_ns) != self.last_dequeued_ts
    }

    /// Normalize `buffer` to the block size, resample it, and append the result.
    ///
    /// Undersized chunks are staged until a full block is available. Oversized chunks are
    /// sliced into every whole block staging holds, with the remainder kept for the next call.
    /// Errors only surface for malformed sample geometry.
    pub fn queue(&mut self, buffer: AudioBuffer) -> MontageResult<()> {
        let AudioBuffer {
            data,
            timestamp_ns,
            mut sample_rate_hz,
            channel_count,
            is_ready,
        } = buffer;
        let timestamp_ns = self.input_stamp(timestamp_ns);
        let len = data.len();
        let blocks = if len < self.buffer_size {
            self.stage(&data);
            self.max_input_chunk = self.max_input_chunk.max(len);
            if self.staging.len() < self.buffer_size {
                return Ok(());
            }
            let combined = (self.buffer_size / self.max_input_chunk.max(1)).max(1) as u32;
            self.max_input_chunk = 0;
            sample_rate_hz /= combined;
            vec![self.take_staged_block()]
        } else if len > self.buffer_size || !self.staging.is_empty() {
            if len > self.buffer_size {
                tracing::debug!(len, block = self.buffer_size, "oversized audio chunk, slicing");
            }
            self.staging.extend_from_slice(&data);
            let mut blocks = Vec::with_capacity(self.staging.len() / self.buffer_size);
            while self.staging.len() >= self.buffer_size {
                blocks.push(self.take_staged_block());
            }
            blocks
        } else {
            vec![data]
        };

        let mut first = true;
        for data in blocks {
            let block = AudioBuffer {
                data,
                timestamp_ns,
                sample_rate_hz,
                channel_count,
                is_ready,
            };
            self.queue_block(block, &mut first)?;
        }
        Ok(())
    }

    /// Stamp for a new input. A repeat of the previous input keeps its stamp so the dequeue
    /// filter can drop it; any other stamp lands after every block already queued.
    fn input_stamp(&mut self, ts: i64) -> i64 {
        let repeat = self.last_input_ts == Some(ts);
        self.last_input_ts = Some(ts);
        match self.last_queued_ts {
            Some(last) if !repeat && ts <= last => last.saturating_add(1),
            _ => ts,
        }
    }

    /// `first` is cleared once the input has produced a block; later blocks are derived.
    fn queue_block(&mut self, buffer: AudioBuffer, first: &mut bool) -> MontageResult<()> {
        if buffer.sample_rate_hz != self.encoder_sample_rate_hz {
            match self.resampler.as_ref() {
                None => {
                    self.resampler = Some(Resampler::new(
                        buffer.sample_rate_hz,
                        self.encoder_sample_rate_hz,
                        usize::from(buffer.channel_count.max(1)),
                    )?);
                }
                Some(r) if r.from_rate() != buffer.sample_rate_hz => {
                    tracing::warn!(
                        from = r.from_rate(),
                        now = buffer.sample_rate_hz,
                        "audio rate changed mid-stream, keeping the first resampler"
                    );
                }
                Some(_) => {}
            }
        }

        let emitted = if buffer.sample_rate_hz == self.encoder_sample_rate_hz {
            vec![buffer]
        } else if buffer.sample_rate_hz < self.encoder_sample_rate_hz {
            self.resample_up(buffer)?
        } else {
            self.resample_down(buffer)?.into_iter().collect()
        };

        for b in emitted {
            let derived = !std::mem::replace(first, false);
            self.push(b, derived);
        }
        Ok(())
    }

    /// Remove the head block if the pool is ready.
    pub fn dequeue(&mut self) -> Option<AudioBuffer> {
        if !self.is_ready() {
            return None;
        }
        let head = self.stack.pop_front()?;
        self.last_dequeued_ts = Some(head.timestamp_ns);
        Some(AudioBuffer {
            is_ready: true,
            ..head
        })
    }

    /// Derived blocks always stamp after the newest queued block.
    fn push(&mut self, mut buffer: AudioBuffer, derived: bool) {
        if derived
            && let Some(last) = self.last_queued_ts
            && buffer.timestamp_ns <= last
        {
            buffer.timestamp_ns = last.saturating_add(1);
        }
        self.last_queued_ts = Some(
            self.last_queued_ts
                .map_or(buffer.timestamp_ns, |last| last.max(buffer.timestamp_ns)),
        );
        self.stack.push_back(buffer);
        while self.stack.len() > POOL_CAPACITY {
            self.stack.pop_front();
        }
        self.queued_total += 1;
        if self.fill < READY_LIMIT {
            self.fill += 1;
        }
    }

    fn stage(&mut self, bytes: &[u8]) {
        self.staging.extend_from_slice(bytes);
        let limit = STAGING_BLOCKS * self.buffer_size;
        if self.staging.len() > limit {
            let excess = self.staging.len() - limit;
            tracing::warn!(excess, "audio staging overflow, dropping oldest bytes");
            self.staging.drain(..excess);
        }
    }

    fn take_staged_block(&mut self) -> Vec<u8> {
        self.staging.drain(..self.buffer_size).collect()
    }

    fn resample(&mut self, data: &[u8]) -> MontageResult<Vec<i16>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(pcm16_from_le_bytes(data));
        };
        let input: Vec<f32> = data
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])))
            .collect();
        let out = resampler.resample(&input)?;
        Ok(out.into_iter().map(|s| s as i32 as i16).collect())
    }

    /// Upsampled output can span several blocks; each gets a distinct timestamp.
    fn resample_up(&mut self, buffer: AudioBuffer) -> MontageResult<Vec<AudioBuffer>> {
        let samples = self.resample(&buffer.data)?;
        self.output.extend_from_slice(&samples);

        let count = self.output.len() / self.block_samples;
        let mut blocks = Vec::with_capacity(count);
        for (i, chunk) in self
            .output
            .chunks_exact(self.block_samples)
            .take(count)
            .enumerate()
        {
            blocks.push(AudioBuffer {
                data: pcm16_to_le_bytes(chunk),
                timestamp_ns: buffer.timestamp_ns + i as i64,
                sample_rate_hz: buffer.sample_rate_hz,
                channel_count: buffer.channel_count,
                is_ready: true,
            });
        }
        self.output.drain(..count * self.block_samples);
        Ok(blocks)
    }

    /// Downsampled output yields at most one block per call.
    fn resample_down(&mut self, buffer: AudioBuffer) -> MontageResult<Option<AudioBuffer>> {
        let samples = self.resample(&buffer.data)?;
        self.output.extend_from_slice(&samples);
        if self.output.len() < self.block_samples {
            return Ok(None);
        }
        let data = pcm16_to_le_bytes(&self.output[..self.block_samples]);
        self.output.drain(..self.block_samples);
        Ok(Some(AudioBuffer {
            data,
            timestamp_ns: buffer.timestamp_ns,
            sample_rate_hz: buffer.sample_rate_hz,
            channel_count: buffer.channel_count,
            is_ready: true,
        }))
    }
}

pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/audio/buffer_pool.rs"]
mod tests;
