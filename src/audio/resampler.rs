use crate::foundation::error::{MontageError, MontageResult};

/// Leftover of a downsampling tap that ran past the end of the previous call.
#[derive(Clone, Debug)]
struct Tail {
    /// Input frames (fractional) still needed to complete the tap.
    weight: f64,
    sums: Vec<f64>,
}

/// Stateful sample-rate converter for interleaved PCM.
///
/// Upsampling walks the input at a fractional step and blends the two neighbouring frames.
/// Downsampling averages every `from / to` span of input into one output frame, weighting the
/// partially covered frames at each end of the span. Both directions carry their position
/// across calls, so a stream resampled in chunks matches the stream resampled in one go.
#[derive(Clone, Debug)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    /// Input frames per output frame.
    ratio: f64,
    /// Upsampling: position past the previous call's last frame, in `[0, 1)` once primed.
    carry_weight: f64,
    /// Upsampling: last input frame of the previous call.
    last_frame: Vec<f64>,
    tail: Option<Tail>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: usize) -> MontageResult<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(MontageError::validation(format!(
                "resampler rates must be non-zero, got {from_rate} -> {to_rate}"
            )));
        }
        if channels == 0 {
            return Err(MontageError::validation(
                "resampler needs at least one channel",
            ));
        }
        Ok(Self {
            from_rate,
            to_rate,
            channels,
            ratio: f64::from(from_rate) / f64::from(to_rate),
            carry_weight: 1.0,
            last_frame: vec![0.0; channels],
            tail: None,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Upper bound on the samples one call can produce for `input_len` samples.
    pub fn output_capacity(&self, input_len: usize) -> usize {
        let frames = (input_len as f64 * f64::from(self.to_rate)
            / f64::from(self.from_rate)
            / self.channels as f64)
            .ceil() as usize;
        frames * self.channels + self.channels
    }

    /// Resample one chunk of interleaved samples.
    ///
    /// Rejects chunks whose length is not a whole number of frames.
    pub fn resample(&mut self, input: &[f32]) -> MontageResult<Vec<f32>> {
        if !input.len().is_multiple_of(self.channels) {
            return Err(MontageError::BufferGeometry {
                len: input.len(),
                channels: self.channels,
            });
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }
        if self.from_rate == self.to_rate {
            return Ok(input.to_vec());
        }

        let mut out = Vec::with_capacity(self.output_capacity(input.len()));
        if self.from_rate < self.to_rate {
            self.interpolate(input, &mut out);
        } else {
            self.multi_tap(input, &mut out);
        }
        debug_assert!(out.len() <= self.output_capacity(input.len()));
        Ok(out)
    }

    /// Forget carried state, as if the next chunk started a new stream.
    pub fn reset(&mut self) {
        self.carry_weight = 1.0;
        self.last_frame.iter_mut().for_each(|s| *s = 0.0);
        self.tail = None;
    }

    fn interpolate(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        let last = (frames - 1) as f64;

        // Frame -1 is the previous call's last frame.
        let sample = |frame: isize, c: usize| -> f64 {
            if frame < 0 {
                self.last_frame[c]
            } else {
                f64::from(input[frame as usize * ch + c])
            }
        };

        let mut pos = self.carry_weight - 1.0;
        while pos < last {
            let base = pos.floor();
            let frac = pos - base;
            let i = base as isize;
            for c in 0..ch {
                let a = sample(i, c);
                let b = sample(i + 1, c);
                out.push((a * (1.0 - frac) + b * frac) as f32);
            }
            pos += self.ratio;
        }

        self.carry_weight = pos - last;
        let tail_start = (frames - 1) * ch;
        for (c, s) in self.last_frame.iter_mut().enumerate() {
            *s = f64::from(input[tail_start + c]);
        }
    }

    fn multi_tap(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        let mut pos = 0usize;
        // Fraction of frame `pos` already spent on earlier taps.
        let mut consumed = 0.0f64;

        while pos < frames {
            let (mut weight, mut sums) = match self.tail.take() {
                Some(tail) => (tail.weight, tail.sums),
                None => (self.ratio, vec![0.0; ch]),
            };

            while weight > 0.0 && pos < frames {
                let available = 1.0 - consumed;
                let frame = &input[pos * ch..(pos + 1) * ch];
                if weight >= available {
                    for (acc, &s) in sums.iter_mut().zip(frame) {
                        *acc += f64::from(s) * available;
                    }
                    weight -= available;
                    pos += 1;
                    consumed = 0.0;
                } else {
                    for (acc, &s) in sums.iter_mut().zip(frame) {
                        *acc += f64::from(s) * weight;
                    }
                    consumed += weight;
                    weight = 0.0;
                }
            }

            if weight > 0.0 {
                self.tail = Some(Tail { weight, sums });
                break;
            }
            out.extend(sums.iter().map(|s| (s / self.ratio) as f32));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/resampler.rs"]
mod tests;
