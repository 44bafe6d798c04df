use crate::animation::keyframes::volume_at;
use crate::config::effects::TrackEffect;
use crate::config::{AUDIO_BUFFER_SIZE, AUDIO_MAX_AMPLITUDE, AUDIO_SAMPLE_RATE_HZ, MixLane};

/// Duration of one mixed block in microseconds (4 bytes per stereo frame).
pub const BUFFER_DURATION_US: i64 =
    (1_000_000.0 * (AUDIO_BUFFER_SIZE as f64 / 4.0) / AUDIO_SAMPLE_RATE_HZ as f64) as i64;

/// Gain applied to the summed tracks so dense mixes do not clip.
pub fn mix_factor(active_tracks: usize) -> f32 {
    match active_tracks {
        0 | 1 => 1.0,
        2 => 0.9,
        3 => 0.8,
        4 => 0.7,
        _ => 0.6,
    }
}

/// One track's contribution to a block.
#[derive(Clone, Copy, Debug)]
pub struct MixInput<'a> {
    /// PCM block as delivered by the track's pool. Shorter blocks are padded with silence.
    pub data: &'a [u8],
    pub effects: &'a [TrackEffect],
}

/// Milliseconds advanced per byte offset inside a block.
fn weight_ms_per_byte(lane: MixLane) -> f64 {
    match lane {
        MixLane::Pcm16 => BUFFER_DURATION_US as f64 / 1000.0 / AUDIO_BUFFER_SIZE as f64,
        // Integer millisecond arithmetic: 21 / 4096 truncates to 0.
        MixLane::LegacyLowByte => (BUFFER_DURATION_US / 1000 / AUDIO_BUFFER_SIZE as i64) as f64,
    }
}

/// Mix `inputs` into a fresh block starting at `presentation_ms`.
///
/// Each track is scaled by its keyframed volume at the sample's own time, the sum is scaled by
/// [`mix_factor`] and clamped to the 16-bit amplitude range.
pub fn mix_block(lane: MixLane, inputs: &[MixInput<'_>], presentation_ms: i64) -> Vec<u8> {
    let mut out = vec![0u8; AUDIO_BUFFER_SIZE];
    let factor = mix_factor(inputs.len());
    let weight = weight_ms_per_byte(lane);
    let base = presentation_ms as f64;

    match lane {
        MixLane::Pcm16 => {
            for (j, dst) in out.chunks_exact_mut(2).enumerate() {
                let offset = j * 2;
                let t = base + weight * offset as f64;
                let sum: f32 = inputs
                    .iter()
                    .map(|input| {
                        let s = match input.data.get(offset..offset + 2) {
                            Some(b) => i16::from_le_bytes([b[0], b[1]]),
                            None => 0,
                        };
                        f32::from(s) * volume_at(input.effects, t)
                    })
                    .sum();
                let mixed = clamp_amplitude((sum * factor) as i32) as i16;
                dst.copy_from_slice(&mixed.to_le_bytes());
            }
        }
        MixLane::LegacyLowByte => {
            for (i, dst) in out.iter_mut().enumerate() {
                let t = base + weight * i as f64;
                let sum: f32 = inputs
                    .iter()
                    .map(|input| {
                        let byte = input.data.get(i).map(|&b| b as i8).unwrap_or(0);
                        f32::from(byte) * volume_at(input.effects, t)
                    })
                    .sum();
                let mixed = clamp_amplitude((sum * factor) as i32);
                *dst = mixed as u8;
            }
        }
    }
    out
}

fn clamp_amplitude(v: i32) -> i32 {
    v.clamp(-AUDIO_MAX_AMPLITUDE, AUDIO_MAX_AMPLITUDE)
}

#[cfg(test)]
#[path = "../../tests/unit/audio/mixer.rs"]
mod tests;
