use super::*;

fn stereo_sine(frames: usize, rate: f64, freq: f64, amp: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let v = (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() as f32 * amp;
        out.push(v);
        out.push(-v);
    }
    out
}

fn rms(samples: &[f32]) -> f64 {
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

#[test]
fn same_rate_is_identity() {
    let mut r = Resampler::new(48_000, 48_000, 2).unwrap();
    let input = stereo_sine(512, 48_000.0, 440.0, 0.5);
    assert_eq!(r.resample(&input).unwrap(), input);
    assert_eq!(r.resample(&input).unwrap(), input);
}

#[test]
fn rejects_partial_frames() {
    let mut r = Resampler::new(44_100, 48_000, 2).unwrap();
    let err = r.resample(&[0.0, 0.1, 0.2]).unwrap_err();
    assert!(matches!(
        err,
        MontageError::BufferGeometry {
            len: 3,
            channels: 2
        }
    ));
    assert!(r.resample(&[]).unwrap().is_empty());
}

#[test]
fn round_trip_preserves_length_and_energy() {
    let input = stereo_sine(4_410, 44_100.0, 441.0, 0.5);
    let mut up = Resampler::new(44_100, 48_000, 2).unwrap();
    let mut down = Resampler::new(48_000, 44_100, 2).unwrap();

    let mid = up.resample(&input).unwrap();
    assert!(mid.len() > input.len());
    let back = down.resample(&mid).unwrap();

    let diff = (back.len() as i64 - input.len() as i64).abs();
    assert!(diff <= 2, "length drifted by {diff} samples");

    let ratio = rms(&back) / rms(&input);
    assert!((ratio - 1.0).abs() < 0.05, "energy ratio {ratio}");
}

#[test]
fn upsampling_in_chunks_matches_one_shot() {
    let input = stereo_sine(2_000, 44_100.0, 300.0, 0.8);
    let mut whole = Resampler::new(44_100, 48_000, 2).unwrap();
    let expected = whole.resample(&input).unwrap();

    let mut chunked = Resampler::new(44_100, 48_000, 2).unwrap();
    let mut got = chunked.resample(&input[..2_000]).unwrap();
    got.extend(chunked.resample(&input[2_000..]).unwrap());

    assert_eq!(got.len(), expected.len());
    for (a, b) in got.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn downsampling_in_chunks_matches_one_shot() {
    let input = stereo_sine(3_000, 48_000.0, 300.0, 0.8);
    let mut whole = Resampler::new(48_000, 22_050, 2).unwrap();
    let expected = whole.resample(&input).unwrap();

    let mut chunked = Resampler::new(48_000, 22_050, 2).unwrap();
    let mut got = Vec::new();
    for chunk in input.chunks(734) {
        got.extend(chunked.resample(chunk).unwrap());
    }

    assert_eq!(got.len(), expected.len());
    for (a, b) in got.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn downsampling_averages_constant_signal() {
    let mut r = Resampler::new(48_000, 16_000, 1).unwrap();
    let out = r.resample(&vec![0.25; 3_000]).unwrap();
    assert_eq!(out.len(), 1_000);
    assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
}

#[test]
fn output_stays_within_conservative_capacity() {
    let mut r = Resampler::new(8_000, 48_000, 2).unwrap();
    for len in [2usize, 10, 128, 1_000] {
        let input = vec![0.5; len];
        let cap = r.output_capacity(len);
        assert!(r.resample(&input).unwrap().len() <= cap);
    }
    r.reset();
    // Fresh stream starts exactly on the first input frame.
    let out = r.resample(&[1.0, -1.0, 1.0, -1.0]).unwrap();
    assert_eq!(&out[..2], &[1.0, -1.0]);
}
