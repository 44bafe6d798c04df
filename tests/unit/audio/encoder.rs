use super::*;
use crate::config::effects::CompositionConfig;
use crate::encode::codec::PassthroughCodecFactory;
use crate::encode::muxer::{InMemoryMuxer, MuxEvent, MuxLog};
use crate::foundation::clock::ManualClock;

use std::time::Duration;

fn setup(track_count: usize) -> (AudioEncoder, MuxLog, mpsc::Receiver<SessionEvent>) {
    let builtin = CompositionConfig::builtin();
    let (backend, log) = InMemoryMuxer::new();
    let muxer = Muxer::new(Box::new(backend), 1).unwrap();
    let (events, events_rx) = mpsc::channel();
    let encoder = AudioEncoder::start(AudioEncoderSetup {
        // Effect1 plays at 1x, so its pool runs at the encoder rate.
        tracks: vec![builtin.tracks[0].clone(); track_count],
        mix_lane: MixLane::Pcm16,
        codecs: Arc::new(PassthroughCodecFactory::default()),
        muxer,
        clock: ManualClock::starting_at_ms(1_000).shared(),
        events,
    })
    .unwrap();
    for _ in 0..1_000 {
        if encoder.is_accepting() {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(encoder.is_accepting());
    (encoder, log, events_rx)
}

fn chunk(sample: i16) -> PcmChunk {
    let mut data = Vec::with_capacity(AUDIO_BUFFER_SIZE);
    for _ in 0..AUDIO_BUFFER_SIZE / 2 {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    PcmChunk {
        data,
        sample_rate_hz: AUDIO_SAMPLE_RATE_HZ,
        channel_count: 2,
    }
}

fn samples(log: &MuxLog) -> Vec<(usize, i64)> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            MuxEvent::Sample { track, pts_us, .. } => Some((*track, *pts_us)),
            _ => None,
        })
        .collect()
}

#[test]
fn presentation_time_advances_one_block_per_frame() {
    assert_eq!(presentation_time_us(0, 500), 500);
    assert_eq!(presentation_time_us(3, 500), 3 * 21_333 + 500);
}

#[test]
fn active_track_is_mixed_at_block_cadence() {
    let (mut encoder, log, events) = setup(1);
    let tap = encoder.tap(1);
    encoder.notify_track_started(0);
    for _ in 0..10 {
        tap.on_audio(0, chunk(100));
    }
    encoder.stop();
    encoder.join();
    assert!(!encoder.is_recording());

    let written = samples(&log);
    assert_eq!(written.len(), 10);
    // Clock never moved: the shift is one block, then each block adds one more.
    let expected: Vec<(usize, i64)> = (0..10).map(|i| (0, (i + 1) * 21_333)).collect();
    assert_eq!(written, expected);
    assert!(events.try_recv().is_err());
}

#[test]
fn nothing_is_mixed_while_no_track_is_active() {
    let (mut encoder, log, _events) = setup(2);
    let tap = encoder.tap(2);
    for _ in 0..5 {
        tap.on_audio(0, chunk(1));
        tap.on_audio(1, chunk(1));
    }
    encoder.stop();
    encoder.join();
    assert!(samples(&log).is_empty());
}

#[test]
fn inactive_track_does_not_stall_the_active_one() {
    let (mut encoder, log, _events) = setup(2);
    let tap = encoder.tap(2);
    encoder.notify_track_started(1);
    for _ in 0..6 {
        tap.on_audio(1, chunk(7));
    }
    encoder.notify_track_paused(1);
    tap.on_audio(1, chunk(7));
    encoder.stop();
    encoder.join();
    assert_eq!(samples(&log).len(), 6);
}

#[test]
fn unknown_track_is_dropped() {
    let (backend, _log) = InMemoryMuxer::new();
    let muxer = Muxer::new(Box::new(backend), 1).unwrap();
    let (events, _rx) = mpsc::channel();
    let clock = ManualClock::new();
    let encoder = AudioEncoder::start(AudioEncoderSetup {
        tracks: CompositionConfig::builtin().tracks,
        mix_lane: MixLane::Pcm16,
        codecs: Arc::new(PassthroughCodecFactory::default()),
        muxer,
        clock: clock.shared(),
        events,
    })
    .unwrap();
    let tap = encoder.tap(4);
    // Unknown tracks are dropped without reaching the worker.
    tap.on_audio(9, chunk(1));
    drop(encoder);
}
