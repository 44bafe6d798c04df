use std::sync::mpsc;

use super::*;
use crate::config::effects::CompositionConfig;
use crate::config::{AUDIO_BUFFER_SIZE, AUDIO_SAMPLE_RATE_HZ, Resolution};
use crate::encode::codec::PassthroughCodecFactory;
use crate::encode::muxer::{InMemoryMuxer, MuxEvent, MuxLog};
use crate::encode::video::SpriteTrackData;
use crate::foundation::clock::ManualClock;
use crate::player::{AudioObserver, PcmChunk};

fn start(with_audio: bool) -> (MediaEncoder, MuxLog, mpsc::Receiver<SessionEvent>, ManualClock) {
    let (backend, log) = InMemoryMuxer::new();
    let (events, events_rx) = mpsc::channel();
    let clock = ManualClock::starting_at_ms(1_000);
    let encoder = MediaEncoder::start(MediaEncoderSetup {
        settings: EncoderSettings {
            resolution: Resolution::new(16, 8),
            with_audio,
            ..EncoderSettings::default()
        },
        tracks: vec![CompositionConfig::builtin().tracks[0].clone()],
        codecs: Arc::new(PassthroughCodecFactory::default()),
        backend: Box::new(backend),
        clock: clock.shared(),
        events,
        release_poll: Duration::from_millis(5),
    })
    .unwrap();
    (encoder, log, events_rx, clock)
}

fn snapshot() -> EncoderFrameData {
    EncoderFrameData {
        composition_time_ms: 0,
        timestamp_ns: 0,
        sprites: vec![SpriteTrackData {
            play_when_ready: false,
            geometry: Default::default(),
            frame: None,
            alpha: 1.0,
        }],
    }
}

fn wait_stopped(events: &mpsc::Receiver<SessionEvent>) {
    loop {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(SessionEvent::EncoderStopped) => return,
            Ok(SessionEvent::Error { origin, error }) => panic!("{origin}: {error}"),
            Ok(_) => {}
            Err(e) => panic!("no stop event: {e}"),
        }
    }
}

#[test]
fn media_type_sets_the_container_track_count() {
    assert_eq!(MediaType::VideoAndAudio.track_count(), 2);
    assert_eq!(MediaType::OnlyVideo.track_count(), 1);
}

#[test]
fn video_only_export_releases_the_muxer_once() {
    let (encoder, log, events, _clock) = start(false);
    assert_eq!(encoder.media_type(), MediaType::OnlyVideo);
    assert!(encoder.audio_tap().is_none());
    encoder.frame_available(snapshot());
    let handle = encoder.stop().unwrap();
    wait_stopped(&events);
    handle.join().unwrap();

    let log = log.lock().unwrap().clone();
    assert_eq!(log.first(), Some(&MuxEvent::TrackAdded { index: 0, video: true }));
    assert_eq!(log.last(), Some(&MuxEvent::Stopped));
    assert_eq!(log.iter().filter(|e| **e == MuxEvent::Started).count(), 1);
}

#[test]
fn both_tracks_register_before_any_sample() {
    let (encoder, log, events, clock) = start(true);
    let audio = encoder.audio.as_ref().unwrap();
    for _ in 0..1_000 {
        if audio.is_accepting() {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    let tap = encoder.audio_tap().unwrap();
    encoder.notify_start_track(0);
    for _ in 0..20 {
        clock.advance_ms(100);
        encoder.frame_available(snapshot());
        tap.on_audio(
            0,
            PcmChunk {
                data: vec![0; AUDIO_BUFFER_SIZE],
                sample_rate_hz: AUDIO_SAMPLE_RATE_HZ,
                channel_count: 2,
            },
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    let handle = encoder.stop().unwrap();
    wait_stopped(&events);
    handle.join().unwrap();

    let log = log.lock().unwrap().clone();
    let first_sample = log
        .iter()
        .position(|e| matches!(e, MuxEvent::Sample { .. }))
        .unwrap();
    let added = log[..first_sample]
        .iter()
        .filter(|e| matches!(e, MuxEvent::TrackAdded { .. }))
        .count();
    assert_eq!(added, 2);
    assert_eq!(log[first_sample - 1], MuxEvent::Started);
    assert_eq!(log.last(), Some(&MuxEvent::Stopped));
    for track in 0..2 {
        assert!(
            log.iter()
                .any(|e| matches!(e, MuxEvent::Sample { track: t, .. } if *t == track)),
            "no samples on track {track}"
        );
    }
}
