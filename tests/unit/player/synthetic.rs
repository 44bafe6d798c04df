use super::*;
use crate::foundation::clock::ManualClock;

struct Collect(Mutex<Vec<(usize, PcmChunk)>>);

impl AudioObserver for Collect {
    fn on_audio(&self, track: usize, chunk: PcmChunk) {
        self.0.lock().unwrap().push((track, chunk));
    }
}

#[test]
fn frames_follow_the_source_position() {
    let clock = ManualClock::starting_at_ms(500);
    let mut player = SyntheticPlayer::new(0, Clip::Portrait1080p30, 16, clock.shared()).unwrap();
    assert_eq!(player.proxy_size(), Canvas { width: 67, height: 120 });
    assert_eq!(player.frame_size(), (1080, 1920));

    let first = player.take_latest_frame().unwrap();
    assert_eq!((first.width, first.height), (67, 120));
    assert_eq!(first.pixels.len(), 67 * 120 * 4);
    assert!(player.take_latest_frame().is_none());

    player.set_play_when_ready(true);
    clock.advance_ms(10);
    assert!(player.take_latest_frame().is_none());
    clock.advance_ms(30);
    let next = player.take_latest_frame().unwrap();
    assert_eq!(next.pts_ms, 40);

    player.seek_to(5_000);
    assert_eq!(player.take_latest_frame().unwrap().pts_ms, 5_000);
}

#[test]
fn speed_scales_source_time() {
    let clock = ManualClock::starting_at_ms(0);
    let mut player = SyntheticPlayer::new(0, Clip::Fhd120, 16, clock.shared()).unwrap();
    player.set_speed(0.25);
    player.set_play_when_ready(true);
    clock.advance_ms(400);
    assert_eq!(player.take_latest_frame().unwrap().pts_ms, 100);
    player.set_play_when_ready(false);
    clock.advance_ms(400);
    assert!(player.take_latest_frame().is_none());
}

#[test]
fn pcm_is_delivered_while_playing() {
    let clock = ManualClock::starting_at_ms(0);
    let mut player = SyntheticPlayer::new(3, Clip::Uhd30, 16, clock.shared()).unwrap();
    let sink = Arc::new(Collect(Mutex::new(Vec::new())));
    player.set_audio_observer(Some(sink.clone()));
    player.set_play_when_ready(true);
    clock.advance_ms(100);

    for _ in 0..500 {
        if sink.0.lock().unwrap().len() >= 4 {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    let got = sink.0.lock().unwrap().clone();
    assert_eq!(got.len(), 4);
    for (track, chunk) in &got {
        assert_eq!(*track, 3);
        assert_eq!(chunk.data.len(), CHUNK_FRAMES * 4);
        assert_eq!(chunk.sample_rate_hz, SYNTHETIC_SAMPLE_RATE_HZ);
        assert_eq!(chunk.channel_count, 2);
    }
    player.release();
}

#[test]
fn startup_failures_resolve_through_retries() {
    let clock = ManualClock::new();
    let mut player = SyntheticPlayer::new(0, Clip::Uhd60, 16, clock.shared())
        .unwrap()
        .with_startup_failures(2);
    assert_eq!(player.poll_event(), Some(PlayerEvent::Idle));
    player.retry().unwrap();
    assert_eq!(player.poll_event(), Some(PlayerEvent::Idle));
    player.retry().unwrap();
    assert_eq!(player.poll_event(), Some(PlayerEvent::Ready));
    assert_eq!(player.poll_event(), None);
}

#[test]
fn sine_chunk_is_interleaved_stereo() {
    let chunk = sine_chunk(0, 440.0);
    assert_eq!(chunk.len(), CHUNK_FRAMES * 4);
    assert_eq!(&chunk[..4], &[0, 0, 0, 0]);
    assert_eq!(chunk[4..6], chunk[6..8]);
}
