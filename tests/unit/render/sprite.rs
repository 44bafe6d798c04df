use std::sync::{Arc, Mutex};

use super::*;
use crate::config::effects::{CompositionConfig, EffectId};
use crate::foundation::error::MontageResult;
use crate::player::{AudioObserver, PlayerEvent};

#[derive(Debug, Default)]
struct Calls {
    play_when_ready: bool,
    speed: f64,
    volume: f32,
    seeks: Vec<i64>,
    frames_taken: u32,
}

struct FakePlayer {
    track: usize,
    calls: Arc<Mutex<Calls>>,
}

impl TrackPlayer for FakePlayer {
    fn track(&self) -> usize {
        self.track
    }
    fn set_play_when_ready(&mut self, play: bool) {
        self.calls.lock().unwrap().play_when_ready = play;
    }
    fn play_when_ready(&self) -> bool {
        self.calls.lock().unwrap().play_when_ready
    }
    fn seek_to(&mut self, source_ms: i64) {
        self.calls.lock().unwrap().seeks.push(source_ms);
    }
    fn set_speed(&mut self, speed: f64) {
        self.calls.lock().unwrap().speed = speed;
    }
    fn speed(&self) -> f64 {
        self.calls.lock().unwrap().speed
    }
    fn set_volume(&mut self, volume: f32) {
        self.calls.lock().unwrap().volume = volume;
    }
    fn volume(&self) -> f32 {
        self.calls.lock().unwrap().volume
    }
    fn take_latest_frame(&mut self) -> Option<DecodedFrame> {
        let mut calls = self.calls.lock().unwrap();
        calls.frames_taken += 1;
        Some(DecodedFrame {
            width: 2,
            height: 1,
            pixels: Arc::from(vec![255u8; 8]),
            pts_ms: i64::from(calls.frames_taken),
        })
    }
    fn frame_size(&self) -> (u32, u32) {
        (1920, 1080)
    }
    fn poll_event(&mut self) -> Option<PlayerEvent> {
        None
    }
    fn retry(&mut self) -> MontageResult<()> {
        Ok(())
    }
    fn set_audio_observer(&mut self, _observer: Option<Arc<dyn AudioObserver>>) {}
    fn release(&mut self) {}
}

fn sprite(effect: EffectId) -> (Sprite, Arc<Mutex<Calls>>) {
    let params = CompositionConfig::builtin().params(effect).unwrap().clone();
    let calls = Arc::new(Mutex::new(Calls::default()));
    let player = FakePlayer {
        track: 1,
        calls: calls.clone(),
    };
    (Sprite::new(params, Box::new(player)), calls)
}

#[test]
fn visibility_window_includes_both_slot_edges() {
    assert!(!is_within_window(4_999, 5_000, 10_000, 0));
    assert!(is_within_window(5_000, 5_000, 10_000, 0));
    assert!(is_within_window(14_999, 5_000, 10_000, 0));
    assert!(is_within_window(15_000, 5_000, 10_000, 0));
    assert!(!is_within_window(15_001, 5_000, 10_000, 0));
    assert!(is_within_window(4_900, 5_000, 10_000, 100));
}

#[test]
fn export_reports_start_and_finish_of_the_slot() {
    // Effect2 occupies 5s..20s.
    let (mut s, calls) = sprite(EffectId::Effect2);
    s.export(1_000, 0.5);
    assert_eq!(calls.lock().unwrap().volume, 0.0);

    let early = s.update(1_000 + 2 * 4_000);
    assert!(early.effect.is_none());
    assert!(early.activity.is_empty());

    let inside = s.update(1_000 + 2 * 6_000);
    assert_eq!(s.time_position_ms(), 6_000);
    assert_eq!(inside.activity, vec![TrackActivity::Started(1)]);
    assert!(inside.effect.is_some());
    assert!(calls.lock().unwrap().play_when_ready);

    let after = s.update(1_000 + 2 * 21_000);
    assert_eq!(after.activity, vec![TrackActivity::Finished(1)]);
    assert!(after.effect.is_none());
    assert!(!calls.lock().unwrap().play_when_ready);

    // Finished tracks stay quiet for the rest of the run.
    let later = s.update(1_000 + 2 * 22_000);
    assert!(later.activity.is_empty());
}

#[test]
fn export_clock_clamps_at_the_composition_end() {
    let (mut s, _) = sprite(EffectId::Effect1);
    s.export(0, 0.5);
    s.update(100_000);
    assert_eq!(s.time_position_ms(), COMPOSITION_DURATION_MS);
}

#[test]
fn slot_ending_at_the_composition_end_keeps_drawing() {
    let (mut s, _) = sprite(EffectId::Effect1);
    s.export(0, 0.5);
    s.update(2 * 10_000);
    let last = s.update(2 * 40_000);
    assert!(last.effect.is_some());
    assert!(last.activity.is_empty());
}

#[test]
fn export_speed_compensates_slow_slots() {
    // Effect4 plays 5s of source over a 20s slot.
    let (mut s, calls) = sprite(EffectId::Effect4);
    s.export(0, 0.5);
    let expected = 0.5 * 0.25 * 1.2;
    assert!((calls.lock().unwrap().speed - expected).abs() < 1e-12);

    s.pause();
    assert_eq!(s.state(), PlayerState::Pause);
    assert!((calls.lock().unwrap().speed - 0.25).abs() < 1e-12);
    assert_eq!(calls.lock().unwrap().volume, 1.0);
}

#[test]
fn seek_maps_composition_time_to_source_time() {
    // Effect2: slot at 5s, source starts at 1s, speed 1.
    let (mut s, calls) = sprite(EffectId::Effect2);
    s.seek(8_000);
    s.seek(1_000);
    assert_eq!(calls.lock().unwrap().seeks, vec![4_000, 0]);
    assert_eq!(s.state(), PlayerState::Seek);
    assert_eq!(s.time_position_ms(), 1_000);
}

#[test]
fn play_resumes_from_the_current_position() {
    let (mut s, calls) = sprite(EffectId::Effect1);
    s.seek(3_000);
    s.play(10_000);
    assert_eq!(s.system_start_ms(), 7_000);
    let update = s.update(10_500);
    assert_eq!(s.time_position_ms(), 3_500);
    assert!(update.effect.is_some());
    assert!(update.activity.is_empty());
    assert!(calls.lock().unwrap().play_when_ready);
}

#[test]
fn geometry_follows_the_clip_size() {
    let (mut s, _) = sprite(EffectId::Effect1);
    s.play(0);
    s.update(10);
    let g = s.geometry();
    assert!((g.scale_factor - 1920.0 / 1080.0).abs() < 1e-6);
    assert!(s.frame().is_some());
}

#[test]
fn fps_stats_track_extremes_and_mean() {
    let mut fps = FpsStats::default();
    fps.record(0);
    fps.record(10);
    fps.record(30);
    fps.record(30);
    assert_eq!(fps.samples(), 2);
    assert_eq!(fps.max, 100.0);
    assert_eq!(fps.min, 50.0);
    assert_eq!(fps.average(), 75.0);
    fps.reset();
    assert_eq!(fps.average(), 0.0);
}
