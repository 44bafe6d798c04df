use super::*;
use crate::config::effects::{CompositionConfig, EffectId};

fn effects2() -> Vec<TrackEffect> {
    CompositionConfig::builtin()
        .params(EffectId::Effect2)
        .unwrap()
        .effects
        .clone()
}

#[test]
fn before_first_key_returns_first_unmodified() {
    let keys = effects2();
    let (from, to, t) = bracket(&keys, 0.0).unwrap();
    assert_eq!(from, &keys[0]);
    assert_eq!(to, &keys[0]);
    assert_eq!(t, 0.0);
    assert_eq!(sample(&keys, 1_234.0).unwrap(), keys[0]);
}

#[test]
fn exact_key_time_returns_that_key() {
    let keys = effects2();
    assert_eq!(sample(&keys, 10_000.0).unwrap(), keys[1]);
    assert_eq!(sample(&keys, 20_000.0).unwrap(), keys[2]);
}

#[test]
fn after_last_key_clamps_to_last() {
    let keys = effects2();
    let (from, to, t) = bracket(&keys, 29_000.0).unwrap();
    assert_eq!(from, &keys[2]);
    assert_eq!(to, &keys[2]);
    assert_eq!(t, 0.0);
}

#[test]
fn midpoint_interpolates_linearly() {
    let keys = effects2();
    let v = sample(&keys, 7_500.0).unwrap();
    assert!((v.volume - 0.8).abs() < 1e-6);
    assert!((v.opacity - 0.25).abs() < 1e-6);
    assert!((v.rotation - -5.0).abs() < 1e-5);
    assert!((volume_at(&keys, 15_000.0) - 0.925).abs() < 1e-6);
}

#[test]
fn duplicate_times_do_not_divide_by_zero() {
    let k = TrackEffect::new(1_000, 0.2, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0);
    let k2 = TrackEffect { volume: 0.9, ..k };
    let keys = vec![k, k2];
    let v = sample(&keys, 1_000.0).unwrap();
    assert_eq!(v.volume, 0.2);
    assert!(bracket(&[], 10.0).is_none());
    assert_eq!(volume_at(&[], 10.0), 0.0);
}

#[test]
fn geometry_factors_follow_orientation() {
    let landscape = SpriteGeometry::from_frame_size(1920, 1080);
    assert!((landscape.scale_factor - 16.0 / 9.0).abs() < 1e-6);
    assert_eq!(landscape.translate_factor, landscape.scale_factor);

    let portrait = SpriteGeometry::from_frame_size(1080, 1920);
    assert!((portrait.scale_factor - 0.5625).abs() < 1e-6);
    assert!((portrait.translate_factor - 1920.0 / 1080.0).abs() < 1e-6);
}

#[test]
fn frame_effect_composes_translate_rotate_scale() {
    let cfg = CompositionConfig::builtin();
    let params = cfg.params(EffectId::Effect1).unwrap();
    let geometry = SpriteGeometry::default();
    let fx = frame_effect(params, 15_000.0, geometry);
    // Keyframe at 15s: scale 0.6, no rotation, centered.
    let corner = fx.transform * crate::foundation::core::Point::new(1.0, 1.0);
    assert!((corner.x - 0.6).abs() < 1e-6);
    assert!((corner.y - 0.6).abs() < 1e-6);
    assert_eq!(fx.opacity, 0.5);
    assert!(fx.sepia_center.is_none());

    let fx0 = frame_effect(params, 0.0, geometry);
    let center = fx0.transform * crate::foundation::core::Point::new(0.0, 0.0);
    assert!((center.x - -0.5).abs() < 1e-6);
    assert!((center.y - 0.5).abs() < 1e-6);
}

#[test]
fn sepia_center_holds_then_ramps() {
    let cfg = CompositionConfig::builtin();
    let params = cfg.params(EffectId::Effect4).unwrap();
    // Slot starts at 5s and lasts 20s: hold until 10s, peak at 17.5s.
    assert_eq!(sepia_center(params, 6_000.0), Some(0.25));
    let peak = sepia_center(params, 17_500.0).unwrap();
    assert!((peak - 0.5).abs() < 1e-6);
    let ramp = sepia_center(params, 13_750.0).unwrap();
    assert!((ramp - 0.375).abs() < 1e-6);
    let back = sepia_center(params, 25_000.0).unwrap();
    assert!((back - 0.25).abs() < 1e-6);

    let plain = cfg.params(EffectId::Effect1).unwrap();
    assert_eq!(sepia_center(plain, 6_000.0), None);
}
