use crate::config::effects::{TrackEffect, TrackParams};
use crate::foundation::core::Affine;

pub trait Lerp: Sized {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Lerp for f32 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        (f64::from(*a) + (f64::from(*b) - f64::from(*a)) * t) as f32
    }
}

impl Lerp for TrackEffect {
    /// `time_ms` is taken from `a`; the result is a sampled value, not a keyframe.
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Self {
            time_ms: a.time_ms,
            volume: f32::lerp(&a.volume, &b.volume, t),
            opacity: f32::lerp(&a.opacity, &b.opacity, t),
            scale: f32::lerp(&a.scale, &b.scale, t),
            rotation: f32::lerp(&a.rotation, &b.rotation, t),
            sepia: f32::lerp(&a.sepia, &b.sepia, t),
            pos_x: f32::lerp(&a.pos_x, &b.pos_x, t),
            pos_y: f32::lerp(&a.pos_y, &b.pos_y, t),
        }
    }
}

/// Keyframes surrounding `t_ms` and the interpolation fraction between them.
///
/// `from` is the latest keyframe at or before `t_ms`, `to` the earliest at or after it. Outside
/// the keyed range both collapse onto the nearest end and the fraction is 0.
pub fn bracket(effects: &[TrackEffect], t_ms: f64) -> Option<(&TrackEffect, &TrackEffect, f64)> {
    let first = effects.first()?;
    let to_idx = effects.partition_point(|k| (k.time_ms as f64) < t_ms);
    let Some(to) = effects.get(to_idx) else {
        let last = &effects[effects.len() - 1];
        return Some((last, last, 0.0));
    };
    if to_idx == 0 || to.time_ms as f64 == t_ms {
        let pinned = if to_idx == 0 { first } else { to };
        return Some((pinned, pinned, 0.0));
    }

    let from = &effects[to_idx - 1];
    let span = (to.time_ms - from.time_ms) as f64;
    let t = if span == 0.0 {
        0.0
    } else {
        (t_ms - from.time_ms as f64) / span
    };
    Some((from, to, t))
}

/// Interpolated keyframe values at `t_ms`. `None` only for an empty list.
pub fn sample(effects: &[TrackEffect], t_ms: f64) -> Option<TrackEffect> {
    let (from, to, t) = bracket(effects, t_ms)?;
    if t == 0.0 {
        return Some(*from);
    }
    Some(TrackEffect::lerp(from, to, t))
}

/// Linear volume at `t_ms`, silent when nothing is keyed.
pub fn volume_at(effects: &[TrackEffect], t_ms: f64) -> f32 {
    sample(effects, t_ms).map(|e| e.volume).unwrap_or(0.0)
}

/// Aspect correction of a decoded frame on the drawing plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteGeometry {
    /// Horizontal stretch applied to the unit plane, `width / height` of the source.
    pub scale_factor: f32,
    /// Multiplier on `pos_x` so positions land at the same relative spot for any orientation.
    pub translate_factor: f32,
}

impl SpriteGeometry {
    pub fn from_frame_size(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::default();
        }
        let scale_factor = width as f32 / height as f32;
        let translate_factor = if width > height {
            scale_factor
        } else {
            height as f32 / width as f32
        };
        Self {
            scale_factor,
            translate_factor,
        }
    }
}

impl Default for SpriteGeometry {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            translate_factor: 1.0,
        }
    }
}

/// Everything needed to draw one sprite at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameEffect {
    /// Maps the unit plane `[-1, 1]^2` into the drawing plane.
    pub transform: Affine,
    pub opacity: f32,
    pub sepia: f32,
    /// Horizontal split (in texture space) left of which sepia applies; `None` tones the whole frame.
    pub sepia_center: Option<f32>,
    pub volume: f32,
}

/// Evaluate a track's keyframes at composition time `t_ms`.
pub fn frame_effect(params: &TrackParams, t_ms: f64, geometry: SpriteGeometry) -> FrameEffect {
    let Some(v) = sample(&params.effects, t_ms) else {
        return FrameEffect {
            transform: Affine::IDENTITY,
            opacity: 0.0,
            sepia: 0.0,
            sepia_center: None,
            volume: 0.0,
        };
    };

    let transform = Affine::translate((
        f64::from(v.pos_x * geometry.translate_factor),
        f64::from(v.pos_y),
    )) * Affine::rotate(f64::from(v.rotation).to_radians())
        * Affine::scale_non_uniform(f64::from(geometry.scale_factor), 1.0)
        * Affine::scale(f64::from(v.scale));

    FrameEffect {
        transform,
        opacity: v.opacity,
        sepia: v.sepia,
        sepia_center: sepia_center(params, t_ms),
        volume: v.volume,
    }
}

/// Sepia split position for tracks that animate it.
///
/// Holds at 0.25 for the first 5s of the slot, ramps to 0.5 over half of the remaining slot and
/// back towards 0.25 over the other half.
pub fn sepia_center(params: &TrackParams, t_ms: f64) -> Option<f32> {
    if !params.has_sepia_position_animation {
        return None;
    }
    let hold_end = params.position_ms as f64 + 5_000.0;
    let half = (params.duration_ms as f64 - 5_000.0) / 2.0;
    if t_ms < hold_end || half <= 0.0 {
        return Some(0.25);
    }
    let center = if t_ms < hold_end + half {
        0.25 + 0.25 * (t_ms - hold_end) / half
    } else {
        0.5 - 0.25 * (t_ms - (hold_end + half)) / half
    };
    Some(center as f32)
}

#[cfg(test)]
#[path = "../../tests/unit/animation/keyframes.rs"]
mod tests;
