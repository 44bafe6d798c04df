use std::path::Path;

use crate::foundation::core::COMPOSITION_DURATION_MS;
use crate::foundation::error::{MontageError, MontageResult};

/// Identifier of one built-in keyframe set.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EffectId {
    Effect1,
    Effect2,
    Effect3,
    Effect4,
}

impl EffectId {
    pub const ALL: [EffectId; 4] = [
        EffectId::Effect1,
        EffectId::Effect2,
        EffectId::Effect3,
        EffectId::Effect4,
    ];

    /// 1-based number used on the command line and in case listings.
    pub fn number(self) -> u8 {
        match self {
            EffectId::Effect1 => 1,
            EffectId::Effect2 => 2,
            EffectId::Effect3 => 3,
            EffectId::Effect4 => 4,
        }
    }

    pub fn from_number(n: u8) -> MontageResult<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.number() == n)
            .ok_or_else(|| MontageError::validation(format!("unknown effect id {n}")))
    }
}

/// One keyframe. Rotation is in degrees, positions are in plane units.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackEffect {
    pub time_ms: i64,
    pub volume: f32,
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
    pub sepia: f32,
    pub pos_x: f32,
    pub pos_y: f32,
}

impl TrackEffect {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        time_ms: i64,
        volume: f32,
        opacity: f32,
        scale: f32,
        rotation: f32,
        sepia: f32,
        pos_x: f32,
        pos_y: f32,
    ) -> Self {
        Self {
            time_ms,
            volume,
            opacity,
            scale,
            rotation,
            sepia,
            pos_x,
            pos_y,
        }
    }
}

/// Timing of one effect slot inside the composition, plus its keyframes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackParams {
    pub effect: EffectId,
    /// Offset of the slot in the composition timeline.
    pub position_ms: i64,
    pub duration_ms: i64,
    /// Source position the slot starts playing from.
    pub start_video_from_ms: i64,
    /// Amount of source video squeezed into `duration_ms`.
    pub video_duration_ms: i64,
    pub has_sepia_position_animation: bool,
    pub effects: Vec<TrackEffect>,
}

impl TrackParams {
    /// Source playback rate that maps `video_duration_ms` onto the slot.
    pub fn play_speed(&self) -> f64 {
        self.video_duration_ms as f64 / self.duration_ms as f64
    }

    pub fn end_ms(&self) -> i64 {
        self.position_ms + self.duration_ms
    }

    pub fn validate(&self) -> MontageResult<()> {
        if self.duration_ms <= 0 {
            return Err(MontageError::validation(format!(
                "{:?}: duration must be positive",
                self.effect
            )));
        }
        if self.video_duration_ms <= 0 {
            return Err(MontageError::validation(format!(
                "{:?}: video duration must be positive",
                self.effect
            )));
        }
        if self.effects.is_empty() {
            return Err(MontageError::validation(format!(
                "{:?}: keyframe list must not be empty",
                self.effect
            )));
        }
        if self.effects.windows(2).any(|w| w[1].time_ms < w[0].time_ms) {
            return Err(MontageError::validation(format!(
                "{:?}: keyframes must be ordered by time",
                self.effect
            )));
        }
        Ok(())
    }
}

/// Immutable effect table injected into the compositor and the encoders.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompositionConfig {
    pub duration_ms: i64,
    pub tracks: Vec<TrackParams>,
}

impl CompositionConfig {
    /// The four reference effect slots.
    pub fn builtin() -> Self {
        let effects1 = vec![
            TrackEffect::new(0, 1.0, 1.0, 0.4, -45.0, 0.0, -0.5, 0.5),
            TrackEffect::new(15_000, 0.5, 0.5, 0.6, 0.0, 0.0, 0.0, 0.0),
            TrackEffect::new(25_000, 1.0, 0.5, 0.3, 45.0, 0.0, 0.5, -0.5),
            TrackEffect::new(30_000, 1.0, 1.0, 0.3, 45.0, 0.0, 0.5, -0.5),
        ];
        let effects2 = vec![
            TrackEffect::new(5_000, 0.75, 0.0, 0.45, 0.0, 1.0, 0.5, 0.5),
            TrackEffect::new(10_000, 0.85, 0.5, 0.5, -10.0, 0.0, 0.0, 0.0),
            TrackEffect::new(20_000, 1.0, 0.0, 0.2, 10.0, 1.0, -0.5, -0.5),
        ];
        let effects3 = vec![
            TrackEffect::new(10_000, 1.0, 0.25, 0.35, 15.0, 0.0, 0.7, -0.5),
            TrackEffect::new(25_000, 1.0, 0.25, 0.35, -15.0, 0.0, 0.7, 0.5),
        ];
        let effects4 = vec![
            TrackEffect::new(5_000, 1.0, 0.5, 0.25, 0.0, 0.0, -0.5, 0.0),
            TrackEffect::new(10_000, 1.0, 0.5, 0.25, 0.0, 0.0, -0.5, 0.0),
            TrackEffect::new(15_000, 0.5, 0.0, 0.5, 180.0, 0.0, 0.0, 0.0),
            TrackEffect::new(20_000, 1.0, 0.5, 0.25, 360.0, 0.0, -0.5, 0.0),
            TrackEffect::new(30_000, 1.0, 0.5, 0.25, 360.0, 0.0, -0.5, 0.0),
        ];

        fn slot(
            effect: EffectId,
            timing: [i64; 4],
            has_sepia_position_animation: bool,
            effects: Vec<TrackEffect>,
        ) -> TrackParams {
            let [position_ms, duration_ms, start_video_from_ms, video_duration_ms] = timing;
            TrackParams {
                effect,
                position_ms,
                duration_ms,
                start_video_from_ms,
                video_duration_ms,
                has_sepia_position_animation,
                effects,
            }
        }

        Self {
            duration_ms: COMPOSITION_DURATION_MS,
            tracks: vec![
                slot(EffectId::Effect1, [0, 30_000, 0, 30_000], false, effects1),
                slot(EffectId::Effect2, [5_000, 15_000, 1_000, 15_000], false, effects2),
                slot(EffectId::Effect3, [10_000, 15_000, 0, 30_000], false, effects3),
                slot(EffectId::Effect4, [5_000, 20_000, 5_000, 5_000], true, effects4),
            ],
        }
    }

    pub fn from_json_path(path: &Path) -> MontageResult<Self> {
        use anyhow::Context as _;
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open composition config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> MontageResult<()> {
        if self.duration_ms <= 0 {
            return Err(MontageError::validation(
                "composition duration must be positive",
            ));
        }
        for (i, t) in self.tracks.iter().enumerate() {
            t.validate()?;
            if self.tracks[..i].iter().any(|o| o.effect == t.effect) {
                return Err(MontageError::validation(format!(
                    "{:?} is defined more than once",
                    t.effect
                )));
            }
        }
        Ok(())
    }

    pub fn params(&self, effect: EffectId) -> MontageResult<&TrackParams> {
        self.tracks
            .iter()
            .find(|t| t.effect == effect)
            .ok_or_else(|| MontageError::validation(format!("no track params for {effect:?}")))
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/effects.rs"]
mod tests;
