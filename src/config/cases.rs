use crate::config::effects::EffectId;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{MontageError, MontageResult};

/// Source clips the reference line-ups are built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clip {
    Uhd30,
    Portrait1080p30,
    Uhd60,
    Fhd120,
}

impl Clip {
    pub const ALL: [Clip; 4] = [Clip::Uhd30, Clip::Portrait1080p30, Clip::Uhd60, Clip::Fhd120];

    pub fn id(self) -> u8 {
        match self {
            Clip::Uhd30 => 1,
            Clip::Portrait1080p30 => 2,
            Clip::Uhd60 => 3,
            Clip::Fhd120 => 4,
        }
    }

    pub fn dimensions(self) -> Canvas {
        let (width, height) = match self {
            Clip::Uhd30 | Clip::Uhd60 => (3840, 2160),
            Clip::Portrait1080p30 => (1080, 1920),
            Clip::Fhd120 => (1920, 1080),
        };
        Canvas { width, height }
    }

    pub fn fps(self) -> Fps {
        let num = match self {
            Clip::Uhd30 | Clip::Portrait1080p30 => 30,
            Clip::Uhd60 => 60,
            Clip::Fhd120 => 120,
        };
        Fps { num, den: 1 }
    }

    /// Relative decode cost, used to pick which track gets real-time priority.
    pub fn decode_weight(self) -> u64 {
        let dims = self.dimensions();
        dims.pixel_count() as u64 * u64::from(self.fps().num)
    }

    pub fn label(self) -> String {
        let dims = self.dimensions();
        format!("{}x{}@{}", dims.width, dims.height, self.fps().num)
    }
}

/// A clip placed into an effect slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub clip: Clip,
    pub effect: EffectId,
}

/// A numbered track line-up.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TestCase {
    pub number: u32,
    pub tracks: Vec<Track>,
}

impl TestCase {
    /// Index of the track whose decoder is the most expensive.
    pub fn heaviest_track(&self, speed_of: impl Fn(EffectId) -> f64) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let wa = a.clip.decode_weight() as f64 * speed_of(a.effect);
                let wb = b.clip.decode_weight() as f64 * speed_of(b.effect);
                wa.total_cmp(&wb)
            })
            .map(|(i, _)| i)
    }
}

/// The twenty reference line-ups.
pub fn builtin() -> Vec<TestCase> {
    use Clip::*;
    use EffectId::*;

    let lineups: [&[(Clip, EffectId)]; 20] = [
        &[(Portrait1080p30, Effect1)],
        &[(Portrait1080p30, Effect1), (Portrait1080p30, Effect2)],
        &[
            (Portrait1080p30, Effect1),
            (Portrait1080p30, Effect2),
            (Portrait1080p30, Effect3),
        ],
        &[
            (Portrait1080p30, Effect1),
            (Portrait1080p30, Effect2),
            (Portrait1080p30, Effect3),
            (Portrait1080p30, Effect4),
        ],
        &[
            (Portrait1080p30, Effect1),
            (Portrait1080p30, Effect2),
            (Portrait1080p30, Effect3),
            (Portrait1080p30, Effect4),
            (Portrait1080p30, Effect1),
            (Portrait1080p30, Effect2),
        ],
        &[(Uhd30, Effect1), (Uhd30, Effect2)],
        &[
            (Uhd30, Effect1),
            (Uhd30, Effect3),
            (Fhd120, Effect2),
            (Fhd120, Effect4),
        ],
        &[
            (Uhd30, Effect1),
            (Portrait1080p30, Effect2),
            (Uhd60, Effect3),
            (Fhd120, Effect4),
        ],
        &[(Fhd120, Effect1)],
        &[(Fhd120, Effect1), (Fhd120, Effect2)],
        &[
            (Fhd120, Effect1),
            (Fhd120, Effect2),
            (Fhd120, Effect3),
            (Fhd120, Effect4),
        ],
        &[(Uhd30, Effect1)],
        &[(Uhd60, Effect1)],
        &[(Uhd60, Effect1), (Uhd60, Effect2)],
        &[(Uhd30, Effect1), (Portrait1080p30, Effect2)],
        &[(Uhd60, Effect1), (Fhd120, Effect2)],
        &[(Uhd30, Effect1), (Fhd120, Effect2)],
        &[(Portrait1080p30, Effect1), (Uhd60, Effect2)],
        &[
            (Portrait1080p30, Effect1),
            (Portrait1080p30, Effect2),
            (Uhd60, Effect3),
            (Uhd60, Effect4),
        ],
        &[
            (Uhd60, Effect1),
            (Uhd60, Effect2),
            (Fhd120, Effect3),
            (Fhd120, Effect4),
        ],
    ];

    lineups
        .iter()
        .zip(1u32..)
        .map(|(tracks, number)| TestCase {
            number,
            tracks: tracks
                .iter()
                .map(|&(clip, effect)| Track { clip, effect })
                .collect(),
        })
        .collect()
}

pub fn find(number: u32) -> MontageResult<TestCase> {
    builtin()
        .into_iter()
        .find(|c| c.number == number)
        .ok_or_else(|| MontageError::validation(format!("no test case numbered {number}")))
}

#[cfg(test)]
#[path = "../../tests/unit/config/cases.rs"]
mod tests;
