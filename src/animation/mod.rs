/// Keyframe bracketing, interpolation and per-frame effect evaluation.
pub mod keyframes;
