//! Preview drawing and the per-pass compositor state machine.

pub mod compositor;
pub mod sprite;
pub mod surface;
