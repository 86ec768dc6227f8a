//! Transport implementations
//!
//! Only the simulated board lives here; the USB transport of a physical
//! board plugs in through the same [`Transport`](crate::Transport) trait.

pub mod software;

pub use software::{Completion, SoftwareTransport};
