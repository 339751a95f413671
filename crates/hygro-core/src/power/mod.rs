//! Power management: wake sources, the gated peripheral rail and the
//! deep-sleep transition.

pub mod arbiter;
pub mod rail;
pub mod wake;

pub use arbiter::*;
pub use rail::*;
pub use wake::*;
