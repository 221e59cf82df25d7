//! Utility types and constants used throughout nvsec.
//!
//! - [`Size`] - Memory size representation
//! - Constants for page quantization ([`PAGE_SHIFT`], [`TOTAL_SLOTS`], etc.)
//! - Random number generation ([`Rng`])

mod constants;
mod rng;
mod size;

pub use self::constants::*;
pub use self::rng::Rng;
pub use self::size::Size;
