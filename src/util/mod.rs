//! Utility types and functions for rtbind.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`align_up`] / [`is_power_of_two`] - Alignment helpers shared by the
//!   binding table layout and the archive container

mod align;
mod error;

pub use align::*;
pub use error::*;
