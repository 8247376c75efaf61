//! Process-wide `tracing` setup: start at `info`, then reload the filter
//! from settings.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
