//! Shared process-level utilities.

mod ids;
mod logging;

pub use ids::is_safe_id;
pub use logging::init_logging;
