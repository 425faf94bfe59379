//! Layered config injection for managed bot workloads.
//!
//! Each workload gets a namespace directory in the shared volume
//! holding up to four JSON config layers and the strategy source file.
//! The layers merge last-wins in the trading process; the
//! system-forced secure layer is always written and referenced last so
//! tenant config can never override it.

mod injector;
mod merge;
mod sanitize;

pub use injector::{ConfigFilePaths, ConfigInjector, ConfigLayer, InjectError, RunFilePaths};
pub use merge::{merge_into, merge_layers};
pub use sanitize::{sanitize_strategy_name, strategy_filename};
