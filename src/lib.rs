//! Watch-driven mirror of package repository metadata kept in a ZooKeeper-like
//! coordination store.
//!
//! ```text
//! coordination store ──watch──> TreeWatchEngine ──diff──> LocalMirror <── reads
//!          ^                                                  ^
//!          └──────────────── WriteBackEngine ─────optimistic──┘ <── writes
//! ```
//!
//! [`MirrorCache`] is the entry point: it connects, installs the watch tree
//! and serves reads from memory while writes go through the write-back path.

mod cache;
mod config;
mod constants;
mod coord;
mod errors;
mod metrics;
mod mirror;
mod path;
pub mod utils;
mod watch;
mod write_back;

pub use cache::*;
pub use config::*;
pub use coord::*;
pub use errors::*;
pub use metrics::*;
pub use mirror::*;
pub use path::*;
pub use watch::*;
pub use write_back::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
