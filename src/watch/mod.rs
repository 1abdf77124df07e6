//! Tree Watch Engine and the notification dispatcher that drives it.

mod dispatcher;
mod engine;
mod registry;
pub use dispatcher::*;
pub use engine::*;
pub use registry::*;

#[cfg(test)]
mod dispatcher_test;
