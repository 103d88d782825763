//! Runtime layer for health-combine.
//!
//! [`engine::CombinationEngine`] drives one combination from raw sources to a
//! written table; [`registry::CombinationRegistry`] runs every configured
//! combination, sequentially or on tokio's blocking pool.

pub mod engine;
pub mod registry;
pub mod tracing_sink;

pub use engine::{CombinationEngine, CombinationOutcome, CombinationReport};
pub use registry::{CombinationRegistry, RunSummary};
pub use tracing_sink::TracingSink;
