//! Data layer for health-combine.
//!
//! Discovers export files, loads and projects individual sources, merges them
//! on their time key, shapes the merged result and writes it back out as CSV.

pub mod discovery;
pub mod loader;
pub mod merge;
pub mod projector;
pub mod shaping;
pub mod writer;
