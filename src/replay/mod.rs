// ABOUTME: Replay of the delta log against a target database
// ABOUTME: Sequential, one delta per round trip, gated by the table existence oracle

pub mod engine;
pub mod oracle;

pub use engine::{ReplayEngine, ReplayOptions, ReplayStats};
pub use oracle::TableOracle;
