/// Database configuration and connection management
pub mod database;

/// Rollover and deficit policy loading from policies.toml
pub mod policy;

pub use policy::{DeficitPolicy, PolicyConfig, RolloverPolicy};
