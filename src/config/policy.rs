//! Policy configuration loading from policies.toml
//!
//! Rollover and deficit-recovery behavior is tunable per deployment. Both
//! policy structs implement `Default` with the documented values, and every
//! field is individually optional in the TOML file, so a partial file merges
//! over the defaults once at load time. There is no mutable shared default
//! object; callers hold their own copy.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Controls how envelope balances carry across period boundaries.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RolloverPolicy {
    /// How many consecutive periods a "limited" envelope may roll before the
    /// limit applies (overridable per envelope via `max_rollover_months`)
    pub max_rollover_months: u32,
    /// At the limit: write the balance off (true) or roll anyway (false)
    pub reset_on_limit_exceeded: bool,
    /// Subtract deficits from the rolled amount (negative carry-forward)
    pub rollover_deficits: bool,
    /// Leave deficits tracked separately instead of netting them
    pub preserve_deficits: bool,
    /// Floor emergency-fund rollovers at their refill amount
    pub emergency_fund_priority: bool,
    /// Default refill floor when the envelope carries none of its own
    pub auto_refill_amount: f64,
}

impl Default for RolloverPolicy {
    fn default() -> Self {
        Self {
            max_rollover_months: 3,
            reset_on_limit_exceeded: true,
            rollover_deficits: false,
            preserve_deficits: true,
            emergency_fund_priority: true,
            auto_refill_amount: 0.0,
        }
    }
}

/// Controls deficit severity classification and recovery planning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeficitPolicy {
    /// Deficit at or above this is at least mild
    pub mild_threshold: f64,
    /// Deficit at or above this is at least moderate
    pub moderate_threshold: f64,
    /// Deficit at or above this is at least severe
    pub severe_threshold: f64,
    /// Deficit at or above this is critical
    pub critical_threshold: f64,
    /// Emergency funds only lend what exceeds this reserve
    pub emergency_fund_threshold: f64,
    /// Days a deficit may age before the host should escalate
    pub max_deficit_days: u32,
    /// Offer an external borrowing option when surplus cannot cover
    pub borrowing_allowed: bool,
    /// How many surplus envelopes to consider as recovery sources
    pub max_candidate_sources: u64,
}

impl Default for DeficitPolicy {
    fn default() -> Self {
        Self {
            mild_threshold: 50.0,
            moderate_threshold: 200.0,
            severe_threshold: 500.0,
            critical_threshold: 1000.0,
            emergency_fund_threshold: 100.0,
            max_deficit_days: 30,
            borrowing_allowed: false,
            max_candidate_sources: 5,
        }
    }
}

/// Configuration structure representing the entire policies.toml file
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rollover behavior overrides
    pub rollover: RolloverPolicy,
    /// Deficit recovery overrides
    pub deficit: DeficitPolicy,
}

/// Loads policy configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_policies<P: AsRef<Path>>(path: P) -> Result<PolicyConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read policy file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse policies.toml: {e}"),
    })
}

/// Loads policy configuration from `ENVELOPE_POLICY_PATH`, or returns the
/// documented defaults when the variable is unset.
pub fn load_default_policies() -> Result<PolicyConfig> {
    match std::env::var("ENVELOPE_POLICY_PATH") {
        Ok(path) => load_policies(path),
        Err(_) => Ok(PolicyConfig::default()),
    }
}
