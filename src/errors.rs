//! Unified error types for the envelope budgeting engine.
//!
//! Single-item operations fail hard with one of these variants. Bulk
//! operations (rollover batches, recovery batches) collect per-item failures
//! into their summary types instead of returning an `Err` for the whole batch.

use thiserror::Error;

/// All errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file or policy loading failure
    #[error("Configuration error: {message}")]
    Config {
        /// Details about what went wrong
        message: String,
    },

    /// Caller supplied input that violates an engine invariant
    #[error("Validation error: {message}")]
    Validation {
        /// Details about the rejected input
        message: String,
    },

    /// Amount is negative, zero where positive is required, or non-finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Source envelope does not hold enough available funds
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Funds available in the source envelope
        available: f64,
        /// Amount the caller tried to move
        requested: f64,
    },

    /// An allocation already exists for this (budget, category, period) tuple
    #[error(
        "Allocation already exists for budget {budget_id}, category {category_id}, period {period_instance_id}"
    )]
    DuplicateAllocation {
        /// Budget the allocation belongs to
        budget_id: i64,
        /// Category the allocation belongs to
        category_id: i64,
        /// Period instance the allocation covers
        period_instance_id: i64,
    },

    /// Period type has no built-in boundary calculation
    #[error("Unsupported period type: {period_type}")]
    UnsupportedPeriod {
        /// The offending period type
        period_type: String,
    },

    /// Lookup by id found nothing
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "envelope" or "period instance"
        entity: &'static str,
        /// The id that was looked up
        id: i64,
    },

    /// Persistence-layer failure, surfaced verbatim
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
