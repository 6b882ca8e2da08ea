//! Core business logic - framework-agnostic budgeting operations.
//!
//! Leaf-first: [`period`] is pure calendar math, [`ledger`] owns envelope
//! mutation, [`rollover`] and [`recovery`] read ledger state and move funds
//! only through the ledger's operations.

/// Envelope ledger - allocation, recomputation, and transfers
pub mod ledger;
/// Period boundary calculation and instance materialization
pub mod period;
/// Deficit recovery analysis, planning, and execution
pub mod recovery;
/// Rollover calculation across period boundaries
pub mod rollover;
