//! Envelope transfer entity - Append-only audit record of a fund movement.
//!
//! One row per successful [`crate::core::ledger::transfer`] call. Transfers
//! are the sole mechanism by which funds move between envelopes; rows are
//! never updated or deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Envelope transfer database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "envelope_transfers")]
pub struct Model {
    /// Unique identifier for the transfer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Envelope the funds left
    pub from_envelope_id: i64,
    /// Envelope the funds entered
    pub to_envelope_id: i64,
    /// Amount moved, strictly positive
    pub amount: f64,
    /// Human-readable reason for the movement
    pub reason: String,
    /// Actor that requested the transfer
    pub transferred_by: String,
    /// When the transfer was committed
    pub transferred_at: DateTimeUtc,
}

/// Defines relationships between transfers and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The source envelope
    #[sea_orm(
        belongs_to = "super::envelope_allocation::Entity",
        from = "Column::FromEnvelopeId",
        to = "super::envelope_allocation::Column::Id"
    )]
    FromEnvelope,
}

impl ActiveModelBehavior for ActiveModel {}
