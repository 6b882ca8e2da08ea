//! Rollover history entity - Append-only record of one envelope's rollover.
//!
//! One row is written per envelope per bulk rollover, even when the rolled
//! amount is zero, so the audit trail is complete. Because each period has
//! its own allocation row, the row also carries `budget_id` and `category_id`
//! so the consecutive-rollover streak for "limited" mode can be reconstructed
//! across periods.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rollover history database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rollover_history")]
pub struct Model {
    /// Unique identifier for the history row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// The source-period envelope that was processed
    pub envelope_id: i64,
    /// Budget the envelope belongs to
    pub budget_id: i64,
    /// Category the envelope tracks
    pub category_id: i64,
    /// Period the funds rolled out of
    pub from_period_id: i64,
    /// Period the funds rolled into
    pub to_period_id: i64,
    /// Amount carried forward (may be negative when deficits roll)
    pub rolled_amount: f64,
    /// Amount written off instead of carried
    pub reset_amount: f64,
    /// When the rollover was processed
    pub processed_at: DateTimeUtc,
}

/// Defines relationships between history rows and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The envelope this row was written for
    #[sea_orm(
        belongs_to = "super::envelope_allocation::Entity",
        from = "Column::EnvelopeId",
        to = "super::envelope_allocation::Column::Id"
    )]
    Envelope,
}

impl Related<super::envelope_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Envelope.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
