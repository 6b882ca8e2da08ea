//! Envelope allocation entity - The envelope itself.
//!
//! One row tracks budgeted vs. spent funds for one category in one period,
//! uniquely keyed by (`budget_id`, `category_id`, `period_instance_id`).
//! The derived fields (`available_amount`, `deficit_amount`, `status`) are
//! always recomputed together by [`crate::core::ledger`]; no other module
//! writes them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How unspent funds behave at a period boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RolloverMode {
    /// Unspent funds always carry into the next period
    #[sea_orm(string_value = "unlimited")]
    Unlimited,
    /// Unspent funds are written off at every period boundary
    #[sea_orm(string_value = "reset")]
    Reset,
    /// Funds carry forward for a bounded number of consecutive periods
    #[sea_orm(string_value = "limited")]
    Limited,
}

/// Lifecycle status derived from the envelope's balance fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum EnvelopeStatus {
    /// Funds remain available
    #[sea_orm(string_value = "active")]
    Active,
    /// Spend exceeds allocated + rollover
    #[sea_orm(string_value = "overspent")]
    Overspent,
    /// Exactly spent down to zero available, no deficit
    #[sea_orm(string_value = "depleted")]
    Depleted,
}

/// Envelope allocation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "envelope_allocations")]
pub struct Model {
    /// Unique identifier for the envelope
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Budget this envelope belongs to
    pub budget_id: i64,
    /// Category this envelope tracks
    pub category_id: i64,
    /// Period instance this envelope covers
    pub period_instance_id: i64,
    /// Funds allocated into the envelope for this period
    pub allocated_amount: f64,
    /// Spend observed against the envelope, supplied by the external aggregator
    pub spent_amount: f64,
    /// Funds carried in from the previous period
    pub rollover_amount: f64,
    /// Derived: max(0, allocated + rollover - spent)
    pub available_amount: f64,
    /// Derived: max(0, spent - (allocated + rollover))
    pub deficit_amount: f64,
    /// Derived lifecycle status
    pub status: EnvelopeStatus,
    /// Rollover behavior at period boundaries
    pub rollover_mode: RolloverMode,
    /// Emergency-fund envelopes are refilled first and offered first in recovery
    pub is_emergency_fund: bool,
    /// Recovery-source ordering, lower offered first
    pub priority: i32,
    /// Per-envelope override of the policy rollover limit
    pub max_rollover_months: Option<i32>,
    /// Floor the rollover at this amount when this is an emergency fund
    pub auto_refill: Option<f64>,
    /// When the derived fields were last recomputed
    pub last_calculated: DateTimeUtc,
    /// Optimistic-concurrency timestamp for the persistence layer
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between envelopes and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The period instance this envelope covers
    #[sea_orm(
        belongs_to = "super::period_instance::Entity",
        from = "Column::PeriodInstanceId",
        to = "super::period_instance::Column::Id"
    )]
    PeriodInstance,
    /// One envelope has many rollover history rows
    #[sea_orm(has_many = "super::rollover_history::Entity")]
    RolloverHistory,
}

impl Related<super::period_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PeriodInstance.def()
    }
}

impl Related<super::rollover_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RolloverHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
