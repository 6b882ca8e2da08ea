//! Period instance entity - One concrete date range generated from a template.
//!
//! Instances of one template tile the calendar: the `end_date` of instance N
//! immediately precedes the `start_date` of instance N+1, with no gaps and no
//! overlap. Both dates are inclusive.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Period instance database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "period_instances")]
pub struct Model {
    /// Unique identifier for the instance
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Template this instance was generated from
    pub template_id: i64,
    /// Budget this instance belongs to
    pub budget_id: i64,
    /// First day covered by the period (inclusive)
    pub start_date: Date,
    /// Last day covered by the period (inclusive)
    pub end_date: Date,
    /// Total allocated across all envelopes in this period
    pub allocated_amount: f64,
    /// Total rolled into this period from the previous one
    pub rollover_amount: f64,
    /// Spend observed for this range, supplied by the external aggregator
    pub actual_amount: f64,
}

/// Defines relationships between period instances and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The template that generated this instance
    #[sea_orm(
        belongs_to = "super::period_template::Entity",
        from = "Column::TemplateId",
        to = "super::period_template::Column::Id"
    )]
    PeriodTemplate,
    /// One period instance has many envelope allocations
    #[sea_orm(has_many = "super::envelope_allocation::Entity")]
    EnvelopeAllocations,
}

impl Related<super::period_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PeriodTemplate.def()
    }
}

impl Related<super::envelope_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EnvelopeAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
