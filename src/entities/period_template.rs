//! Period template entity - The recurrence rule owned by a budget.
//!
//! A template describes how a budget's calendar is cut into periods
//! (weekly/monthly/quarterly/yearly plus anchor fields). Templates are
//! immutable once period instances have been generated from them; the engine
//! only ever reads these rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Recurrence kind for a period template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PeriodType {
    /// Period spans whole ISO weeks
    #[sea_orm(string_value = "weekly")]
    Weekly,
    /// Period spans whole calendar months
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// Period spans groups of three months
    #[sea_orm(string_value = "quarterly")]
    Quarterly,
    /// Period spans whole years
    #[sea_orm(string_value = "yearly")]
    Yearly,
    /// Boundaries are supplied by an external handler, never computed here
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl PeriodType {
    /// Stable lowercase name, matching the stored string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

/// Period template database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "period_templates")]
pub struct Model {
    /// Unique identifier for the template
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Budget this template belongs to
    pub budget_id: i64,
    /// Recurrence kind
    pub period_type: PeriodType,
    /// Number of base units per period (e.g. 2 for biweekly), at least 1
    pub interval_count: i32,
    /// ISO weekday the weekly period starts on (1=Monday .. 7=Sunday)
    pub start_day_of_week: i32,
    /// Day of month the monthly/quarterly/yearly period starts on (1-31)
    pub start_day_of_month: i32,
    /// Anchor month for yearly (and multi-month) alignment (1-12)
    pub start_month: i32,
    /// IANA timezone name, informational for the host layer
    pub timezone: String,
}

/// Defines relationships between templates and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One template generates many period instances
    #[sea_orm(has_many = "super::period_instance::Entity")]
    PeriodInstances,
}

impl Related<super::period_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PeriodInstances.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
