//! Shared test utilities for the envelope engine.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{ledger, period},
    entities::{self, EnvelopeStatus, PeriodType, RolloverMode},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Installs a tracing subscriber honoring `RUST_LOG` for test diagnostics.
/// Safe to call from several tests; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test period template for budget 1 with default anchors
/// (Monday / 1st of the month / January).
pub async fn create_test_template(
    db: &DatabaseConnection,
    period_type: PeriodType,
) -> Result<entities::period_template::Model> {
    let template = entities::period_template::ActiveModel {
        budget_id: Set(1),
        period_type: Set(period_type),
        interval_count: Set(1),
        start_day_of_week: Set(1),
        start_day_of_month: Set(1),
        start_month: Set(1),
        timezone: Set("UTC".to_string()),
        ..Default::default()
    };
    let result = template.insert(db).await?;
    Ok(result)
}

/// Sets up a database with one monthly template and one materialized period
/// (March 2024). Returns (db, period) for ledger and recovery tests.
pub async fn setup_with_period() -> Result<(
    DatabaseConnection,
    entities::period_instance::Model,
)> {
    let db = setup_test_db().await?;
    let template = create_test_template(&db, PeriodType::Monthly).await?;
    let reference = NaiveDate::from_ymd_opt(2024, 3, 15).ok_or_else(|| {
        crate::errors::Error::Validation {
            message: "bad fixture date".to_string(),
        }
    })?;
    let instance = period::materialize_instance(&db, template.id, reference).await?;
    Ok((db, instance))
}

/// Sets up a database with two consecutive monthly periods (March and April
/// 2024). Returns (db, from, to) for rollover tests.
pub async fn setup_with_period_pair() -> Result<(
    DatabaseConnection,
    entities::period_instance::Model,
    entities::period_instance::Model,
)> {
    let (db, from) = setup_with_period().await?;
    let next_reference = NaiveDate::from_ymd_opt(2024, 4, 10).ok_or_else(|| {
        crate::errors::Error::Validation {
            message: "bad fixture date".to_string(),
        }
    })?;
    let to = period::materialize_instance(&db, from.template_id, next_reference).await?;
    Ok((db, from, to))
}

/// A plain in-memory envelope for pure-function tests; no database row.
#[must_use]
pub fn manual_envelope() -> entities::envelope_allocation::Model {
    let now = Utc::now();
    entities::envelope_allocation::Model {
        id: 1,
        budget_id: 1,
        category_id: 10,
        period_instance_id: 1,
        allocated_amount: 0.0,
        spent_amount: 0.0,
        rollover_amount: 0.0,
        available_amount: 0.0,
        deficit_amount: 0.0,
        status: EnvelopeStatus::Depleted,
        rollover_mode: RolloverMode::Unlimited,
        is_emergency_fund: false,
        priority: 5,
        max_rollover_months: None,
        auto_refill: None,
        last_calculated: now,
        updated_at: now,
    }
}

/// Writes a rollover amount onto an existing envelope row and rederives its
/// balance fields, simulating funds carried in from a previous period.
pub async fn seed_rollover(
    db: &DatabaseConnection,
    envelope_id: i64,
    rollover_amount: f64,
) -> Result<entities::envelope_allocation::Model> {
    use sea_orm::EntityTrait;

    let envelope = entities::EnvelopeAllocation::find_by_id(envelope_id)
        .one(db)
        .await?
        .ok_or(crate::errors::Error::NotFound {
            entity: "envelope",
            id: envelope_id,
        })?;

    let derived = ledger::derive_fields(
        envelope.allocated_amount,
        rollover_amount,
        envelope.spent_amount,
    );
    let mut active: entities::envelope_allocation::ActiveModel = envelope.into();
    active.rollover_amount = Set(rollover_amount);
    active.available_amount = Set(derived.available);
    active.deficit_amount = Set(derived.deficit);
    active.status = Set(derived.status);
    let result = active.update(db).await?;
    Ok(result)
}
