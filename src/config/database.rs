//! Database configuration module for the envelope engine.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! It provides functions for establishing database connections and creating all necessary tables
//! based on the entity definitions. The module uses `SeaORM`'s `Schema::create_table_from_entity`
//! method to automatically generate SQL statements from the entity models, ensuring that the
//! database schema matches the Rust struct definitions without requiring manual SQL.

use crate::entities::{
    EnvelopeAllocation, EnvelopeTransfer, PeriodInstance, PeriodTemplate, RolloverHistory,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Gets the database URL from environment variable or returns default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a default local `SQLite` file if not found.
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/envelopes.sqlite".to_string())
}

/// Establishes a connection to the `SQLite` database using the `DATABASE_URL` environment variable.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url()).await.map_err(Into::into)
}

/// Creates all necessary database tables using `SeaORM`'s schema generation from entity definitions.
///
/// This function uses the `DeriveEntityModel` macros to automatically generate proper SQL
/// statements for table creation, ensuring the database schema matches the Rust struct
/// definitions. It creates tables for period templates, period instances, envelope
/// allocations, transfers, and rollover history.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let template_table = schema.create_table_from_entity(PeriodTemplate);
    let instance_table = schema.create_table_from_entity(PeriodInstance);
    let allocation_table = schema.create_table_from_entity(EnvelopeAllocation);
    let transfer_table = schema.create_table_from_entity(EnvelopeTransfer);
    let history_table = schema.create_table_from_entity(RolloverHistory);

    db.execute(builder.build(&template_table)).await?;
    db.execute(builder.build(&instance_table)).await?;
    db.execute(builder.build(&allocation_table)).await?;
    db.execute(builder.build(&transfer_table)).await?;
    db.execute(builder.build(&history_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        envelope_allocation::Model as AllocationModel, envelope_transfer::Model as TransferModel,
        period_instance::Model as InstanceModel, period_template::Model as TemplateModel,
        rollover_history::Model as HistoryModel,
    };
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<TemplateModel> = PeriodTemplate::find().limit(1).all(&db).await?;
        let _: Vec<InstanceModel> = PeriodInstance::find().limit(1).all(&db).await?;
        let _: Vec<AllocationModel> = EnvelopeAllocation::find().limit(1).all(&db).await?;
        let _: Vec<TransferModel> = EnvelopeTransfer::find().limit(1).all(&db).await?;
        let _: Vec<HistoryModel> = RolloverHistory::find().limit(1).all(&db).await?;

        Ok(())
    }
}
