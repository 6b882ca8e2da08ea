//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod envelope_allocation;
pub mod envelope_transfer;
pub mod period_instance;
pub mod period_template;
pub mod rollover_history;

// Re-export specific types to avoid conflicts
pub use envelope_allocation::{
    Column as EnvelopeAllocationColumn, Entity as EnvelopeAllocation, EnvelopeStatus,
    Model as EnvelopeAllocationModel, RolloverMode,
};
pub use envelope_transfer::{
    Column as EnvelopeTransferColumn, Entity as EnvelopeTransfer, Model as EnvelopeTransferModel,
};
pub use period_instance::{
    Column as PeriodInstanceColumn, Entity as PeriodInstance, Model as PeriodInstanceModel,
};
pub use period_template::{
    Column as PeriodTemplateColumn, Entity as PeriodTemplate, Model as PeriodTemplateModel,
    PeriodType,
};
pub use rollover_history::{
    Column as RolloverHistoryColumn, Entity as RolloverHistory, Model as RolloverHistoryModel,
};
