//! Envelope ledger - Owns every mutation of envelope allocations.
//!
//! The three derived fields (`available_amount`, `deficit_amount`, `status`)
//! are only ever written together, through [`derive_fields`], from the raw
//! `allocated`/`rollover`/`spent` numbers. Rollover and deficit recovery both
//! move funds exclusively through [`transfer`] and [`allocate`], never by
//! writing envelope fields directly, so the invariants stay centralized here.
//!
//! A transfer moves the amount through the allocated column of both
//! envelopes and rederives both sides. That means a transfer into an
//! overspent envelope pays its deficit down first and only the remainder
//! shows up as available - the deficit is never decremented directly.

use crate::{
    entities::{
        EnvelopeAllocation, EnvelopeStatus, RolloverMode, envelope_allocation, envelope_transfer,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};

/// Optional per-envelope metadata, defaulted when not supplied.
///
/// Replaces the loose metadata bag of earlier designs with explicit fields.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeMetadata {
    /// Emergency funds are refilled first at rollover and offered first in recovery
    pub is_emergency_fund: bool,
    /// Recovery-source ordering, lower offered first
    pub priority: i32,
    /// Per-envelope override of the policy rollover limit
    pub max_rollover_months: Option<i32>,
    /// Rollover floor for emergency funds
    pub auto_refill: Option<f64>,
}

impl Default for EnvelopeMetadata {
    fn default() -> Self {
        Self {
            is_emergency_fund: false,
            priority: 5,
            max_rollover_months: None,
            auto_refill: None,
        }
    }
}

/// The derived portion of an envelope, always computed as one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFields {
    /// max(0, allocated + rollover - spent)
    pub available: f64,
    /// max(0, spent - (allocated + rollover))
    pub deficit: f64,
    /// Status implied by the two amounts
    pub status: EnvelopeStatus,
}

/// Computes available/deficit/status from the raw envelope numbers.
///
/// Every mutation path funnels through this function; it is the single
/// definition of the ledger invariants.
#[must_use]
pub fn derive_fields(allocated: f64, rollover: f64, spent: f64) -> DerivedFields {
    let funded = allocated + rollover;
    let available = (funded - spent).max(0.0);
    let deficit = (spent - funded).max(0.0);
    let status = if deficit > 0.0 {
        EnvelopeStatus::Overspent
    } else if available <= 0.0 {
        EnvelopeStatus::Depleted
    } else {
        EnvelopeStatus::Active
    };

    DerivedFields {
        available,
        deficit,
        status,
    }
}

/// Creates an envelope for a (budget, category, period) tuple with default
/// metadata. See [`allocate_with_metadata`].
///
/// # Errors
/// `DuplicateAllocation` when the tuple already has an envelope,
/// `InvalidAmount` for negative or non-finite amounts.
pub async fn allocate(
    db: &DatabaseConnection,
    budget_id: i64,
    category_id: i64,
    period_instance_id: i64,
    allocated_amount: f64,
    rollover_mode: RolloverMode,
) -> Result<envelope_allocation::Model> {
    allocate_with_metadata(
        db,
        budget_id,
        category_id,
        period_instance_id,
        allocated_amount,
        rollover_mode,
        EnvelopeMetadata::default(),
    )
    .await
}

/// Creates an envelope with explicit metadata.
///
/// The envelope starts with zero spend and zero rollover, so its derived
/// fields are computed from the allocation alone.
pub async fn allocate_with_metadata(
    db: &DatabaseConnection,
    budget_id: i64,
    category_id: i64,
    period_instance_id: i64,
    allocated_amount: f64,
    rollover_mode: RolloverMode,
    metadata: EnvelopeMetadata,
) -> Result<envelope_allocation::Model> {
    if !allocated_amount.is_finite() || allocated_amount < 0.0 {
        return Err(Error::InvalidAmount {
            amount: allocated_amount,
        });
    }

    let existing = EnvelopeAllocation::find()
        .filter(envelope_allocation::Column::BudgetId.eq(budget_id))
        .filter(envelope_allocation::Column::CategoryId.eq(category_id))
        .filter(envelope_allocation::Column::PeriodInstanceId.eq(period_instance_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(Error::DuplicateAllocation {
            budget_id,
            category_id,
            period_instance_id,
        });
    }

    let derived = derive_fields(allocated_amount, 0.0, 0.0);
    let now = Utc::now();

    let envelope = envelope_allocation::ActiveModel {
        budget_id: Set(budget_id),
        category_id: Set(category_id),
        period_instance_id: Set(period_instance_id),
        allocated_amount: Set(allocated_amount),
        spent_amount: Set(0.0),
        rollover_amount: Set(0.0),
        available_amount: Set(derived.available),
        deficit_amount: Set(derived.deficit),
        status: Set(derived.status),
        rollover_mode: Set(rollover_mode),
        is_emergency_fund: Set(metadata.is_emergency_fund),
        priority: Set(metadata.priority),
        max_rollover_months: Set(metadata.max_rollover_months),
        auto_refill: Set(metadata.auto_refill),
        last_calculated: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = envelope.insert(db).await?;
    Ok(result)
}

/// Finds an envelope by its unique ID.
pub async fn get_envelope_by_id(
    db: &DatabaseConnection,
    envelope_id: i64,
) -> Result<Option<envelope_allocation::Model>> {
    EnvelopeAllocation::find_by_id(envelope_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all envelopes covering one period instance.
pub async fn envelopes_for_period(
    db: &DatabaseConnection,
    period_instance_id: i64,
) -> Result<Vec<envelope_allocation::Model>> {
    EnvelopeAllocation::find()
        .filter(envelope_allocation::Column::PeriodInstanceId.eq(period_instance_id))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Writes an observed spend total and rederives the envelope.
///
/// The spend number is an opaque input summed by the external aggregator;
/// this function is idempotent for equal `observed_spend`.
///
/// # Errors
/// `InvalidAmount` for negative or non-finite spend, `NotFound` for a
/// missing envelope.
pub async fn recompute(
    db: &DatabaseConnection,
    envelope_id: i64,
    observed_spend: f64,
) -> Result<envelope_allocation::Model> {
    if !observed_spend.is_finite() || observed_spend < 0.0 {
        return Err(Error::InvalidAmount {
            amount: observed_spend,
        });
    }

    let envelope = EnvelopeAllocation::find_by_id(envelope_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "envelope",
            id: envelope_id,
        })?;

    let derived = derive_fields(
        envelope.allocated_amount,
        envelope.rollover_amount,
        observed_spend,
    );
    let now = Utc::now();

    let mut active: envelope_allocation::ActiveModel = envelope.into();
    active.spent_amount = Set(observed_spend);
    active.available_amount = Set(derived.available);
    active.deficit_amount = Set(derived.deficit);
    active.status = Set(derived.status);
    active.last_calculated = Set(now);
    active.updated_at = Set(now);

    let result = active.update(db).await?;
    Ok(result)
}

/// Moves funds between two envelopes and appends the audit record.
///
/// Runs in a single database transaction: both envelope writes and the
/// transfer row commit together or not at all. Returns the updated source,
/// the updated destination, and the audit row.
///
/// # Errors
/// Validation failures for a self-transfer or a non-positive amount,
/// `InsufficientFunds` when the source cannot cover the amount, `NotFound`
/// for missing envelopes.
pub async fn transfer(
    db: &DatabaseConnection,
    from_id: i64,
    to_id: i64,
    amount: f64,
    reason: &str,
    actor: &str,
) -> Result<(
    envelope_allocation::Model,
    envelope_allocation::Model,
    envelope_transfer::Model,
)> {
    if from_id == to_id {
        return Err(Error::Validation {
            message: format!("cannot transfer envelope {from_id} to itself"),
        });
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }

    let txn = db.begin().await?;

    let source = EnvelopeAllocation::find_by_id(from_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "envelope",
            id: from_id,
        })?;
    let target = EnvelopeAllocation::find_by_id(to_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "envelope",
            id: to_id,
        })?;

    if source.available_amount < amount {
        return Err(Error::InsufficientFunds {
            available: source.available_amount,
            requested: amount,
        });
    }

    let now = Utc::now();

    // The amount moves through the allocated column on both sides; the
    // derived fields are then recomputed from the raw numbers.
    let source_allocated = source.allocated_amount - amount;
    let source_derived =
        derive_fields(source_allocated, source.rollover_amount, source.spent_amount);
    let mut source_active: envelope_allocation::ActiveModel = source.into();
    source_active.allocated_amount = Set(source_allocated);
    source_active.available_amount = Set(source_derived.available);
    source_active.deficit_amount = Set(source_derived.deficit);
    source_active.status = Set(source_derived.status);
    source_active.last_calculated = Set(now);
    source_active.updated_at = Set(now);
    let updated_source = source_active.update(&txn).await?;

    let target_allocated = target.allocated_amount + amount;
    let target_derived =
        derive_fields(target_allocated, target.rollover_amount, target.spent_amount);
    let mut target_active: envelope_allocation::ActiveModel = target.into();
    target_active.allocated_amount = Set(target_allocated);
    target_active.available_amount = Set(target_derived.available);
    target_active.deficit_amount = Set(target_derived.deficit);
    target_active.status = Set(target_derived.status);
    target_active.last_calculated = Set(now);
    target_active.updated_at = Set(now);
    let updated_target = target_active.update(&txn).await?;

    let audit = envelope_transfer::ActiveModel {
        from_envelope_id: Set(from_id),
        to_envelope_id: Set(to_id),
        amount: Set(amount),
        reason: Set(reason.to_string()),
        transferred_by: Set(actor.to_string()),
        transferred_at: Set(now),
        ..Default::default()
    };
    let transfer_row = audit.insert(&txn).await?;

    txn.commit().await?;

    Ok((updated_source, updated_target, transfer_row))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::EnvelopeTransfer;
    use crate::test_utils::*;

    #[test]
    fn test_derive_fields_active() {
        let derived = derive_fields(100.0, 20.0, 50.0);
        assert_eq!(derived.available, 70.0);
        assert_eq!(derived.deficit, 0.0);
        assert_eq!(derived.status, EnvelopeStatus::Active);
    }

    #[test]
    fn test_derive_fields_overspent() {
        // allocated=100, rollover=20, spent=150 => available 0, deficit 30
        let derived = derive_fields(100.0, 20.0, 150.0);
        assert_eq!(derived.available, 0.0);
        assert_eq!(derived.deficit, 30.0);
        assert_eq!(derived.status, EnvelopeStatus::Overspent);
    }

    #[test]
    fn test_derive_fields_depleted() {
        let derived = derive_fields(100.0, 0.0, 100.0);
        assert_eq!(derived.available, 0.0);
        assert_eq!(derived.deficit, 0.0);
        assert_eq!(derived.status, EnvelopeStatus::Depleted);
    }

    #[tokio::test]
    async fn test_allocate_integration() -> Result<()> {
        let (db, period) = setup_with_period().await?;

        let envelope = allocate(&db, 1, 10, period.id, 250.0, RolloverMode::Unlimited).await?;
        assert_eq!(envelope.allocated_amount, 250.0);
        assert_eq!(envelope.available_amount, 250.0);
        assert_eq!(envelope.deficit_amount, 0.0);
        assert_eq!(envelope.status, EnvelopeStatus::Active);
        assert_eq!(envelope.priority, 5);
        assert!(!envelope.is_emergency_fund);

        Ok(())
    }

    #[tokio::test]
    async fn test_allocate_zero_is_depleted() -> Result<()> {
        let (db, period) = setup_with_period().await?;

        let envelope = allocate(&db, 1, 10, period.id, 0.0, RolloverMode::Reset).await?;
        assert_eq!(envelope.available_amount, 0.0);
        assert_eq!(envelope.status, EnvelopeStatus::Depleted);

        Ok(())
    }

    #[tokio::test]
    async fn test_allocate_rejects_duplicates() -> Result<()> {
        let (db, period) = setup_with_period().await?;

        allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;
        let result = allocate(&db, 1, 10, period.id, 50.0, RolloverMode::Unlimited).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::DuplicateAllocation { budget_id: 1, category_id: 10, .. }
        ));

        // A different category in the same period is fine
        allocate(&db, 1, 11, period.id, 50.0, RolloverMode::Unlimited).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_allocate_rejects_bad_amounts() -> Result<()> {
        let (db, period) = setup_with_period().await?;

        let result = allocate(&db, 1, 10, period.id, -5.0, RolloverMode::Unlimited).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: -5.0 }));

        let result = allocate(&db, 1, 10, period.id, f64::NAN, RolloverMode::Unlimited).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_overspend() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let envelope = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;

        let updated = recompute(&db, envelope.id, 150.0).await?;
        assert_eq!(updated.spent_amount, 150.0);
        assert_eq!(updated.available_amount, 0.0);
        assert_eq!(updated.deficit_amount, 50.0);
        assert_eq!(updated.status, EnvelopeStatus::Overspent);

        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let envelope = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;

        let first = recompute(&db, envelope.id, 40.0).await?;
        let second = recompute(&db, envelope.id, 40.0).await?;
        assert_eq!(first.available_amount, second.available_amount);
        assert_eq!(first.deficit_amount, second.deficit_amount);
        assert_eq!(first.status, second.status);
        assert_eq!(second.available_amount, 60.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_rejects_negative_spend() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let envelope = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;

        let result = recompute(&db, envelope.id, -1.0).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: -1.0 }));

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_conserves_funds() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let source = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;
        let target = allocate(&db, 1, 11, period.id, 20.0, RolloverMode::Unlimited).await?;

        let (updated_source, updated_target, audit) =
            transfer(&db, source.id, target.id, 30.0, "rebalance", "tester").await?;

        assert_eq!(updated_source.available_amount, 70.0);
        assert_eq!(updated_target.available_amount, 50.0);
        assert_eq!(audit.amount, 30.0);
        assert_eq!(audit.from_envelope_id, source.id);
        assert_eq!(audit.to_envelope_id, target.id);

        // Exactly one audit row was appended
        let transfers = EnvelopeTransfer::find().all(&db).await?;
        assert_eq!(transfers.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_into_overspent_pays_deficit_first() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let source = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;
        let target = allocate(&db, 1, 11, period.id, 50.0, RolloverMode::Unlimited).await?;
        recompute(&db, target.id, 70.0).await?; // deficit 20

        let (_, updated_target, _) =
            transfer(&db, source.id, target.id, 30.0, "recovery", "tester").await?;

        // 20 of the 30 cover the deficit, 10 become available
        assert_eq!(updated_target.deficit_amount, 0.0);
        assert_eq!(updated_target.available_amount, 10.0);
        assert_eq!(updated_target.status, EnvelopeStatus::Active);

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_rejects_self_and_bad_amounts() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let envelope = allocate(&db, 1, 10, period.id, 100.0, RolloverMode::Unlimited).await?;
        let other = allocate(&db, 1, 11, period.id, 100.0, RolloverMode::Unlimited).await?;

        let result = transfer(&db, envelope.id, envelope.id, 10.0, "r", "a").await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = transfer(&db, envelope.id, other.id, 0.0, "r", "a").await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 0.0 }));

        let result = transfer(&db, envelope.id, other.id, -10.0, "r", "a").await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_rejects_insufficient_funds() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let source = allocate(&db, 1, 10, period.id, 25.0, RolloverMode::Unlimited).await?;
        let target = allocate(&db, 1, 11, period.id, 0.0, RolloverMode::Unlimited).await?;

        let result = transfer(&db, source.id, target.id, 30.0, "r", "a").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientFunds { available, requested: 30.0 } if available == 25.0
        ));

        // Nothing moved and no audit row was written
        let unchanged = get_envelope_by_id(&db, source.id).await?.unwrap();
        assert_eq!(unchanged.available_amount, 25.0);
        let transfers = EnvelopeTransfer::find().all(&db).await?;
        assert!(transfers.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_missing_envelope() -> Result<()> {
        let (db, period) = setup_with_period().await?;
        let source = allocate(&db, 1, 10, period.id, 25.0, RolloverMode::Unlimited).await?;

        let result = transfer(&db, source.id, 999, 10.0, "r", "a").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound { entity: "envelope", id: 999 }
        ));

        Ok(())
    }
}
