//! Rollover calculation - Carries envelope balances across period boundaries.
//!
//! [`rollover_for`] is the pure per-envelope calculation, branching on the
//! envelope's rollover mode and the caller's [`RolloverPolicy`].
//! [`bulk_rollover`] applies it across every envelope of a closing period:
//! per-envelope failures are collected into the summary instead of aborting
//! the batch, and one history row is appended per envelope even when the
//! rolled amount is zero, so the audit trail stays complete.

use crate::{
    config::RolloverPolicy,
    core::ledger,
    entities::{
        EnvelopeAllocation, PeriodInstance, RolloverHistory, envelope_allocation, period_instance,
        rollover_history,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, warn};

/// Result of the per-envelope rollover calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverOutcome {
    /// Amount carried into the next period (may be negative when deficits roll)
    pub rollover_amount: f64,
    /// Amount written off instead of carried
    pub reset_amount: f64,
    /// Human-readable explanation of the branch taken
    pub reason: String,
}

/// One processed envelope inside a [`RolloverSummary`].
#[derive(Debug, Clone)]
pub struct RolloverEntry {
    /// Source-period envelope that was processed
    pub envelope_id: i64,
    /// Category the envelope tracks
    pub category_id: i64,
    /// The calculation result for this envelope
    pub outcome: RolloverOutcome,
}

/// Result of a bulk rollover run.
#[derive(Debug, Clone)]
pub struct RolloverSummary {
    /// Period the funds rolled out of
    pub from_period_id: i64,
    /// Period the funds rolled into
    pub to_period_id: i64,
    /// Whether this run computed without committing
    pub dry_run: bool,
    /// Per-envelope results, in processing order
    pub entries: Vec<RolloverEntry>,
    /// Sum of all carried amounts
    pub total_rolled: f64,
    /// Sum of all written-off amounts
    pub total_reset: f64,
    /// Per-envelope failures; the batch never aborts on one envelope
    pub errors: Vec<String>,
}

/// Computes how much of one envelope's balance carries into the next period.
///
/// `months_used` is the envelope's consecutive-rollover streak, from
/// [`rollover_months_used`]. Pure; no I/O.
#[must_use]
pub fn rollover_for(
    envelope: &envelope_allocation::Model,
    months_used: u32,
    policy: &RolloverPolicy,
) -> RolloverOutcome {
    use crate::entities::RolloverMode;

    let available = envelope.available_amount;

    let (mut rollover_amount, reset_amount, mut reason) = match envelope.rollover_mode {
        RolloverMode::Reset => (
            0.0,
            available,
            "reset mode: balance written off".to_string(),
        ),
        RolloverMode::Unlimited => (available, 0.0, "unlimited rollover".to_string()),
        RolloverMode::Limited => {
            let limit = envelope
                .max_rollover_months
                .map_or(policy.max_rollover_months, |m| m.max(0).unsigned_abs());
            if months_used >= limit {
                if policy.reset_on_limit_exceeded {
                    (
                        0.0,
                        available,
                        format!("rollover limit of {limit} periods reached: balance written off"),
                    )
                } else {
                    (
                        available,
                        0.0,
                        format!(
                            "rollover limit of {limit} periods reached: rolled anyway by policy override"
                        ),
                    )
                }
            } else {
                (
                    available,
                    0.0,
                    format!("limited rollover: {months_used} of {limit} periods used"),
                )
            }
        }
    };

    if envelope.deficit_amount > 0.0 {
        if policy.rollover_deficits {
            rollover_amount -= envelope.deficit_amount;
            reason.push_str(&format!(
                "; deficit of {:.2} carried forward",
                envelope.deficit_amount
            ));
        } else if policy.preserve_deficits {
            reason.push_str(&format!(
                "; deficit of {:.2} preserved for separate tracking",
                envelope.deficit_amount
            ));
        }
    }

    if envelope.is_emergency_fund && policy.emergency_fund_priority {
        let floor = envelope.auto_refill.unwrap_or(policy.auto_refill_amount);
        if floor > rollover_amount {
            rollover_amount = floor;
            reason.push_str(&format!("; emergency fund refilled to {floor:.2}"));
        }
    }

    RolloverOutcome {
        rollover_amount,
        reset_amount,
        reason,
    }
}

/// Counts how many consecutive prior periods this budget+category has rolled.
///
/// Walks the history newest-first and counts while the rolled amount is
/// positive; a reset (or zero) row breaks the streak.
pub async fn rollover_months_used(
    db: &DatabaseConnection,
    budget_id: i64,
    category_id: i64,
) -> Result<u32> {
    let history = RolloverHistory::find()
        .filter(rollover_history::Column::BudgetId.eq(budget_id))
        .filter(rollover_history::Column::CategoryId.eq(category_id))
        .order_by_desc(rollover_history::Column::ProcessedAt)
        .all(db)
        .await?;

    let mut streak = 0;
    for row in history {
        if row.rolled_amount > 0.0 {
            streak += 1;
        } else {
            break;
        }
    }
    Ok(streak)
}

/// Rolls every envelope of `from_period_id` into `to_period_id`.
///
/// With `dry_run` the same summary is computed but nothing is written -
/// that is the intended way to preview a rollover. Otherwise each envelope
/// is applied in its own transaction: the destination-period envelope row is
/// created (or its rollover updated), and one history row is appended, zero
/// rolls included.
///
/// # Errors
/// `NotFound` when either period is missing, a validation error when the
/// target does not start strictly after the source ends. Per-envelope
/// failures land in `summary.errors`.
pub async fn bulk_rollover(
    db: &DatabaseConnection,
    from_period_id: i64,
    to_period_id: i64,
    policy: &RolloverPolicy,
    dry_run: bool,
) -> Result<RolloverSummary> {
    let from_period = PeriodInstance::find_by_id(from_period_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "period instance",
            id: from_period_id,
        })?;
    let to_period = PeriodInstance::find_by_id(to_period_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "period instance",
            id: to_period_id,
        })?;

    if to_period.start_date <= from_period.end_date {
        return Err(Error::Validation {
            message: format!(
                "target period must start after the source period ends ({} <= {})",
                to_period.start_date, from_period.end_date
            ),
        });
    }

    let envelopes = ledger::envelopes_for_period(db, from_period_id).await?;
    info!(
        from_period_id,
        to_period_id,
        envelope_count = envelopes.len(),
        dry_run,
        "starting bulk rollover"
    );

    let mut summary = RolloverSummary {
        from_period_id,
        to_period_id,
        dry_run,
        entries: Vec::new(),
        total_rolled: 0.0,
        total_reset: 0.0,
        errors: Vec::new(),
    };

    for envelope in envelopes {
        let months_used =
            match rollover_months_used(db, envelope.budget_id, envelope.category_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(envelope_id = envelope.id, error = %e, "skipping envelope in rollover");
                    summary
                        .errors
                        .push(format!("envelope {}: {e}", envelope.id));
                    continue;
                }
            };

        let outcome = rollover_for(&envelope, months_used, policy);
        debug!(
            envelope_id = envelope.id,
            rolled = outcome.rollover_amount,
            reset = outcome.reset_amount,
            "computed rollover"
        );

        if !dry_run {
            if let Err(e) = apply_rollover(db, &envelope, to_period_id, &outcome).await {
                warn!(envelope_id = envelope.id, error = %e, "failed to apply rollover");
                summary
                    .errors
                    .push(format!("envelope {}: {e}", envelope.id));
                continue;
            }
        }

        summary.total_rolled += outcome.rollover_amount;
        summary.total_reset += outcome.reset_amount;
        summary.entries.push(RolloverEntry {
            envelope_id: envelope.id,
            category_id: envelope.category_id,
            outcome,
        });
    }

    if !dry_run {
        // Keep the destination period's rolled-in total current
        let previous = to_period.rollover_amount;
        let mut period_active: period_instance::ActiveModel = to_period.into();
        period_active.rollover_amount = Set(previous + summary.total_rolled);
        period_active.update(db).await?;
    }

    info!(
        processed = summary.entries.len(),
        total_rolled = summary.total_rolled,
        total_reset = summary.total_reset,
        failures = summary.errors.len(),
        "bulk rollover finished"
    );

    Ok(summary)
}

/// Writes one envelope's rollover: destination envelope row plus the
/// always-appended history row, atomically.
async fn apply_rollover(
    db: &DatabaseConnection,
    source: &envelope_allocation::Model,
    to_period_id: i64,
    outcome: &RolloverOutcome,
) -> Result<()> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let existing = EnvelopeAllocation::find()
        .filter(envelope_allocation::Column::BudgetId.eq(source.budget_id))
        .filter(envelope_allocation::Column::CategoryId.eq(source.category_id))
        .filter(envelope_allocation::Column::PeriodInstanceId.eq(to_period_id))
        .one(&txn)
        .await?;

    if let Some(destination) = existing {
        let derived = ledger::derive_fields(
            destination.allocated_amount,
            outcome.rollover_amount,
            destination.spent_amount,
        );
        let mut active: envelope_allocation::ActiveModel = destination.into();
        active.rollover_amount = Set(outcome.rollover_amount);
        active.available_amount = Set(derived.available);
        active.deficit_amount = Set(derived.deficit);
        active.status = Set(derived.status);
        active.last_calculated = Set(now);
        active.updated_at = Set(now);
        active.update(&txn).await?;
    } else {
        let derived = ledger::derive_fields(0.0, outcome.rollover_amount, 0.0);
        let destination = envelope_allocation::ActiveModel {
            budget_id: Set(source.budget_id),
            category_id: Set(source.category_id),
            period_instance_id: Set(to_period_id),
            allocated_amount: Set(0.0),
            spent_amount: Set(0.0),
            rollover_amount: Set(outcome.rollover_amount),
            available_amount: Set(derived.available),
            deficit_amount: Set(derived.deficit),
            status: Set(derived.status),
            rollover_mode: Set(source.rollover_mode),
            is_emergency_fund: Set(source.is_emergency_fund),
            priority: Set(source.priority),
            max_rollover_months: Set(source.max_rollover_months),
            auto_refill: Set(source.auto_refill),
            last_calculated: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        destination.insert(&txn).await?;
    }

    let history = rollover_history::ActiveModel {
        envelope_id: Set(source.id),
        budget_id: Set(source.budget_id),
        category_id: Set(source.category_id),
        from_period_id: Set(source.period_instance_id),
        to_period_id: Set(to_period_id),
        rolled_amount: Set(outcome.rollover_amount),
        reset_amount: Set(outcome.reset_amount),
        processed_at: Set(now),
        ..Default::default()
    };
    history.insert(&txn).await?;

    txn.commit().await?;
    Ok(())
}
