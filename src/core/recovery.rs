//! Deficit recovery - Analyze, plan, and execute recovery of overspent envelopes.
//!
//! A deficit envelope is handled in three phases. *Analyze* classifies the
//! deficit's severity and ranks the ways it could be covered. *Plan* turns
//! the ranked options into an ordered list of concrete steps that greedily
//! consume the deficit. *Execute* runs the automated steps through the
//! ledger's transfer operation.
//!
//! Execution is best-effort by design, not all-or-nothing: each step is an
//! independently valid transfer, so a failing step is recorded and the
//! remaining steps still run. Callers inspect `success`/`errors` on the
//! result instead of relying on an `Err` to signal partial failure.

use crate::{
    config::DeficitPolicy,
    core::ledger,
    entities::{
        EnvelopeAllocation, envelope_allocation, envelope_transfer,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use tracing::{info, warn};

/// How bad a deficit is, against the policy thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeficitSeverity {
    /// Below the moderate threshold
    Mild,
    /// At or above the moderate threshold
    Moderate,
    /// At or above the severe threshold
    Severe,
    /// At or above the critical threshold
    Critical,
}

impl DeficitSeverity {
    /// Base recovery estimate in days for this severity.
    #[must_use]
    pub const fn base_recovery_days(self) -> u32 {
        match self {
            Self::Critical => 1,
            Self::Severe => 3,
            Self::Moderate => 7,
            Self::Mild => 14,
        }
    }
}

/// Classifies a deficit against ascending policy thresholds; the highest
/// threshold met wins, and anything below moderate is mild.
#[must_use]
pub fn classify_severity(deficit: f64, policy: &DeficitPolicy) -> DeficitSeverity {
    if deficit >= policy.critical_threshold {
        DeficitSeverity::Critical
    } else if deficit >= policy.severe_threshold {
        DeficitSeverity::Severe
    } else if deficit >= policy.moderate_threshold {
        DeficitSeverity::Moderate
    } else {
        DeficitSeverity::Mild
    }
}

/// A way the deficit could be covered, produced by the analyze phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOptionKind {
    /// Move funds from a surplus envelope
    Transfer,
    /// Draw on an emergency fund's headroom
    EmergencyFund,
    /// Bring money in from outside the budget
    Borrowing,
    /// Write the deficit off; always feasible, never automated
    Reset,
}

/// One ranked recovery option.
#[derive(Debug, Clone)]
pub struct RecoveryOption {
    /// What kind of movement this is
    pub kind: RecoveryOptionKind,
    /// Surplus envelope backing the option, where applicable
    pub source_envelope_id: Option<i64>,
    /// How much this option can contribute
    pub amount: f64,
    /// Ordering key, ascending; the reset fallback sits at 10
    pub priority: i32,
    /// Human-readable summary for the host UI
    pub description: String,
}

/// Resolves category ids to display names for option descriptions.
///
/// Resolution is optional: a failed lookup falls back to a generic label and
/// never aborts the analysis.
pub trait CategoryResolver {
    /// Returns the display name for a category, if known.
    fn category_name(&self, category_id: i64) -> Option<String>;
}

/// Resolver that knows no names; every description uses the generic label.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl CategoryResolver for NoResolver {
    fn category_name(&self, _category_id: i64) -> Option<String> {
        None
    }
}

fn category_label(resolver: &dyn CategoryResolver, category_id: i64) -> String {
    resolver
        .category_name(category_id)
        .unwrap_or_else(|| format!("category {category_id}"))
}

/// Result of the analyze phase for one deficit envelope.
#[derive(Debug, Clone)]
pub struct DeficitAnalysis {
    /// The overspent envelope
    pub envelope_id: i64,
    /// Budget the envelope belongs to
    pub budget_id: i64,
    /// Period the envelope covers
    pub period_instance_id: i64,
    /// The deficit being recovered
    pub deficit_amount: f64,
    /// Age of the deficit, from the envelope's last recalculation
    pub days_since_deficit: i64,
    /// Severity classification against the policy thresholds
    pub severity: DeficitSeverity,
    /// Candidate surplus envelopes, emergency funds first then by priority
    pub candidate_sources: Vec<envelope_allocation::Model>,
    /// Ranked options, ascending by priority
    pub options: Vec<RecoveryOption>,
}

/// Step types a plan can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStepKind {
    /// Automated transfer from a surplus envelope
    Transfer,
    /// Automated transfer from an emergency fund
    EmergencyFund,
    /// Money must come from outside the budget; manual
    ExternalInjection,
}

/// One ordered step of a recovery plan.
#[derive(Debug, Clone)]
pub struct DeficitRecoveryStep {
    /// Execution order, ascending from 1
    pub order: u32,
    /// What this step does
    pub kind: RecoveryStepKind,
    /// Source envelope for transfer-like steps
    pub source_envelope_id: Option<i64>,
    /// Amount this step moves
    pub amount: f64,
    /// Whether the engine can run this step itself
    pub automated: bool,
    /// Human-readable summary
    pub description: String,
}

/// An ordered sequence of fund movements intended to eliminate a deficit.
#[derive(Debug, Clone)]
pub struct DeficitRecoveryPlan {
    /// The overspent envelope being recovered
    pub envelope_id: i64,
    /// The deficit the plan was built against
    pub deficit_amount: f64,
    /// Severity at planning time
    pub severity: DeficitSeverity,
    /// Steps in execution order
    pub steps: Vec<DeficitRecoveryStep>,
    /// Deficit left uncovered after all steps
    pub remaining_deficit: f64,
    /// Whether the steps cover the whole deficit
    pub recovery_feasible: bool,
    /// Severity-based estimate plus two days per manual step
    pub estimated_days: u32,
}

/// Result of executing a plan. Best-effort: inspect `success` and `errors`.
#[derive(Debug, Clone)]
pub struct RecoveryExecution {
    /// Steps that ran and committed
    pub executed_steps: Vec<DeficitRecoveryStep>,
    /// Steps reported as requiring manual intervention, not attempted
    pub manual_steps: Vec<DeficitRecoveryStep>,
    /// Audit rows for the transfers that committed
    pub transfers: Vec<envelope_transfer::Model>,
    /// Failures, one entry per failing step
    pub errors: Vec<String>,
    /// True iff no step failed
    pub success: bool,
}

/// Budget-wide recovery report.
#[derive(Debug, Clone)]
pub struct BulkRecoveryReport {
    /// Budget that was analyzed
    pub budget_id: i64,
    /// Period that was analyzed
    pub period_instance_id: i64,
    /// Sum of all deficits in scope
    pub total_deficit: f64,
    /// Sum of all surplus available in scope
    pub total_surplus: f64,
    /// True iff the surplus covers the whole deficit
    pub recovery_feasible: bool,
    /// One plan per overspent envelope
    pub plans: Vec<DeficitRecoveryPlan>,
    /// Per-envelope failures; the batch never aborts on one envelope
    pub errors: Vec<String>,
}

/// Analyzes one overspent envelope: severity, candidate sources, and ranked
/// recovery options.
///
/// # Errors
/// `NotFound` for a missing envelope, a validation error when the envelope
/// has no deficit.
pub async fn analyze_deficit(
    db: &DatabaseConnection,
    envelope_id: i64,
    policy: &DeficitPolicy,
    resolver: &dyn CategoryResolver,
) -> Result<DeficitAnalysis> {
    let envelope = EnvelopeAllocation::find_by_id(envelope_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "envelope",
            id: envelope_id,
        })?;

    if envelope.deficit_amount <= 0.0 {
        return Err(Error::Validation {
            message: format!("envelope {envelope_id} has no deficit to recover"),
        });
    }

    let deficit = envelope.deficit_amount;
    let days_since_deficit = (Utc::now() - envelope.last_calculated).num_days();
    let severity = classify_severity(deficit, policy);

    let candidate_sources = EnvelopeAllocation::find()
        .filter(envelope_allocation::Column::BudgetId.eq(envelope.budget_id))
        .filter(envelope_allocation::Column::PeriodInstanceId.eq(envelope.period_instance_id))
        .filter(envelope_allocation::Column::Id.ne(envelope_id))
        .filter(envelope_allocation::Column::AvailableAmount.gt(0.0))
        .order_by_desc(envelope_allocation::Column::IsEmergencyFund)
        .order_by_asc(envelope_allocation::Column::Priority)
        .limit(policy.max_candidate_sources)
        .all(db)
        .await?;

    let mut options = Vec::new();
    for source in &candidate_sources {
        options.push(RecoveryOption {
            kind: RecoveryOptionKind::Transfer,
            source_envelope_id: Some(source.id),
            amount: deficit.min(source.available_amount),
            priority: source.priority,
            description: format!(
                "Transfer {:.2} from {}",
                deficit.min(source.available_amount),
                category_label(resolver, source.category_id)
            ),
        });
    }

    if let Some(fund) = candidate_sources
        .iter()
        .find(|s| s.is_emergency_fund && s.available_amount > policy.emergency_fund_threshold)
    {
        let headroom = fund.available_amount - policy.emergency_fund_threshold;
        options.push(RecoveryOption {
            kind: RecoveryOptionKind::EmergencyFund,
            source_envelope_id: Some(fund.id),
            amount: deficit.min(headroom),
            priority: 1,
            description: format!(
                "Draw {:.2} from emergency fund {}",
                deficit.min(headroom),
                category_label(resolver, fund.category_id)
            ),
        });
    }

    let total_surplus: f64 = candidate_sources.iter().map(|s| s.available_amount).sum();
    if policy.borrowing_allowed && total_surplus < deficit {
        let shortfall = deficit - total_surplus;
        options.push(RecoveryOption {
            kind: RecoveryOptionKind::Borrowing,
            source_envelope_id: None,
            amount: shortfall,
            priority: 8,
            description: format!("Borrow {shortfall:.2} from outside the budget"),
        });
    }

    // The write-off fallback is always on the table, at the lowest priority
    options.push(RecoveryOption {
        kind: RecoveryOptionKind::Reset,
        source_envelope_id: None,
        amount: deficit,
        priority: 10,
        description: format!("Write off the {deficit:.2} deficit"),
    });

    options.sort_by_key(|o| o.priority);

    Ok(DeficitAnalysis {
        envelope_id,
        budget_id: envelope.budget_id,
        period_instance_id: envelope.period_instance_id,
        deficit_amount: deficit,
        days_since_deficit,
        severity,
        candidate_sources,
        options,
    })
}

/// Builds an ordered recovery plan from an analysis.
///
/// Walks the ranked options (skipping the reset write-off, which is never an
/// automated step) and greedily consumes the remaining deficit. Pure; no I/O.
#[must_use]
pub fn build_plan(analysis: &DeficitAnalysis) -> DeficitRecoveryPlan {
    let mut remaining = analysis.deficit_amount;
    let mut steps = Vec::new();

    for option in &analysis.options {
        if remaining <= 0.0 {
            break;
        }
        let kind = match option.kind {
            RecoveryOptionKind::Transfer => RecoveryStepKind::Transfer,
            RecoveryOptionKind::EmergencyFund => RecoveryStepKind::EmergencyFund,
            RecoveryOptionKind::Borrowing => RecoveryStepKind::ExternalInjection,
            RecoveryOptionKind::Reset => continue,
        };

        let amount = remaining.min(option.amount);
        if amount <= 0.0 {
            continue;
        }

        let automated = matches!(
            kind,
            RecoveryStepKind::Transfer | RecoveryStepKind::EmergencyFund
        );
        steps.push(DeficitRecoveryStep {
            order: u32::try_from(steps.len()).unwrap_or(u32::MAX).saturating_add(1),
            kind,
            source_envelope_id: option.source_envelope_id,
            amount,
            automated,
            description: option.description.clone(),
        });
        remaining -= amount;
    }

    let manual_steps = steps.iter().filter(|s| !s.automated).count();
    let estimated_days = analysis.severity.base_recovery_days()
        + 2 * u32::try_from(manual_steps).unwrap_or(u32::MAX);

    DeficitRecoveryPlan {
        envelope_id: analysis.envelope_id,
        deficit_amount: analysis.deficit_amount,
        severity: analysis.severity,
        steps,
        remaining_deficit: remaining.max(0.0),
        recovery_feasible: remaining <= 0.0,
        estimated_days,
    }
}

/// Executes a plan's steps in order, best-effort.
///
/// Transfer-like steps call the ledger's transfer operation with the deficit
/// envelope as the destination; each runs in its own transaction. Any other
/// step type is reported as requiring manual intervention rather than
/// attempted. A failing step is recorded and execution continues.
pub async fn execute_plan(
    db: &DatabaseConnection,
    plan: &DeficitRecoveryPlan,
    actor: &str,
) -> RecoveryExecution {
    let mut execution = RecoveryExecution {
        executed_steps: Vec::new(),
        manual_steps: Vec::new(),
        transfers: Vec::new(),
        errors: Vec::new(),
        success: true,
    };

    for step in &plan.steps {
        match step.kind {
            RecoveryStepKind::Transfer | RecoveryStepKind::EmergencyFund => {
                let Some(source_id) = step.source_envelope_id else {
                    execution
                        .errors
                        .push(format!("step {}: no source envelope", step.order));
                    continue;
                };
                match ledger::transfer(
                    db,
                    source_id,
                    plan.envelope_id,
                    step.amount,
                    &step.description,
                    actor,
                )
                .await
                {
                    Ok((_, _, audit)) => {
                        execution.transfers.push(audit);
                        execution.executed_steps.push(step.clone());
                    }
                    Err(e) => {
                        warn!(order = step.order, error = %e, "recovery step failed");
                        execution.errors.push(format!("step {}: {e}", step.order));
                    }
                }
            }
            RecoveryStepKind::ExternalInjection => {
                execution.manual_steps.push(step.clone());
            }
        }
    }

    execution.success = execution.errors.is_empty();
    info!(
        envelope_id = plan.envelope_id,
        executed = execution.executed_steps.len(),
        manual = execution.manual_steps.len(),
        failures = execution.errors.len(),
        "recovery plan executed"
    );
    execution
}

/// Analyzes and plans recovery for every overspent envelope in a
/// budget+period.
///
/// Per-envelope failures are aggregated; the batch always completes and the
/// caller inspects the report.
pub async fn bulk_recovery(
    db: &DatabaseConnection,
    budget_id: i64,
    period_instance_id: i64,
    policy: &DeficitPolicy,
    resolver: &dyn CategoryResolver,
) -> Result<BulkRecoveryReport> {
    let envelopes = EnvelopeAllocation::find()
        .filter(envelope_allocation::Column::BudgetId.eq(budget_id))
        .filter(envelope_allocation::Column::PeriodInstanceId.eq(period_instance_id))
        .all(db)
        .await?;

    let total_deficit: f64 = envelopes.iter().map(|e| e.deficit_amount).sum();
    let total_surplus: f64 = envelopes.iter().map(|e| e.available_amount).sum();

    let mut report = BulkRecoveryReport {
        budget_id,
        period_instance_id,
        total_deficit,
        total_surplus,
        recovery_feasible: total_surplus >= total_deficit,
        plans: Vec::new(),
        errors: Vec::new(),
    };

    for envelope in envelopes.iter().filter(|e| e.deficit_amount > 0.0) {
        match analyze_deficit(db, envelope.id, policy, resolver).await {
            Ok(analysis) => report.plans.push(build_plan(&analysis)),
            Err(e) => {
                warn!(envelope_id = envelope.id, error = %e, "skipping envelope in bulk recovery");
                report.errors.push(format!("envelope {}: {e}", envelope.id));
            }
        }
    }

    info!(
        budget_id,
        period_instance_id,
        total_deficit,
        total_surplus,
        feasible = report.recovery_feasible,
        plans = report.plans.len(),
        "bulk recovery analyzed"
    );

    Ok(report)
}
