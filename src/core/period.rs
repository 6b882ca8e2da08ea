//! Period boundary calculation - Turns a recurrence rule into date ranges.
//!
//! [`boundaries`] is pure and deterministic: given a template and any
//! reference date it returns the inclusive `[start, end]` range of the period
//! containing that date. Consecutive ranges from the same template tile the
//! calendar with no gaps and no overlap, which is what the rest of the engine
//! relies on when it rolls balances from one period into the next.
//!
//! Anchor inputs are coerced into range rather than rejected (a weekday of 0
//! means Sunday, a day-of-month of 0 means the 1st) and an anchor day that
//! does not exist in the target month clamps to the month's last real day,
//! so a day-31 monthly period never slides into March.

use crate::{
    entities::{PeriodInstance, PeriodTemplate, period_instance, period_template, PeriodType},
    errors::{Error, Result},
};
use chrono::{Datelike, Days, NaiveDate};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Inclusive start/end pair for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    /// First day of the period
    pub start: NaiveDate,
    /// Last day of the period
    pub end: NaiveDate,
}

/// Computes the period containing `reference` for the given template.
///
/// Pure and deterministic. `custom` templates have no built-in calculation
/// (their boundaries come from an external handler) and fail with
/// [`Error::UnsupportedPeriod`].
///
/// # Errors
/// Returns a validation error for `interval_count < 1` and
/// `UnsupportedPeriod` for custom templates.
pub fn boundaries(template: &period_template::Model, reference: NaiveDate) -> Result<PeriodBounds> {
    if template.interval_count < 1 {
        return Err(Error::Validation {
            message: format!("interval_count must be at least 1, got {}", template.interval_count),
        });
    }

    match template.period_type {
        PeriodType::Weekly => weekly_bounds(template, reference),
        PeriodType::Monthly => month_aligned_bounds(template, reference, 1),
        PeriodType::Quarterly => month_aligned_bounds(template, reference, 3),
        PeriodType::Yearly => month_aligned_bounds(template, reference, 12),
        PeriodType::Custom => Err(Error::UnsupportedPeriod {
            period_type: template.period_type.as_str().to_string(),
        }),
    }
}

fn weekly_bounds(template: &period_template::Model, reference: NaiveDate) -> Result<PeriodBounds> {
    let anchor = normalize_weekday(template.start_day_of_week);
    let reference_iso = i64::from(reference.weekday().number_from_monday());
    let days_back = (reference_iso - anchor).rem_euclid(7);

    let start = reference
        .checked_sub_days(Days::new(days_back.unsigned_abs()))
        .ok_or_else(|| date_out_of_range(reference))?;
    let span = 7 * i64::from(template.interval_count) - 1;
    let end = start
        .checked_add_days(Days::new(span.unsigned_abs()))
        .ok_or_else(|| date_out_of_range(start))?;

    Ok(PeriodBounds { start, end })
}

fn month_aligned_bounds(
    template: &period_template::Model,
    reference: NaiveDate,
    months_per_unit: i64,
) -> Result<PeriodBounds> {
    let interval = i64::from(template.interval_count) * months_per_unit;
    let anchor_day = normalize_day_of_month(template.start_day_of_month);
    let anchor_index = i64::from(normalize_month(template.start_month)) - 1;

    let mut reference_index =
        i64::from(reference.year()) * 12 + i64::from(reference.month()) - 1;
    // The new period has not started yet this month. The anchor day is
    // compared as realized in the reference month (Feb 28 is "day 31" of a
    // non-leap February), otherwise clamped start days would break tiling.
    let realized_anchor =
        anchor_day.min(i64::from(days_in_month(reference.year(), reference.month())));
    if i64::from(reference.day()) < realized_anchor {
        reference_index -= 1;
    }

    let remainder = (reference_index - anchor_index).rem_euclid(interval);
    let start_index = reference_index - remainder;

    let start = date_from_month_index(start_index, anchor_day)?;
    let next_start = date_from_month_index(start_index + interval, anchor_day)?;
    let end = next_start
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| date_out_of_range(next_start))?;

    Ok(PeriodBounds { start, end })
}

/// ISO weekday with defensive coercion: 0 means Sunday, everything else
/// clamps into 1..=7.
fn normalize_weekday(raw: i32) -> i64 {
    match raw {
        0 => 7,
        d => i64::from(d.clamp(1, 7)),
    }
}

/// Day-of-month coerced into 1..=31; the per-month clamp to the real month
/// length happens at materialization time.
fn normalize_day_of_month(raw: i32) -> i64 {
    i64::from(raw.clamp(1, 31))
}

fn normalize_month(raw: i32) -> i32 {
    raw.clamp(1, 12)
}

/// Materializes a linear month index (`year*12 + month - 1`) into a date,
/// clamping `day` to the actual number of days in that month.
fn date_from_month_index(index: i64, day: i64) -> Result<NaiveDate> {
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) + 1;
    let year = i32::try_from(year).map_err(|_| Error::Validation {
        message: format!("month index {index} is outside the supported calendar range"),
    })?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let month = month as u32;

    let clamped = day.min(i64::from(days_in_month(year, month)));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = clamped.max(1) as u32;

    NaiveDate::from_ymd_opt(year, month, clamped).ok_or_else(|| Error::Validation {
        message: format!("no valid date for year {year}, month {month}, day {clamped}"),
    })
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    }
}

fn date_out_of_range(date: NaiveDate) -> Error {
    Error::Validation {
        message: format!("date arithmetic out of range near {date}"),
    }
}

/// Looks up a template and creates the `period_instance` row covering
/// `reference`, with zeroed amounts.
///
/// Returns the existing row instead when the template already has an
/// instance with the computed start, so repeated materialization can never
/// produce overlapping instances.
///
/// # Errors
/// `NotFound` for a missing template, plus everything [`boundaries`] returns.
pub async fn materialize_instance(
    db: &DatabaseConnection,
    template_id: i64,
    reference: NaiveDate,
) -> Result<period_instance::Model> {
    let template = PeriodTemplate::find_by_id(template_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "period template",
            id: template_id,
        })?;

    let bounds = boundaries(&template, reference)?;

    let existing = PeriodInstance::find()
        .filter(period_instance::Column::TemplateId.eq(template_id))
        .filter(period_instance::Column::StartDate.eq(bounds.start))
        .one(db)
        .await?;
    if let Some(instance) = existing {
        return Ok(instance);
    }

    let instance = period_instance::ActiveModel {
        template_id: Set(template_id),
        budget_id: Set(template.budget_id),
        start_date: Set(bounds.start),
        end_date: Set(bounds.end),
        allocated_amount: Set(0.0),
        rollover_amount: Set(0.0),
        actual_amount: Set(0.0),
        ..Default::default()
    };

    let result = instance.insert(db).await?;
    Ok(result)
}

/// Lists a template's materialized instances ordered by start date.
pub async fn instances_for_template(
    db: &DatabaseConnection,
    template_id: i64,
) -> Result<Vec<period_instance::Model>> {
    PeriodInstance::find()
        .filter(period_instance::Column::TemplateId.eq(template_id))
        .order_by_asc(period_instance::Column::StartDate)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn template(period_type: PeriodType, interval_count: i32) -> period_template::Model {
        period_template::Model {
            id: 1,
            budget_id: 1,
            period_type,
            interval_count,
            start_day_of_week: 1,
            start_day_of_month: 1,
            start_month: 1,
            timezone: "UTC".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_biweekly_monday_anchor() {
        let tpl = template(PeriodType::Weekly, 2);
        // 2024-03-15 is a Friday
        let bounds = boundaries(&tpl, date(2024, 3, 15)).unwrap();
        assert_eq!(bounds.start, date(2024, 3, 11)); // the Monday on/before
        assert_eq!(bounds.end, date(2024, 3, 24)); // start + 13 days
    }

    #[test]
    fn test_weekly_reference_on_anchor_day() {
        let tpl = template(PeriodType::Weekly, 1);
        // 2024-03-11 is itself a Monday
        let bounds = boundaries(&tpl, date(2024, 3, 11)).unwrap();
        assert_eq!(bounds.start, date(2024, 3, 11));
        assert_eq!(bounds.end, date(2024, 3, 17));
    }

    #[test]
    fn test_weekly_anchor_zero_coerces_to_sunday() {
        let mut tpl = template(PeriodType::Weekly, 1);
        tpl.start_day_of_week = 0;
        // 2024-03-15 is a Friday; the Sunday on/before is 2024-03-10
        let bounds = boundaries(&tpl, date(2024, 3, 15)).unwrap();
        assert_eq!(bounds.start, date(2024, 3, 10));
        assert_eq!(bounds.end, date(2024, 3, 16));
    }

    #[test]
    fn test_monthly_first_of_month_anchor() {
        let tpl = template(PeriodType::Monthly, 1);
        let bounds = boundaries(&tpl, date(2024, 3, 15)).unwrap();
        assert_eq!(bounds.start, date(2024, 3, 1));
        assert_eq!(bounds.end, date(2024, 3, 31));
    }

    #[test]
    fn test_monthly_day_31_clamps_in_february() {
        let mut tpl = template(PeriodType::Monthly, 1);
        tpl.start_day_of_month = 31;
        // 2023 is not a leap year; Feb 15 is before day 31, so the period
        // started on Jan 31 and must end inside February, not in March.
        let bounds = boundaries(&tpl, date(2023, 2, 15)).unwrap();
        assert_eq!(bounds.start, date(2023, 1, 31));
        assert_eq!(bounds.end, date(2023, 2, 27));
    }

    #[test]
    fn test_monthly_day_30_clamps_in_leap_february() {
        let mut tpl = template(PeriodType::Monthly, 1);
        tpl.start_day_of_month = 30;
        let bounds = boundaries(&tpl, date(2024, 2, 10)).unwrap();
        assert_eq!(bounds.start, date(2024, 1, 30));
        // Feb 30 clamps to Feb 29 in 2024, so the period ends the day before
        assert_eq!(bounds.end, date(2024, 2, 28));
    }

    #[test]
    fn test_monthly_day_zero_coerces_to_first() {
        let mut tpl = template(PeriodType::Monthly, 1);
        tpl.start_day_of_month = 0;
        let bounds = boundaries(&tpl, date(2024, 5, 20)).unwrap();
        assert_eq!(bounds.start, date(2024, 5, 1));
        assert_eq!(bounds.end, date(2024, 5, 31));
    }

    #[test]
    fn test_quarterly_january_anchor() {
        let tpl = template(PeriodType::Quarterly, 1);
        let bounds = boundaries(&tpl, date(2024, 5, 10)).unwrap();
        assert_eq!(bounds.start, date(2024, 4, 1));
        assert_eq!(bounds.end, date(2024, 6, 30));
    }

    #[test]
    fn test_yearly_july_anchor() {
        let mut tpl = template(PeriodType::Yearly, 1);
        tpl.start_month = 7;
        let bounds = boundaries(&tpl, date(2024, 3, 10)).unwrap();
        assert_eq!(bounds.start, date(2023, 7, 1));
        assert_eq!(bounds.end, date(2024, 6, 30));
    }

    #[test]
    fn test_custom_is_unsupported() {
        let tpl = template(PeriodType::Custom, 1);
        let result = boundaries(&tpl, date(2024, 1, 1));
        assert!(matches!(
            result.unwrap_err(),
            Error::UnsupportedPeriod { period_type } if period_type == "custom"
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let tpl = template(PeriodType::Monthly, 0);
        let result = boundaries(&tpl, date(2024, 1, 1));
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));
    }

    #[test]
    fn test_monthly_periods_tile_the_calendar() {
        let mut tpl = template(PeriodType::Monthly, 1);
        tpl.start_day_of_month = 31;

        // Walk a year of periods through February and 30-day months; each
        // period must start the day after the previous one ended.
        let mut bounds = boundaries(&tpl, date(2023, 1, 15)).unwrap();
        for _ in 0..12 {
            let next_ref = bounds.end.checked_add_days(Days::new(1)).unwrap();
            let next = boundaries(&tpl, next_ref).unwrap();
            assert_eq!(next.start, next_ref);
            bounds = next;
        }
    }

    #[test]
    fn test_weekly_periods_tile_the_calendar() {
        let tpl = template(PeriodType::Weekly, 2);
        let mut bounds = boundaries(&tpl, date(2024, 1, 3)).unwrap();
        for _ in 0..10 {
            let next_ref = bounds.end.checked_add_days(Days::new(1)).unwrap();
            let next = boundaries(&tpl, next_ref).unwrap();
            assert_eq!(next.start, next_ref);
            bounds = next;
        }
    }

    #[tokio::test]
    async fn test_materialize_instance_integration() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let tpl = create_test_template(&db, PeriodType::Monthly).await?;

        let instance = materialize_instance(&db, tpl.id, date(2024, 3, 15)).await?;
        assert_eq!(instance.start_date, date(2024, 3, 1));
        assert_eq!(instance.end_date, date(2024, 3, 31));
        assert_eq!(instance.budget_id, tpl.budget_id);

        Ok(())
    }

    #[tokio::test]
    async fn test_materialize_instance_is_idempotent() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let tpl = create_test_template(&db, PeriodType::Monthly).await?;

        let first = materialize_instance(&db, tpl.id, date(2024, 3, 5)).await?;
        // A different reference inside the same period resolves to the same row
        let second = materialize_instance(&db, tpl.id, date(2024, 3, 28)).await?;
        assert_eq!(first.id, second.id);

        let instances = instances_for_template(&db, tpl.id).await?;
        assert_eq!(instances.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_materialize_instance_missing_template() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;

        let result = materialize_instance(&db, 999, date(2024, 1, 1)).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound { entity: "period template", id: 999 }
        ));

        Ok(())
    }
}
