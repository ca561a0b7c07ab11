//! Next-due-date policy

use chrono::{Duration, NaiveDate};

use sluice_core::domain::pipeline::RefreshFrequency;

/// Computes the next due date for a pipeline
///
/// Always anchored at `now`, never at the previous due date: a late run
/// does not compound drift, and a failed run still advances instead of
/// coming due again on every invocation. Monthly and quarterly are
/// calendar-naive day counts; Manual pushes the date far enough out to
/// never come due on its own.
pub fn next_due_date(now: NaiveDate, frequency: RefreshFrequency) -> NaiveDate {
    let days = match frequency {
        RefreshFrequency::Daily => 1,
        RefreshFrequency::Weekly => 7,
        RefreshFrequency::Monthly => 30,
        RefreshFrequency::Quarterly => 90,
        RefreshFrequency::Manual => 3650,
    };

    now + Duration::days(days)
}
