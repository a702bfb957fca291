//! Daily report scheduler
//!
//! Sleeps until the configured local wall-clock time, then produces the row
//! for yesterday, retrying with the fixed backoff until it succeeds or the
//! task is cancelled.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ReportService;
use crate::notifier::backoff::{sleep_or_cancel, FixedBackoff};
use crate::timerange::yesterday;

/// First instant after `now` at local `(hour, minute)` in `zone`.
///
/// A wall-clock time skipped by a DST gap runs at the first valid instant
/// after it.
pub fn next_run_at(now: DateTime<Utc>, zone: Tz, (hour, minute): (u32, u32)) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let today = now.with_timezone(&zone).date_naive();

    let mut day = today;
    for _ in 0..3 {
        if let Some(candidate) = local_instant(zone, day, at) {
            if candidate > now {
                return candidate;
            }
        }
        day = day.checked_add_days(Days::new(1)).unwrap_or(day);
    }
    now + chrono::Duration::days(1)
}

fn local_instant(zone: Tz, day: NaiveDate, at: NaiveTime) -> Option<DateTime<Utc>> {
    (0..=2).find_map(|shift| {
        let naive = day.and_time(at) + chrono::Duration::hours(shift);
        zone.from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    })
}

/// Produce yesterday's report once a day until cancelled.
pub async fn daily_report_task(service: Arc<ReportService>, cancel: CancellationToken) {
    let zone = service.config().timezone;
    let run_at = service.config().daily_run_at;
    log::info!(
        "⏰ Starting daily report scheduler ({:02}:{:02} {})",
        run_at.0,
        run_at.1,
        zone
    );

    loop {
        let now = service.now();
        let next = next_run_at(now, zone, run_at);
        log::info!("⏰ Next daily report at {}", next.with_timezone(&zone));

        let wait = (next - now).to_std().unwrap_or_default();
        if !sleep_or_cancel(wait, &cancel).await {
            break;
        }

        let date = yesterday(service.now(), zone);
        let mut backoff = FixedBackoff::new("daily-report", service.config().retry_backoff);
        loop {
            match service.run_daily(date).await {
                Ok(_) => break,
                Err(e) => {
                    log::error!("❌ Daily report for {} failed: {}", date, e);
                    if !backoff.wait(&cancel).await {
                        log::info!("🛑 Daily report scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    log::info!("🛑 Daily report scheduler stopped");
}
