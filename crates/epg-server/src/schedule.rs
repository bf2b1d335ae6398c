//! Cron-driven refresh timer.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::{error, info};

use crate::update::UpdateService;

/// A cron expression evaluated in the service's zone.
///
/// Accepts the classic five fields (`min hour dom month dow`, e.g. `0 0 * * *`) as well as
/// the six- and seven-field forms with leading seconds and trailing year.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    expression: String,
    schedule: Schedule,
}

impl RefreshSchedule {
    pub fn parse(expression: &str) -> Result<Self, cron::error::Error> {
        let expression = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        let fields = expression.split(' ').count();
        let schedule = if fields == 5 {
            Schedule::from_str(&format!("0 {expression}"))?
        } else {
            Schedule::from_str(&expression)?
        };
        Ok(Self {
            expression,
            schedule,
        })
    }

    /// The first scheduled instant strictly after `now`, in `now`'s zone.
    pub fn next_after(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(now).next()
    }
}

impl fmt::Display for RefreshSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Refresh on every tick of `schedule` in `tz`, forever.
pub async fn run_scheduled(updater: Arc<UpdateService>, schedule: RefreshSchedule, tz: Tz) {
    loop {
        let now = Utc::now().with_timezone(&tz);
        let Some(next) = schedule.next_after(&now) else {
            error!(%schedule, "schedule has no future runs, scheduler stopped");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, wait_secs = wait.as_secs(), "next refresh scheduled");

        tokio::time::sleep(wait).await;
        // Outcome is logged by the pipeline; a failed run keeps the previous index.
        let _ = updater.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        Shanghai.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn midnight_daily_runs_tomorrow_when_exactly_now() {
        let daily = RefreshSchedule::parse("0 0 * * *").unwrap();
        assert_eq!(
            daily.next_after(&at(2024, 1, 1, 0, 0)),
            Some(at(2024, 1, 2, 0, 0))
        );
        assert_eq!(
            daily.next_after(&at(2024, 12, 31, 23, 59)),
            Some(at(2025, 1, 1, 0, 0))
        );
    }

    #[test]
    fn sub_daily_intervals_are_supported() {
        let every_six_hours = RefreshSchedule::parse("0 */6 * * *").unwrap();
        assert_eq!(
            every_six_hours.next_after(&at(2024, 1, 1, 7, 0)),
            Some(at(2024, 1, 1, 12, 0))
        );
    }

    #[test]
    fn times_are_read_in_the_given_zone() {
        let daily = RefreshSchedule::parse("30 3 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().with_timezone(&Shanghai);
        // 08:00 in Shanghai, so 03:30 local is tomorrow.
        assert_eq!(daily.next_after(&now), Some(at(2024, 1, 2, 3, 30)));
    }

    #[test]
    fn seconds_field_form_is_accepted() {
        let schedule = RefreshSchedule::parse("0  15 2 * * *").unwrap();
        assert_eq!(schedule.to_string(), "0 15 2 * * *");
        assert_eq!(
            schedule.next_after(&at(2024, 1, 1, 0, 0)),
            Some(at(2024, 1, 1, 2, 15))
        );
    }

    #[test]
    fn garbage_is_rejected() {
        for expr in ["", "every day", "0 25 * * *", "* * *"] {
            assert!(RefreshSchedule::parse(expr).is_err(), "{expr:?}");
        }
    }
}
