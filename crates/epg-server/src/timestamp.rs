//! Parser for guide timestamps of the form `YYYYMMDDHHMMSS [+ZZZZ]`.
//!
//! The offset token is ignored: the fourteen digits are read as wall-clock time in the
//! configured zone. Feeds in the wild label local times with arbitrary offsets, and query
//! results are defined in terms of that wall-clock reading.
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

const DIGITS_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed timestamp {input:?}: {reason}")]
pub struct MalformedTimestamp {
    pub input: String,
    pub reason: &'static str,
}

impl MalformedTimestamp {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parse `raw` into an instant in `tz`.
///
/// Field values outside their calendar range carry into the next unit (month 13 is January
/// of the following year, day 32 rolls into the next month). A wall-clock time skipped by a
/// DST transition resolves one hour later; an ambiguous one resolves to the earlier instant.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Result<DateTime<Tz>, MalformedTimestamp> {
    let digits = raw.split(' ').next().unwrap_or_default();
    if digits.len() != DIGITS_LEN {
        return Err(MalformedTimestamp::new(raw, "expected 14 digits"));
    }

    let field = |from: usize, to: usize| -> Result<i64, MalformedTimestamp> {
        digits
            .get(from..to)
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| MalformedTimestamp::new(raw, "non-numeric field"))
    };
    let year = field(0, 4)?;
    let month = field(4, 6)?;
    let day = field(6, 8)?;
    let hour = field(8, 10)?;
    let minute = field(10, 12)?;
    let second = field(12, 14)?;

    let naive = normalize(year, month, day, hour, minute, second)
        .ok_or_else(|| MalformedTimestamp::new(raw, "date out of range"))?;

    resolve_local(tz, naive).ok_or_else(|| MalformedTimestamp::new(raw, "nonexistent local time"))
}

/// Map a wall-clock reading in `tz` to an instant.
///
/// Times in a DST gap move forward one hour; ambiguous times take the earlier instant.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => naive
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|shifted| tz.from_local_datetime(&shifted).earliest()),
    }
}

fn normalize(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
) -> Option<NaiveDateTime> {
    let months = year.checked_mul(12)?.checked_add(month - 1)?;
    let year = i32::try_from(months.div_euclid(12)).ok()?;
    let month0 = months.rem_euclid(12) as u32;

    let first_of_month = NaiveDate::from_ymd_opt(year, month0 + 1, 1)?.and_hms_opt(0, 0, 0)?;
    first_of_month
        .checked_add_signed(TimeDelta::try_days(day - 1)?)?
        .checked_add_signed(TimeDelta::try_hours(hour)?)?
        .checked_add_signed(TimeDelta::try_minutes(minute)?)?
        .checked_add_signed(TimeDelta::try_seconds(second)?)
}
