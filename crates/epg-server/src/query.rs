//! Query handling: parameter validation and cache lookup.
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::cache::{EpgCache, LookupMiss};
use crate::model::EpgResponse;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("missing parameter: both ch and date are required")]
    MissingParameter,

    #[error("invalid date format, expected YYYY-MM-DD")]
    InvalidDateFormat,

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("no programme data for channel {0}")]
    NoProgramData(String),

    #[error("no programme data for channel {channel} on {date}")]
    NoProgramDataForDate { channel: String, date: String },
}

pub struct QueryService {
    cache: Arc<EpgCache>,
    date_re: Regex,
}

impl QueryService {
    pub fn new(cache: Arc<EpgCache>) -> Self {
        Self {
            cache,
            date_re: Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"),
        }
    }

    /// Look up the programme list of `channel` on `date`.
    ///
    /// Parameters are checked in order: presence of both, then the date's calendar format,
    /// then the three-step cache lookup.
    pub fn handle(&self, channel: &str, date: &str) -> Result<EpgResponse, QueryError> {
        debug!(channel, date, "epg query");

        if channel.is_empty() || date.is_empty() {
            return Err(QueryError::MissingParameter);
        }
        if !self.is_calendar_date(date) {
            return Err(QueryError::InvalidDateFormat);
        }

        let epg_data = self.cache.lookup(channel, date).map_err(|miss| match miss {
            LookupMiss::Channel => QueryError::ChannelNotFound(channel.to_string()),
            LookupMiss::Programmes => QueryError::NoProgramData(channel.to_string()),
            LookupMiss::Date => QueryError::NoProgramDataForDate {
                channel: channel.to_string(),
                date: date.to_string(),
            },
        })?;

        Ok(EpgResponse {
            channel_name: channel.to_string(),
            date: date.to_string(),
            epg_data,
        })
    }

    fn is_calendar_date(&self, date: &str) -> bool {
        self.date_re.is_match(date) && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
    }
}
