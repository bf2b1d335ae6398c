//! Builds the two-level lookup index from a parsed guide document.
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::model::{CacheIndex, GuideDocument, ProgramItem};
use crate::timestamp::parse_timestamp;

/// Only display names with this language tag are used as lookup names.
pub const NAME_LANG: &str = "zh";

/// Build a fresh [`CacheIndex`] from `doc`, interpreting timestamps in `tz`.
///
/// - Each channel contributes its first non-empty `zh` display name to the name index.
///   Duplicate names resolve to the channel that appears last in the document.
/// - Each programme is bucketed under its channel id and the calendar date of its start.
///   Items keep document order within a bucket.
/// - A programme whose start or stop cannot be parsed is skipped and logged.
pub fn build_index(doc: GuideDocument, tz: Tz) -> CacheIndex {
    let mut index = CacheIndex::default();

    for channel in doc.channels {
        let name = channel
            .display_names
            .into_iter()
            .find(|dn| dn.lang == NAME_LANG && !dn.value.is_empty());
        if let Some(name) = name {
            index.channel_ids.insert(name.value, channel.id);
        }
    }

    let mut skipped = 0usize;
    for programme in doc.programmes {
        let start = match parse_timestamp(&programme.start, tz) {
            Ok(t) => t,
            Err(e) => {
                warn!(channel = %programme.channel, error = %e, "skipping programme: bad start time");
                skipped += 1;
                continue;
            }
        };
        let stop = match parse_timestamp(&programme.stop, tz) {
            Ok(t) => t,
            Err(e) => {
                warn!(channel = %programme.channel, error = %e, "skipping programme: bad stop time");
                skipped += 1;
                continue;
            }
        };

        let item = ProgramItem {
            start: start.format("%H:%M").to_string(),
            end: stop.format("%H:%M").to_string(),
            title: programme.title,
        };
        index
            .programmes
            .entry(programme.channel)
            .or_default()
            .entry(start.format("%Y-%m-%d").to_string())
            .or_default()
            .push(item);
    }

    info!(
        named_channels = index.named_channel_count(),
        channels_with_programmes = index.programmes.len(),
        programmes = index.programme_count(),
        skipped,
        "index built"
    );
    index
}
