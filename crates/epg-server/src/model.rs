use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A parsed guide document. Lives only for the duration of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideDocument {
    /// Channels in document order.
    pub channels: Vec<Channel>,
    /// Programmes in document order.
    pub programmes: Vec<Programme>,
    /// `generator-info-name` attribute of the root element, if present.
    pub generator_info_name: Option<String>,
    /// `generator-info-url` attribute of the root element, if present.
    pub generator_info_url: Option<String>,
    /// `source-info-name` attribute of the root element, if present.
    pub source_info_name: Option<String>,
    /// `source-info-url` attribute of the root element, if present.
    pub source_info_url: Option<String>,
}

/// A `<channel>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    /// Feed-internal channel identifier, e.g. "1" or "CCTV1".
    pub id: String,
    /// Display names in document order.
    pub display_names: Vec<DisplayName>,
}

/// A `<display-name lang="..">` entry of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayName {
    /// Language tag, e.g. "zh". Empty when the attribute is absent.
    pub lang: String,
    /// Text content, verbatim.
    pub value: String,
}

/// A `<programme>` entry. Timestamps stay raw until the index is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Programme {
    /// Channel id this programme belongs to. Not checked against the channel list.
    pub channel: String,
    /// Raw start timestamp, e.g. "20240101120000 +0800".
    pub start: String,
    /// Raw stop timestamp.
    pub stop: String,
    /// Programme title.
    pub title: String,
}

/// One schedule entry as stored in the index and returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramItem {
    /// Start time, "HH:MM".
    pub start: String,
    /// End time, "HH:MM".
    pub end: String,
    pub title: String,
}

/// Programme items of one channel, bucketed by calendar date ("YYYY-MM-DD").
pub type DateBuckets = HashMap<String, Vec<ProgramItem>>;

/// The queryable index produced by one refresh run.
///
/// Serialized field names match the snapshot layout used by earlier deployments, so an
/// existing `epg_cache.json` can be loaded as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Channel display name -> channel id.
    #[serde(rename = "ChannelMap")]
    pub channel_ids: HashMap<String, String>,
    /// Channel id -> date -> programme items in feed order.
    #[serde(rename = "ProgramData")]
    pub programmes: HashMap<String, DateBuckets>,
}

impl CacheIndex {
    /// Number of channels reachable by name.
    pub fn named_channel_count(&self) -> usize {
        self.channel_ids.len()
    }

    /// Total number of programme items across all channels and dates.
    pub fn programme_count(&self) -> usize {
        self.programmes
            .values()
            .flat_map(|dates| dates.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_ids.is_empty() && self.programmes.is_empty()
    }
}

/// Successful query payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgResponse {
    pub channel_name: String,
    pub date: String,
    pub epg_data: Vec<ProgramItem>,
}
