//! In-memory guide cache.
//!
//! Holds the current [`CacheIndex`] as an immutable snapshot behind an atomic pointer.
//! A refresh builds a complete new index off to the side and installs it with a single
//! swap, so a lookup observes either the old index or the new one, never a mix.
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::model::{CacheIndex, ProgramItem};

/// Why a lookup produced no items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    /// No channel carries this display name.
    Channel,
    /// The channel exists but has no programmes at all.
    Programmes,
    /// The channel has programmes, but none start on the requested date.
    Date,
}

pub struct EpgCache {
    current: ArcSwap<CacheIndex>,
}

impl Default for EpgCache {
    fn default() -> Self {
        Self::new(CacheIndex::default())
    }
}

impl EpgCache {
    pub fn new(index: CacheIndex) -> Self {
        Self {
            current: ArcSwap::from_pointee(index),
        }
    }

    /// Install `index` as the current snapshot. In-flight lookups keep the one they loaded.
    pub fn replace(&self, index: CacheIndex) {
        let named = index.named_channel_count();
        let programmes = index.programme_count();
        self.current.store(Arc::new(index));
        info!(named_channels = named, programmes, "cache index replaced");
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<CacheIndex> {
        self.current.load_full()
    }

    /// Programme items for the channel named `name` on `date` ("YYYY-MM-DD"), in feed order.
    pub fn lookup(&self, name: &str, date: &str) -> Result<Vec<ProgramItem>, LookupMiss> {
        let index = self.current.load();
        let id = index.channel_ids.get(name).ok_or(LookupMiss::Channel)?;
        let dates = index.programmes.get(id).ok_or(LookupMiss::Programmes)?;
        dates.get(date).cloned().ok_or(LookupMiss::Date)
    }
}
