// # Result Cache
//
// Holds the last (address, info) pair a provider produced, together with the
// moment it was fetched.
//
// ## Invariants
//
// - The entry is replaced as a whole on every refresh; there is no way to
//   update the address without the info or the timestamp.
// - Invalidation only expires the timestamp. The stale address and info stay
//   in place but are never served.
// - The clock is `tokio::time::Instant`, so tests can pause and advance time.

use crate::traits::{InfoMap, SourceReading};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// A cached lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cached external address
    pub ip: IpAddr,
    /// Cached info mapping
    pub info: InfoMap,
    /// When the entry was fetched (`None` once invalidated)
    fetched_at: Option<Instant>,
}

impl CacheEntry {
    /// When this entry was fetched, unless it has been invalidated
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }
}

/// Single-entry TTL cache owned by a provider
#[derive(Debug, Clone)]
pub struct ResultCache {
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl ResultCache {
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// How long an entry stays valid
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether an entry is present and younger than the TTL
    pub fn is_valid(&self) -> bool {
        self.valid_entry().is_some()
    }

    /// The entry, if it is still valid
    pub fn valid_entry(&self) -> Option<&CacheEntry> {
        self.entry.as_ref().filter(|entry| {
            entry
                .fetched_at
                .is_some_and(|fetched_at| fetched_at.elapsed() < self.ttl)
        })
    }

    /// The entry regardless of age
    pub fn entry(&self) -> Option<&CacheEntry> {
        self.entry.as_ref()
    }

    /// Replace the entry with a fresh reading, timestamped now
    pub fn store(&mut self, reading: &SourceReading) {
        self.entry = Some(CacheEntry {
            ip: reading.ip,
            info: reading.info.clone(),
            fetched_at: Some(Instant::now()),
        });
    }

    /// Expire the entry without discarding it
    pub fn invalidate(&mut self) {
        if let Some(entry) = self.entry.as_mut() {
            entry.fetched_at = None;
        }
    }
}
