//! IP providers
//!
//! A [`Provider`] owns a set of sources, a TTL cache and a [`FetchStrategy`]
//! deciding how one fetch pass over the sources turns into an answer.
//!
//! ## Architecture
//!
//! ```text
//!  get_ip() / get_info()
//!          │
//!          ▼
//!  ┌───────────────┐  valid   ┌──────────────┐
//!  │  ResultCache  │─────────▶│ cached answer│
//!  └───────────────┘          └──────────────┘
//!          │ miss
//!          ▼
//!  ┌───────────────┐ shuffled ┌──────────────┐
//!  │   Provider    │─────────▶│FetchStrategy │──▶ IpSource::fetch() ...
//!  └───────────────┘  order   └──────────────┘
//! ```
//!
//! Two strategies ship with the crate:
//!
//! - [`FirstResponse`]: the first source with a sufficient answer wins ([`IpProvider`])
//! - [`Consensus`]: several sources must report the same address ([`MultisourceIpProvider`])
//!
//! ## Threading
//!
//! All lookup methods take `&self`. The cache sits behind a single async
//! mutex that is held for the whole fetch pass, so concurrent callers never
//! see a half-updated entry and never run two passes at once.

mod consensus;
mod first_response;

pub use consensus::{AgreementPolicy, Consensus};
pub use first_response::FirstResponse;

use crate::cache::ResultCache;
use crate::error::Result;
use crate::keys::{self, RequiredKeys};
use crate::traits::{InfoMap, IpSource, SourceReading};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default time a fetched result stays valid
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Provider answering from the first source with a sufficient response
pub type IpProvider = Provider<FirstResponse>;

/// Provider that only trusts an address reported by several sources
pub type MultisourceIpProvider = Provider<Consensus>;

/// A registered source and its bookkeeping
pub struct SourceEntry {
    source: Arc<dyn IpSource>,
    fail_count: AtomicU64,
}

impl SourceEntry {
    fn new(source: Arc<dyn IpSource>) -> Self {
        Self {
            source,
            fail_count: AtomicU64::new(0),
        }
    }

    /// The source itself
    pub fn source(&self) -> &Arc<dyn IpSource> {
        &self.source
    }

    /// Number of failed fetches since registration
    pub fn fail_count(&self) -> u64 {
        self.fail_count.load(Ordering::Relaxed)
    }

    /// Fetch from the source, turning a source failure into `None`
    ///
    /// Errors that are not source failures are passed through and end the
    /// pass.
    pub async fn try_fetch(&self) -> Result<Option<SourceReading>> {
        match self.source.fetch().await {
            Ok(reading) => Ok(Some(reading)),
            Err(e) if e.is_source_failure() => {
                let failures = self.fail_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Skipping source {} ({} failures so far): {}",
                    self.source.name(),
                    failures,
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// How a provider turns one pass over its sources into an answer
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Static checks run before any source is contacted
    fn check(&self, _num_sources: usize) -> Result<()> {
        Ok(())
    }

    /// Visit `sources` in the given order and produce an answer
    ///
    /// `required` constrains the info of the answer; `None` accepts any info.
    async fn fetch(
        &self,
        sources: &[&SourceEntry],
        required: Option<&RequiredKeys>,
    ) -> Result<SourceReading>;
}

/// IP provider with caching over a pluggable fetch strategy
pub struct Provider<S: FetchStrategy> {
    sources: Vec<SourceEntry>,
    strategy: S,
    cache: Mutex<ResultCache>,
    rng: std::sync::Mutex<StdRng>,
}

impl IpProvider {
    /// Create a provider with no sources
    pub fn new(cache_ttl: Duration) -> Self {
        Self::with_strategy(FirstResponse, cache_ttl)
    }
}

impl Default for IpProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl MultisourceIpProvider {
    /// Create a multisource provider requiring `min_source_agreement` sources to agree
    pub fn new(cache_ttl: Duration, min_source_agreement: usize) -> Self {
        Self::with_strategy(Consensus::new(min_source_agreement), cache_ttl)
    }

    /// Create a multisource provider with an explicit agreement policy
    pub fn with_policy(
        cache_ttl: Duration,
        min_source_agreement: usize,
        policy: AgreementPolicy,
    ) -> Self {
        Self::with_strategy(
            Consensus::new(min_source_agreement).with_policy(policy),
            cache_ttl,
        )
    }

    /// Minimum number of agreeing sources
    pub fn min_source_agreement(&self) -> usize {
        self.strategy.min_source_agreement()
    }
}

impl<S: FetchStrategy> Provider<S> {
    /// Create a provider with an explicit strategy
    pub fn with_strategy(strategy: S, cache_ttl: Duration) -> Self {
        Self {
            sources: Vec::new(),
            strategy,
            cache: Mutex::new(ResultCache::new(cache_ttl)),
            rng: std::sync::Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use a seeded RNG for the source order (deterministic passes)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = std::sync::Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Register several sources at once
    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn IpSource>>,
    {
        for source in sources {
            self.add_source(source);
        }
        self
    }

    /// Register a source
    ///
    /// Returns `false` if this exact source instance is already registered.
    pub fn add_source(&mut self, source: Arc<dyn IpSource>) -> bool {
        if self
            .sources
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.source, &source))
        {
            debug!("Source {} already registered", source.name());
            return false;
        }

        debug!("Registered source {} ({})", source.name(), source.kind());
        self.sources.push(SourceEntry::new(source));
        true
    }

    /// Number of registered sources
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Registered sources in registration order
    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    /// The fetch strategy
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Current external address
    ///
    /// Served from the cache while it is valid; otherwise one fetch pass is
    /// made and its result cached.
    pub async fn get_ip(&self) -> Result<IpAddr> {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.valid_entry() {
            debug!("Serving cached IP {}", entry.ip);
            return Ok(entry.ip);
        }

        let reading = self.refresh(&mut cache, None).await?;
        Ok(reading.ip)
    }

    /// Info mapping for the current address
    ///
    /// Served from the cache while it is valid and contains the required
    /// keys; otherwise one fetch pass constrained by `required` is made and
    /// its result cached.
    pub async fn get_info(&self, required: Option<&RequiredKeys>) -> Result<InfoMap> {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.valid_entry()
            && keys::satisfies(&entry.info, required)
        {
            debug!("Serving cached info for {}", entry.ip);
            return Ok(entry.info.clone());
        }

        let reading = self.refresh(&mut cache, required).await?;
        Ok(reading.info)
    }

    /// Expire the cached result
    pub async fn invalidate_cache(&self) {
        self.cache.lock().await.invalidate();
    }

    /// Whether the cached result is present and younger than the TTL
    pub async fn is_cache_valid(&self) -> bool {
        self.cache.lock().await.is_valid()
    }

    /// The configured cache TTL
    pub async fn cache_ttl(&self) -> Duration {
        self.cache.lock().await.ttl()
    }

    /// Run one fetch pass and replace the cache entry with its result
    async fn refresh(
        &self,
        cache: &mut ResultCache,
        required: Option<&RequiredKeys>,
    ) -> Result<SourceReading> {
        self.strategy.check(self.sources.len())?;

        let order = self.shuffled_sources();
        debug!(
            "Starting {} pass over {} source(s)",
            self.strategy.name(),
            order.len()
        );

        let reading = self.strategy.fetch(&order, required).await?;
        cache.store(&reading);

        info!(
            "Fetched IP {} ({} info field(s)) via {}",
            reading.ip,
            reading.info.len(),
            self.strategy.name()
        );
        Ok(reading)
    }

    /// Fresh random visiting order for one pass
    fn shuffled_sources(&self) -> Vec<&SourceEntry> {
        let mut order: Vec<&SourceEntry> = self.sources.iter().collect();
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        order.shuffle(&mut *rng);
        order
    }
}
