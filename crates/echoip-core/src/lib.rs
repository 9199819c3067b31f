// # echoip-core
//
// Core library for looking up the external IP address through third-party
// echo services.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for a single echo service (one round trip per fetch)
// - **SourceFactory**: Registry of source configurations and their constructors
// - **Provider**: Caches results and runs fetch passes over its sources
//   - `IpProvider`: first sufficient answer wins
//   - `MultisourceIpProvider`: several sources must agree on the address
// - **RequiredKeys**: Caller constraints on the info returned with an address
//
// ## Design Principles
//
// 1. **Sources are dumb**: no retries, no caching, one request per fetch
// 2. **One pass per call**: a cache miss visits each source at most once
// 3. **Failures stay local**: a broken source is skipped, never surfaced
// 4. **Library-First**: the `echoip` binary is a thin wrapper over this crate

pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod provider;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use cache::{CacheEntry, ResultCache};
pub use config::{EchoIpConfig, HttpConfig, SourceConfig};
pub use error::{Error, Result};
pub use keys::{KeyRequirement, RequiredKeys};
pub use provider::{
    AgreementPolicy, Consensus, DEFAULT_CACHE_TTL, FetchStrategy, FirstResponse, IpProvider,
    MultisourceIpProvider, Provider, SourceEntry,
};
pub use registry::{SourceFactory, SourceIter};
pub use traits::{InfoMap, IpSource, IpSourceFactory, SourceReading};
