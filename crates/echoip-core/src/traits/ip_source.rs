// # IP Source Trait
//
// Defines the interface for asking a single echo service what our external
// address is.
//
// ## Implementations
//
// - Plain-text and JSON HTTP services: `echoip-http` crate
// - Anything else: implement `IpSource` directly and hand it to a provider
//
// ## Usage
//
// ```rust,ignore
// use echoip_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     let reading = source.fetch().await?;
//     println!("{} says we are {}", source.name(), reading.ip);
//     for (key, value) in &reading.info {
//         println!("  {key} = {value}");
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

/// Extra fields returned by a source next to the address itself
pub type InfoMap = HashMap<String, String>;

/// One answer from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReading {
    /// The external address reported by the source
    pub ip: IpAddr,
    /// Everything else the source returned (empty when it only returns the address)
    pub info: InfoMap,
}

impl SourceReading {
    /// Create a reading with no extra fields
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            info: InfoMap::new(),
        }
    }

    /// Create a reading with extra fields
    pub fn with_info(ip: IpAddr, info: InfoMap) -> Self {
        Self { ip, info }
    }
}

/// Trait for IP source implementations
///
/// A source performs exactly one round trip per [`fetch`](IpSource::fetch)
/// call. It does not retry and does not cache on behalf of the caller;
/// both belong to the provider.
///
/// # Errors
///
/// Implementations report their own failures with the source-failure
/// variants of [`Error`](crate::Error):
///
/// - [`Error::Parse`](crate::Error::Parse): the service answered with something
///   that is not an address (or not the expected document)
/// - [`Error::Connection`](crate::Error::Connection): the service could not be reached
/// - [`Error::Http`](crate::Error::Http): the service answered with a non-success status
///
/// Providers skip a source that fails this way. Any other error aborts the
/// fetch pass and is returned to the caller unchanged.
///
/// # Timeouts
///
/// There is no timeout layer above the source. Implementations that do
/// network I/O must bound it themselves.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Perform one round trip and return what the service reported
    async fn fetch(&self) -> Result<SourceReading, crate::Error>;

    /// Human-readable identifier, used in logs and errors
    fn name(&self) -> &str;

    /// Type name of this source (e.g. "simple", "json")
    ///
    /// Matches the constructor name it was registered under in a
    /// [`SourceFactory`](crate::SourceFactory).
    fn kind(&self) -> &str;
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Check that a configuration can be built by this factory
    ///
    /// Called when the configuration is registered, so bad arguments are
    /// rejected before any source is constructed.
    fn validate(&self, config: &crate::config::SourceConfig) -> Result<(), crate::Error> {
        config.validate()
    }

    /// Create an IpSource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this source type
    ///
    /// # Returns
    ///
    /// A boxed IpSource trait object
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
