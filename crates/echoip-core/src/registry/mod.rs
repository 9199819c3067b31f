//! Plugin-based source factory
//!
//! The factory keeps two registries:
//!
//! - **constructors**: source type name → [`IpSourceFactory`] that can build it
//! - **sources**: the distinct [`SourceConfig`]s to build sources from
//!
//! ## Usage
//!
//! ```rust,ignore
//! use echoip_core::{SourceConfig, SourceFactory, IpProvider};
//!
//! let mut factory = SourceFactory::new();
//!
//! // Constructors come from implementation crates
//! echoip_http::register(&mut factory, &Default::default());
//!
//! factory.add_source(SourceConfig::simple("https://eth0.me/"))?;
//! factory.add_source(SourceConfig::json("http://ip-api.com/json", "query"))?;
//!
//! let mut provider = IpProvider::default();
//! for source in factory.get_sources(None, &[]) {
//!     provider.add_source(source?);
//! }
//! ```
//!
//! ## Registration
//!
//! Implementation crates register their constructors during initialization:
//!
//! ```rust,ignore
//! // In echoip-http
//! pub fn register(factory: &mut SourceFactory, http: &HttpConfig) {
//!     factory.register_constructor("simple", Box::new(HttpSourceFactory::new(http)));
//!     factory.register_constructor("json", Box::new(HttpSourceFactory::new(http)));
//! }
//! ```

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::traits::{IpSource, IpSourceFactory};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Factory building sources from registered configurations
pub struct SourceFactory {
    /// Registered constructors by source type name
    constructors: HashMap<String, Arc<dyn IpSourceFactory>>,

    /// Distinct source configurations
    sources: Vec<SourceConfig>,

    /// Order of `get_sources`
    rng: StdRng,
}

impl SourceFactory {
    /// Create a new empty factory
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            sources: Vec::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Use a seeded RNG for the order of `get_sources`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Register a constructor for a source type
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "simple", "json")
    /// - `factory`: Factory object for creating source instances
    pub fn register_constructor(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn IpSourceFactory>,
    ) {
        let name = name.into();
        debug!("Registered source constructor {}", name);
        self.constructors.insert(name, Arc::from(factory));
    }

    /// Check if a constructor is registered for a source type
    pub fn has_constructor(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// List all registered source type names
    pub fn list_constructors(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Register a source configuration
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The configuration was added
    /// - `Ok(false)`: An identical configuration is already registered
    /// - `Err(Error::InvalidSource)`: No constructor for its type, or the
    ///   constructor rejected its arguments
    pub fn add_source(&mut self, config: SourceConfig) -> Result<bool> {
        let constructor = self.constructors.get(config.type_name()).ok_or_else(|| {
            Error::invalid_source(format!(
                "No constructor registered for source type: {}",
                config.type_name()
            ))
        })?;

        constructor.validate(&config)?;

        if self.sources.contains(&config) {
            return Ok(false);
        }

        self.sources.push(config);
        Ok(true)
    }

    /// Number of distinct registered configurations
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Registered configurations in registration order
    pub fn configs(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Build sources in random order
    ///
    /// # Parameters
    ///
    /// - `limit`: Maximum number of sources to build (`None` = all)
    /// - `types`: Only build sources of these types (empty = all)
    ///
    /// # Returns
    ///
    /// A one-shot iterator. Sources are only constructed as it is advanced.
    pub fn get_sources(&mut self, limit: Option<usize>, types: &[&str]) -> SourceIter {
        let mut pending: Vec<SourceConfig> = self
            .sources
            .iter()
            .filter(|config| types.is_empty() || types.contains(&config.type_name()))
            .cloned()
            .collect();
        pending.shuffle(&mut self.rng);

        SourceIter {
            constructors: self.constructors.clone(),
            pending: pending.into_iter(),
            remaining: limit.unwrap_or(usize::MAX),
        }
    }
}

impl Default for SourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazily constructed sources from [`SourceFactory::get_sources`]
pub struct SourceIter {
    constructors: HashMap<String, Arc<dyn IpSourceFactory>>,
    pending: std::vec::IntoIter<SourceConfig>,
    remaining: usize,
}

impl Iterator for SourceIter {
    type Item = Result<Arc<dyn IpSource>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let config = self.pending.next()?;
        self.remaining -= 1;

        let built = match self.constructors.get(config.type_name()) {
            Some(constructor) => constructor.create(&config).map(Arc::<dyn IpSource>::from),
            None => Err(Error::invalid_source(format!(
                "No constructor registered for source type: {}",
                config.type_name()
            ))),
        };
        Some(built)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = self.pending.len().min(self.remaining);
        (upper, Some(upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SourceReading;
    use async_trait::async_trait;
    use std::net::IpAddr;

    struct LoopbackSource {
        name: String,
        kind: String,
    }

    #[async_trait]
    impl IpSource for LoopbackSource {
        async fn fetch(&self) -> Result<SourceReading> {
            Ok(SourceReading::new(IpAddr::from([127, 0, 0, 1])))
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> &str {
            &self.kind
        }
    }

    struct LoopbackFactory;

    impl IpSourceFactory for LoopbackFactory {
        fn create(&self, config: &SourceConfig) -> Result<Box<dyn IpSource>> {
            match config {
                SourceConfig::Simple { url } | SourceConfig::Json { url, .. } => {
                    Ok(Box::new(LoopbackSource {
                        name: url.clone(),
                        kind: config.type_name().to_string(),
                    }))
                }
                _ => Err(Error::config("Invalid config for loopback source")),
            }
        }
    }

    fn factory() -> SourceFactory {
        let mut factory = SourceFactory::new().with_seed(1);
        factory.register_constructor("simple", Box::new(LoopbackFactory));
        factory.register_constructor("json", Box::new(LoopbackFactory));
        factory
    }

    #[test]
    fn test_constructor_registration() {
        let mut factory = SourceFactory::new();

        // Initially empty
        assert!(!factory.has_constructor("simple"));

        // Register
        factory.register_constructor("simple", Box::new(LoopbackFactory));

        // Now present
        assert!(factory.has_constructor("simple"));
        assert!(factory.list_constructors().contains(&"simple".to_string()));
    }

    #[test]
    fn test_duplicate_configs_collapse() {
        let mut factory = factory();

        assert!(factory.add_source(SourceConfig::simple("https://eth0.me/")).unwrap());
        assert!(!factory.add_source(SourceConfig::simple("https://eth0.me/")).unwrap());
        assert!(factory.add_source(SourceConfig::json("https://eth0.me/", "ip")).unwrap());
        assert_eq!(factory.num_sources(), 2);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut factory = factory();
        let custom = SourceConfig::Custom {
            factory: "dns".to_string(),
            config: serde_json::json!({ "server": "resolver1.opendns.com" }),
        };

        assert!(matches!(factory.add_source(custom), Err(Error::InvalidSource(_))));
        assert!(matches!(
            factory.add_source(SourceConfig::simple("not-a-url")),
            Err(Error::InvalidSource(_))
        ));
        assert_eq!(factory.num_sources(), 0);
    }

    #[test]
    fn test_limit_and_filter() {
        let mut factory = factory();
        for i in 0..4 {
            factory
                .add_source(SourceConfig::simple(format!("https://simple{i}.test/")))
                .unwrap();
            factory
                .add_source(SourceConfig::json(format!("https://json{i}.test/"), "ip"))
                .unwrap();
        }

        let all: Vec<_> = factory.get_sources(None, &[]).collect();
        assert_eq!(all.len(), 8);

        let capped: Vec<_> = factory.get_sources(Some(3), &[]).collect();
        assert_eq!(capped.len(), 3);

        let json_only: Vec<Arc<dyn IpSource>> = factory
            .get_sources(None, &["json"])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(json_only.len(), 4);
        assert!(json_only.iter().all(|source| source.kind() == "json"));

        assert_eq!(factory.get_sources(Some(0), &[]).count(), 0);
        assert_eq!(factory.get_sources(None, &["custom"]).count(), 0);
    }

    #[test]
    fn test_sources_are_new_instances() {
        let mut factory = factory();
        factory.add_source(SourceConfig::simple("https://eth0.me/")).unwrap();

        let first = factory.get_sources(None, &[]).next().unwrap().unwrap();
        let second = factory.get_sources(None, &[]).next().unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), second.name());
    }
}
