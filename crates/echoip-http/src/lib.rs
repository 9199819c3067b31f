// # HTTP IP Sources
//
// Sources that ask a third-party echo service over HTTP for the caller's
// address.
//
// ## Source types
//
// - `simple`: the response body is the address (e.g. `http://l2.io/ip`)
// - `json`: the response body is a JSON object; one key holds the address,
//   the other keys become the info mapping (e.g. `http://ip-api.com/json`)
//
// ## Architecture
//
// Each fetch is exactly one GET request. There are no retries and no
// caching here: the provider decides what to do with a failing source and
// how long an answer stays valid. All sources built by one factory share a
// single `reqwest::Client` (timeout and User-Agent from `HttpConfig`).

use echoip_core::config::{HttpConfig, SourceConfig};
use echoip_core::traits::{InfoMap, IpSource, IpSourceFactory, SourceReading};
use echoip_core::{Error, Result, SourceFactory};

use serde_json::Value;
use std::net::IpAddr;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Echo services registered by [`add_builtins`]
pub const BUILTIN_SOURCES: &[BuiltinSource] = &[
    BuiltinSource::json("http://ip-api.com/json", "query"),
    BuiltinSource::json("http://ipinfo.io/json", "ip"),
    BuiltinSource::json("http://httpbin.org/get", "origin"),
    BuiltinSource::json("http://wtfismyip.com/json", "YourFuckingIPAddress"),
    BuiltinSource::simple("http://eth0.me/"),
    BuiltinSource::simple("http://l2.io/ip"),
    BuiltinSource::simple("http://curlmyip.com/"),
];

/// A well-known public echo service
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSource {
    /// Endpoint queried
    pub url: &'static str,
    /// Key holding the address (`None` for plain-text services)
    pub ip_key: Option<&'static str>,
}

impl BuiltinSource {
    const fn simple(url: &'static str) -> Self {
        Self { url, ip_key: None }
    }

    const fn json(url: &'static str, ip_key: &'static str) -> Self {
        Self {
            url,
            ip_key: Some(ip_key),
        }
    }

    /// Source configuration for this service
    pub fn config(&self) -> SourceConfig {
        match self.ip_key {
            Some(ip_key) => SourceConfig::json(self.url, ip_key),
            None => SourceConfig::simple(self.url),
        }
    }
}

/// Build the shared HTTP client
fn build_client(http: &HttpConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(http.timeout())
        .user_agent(http.user_agent.clone())
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client, using defaults: {}", e);
            reqwest::Client::default()
        })
}

/// GET `url` and return the body of a successful response
async fn get_body(client: &reqwest::Client, name: &str, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::connection(name, format!("Request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::http(name, status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| Error::connection(name, format!("Failed to read response: {}", e)))
}

fn parse_ip(name: &str, text: &str) -> Result<IpAddr> {
    let text = text.trim();
    text.parse()
        .map_err(|_| Error::parse(name, format!("Invalid IP address: {:?}", text)))
}

/// Source reading a plain-text address
pub struct SimpleIpSource {
    url: String,
    client: reqwest::Client,
    last_reading: Mutex<Option<SourceReading>>,
}

impl SimpleIpSource {
    /// Create a source with its own client
    pub fn new(url: impl Into<String>, http: &HttpConfig) -> Self {
        Self::with_client(url, build_client(http))
    }

    fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            last_reading: Mutex::new(None),
        }
    }

    /// The endpoint queried
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reading of the last successful fetch
    pub async fn last_reading(&self) -> Option<SourceReading> {
        self.last_reading.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl IpSource for SimpleIpSource {
    async fn fetch(&self) -> Result<SourceReading> {
        let body = get_body(&self.client, &self.url, &self.url).await?;
        let reading = SourceReading::new(parse_ip(&self.url, &body)?);

        debug!("{} answered {}", self.url, reading.ip);
        *self.last_reading.lock().await = Some(reading.clone());
        Ok(reading)
    }

    fn name(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> &str {
        "simple"
    }
}

/// Source reading a JSON object with the address under one key
pub struct JsonIpSource {
    url: String,
    ip_key: String,
    client: reqwest::Client,
    last_reading: Mutex<Option<SourceReading>>,
}

impl JsonIpSource {
    /// Create a source with its own client
    pub fn new(url: impl Into<String>, ip_key: impl Into<String>, http: &HttpConfig) -> Self {
        Self::with_client(url, ip_key, build_client(http))
    }

    fn with_client(
        url: impl Into<String>,
        ip_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            url: url.into(),
            ip_key: ip_key.into(),
            client,
            last_reading: Mutex::new(None),
        }
    }

    /// The endpoint queried
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key holding the address
    pub fn ip_key(&self) -> &str {
        &self.ip_key
    }

    /// Reading of the last successful fetch
    pub async fn last_reading(&self) -> Option<SourceReading> {
        self.last_reading.lock().await.clone()
    }

    /// Split a response body into the address and the remaining info
    fn parse_body(&self, body: &str) -> Result<SourceReading> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::parse(&self.url, format!("Invalid JSON: {}", e)))?;

        let Value::Object(mut object) = value else {
            return Err(Error::parse(&self.url, "Response is not a JSON object"));
        };

        let ip_value = object.remove(&self.ip_key).ok_or_else(|| {
            Error::parse(&self.url, format!("Response has no {:?} key", self.ip_key))
        })?;

        // Some services list every address seen on the way; the first is the caller.
        let ip_value = match ip_value {
            Value::Array(values) => values.into_iter().next().unwrap_or(Value::Null),
            other => other,
        };

        let ip = match &ip_value {
            Value::String(text) => parse_ip(&self.url, text)?,
            other => {
                return Err(Error::parse(
                    &self.url,
                    format!("{:?} is not an address: {}", self.ip_key, other),
                ));
            }
        };

        let info: InfoMap = object
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Ok(SourceReading::with_info(ip, info))
    }
}

#[async_trait::async_trait]
impl IpSource for JsonIpSource {
    async fn fetch(&self) -> Result<SourceReading> {
        let body = get_body(&self.client, &self.url, &self.url).await?;
        let reading = self.parse_body(&body)?;

        debug!(
            "{} answered {} with {} info field(s)",
            self.url,
            reading.ip,
            reading.info.len()
        );
        *self.last_reading.lock().await = Some(reading.clone());
        Ok(reading)
    }

    fn name(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> &str {
        "json"
    }
}

/// Factory for `simple` and `json` sources
pub struct HttpSourceFactory {
    client: reqwest::Client,
}

impl HttpSourceFactory {
    /// Create a factory whose sources share one client built from `http`
    pub fn new(http: &HttpConfig) -> Self {
        Self {
            client: build_client(http),
        }
    }
}

impl IpSourceFactory for HttpSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn IpSource>> {
        match config {
            SourceConfig::Simple { url } => Ok(Box::new(SimpleIpSource::with_client(
                url.clone(),
                self.client.clone(),
            ))),
            SourceConfig::Json { url, ip_key } => Ok(Box::new(JsonIpSource::with_client(
                url.clone(),
                ip_key.clone(),
                self.client.clone(),
            ))),
            _ => Err(Error::config("Invalid config for HTTP IP source")),
        }
    }
}

/// Register the `simple` and `json` constructors with a factory
pub fn register(factory: &mut SourceFactory, http: &HttpConfig) {
    factory.register_constructor("simple", Box::new(HttpSourceFactory::new(http)));
    factory.register_constructor("json", Box::new(HttpSourceFactory::new(http)));
}

/// Add every built-in echo service to a factory
///
/// The constructors must already be registered (see [`register`]).
/// Returns the number of services that were not registered before.
pub fn add_builtins(factory: &mut SourceFactory) -> Result<usize> {
    let mut added = 0;
    for builtin in BUILTIN_SOURCES {
        if factory.add_source(builtin.config())? {
            added += 1;
        }
    }
    Ok(added)
}
