// # echoip - external IP lookup
//
// Thin command-line wrapper over echoip-core. It is responsible for:
// 1. Reading configuration from environment variables (or a JSON file)
// 2. Initializing logging and the runtime
// 3. Registering source constructors and building the sources
// 4. Running one lookup and printing the result
//
// ## Configuration
//
// - `ECHOIP_CONFIG`: JSON configuration file (other variables override it)
// - `ECHOIP_CACHE_TTL`: Cache TTL in seconds
// - `ECHOIP_MIN_AGREEMENT`: Sources that must agree (> 1 enables consensus)
// - `ECHOIP_AGREEMENT_POLICY`: `keys_satisfied` (default) or `strict`
// - `ECHOIP_USE_BUILTINS`: Register the built-in echo services (default 1)
// - `ECHOIP_SOURCES`: Extra sources, comma-separated `simple:URL` or `json:KEY:URL`
// - `ECHOIP_SOURCE_TYPES`: Only use sources of these types (comma-separated)
// - `ECHOIP_MAX_SOURCES`: Use at most this many sources
// - `ECHOIP_TIMEOUT`: HTTP timeout in seconds
// - `ECHOIP_INFO`: Print the info mapping as JSON instead of the address
// - `ECHOIP_REQUIRED_KEYS`: Keys the info must contain (`a,b|c` = a and one of b or c)
// - `ECHOIP_LOG_LEVEL`: trace, debug, info, warn or error (default warn)
//
// ## Example
//
// ```bash
// export ECHOIP_MIN_AGREEMENT=2
// export ECHOIP_INFO=1
// export ECHOIP_REQUIRED_KEYS=countryCode
//
// echoip
// ```

use anyhow::{Context, Result};
use echoip_core::{
    AgreementPolicy, EchoIpConfig, FetchStrategy, IpProvider, IpSource, MultisourceIpProvider,
    Provider, RequiredKeys, SourceConfig, SourceFactory,
};
use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the possible outcomes of a run
#[derive(Debug, Clone, Copy)]
enum EchoIpExitCode {
    /// The address (or info) was printed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// No answer could be obtained from the sources
    LookupFailed = 2,
}

impl From<EchoIpExitCode> for ExitCode {
    fn from(code: EchoIpExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Everything read from the environment
struct Settings {
    config: EchoIpConfig,
    print_info: bool,
    required_keys: Option<RequiredKeys>,
    log_level: String,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        let mut config = match env::var("ECHOIP_CONFIG") {
            Ok(path) => EchoIpConfig::from_file(&path)
                .with_context(|| format!("Failed to load ECHOIP_CONFIG file {}", path))?,
            Err(_) => EchoIpConfig::new(),
        };

        if let Some(ttl) = env_parse("ECHOIP_CACHE_TTL")? {
            config.cache_ttl_secs = ttl;
        }
        if let Some(min) = env_parse("ECHOIP_MIN_AGREEMENT")? {
            config.min_source_agreement = Some(min);
        }
        if let Ok(policy) = env::var("ECHOIP_AGREEMENT_POLICY") {
            config.agreement_policy = parse_policy(&policy)?;
        }
        if let Some(use_builtins) = env_flag("ECHOIP_USE_BUILTINS")? {
            config.use_builtins = use_builtins;
        }
        if let Ok(sources) = env::var("ECHOIP_SOURCES") {
            for spec in split_list(&sources) {
                config.sources.push(parse_source(spec)?);
            }
        }
        if let Ok(types) = env::var("ECHOIP_SOURCE_TYPES") {
            config.source_types = split_list(&types).map(str::to_string).collect();
        }
        if let Some(max) = env_parse("ECHOIP_MAX_SOURCES")? {
            config.max_sources = Some(max);
        }
        if let Some(timeout) = env_parse("ECHOIP_TIMEOUT")? {
            config.http.timeout_secs = timeout;
        }

        let required_keys = match env::var("ECHOIP_REQUIRED_KEYS") {
            Ok(keys) => Some(
                keys.parse::<RequiredKeys>()
                    .context("Invalid ECHOIP_REQUIRED_KEYS")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            config,
            print_info: env_flag("ECHOIP_INFO")?.unwrap_or(false),
            required_keys,
            log_level: env::var("ECHOIP_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        self.config.validate()?;

        if self.required_keys.is_some() && !self.print_info {
            anyhow::bail!("ECHOIP_REQUIRED_KEYS only applies together with ECHOIP_INFO=1");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ECHOIP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Parse an optional numeric variable
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

/// Parse an optional boolean variable
fn env_flag(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" | "" => Ok(Some(false)),
            _ => anyhow::bail!("{} must be 0 or 1. Got: '{}'", name, value),
        },
        Err(_) => Ok(None),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_policy(value: &str) -> Result<AgreementPolicy> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase())).map_err(|_| {
        anyhow::anyhow!(
            "ECHOIP_AGREEMENT_POLICY '{}' is not valid. \
            Valid policies: keys_satisfied, strict",
            value
        )
    })
}

/// Parse one `ECHOIP_SOURCES` item
fn parse_source(spec: &str) -> Result<SourceConfig> {
    if let Some(url) = spec.strip_prefix("simple:") {
        return Ok(SourceConfig::simple(url));
    }

    if let Some(rest) = spec.strip_prefix("json:") {
        let (ip_key, url) = rest
            .split_once(':')
            .with_context(|| format!("Expected json:KEY:URL. Got: '{}'", spec))?;
        return Ok(SourceConfig::json(url, ip_key));
    }

    anyhow::bail!(
        "ECHOIP_SOURCES item '{}' must start with 'simple:' or 'json:'",
        spec
    )
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return EchoIpExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return EchoIpExitCode::ConfigError.into();
    }

    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // stdout carries the answer only
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return EchoIpExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return EchoIpExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(settings)).into()
}

/// Build the sources and run one lookup
async fn run(settings: Settings) -> EchoIpExitCode {
    let sources = match build_sources(&settings.config) {
        Ok(sources) => sources,
        Err(e) => {
            error!("Failed to build sources: {:#}", e);
            return EchoIpExitCode::ConfigError;
        }
    };

    let config = &settings.config;
    let required = settings.required_keys.as_ref();

    let answer = if config.wants_consensus() {
        let min = config.min_source_agreement.unwrap_or(2);
        let provider =
            MultisourceIpProvider::with_policy(config.cache_ttl(), min, config.agreement_policy)
                .with_sources(sources);
        lookup(&provider, settings.print_info, required).await
    } else {
        let provider = IpProvider::new(config.cache_ttl()).with_sources(sources);
        lookup(&provider, settings.print_info, required).await
    };

    match answer {
        Ok(answer) => {
            println!("{}", answer);
            EchoIpExitCode::Success
        }
        Err(e) => {
            error!("Lookup failed: {:#}", e);
            EchoIpExitCode::LookupFailed
        }
    }
}

/// Register constructors and configurations, then build the sources
fn build_sources(config: &EchoIpConfig) -> Result<Vec<Arc<dyn IpSource>>> {
    let mut factory = SourceFactory::new();

    #[cfg(feature = "http")]
    {
        echoip_http::register(&mut factory, &config.http);
        if config.use_builtins {
            let added = echoip_http::add_builtins(&mut factory)?;
            debug!("Registered {} built-in source(s)", added);
        }
    }

    #[cfg(not(feature = "http"))]
    if config.use_builtins {
        warn!("Built-in sources need the http feature; none registered");
    }

    for source in &config.sources {
        if !factory.add_source(source.clone())? {
            debug!("Skipping duplicate source {:?}", source);
        }
    }

    let types: Vec<&str> = config.source_types.iter().map(String::as_str).collect();
    let sources = factory
        .get_sources(config.max_sources, &types)
        .collect::<echoip_core::Result<Vec<_>>>()?;

    if sources.is_empty() {
        warn!("No sources configured");
    }
    info!(
        "Using {} of {} registered source(s)",
        sources.len(),
        factory.num_sources()
    );

    Ok(sources)
}

/// Run one lookup and render the answer
async fn lookup<S: FetchStrategy>(
    provider: &Provider<S>,
    print_info: bool,
    required: Option<&RequiredKeys>,
) -> Result<String> {
    if print_info {
        let info = provider.get_info(required).await?;
        let info: BTreeMap<_, _> = info.into_iter().collect();
        Ok(serde_json::to_string_pretty(&info)?)
    } else {
        Ok(provider.get_ip().await?.to_string())
    }
}
