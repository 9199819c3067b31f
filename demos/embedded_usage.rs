//! Minimal embedding example for echoip-core
//!
//! This example uses echoip-core as a library with sources that live in
//! the application itself (no HTTP). The provider lifecycle is fully
//! managed by the application.

use echoip_core::{
    DEFAULT_CACHE_TTL, IpSource, MultisourceIpProvider, RequiredKeys, Result, SourceReading,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Custom IP source for embedded usage
///
/// Stands in for anything the application can ask: a router API, a VPN
/// control socket, a peer.
struct EmbeddedIpSource {
    name: String,
    ip: IpAddr,
    info: HashMap<String, String>,
    fetch_calls: AtomicUsize,
}

impl EmbeddedIpSource {
    fn new(name: &str, ip: IpAddr, info: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ip,
            info: info
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for EmbeddedIpSource {
    async fn fetch(&self) -> Result<SourceReading> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        println!("[Embedded] {} asked", self.name);
        Ok(SourceReading::with_info(self.ip, self.info.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "embedded"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Embedded echoip-core Example ===\n");

    let wan = IpAddr::from([203, 0, 113, 5]);
    let router = EmbeddedIpSource::new("router", wan, &[("isp", "Example Telecom")]);
    let vpn = EmbeddedIpSource::new("vpn", wan, &[("countryCode", "NL")]);
    let peer = EmbeddedIpSource::new("peer", wan, &[]);

    // Two of the three must agree
    println!("1. Creating provider...");
    let mut provider = MultisourceIpProvider::new(DEFAULT_CACHE_TTL, 2);
    for source in [&router, &vpn, &peer] {
        provider.add_source(source.clone());
    }

    println!("2. Looking up the address...");
    let ip = provider.get_ip().await?;
    println!("   External address: {}\n", ip);

    println!("3. Asking for info with a country code...");
    let required: RequiredKeys = "countryCode".parse()?;
    let info = provider.get_info(Some(&required)).await?;
    println!("   Info: {:?}\n", info);

    println!("4. Asking again (served from the cache)...");
    provider.get_ip().await?;

    let total = router.fetch_count() + vpn.fetch_count() + peer.fetch_count();
    println!("\n5. Sources were asked {} time(s) in total.", total);

    provider.invalidate_cache().await;
    println!("   Cache invalidated: valid = {}", provider.is_cache_valid().await);

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Provider lifecycle is fully controlled by application");
    println!("- No global state");
    println!("- Sources can be anything that implements IpSource");

    Ok(())
}
