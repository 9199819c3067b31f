//! Test doubles and common utilities for provider contract tests
//!
//! These sources never touch the network. They count how often they are
//! fetched so tests can assert exactly how much I/O a call performed.

#![allow(dead_code)]

use echoip_core::error::{Error, Result};
use echoip_core::{InfoMap, IpSource, SourceReading};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared record of which sources were fetched, in order
#[derive(Clone, Default)]
pub struct VisitLog(Arc<Mutex<Vec<String>>>);

impl VisitLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    /// Names of fetched sources in visit order
    pub fn visits(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A source returning a fixed (but replaceable) reading
pub struct StaticSource {
    name: String,
    reading: Mutex<SourceReading>,
    fetch_count: AtomicUsize,
    log: Option<VisitLog>,
}

impl StaticSource {
    pub fn new(name: &str, ip: &str, info: InfoMap) -> Arc<Self> {
        Arc::new(Self::unshared(name, ip, info))
    }

    /// Like `new`, for factories that hand out boxed sources
    pub fn unshared(name: &str, ip: &str, info: InfoMap) -> Self {
        Self {
            name: name.to_string(),
            reading: Mutex::new(SourceReading::with_info(addr(ip), info)),
            fetch_count: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Like `new`, recording every fetch in `log`
    pub fn logged(name: &str, ip: &str, info: InfoMap, log: &VisitLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reading: Mutex::new(SourceReading::with_info(addr(ip), info)),
            fetch_count: AtomicUsize::new(0),
            log: Some(log.clone()),
        })
    }

    /// Change the address reported from now on
    pub fn set_ip(&self, ip: &str) {
        self.reading.lock().unwrap().ip = addr(ip);
    }

    /// Get the number of times fetch() was called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for StaticSource {
    async fn fetch(&self) -> Result<SourceReading> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.record(&self.name);
        }
        Ok(self.reading.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "static"
    }
}

/// How a `FailingSource` fails
#[derive(Clone, Copy)]
pub enum Failure {
    Connection,
    Parse,
    Status(u16),
    /// Not a source failure: aborts the pass
    Fatal,
}

/// A source that always fails
pub struct FailingSource {
    name: String,
    failure: Failure,
    fetch_count: AtomicUsize,
}

impl FailingSource {
    pub fn new(name: &str, failure: Failure) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failure,
            fetch_count: AtomicUsize::new(0),
        })
    }

    /// Get the number of times fetch() was called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for FailingSource {
    async fn fetch(&self) -> Result<SourceReading> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Err(match self.failure {
            Failure::Connection => Error::connection(&self.name, "connection refused"),
            Failure::Parse => Error::parse(&self.name, "'<html>' is not an IP address"),
            Failure::Status(status) => Error::http(&self.name, status),
            Failure::Fatal => Error::Other("source is misconfigured".to_string()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "failing"
    }
}

/// Parse an address literal
pub fn addr(ip: &str) -> IpAddr {
    ip.parse().expect("valid IP literal")
}

/// Build an info mapping from pairs
pub fn info(pairs: &[(&str, &str)]) -> InfoMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Seeds used to exercise several visiting orders
pub const SEEDS: std::ops::Range<u64> = 0..16;
