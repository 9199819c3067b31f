//! Core traits for echoip
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Ask one echo service for the external address
//! - [`IpSourceFactory`]: Build sources from a [`SourceConfig`](crate::config::SourceConfig)

pub mod ip_source;

pub use ip_source::{InfoMap, IpSource, IpSourceFactory, SourceReading};
