//! HTTP sources against a local mock echo service

use echoip_core::{
    DEFAULT_CACHE_TTL, Error, HttpConfig, IpSource, MultisourceIpProvider, RequiredKeys,
    SourceConfig, SourceFactory,
};
use echoip_http::{BUILTIN_SOURCES, JsonIpSource, SimpleIpSource, add_builtins, register};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn addr(ip: &str) -> IpAddr {
    ip.parse().unwrap()
}

async fn plain_server(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn json_server(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn simple_source_trims_body() {
    let server = plain_server("203.0.113.5\n").await;
    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &HttpConfig::default());

    assert!(source.last_reading().await.is_none());

    let reading = source.fetch().await.unwrap();
    assert_eq!(reading.ip, addr("203.0.113.5"));
    assert!(reading.info.is_empty());
    assert_eq!(source.last_reading().await, Some(reading));
}

#[tokio::test]
async fn simple_source_rejects_garbage() {
    let server = plain_server("<html>rate limited</html>").await;
    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &HttpConfig::default());

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err.is_source_failure());
    assert!(source.last_reading().await.is_none());
}

#[tokio::test]
async fn error_status_is_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &HttpConfig::default());

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 503, .. }));
    assert!(err.is_source_failure());
}

#[tokio::test]
async fn unreachable_service_is_connection_failure() {
    let server = MockServer::start().await;
    let url = format!("{}/ip", server.uri());
    drop(server);

    let source = SimpleIpSource::new(url, &HttpConfig::default());
    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("127.0.0.1")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let http = HttpConfig {
        timeout_secs: 1,
        ..HttpConfig::default()
    };
    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &http);

    assert!(matches!(
        source.fetch().await,
        Err(Error::Connection { .. })
    ));
}

#[tokio::test]
async fn requests_carry_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "echoip-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("127.0.0.1"))
        .mount(&server)
        .await;
    let http = HttpConfig {
        user_agent: "echoip-test/1.0".to_string(),
        ..HttpConfig::default()
    };

    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &http);
    assert_eq!(source.fetch().await.unwrap().ip, addr("127.0.0.1"));
}

#[tokio::test]
async fn unusable_client_settings_fall_back_to_defaults() {
    let server = plain_server("127.0.0.1").await;
    let http = HttpConfig {
        user_agent: "echoip\nbroken".to_string(),
        ..HttpConfig::default()
    };

    let source = SimpleIpSource::new(format!("{}/ip", server.uri()), &http);
    assert_eq!(source.fetch().await.unwrap().ip, addr("127.0.0.1"));
}

#[tokio::test]
async fn json_source_strips_ip_key() {
    let server = json_server(json!({ "countryCode": "US", "query": "127.0.0.1" })).await;
    let source = JsonIpSource::new(
        format!("{}/json", server.uri()),
        "query",
        &HttpConfig::default(),
    );

    let reading = source.fetch().await.unwrap();
    assert_eq!(reading.ip, addr("127.0.0.1"));
    assert_eq!(reading.info.len(), 1);
    assert_eq!(reading.info["countryCode"], "US");
    assert_eq!(source.last_reading().await, Some(reading));
}

#[tokio::test]
async fn json_source_missing_key_is_parse_failure() {
    let server = json_server(json!({ "origin": "127.0.0.1" })).await;
    let source = JsonIpSource::new(format!("{}/json", server.uri()), "ip", &HttpConfig::default());

    assert!(matches!(source.fetch().await, Err(Error::Parse { .. })));
}

#[tokio::test]
async fn factory_builds_registered_types() {
    let server = json_server(json!({ "ip": "198.51.100.7", "city": "Portland" })).await;

    let mut factory = SourceFactory::new();
    register(&mut factory, &HttpConfig::default());
    assert!(factory.has_constructor("simple"));
    assert!(factory.has_constructor("json"));

    factory
        .add_source(SourceConfig::json(format!("{}/json", server.uri()), "ip"))
        .unwrap();

    let source = factory.get_sources(None, &[]).next().unwrap().unwrap();
    assert_eq!(source.kind(), "json");
    let reading = source.fetch().await.unwrap();
    assert_eq!(reading.ip, addr("198.51.100.7"));
    assert_eq!(reading.info["city"], "Portland");
}

#[test]
fn builtins_need_constructors() {
    let mut factory = SourceFactory::new();
    assert!(matches!(
        add_builtins(&mut factory),
        Err(Error::InvalidSource(_))
    ));

    register(&mut factory, &HttpConfig::default());
    assert_eq!(add_builtins(&mut factory).unwrap(), BUILTIN_SOURCES.len());
    assert_eq!(add_builtins(&mut factory).unwrap(), 0);
    assert_eq!(factory.num_sources(), BUILTIN_SOURCES.len());
    assert_eq!(factory.get_sources(None, &["simple"]).count(), 3);
    assert_eq!(factory.get_sources(None, &["json"]).count(), 4);
}

#[tokio::test]
async fn multisource_provider_over_http() {
    let plain = plain_server("127.0.0.1").await;
    let geo = json_server(json!({ "countryCode": "US", "query": "127.0.0.1" })).await;
    let other = json_server(json!({ "ip": "127.0.0.1", "countryCode2": "US" })).await;

    let mut factory = SourceFactory::new();
    register(&mut factory, &HttpConfig::default());
    factory
        .add_source(SourceConfig::simple(format!("{}/ip", plain.uri())))
        .unwrap();
    factory
        .add_source(SourceConfig::json(format!("{}/json", geo.uri()), "query"))
        .unwrap();
    factory
        .add_source(SourceConfig::json(format!("{}/json", other.uri()), "ip"))
        .unwrap();

    let sources: Vec<Arc<dyn IpSource>> = factory
        .get_sources(None, &[])
        .collect::<echoip_core::Result<_>>()
        .unwrap();
    let provider = MultisourceIpProvider::new(DEFAULT_CACHE_TTL, 2).with_sources(sources);

    let required = RequiredKeys::new().key("countryCode").key("countryCode2");
    let info = provider.get_info(Some(&required)).await.unwrap();
    assert_eq!(info["countryCode"], "US");
    assert_eq!(info["countryCode2"], "US");
    assert_eq!(provider.get_ip().await.unwrap(), addr("127.0.0.1"));
}
