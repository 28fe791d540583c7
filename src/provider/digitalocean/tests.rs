//! Unit tests for the DigitalOcean adapter.

use std::net::Ipv4Addr;

use rstest::{fixture, rstest};

use super::*;
use crate::provider::ResourceStatus;
use crate::test_support::{CannedResponse, serve_http, serve_http_with};

const KEYS: &str = r#"{"ssh_keys":[
    {"id":512190,"fingerprint":"3b:16","public_key":"ssh-rsa AAAA","name":"burrow"},
    {"id":512191,"fingerprint":"3b:17","public_key":"ssh-rsa BBBB","name":"laptop"}
],"links":{},"meta":{"total":2}}"#;

const DROPLETS: &str = r#"{"droplets":[{
    "id":3164444,"name":"burrow","status":"active",
    "region":{"slug":"ams3","name":"Amsterdam 3"},
    "image":{"slug":"ubuntu-22-04-x64","distribution":"Ubuntu"},
    "networks":{"v4":[
        {"ip_address":"10.128.192.124","type":"private"},
        {"ip_address":"192.241.165.154","type":"public"}
    ]}
}]}"#;

#[fixture]
fn config() -> DigitalOceanConfig {
    DigitalOceanConfig {
        api_token: "token-123".to_owned(),
        region: "ams3".to_owned(),
        size: "s-1vcpu-1gb".to_owned(),
        image: "ubuntu-22-04-x64".to_owned(),
        request_pacing_ms: 0,
    }
}

#[test]
fn decodes_key_listing() {
    let keys = decode_keys(KEYS).unwrap_or_else(|err| panic!("keys should decode: {err}"));
    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys.first().map(|key| (key.id.as_str(), key.name.as_str())),
        Some(("512190", "burrow"))
    );
}

#[test]
fn decodes_empty_key_listing() {
    let keys = decode_keys(r#"{"ssh_keys":[]}"#)
        .unwrap_or_else(|err| panic!("empty listing should decode: {err}"));
    assert!(keys.is_empty());
}

#[test]
fn decodes_droplet_with_public_address() {
    let droplets =
        decode_droplets(DROPLETS).unwrap_or_else(|err| panic!("droplets should decode: {err}"));
    let droplet = droplets
        .first()
        .unwrap_or_else(|| panic!("one droplet expected"));
    assert_eq!(droplet.id, "3164444");
    assert_eq!(droplet.status, ResourceStatus::Active);
    assert_eq!(droplet.address, Some(Ipv4Addr::new(192, 241, 165, 154)));
    assert_eq!(droplet.region, "ams3");
    assert_eq!(droplet.operating_system, "ubuntu-22-04-x64");
}

#[test]
fn new_droplet_has_no_address() {
    let body = r#"{"droplets":[{"id":1,"name":"burrow","status":"new","networks":{"v4":[]}}]}"#;
    let droplets = decode_droplets(body).unwrap_or_else(|err| panic!("decode: {err}"));
    assert_eq!(
        droplets.first().map(|droplet| (droplet.address, droplet.status.clone())),
        Some((None, ResourceStatus::Pending))
    );
}

#[rstest]
#[case(r#"{"ssh_key":{"id":7,"name":"burrow"}}"#, Ok("7".to_owned()))]
#[case(
    r#"{"id":"unprocessable_entity"}"#,
    Err(ProviderError::MissingIdentifier {
        what: "ssh key".to_owned(),
        body: r#"{"id":"unprocessable_entity"}"#.to_owned(),
    })
)]
fn decodes_created_key(#[case] body: &str, #[case] expected: Result<String, ProviderError>) {
    assert_eq!(decode_created_key(body), expected);
}

#[test]
fn malformed_body_is_a_decode_error() {
    assert!(matches!(
        decode_droplets("<html>"),
        Err(ProviderError::Decode { .. })
    ));
}

#[rstest]
fn blank_token_is_rejected(mut config: DigitalOceanConfig) {
    config.api_token = " ".to_owned();
    assert!(matches!(
        DigitalOcean::new(&config),
        Err(ConfigError::MissingField(_))
    ));
}

#[rstest]
#[tokio::test]
async fn lists_keys_with_bearer_token(config: DigitalOceanConfig) {
    let (base_url, server) = serve_http(vec![CannedResponse::new(200, KEYS)]).await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);

    let keys = provider
        .list_credentials()
        .await
        .unwrap_or_else(|err| panic!("listing should succeed: {err}"));

    assert_eq!(keys.len(), 2);
    let requests = server.await.unwrap_or_else(|err| panic!("server: {err}"));
    let request = requests.first().map(String::as_str).unwrap_or_default();
    assert!(
        request.starts_with("GET /account/keys?per_page=200 "),
        "request: {request}"
    );
    assert!(
        request.to_ascii_lowercase().contains("authorization: bearer token-123"),
        "request: {request}"
    );
}

#[rstest]
#[tokio::test]
async fn replace_deletes_then_registers(config: DigitalOceanConfig) {
    let (base_url, server) = serve_http(vec![
        CannedResponse::new(204, ""),
        CannedResponse::new(201, r#"{"ssh_key":{"id":99,"name":"burrow"}}"#),
    ])
    .await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);

    let id = provider
        .replace_credential("512190", "burrow", "ssh-rsa NEW")
        .await
        .unwrap_or_else(|err| panic!("replace should succeed: {err}"));

    assert_eq!(id, "99");
    let requests = server.await.unwrap_or_else(|err| panic!("server: {err}"));
    assert_eq!(requests.len(), 2);
    assert!(requests.first().is_some_and(|r| r.starts_with("DELETE /account/keys/512190 ")));
    assert!(requests.get(1).is_some_and(|r| r.contains(r#""public_key":"ssh-rsa NEW""#)));
}

#[rstest]
#[tokio::test]
async fn create_sends_numeric_key_reference(config: DigitalOceanConfig) {
    let (base_url, server) = serve_http(vec![CannedResponse::new(
        202,
        r#"{"droplet":{"id":3164494,"name":"burrow","status":"new"}}"#,
    )])
    .await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);
    let request = ResourceRequest::builder()
        .name("burrow")
        .defaults(provider.defaults())
        .credential_id("512190")
        .build()
        .unwrap_or_else(|err| panic!("request: {err}"));

    let id = provider
        .create_resource(&request)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert_eq!(id, "3164494");
    let requests = server.await.unwrap_or_else(|err| panic!("server: {err}"));
    let sent = requests.first().map(String::as_str).unwrap_or_default();
    assert!(sent.contains(r#""ssh_keys":[512190]"#), "request: {sent}");
    assert!(sent.contains(r#""region":"ams3""#), "request: {sent}");
}

#[rstest]
#[tokio::test]
async fn unexpected_status_surfaces_body(config: DigitalOceanConfig) {
    let (base_url, _server) = serve_http(vec![CannedResponse::new(
        401,
        r#"{"id":"unauthorized","message":"Unable to authenticate you."}"#,
    )])
    .await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);

    let err = provider
        .list_resources()
        .await
        .err()
        .unwrap_or_else(|| panic!("401 should fail"));

    assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    assert!(err.to_string().contains("Unable to authenticate you."));
}

fn droplet_page(first_id: u64, count: u64, next: Option<&str>) -> String {
    let droplets: Vec<String> = (first_id..first_id + count)
        .map(|id| format!(r#"{{"id":{id},"name":"other-{id}","status":"active"}}"#))
        .collect();
    let links = next.map_or_else(
        || String::from("{}"),
        |link| format!(r#"{{"pages":{{"next":"{link}"}}}}"#),
    );
    format!(r#"{{"droplets":[{}],"links":{links}}}"#, droplets.join(","))
}

#[rstest]
#[tokio::test]
async fn listing_follows_next_page_links(config: DigitalOceanConfig) {
    let (base_url, server) = serve_http_with(|base| {
        vec![
            CannedResponse::new(
                200,
                droplet_page(1, 20, Some(&format!("{base}/droplets?page=2&per_page=200"))),
            ),
            CannedResponse::new(
                200,
                r#"{"droplets":[{"id":99,"name":"burrow","status":"active"}],"links":{"pages":{"prev":"x"}}}"#,
            ),
        ]
    })
    .await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);

    let droplets = provider
        .list_resources()
        .await
        .unwrap_or_else(|err| panic!("listing should succeed: {err}"));

    assert_eq!(droplets.len(), 21);
    assert_eq!(droplets.last().map(|droplet| droplet.name.as_str()), Some("burrow"));
    let requests = server.await.unwrap_or_else(|err| panic!("server: {err}"));
    assert_eq!(requests.len(), 2);
    assert!(requests.first().is_some_and(|r| r.starts_with("GET /droplets?per_page=200 ")));
    assert!(requests.get(1).is_some_and(|r| r.starts_with("GET /droplets?page=2&per_page=200 ")));
}

#[rstest]
#[tokio::test]
async fn self_referencing_next_link_stops_listing(config: DigitalOceanConfig) {
    let (base_url, server) = serve_http_with(|base| {
        vec![CannedResponse::new(
            200,
            format!(
                r#"{{"ssh_keys":[{{"id":1,"name":"burrow"}}],"links":{{"pages":{{"next":"{base}/account/keys?per_page=200"}}}}}}"#
            ),
        )]
    })
    .await;
    let provider = DigitalOcean::new(&config)
        .unwrap_or_else(|err| panic!("adapter: {err}"))
        .with_base_url(base_url);

    let keys = provider
        .list_credentials()
        .await
        .unwrap_or_else(|err| panic!("listing should succeed: {err}"));

    assert_eq!(keys.len(), 1);
    let requests = server.await.unwrap_or_else(|err| panic!("server: {err}"));
    assert_eq!(requests.len(), 1);
}
