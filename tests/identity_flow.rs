//! Authentication, version negotiation and reauthentication against a mocked
//! identity service.

mod common;

use std::sync::Arc;

use openstack_client::networking::v2::subnets;
use openstack_client::{
    AuthOptions, AuthPhase, AuthScope, ClientError, EndpointOpts, ProviderClient, TokenScope,
    identity, service,
};
use openstack_client::identity::IdentityVersion;
use serde_json::json;
use wiremock::matchers::{any, body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{authenticated_provider, password_options, token_created, v3_token_body};

fn discovery_body(uri: &str) -> serde_json::Value {
    json!({
        "versions": {
            "values": [
                {
                    "id": "v3.14",
                    "status": "stable",
                    "links": [{ "rel": "self", "href": format!("{uri}/v3/") }]
                },
                {
                    "id": "v2.0",
                    "status": "deprecated",
                    "links": [{ "rel": "self", "href": format!("{uri}/v2.0/") }]
                }
            ]
        }
    })
}

#[tokio::test]
async fn negotiates_v3_and_stores_catalog() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(300).set_body_json(discovery_body(&uri)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({
            "auth": {
                "identity": { "methods": ["password"] },
                "scope": { "project": { "id": "p1" } }
            }
        })))
        .respond_with(token_created(&uri, "token-1"))
        .expect(1)
        .mount(&server)
        .await;

    let mut options = password_options(&uri);
    options.identity_endpoint = uri.clone();
    let provider = identity::authenticated_client(&options)
        .await
        .expect("authentication should succeed");

    assert_eq!(provider.phase().await, AuthPhase::Authenticated);
    assert_eq!(provider.token().await.as_deref(), Some("token-1"));
    let session = provider.session().await.expect("session");
    assert!(matches!(session.scope, Some(TokenScope::Project { ref id, .. }) if id == "p1"));

    let network = service::network_v2(&provider, EndpointOpts::new().region("RegionOne"))
        .await
        .expect("network endpoint");
    assert_eq!(network.endpoint().as_str(), format!("{uri}/network/"));
}

#[tokio::test]
async fn discovery_without_supported_version_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": { "values": [{ "id": "v4.0", "status": "stable", "links": [] }] }
        })))
        .mount(&server)
        .await;

    let provider = ProviderClient::new(server.uri()).expect("valid");
    let error = identity::authenticate(&provider, &password_options(&server.uri()))
        .await
        .expect_err("no usable version");
    assert!(matches!(error, ClientError::NoSupportedVersion(_)));
}

fn v2_access_body(uri: &str, token: &str) -> serde_json::Value {
    json!({
        "access": {
            "token": { "id": token, "expires": "2030-01-01T00:00:00Z", "tenant": { "id": "p1", "name": "demo" } },
            "serviceCatalog": [{
                "type": "network",
                "name": "neutron",
                "endpoints": [{ "region": "RegionOne", "publicURL": format!("{uri}/network") }]
            }]
        }
    })
}

/// Authenticates a provider whose catalog publishes identity under
/// `/keystone/v2.0`.
async fn provider_with_keystone_catalog(server: &MockServer) -> ProviderClient {
    let uri = server.uri();
    let mut body = v3_token_body(&uri);
    body["token"]["catalog"][0]["endpoints"][0]["url"] = json!(format!("{uri}/keystone/v2.0"));
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", "token-1")
                .set_body_json(body),
        )
        .expect(1)
        .mount(server)
        .await;

    identity::authenticated_client(&password_options(&uri))
        .await
        .expect("authentication should succeed")
}

#[tokio::test]
async fn exact_self_link_beats_higher_priority() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/identity-v2/"))
        .respond_with(ResponseTemplate::new(300).set_body_json(json!({
            "versions": {
                "values": [
                    {
                        "id": "v3.14",
                        "status": "stable",
                        "links": [{ "rel": "self", "href": format!("{uri}/v3/") }]
                    },
                    {
                        "id": "v2.0",
                        "status": "deprecated",
                        "links": [{ "rel": "self", "href": format!("{uri}/identity-v2/") }]
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/identity-v2/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(v2_access_body(&uri, "v2-token")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut options = AuthOptions::password(format!("{uri}/identity-v2"), "demo", "Default", "secret");
    options.tenant_id = Some("p1".to_owned());
    let provider = identity::authenticated_client(&options)
        .await
        .expect("v2 chosen by its self link");

    assert_eq!(provider.token().await.as_deref(), Some("v2-token"));
    let session = provider.session().await.expect("session");
    assert_eq!(session.identity_version, IdentityVersion::V2);
}

#[tokio::test]
async fn supported_version_without_self_link_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": { "values": [{ "id": "v3.14", "status": "stable", "links": [] }] }
        })))
        .mount(&server)
        .await;

    let provider = ProviderClient::new(server.uri()).expect("valid");
    let error = identity::authenticate(&provider, &password_options(&server.uri()))
        .await
        .expect_err("no endpoint to use");
    match error {
        ClientError::MissingVersionEndpoint { version, .. } => assert_eq!(version, "v3"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn single_version_document_is_negotiated() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": {
                "id": "v3.14",
                "status": "stable",
                "links": [{ "rel": "self", "href": format!("{uri}/v3/") }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(token_created(&uri, "token-1"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ProviderClient::new(&uri).expect("valid");
    identity::authenticate(&provider, &password_options(&uri))
        .await
        .expect("v3 from the single version document");
    assert_eq!(provider.token().await.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn authenticate_v3_with_endpoint_opts_uses_catalog() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let provider = provider_with_keystone_catalog(&server).await;

    Mock::given(method("POST"))
        .and(path("/keystone/v3/auth/tokens"))
        .respond_with(token_created(&uri, "token-2"))
        .expect(1)
        .mount(&server)
        .await;

    identity::authenticate_v3(
        &provider,
        &password_options(&uri),
        EndpointOpts::new().region("RegionOne"),
    )
    .await
    .expect("catalog identity endpoint");
    assert_eq!(provider.token().await.as_deref(), Some("token-2"));
}

#[tokio::test]
async fn authenticate_v2_with_endpoint_opts_uses_catalog() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let provider = provider_with_keystone_catalog(&server).await;

    Mock::given(method("POST"))
        .and(path("/keystone/v2.0/tokens"))
        .and(body_partial_json(json!({ "auth": { "tenantId": "p1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(v2_access_body(&uri, "v2-token")))
        .expect(1)
        .mount(&server)
        .await;

    identity::authenticate_v2(
        &provider,
        &password_options(&uri),
        EndpointOpts::new().region("RegionOne"),
    )
    .await
    .expect("catalog identity endpoint");

    assert_eq!(provider.token().await.as_deref(), Some("v2-token"));
    let session = provider.session().await.expect("session");
    assert_eq!(session.identity_version, IdentityVersion::V2);
}

#[tokio::test]
async fn environment_token_with_project_is_rescoped() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_json(json!({
            "auth": {
                "identity": { "methods": ["token"], "token": { "id": "env-token" } },
                "scope": { "project": { "name": "demo", "domain": { "name": "Default" } } }
            }
        })))
        .respond_with(token_created(&uri, "rescoped"))
        .expect(1)
        .mount(&server)
        .await;

    let auth_url = format!("{uri}/v3");
    let options = AuthOptions::from_lookup(|name: &str| {
        match name {
            "OS_AUTH_URL" => Some(auth_url.as_str()),
            "OS_TOKEN" => Some("env-token"),
            "OS_PROJECT_NAME" => Some("demo"),
            "OS_USER_DOMAIN_NAME" => Some("Default"),
            _ => None,
        }
        .map(str::to_owned)
    })
    .expect("token environment");

    let provider = identity::authenticated_client(&options)
        .await
        .expect("token exchange should succeed");
    assert_eq!(provider.token().await.as_deref(), Some("rescoped"));
}

#[tokio::test]
async fn passthrough_token_is_looked_up_not_exchanged() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/v3/auth/tokens"))
        .and(header("X-Auth-Token", "existing"))
        .and(header("X-Subject-Token", "existing"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Subject-Token", "existing")
                .set_body_json(v3_token_body(&uri)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let options = AuthOptions::token(format!("{uri}/v3"), "existing");
    let provider = identity::authenticated_client(&options)
        .await
        .expect("lookup should succeed");

    assert_eq!(provider.token().await.as_deref(), Some("existing"));
    assert!(!provider.can_reauthenticate().await);
}

#[tokio::test]
async fn passthrough_with_reauth_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let options = AuthOptions::token(format!("{}/v3", server.uri()), "existing").with_reauth(true);
    let error = identity::authenticated_client(&options)
        .await
        .expect_err("must be rejected");
    assert!(matches!(error, ClientError::ReauthWithPassthroughToken));
}

#[tokio::test]
async fn token_rescope_exchanges_token() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({
            "auth": { "identity": { "methods": ["token"], "token": { "id": "existing" } } }
        })))
        .respond_with(token_created(&uri, "rescoped"))
        .expect(1)
        .mount(&server)
        .await;

    let options = AuthOptions::token(format!("{uri}/v3"), "existing")
        .with_scope(AuthScope::project_id("p1"))
        .with_reauth(true);
    let provider = identity::authenticated_client(&options)
        .await
        .expect("rescope should succeed");
    assert_eq!(provider.token().await.as_deref(), Some("rescoped"));
    assert!(provider.can_reauthenticate().await);
}

#[tokio::test]
async fn v2_password_authentication() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .and(body_partial_json(json!({
            "auth": {
                "passwordCredentials": { "username": "demo", "password": "secret" },
                "tenantId": "p1"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": {
                "token": { "id": "v2-token", "expires": "2030-01-01T00:00:00Z", "tenant": { "id": "p1", "name": "demo" } },
                "serviceCatalog": [{
                    "type": "network",
                    "name": "neutron",
                    "endpoints": [{ "region": "RegionOne", "publicURL": format!("{uri}/network") }]
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut options = AuthOptions::password(format!("{uri}/v2.0/"), "demo", "Default", "secret");
    options.tenant_id = Some("p1".to_owned());
    let provider = identity::authenticated_client(&options)
        .await
        .expect("v2 authentication should succeed");

    assert_eq!(provider.token().await.as_deref(), Some("v2-token"));
    let network = service::network_v2(&provider, EndpointOpts::new())
        .await
        .expect("network endpoint");
    assert_eq!(
        network.resource_base().as_str(),
        format!("{uri}/network/v2.0/")
    );
}

#[tokio::test]
async fn expired_token_is_refreshed_once_and_retried() {
    let server = MockServer::start().await;
    let uri = server.uri();

    // Initial authentication, then the reauthentication.
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(token_created(&uri, "token-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(token_created(&uri, "token-2"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/network/v2.0/subnets"))
        .and(header("X-Auth-Token", "token-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/network/v2.0/subnets"))
        .and(header("X-Auth-Token", "token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subnets": [{ "id": "s1", "network_id": "n1", "cidr": "10.0.0.0/24", "ip_version": 4 }]
        })))
        .mount(&server)
        .await;

    let options = password_options(&uri).with_reauth(true);
    let provider = identity::authenticated_client(&options)
        .await
        .expect("authentication should succeed");
    let network = Arc::new(
        service::network_v2(&provider, EndpointOpts::new())
            .await
            .expect("network endpoint"),
    );

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let network = Arc::clone(&network);
        tasks.push(tokio::spawn(async move {
            subnets::list(&network, &subnets::ListOpts::default()).await
        }));
    }
    for task in tasks {
        let listed = task.await.expect("task").expect("list after reauth");
        assert_eq!(listed[0].id, "s1");
    }

    assert_eq!(provider.token().await.as_deref(), Some("token-2"));
}

#[tokio::test]
async fn rejected_token_without_reauth_surfaces_401() {
    let server = MockServer::start().await;
    let provider = authenticated_provider(&server, "token-1").await;

    Mock::given(method("GET"))
        .and(path("/network/v2.0/subnets/s1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let network = service::network_v2(&provider, EndpointOpts::new())
        .await
        .expect("network endpoint");
    let error = subnets::get(&network, "s1").await.expect_err("401");
    assert_eq!(error.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn failed_reauthentication_wraps_both_errors() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(token_created(&uri, "token-1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/network/v2.0/subnets/s1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = identity::authenticated_client(&password_options(&uri).with_reauth(true))
        .await
        .expect("authentication should succeed");
    let network = service::network_v2(&provider, EndpointOpts::new())
        .await
        .expect("network endpoint");

    let error = subnets::delete(&network, "s1").await.expect_err("reauth fails");
    assert!(matches!(error, ClientError::Reauthentication { .. }));
    assert_eq!(error.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    // The stale session stays in place.
    assert_eq!(provider.token().await.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn endpoint_resolution_errors() {
    let server = MockServer::start().await;
    let provider = authenticated_provider(&server, "token-1").await;

    let error = service::compute_v2(&provider, EndpointOpts::new())
        .await
        .expect_err("no compute in catalog");
    assert!(error.is_resolution_error());

    let error = service::network_v2(&provider, EndpointOpts::new().version(3))
        .await
        .expect_err("version conflict");
    assert!(matches!(error, ClientError::VersionConflict { .. }));
}
