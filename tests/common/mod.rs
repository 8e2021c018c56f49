//! Mock identity service shared by the integration tests.

#![allow(dead_code)]

use openstack_client::{AuthOptions, AuthScope, ProviderClient, identity};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A v3 token body whose catalog points every service at `uri`.
pub fn v3_token_body(uri: &str) -> Value {
    json!({
        "token": {
            "methods": ["password"],
            "expires_at": "2030-01-01T00:00:00.000000Z",
            "project": {
                "id": "p1",
                "name": "demo",
                "domain": { "id": "default", "name": "Default" }
            },
            "catalog": [
                {
                    "type": "identity",
                    "name": "keystone",
                    "id": "svc-identity",
                    "endpoints": [
                        { "interface": "public", "region": "RegionOne", "region_id": "RegionOne", "url": format!("{uri}/v3") }
                    ]
                },
                {
                    "type": "network",
                    "name": "neutron",
                    "id": "svc-network",
                    "endpoints": [
                        { "interface": "public", "region": "RegionOne", "region_id": "RegionOne", "url": format!("{uri}/network") },
                        { "interface": "internal", "region": "RegionOne", "region_id": "RegionOne", "url": format!("{uri}/network-internal") }
                    ]
                }
            ]
        }
    })
}

pub fn token_created(uri: &str, token: &str) -> ResponseTemplate {
    ResponseTemplate::new(201)
        .insert_header("X-Subject-Token", token)
        .set_body_json(v3_token_body(uri))
}

pub fn password_options(uri: &str) -> AuthOptions {
    AuthOptions::password(format!("{uri}/v3"), "demo", "Default", "secret")
        .with_scope(AuthScope::project_id("p1"))
}

/// Mounts a v3 token endpoint that always issues `token` and authenticates.
pub async fn authenticated_provider(server: &MockServer, token: &str) -> ProviderClient {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(token_created(&server.uri(), token))
        .mount(server)
        .await;

    identity::authenticated_client(&password_options(&server.uri()))
        .await
        .expect("authentication should succeed")
}
