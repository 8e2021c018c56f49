//! Identity v2.0 token exchange.

use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::IdentityVersion;
use crate::catalog::{Availability, CatalogEndpoint, CatalogEntry, ServiceCatalog};
use crate::options::AuthOptions;
use crate::provider::{Session, Token, TokenScope};
use crate::request::{RequestOptions, join_path};
use crate::{ClientError, ProviderClient};

/// Obtains a session from a v2.0 endpoint through `POST tokens`.
pub(crate) async fn authenticate(
    provider: &ProviderClient,
    endpoint: &Url,
    options: &AuthOptions,
) -> Result<Session, ClientError> {
    if options.is_token_passthrough() && options.allow_reauth {
        return Err(ClientError::ReauthWithPassthroughToken);
    }

    let body = auth_body(options)?;
    let response = provider
        .request(
            Method::POST,
            join_path(endpoint, "tokens")?,
            RequestOptions::new()
                .json(body)
                .ok_codes(&[200, 203])
                .omit_token(),
        )
        .await?;

    let payload: AccessResponse = response.json()?;
    payload.into_session()
}

/// Builds the `{"auth": {...}}` request body.
pub(crate) fn auth_body(options: &AuthOptions) -> Result<Value, ClientError> {
    if options.user_id.is_some() {
        return Err(ClientError::InvalidCredentials(
            "identity v2.0 does not accept user_id",
        ));
    }
    if options.application_credential_id.is_some()
        || options.application_credential_name.is_some()
    {
        return Err(ClientError::InvalidCredentials(
            "identity v2.0 does not accept application credentials",
        ));
    }

    let scope = options.effective_scope();
    if scope.system || scope.trust_id.is_some() {
        return Err(ClientError::InvalidCredentials(
            "identity v2.0 only supports project scope",
        ));
    }
    if scope.project_id.is_none() && scope.project_name.is_none() && !scope.is_empty() {
        return Err(ClientError::InvalidCredentials(
            "identity v2.0 does not support domain scope",
        ));
    }

    let mut auth = Map::new();
    if let Some(username) = options.username.as_deref() {
        let password = options
            .password
            .as_deref()
            .ok_or(ClientError::MissingInput("password"))?;
        auth.insert(
            "passwordCredentials".to_owned(),
            json!({ "username": username, "password": password }),
        );
    } else if let Some(token_id) = options.token_id.as_deref() {
        auth.insert("token".to_owned(), json!({ "id": token_id }));
    } else {
        return Err(ClientError::MissingInput("username"));
    }

    if let Some(project_id) = scope.project_id {
        auth.insert("tenantId".to_owned(), Value::from(project_id));
    }
    if let Some(project_name) = scope.project_name {
        auth.insert("tenantName".to_owned(), Value::from(project_name));
    }

    Ok(json!({ "auth": auth }))
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: RawToken,
    #[serde(default, rename = "serviceCatalog")]
    service_catalog: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    #[serde(default)]
    id: String,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default)]
    tenant: Option<RawTenant>,
}

#[derive(Debug, Deserialize)]
struct RawTenant {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(default, rename = "publicURL")]
    public_url: Option<String>,
    #[serde(default, rename = "internalURL")]
    internal_url: Option<String>,
    #[serde(default, rename = "adminURL")]
    admin_url: Option<String>,
}

impl AccessResponse {
    fn into_session(self) -> Result<Session, ClientError> {
        let token = self.access.token;
        if token.id.is_empty() {
            return Err(ClientError::MalformedResponse(
                "identity v2.0 response has no token id".to_owned(),
            ));
        }

        let scope = token.tenant.map(|tenant| TokenScope::Project {
            id: tenant.id,
            name: tenant.name,
            domain_id: None,
            domain_name: None,
        });

        Ok(Session {
            token: Token {
                id: token.id,
                expires_at: token.expires,
            },
            scope,
            catalog: catalog(self.access.service_catalog),
            identity_version: IdentityVersion::V2,
        })
    }
}

/// Flattens each v2.0 endpoint record into one entry per interface.
fn catalog(services: Vec<RawService>) -> ServiceCatalog {
    let entries = services
        .into_iter()
        .map(|service| {
            let mut endpoints = Vec::new();
            for raw in service.endpoints {
                let urls = [
                    (Availability::Public, raw.public_url),
                    (Availability::Internal, raw.internal_url),
                    (Availability::Admin, raw.admin_url),
                ];
                for (interface, url) in urls {
                    let Some(url) = url.filter(|url| !url.is_empty()) else {
                        continue;
                    };
                    endpoints.push(CatalogEndpoint {
                        interface,
                        region: raw.region.clone(),
                        region_id: raw.region.clone(),
                        url,
                    });
                }
            }
            CatalogEntry {
                service_type: service.service_type,
                name: service.name,
                id: None,
                endpoints,
            }
        })
        .collect();
    ServiceCatalog::new(entries)
}
