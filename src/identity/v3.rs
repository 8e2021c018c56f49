//! Identity v3 token exchange.

use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::IdentityVersion;
use crate::catalog::{Availability, CatalogEndpoint, CatalogEntry, ServiceCatalog};
use crate::options::{AuthOptions, AuthScope};
use crate::provider::{AUTH_TOKEN_HEADER, Session, Token, TokenScope};
use crate::request::{RequestOptions, join_path};
use crate::{ClientError, ProviderClient};

pub(crate) const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Obtains a session from a v3 endpoint.
///
/// A token without scope is looked up as is. Everything else is exchanged
/// for a new token through `POST auth/tokens`.
pub(crate) async fn authenticate(
    provider: &ProviderClient,
    endpoint: &Url,
    options: &AuthOptions,
) -> Result<Session, ClientError> {
    if options.is_token_passthrough() {
        if options.allow_reauth {
            return Err(ClientError::ReauthWithPassthroughToken);
        }
        let token_id = options.token_id.as_deref().unwrap_or_default();
        return get_token(provider, endpoint, token_id).await;
    }

    let body = auth_body(options)?;
    let response = provider
        .request(
            Method::POST,
            join_path(endpoint, "auth/tokens")?,
            RequestOptions::new()
                .json(body)
                .ok_codes(&[201])
                .omit_token(),
        )
        .await?;

    let token_id = response
        .header(SUBJECT_TOKEN_HEADER)
        .unwrap_or_default()
        .to_owned();
    let payload: TokenResponse = response.json()?;
    payload.into_session(token_id)
}

/// Validates an existing token and fetches its catalog.
async fn get_token(
    provider: &ProviderClient,
    endpoint: &Url,
    token_id: &str,
) -> Result<Session, ClientError> {
    let response = provider
        .request(
            Method::GET,
            join_path(endpoint, "auth/tokens")?,
            RequestOptions::new()
                .header(AUTH_TOKEN_HEADER, token_id)
                .header(SUBJECT_TOKEN_HEADER, token_id)
                .ok_codes(&[200, 203])
                .omit_token(),
        )
        .await?;

    let token_id = response
        .header(SUBJECT_TOKEN_HEADER)
        .unwrap_or(token_id)
        .to_owned();
    let payload: TokenResponse = response.json()?;
    payload.into_session(token_id)
}

/// Builds the `{"auth": {"identity": ..., "scope": ...}}` request body.
pub(crate) fn auth_body(options: &AuthOptions) -> Result<Value, ClientError> {
    let mut auth = Map::new();
    auth.insert("identity".to_owned(), identity(options)?);
    if let Some(scope) = scope(&options.effective_scope())? {
        auth.insert("scope".to_owned(), scope);
    }
    Ok(json!({ "auth": auth }))
}

fn identity(options: &AuthOptions) -> Result<Value, ClientError> {
    if options.application_credential_id.is_some() || options.application_credential_name.is_some()
    {
        return application_credential(options);
    }

    let Some(password) = options.password.as_deref() else {
        let Some(token_id) = options.token_id.as_deref() else {
            return Err(ClientError::MissingInput("password"));
        };
        if options.username.is_some() || options.user_id.is_some() {
            return Err(ClientError::InvalidCredentials(
                "a user cannot be combined with token authentication",
            ));
        }
        // The token already names its user; the user-domain fields only
        // qualify a legacy `tenant_name` scope here.
        return Ok(json!({
            "methods": ["token"],
            "token": { "id": token_id },
        }));
    };

    let mut user = user(options)?;
    user.insert("password".to_owned(), Value::from(password));
    Ok(json!({
        "methods": ["password"],
        "password": { "user": user },
    }))
}

fn application_credential(options: &AuthOptions) -> Result<Value, ClientError> {
    let secret = options
        .application_credential_secret
        .as_deref()
        .ok_or(ClientError::MissingInput("application_credential_secret"))?;

    let credential = if let Some(id) = options.application_credential_id.as_deref() {
        json!({ "id": id, "secret": secret })
    } else {
        let name = options
            .application_credential_name
            .as_deref()
            .unwrap_or_default();
        json!({ "name": name, "secret": secret, "user": user(options)? })
    };

    Ok(json!({
        "methods": ["application_credential"],
        "application_credential": credential,
    }))
}

/// The `user` object: by id, or by name within a domain.
fn user(options: &AuthOptions) -> Result<Map<String, Value>, ClientError> {
    let mut user = Map::new();
    match (options.username.as_deref(), options.user_id.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(ClientError::InvalidCredentials(
                "exactly one of username and user_id must be set",
            ));
        }
        (None, None) => return Err(ClientError::MissingInput("username or user_id")),
        (None, Some(user_id)) => {
            if options.domain_id.is_some() || options.domain_name.is_some() {
                return Err(ClientError::InvalidCredentials(
                    "a user domain cannot be combined with user_id",
                ));
            }
            user.insert("id".to_owned(), Value::from(user_id));
        }
        (Some(username), None) => {
            user.insert("name".to_owned(), Value::from(username));
            user.insert(
                "domain".to_owned(),
                domain_ref(options.domain_id.as_deref(), options.domain_name.as_deref())?,
            );
        }
    }
    Ok(user)
}

fn domain_ref(id: Option<&str>, name: Option<&str>) -> Result<Value, ClientError> {
    match (id, name) {
        (Some(id), None) => Ok(json!({ "id": id })),
        (None, Some(name)) => Ok(json!({ "name": name })),
        (Some(_), Some(_)) => Err(ClientError::InvalidCredentials(
            "exactly one of domain_id and domain_name must be set",
        )),
        (None, None) => Err(ClientError::MissingInput("domain_id or domain_name")),
    }
}

/// The `scope` object, or `None` for an unscoped token.
pub(crate) fn scope(scope: &AuthScope) -> Result<Option<Value>, ClientError> {
    if scope.system {
        return Ok(Some(json!({ "system": { "all": true } })));
    }

    if let Some(project_name) = scope.project_name.as_deref() {
        if scope.project_id.is_some() {
            return Err(ClientError::InvalidCredentials(
                "exactly one of project_id and project_name must be set",
            ));
        }
        let domain = domain_ref(scope.domain_id.as_deref(), scope.domain_name.as_deref())?;
        return Ok(Some(json!({
            "project": { "name": project_name, "domain": domain },
        })));
    }

    if let Some(project_id) = scope.project_id.as_deref() {
        if scope.domain_id.is_some() || scope.domain_name.is_some() {
            return Err(ClientError::InvalidCredentials(
                "project_id must not be combined with a domain scope",
            ));
        }
        return Ok(Some(json!({ "project": { "id": project_id } })));
    }

    if scope.domain_id.is_some() || scope.domain_name.is_some() {
        let domain = domain_ref(scope.domain_id.as_deref(), scope.domain_name.as_deref())?;
        return Ok(Some(json!({ "domain": domain })));
    }

    if let Some(trust_id) = scope.trust_id.as_deref() {
        return Ok(Some(json!({ "OS-TRUST:trust": { "id": trust_id } })));
    }

    Ok(None)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    catalog: Vec<RawService>,
    #[serde(default)]
    project: Option<RawProject>,
    #[serde(default)]
    domain: Option<NamedRef>,
    #[serde(default)]
    system: Option<Value>,
    #[serde(default, rename = "OS-TRUST:trust")]
    trust: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    domain: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl TokenResponse {
    fn into_session(self, token_id: String) -> Result<Session, ClientError> {
        if token_id.is_empty() {
            return Err(ClientError::MalformedResponse(format!(
                "identity v3 response has no {SUBJECT_TOKEN_HEADER} header"
            )));
        }

        let body = self.token;
        let scope = if let Some(project) = body.project {
            let (domain_id, domain_name) = project
                .domain
                .map_or((None, None), |domain| (Some(domain.id), domain.name));
            Some(TokenScope::Project {
                id: project.id,
                name: project.name,
                domain_id,
                domain_name,
            })
        } else if let Some(domain) = body.domain {
            Some(TokenScope::Domain {
                id: domain.id,
                name: domain.name,
            })
        } else if let Some(trust) = body.trust {
            Some(TokenScope::Trust { id: trust.id })
        } else {
            body.system.map(|_| TokenScope::System)
        };

        Ok(Session {
            token: Token {
                id: token_id,
                expires_at: body.expires_at,
            },
            scope,
            catalog: catalog(body.catalog),
            identity_version: IdentityVersion::V3,
        })
    }
}

fn catalog(services: Vec<RawService>) -> ServiceCatalog {
    let entries = services
        .into_iter()
        .map(|service| CatalogEntry {
            service_type: service.service_type,
            name: service.name,
            id: service.id,
            endpoints: service
                .endpoints
                .into_iter()
                .filter_map(|endpoint| {
                    // Interfaces outside public/internal/admin are not addressable.
                    let interface = endpoint.interface.parse::<Availability>().ok()?;
                    Some(CatalogEndpoint {
                        interface,
                        region: endpoint.region,
                        region_id: endpoint.region_id,
                        url: endpoint.url,
                    })
                })
                .collect(),
        })
        .collect();
    ServiceCatalog::new(entries)
}
