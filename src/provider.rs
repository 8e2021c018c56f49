//! Shared provider state: the active session, the reauthenticator and the
//! HTTP send path every service client goes through.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::catalog::{EndpointOpts, ServiceCatalog};
use crate::identity::{IdentityVersion, base_endpoint};
use crate::request::{RequestOptions, Response, parse_base_url};

/// Header carrying the session token on every authenticated call.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const DEFAULT_USER_AGENT: &str = concat!("openstack-client/", env!("CARGO_PKG_VERSION"));

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Obtains a fresh session when the current token is rejected.
///
/// Implementations receive a throwaway copy of the provider: same identity
/// endpoints and HTTP client, empty session, reauthentication disabled. They
/// must perform every call through it and return the new session; the live
/// provider swaps it in.
pub trait Reauthenticator: Send + Sync + fmt::Debug {
    fn reauthenticate<'a>(
        &'a self,
        throwaway: &'a ProviderClient,
    ) -> BoxFuture<'a, Result<Session, ClientError>>;
}

/// An issued token.
#[derive(Clone, Eq, PartialEq)]
pub struct Token {
    pub id: String,
    pub expires_at: Option<String>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a token is valid for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenScope {
    Project {
        id: String,
        name: Option<String>,
        domain_id: Option<String>,
        domain_name: Option<String>,
    },
    Domain {
        id: String,
        name: Option<String>,
    },
    System,
    Trust {
        id: String,
    },
}

/// Token and catalog obtained by one authentication.
///
/// The two are always replaced together.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: Token,
    pub scope: Option<TokenScope>,
    pub catalog: ServiceCatalog,
    pub identity_version: IdentityVersion,
}

/// Observable authentication phase of a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticated,
    Reauthenticating,
}

#[derive(Default)]
struct State {
    session: Option<Arc<Session>>,
    reauthenticator: Option<Arc<dyn Reauthenticator>>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<State>,
    // Held for the whole reauthentication round trip.
    reauth_lock: Mutex<()>,
}

/// Client context shared by every service client of one cloud.
///
/// Cloning is cheap and clones share the session. Reads of the session and
/// the reauthentication write are serialized, so a caller sees either the
/// old token with the old catalog or the new token with the new catalog.
#[derive(Clone)]
pub struct ProviderClient {
    identity_base: Url,
    identity_endpoint: Url,
    http: reqwest::Client,
    user_agent: Arc<str>,
    throwaway: bool,
    shared: Arc<Shared>,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("identity_base", &self.identity_base.as_str())
            .field("identity_endpoint", &self.identity_endpoint.as_str())
            .field("throwaway", &self.throwaway)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Creates an unauthenticated provider for an identity endpoint.
    ///
    /// The endpoint may be versioned (`https://cloud:5000/v3`) or not; the
    /// unversioned base is derived by cutting the path before its first
    /// version segment.
    pub fn new(identity_endpoint: impl AsRef<str>) -> Result<Self, ClientError> {
        let identity_endpoint = parse_base_url(identity_endpoint.as_ref())?;
        let identity_base = base_endpoint(&identity_endpoint);

        Ok(Self {
            identity_base,
            identity_endpoint,
            http: reqwest::Client::new(),
            user_agent: Arc::from(DEFAULT_USER_AGENT),
            throwaway: false,
            shared: Arc::default(),
        })
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies, TLS roots).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Overrides the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl AsRef<str>) -> Self {
        self.user_agent = Arc::from(user_agent.as_ref());
        self
    }

    /// Unversioned identity URL, always ending with `/`.
    pub fn identity_base(&self) -> &Url {
        &self.identity_base
    }

    /// Identity URL as given by the caller, always ending with `/`.
    pub fn identity_endpoint(&self) -> &Url {
        &self.identity_endpoint
    }

    /// Whether this is a disposable copy used during reauthentication.
    pub fn is_throwaway(&self) -> bool {
        self.throwaway
    }

    /// A copy with the same configuration, an empty session and
    /// reauthentication disabled.
    pub(crate) fn throwaway(&self) -> Self {
        Self {
            identity_base: self.identity_base.clone(),
            identity_endpoint: self.identity_endpoint.clone(),
            http: self.http.clone(),
            user_agent: Arc::clone(&self.user_agent),
            throwaway: true,
            shared: Arc::default(),
        }
    }

    /// The current session, waiting for an in-flight reauthentication.
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.shared.state.read().await.session.clone()
    }

    /// The current token id.
    pub async fn token(&self) -> Option<String> {
        self.session()
            .await
            .map(|session| session.token.id.clone())
    }

    /// Where the provider stands in the authentication lifecycle.
    ///
    /// A refresh in progress reports [`AuthPhase::Reauthenticating`] even
    /// while the stale session is still installed.
    pub async fn phase(&self) -> AuthPhase {
        if self.shared.reauth_lock.try_lock().is_err() {
            return AuthPhase::Reauthenticating;
        }
        match self.shared.state.try_read() {
            Ok(state) if state.session.is_some() => AuthPhase::Authenticated,
            Ok(_) => AuthPhase::Unauthenticated,
            Err(_) => {
                if self.session().await.is_some() {
                    AuthPhase::Authenticated
                } else {
                    AuthPhase::Unauthenticated
                }
            }
        }
    }

    /// Replaces the session and the reauthenticator in one step.
    ///
    /// Passing `None` as reauthenticator disables transparent
    /// reauthentication. The reauthenticator is ignored on throwaway copies.
    pub async fn install_session(
        &self,
        session: Session,
        reauthenticator: Option<Arc<dyn Reauthenticator>>,
    ) {
        let mut state = self.shared.state.write().await;
        state.session = Some(Arc::new(session));
        state.reauthenticator = if self.throwaway {
            None
        } else {
            reauthenticator
        };
    }

    /// Drops the session and the reauthenticator.
    pub async fn clear_session(&self) {
        let mut state = self.shared.state.write().await;
        *state = State::default();
    }

    /// Installs or removes the reauthenticator, keeping the session.
    pub async fn set_reauthenticator(&self, reauthenticator: Option<Arc<dyn Reauthenticator>>) {
        if self.throwaway {
            return;
        }
        self.shared.state.write().await.reauthenticator = reauthenticator;
    }

    /// Whether a 401 would trigger a transparent refresh.
    pub async fn can_reauthenticate(&self) -> bool {
        !self.throwaway && self.shared.state.read().await.reauthenticator.is_some()
    }

    /// Resolves a service endpoint from the session catalog.
    pub async fn endpoint_url(&self, opts: &EndpointOpts) -> Result<String, ClientError> {
        let session = self.session().await.ok_or(ClientError::Unauthenticated)?;
        session.catalog.endpoint_url(opts)
    }

    /// Replaces the session through the installed reauthenticator.
    ///
    /// Only one reauthentication runs at a time; callers arriving meanwhile
    /// wait for it. When `stale_token` is given and the session already
    /// carries a different token, another caller refreshed it and nothing is
    /// sent.
    pub async fn reauthenticate(&self, stale_token: Option<&str>) -> Result<(), ClientError> {
        if self.throwaway {
            return Err(ClientError::ReauthNotConfigured);
        }

        let _in_flight = self.shared.reauth_lock.lock().await;
        let mut state = self.shared.state.write().await;

        if let (Some(stale), Some(session)) = (stale_token, state.session.as_ref()) {
            if session.token.id != stale {
                debug!("token already refreshed by a concurrent request");
                return Ok(());
            }
        }

        let reauthenticator = state
            .reauthenticator
            .clone()
            .ok_or(ClientError::ReauthNotConfigured)?;

        warn!(identity = %self.identity_base, "token rejected, reauthenticating");
        let throwaway = self.throwaway();
        let session = reauthenticator.reauthenticate(&throwaway).await?;
        if session.token.id.is_empty() {
            return Err(ClientError::MalformedResponse(
                "reauthentication returned an empty token".to_owned(),
            ));
        }

        state.session = Some(Arc::new(session));
        info!(identity = %self.identity_base, "reauthenticated");
        Ok(())
    }

    /// Sends a request carrying the session token.
    ///
    /// A `401 Unauthorized` answer triggers one reauthentication and one
    /// retry when a reauthenticator is installed.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let token = if options.omit_token {
            None
        } else {
            self.token().await
        };

        let error = match self.send(&method, &url, &options, token.as_deref()).await {
            Err(error) if is_unauthorized(&error) && !options.omit_token => error,
            other => return other,
        };

        if !self.can_reauthenticate().await {
            return Err(error);
        }

        if let Err(reauth_error) = self.reauthenticate(token.as_deref()).await {
            return Err(ClientError::Reauthentication {
                original: Box::new(error),
                source: Box::new(reauth_error),
            });
        }

        let token = self.token().await;
        self.send(&method, &url, &options, token.as_deref()).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &*self.user_agent);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }

        if let Some(token) = token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        for (name, value) in &options.headers {
            if !value.is_empty() {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        if let Some(json_body) = &options.json {
            request = request.json(json_body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !options.accepts(method, status) {
            debug!(%method, %url, %status, "unexpected status");
            return Err(ClientError::HttpStatus {
                method: method.clone(),
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

fn is_unauthorized(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::HttpStatus { status, .. } if *status == StatusCode::UNAUTHORIZED
    )
}
