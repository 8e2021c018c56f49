use thiserror::Error;

/// Errors returned by provider, identity and service operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL is not a valid absolute URL.
    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// Endpoint path could not be joined to the base URL.
    #[error("invalid endpoint path '{0}'")]
    InvalidPath(String),

    /// The identity service did not advertise any version this client speaks.
    #[error("no supported identity version available from endpoint {0}")]
    NoSupportedVersion(String),

    /// A supported identity version was found but carries no `self` link.
    #[error("endpoint missing in version {version} response from {base}")]
    MissingVersionEndpoint { version: String, base: String },

    /// The caller pinned a major version that differs from the one the
    /// service constructor binds.
    #[error(
        "conflict between requested service major version {supported} and manually set version {requested}"
    )]
    VersionConflict { requested: u32, supported: u32 },

    /// A required input field is absent.
    #[error("missing input for argument [{0}]")]
    MissingInput(&'static str),

    /// Credential fields were combined in a way the identity API rejects.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(&'static str),

    /// A token was passed through without a scope while reauthentication
    /// was requested.
    #[error("cannot use allow_reauth when the token ID is defined and auth scope is not set")]
    ReauthWithPassthroughToken,

    /// The provider has no session yet.
    #[error("provider client is not authenticated")]
    Unauthenticated,

    /// Reauthentication was requested on a provider that has no
    /// reauthenticator installed.
    #[error("reauthentication is not enabled for this provider client")]
    ReauthNotConfigured,

    /// Endpoint options reached catalog resolution without a service type.
    #[error("service type is required to resolve an endpoint")]
    ServiceTypeRequired,

    /// No catalog entry matched the endpoint options.
    #[error("no {availability} endpoint found for service type '{service_type}'{}", region_suffix(.region))]
    EndpointNotFound {
        service_type: String,
        region: Option<String>,
        availability: String,
    },

    /// More than one catalog entry matched the endpoint options.
    #[error("discovered {count} matching endpoints for service type '{service_type}': {urls:?}")]
    AmbiguousEndpoint {
        service_type: String,
        count: usize,
        urls: Vec<String>,
    },

    /// The interface name is not one of `public`, `internal`, `admin`.
    #[error("unexpected availability '{0}': must be one of public, internal or admin")]
    InvalidAvailability(String),

    /// A configuration variable is missing from the environment.
    #[error("missing environment variable [{0}]")]
    MissingEnvironmentVariable(&'static str),

    /// Successful response without a field the client needs.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Automatic reauthentication after a token rejection failed.
    #[error("unable to reauthenticate after '{original}': {source}")]
    Reauthentication {
        original: Box<ClientError>,
        #[source]
        source: Box<ClientError>,
    },

    /// HTTP transport-layer request failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Body could not be serialized or parsed as JSON.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// URL manipulation failed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Unexpected HTTP status with response payload.
    #[error("{method} {url} returned status {status}: {body}")]
    HttpStatus {
        method: reqwest::Method,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl ClientError {
    /// HTTP status of the failed call, when the failure came from the server.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Reauthentication { original, .. } => original.status(),
            Self::Request(err) => err.status(),
            _ => None,
        }
    }

    /// Whether the server answered `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(reqwest::StatusCode::NOT_FOUND)
    }

    /// Whether the failure is a catalog resolution problem rather than a
    /// transport or server failure.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound { .. } | Self::AmbiguousEndpoint { .. } | Self::Unauthenticated
        )
    }
}

fn region_suffix(region: &Option<String>) -> String {
    region
        .as_deref()
        .map(|region| format!(" in region '{region}'"))
        .unwrap_or_default()
}
