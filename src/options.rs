//! Credentials and scope handed to the identity service.

use crate::ClientError;

/// Scope a token is requested for.
///
/// Leave every field empty to request an unscoped token, or to pass an
/// existing token through without rescoping it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthScope {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub trust_id: Option<String>,
    pub system: bool,
}

impl AuthScope {
    /// Scope to a project by id.
    pub fn project_id(id: impl Into<String>) -> Self {
        Self {
            project_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Scope to a project by name. Names are only unique within a domain.
    pub fn project_name_in_domain(name: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            project_name: Some(name.into()),
            domain_name: Some(domain_name.into()),
            ..Self::default()
        }
    }

    /// Domain-scoped token.
    pub fn domain_id(id: impl Into<String>) -> Self {
        Self {
            domain_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// System scope (`{"system": {"all": true}}`), for cloud-wide operations.
    pub fn system() -> Self {
        Self {
            system: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything needed to obtain a token from the identity service.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct AuthOptions {
    /// Identity URL, versioned (`https://cloud:5000/v3`) or not.
    pub identity_endpoint: String,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    /// Domain of the user. Also the project's domain when scoping by
    /// `tenant_name` without an explicit [`AuthScope`].
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    /// Legacy project scoping, used when `scope` is unset or empty.
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    /// Refresh the token transparently when a request is rejected with 401.
    pub allow_reauth: bool,
    /// Existing token to exchange or pass through.
    pub token_id: Option<String>,
    pub scope: Option<AuthScope>,
    pub application_credential_id: Option<String>,
    pub application_credential_name: Option<String>,
    pub application_credential_secret: Option<String>,
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("identity_endpoint", &self.identity_endpoint)
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("tenant_id", &self.tenant_id)
            .field("tenant_name", &self.tenant_name)
            .field("allow_reauth", &self.allow_reauth)
            .field("token_id", &self.token_id.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("application_credential_id", &self.application_credential_id)
            .field("application_credential_name", &self.application_credential_name)
            .finish_non_exhaustive()
    }
}

impl AuthOptions {
    /// Password credentials for a user identified by name within a domain.
    pub fn password(
        identity_endpoint: impl Into<String>,
        username: impl Into<String>,
        domain_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identity_endpoint: identity_endpoint.into(),
            username: Some(username.into()),
            domain_name: Some(domain_name.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// An existing token, passed through or rescoped depending on `scope`.
    pub fn token(identity_endpoint: impl Into<String>, token_id: impl Into<String>) -> Self {
        Self {
            identity_endpoint: identity_endpoint.into(),
            token_id: Some(token_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: AuthScope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn with_reauth(mut self, allow: bool) -> Self {
        self.allow_reauth = allow;
        self
    }

    /// Reads `OS_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|name| var(name));

        let identity_endpoint =
            var("OS_AUTH_URL").ok_or(ClientError::MissingEnvironmentVariable("OS_AUTH_URL"))?;
        let username = var("OS_USERNAME");
        let user_id = var("OS_USERID").or_else(|| var("OS_USER_ID"));
        let password = var("OS_PASSWORD");
        let token_id = var("OS_TOKEN");
        let application_credential_id = var("OS_APPLICATION_CREDENTIAL_ID");
        let application_credential_name = var("OS_APPLICATION_CREDENTIAL_NAME");
        let application_credential_secret = var("OS_APPLICATION_CREDENTIAL_SECRET");

        let has_app_credential =
            application_credential_id.is_some() || application_credential_name.is_some();

        if !has_app_credential && token_id.is_none() {
            if username.is_none() && user_id.is_none() {
                return Err(ClientError::MissingEnvironmentVariable(
                    "OS_USERNAME or OS_USERID",
                ));
            }
            if password.is_none() {
                return Err(ClientError::MissingEnvironmentVariable("OS_PASSWORD"));
            }
        }
        if has_app_credential && application_credential_secret.is_none() {
            return Err(ClientError::MissingEnvironmentVariable(
                "OS_APPLICATION_CREDENTIAL_SECRET",
            ));
        }

        let tenant_id = first(&["OS_PROJECT_ID", "OS_TENANT_ID"]);
        let tenant_name = first(&["OS_PROJECT_NAME", "OS_TENANT_NAME"]);

        // A project domain given apart from the user domain needs an
        // explicit scope; the legacy tenant fields borrow the user's.
        let project_domain_id = var("OS_PROJECT_DOMAIN_ID");
        let project_domain_name = var("OS_PROJECT_DOMAIN_NAME");
        let system = var("OS_SYSTEM_SCOPE").is_some_and(|value| value == "all");
        let scope = if system {
            Some(AuthScope::system())
        } else if tenant_id.is_none()
            && tenant_name.is_some()
            && (project_domain_id.is_some() || project_domain_name.is_some())
        {
            Some(AuthScope {
                project_name: tenant_name.clone(),
                domain_name: project_domain_name.filter(|_| project_domain_id.is_none()),
                domain_id: project_domain_id,
                ..AuthScope::default()
            })
        } else {
            None
        };

        Ok(Self {
            identity_endpoint,
            username,
            user_id,
            password,
            domain_id: first(&["OS_USER_DOMAIN_ID", "OS_DOMAIN_ID"]),
            domain_name: first(&["OS_USER_DOMAIN_NAME", "OS_DOMAIN_NAME"]),
            tenant_id,
            tenant_name,
            allow_reauth: false,
            token_id,
            scope,
            application_credential_id,
            application_credential_name,
            application_credential_secret,
        })
    }

    /// Scope to request: the explicit one, else derived from the legacy
    /// tenant fields.
    pub fn effective_scope(&self) -> AuthScope {
        if let Some(scope) = self.scope.as_ref().filter(|scope| !scope.is_empty()) {
            return scope.clone();
        }
        if let Some(tenant_id) = &self.tenant_id {
            return AuthScope::project_id(tenant_id.clone());
        }
        if let Some(tenant_name) = &self.tenant_name {
            return AuthScope {
                project_name: Some(tenant_name.clone()),
                domain_id: self.domain_id.clone(),
                domain_name: self.domain_name.clone(),
                ..AuthScope::default()
            };
        }
        AuthScope::default()
    }

    /// A token given without any scope is looked up, not exchanged.
    pub fn is_token_passthrough(&self) -> bool {
        self.token_id.is_some() && self.effective_scope().is_empty()
    }

    /// A copy that never installs a reauthenticator.
    #[must_use]
    pub fn without_reauth(&self) -> Self {
        Self {
            allow_reauth: false,
            ..self.clone()
        }
    }
}
