use crate::error::OidcError;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Hook run after a successful login callback or a matching logout callback.
///
/// It receives the callback request and the outgoing cookie jar, and returns
/// the jar to send (hooks typically add application cookies).
pub type CallbackHook = Arc<dyn Fn(&Parts, CookieJar) -> CookieJar + Send + Sync>;

/// Replaces the default rendering of protocol errors.
pub type ErrorHandler = Arc<dyn Fn(OidcError) -> Response + Send + Sync>;

const CONFIG_ENV_VAR: &str = "BNOIDC_CONFIG";

/// Names of the token cookies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCookieNames {
    pub access: String,
    pub refresh: String,
    pub id: String,
    pub expires_in: String,
}

impl Default for TokenCookieNames {
    fn default() -> Self {
        Self {
            access: "bnoidcat".to_string(),
            refresh: "bnoidcrt".to_string(),
            id: "bnoidcit".to_string(),
            expires_in: "bnoidcei".to_string(),
        }
    }
}

/// Names of every cookie written by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieNames {
    pub auth_params: String,
    pub tokens: TokenCookieNames,
    pub logout: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            auth_params: "bnoidcap".to_string(),
            tokens: TokenCookieNames::default(),
            logout: "bnoidclo".to_string(),
        }
    }
}

impl CookieNames {
    fn all(&self) -> [&str; 6] {
        [
            &self.auth_params,
            &self.tokens.access,
            &self.tokens.refresh,
            &self.tokens.id,
            &self.tokens.expires_in,
            &self.logout,
        ]
    }
}

/// Relying-party configuration, immutable for the lifetime of the process.
///
/// Build it with [`ClientConfig::new`] and the `with_*` methods, or load it
/// from the `BNOIDC_CONFIG` environment variable with
/// [`ClientConfig::from_env`]. Hooks and the error handler can only be set
/// programmatically.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: String,
    /// Switches the token requests to confidential-client mode (HTTP Basic)
    pub client_secret: Option<String>,
    pub issuer_base_url: Url,
    /// Public address of the application, used for redirect URIs and cookies
    pub base_url: Url,
    pub login_path: String,
    pub logout_path: String,
    pub login_callback_path: String,
    pub logout_callback_path: String,
    /// Overrides `base_url` as the source of the cookie domain and secure flag
    pub cookie_domain_url: Option<Url>,
    /// Default `ui_locales` for login requests
    pub locale: Option<String>,
    pub scopes: Vec<String>,
    pub prompts: Vec<String>,
    pub cookies: CookieNames,
    /// Header carrying pre-verified JSON claims from a trusted upstream gateway
    pub trusted_claims_header: Option<String>,
    #[serde(skip)]
    pub after_login: Option<CallbackHook>,
    #[serde(skip)]
    pub after_logout: Option<CallbackHook>,
    #[serde(skip)]
    pub error_handler: Option<ErrorHandler>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "(not printed)"))
            .field("issuer_base_url", &self.issuer_base_url.as_str())
            .field("base_url", &self.base_url.as_str())
            .field("login_path", &self.login_path)
            .field("logout_path", &self.logout_path)
            .field("login_callback_path", &self.login_callback_path)
            .field("logout_callback_path", &self.logout_callback_path)
            .field("cookie_domain_url", &self.cookie_domain_url.as_ref().map(Url::as_str))
            .field("scopes", &self.scopes)
            .field("prompts", &self.prompts)
            .field("cookies", &self.cookies)
            .field("trusted_claims_header", &self.trusted_claims_header)
            .field("after_login", &self.after_login.is_some())
            .field("after_logout", &self.after_logout.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

fn placeholder_url() -> Url {
    Url::parse("https://example.com").expect("placeholder URL should parse")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            issuer_base_url: placeholder_url(),
            base_url: placeholder_url(),
            login_path: "/id/login".to_string(),
            logout_path: "/id/logout".to_string(),
            login_callback_path: "/id/login/callback".to_string(),
            logout_callback_path: "/id/logout/callback".to_string(),
            cookie_domain_url: None,
            locale: None,
            scopes: vec![
                "openid".to_string(),
                "entitlements".to_string(),
                "offline_access".to_string(),
            ],
            prompts: Vec::new(),
            cookies: CookieNames::default(),
            trusted_claims_header: None,
            after_login: None,
            after_logout: None,
            error_handler: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the three required settings and defaults
    /// for everything else.
    pub fn new(client_id: impl Into<String>, issuer_base_url: Url, base_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            issuer_base_url,
            base_url,
            ..Self::default()
        }
    }

    /// Load the configuration from the `BNOIDC_CONFIG` environment variable
    pub fn from_env() -> anyhow::Result<Self> {
        let json = std::env::var(CONFIG_ENV_VAR)
            .map_err(|_| anyhow::anyhow!("{CONFIG_ENV_VAR} environment variable not set"))?;
        Ok(Self::from_json(&json)?)
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, OidcError> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| OidcError::Init(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every other component relies on
    pub fn validate(&self) -> Result<(), OidcError> {
        if self.client_id.trim().is_empty() {
            return Err(OidcError::Init("client_id is required".into()));
        }

        for url in [&self.issuer_base_url, &self.base_url] {
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(OidcError::Init(format!("{url} is not an http(s) URL")));
            }
        }
        if let Some(url) = &self.cookie_domain_url
            && url.host_str().is_none()
        {
            return Err(OidcError::Init(format!("cookie domain {url} has no host")));
        }

        for path in self.flow_paths() {
            if !path.starts_with('/') {
                return Err(OidcError::Init(format!("path {path:?} must begin with '/'")));
            }
        }

        let names = self.cookies.all();
        if names.iter().any(|name| name.is_empty()) {
            return Err(OidcError::Init("cookie names cannot be empty".into()));
        }
        if names.iter().collect::<HashSet<_>>().len() != names.len() {
            return Err(OidcError::Init("cookie names must be distinct".into()));
        }

        Ok(())
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_callback_path(mut self, path: impl Into<String>) -> Self {
        self.login_callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_callback_path(mut self, path: impl Into<String>) -> Self {
        self.logout_callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_cookie_domain_url(mut self, url: Url) -> Self {
        self.cookie_domain_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_prompts<I, S>(mut self, prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompts = prompts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_cookie_names(mut self, names: CookieNames) -> Self {
        self.cookies = names;
        self
    }

    #[must_use]
    pub fn with_trusted_claims_header(mut self, header: impl Into<String>) -> Self {
        self.trusted_claims_header = Some(header.into());
        self
    }

    #[must_use]
    pub fn with_after_login<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Parts, CookieJar) -> CookieJar + Send + Sync + 'static,
    {
        self.after_login = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_after_logout<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Parts, CookieJar) -> CookieJar + Send + Sync + 'static,
    {
        self.after_logout = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(OidcError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn flow_paths(&self) -> [&str; 4] {
        [
            &self.login_path,
            &self.logout_path,
            &self.login_callback_path,
            &self.logout_callback_path,
        ]
    }

    /// Whether `path` is served by the login/logout routes themselves
    pub fn is_flow_route(&self, path: &str) -> bool {
        self.flow_paths().contains(&path)
    }

    /// Path of the application root, the default return target
    pub fn base_path(&self) -> &str {
        self.base_url.path()
    }

    /// The URL cookies are scoped to
    pub fn cookie_domain(&self) -> &Url {
        self.cookie_domain_url.as_ref().unwrap_or(&self.base_url)
    }

    /// Absolute callback URL under the application base, carrying `return-to`
    pub fn callback_url(&self, callback_path: &str, return_to: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}{callback_path}", self.base_url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair("return-to", return_to);
        url
    }
}

/// Prepend `openid` to `scopes` unless present, dropping duplicates
pub fn scopes_with_openid(scopes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once("openid")
        .chain(scopes.iter().map(String::as_str))
        .filter(|scope| seen.insert(*scope))
        .map(str::to_string)
        .collect()
}
