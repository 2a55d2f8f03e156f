//! Login, logout and refresh flows.
//!
//! Each operation takes the request's cookie jar and returns the jar to send
//! back, together with the redirect to issue. Nothing is stored server-side:
//! the only shared state is the provider configuration, resolved once.

use crate::config::{ClientConfig, scopes_with_openid};
use crate::context::OidcContext;
use crate::cookies::{AuthParams, LogoutState, SessionCookies};
use crate::crypto::{generate_code_challenge, generate_code_verifier, generate_nonce, generate_state};
use crate::discovery::{Provider, discover};
use crate::error::OidcError;
use crate::jwt::{VerifiedClaims, VerifyOptions, decode_id_token};
use crate::tokens::{TokenClient, TokenSet};
use crate::url_validation::sanitize_return_to;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Per-call overrides for [`Oidc::login`]
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Where to send the user after the callback, defaults to the base path
    pub return_to: Option<String>,
    /// Replaces the configured scopes; `openid` is always added
    pub scopes: Option<Vec<String>>,
    /// Replaces the configured prompts
    pub prompts: Option<Vec<String>>,
    /// `ui_locales`, defaults to the configured locale
    pub locale: Option<String>,
    /// Opaque token forwarded to the authorization endpoint
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogoutOptions {
    pub return_to: Option<String>,
}

/// Query parameters of the login callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "return-to")]
    pub return_to: Option<String>,
}

/// Query parameters of the logout callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutCallbackParams {
    pub state: Option<String>,
    #[serde(rename = "return-to")]
    pub return_to: Option<String>,
}

struct OidcInner {
    config: ClientConfig,
    cookies: SessionCookies,
    http: reqwest::Client,
    provider: OnceCell<Result<Arc<Provider>, OidcError>>,
}

/// The relying-party engine. Cheap to clone; clones share the provider cache.
#[derive(Clone)]
pub struct Oidc {
    inner: Arc<OidcInner>,
}

impl std::fmt::Debug for Oidc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oidc")
            .field("config", &self.inner.config)
            .field("initialized", &self.inner.provider.initialized())
            .finish()
    }
}

impl Oidc {
    /// Validate `config` and create the engine. No network call is made
    /// until [`Oidc::initialize`] or the first request.
    pub fn new(config: ClientConfig) -> Result<Self, OidcError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| OidcError::Init(format!("failed to create HTTP client: {e}")))?;
        Self::with_http_client(config, http)
    }

    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Result<Self, OidcError> {
        config.validate()?;
        let cookies = SessionCookies::from_config(&config);
        Ok(Self {
            inner: Arc::new(OidcInner {
                config,
                cookies,
                http,
                provider: OnceCell::new(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.inner.cookies
    }

    /// Discovered provider, fetched once per process.
    ///
    /// Concurrent first callers share a single discovery. The outcome,
    /// failure included, is kept until the process restarts.
    pub async fn provider(&self) -> Result<Arc<Provider>, OidcError> {
        self.inner
            .provider
            .get_or_init(|| async {
                discover(&self.inner.http, &self.inner.config.issuer_base_url)
                    .await
                    .map(Arc::new)
                    .inspect_err(|e| tracing::error!("OIDC initialization failed: {e}"))
            })
            .await
            .clone()
    }

    /// Resolve the provider now rather than on the first request
    pub async fn initialize(&self) -> Result<(), OidcError> {
        self.provider().await.map(|_| ())
    }

    /// Render `err` through the configured error handler, or as a plain
    /// status response
    pub fn handle_error(&self, err: OidcError) -> Response {
        match &self.inner.config.error_handler {
            Some(handler) => handler(err),
            None => err.into_response(),
        }
    }

    fn token_client<'a>(&'a self, provider: &'a Provider) -> TokenClient<'a> {
        TokenClient {
            http: &self.inner.http,
            token_endpoint: &provider.well_known.token_endpoint,
            client_id: &self.inner.config.client_id,
            client_secret: self.inner.config.client_secret.as_deref(),
        }
    }

    /// Verify `id_token` against the provider's keys, issuer and this client
    pub fn verify_id_token(&self, provider: &Provider, id_token: &str) -> Option<VerifiedClaims> {
        let opts = VerifyOptions {
            issuer: &provider.well_known.issuer,
            audience: &self.inner.config.client_id,
        };
        decode_id_token(id_token, &provider.keys, opts)
    }

    fn login_redirect_uri(&self, return_to: &str) -> String {
        let config = &self.inner.config;
        config
            .callback_url(&config.login_callback_path, return_to)
            .to_string()
    }

    /// Start the authorization-code flow.
    ///
    /// Stores fresh state, nonce and PKCE verifier in the AuthParams cookie
    /// and redirects to the authorization endpoint.
    pub async fn login(
        &self,
        jar: CookieJar,
        options: LoginOptions,
    ) -> Result<(CookieJar, Redirect), OidcError> {
        let provider = self.provider().await?;
        let config = &self.inner.config;

        let params = AuthParams {
            state: generate_state(),
            nonce: generate_nonce(),
            code_verifier: generate_code_verifier(),
        };
        let code_challenge = generate_code_challenge(&params.code_verifier);

        let return_to = options
            .return_to
            .unwrap_or_else(|| config.base_path().to_string());
        let scopes = scopes_with_openid(options.scopes.as_deref().unwrap_or(&config.scopes));
        let prompts = options.prompts.as_ref().unwrap_or(&config.prompts);
        let locale = options.locale.as_ref().or(config.locale.as_ref());

        let mut url = provider.well_known.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("response_type", "code")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("redirect_uri", &self.login_redirect_uri(&return_to))
                .append_pair("state", &params.state)
                .append_pair("nonce", &params.nonce)
                .append_pair("code_challenge", &code_challenge)
                .append_pair("code_challenge_method", "S256");
            if !prompts.is_empty() {
                query.append_pair("prompt", &prompts.join(" "));
            }
            if let Some(locale) = locale {
                query.append_pair("ui_locales", locale);
            }
            if let Some(token) = &options.token {
                query.append_pair("token", token);
            }
        }

        tracing::debug!("redirecting to authorization endpoint, return-to={return_to}");
        let jar = self.inner.cookies.set_auth_params(jar, &params);
        Ok((jar, Redirect::to(url.as_str())))
    }

    /// Complete the authorization-code flow.
    ///
    /// The AuthParams cookie is cleared in the returned jar on every path,
    /// success or failure.
    pub async fn login_callback(
        &self,
        jar: CookieJar,
        params: &CallbackParams,
        parts: &Parts,
    ) -> (CookieJar, Result<Redirect, OidcError>) {
        let stored = self.inner.cookies.read_auth_params(&jar);
        let cleared = self.inner.cookies.clear_auth_params(jar);

        match self
            .finish_login(cleared.clone(), stored, params, parts)
            .await
        {
            Ok((jar, redirect)) => (jar, Ok(redirect)),
            Err(e) => (cleared, Err(e)),
        }
    }

    async fn finish_login(
        &self,
        jar: CookieJar,
        stored: Option<AuthParams>,
        params: &CallbackParams,
        parts: &Parts,
    ) -> Result<(CookieJar, Redirect), OidcError> {
        let config = &self.inner.config;

        let stored = match (stored, params.state.as_deref()) {
            (Some(stored), Some(state)) if stored.state == state => stored,
            _ => {
                tracing::warn!("login callback state does not match the stored state");
                return Err(OidcError::InvalidState);
            }
        };
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| OidcError::TokenRequest("missing authorization code".into()))?;

        let provider = self.provider().await?;
        let return_to = params
            .return_to
            .clone()
            .unwrap_or_else(|| config.base_path().to_string());

        let tokens = self
            .token_client(&provider)
            .exchange_authorization_code(
                code,
                &self.login_redirect_uri(&return_to),
                Some(&stored.code_verifier),
            )
            .await
            .inspect_err(|e| tracing::warn!("authorization code exchange failed: {e}"))?;

        let claims = self
            .verify_id_token(&provider, &tokens.id_token)
            .ok_or(OidcError::InvalidIdToken)?;
        if claims.nonce.as_ref().is_some_and(|nonce| *nonce != stored.nonce) {
            tracing::warn!("ID token nonce does not match the stored nonce");
            return Err(OidcError::InvalidIdToken);
        }

        tracing::info!(
            "user authenticated: subject={}, email={:?}",
            claims.sub,
            claims.email
        );

        let mut jar = self.inner.cookies.set_tokens(jar, &tokens);
        if let Some(hook) = &config.after_login {
            jar = hook(parts, jar);
        }

        let target = sanitize_return_to(Some(return_to.as_str()), config.base_path());
        Ok((jar, Redirect::to(&target)))
    }

    /// Start an RP-initiated logout.
    ///
    /// The local session is cleared right away, before the provider round
    /// trip completes.
    pub async fn logout(
        &self,
        jar: CookieJar,
        options: LogoutOptions,
    ) -> Result<(CookieJar, Redirect), OidcError> {
        let provider = self.provider().await?;
        let config = &self.inner.config;
        let cookies = &self.inner.cookies;

        let id_token = cookies.read_tokens(&jar).id_token;
        let logout_state = LogoutState {
            state: generate_state(),
        };
        let return_to = options
            .return_to
            .unwrap_or_else(|| config.base_path().to_string());
        let post_logout_redirect_uri = config.callback_url(&config.logout_callback_path, &return_to);

        let mut url = provider.well_known.end_session_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("post_logout_redirect_uri", post_logout_redirect_uri.as_str())
                .append_pair("state", &logout_state.state);
            if let Some(id_token) = &id_token {
                query.append_pair("id_token_hint", id_token);
            }
        }

        let jar = cookies.set_logout_state(jar, &logout_state);
        let jar = cookies.clear_auth_params(jar);
        let jar = cookies.clear_tokens(jar);
        Ok((jar, Redirect::to(url.as_str())))
    }

    /// Finish the logout round trip.
    ///
    /// On a state mismatch the return path is ignored and the user is sent
    /// to "/" without running the after-logout hook.
    pub fn logout_callback(
        &self,
        jar: CookieJar,
        params: &LogoutCallbackParams,
        parts: &Parts,
    ) -> (CookieJar, Redirect) {
        let config = &self.inner.config;
        let stored = self.inner.cookies.read_logout_state(&jar);
        let mut jar = self.inner.cookies.clear_logout_state(jar);

        let matched = matches!(
            (&stored, params.state.as_deref()),
            (Some(stored), Some(state)) if stored.state == state
        );
        if !matched {
            tracing::warn!("logout callback state does not match the stored state");
            return (jar, Redirect::to("/"));
        }

        if let Some(hook) = &config.after_logout {
            jar = hook(parts, jar);
        }
        let target = sanitize_return_to(params.return_to.as_deref(), config.base_path());
        (jar, Redirect::to(&target))
    }

    /// Redeem the context's refresh token and update both the cookies and
    /// the context with the new tokens.
    pub async fn refresh(
        &self,
        jar: CookieJar,
        ctx: &mut OidcContext,
    ) -> Result<CookieJar, OidcError> {
        let refresh_token = ctx
            .refresh_token
            .clone()
            .ok_or_else(|| OidcError::RefreshRequest("no refresh token found".into()))?;
        let provider = self.provider().await?;

        let tokens: TokenSet = self
            .token_client(&provider)
            .exchange_refresh_token(&refresh_token)
            .await?;
        let claims = self
            .verify_id_token(&provider, &tokens.id_token)
            .ok_or_else(|| {
                OidcError::RefreshRequest("refreshed ID token failed verification".into())
            })?;

        tracing::debug!("refreshed tokens for subject={}", claims.sub);
        ctx.apply_tokens(&tokens);
        ctx.authenticate(claims);
        Ok(self.inner.cookies.set_tokens(jar, &tokens))
    }
}
