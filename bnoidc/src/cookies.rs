//! Session cookie codec.
//!
//! Transient flow state (AuthParams, LogoutState) is stored as base64url JSON;
//! tokens are stored as-is, one cookie each. Reads never fail: an absent or
//! malformed cookie reads as `None`.

use crate::config::{ClientConfig, CookieNames};
use crate::tokens::TokenSet;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Lifetime of the AuthParams and LogoutState cookies
pub const FLOW_STATE_TTL_SECS: i64 = 15 * 60;
/// Lifetime of the refresh and ID token cookies
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// State kept between login and login callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

/// State kept between logout and logout callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutState {
    pub state: String,
}

/// Token cookie values as sent back by the browser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Build an http-only cookie; callers may override any attribute through its setters
pub fn cookie(name: String, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Reads and writes the engine's cookies
#[derive(Debug, Clone)]
pub struct SessionCookies {
    names: CookieNames,
    domain: Option<String>,
    secure: bool,
}

impl SessionCookies {
    pub fn new(names: CookieNames, domain: Option<String>, secure: bool) -> Self {
        Self {
            names,
            domain,
            secure,
        }
    }

    /// Scope cookies to the configured cookie domain, secure iff it is https
    pub fn from_config(config: &ClientConfig) -> Self {
        let url = config.cookie_domain();
        Self::new(
            config.cookies.clone(),
            url.host_str().map(str::to_string),
            url.scheme() == "https",
        )
    }

    pub fn names(&self) -> &CookieNames {
        &self.names
    }

    fn build(&self, name: &str, value: String, max_age_secs: i64) -> Cookie<'static> {
        let mut built = cookie(name.to_string(), value, max_age_secs);
        built.set_secure(self.secure);
        if let Some(domain) = &self.domain {
            built.set_domain(domain.clone());
        }
        built
    }

    fn set(&self, jar: CookieJar, name: &str, value: String, max_age_secs: i64) -> CookieJar {
        jar.add(self.build(name, value, max_age_secs))
    }

    /// Overwrite with an empty, already expired cookie
    fn clear(&self, jar: CookieJar, name: &str) -> CookieJar {
        jar.add(self.build(name, String::new(), 0))
    }

    fn read(jar: &CookieJar, name: &str) -> Option<String> {
        jar.get(name)
            .map(|c| c.value().to_string())
            .filter(|value| !value.is_empty())
    }

    fn set_encoded<T: Serialize>(&self, jar: CookieJar, name: &str, value: &T) -> CookieJar {
        match serde_json::to_vec(value) {
            Ok(json) => self.set(jar, name, URL_SAFE_NO_PAD.encode(json), FLOW_STATE_TTL_SECS),
            Err(e) => {
                tracing::error!("failed to encode cookie {name}: {e}");
                jar
            }
        }
    }

    fn read_encoded<T: DeserializeOwned>(jar: &CookieJar, name: &str) -> Option<T> {
        let raw = Self::read(jar, name)?;
        let json = URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&json)
            .inspect_err(|e| tracing::debug!("ignoring malformed cookie {name}: {e}"))
            .ok()
    }

    pub fn set_auth_params(&self, jar: CookieJar, params: &AuthParams) -> CookieJar {
        self.set_encoded(jar, &self.names.auth_params, params)
    }

    pub fn read_auth_params(&self, jar: &CookieJar) -> Option<AuthParams> {
        Self::read_encoded(jar, &self.names.auth_params)
    }

    pub fn clear_auth_params(&self, jar: CookieJar) -> CookieJar {
        self.clear(jar, &self.names.auth_params)
    }

    pub fn set_logout_state(&self, jar: CookieJar, state: &LogoutState) -> CookieJar {
        self.set_encoded(jar, &self.names.logout, state)
    }

    pub fn read_logout_state(&self, jar: &CookieJar) -> Option<LogoutState> {
        Self::read_encoded(jar, &self.names.logout)
    }

    pub fn clear_logout_state(&self, jar: CookieJar) -> CookieJar {
        self.clear(jar, &self.names.logout)
    }

    /// Write the token cookies. A missing refresh token leaves the existing
    /// cookie untouched.
    pub fn set_tokens(&self, jar: CookieJar, tokens: &TokenSet) -> CookieJar {
        let names = &self.names.tokens;
        let ttl = i64::try_from(tokens.expires_in).unwrap_or(i64::MAX);
        let mut jar = self.set(jar, &names.access, tokens.access_token.clone(), ttl);
        jar = self.set(jar, &names.expires_in, tokens.expires_in.to_string(), ttl);
        jar = self.set(jar, &names.id, tokens.id_token.clone(), SESSION_TTL_SECS);
        if let Some(refresh_token) = &tokens.refresh_token {
            jar = self.set(jar, &names.refresh, refresh_token.clone(), SESSION_TTL_SECS);
        }
        jar
    }

    pub fn read_tokens(&self, jar: &CookieJar) -> StoredTokens {
        let names = &self.names.tokens;
        StoredTokens {
            access_token: Self::read(jar, &names.access),
            refresh_token: Self::read(jar, &names.refresh),
            id_token: Self::read(jar, &names.id),
            expires_in: Self::read(jar, &names.expires_in).and_then(|v| v.parse().ok()),
        }
    }

    pub fn clear_tokens(&self, jar: CookieJar) -> CookieJar {
        let names = &self.names.tokens;
        [&names.access, &names.refresh, &names.id, &names.expires_in]
            .into_iter()
            .fold(jar, |jar, name| self.clear(jar, name))
    }
}
