//! Provider discovery and signing-key loading

use crate::error::OidcError;
use crate::jwt::{JwkSet, SigningKeySet};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DISCOVERY_PATH: &str = "oauth/.well-known/openid-configuration";
const DEFAULT_JWKS_PATH: &str = "oauth/jwks";
const JWKS_TIMEOUT: Duration = Duration::from_secs(5);

/// The provider's well-known configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WellKnownConfig {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub end_session_endpoint: Url,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub ui_locales_supported: Vec<String>,
}

/// Discovered configuration and signing keys, resolved once per process
#[derive(Debug)]
pub struct Provider {
    pub well_known: WellKnownConfig,
    pub keys: SigningKeySet,
}

/// `{issuer}/{suffix}`, keeping any path the issuer already has
fn issuer_endpoint(issuer: &Url, suffix: &str) -> Result<Url, OidcError> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{suffix}"))
        .map_err(|e| OidcError::DiscoveryFailed(format!("invalid issuer URL {issuer}: {e}")))
}

async fn fetch_well_known(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<WellKnownConfig, OidcError> {
    let url = issuer_endpoint(issuer, DISCOVERY_PATH)?;
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| OidcError::DiscoveryFailed(format!("failed to reach ID service: {e}")))?;

    if !response.status().is_success() {
        return Err(OidcError::DiscoveryFailed(format!(
            "ID service responded with {}",
            response.status().as_u16()
        )));
    }

    response
        .json::<WellKnownConfig>()
        .await
        .map_err(|e| OidcError::DiscoveryFailed(format!("invalid discovery document: {e}")))
}

async fn fetch_jwks(http: &reqwest::Client, url: Url) -> Result<JwkSet, OidcError> {
    let response = http
        .get(url.clone())
        .timeout(JWKS_TIMEOUT)
        .send()
        .await
        .map_err(|e| OidcError::DiscoveryFailed(format!("failed to fetch JWKS from {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(OidcError::DiscoveryFailed(format!(
            "JWKS endpoint responded with {}",
            response.status().as_u16()
        )));
    }

    response
        .json::<JwkSet>()
        .await
        .map_err(|e| OidcError::DiscoveryFailed(format!("invalid JWKS document: {e}")))
}

/// Fetch the well-known configuration, then the JWKS it points to.
///
/// Neither request is retried. Keys are not re-fetched later, so a key
/// rotation on the provider requires a restart.
pub async fn discover(http: &reqwest::Client, issuer: &Url) -> Result<Provider, OidcError> {
    let well_known = fetch_well_known(http, issuer).await?;

    let jwks_uri = match &well_known.jwks_uri {
        Some(uri) => uri.clone(),
        None => issuer_endpoint(issuer, DEFAULT_JWKS_PATH)?,
    };
    let jwks = fetch_jwks(http, jwks_uri).await?;
    let keys = SigningKeySet::from_jwks(&jwks);

    tracing::info!(
        "discovered OIDC provider {} with {} signing key(s)",
        well_known.issuer,
        keys.len()
    );
    Ok(Provider { well_known, keys })
}
