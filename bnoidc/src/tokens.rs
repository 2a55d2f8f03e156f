//! Token endpoint client for the authorization-code and refresh grants

use crate::error::OidcError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Tokens issued by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub id_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Where and how this client authenticates to the token endpoint.
///
/// With a secret, credentials travel in an HTTP Basic header; without one,
/// `client_id` is sent in the form body and PKCE protects the exchange.
#[derive(Clone, Copy)]
pub struct TokenClient<'a> {
    pub http: &'a reqwest::Client,
    pub token_endpoint: &'a Url,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
}

impl TokenClient<'_> {
    /// Exchange an authorization code for tokens
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet, OidcError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        self.request(&form).await.map_err(OidcError::TokenRequest)
    }

    /// Redeem a refresh token for a new token set
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenSet, OidcError> {
        let form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.request(&form).await.map_err(OidcError::RefreshRequest)
    }

    async fn request(&self, form: &[(&str, &str)]) -> Result<TokenSet, String> {
        let mut form: Vec<(&str, &str)> = form.to_vec();
        let mut request = self.http.post(self.token_endpoint.clone());
        match self.client_secret {
            Some(secret) => request = request.basic_auth(self.client_id, Some(secret)),
            None => form.push(("client_id", self.client_id)),
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("failed to reach token endpoint: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("token endpoint responded with {status}: {body}");
            return Err(format!("token endpoint responded with {}", status.as_u16()));
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| format!("invalid token response: {e}"))
    }
}
