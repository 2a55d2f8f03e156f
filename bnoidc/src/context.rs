use crate::cookies::StoredTokens;
use crate::error::OidcError;
use crate::jwt::VerifiedClaims;
use crate::tokens::TokenSet;
use axum::extract::FromRequestParts;
use http::request::Parts;
use serde::Serialize;

/// Summary of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Per-request authentication state.
///
/// Built from the token cookies by the gate, updated in place by a refresh,
/// then stored in the request extensions for handlers to extract.
#[derive(Debug, Clone, Default)]
pub struct OidcContext {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<u64>,
    claims: Option<VerifiedClaims>,
}

impl OidcContext {
    pub fn from_tokens(tokens: StoredTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token,
            expires_in: tokens.expires_in,
            claims: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// Verified ID-token claims, if the request is authenticated
    pub fn claims(&self) -> Option<&VerifiedClaims> {
        self.claims.as_ref()
    }

    pub fn user(&self) -> Option<User> {
        self.claims.as_ref().map(|claims| User {
            id: claims.sub.clone(),
            email: claims.email.clone(),
        })
    }

    /// Whether the user holds at least one of `required`.
    ///
    /// An empty list always passes. Fails with `Unauthenticated` when no
    /// verified claims are attached.
    pub fn is_entitled<S: AsRef<str>>(&self, required: &[S]) -> Result<bool, OidcError> {
        let claims = self.claims.as_ref().ok_or(OidcError::Unauthenticated)?;
        if required.is_empty() {
            return Ok(true);
        }
        Ok(required
            .iter()
            .any(|r| claims.ent.iter().any(|granted| granted == r.as_ref())))
    }

    /// Like [`OidcContext::is_entitled`], failing with `Unauthorized` when
    /// none of `required` is granted
    pub fn require_entitlements<S: AsRef<str>>(&self, required: &[S]) -> Result<(), OidcError> {
        if self.is_entitled(required)? {
            return Ok(());
        }
        let wanted: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
        Err(OidcError::Unauthorized(wanted.join(", ")))
    }

    pub(crate) fn authenticate(&mut self, claims: VerifiedClaims) {
        self.claims = Some(claims);
    }

    pub(crate) fn apply_tokens(&mut self, tokens: &TokenSet) {
        self.access_token = Some(tokens.access_token.clone());
        if let Some(refresh_token) = &tokens.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        self.id_token = Some(tokens.id_token.clone());
        self.expires_in = Some(tokens.expires_in);
    }
}

impl<S> FromRequestParts<S> for OidcContext
where
    S: Send + Sync,
{
    type Rejection = OidcError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OidcContext>()
            .cloned()
            .ok_or_else(|| OidcError::Init("OIDC middleware is not installed".into()))
    }
}
