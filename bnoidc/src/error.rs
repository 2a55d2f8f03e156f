use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised by the relying-party engine.
///
/// The type is `Clone` so that the outcome of the one-time provider
/// initialization, failure included, can be handed to every waiting request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// Invalid client configuration, fatal at setup
    #[error("invalid OIDC client configuration: {0}")]
    Init(String),

    /// Provider discovery or JWKS fetch failed
    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Incoming `state` does not match the stored one
    #[error("invalid state parameter")]
    InvalidState,

    /// Signature, issuer or audience verification failed
    #[error("failed to verify ID token")]
    InvalidIdToken,

    /// Token endpoint call failed
    #[error("OIDC token request failed: {0}")]
    TokenRequest(String),

    /// Refresh grant failed
    #[error("failed to refresh tokens: {0}")]
    RefreshRequest(String),

    #[error("user is not logged in")]
    Unauthenticated,

    #[error("user lacks required entitlements: {0}")]
    Unauthorized(String),
}

impl OidcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OidcError::Init(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OidcError::DiscoveryFailed(_)
            | OidcError::TokenRequest(_)
            | OidcError::RefreshRequest(_) => StatusCode::BAD_GATEWAY,
            OidcError::InvalidState => StatusCode::BAD_REQUEST,
            OidcError::InvalidIdToken | OidcError::Unauthenticated => StatusCode::UNAUTHORIZED,
            OidcError::Unauthorized(_) => StatusCode::FORBIDDEN,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            OidcError::Init(_) | OidcError::DiscoveryFailed(_) => "Authentication unavailable",
            OidcError::TokenRequest(_) | OidcError::RefreshRequest(_) => "Token request failed",
            OidcError::InvalidState => "Invalid OAuth state",
            OidcError::InvalidIdToken => "Invalid ID token",
            OidcError::Unauthenticated => "Unauthenticated",
            OidcError::Unauthorized(_) => "Forbidden",
        }
    }
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("oidc error: {self}");
        } else {
            tracing::warn!("oidc error: {self}");
        }
        (status, self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (OidcError::Init("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                OidcError::DiscoveryFailed("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (OidcError::InvalidState, StatusCode::BAD_REQUEST),
            (OidcError::InvalidIdToken, StatusCode::UNAUTHORIZED),
            (OidcError::TokenRequest("500".into()), StatusCode::BAD_GATEWAY),
            (
                OidcError::RefreshRequest("no refresh token found".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (OidcError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (OidcError::Unauthorized("ent2".into()), StatusCode::FORBIDDEN),
        ];

        for (err, expected) in cases {
            assert_eq!(err.clone().into_response().status(), expected, "{err}");
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            OidcError::Unauthorized("ent1, ent2".into()).to_string(),
            "user lacks required entitlements: ent1, ent2"
        );
        assert_eq!(
            OidcError::DiscoveryFailed("ID service responded with 500".into()).to_string(),
            "OIDC discovery failed: ID service responded with 500"
        );
    }
}
