//! OpenID Connect relying party for axum applications.
//!
//! `bnoidc` runs the authorization-code flow with PKCE against a single
//! identity provider and keeps the whole session in cookies:
//!
//! - [`discovery`]: fetches the provider configuration and signing keys once
//!   per process
//! - [`jwt`]: verifies ID tokens against those keys
//! - [`cookies`]: encodes the transient flow state and the token set
//! - [`tokens`]: authorization-code and refresh-token grants
//! - [`flow`]: login, callback, logout and refresh
//! - [`gate`]: the per-request middleware, including the `idlogin`,
//!   `idlogintoken` and `idrefresh` query triggers
//! - [`routes`]: axum routes for the flow endpoints and route guards
//!
//! ```no_run
//! use axum::{Router, middleware, routing::get};
//! use bnoidc::{ClientConfig, Oidc, OidcContext, is_authenticated};
//! use url::Url;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ClientConfig::new(
//!     "my-client-id",
//!     Url::parse("https://id.example.com")?,
//!     Url::parse("https://app.example.com")?,
//! );
//! let oidc = Oidc::new(config)?;
//! oidc.initialize().await?;
//!
//! let app = oidc.install(
//!     Router::new().route(
//!         "/me",
//!         get(|ctx: OidcContext| async move { format!("{:?}", ctx.user()) })
//!             .layer(middleware::from_fn(is_authenticated)),
//!     ),
//! );
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

/// Client configuration
pub mod config;

/// Request-scoped authentication state
pub mod context;

pub mod cookies;

pub mod crypto;

pub mod discovery;

/// Error taxonomy and default HTTP rendering
pub mod error;

pub mod flow;

pub mod gate;

pub mod jwt;

pub mod routes;

pub mod tokens;

pub mod url_validation;

pub use config::{ClientConfig, CookieNames, TokenCookieNames};
pub use context::{OidcContext, User};
pub use error::OidcError;
pub use flow::{LoginOptions, LogoutOptions, Oidc};
pub use gate::oidc_middleware;
pub use routes::{Entitlements, auth_routes, is_authenticated, is_entitled};
