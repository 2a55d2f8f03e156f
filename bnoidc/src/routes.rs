//! Axum routes for the login/logout flows and per-route guards
//!
//! `auth_routes` serves the four flow endpoints. `is_authenticated` and
//! `is_entitled` reject requests the gate could not authenticate, rendering
//! errors through the configured error handler.

use crate::context::OidcContext;
use crate::error::OidcError;
use crate::flow::{CallbackParams, LoginOptions, LogoutCallbackParams, LogoutOptions, Oidc};
use crate::gate::oidc_middleware;
use crate::url_validation::sanitize_return_to;
use axum::{
    Router,
    extract::{Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ReturnToQuery {
    #[serde(rename = "return-to")]
    pub return_to: Option<String>,
}

impl ReturnToQuery {
    fn sanitized(&self, oidc: &Oidc) -> String {
        sanitize_return_to(self.return_to.as_deref(), oidc.config().base_path())
    }
}

/// GET {login_path}
async fn login(
    State(oidc): State<Oidc>,
    jar: CookieJar,
    Query(query): Query<ReturnToQuery>,
) -> Response {
    let options = LoginOptions {
        return_to: Some(query.sanitized(&oidc)),
        ..LoginOptions::default()
    };
    match oidc.login(jar, options).await {
        Ok(redirect) => redirect.into_response(),
        Err(e) => oidc.handle_error(e),
    }
}

/// GET {login_callback_path}
async fn login_callback(
    State(oidc): State<Oidc>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
    parts: Parts,
) -> Response {
    match oidc.login_callback(jar, &params, &parts).await {
        (jar, Ok(redirect)) => (jar, redirect).into_response(),
        (jar, Err(e)) => (jar, oidc.handle_error(e)).into_response(),
    }
}

/// GET {logout_path}
async fn logout(
    State(oidc): State<Oidc>,
    jar: CookieJar,
    Query(query): Query<ReturnToQuery>,
) -> Response {
    let options = LogoutOptions {
        return_to: Some(query.sanitized(&oidc)),
    };
    match oidc.logout(jar, options).await {
        Ok(redirect) => redirect.into_response(),
        Err(e) => oidc.handle_error(e),
    }
}

/// GET {logout_callback_path}
async fn logout_callback(
    State(oidc): State<Oidc>,
    jar: CookieJar,
    Query(params): Query<LogoutCallbackParams>,
    parts: Parts,
) -> Response {
    oidc.logout_callback(jar, &params, &parts).into_response()
}

/// Router serving the login, logout and callback endpoints at the
/// configured paths
pub fn auth_routes<S>(oidc: Oidc) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let config = oidc.config();
    Router::new()
        .route(&config.login_path, get(login))
        .route(&config.login_callback_path, get(login_callback))
        .route(&config.logout_path, get(logout))
        .route(&config.logout_callback_path, get(logout_callback))
        .with_state(oidc)
}

impl Oidc {
    /// Add the flow routes to `router` and put every route behind the
    /// authentication gate
    pub fn install<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .merge(auth_routes(self.clone()))
            .layer(middleware::from_fn_with_state(self.clone(), oidc_middleware))
    }
}

fn reject(request: &Request, err: OidcError) -> Response {
    match request.extensions().get::<Oidc>() {
        Some(oidc) => oidc.handle_error(err),
        None => err.into_response(),
    }
}

fn context(request: &Request) -> Result<&OidcContext, OidcError> {
    request
        .extensions()
        .get::<OidcContext>()
        .ok_or_else(|| OidcError::Init("OIDC middleware is not installed".into()))
}

/// Guard rejecting anonymous requests with `Unauthenticated`
pub async fn is_authenticated(request: Request, next: Next) -> Response {
    let authenticated = match context(&request) {
        Ok(ctx) => ctx.is_authenticated(),
        Err(e) => return reject(&request, e),
    };
    if !authenticated {
        return reject(&request, OidcError::Unauthenticated);
    }
    next.run(request).await
}

/// Entitlements required by an [`is_entitled`] guard
#[derive(Debug, Clone)]
pub struct Entitlements(Arc<[String]>);

impl Entitlements {
    pub fn new<I, S>(entitlements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(entitlements.into_iter().map(Into::into).collect())
    }
}

/// Guard requiring at least one of the given entitlements.
///
/// ```no_run
/// use axum::{Router, middleware, routing::get};
/// use bnoidc::{Entitlements, is_entitled};
///
/// let admin: Router = Router::new()
///     .route("/admin", get(|| async { "admin" }))
///     .layer(middleware::from_fn_with_state(
///         Entitlements::new(["admin"]),
///         is_entitled,
///     ));
/// ```
pub async fn is_entitled(
    State(required): State<Entitlements>,
    request: Request,
    next: Next,
) -> Response {
    let outcome = context(&request).and_then(|ctx| ctx.require_entitlements(&required.0[..]));
    match outcome {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, e),
    }
}
