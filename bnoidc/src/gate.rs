//! Per-request authentication gate

use crate::context::OidcContext;
use crate::flow::{LoginOptions, Oidc};
use crate::jwt::{IdTokenClaims, VerifiedClaims};
use crate::url_validation::sanitize_return_to;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

const LOGIN_TRIGGER: &str = "idlogin";
const LOGIN_TOKEN_TRIGGER: &str = "idlogintoken";
const REFRESH_TRIGGER: &str = "idrefresh";

/// Query-parameter triggers found on a request
#[derive(Debug, Default, PartialEq, Eq)]
struct Triggers {
    login: Option<String>,
    login_token: Option<String>,
    refresh: bool,
    /// Current path and query with the trigger parameters removed
    return_to: String,
}

impl Triggers {
    fn parse(path: &str, query: Option<&str>) -> Self {
        let mut triggers = Triggers::default();
        let mut remaining = url::form_urlencoded::Serializer::new(String::new());
        let mut has_remaining = false;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                LOGIN_TRIGGER => triggers.login = non_empty(value),
                LOGIN_TOKEN_TRIGGER => triggers.login_token = non_empty(value),
                REFRESH_TRIGGER => triggers.refresh = value == "true",
                _ => {
                    remaining.append_pair(&key, &value);
                    has_remaining = true;
                }
            }
        }

        triggers.return_to = if has_remaining {
            format!("{path}?{}", remaining.finish())
        } else {
            path.to_string()
        };
        triggers
    }

    /// The login a trigger asks for, `idlogintoken` winning over `idlogin`
    fn login_options(&self) -> Option<LoginOptions> {
        let (prompts, token) = match (&self.login_token, &self.login) {
            (Some(token), _) => (Vec::new(), Some(token.clone())),
            (None, Some(mode)) if mode == "silent" => (vec!["none".to_string()], None),
            (None, Some(_)) => (Vec::new(), None),
            (None, None) => return None,
        };
        Some(LoginOptions {
            return_to: Some(self.return_to.clone()),
            prompts: Some(prompts),
            token,
            ..LoginOptions::default()
        })
    }
}

/// Trigger values only count when set to something
fn non_empty(value: std::borrow::Cow<'_, str>) -> Option<String> {
    (!value.is_empty()).then(|| value.into_owned())
}

fn current_url(request: &Request) -> String {
    match request.uri().path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => request.uri().path().to_string(),
    }
}

/// Claims forwarded by a trusted gateway, if configured and present
fn trusted_claims(oidc: &Oidc, request: &Request) -> Option<VerifiedClaims> {
    let header = oidc.config().trusted_claims_header.as_deref()?;
    let value = request.headers().get(header)?;
    match serde_json::from_slice::<IdTokenClaims>(value.as_bytes()) {
        Ok(claims) => Some(VerifiedClaims::trusted(claims)),
        Err(e) => {
            tracing::warn!("ignoring malformed {header} header: {e}");
            None
        }
    }
}

async fn redirect_to_login(oidc: &Oidc, jar: CookieJar, options: LoginOptions) -> Response {
    match oidc.login(jar, options).await {
        Ok(redirect) => redirect.into_response(),
        Err(e) => oidc.handle_error(e),
    }
}

/// Authentication middleware.
///
/// Reconstructs the [`OidcContext`] from the token cookies, verifies the ID
/// token (refreshing once if it no longer verifies), handles the `idlogin`,
/// `idlogintoken` and `idrefresh` query triggers, and stores the context in
/// the request extensions. Requests without an ID token proceed anonymously.
///
/// ```no_run
/// use axum::{Router, middleware, routing::get};
/// use bnoidc::{Oidc, oidc_middleware};
///
/// # fn app(oidc: Oidc) -> Router {
/// Router::new()
///     .route("/", get(|| async { "home" }))
///     .merge(bnoidc::auth_routes(oidc.clone()))
///     .layer(middleware::from_fn_with_state(oidc, oidc_middleware))
/// # }
/// ```
pub async fn oidc_middleware(
    State(oidc): State<Oidc>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let provider = match oidc.provider().await {
        Ok(provider) => provider,
        Err(e) => return oidc.handle_error(e),
    };

    let mut jar = jar;
    let mut ctx = OidcContext::from_tokens(oidc.cookies().read_tokens(&jar));

    if !oidc.config().is_flow_route(request.uri().path()) {
        let base_path = oidc.config().base_path().to_string();
        let triggers = Triggers::parse(request.uri().path(), request.uri().query());

        if let Some(mut options) = triggers.login_options() {
            options.return_to = Some(sanitize_return_to(options.return_to.as_deref(), &base_path));
            return redirect_to_login(&oidc, jar, options).await;
        }

        let mut refreshed_session = false;
        if let Some(claims) = trusted_claims(&oidc, &request) {
            ctx.authenticate(claims);
        } else if let Some(id_token) = ctx.id_token.clone() {
            match oidc.verify_id_token(&provider, &id_token) {
                Some(claims) => ctx.authenticate(claims),
                None => {
                    let refreshed = if ctx.refresh_token.is_some() {
                        oidc.refresh(jar.clone(), &mut ctx)
                            .await
                            .inspect_err(|e| tracing::info!("session refresh failed: {e}"))
                            .ok()
                    } else {
                        None
                    };
                    match refreshed {
                        Some(refreshed) => {
                            jar = refreshed;
                            refreshed_session = true;
                        }
                        None => {
                            let current = current_url(&request);
                            let options = LoginOptions {
                                return_to: Some(sanitize_return_to(Some(current.as_str()), &base_path)),
                                ..LoginOptions::default()
                            };
                            return redirect_to_login(&oidc, jar, options).await;
                        }
                    }
                }
            }
        }

        // one refresh grant per request
        if triggers.refresh && !refreshed_session && ctx.refresh_token.is_some() {
            // best effort: a failed refresh leaves the request as it was
            match oidc.refresh(jar.clone(), &mut ctx).await {
                Ok(refreshed) => jar = refreshed,
                Err(e) => tracing::debug!("idrefresh failed: {e}"),
            }
        }
    }

    if let Some(user) = ctx.user() {
        tracing::debug!("request authenticated: subject={}", user.id);
    }
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(oidc);
    (jar, next.run(request).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_triggers() {
        let triggers = Triggers::parse("/page", Some("a=1&b=2"));
        assert_eq!(triggers.login_options().map(|o| o.return_to), None);
        assert!(!triggers.refresh);
        assert_eq!(triggers.return_to, "/page?a=1&b=2");
    }

    #[test]
    fn test_login_trigger_strips_itself_from_return_path() {
        let triggers = Triggers::parse("/some-path", Some("idlogin=true&otherParam=value"));
        let options = triggers.login_options().unwrap();
        assert_eq!(options.return_to.as_deref(), Some("/some-path?otherParam=value"));
        assert_eq!(options.prompts, Some(vec![]));
        assert_eq!(options.token, None);
    }

    #[test]
    fn test_silent_login_trigger() {
        let triggers = Triggers::parse("/some-path", Some("idlogin=silent"));
        let options = triggers.login_options().unwrap();
        assert_eq!(options.return_to.as_deref(), Some("/some-path"));
        assert_eq!(options.prompts, Some(vec!["none".to_string()]));
    }

    #[test]
    fn test_login_token_trigger_takes_priority() {
        let triggers = Triggers::parse("/", Some("idlogin=silent&idlogintoken=opaque&idrefresh=true"));
        let options = triggers.login_options().unwrap();
        assert_eq!(options.token.as_deref(), Some("opaque"));
        assert_eq!(options.prompts, Some(vec![]));
        assert_eq!(options.return_to.as_deref(), Some("/"));
    }

    #[test]
    fn test_empty_trigger_values_are_ignored() {
        let triggers = Triggers::parse("/some-path", Some("idlogin=&otherParam=value"));
        assert!(triggers.login_options().is_none());
        assert_eq!(triggers.return_to, "/some-path?otherParam=value");

        let triggers = Triggers::parse("/some-path", Some("idlogintoken="));
        assert!(triggers.login_options().is_none());

        let triggers = Triggers::parse("/some-path", Some("idlogin=silent&idlogintoken="));
        let options = triggers.login_options().unwrap();
        assert_eq!(options.token, None);
        assert_eq!(options.prompts, Some(vec!["none".to_string()]));
    }

    #[test]
    fn test_refresh_trigger() {
        assert!(Triggers::parse("/", Some("idrefresh=true")).refresh);
        assert!(!Triggers::parse("/", Some("idrefresh=false")).refresh);
    }
}
