#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    http::{Request, Response, header},
    middleware,
    routing::get,
};
use axum_extra::extract::cookie::Cookie;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bnoidc::{ClientConfig, Entitlements, Oidc, OidcContext, is_authenticated, is_entitled};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "test-client-id";
pub const BASE_URL: &str = "http://test.example";
pub const KEY_ID: &str = "test-key";

pub const DISCOVERY_PATH: &str = "/oauth/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/oauth/jwks";
pub const TOKEN_PATH: &str = "/oauth/token";

/// RSA key pair signing test ID tokens
pub struct TestKeyPair {
    pub kid: String,
    pub encoding_key: EncodingKey,
    pub jwk: Value,
}

impl TestKeyPair {
    pub fn generate(kid: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA private key");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode private key as PEM");
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("failed to create encoding key");

        let jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            encoding_key,
            jwk,
        }
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).expect("failed to encode token")
    }
}

/// Key pair published by the mock provider
pub static PROVIDER_KEYS: LazyLock<TestKeyPair> = LazyLock::new(|| TestKeyPair::generate(KEY_ID));

/// Key pair unknown to the provider
pub static ROGUE_KEYS: LazyLock<TestKeyPair> = LazyLock::new(|| TestKeyPair::generate("rogue"));

pub fn jwks_document(keys: &[&TestKeyPair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk.clone()).collect::<Vec<_>>() })
}

pub fn discovery_document(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}{TOKEN_PATH}"),
        "end_session_endpoint": format!("{issuer}/oauth/logout"),
        "jwks_uri": format!("{issuer}{JWKS_PATH}"),
        "scopes_supported": ["openid", "entitlements", "offline_access"],
        "id_token_signing_alg_values_supported": ["RS256"],
    })
}

/// Mock identity provider serving discovery and JWKS
pub struct TestProvider {
    pub server: MockServer,
}

impl TestProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(discovery_document(&server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[&*PROVIDER_KEYS])),
            )
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Claims of a valid ID token for `sub`
    pub fn claims(&self, sub: &str, ent: &[&str]) -> Value {
        let now = Utc::now();
        json!({
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "sub": sub,
            "email": format!("{sub}@example.com"),
            "ent": ent,
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(1)).timestamp(),
        })
    }

    pub fn id_token(&self, sub: &str, ent: &[&str]) -> String {
        PROVIDER_KEYS.sign(&self.claims(sub, ent))
    }

    pub fn expired_id_token(&self, sub: &str) -> String {
        let mut claims = self.claims(sub, &[]);
        let now = Utc::now();
        claims["iat"] = json!((now - Duration::hours(2)).timestamp());
        claims["exp"] = json!((now - Duration::hours(1)).timestamp());
        PROVIDER_KEYS.sign(&claims)
    }

    /// Token endpoint response carrying a fresh ID token
    pub fn token_response(&self, sub: &str, ent: &[&str]) -> Value {
        json!({
            "access_token": format!("access-{sub}"),
            "refresh_token": format!("refresh-{sub}"),
            "id_token": self.id_token(sub, ent),
            "token_type": "Bearer",
            "expires_in": 600,
        })
    }

    pub async fn mount_token_endpoint(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Requests received by the token endpoint, as form bodies
    pub async fn token_requests(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == TOKEN_PATH)
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    pub async fn count_requests(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(
            CLIENT_ID,
            Url::parse(&self.issuer()).expect("issuer URL"),
            Url::parse(BASE_URL).expect("base URL"),
        )
    }

    pub fn oidc(&self) -> Oidc {
        Oidc::new(self.config()).expect("valid config")
    }
}

/// Application with public, protected and entitlement-gated pages
pub fn app(oidc: &Oidc) -> Router {
    oidc.install(
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/some-path", get(|| async { "some path" }))
            .route(
                "/protected",
                get(|ctx: OidcContext| async move { Json(ctx.user()) })
                    .layer(middleware::from_fn(is_authenticated)),
            )
            .route(
                "/entitled",
                get(|| async { "entitled" }).layer(middleware::from_fn_with_state(
                    Entitlements::new(["ent1"]),
                    is_entitled,
                )),
            )
            .route(
                "/admin",
                get(|| async { "admin" }).layer(middleware::from_fn_with_state(
                    Entitlements::new(["ent2"]),
                    is_entitled,
                )),
            ),
    )
}

/// GET request carrying `cookies`
pub fn get_request(uri: &str, cookies: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if !cookies.is_empty() {
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header);
    }
    builder.body(Body::empty()).expect("valid request")
}

/// Cookies set by `response`, by name
pub fn response_cookies<B>(response: &Response<B>) -> HashMap<String, Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let raw = value.to_str().expect("ascii cookie").to_string();
            let cookie = Cookie::parse(raw).expect("valid cookie");
            (cookie.name().to_string(), cookie)
        })
        .collect()
}

pub fn assert_cleared(cookies: &HashMap<String, Cookie<'static>>, name: &str) {
    let cookie = cookies
        .get(name)
        .unwrap_or_else(|| panic!("{name} should be cleared"));
    assert_eq!(cookie.value(), "", "{name} should be empty");
    assert_eq!(cookie.max_age(), Some(time::Duration::ZERO), "{name} should expire");
}

/// Raw `Location` header of a redirect
pub fn location_header<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect should have a location")
        .to_str()
        .expect("ascii location")
        .to_string()
}

/// `Location` header resolved against the application base URL
pub fn location<B>(response: &Response<B>) -> Url {
    let location = location_header(response);
    Url::parse(&location)
        .or_else(|_| Url::parse(BASE_URL).and_then(|base| base.join(&location)))
        .expect("valid location")
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
