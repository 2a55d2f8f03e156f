//! Small web server protected by bnoidc.
//!
//! Configuration is read from the `BNOIDC_CONFIG` environment variable, a
//! JSON document such as:
//!
//! ```json
//! {
//!   "client_id": "demo",
//!   "issuer_base_url": "https://id.example.com",
//!   "base_url": "http://localhost:3000"
//! }
//! ```

use anyhow::{Context, Result};
use axum::{Json, Router, middleware, response::IntoResponse, routing::get};
use bnoidc::{ClientConfig, Entitlements, Oidc, OidcContext, is_authenticated, is_entitled};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "3000", env = "BNOIDC_PORT")]
    port: u16,

    /// Entitlement required by /entitled
    #[arg(long, default_value = "demo", env = "BNOIDC_DEMO_ENTITLEMENT")]
    entitlement: String,

    /// Resolve the provider before accepting requests
    #[arg(long)]
    eager_init: bool,
}

async fn home(ctx: OidcContext) -> impl IntoResponse {
    match ctx.user() {
        Some(user) => format!("Hello {}", user.email.unwrap_or(user.id)),
        None => "Hello anonymous user, visit /id/login to sign in".to_string(),
    }
}

async fn me(ctx: OidcContext) -> impl IntoResponse {
    Json(ctx.user())
}

async fn entitled() -> &'static str {
    "You hold the demo entitlement"
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ClientConfig::from_env().context("Failed to load OIDC client config")?;
    let oidc = Oidc::new(config)?;
    if args.eager_init {
        oidc.initialize()
            .await
            .context("Failed to initialize OIDC provider")?;
    }

    let protected = Router::new()
        .route("/me", get(me))
        .layer(middleware::from_fn(is_authenticated));
    let gated = Router::new()
        .route("/entitled", get(entitled))
        .layer(middleware::from_fn_with_state(
            Entitlements::new([args.entitlement.clone()]),
            is_entitled,
        ));

    let app = oidc.install(
        Router::new()
            .route("/", get(home))
            .merge(protected)
            .merge(gated),
    );

    let addr = format!("0.0.0.0:{}", args.port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
