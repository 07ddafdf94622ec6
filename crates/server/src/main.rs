//! diagramastext server.
//!
//! HTTP entry point. Keeps the teacher's `main.rs` shape — `tracing_subscriber`
//! registry with `EnvFilter`, a single `axum::Router` wrapped in `CorsLayer` and
//! `TraceLayer`, bound to `PORT` via `tokio::net::TcpListener` — and replaces the
//! PlantUML-subprocess route table with the capability-backed dispatcher from
//! `routes.rs`.

mod dto;
mod error;
mod routes;

use anyhow::{Context, Result};
use diagramastext_core::config::Config;
use diagramastext_core::llm::{GraphPredictor, OpenAiGraphPredictor};
use diagramastext_core::mailer::{Mailer, SmtpMailer};
use diagramastext_core::renderer::{DiagramRenderer, HttpDiagramRenderer};
use diagramastext_core::repository::{self, PostgresRepository, Repository};
use diagramastext_core::signing::{LocalSigner, Signer};
use lettre::message::Mailbox;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diagramastext_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!("diagramastext server starting");

    let signer: Arc<dyn Signer> = Arc::new(match &config.signing_key_seed {
        Some(hex_seed) => {
            let bytes = hex::decode(hex_seed).context("decoding SIGNING_KEY_SEED")?;
            let seed: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("SIGNING_KEY_SEED must decode to 32 bytes"))?;
            LocalSigner::from_seed(&seed)
        }
        None => {
            tracing::warn!("SIGNING_KEY_SEED not set, generating an ephemeral signing key");
            LocalSigner::generate()
        }
    });

    let connection_string = repository::build_connection_string(
        &config.db_user,
        &config.db_name,
        &config.db_host,
        config.db_port,
        &config.db_password,
        &config.ssl_mode,
    )
    .context("assembling database connection string")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&connection_string)
        .await
        .context("connecting to database")?;
    let repository: Arc<dyn Repository> = Arc::new(PostgresRepository::new(
        pool,
        config.table_prompt.clone(),
        config.table_prediction.clone(),
    ));

    let mailer: Arc<dyn Mailer> = if config.smtp_relay.is_empty() {
        tracing::warn!("SMTP_RELAY not set, one-time secrets will not be delivered");
        Arc::new(diagramastext_core::mailer::NullMailer)
    } else {
        let from: Mailbox = config
            .smtp_from
            .parse()
            .context("parsing SMTP_FROM as a mailbox")?;
        Arc::new(
            SmtpMailer::new(
                &config.smtp_relay,
                config.smtp_username.clone(),
                config.smtp_password.clone(),
                from,
            )
            .context("building SMTP transport")?,
        )
    };

    let predictor: Arc<dyn GraphPredictor> = Arc::new(OpenAiGraphPredictor::new(
        config.openai_api_key.clone(),
        "gpt-4o-mini".to_string(),
        config.openai_max_tokens,
        config.openai_temperature,
    ));

    let renderer: Arc<dyn DiagramRenderer> = Arc::new(HttpDiagramRenderer::new(config.renderer_base_url.clone()));

    let port = config.port;
    let state = Arc::new(routes::AppState::new(
        config, repository, signer, mailer, predictor, renderer,
    ));

    let app = routes::router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
