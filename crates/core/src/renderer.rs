//! C3: diagram renderer client (spec §4.3).
//!
//! The teacher shells out to a local `java -jar plantuml.jar` subprocess
//! (`plantuml.rs::PlantUMLExecutor`); spec §1 scopes the PlantUML server out
//! as an external HTTP capability instead, so this is a thin `reqwest`
//! client over the same `reqwest` dependency the teacher already pulled in
//! for health checks.

use crate::error::RendererError;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://www.plantuml.com/plantuml";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// `ctx` is a cancellation token threaded from the dispatcher's
    /// per-request context (spec §5).
    async fn render(&self, ctx: &CancellationToken, encoded: &str) -> Result<Vec<u8>, RendererError>;
}

pub struct HttpDiagramRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiagramRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("renderer http client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpDiagramRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl DiagramRenderer for HttpDiagramRenderer {
    async fn render(&self, ctx: &CancellationToken, encoded: &str) -> Result<Vec<u8>, RendererError> {
        let url = format!("{}/svg/{}", self.base_url, encoded);
        tracing::debug!(%url, "rendering diagram");

        let resp = tokio::select! {
            result = self.client.get(&url).send() => result?,
            _ = ctx.cancelled() => {
                return Err(RendererError::Status { status: 499 });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(RendererError::Status {
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }
}
