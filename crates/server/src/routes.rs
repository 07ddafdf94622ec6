//! C6: HTTP dispatcher (spec §4.6).
//!
//! Directly grounded in the teacher's `main.rs` router assembly (axum
//! `Router`, `get`/`post` per route, a single CORS layer, `TraceLayer`) and
//! `routes.rs`'s handler-per-route style (`impl IntoResponse`, `Json(json!({..}))`
//! bodies). The route table is replaced; the wiring style is kept.

use crate::dto::{
    ConfirmRequest, CreateC4Request, CreateC4Response, RefreshRequest, SigninAnonymRequest,
    SigninUserRequest, SigninUserResponse, TokensResponse,
};
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use diagramastext_core::ciam::engine::CiamEngine;
use diagramastext_core::ciam::token;
use diagramastext_core::config::Config;
use diagramastext_core::llm::GraphPredictor;
use diagramastext_core::mailer::Mailer;
use diagramastext_core::renderer::DiagramRenderer;
use diagramastext_core::repository::{ModelOutput, Repository, UserInput};
use diagramastext_core::signing::Signer;
use diagramastext_core::{codec, serializer};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Minimum accepted prompt length (spec §4.6); the maximum is the caller's
/// quota-bound `PromptLengthMax`.
const PROMPT_MIN_LENGTH: usize = 3;

/// Upper bound on concurrent fire-and-forget repository writes (spec §5).
const WRITE_CONCURRENCY: usize = 16;

pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub signer: Arc<dyn Signer>,
    pub mailer: Arc<dyn Mailer>,
    pub predictor: Arc<dyn GraphPredictor>,
    pub renderer: Arc<dyn DiagramRenderer>,
    pub write_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        config: Config,
        repository: Arc<dyn Repository>,
        signer: Arc<dyn Signer>,
        mailer: Arc<dyn Mailer>,
        predictor: Arc<dyn GraphPredictor>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Self {
        Self {
            config,
            repository,
            signer,
            mailer,
            predictor,
            renderer,
            write_semaphore: Arc::new(Semaphore::new(WRITE_CONCURRENCY)),
        }
    }

    fn ciam(&self) -> CiamEngine<'_> {
        CiamEngine::new(self.repository.as_ref(), self.signer.as_ref(), self.mailer.as_ref())
    }
}

pub type SharedState = Arc<AppState>;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/status", get(status).options(preflight))
        .route("/c4", post(create_c4).options(preflight))
        .route("/auth/anonym", post(signin_anonym).options(preflight))
        .route("/auth/signin", post(signin_user).options(preflight))
        .route("/auth/confirm", post(confirm).options(preflight))
        .route("/auth/refresh", post(refresh).options(preflight))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), add_common_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn status() -> StatusCode {
    StatusCode::OK
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        ApiError::not_exists().into_response()
    }
}

/// Injects `Content-Type: application/json` and the configured CORS headers
/// on every response, unquoting single-quoted config values (spec §4.6).
async fn add_common_headers(
    State(state): State<SharedState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in &state.config.cors_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// `POST /c4` pipeline (spec §4.6, bit-precise).
async fn create_c4(State(state): State<SharedState>, headers: HeaderMap, body: Bytes) -> Result<Json<CreateC4Response>, ApiError> {
    let request: CreateC4Request =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_content("wrong request content"))?;

    let now = now_ms();
    let access_token = bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("unauthorized"))?;
    let access = token::decode_and_validate_access(access_token, state.signer.as_ref(), now)
        .await
        .map_err(|_| ApiError::unauthorized("unauthorized"))?;

    let prompt_len = request.prompt.chars().count();
    if prompt_len < PROMPT_MIN_LENGTH || prompt_len > access.quotas.prompt_length_max as usize {
        return Err(ApiError::validation(format!(
            "prompt length must be between {} and {} characters",
            PROMPT_MIN_LENGTH, access.quotas.prompt_length_max
        )));
    }

    let ctx = CancellationToken::new();
    let prediction = state
        .predictor
        .predict(&ctx, &request.prompt)
        .await
        .map_err(ApiError::from)?;

    let dsl = serializer::serialize(&prediction.graph)?;
    let encoded = codec::encode_diagram(dsl.as_bytes())?;
    let svg_bytes = state.renderer.render(&ctx, &encoded).await?;
    let svg = String::from_utf8(svg_bytes)
        .map_err(|_| ApiError::new(diagramastext_core::error::ApiErrorKind::CoreLogic, "renderer returned invalid utf-8"))?;

    let user_id: Uuid = access.standard.sub.parse().unwrap_or_default();
    let request_id = Uuid::new_v4();
    let timestamp = chrono::Utc::now();

    let prompt = request.prompt.clone();
    let repository = state.repository.clone();
    if let Ok(permit) = state.write_semaphore.clone().try_acquire_owned() {
        tokio::spawn(async move {
            let _permit = permit;
            let input = UserInput {
                request_id,
                user_id,
                prompt,
                timestamp,
            };
            if let Err(e) = repository.write_prompt(&input).await {
                tracing::warn!("failed to record prompt: {e}");
            }
        });
    } else {
        tracing::warn!("write concurrency exhausted, dropping prompt record");
    }

    let repository = state.repository.clone();
    if let Ok(permit) = state.write_semaphore.clone().try_acquire_owned() {
        tokio::spawn(async move {
            let _permit = permit;
            let output = ModelOutput {
                request_id,
                user_id,
                response: prediction.raw_response,
                timestamp,
                model: prediction.model,
                prompt_tokens: prediction.prompt_tokens,
                completion_tokens: prediction.completion_tokens,
            };
            if let Err(e) = repository.write_model_prediction(&output).await {
                tracing::warn!("failed to record model prediction: {e}");
            }
        });
    } else {
        tracing::warn!("write concurrency exhausted, dropping model prediction record");
    }

    Ok(Json(CreateC4Response { svg }))
}

async fn signin_anonym(State(state): State<SharedState>, body: Bytes) -> Result<Json<TokensResponse>, ApiError> {
    let request: SigninAnonymRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_content("wrong request content"))?;
    let tokens = state.ciam().signin_anonym(&request.fingerprint, now_ms()).await?;
    Ok(Json(TokensResponse {
        id: tokens.id,
        refresh: tokens.refresh,
        access: tokens.access,
    }))
}

async fn signin_user(State(state): State<SharedState>, body: Bytes) -> Result<Json<SigninUserResponse>, ApiError> {
    let request: SigninUserRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_content("wrong request content"))?;
    let id = state
        .ciam()
        .signin_user(&request.email, request.fingerprint.as_deref(), now_ms())
        .await?;
    Ok(Json(SigninUserResponse { id }))
}

async fn confirm(State(state): State<SharedState>, body: Bytes) -> Result<Json<TokensResponse>, ApiError> {
    let request: ConfirmRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_content("wrong request content"))?;
    let tokens = state
        .ciam()
        .issue_tokens_after_secret_confirmation(&request.identity_token, &request.secret, now_ms())
        .await?;
    Ok(Json(TokensResponse {
        id: tokens.id,
        refresh: tokens.refresh,
        access: tokens.access,
    }))
}

async fn refresh(State(state): State<SharedState>, body: Bytes) -> Result<Json<TokensResponse>, ApiError> {
    let request: RefreshRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_content("wrong request content"))?;
    let tokens = state.ciam().refresh_tokens(&request.refresh_token, now_ms()).await?;
    Ok(Json(TokensResponse {
        id: tokens.id,
        refresh: tokens.refresh,
        access: tokens.access,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagramastext_core::ciam::quotas::Role;
    use diagramastext_core::ciam::token::{AccessClaims, StandardClaims};
    use diagramastext_core::llm::GraphPredictor;
    use diagramastext_core::mailer::NullMailer;
    use diagramastext_core::renderer::DiagramRenderer;
    use diagramastext_core::repository::InMemoryRepository;
    use diagramastext_core::signing::LocalSigner;
    use std::collections::HashMap;
    use tower::ServiceExt;

    struct StubPredictor;

    #[async_trait::async_trait]
    impl GraphPredictor for StubPredictor {
        async fn predict(
            &self,
            _ctx: &CancellationToken,
            _prompt: &str,
        ) -> Result<diagramastext_core::llm::Prediction, diagramastext_core::error::PredictionError> {
            unreachable!("quota check should short-circuit before reaching the predictor")
        }
    }

    struct StubRenderer;

    #[async_trait::async_trait]
    impl DiagramRenderer for StubRenderer {
        async fn render(
            &self,
            _ctx: &CancellationToken,
            _encoded: &str,
        ) -> Result<Vec<u8>, diagramastext_core::error::RendererError> {
            unreachable!()
        }
    }

    fn test_config() -> Config {
        Config {
            port: 8080,
            openai_api_key: "test".into(),
            openai_max_tokens: 100,
            openai_temperature: 0.0,
            cors_headers: HashMap::new(),
            db_host: "localhost".into(),
            db_port: 5432,
            db_name: "test".into(),
            db_user: "test".into(),
            db_password: "test".into(),
            ssl_mode: String::new(),
            table_prompt: "prompt".into(),
            table_prediction: "prediction".into(),
            smtp_relay: String::new(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_from: "noreply@diagramastext.dev".into(),
            signing_key_seed: None,
            renderer_base_url: "https://www.plantuml.com/plantuml".into(),
        }
    }

    #[tokio::test]
    async fn scenario6_quota_enforcement_rejects_oversized_prompt() {
        let signer = Arc::new(LocalSigner::generate());
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let mailer: Arc<dyn Mailer> = Arc::new(NullMailer);
        let predictor: Arc<dyn GraphPredictor> = Arc::new(StubPredictor);
        let renderer: Arc<dyn DiagramRenderer> = Arc::new(StubRenderer);

        let state: SharedState = Arc::new(AppState::new(
            test_config(),
            repository,
            signer.clone(),
            mailer,
            predictor,
            renderer,
        ));
        let app = router(state);

        let now = now_ms();
        let claims = AccessClaims {
            standard: StandardClaims {
                sub: Uuid::new_v4().to_string(),
                iss: token::ISSUER.to_string(),
                aud: token::AUDIENCE.to_string(),
                iat: now,
                exp: now + token::ACCESS_TOKEN_TTL_MS,
            },
            role: Role::Anonym,
            quotas: Role::Anonym.canonical_quotas(),
        };
        let access_token = token::encode_access(&claims, signer.as_ref()).await.unwrap();

        let oversized_prompt = "a".repeat(101);
        let body = serde_json::json!({ "prompt": oversized_prompt }).to_string();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/c4")
                    .header("Authorization", format!("Bearer {access_token}"))
                    .header("Content-Type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["error"],
            "prompt length must be between 3 and 100 characters"
        );
    }

    #[tokio::test]
    async fn status_route_returns_200() {
        let signer = Arc::new(LocalSigner::generate());
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let mailer: Arc<dyn Mailer> = Arc::new(NullMailer);
        let predictor: Arc<dyn GraphPredictor> = Arc::new(StubPredictor);
        let renderer: Arc<dyn DiagramRenderer> = Arc::new(StubRenderer);
        let state: SharedState = Arc::new(AppState::new(
            test_config(),
            repository,
            signer,
            mailer,
            predictor,
            renderer,
        ));
        let app = router(state);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let signer = Arc::new(LocalSigner::generate());
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let mailer: Arc<dyn Mailer> = Arc::new(NullMailer);
        let predictor: Arc<dyn GraphPredictor> = Arc::new(StubPredictor);
        let renderer: Arc<dyn DiagramRenderer> = Arc::new(StubRenderer);
        let state: SharedState = Arc::new(AppState::new(
            test_config(),
            repository,
            signer,
            mailer,
            predictor,
            renderer,
        ));
        let app = router(state);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/nope")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
