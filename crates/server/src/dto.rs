//! Wire DTOs for the HTTP dispatcher (spec §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateC4Request {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct CreateC4Response {
    pub svg: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninAnonymRequest {
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninUserRequest {
    pub email: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SigninUserResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub identity_token: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub id: String,
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
