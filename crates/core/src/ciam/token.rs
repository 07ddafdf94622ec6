//! Token model and compact-JWT encode/decode (spec §3, §4.5).
//!
//! The signing key may live in-process or behind a remote KMS (spec §4.8),
//! so token construction can't reach for `jsonwebtoken`'s API directly — it
//! bundles signature computation with key material. Instead this builds the
//! `base64url(header) + "." + base64url(payload) + "." + base64url(sig)`
//! compact form by hand and calls out to the injected [`crate::signing::Signer`]
//! for the signature itself.

use crate::ciam::quotas::{Quotas, Role};
use crate::error::CiamError;
use crate::signing::Signer;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const ISSUER: &str = "https://ciam.diagramastext.dev";
pub const AUDIENCE: &str = "https://diagramastext.dev";

pub const ID_TOKEN_TTL_MS: i64 = 3_600_000;
pub const ACCESS_TOKEN_TTL_MS: i64 = 3_600_000;
pub const REFRESH_TOKEN_TTL_MS: i64 = 2_400 * 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            alg: "EdDSA",
            typ: "JWT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,
    pub role: Role,
    pub quotas: Quotas,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,
}

fn b64_json<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).expect("claims serialize");
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn encode<T: Serialize>(claims: &T, signer: &dyn Signer) -> Result<String, CiamError> {
    let header = b64_json(&Header::default());
    let payload = b64_json(claims);
    let signing_string = format!("{header}.{payload}");
    let (signature, _alg) = signer.sign(&signing_string).await?;
    Ok(format!("{signing_string}.{signature}"))
}

pub async fn encode_id(claims: &IdClaims, signer: &dyn Signer) -> Result<String, CiamError> {
    encode(claims, signer).await
}

pub async fn encode_access(claims: &AccessClaims, signer: &dyn Signer) -> Result<String, CiamError> {
    encode(claims, signer).await
}

pub async fn encode_refresh(claims: &RefreshClaims, signer: &dyn Signer) -> Result<String, CiamError> {
    encode(claims, signer).await
}

fn split_token(token: &str) -> Result<(&str, &str, &str, String), CiamError> {
    let mut parts = token.split('.');
    let header = parts
        .next()
        .ok_or_else(|| CiamError::Unauthorized("malformed token".into()))?;
    let payload = parts
        .next()
        .ok_or_else(|| CiamError::Unauthorized("malformed token".into()))?;
    let signature = parts
        .next()
        .ok_or_else(|| CiamError::Unauthorized("malformed token".into()))?;
    if parts.next().is_some() {
        return Err(CiamError::Unauthorized("malformed token".into()));
    }
    let signing_string = format!("{header}.{payload}");
    Ok((header, payload, signature, signing_string))
}

fn decode_payload<T: for<'de> Deserialize<'de>>(payload: &str) -> Result<T, CiamError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| CiamError::Unauthorized("malformed token payload".into()))?;
    serde_json::from_slice(&bytes).map_err(|_| CiamError::Unauthorized("malformed claims".into()))
}

fn validate_standard(claims: &StandardClaims, now_ms: i64) -> Result<(), CiamError> {
    if claims.iss != ISSUER {
        return Err(CiamError::Unauthorized("unexpected issuer".into()));
    }
    if claims.aud != AUDIENCE {
        return Err(CiamError::Unauthorized("unexpected audience".into()));
    }
    if claims.exp <= now_ms {
        return Err(CiamError::Unauthorized("token expired".into()));
    }
    if claims.iat > claims.exp || claims.iat > now_ms {
        return Err(CiamError::Unauthorized("token issued in the future".into()));
    }
    Ok(())
}

/// Decodes and validates an ID token. Does not check role/quota staleness
/// (ID tokens carry none).
pub async fn decode_and_validate_id(
    token: &str,
    signer: &dyn Signer,
    now_ms: i64,
) -> Result<IdClaims, CiamError> {
    let (_, payload, signature, signing_string) = split_token(token)?;
    signer
        .verify(&signing_string, signature)
        .await
        .map_err(|_| CiamError::Unauthorized("bad signature".into()))?;
    let claims: IdClaims = decode_payload(payload)?;
    validate_standard(&claims.standard, now_ms)?;
    Ok(claims)
}

/// Decodes and validates an Access token, including the stale-quota rule
/// from spec §4.5: the embedded quotas must equal the canonical quotas for
/// the embedded role.
pub async fn decode_and_validate_access(
    token: &str,
    signer: &dyn Signer,
    now_ms: i64,
) -> Result<AccessClaims, CiamError> {
    let (_, payload, signature, signing_string) = split_token(token)?;
    signer
        .verify(&signing_string, signature)
        .await
        .map_err(|_| CiamError::Unauthorized("bad signature".into()))?;
    let claims: AccessClaims = decode_payload(payload)?;
    validate_standard(&claims.standard, now_ms)?;
    if claims.quotas != claims.role.canonical_quotas() {
        return Err(CiamError::StaleAccessToken);
    }
    Ok(claims)
}

pub async fn decode_and_validate_refresh(
    token: &str,
    signer: &dyn Signer,
    now_ms: i64,
) -> Result<RefreshClaims, CiamError> {
    let (_, payload, signature, signing_string) = split_token(token)?;
    signer
        .verify(&signing_string, signature)
        .await
        .map_err(|_| CiamError::Unauthorized("bad signature".into()))?;
    let claims: RefreshClaims = decode_payload(payload)?;
    validate_standard(&claims.standard, now_ms)?;
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::LocalSigner;

    fn standard(sub: &str, now_ms: i64, ttl: i64) -> StandardClaims {
        StandardClaims {
            sub: sub.to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now_ms,
            exp: now_ms + ttl,
        }
    }

    #[tokio::test]
    async fn access_token_round_trips_within_validity_window() {
        let signer = LocalSigner::generate();
        let now = 1_000_000_000_000i64;
        let claims = AccessClaims {
            standard: standard("user-1", now, ACCESS_TOKEN_TTL_MS),
            role: Role::Anonym,
            quotas: Role::Anonym.canonical_quotas(),
        };
        let token = encode_access(&claims, &signer).await.unwrap();

        assert!(decode_and_validate_access(&token, &signer, now).await.is_ok());
        assert!(decode_and_validate_access(&token, &signer, now + ACCESS_TOKEN_TTL_MS - 1)
            .await
            .is_ok());
        assert!(
            decode_and_validate_access(&token, &signer, now + ACCESS_TOKEN_TTL_MS)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn stale_quotas_are_rejected() {
        let signer = LocalSigner::generate();
        let now = 1_000_000_000_000i64;
        let mut stale_quotas = Role::Anonym.canonical_quotas();
        stale_quotas.rpm += 1;
        let claims = AccessClaims {
            standard: standard("user-1", now, ACCESS_TOKEN_TTL_MS),
            role: Role::Anonym,
            quotas: stale_quotas,
        };
        let token = encode_access(&claims, &signer).await.unwrap();
        let err = decode_and_validate_access(&token, &signer, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CiamError::StaleAccessToken));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let signer = LocalSigner::generate();
        let now = 1_000_000_000_000i64;
        let claims = RefreshClaims {
            standard: standard("user-1", now, REFRESH_TOKEN_TTL_MS),
        };
        let mut token = encode_refresh(&claims, &signer).await.unwrap();
        token.push('x');
        assert!(decode_and_validate_refresh(&token, &signer, now)
            .await
            .is_err());
    }
}
