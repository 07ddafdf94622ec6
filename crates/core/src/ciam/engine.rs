//! C5: CIAM engine — the four externally visible operations from spec §4.5.
//!
//! No teacher analogue; grounded in the pack's auth stack
//! (`other_examples/penserai-acteon`: `ed25519-dalek`, `lettre`) wired
//! through the capability traits this crate defines for C7/C8 plus the
//! [`crate::mailer::Mailer`] capability.

use crate::ciam::quotas::Role;
use crate::ciam::token::{
    self, AccessClaims, IdClaims, RefreshClaims, StandardClaims, ACCESS_TOKEN_TTL_MS, AUDIENCE,
    ID_TOKEN_TTL_MS, ISSUER, REFRESH_TOKEN_TTL_MS,
};
use crate::error::CiamError;
use crate::mailer::Mailer;
use crate::repository::Repository;
use crate::signing::Signer;
use rand::RngCore;
use uuid::Uuid;

/// One-time secret validity window (spec §3).
const SECRET_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct Tokens {
    pub id: String,
    pub access: String,
    pub refresh: String,
}

pub struct CiamEngine<'a> {
    pub repository: &'a dyn Repository,
    pub signer: &'a dyn Signer,
    pub mailer: &'a dyn Mailer,
}

impl<'a> CiamEngine<'a> {
    pub fn new(repository: &'a dyn Repository, signer: &'a dyn Signer, mailer: &'a dyn Mailer) -> Self {
        Self {
            repository,
            signer,
            mailer,
        }
    }

    fn standard_claims(&self, sub: &str, now_ms: i64, ttl_ms: i64) -> StandardClaims {
        StandardClaims {
            sub: sub.to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now_ms,
            exp: now_ms + ttl_ms,
        }
    }

    async fn issue_tokens(
        &self,
        user_id: Uuid,
        role: Role,
        email: Option<String>,
        fingerprint: Option<String>,
        email_verified: bool,
        now_ms: i64,
    ) -> Result<Tokens, CiamError> {
        let sub = user_id.to_string();

        let id_claims = IdClaims {
            standard: self.standard_claims(&sub, now_ms, ID_TOKEN_TTL_MS),
            email,
            fingerprint,
            email_verified,
        };
        let access_claims = AccessClaims {
            standard: self.standard_claims(&sub, now_ms, ACCESS_TOKEN_TTL_MS),
            role,
            quotas: role.canonical_quotas(),
        };
        let refresh_claims = RefreshClaims {
            standard: self.standard_claims(&sub, now_ms, REFRESH_TOKEN_TTL_MS),
        };

        Ok(Tokens {
            id: token::encode_id(&id_claims, self.signer).await?,
            access: token::encode_access(&access_claims, self.signer).await?,
            refresh: token::encode_refresh(&refresh_claims, self.signer).await?,
        })
    }

    /// `SigninAnonym(fingerprint) -> Tokens` (spec §4.5).
    pub async fn signin_anonym(&self, fingerprint: &str, now_ms: i64) -> Result<Tokens, CiamError> {
        if fingerprint.trim().is_empty() {
            return Err(CiamError::Validation("fingerprint must not be empty".into()));
        }

        let user_id = match self.repository.lookup_user_by_fingerprint(fingerprint).await? {
            Some((user_id, is_active)) => {
                if !is_active {
                    return Err(CiamError::Deactivated);
                }
                user_id
            }
            None => {
                let user_id = Uuid::new_v4();
                self.repository
                    .create_user(user_id, None, Some(fingerprint), true)
                    .await?;
                user_id
            }
        };

        self.issue_tokens(user_id, Role::Anonym, None, Some(fingerprint.to_string()), false, now_ms)
            .await
    }

    /// `SigninUser(email, fingerprint) -> ID token` (spec §4.5).
    pub async fn signin_user(
        &self,
        email: &str,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<String, CiamError> {
        if email.trim().is_empty() {
            return Err(CiamError::Validation("email must not be empty".into()));
        }

        let user_id = match self.repository.lookup_user_by_email(email).await? {
            Some((user_id, is_active)) => {
                if !is_active {
                    return Err(CiamError::Deactivated);
                }
                user_id
            }
            None => {
                let user_id = Uuid::new_v4();
                self.repository
                    .create_user(user_id, Some(email), fingerprint, true)
                    .await?;
                user_id
            }
        };

        if let Some((_, iat)) = self.repository.read_one_time_secret(user_id).await? {
            if iat + SECRET_TTL_MS > now_ms {
                // Idempotent resend window: reuse the existing `iat` rather
                // than rotating the secret (spec §9 open question).
                let claims = IdClaims {
                    standard: self.standard_claims(&user_id.to_string(), iat, ID_TOKEN_TTL_MS),
                    email: Some(email.to_string()),
                    fingerprint: fingerprint.map(str::to_string),
                    email_verified: false,
                };
                return Ok(token::encode_id(&claims, self.signer).await?);
            }
        }

        let secret = generate_secret();
        self.mailer.send_one_time_secret(email, &secret).await?;
        self.repository
            .write_one_time_secret(user_id, &secret, now_ms)
            .await?;

        let claims = IdClaims {
            standard: self.standard_claims(&user_id.to_string(), now_ms, ID_TOKEN_TTL_MS),
            email: Some(email.to_string()),
            fingerprint: fingerprint.map(str::to_string),
            email_verified: false,
        };
        Ok(token::encode_id(&claims, self.signer).await?)
    }

    /// `IssueTokensAfterSecretConfirmation(idToken, secret) -> Tokens` (spec §4.5).
    pub async fn issue_tokens_after_secret_confirmation(
        &self,
        id_token: &str,
        secret: &str,
        now_ms: i64,
    ) -> Result<Tokens, CiamError> {
        let claims = token::decode_and_validate_id(id_token, self.signer, now_ms).await?;
        let user_id: Uuid = claims
            .standard
            .sub
            .parse()
            .map_err(|_| CiamError::Unauthorized("malformed subject".into()))?;

        let stored = self
            .repository
            .read_one_time_secret(user_id)
            .await?
            .ok_or(CiamError::NoPendingConfirmation)?;

        if stored.0 != secret {
            return Err(CiamError::WrongSecret);
        }

        self.repository.update_user_set_email_verified(user_id).await?;
        // Best-effort deletion: a failure here must not fail confirmation.
        let _ = self.repository.delete_one_time_secret(user_id).await;

        self.issue_tokens(
            user_id,
            Role::RegisteredVerified,
            claims.email,
            claims.fingerprint,
            true,
            now_ms,
        )
        .await
    }

    /// `RefreshTokens(refreshToken) -> Tokens` (spec §4.5).
    pub async fn refresh_tokens(&self, refresh_token: &str, now_ms: i64) -> Result<Tokens, CiamError> {
        let claims = token::decode_and_validate_refresh(refresh_token, self.signer, now_ms).await?;
        let user_id: Uuid = claims
            .standard
            .sub
            .parse()
            .map_err(|_| CiamError::Unauthorized("malformed subject".into()))?;

        let user = self.repository.read_user(user_id).await?;
        if !user.found {
            return Err(CiamError::UserNotFound);
        }
        if !user.is_active {
            return Err(CiamError::Deactivated);
        }

        let role = match (&user.email, user.email_verified) {
            (Some(_), true) => Role::RegisteredVerified,
            (Some(_), false) => Role::RegisteredNotVerified,
            (None, _) => Role::Anonym,
        };

        self.issue_tokens(
            user_id,
            role,
            user.email,
            user.fingerprint,
            user.email_verified,
            now_ms,
        )
        .await
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::NullMailer;
    use crate::repository::InMemoryRepository;
    use crate::signing::LocalSigner;

    const NOW: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn signin_anonym_creates_user_on_first_call() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let tokens = engine.signin_anonym("fp-1", NOW).await.unwrap();
        let access = token::decode_and_validate_access(&tokens.access, &signer, NOW)
            .await
            .unwrap();
        assert_eq!(access.role, Role::Anonym);
        assert_eq!(access.quotas, Role::Anonym.canonical_quotas());
    }

    #[tokio::test]
    async fn signin_anonym_rejects_empty_fingerprint() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let err = engine.signin_anonym("", NOW).await.unwrap_err();
        assert!(matches!(err, CiamError::Validation(_)));
    }

    #[tokio::test]
    async fn scenario5_signin_confirm_happy_path() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let id_token = engine.signin_user("a@b.com", Some("fp"), NOW).await.unwrap();
        let id_claims = token::decode_and_validate_id(&id_token, &signer, NOW).await.unwrap();
        let user_id: Uuid = id_claims.standard.sub.parse().unwrap();
        let (secret, _iat) = repo.read_one_time_secret(user_id).await.unwrap().unwrap();

        let tokens = engine
            .issue_tokens_after_secret_confirmation(&id_token, &secret, NOW + 1000)
            .await
            .unwrap();

        let access = token::decode_and_validate_access(&tokens.access, &signer, NOW + 1000)
            .await
            .unwrap();
        assert_eq!(access.role, Role::RegisteredVerified);
        assert_eq!(access.quotas, Role::RegisteredVerified.canonical_quotas());
    }

    #[tokio::test]
    async fn wrong_secret_fails_and_leaves_secret_intact() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let id_token = engine.signin_user("a@b.com", None, NOW).await.unwrap();
        let id_claims = token::decode_and_validate_id(&id_token, &signer, NOW).await.unwrap();
        let user_id: Uuid = id_claims.standard.sub.parse().unwrap();

        let err = engine
            .issue_tokens_after_secret_confirmation(&id_token, "wrong1", NOW + 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, CiamError::WrongSecret));
        assert!(repo.read_one_time_secret(user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resend_within_window_reuses_original_iat() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let first = engine.signin_user("a@b.com", None, NOW).await.unwrap();
        let second = engine.signin_user("a@b.com", None, NOW + 60_000).await.unwrap();

        let first_claims = token::decode_and_validate_id(&first, &signer, NOW + 60_000)
            .await
            .unwrap();
        let second_claims = token::decode_and_validate_id(&second, &signer, NOW + 60_000)
            .await
            .unwrap();
        assert_eq!(first_claims.standard.iat, second_claims.standard.iat);
    }

    #[tokio::test]
    async fn refresh_recomputes_quotas_from_current_role() {
        let repo = InMemoryRepository::new();
        let signer = LocalSigner::generate();
        let mailer = NullMailer;
        let engine = CiamEngine::new(&repo, &signer, &mailer);

        let id_token = engine.signin_user("a@b.com", None, NOW).await.unwrap();
        let (secret, _) = {
            let claims = token::decode_and_validate_id(&id_token, &signer, NOW).await.unwrap();
            let user_id: Uuid = claims.standard.sub.parse().unwrap();
            repo.read_one_time_secret(user_id).await.unwrap().unwrap()
        };
        let tokens = engine
            .issue_tokens_after_secret_confirmation(&id_token, &secret, NOW + 1000)
            .await
            .unwrap();

        let refreshed = engine
            .refresh_tokens(&tokens.refresh, NOW + 2000)
            .await
            .unwrap();
        let access = token::decode_and_validate_access(&refreshed.access, &signer, NOW + 2000)
            .await
            .unwrap();
        assert_eq!(access.role, Role::RegisteredVerified);
        assert_eq!(access.quotas, Role::RegisteredVerified.canonical_quotas());
    }
}
