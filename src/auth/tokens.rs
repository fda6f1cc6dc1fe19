use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::users::repo::UserStore;
use crate::users::repo_types::User;

/// Freshly minted credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies access/refresh JWTs. Access and refresh tokens use separate secrets.
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            access: SigningKeys::from_secret(&cfg.access_secret),
            refresh: SigningKeys::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn base_claims(&self, user_id: Uuid, kind: TokenKind) -> Claims {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
            username: None,
            email: None,
            full_name: None,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(&Header::default(), claims, &self.keys(claims.kind).encoding)?;
        debug!(user_id = %claims.sub, kind = ?claims.kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        let mut claims = self.base_claims(user.id, TokenKind::Access);
        claims.username = Some(user.username.clone());
        claims.email = Some(user.email.clone());
        claims.full_name = Some(user.full_name.clone());
        self.sign(&claims)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(&self.base_claims(user_id, TokenKind::Refresh))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("wrong token kind, expected {kind:?}");
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    /// Mints a token pair for `user_id` and stores the refresh token on the user,
    /// replacing any previous one. Every failure is reported as `Internal`.
    #[instrument(skip(self, users))]
    pub async fn issue_tokens(
        &self,
        users: &dyn UserStore,
        user_id: Uuid,
    ) -> Result<TokenPair, ApiError> {
        self.try_issue(users, user_id).await.map_err(|e| {
            error!(error = %e, %user_id, "token issuance failed");
            ApiError::Internal(
                "Something went wrong while generating refresh and access tokens".into(),
            )
        })
    }

    async fn try_issue(&self, users: &dyn UserStore, user_id: Uuid) -> anyhow::Result<TokenPair> {
        let user = users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;
        let access_token = self.sign_access(&user)?;
        let refresh_token = self.sign_refresh(user.id)?;
        users.set_refresh_token(user.id, Some(&refresh_token)).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}
