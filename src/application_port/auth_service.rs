use crate::domain_model::{FamilyId, SessionSummary, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("inactive user")]
    InactiveUser,
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenVerifyResult {
    pub user_id: UserId,
    pub jti: Option<String>,
}

/// Claims recovered from a verified refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenData {
    pub user_id: UserId,
    pub jti: String,
    pub family_id: FamilyId,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: UserId,
        jti: Option<String>,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn issue_refresh_token(
        &self,
        user: UserId,
        jti: String,
        family: FamilyId,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<TokenVerifyResult, AuthError>;
    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenData, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    /// Rotate a refresh token. Every validation anomaly beyond plain
    /// absence blocks the whole family before the error is returned.
    async fn refresh(&self, refresh_token: &str, user_agent: &str)
    -> Result<AuthTokens, AuthError>;
    /// Best-effort: undecodable tokens and store failures are swallowed.
    async fn logout(&self, refresh_token: Option<&str>);
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError>;
    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionSummary>, AuthError>;
    async fn block_session(&self, user: UserId, family: FamilyId) -> Result<(), AuthError>;
    async fn block_all_sessions(&self, user: UserId) -> Result<usize, AuthError>;
}
