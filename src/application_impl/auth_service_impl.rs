use crate::application_port::{
    AccessToken, AuthError, AuthService, AuthTokens, LoginInput, LoginResult, RefreshToken,
    TokenCodec,
};
use crate::domain_model::{FamilyId, SessionSummary, UserId};
use crate::domain_port::{SessionStore, SessionStoreError, UserDirectory};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn store_err(e: SessionStoreError) -> AuthError {
    match e {
        SessionStoreError::FamilyNotFound => AuthError::InvalidCredentials,
        SessionStoreError::Unavailable(msg) => AuthError::Store(msg),
        SessionStoreError::InternalError(e) => AuthError::InternalError(e.to_string()),
    }
}

pub struct RealAuthService {
    user_directory: Arc<dyn UserDirectory>,
    token_codec: Arc<dyn TokenCodec>,
    session_store: Arc<dyn SessionStore>,
}

impl RealAuthService {
    pub fn new(
        user_directory: Arc<dyn UserDirectory>,
        token_codec: Arc<dyn TokenCodec>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            user_directory,
            token_codec,
            session_store,
        }
    }

    #[inline]
    fn new_jti() -> String {
        Uuid::new_v4().to_string()
    }

    /// Cascade revocation. Raising `Store` here instead of the pending
    /// auth failure is deliberate: if the block did not land, the caller
    /// must see a retryable error, not a terminal one.
    async fn block(&self, family: &FamilyId, user: UserId) -> Result<(), AuthError> {
        self.session_store
            .block_family(family, user)
            .await
            .map_err(store_err)
    }

    async fn issue_pair(
        &self,
        user: UserId,
        jti: String,
        family: FamilyId,
    ) -> Result<AuthTokens, AuthError> {
        let (access_token, access_exp) = self
            .token_codec
            .issue_access_token(user, Some(jti.clone()))
            .await?;
        let (refresh_token, refresh_exp) = self
            .token_codec
            .issue_refresh_token(user, jti, family)
            .await?;
        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput {
            email,
            password,
            user_agent,
        } = request;

        let user = self
            .user_directory
            .authenticate(&email, &password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        let jti = Self::new_jti();
        let family_id = self
            .session_store
            .create_family(user.user_id, &jti, &user_agent)
            .await
            .map_err(store_err)?;

        let tokens = self.issue_pair(user.user_id, jti, family_id).await?;
        info!(user_id = %user.user_id, family_id = %family_id, "login: new session family");

        Ok(LoginResult {
            user_id: user.user_id,
            tokens,
        })
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        user_agent: &str,
    ) -> Result<AuthTokens, AuthError> {
        // Any codec failure aborts before the store is touched.
        let Ok(data) = self
            .token_codec
            .verify_refresh_token(&RefreshToken(refresh_token.to_string()))
            .await
        else {
            debug!("failed refresh: token did not verify");
            return Err(AuthError::InvalidCredentials);
        };

        let record = self
            .session_store
            .get_refresh_record(&data.jti)
            .await
            .map_err(store_err)?;
        // Absent is indistinguishable from TTL expiry: reject, don't block.
        let Some(record) = record else {
            warn!(user_id = %data.user_id, jti = %data.jti, "failed refresh: unknown or expired jti");
            return Err(AuthError::InvalidCredentials);
        };

        // A valid signature over a sub/family pairing the record never had
        // is a forgery; the record holds the authentic binding.
        if record.user_id != data.user_id || record.family_id != data.family_id {
            warn!(user_id = %data.user_id, jti = %data.jti, "failed refresh: claims mismatch");
            self.block(&record.family_id, record.user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let family = self
            .session_store
            .get_family_record(&data.family_id)
            .await
            .map_err(store_err)?;
        let Some(family) = family else {
            warn!(user_id = %data.user_id, family_id = %data.family_id, "failed refresh: family expired");
            return Err(AuthError::InvalidCredentials);
        };
        if family.blocked {
            // Already terminal, nothing left to revoke.
            warn!(user_id = %data.user_id, family_id = %data.family_id, "failed refresh: family blocked");
            return Err(AuthError::InvalidCredentials);
        }

        if family.user_agent != user_agent {
            warn!(user_id = %data.user_id, family_id = %data.family_id, "failed refresh: user agent mismatch");
            self.block(&data.family_id, data.user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        // The consume result is the sole gate for rotation; token issuance
        // happens strictly after it.
        if !self
            .session_store
            .try_consume(&data.jti)
            .await
            .map_err(store_err)?
        {
            warn!(user_id = %data.user_id, jti = %data.jti, "failed refresh: token reuse");
            self.block(&data.family_id, data.user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let new_jti = Self::new_jti();
        self.session_store
            .rotate_family(&data.family_id, &new_jti)
            .await
            .map_err(store_err)?;

        let tokens = self.issue_pair(data.user_id, new_jti, data.family_id).await?;
        debug!(user_id = %data.user_id, family_id = %data.family_id, "refresh: rotated");
        Ok(tokens)
    }

    async fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token else {
            return;
        };
        let Ok(data) = self
            .token_codec
            .verify_refresh_token(&RefreshToken(token.to_string()))
            .await
        else {
            return;
        };
        match self
            .session_store
            .block_family(&data.family_id, data.user_id)
            .await
        {
            Ok(()) => info!(user_id = %data.user_id, family_id = %data.family_id, "logout"),
            Err(e) => warn!(user_id = %data.user_id, error = %e, "logout: block failed"),
        }
    }

    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        let verify_result = self
            .token_codec
            .verify_access_token(&AccessToken(token.to_string()))
            .await?;

        if !self.user_directory.id_exists(verify_result.user_id).await? {
            return Err(AuthError::UserNotFound);
        }

        Ok(verify_result.user_id)
    }

    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionSummary>, AuthError> {
        let mut sessions: Vec<SessionSummary> = self
            .session_store
            .list_sessions(user)
            .await
            .map_err(store_err)?
            .into_iter()
            .filter(|(_, record)| !record.blocked)
            .map(|(family_id, record)| SessionSummary {
                family_id,
                user_agent: record.user_agent,
                created_at: record.created_at,
                last_active: record.last_active,
            })
            .collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }

    async fn block_session(&self, user: UserId, family: FamilyId) -> Result<(), AuthError> {
        let sessions = self
            .session_store
            .list_sessions(user)
            .await
            .map_err(store_err)?;
        if !sessions.iter().any(|(family_id, _)| *family_id == family) {
            // Not this user's session; indistinguishable from any other
            // auth failure on purpose.
            return Err(AuthError::InvalidCredentials);
        }
        self.block(&family, user).await?;
        info!(user_id = %user, family_id = %family, "session blocked");
        Ok(())
    }

    async fn block_all_sessions(&self, user: UserId) -> Result<usize, AuthError> {
        let sessions = self
            .session_store
            .list_sessions(user)
            .await
            .map_err(store_err)?;
        let mut count = 0;
        for (family_id, _) in &sessions {
            self.block(family_id, user).await?;
            count += 1;
        }
        info!(user_id = %user, count, "all sessions blocked");
        Ok(count)
    }
}
