use crate::domain_model::{FamilyId, FamilyRecord, RefreshRecord, UserId};

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("family not found")]
    FamilyNotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Shared session state. All records carry one TTL equal to the refresh
/// token lifetime, renewed on every successful rotation.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a new family: FamilyRecord, RefreshRecord and the user's
    /// index entry are written as one batch.
    async fn create_family(
        &self,
        user: UserId,
        jti: &str,
        user_agent: &str,
    ) -> Result<FamilyId, SessionStoreError>;

    async fn get_refresh_record(&self, jti: &str)
    -> Result<Option<RefreshRecord>, SessionStoreError>;

    async fn get_family_record(
        &self,
        family: &FamilyId,
    ) -> Result<Option<FamilyRecord>, SessionStoreError>;

    /// Flip the consumed flag, atomically inside the store. Returns `false`
    /// if the flag was already set or the record is gone; `true` means this
    /// call was the one that flipped it. Never a client-side read-then-write:
    /// two concurrent callers must not both see `true`.
    async fn try_consume(&self, jti: &str) -> Result<bool, SessionStoreError>;

    /// Point the family at `new_jti`, write the new RefreshRecord, bump
    /// `last_active` and renew all TTLs, as one batch.
    async fn rotate_family(&self, family: &FamilyId, new_jti: &str)
    -> Result<(), SessionStoreError>;

    /// Set `blocked` and drop the family from the user's index. The record
    /// itself stays queryable until TTL expiry. A no-op on a family that is
    /// already gone.
    async fn block_family(&self, family: &FamilyId, user: UserId)
    -> Result<(), SessionStoreError>;

    /// Families in the user's index, blocked ones included; the caller
    /// filters.
    async fn list_sessions(
        &self,
        user: UserId,
    ) -> Result<Vec<(FamilyId, FamilyRecord)>, SessionStoreError>;
}
