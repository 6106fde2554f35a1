use crate::application_port::AuthError;
use crate::domain_model::UserId;

#[derive(Debug, Clone)]
pub struct DirectoryUser {
    pub user_id: UserId,
    pub is_active: bool,
}

/// Credential verification and existence lookups live outside this crate;
/// the engine only sees this contract.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` covers both unknown email and wrong password.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>, AuthError>;

    async fn id_exists(&self, user: UserId) -> Result<bool, AuthError>;
}
