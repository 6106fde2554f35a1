use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{DirectoryUser, UserDirectory};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct FakeUser {
    user_id: UserId,
    password: String,
    is_active: bool,
}

/// In-memory stand-in for the real directory service. Passwords are
/// compared in plain text; hashing belongs to the directory, not here.
#[derive(Debug, Default)]
pub struct FakeUserDirectory {
    users: DashMap<String, FakeUser>,
}

impl FakeUserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    /// Register a user; the id is derived from the email so repeated
    /// registrations agree.
    pub fn add_user(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            email.as_bytes(),
        ));
        self.users.insert(
            email.to_string(),
            FakeUser {
                user_id,
                password: password.to_string(),
                is_active: true,
            },
        );
        user_id
    }

    pub fn deactivate(&self, email: &str) {
        if let Some(mut user) = self.users.get_mut(email) {
            user.is_active = false;
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>, AuthError> {
        let Some(user) = self.users.get(email) else {
            return Ok(None);
        };
        if user.password != password {
            return Ok(None);
        }
        Ok(Some(DirectoryUser {
            user_id: user.user_id,
            is_active: user.is_active,
        }))
    }

    async fn id_exists(&self, user: UserId) -> Result<bool, AuthError> {
        Ok(self.users.iter().any(|entry| entry.value().user_id == user))
    }
}
