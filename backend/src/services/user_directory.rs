use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    config::BootstrapUser,
    models::user::{User, UserRole},
    utils::password::hash_password,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
}

/// Accounts held in process memory, keyed by lowercase username.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, User>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.username.to_lowercase(), user);
        self
    }

    /// Hashes the configured passwords and builds the directory.
    pub fn from_bootstrap(entries: &[BootstrapUser]) -> anyhow::Result<Self> {
        let mut directory = Self::new();
        for entry in entries {
            let role = UserRole::parse(&entry.role)
                .ok_or_else(|| anyhow::anyhow!("Unknown role for {}: {}", entry.username, entry.role))?;
            directory = directory.with_user(User {
                id: Uuid::new_v4().to_string(),
                username: entry.username.clone(),
                email: entry.email.clone(),
                password_hash: hash_password(&entry.password)?,
                role,
            });
        }
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(&username.trim().to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::password::verify_password;

    #[tokio::test]
    async fn bootstrap_users_are_found_case_insensitively() {
        let directory = InMemoryUserDirectory::from_bootstrap(&[BootstrapUser {
            username: "Alice".into(),
            email: "alice@bank.test".into(),
            role: "supervisor".into(),
            password: "pw".into(),
        }])
        .expect("bootstrap");

        let user = directory
            .find_by_username("alice")
            .await
            .expect("lookup")
            .expect("user");
        assert_eq!(user.role, UserRole::Supervisor);
        assert!(verify_password("pw", &user.password_hash).expect("verify"));
        assert!(directory.find_by_username("bob").await.expect("lookup").is_none());
    }

    #[test]
    fn bootstrap_rejects_unknown_role() {
        let result = InMemoryUserDirectory::from_bootstrap(&[BootstrapUser {
            username: "eve".into(),
            email: "eve@bank.test".into(),
            role: "janitor".into(),
            password: "pw".into(),
        }]);
        assert!(result.is_err());
    }
}
