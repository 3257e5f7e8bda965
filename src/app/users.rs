//! User profiles, stored one JSON document per user under `User/<username>`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::node::NodeCore;
use crate::router;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub bio: String,
}

fn user_key(username: &str) -> String {
    format!("User/{username}")
}

pub struct UserStore {
    core: Arc<NodeCore>,
}

impl UserStore {
    pub fn new(core: Arc<NodeCore>) -> Self {
        UserStore { core }
    }

    pub async fn create(&self, user: &User) -> Result<(), RouterError> {
        let body = serde_json::to_vec(user)
            .map_err(|e| RouterError::InvalidArgument(e.to_string()))?;
        router::save(&self.core, &user_key(&user.username), body).await
    }

    pub async fn get(&self, username: &str) -> Result<User, RouterError> {
        let raw = router::load(&self.core, &user_key(username)).await?;
        serde_json::from_slice(&raw).map_err(|e| RouterError::Internal(e.to_string()))
    }

    pub async fn exists(&self, username: &str) -> Result<bool, RouterError> {
        router::exists(&self.core, &user_key(username)).await
    }

    pub async fn delete(&self, username: &str) -> Result<(), RouterError> {
        router::delete(&self.core, &user_key(username)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::store::LocalStore;
    use tempfile::NamedTempFile;

    fn store() -> UserStore {
        let self_info = crate::node::NodeInfo::new(1, "127.0.0.1:0");
        let file = NamedTempFile::new().unwrap();
        let local_store = Arc::new(LocalStore::new(file.path().to_path_buf()));
        let core = NodeCore::new(self_info, Config::default(), false, local_store, Arc::new(Clock::new()));
        UserStore::new(core)
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = store();
        let user = User {
            username: "ada".to_string(),
            display_name: "Ada Lovelace".to_string(),
            bio: "".to_string(),
        };
        store.create(&user).await.unwrap();
        assert_eq!(store.get("ada").await.unwrap(), user);
        assert!(store.exists("ada").await.unwrap());
    }

    #[tokio::test]
    async fn get_unknown_user_not_found() {
        let store = store();
        assert!(store.get("nobody").await.is_err());
    }
}
