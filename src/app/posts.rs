//! Posts, stored one JSON document per post under `Post/<post_id>`, with a
//! per-author index list at `User/<username>/Posts` so a profile page can
//! list them without a ring-wide scan.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::node::NodeCore;
use crate::router;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at_ms: i64,
}

fn post_key(id: &str) -> String {
    format!("Post/{id}")
}

fn author_index_key(author: &str) -> String {
    format!("User/{author}/Posts")
}

pub struct PostStore {
    core: Arc<NodeCore>,
}

impl PostStore {
    pub fn new(core: Arc<NodeCore>) -> Self {
        PostStore { core }
    }

    pub async fn create(&self, author: &str, body: String) -> Result<Post, RouterError> {
        let created_at_ms = self.core.clock.now_ms();
        let post = Post {
            id: format!("{author}-{created_at_ms}"),
            author: author.to_string(),
            body,
            created_at_ms,
        };

        let encoded = serde_json::to_vec(&post).map_err(|e| RouterError::Internal(e.to_string()))?;
        router::save(&self.core, &post_key(&post.id), encoded).await?;

        let index_key = author_index_key(author);
        let mut ids: Vec<String> = match router::load(&self.core, &index_key).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| RouterError::Internal(e.to_string()))?,
            Err(RouterError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        ids.push(post.id.clone());
        let encoded_ids = serde_json::to_vec(&ids).map_err(|e| RouterError::Internal(e.to_string()))?;
        router::save(&self.core, &index_key, encoded_ids).await?;

        Ok(post)
    }

    pub async fn get(&self, id: &str) -> Result<Post, RouterError> {
        let raw = router::load(&self.core, &post_key(id)).await?;
        serde_json::from_slice(&raw).map_err(|e| RouterError::Internal(e.to_string()))
    }

    pub async fn by_author(&self, author: &str) -> Result<Vec<Post>, RouterError> {
        let ids: Vec<String> = match router::load(&self.core, &author_index_key(author)).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| RouterError::Internal(e.to_string()))?,
            Err(RouterError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            posts.push(self.get(&id).await?);
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::store::LocalStore;
    use tempfile::NamedTempFile;

    fn store() -> PostStore {
        let self_info = crate::node::NodeInfo::new(1, "127.0.0.1:0");
        let file = NamedTempFile::new().unwrap();
        let local_store = Arc::new(LocalStore::new(file.path().to_path_buf()));
        let core = NodeCore::new(self_info, Config::default(), false, local_store, Arc::new(Clock::new()));
        PostStore::new(core)
    }

    #[tokio::test]
    async fn create_then_get_and_list_by_author() {
        let store = store();
        let post = store.create("ada", "hello world".to_string()).await.unwrap();
        assert_eq!(store.get(&post.id).await.unwrap(), post);
        let posts = store.by_author("ada").await.unwrap();
        assert_eq!(posts, vec![post]);
    }

    #[tokio::test]
    async fn by_author_unknown_is_empty() {
        let store = store();
        assert!(store.by_author("nobody").await.unwrap().is_empty());
    }
}
