//! Follow/follower edges, each stored as a JSON array of usernames under
//! `User/<username>/Following` and `User/<username>/Followers`. Simple
//! read-modify-write over the router; concurrent follows of the same user
//! from different nodes can race, same as any other LWW-reconciled key in
//! this system — the last write wins and the edge list it carries replaces
//! the other, rather than merging entries.

use std::sync::Arc;

use crate::error::RouterError;
use crate::node::NodeCore;
use crate::router;

fn following_key(username: &str) -> String {
    format!("User/{username}/Following")
}

fn followers_key(username: &str) -> String {
    format!("User/{username}/Followers")
}

pub struct FollowGraph {
    core: Arc<NodeCore>,
}

impl FollowGraph {
    pub fn new(core: Arc<NodeCore>) -> Self {
        FollowGraph { core }
    }

    pub async fn follow(&self, follower: &str, followee: &str) -> Result<(), RouterError> {
        add_edge(&self.core, &following_key(follower), followee).await?;
        add_edge(&self.core, &followers_key(followee), follower).await
    }

    pub async fn unfollow(&self, follower: &str, followee: &str) -> Result<(), RouterError> {
        remove_edge(&self.core, &following_key(follower), followee).await?;
        remove_edge(&self.core, &followers_key(followee), follower).await
    }

    pub async fn following(&self, username: &str) -> Result<Vec<String>, RouterError> {
        load_list(&self.core, &following_key(username)).await
    }

    pub async fn followers(&self, username: &str) -> Result<Vec<String>, RouterError> {
        load_list(&self.core, &followers_key(username)).await
    }
}

async fn load_list(core: &Arc<NodeCore>, key: &str) -> Result<Vec<String>, RouterError> {
    match router::load(core, key).await {
        Ok(raw) => serde_json::from_slice(&raw).map_err(|e| RouterError::Internal(e.to_string())),
        Err(RouterError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

async fn add_edge(core: &Arc<NodeCore>, key: &str, value: &str) -> Result<(), RouterError> {
    let mut list = load_list(core, key).await?;
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
        let body = serde_json::to_vec(&list).map_err(|e| RouterError::Internal(e.to_string()))?;
        router::save(core, key, body).await?;
    }
    Ok(())
}

async fn remove_edge(core: &Arc<NodeCore>, key: &str, value: &str) -> Result<(), RouterError> {
    let mut list = load_list(core, key).await?;
    let before = list.len();
    list.retain(|v| v != value);
    if list.len() != before {
        let body = serde_json::to_vec(&list).map_err(|e| RouterError::Internal(e.to_string()))?;
        router::save(core, key, body).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::store::LocalStore;
    use tempfile::NamedTempFile;

    fn graph() -> FollowGraph {
        let self_info = crate::node::NodeInfo::new(1, "127.0.0.1:0");
        let file = NamedTempFile::new().unwrap();
        let local_store = Arc::new(LocalStore::new(file.path().to_path_buf()));
        let core = NodeCore::new(self_info, Config::default(), false, local_store, Arc::new(Clock::new()));
        FollowGraph::new(core)
    }

    #[tokio::test]
    async fn follow_updates_both_sides() {
        let graph = graph();
        graph.follow("alice", "bob").await.unwrap();
        assert_eq!(graph.following("alice").await.unwrap(), vec!["bob"]);
        assert_eq!(graph.followers("bob").await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn unfollow_removes_both_sides() {
        let graph = graph();
        graph.follow("alice", "bob").await.unwrap();
        graph.unfollow("alice", "bob").await.unwrap();
        assert!(graph.following("alice").await.unwrap().is_empty());
        assert!(graph.followers("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn following_unknown_user_is_empty_not_error() {
        let graph = graph();
        assert!(graph.following("ghost").await.unwrap().is_empty());
    }
}
