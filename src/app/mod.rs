//! Thin application layer over the ring's namespaced key-value substrate.
//! Nothing here talks to storage directly — every operation goes through
//! [`crate::router`], so application data is subject to the same routing,
//! replication and LWW reconciliation as any other key.

pub mod follows;
pub mod posts;
pub mod users;

pub use follows::FollowGraph;
pub use posts::{Post, PostStore};
pub use users::{User, UserStore};
