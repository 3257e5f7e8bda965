//! Chord-ring distributed key-value core for a decentralized social-network backend.
//!
//! The crate is organized around one shared [`node::NodeCore`] that every
//! background collaborator (stabilizer, replicator, discoverer, timer) and
//! the gRPC service itself read and mutate. See `DESIGN.md` for how each
//! module maps back to the codebase this was adapted from.

pub mod proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("chord_descriptor");
}

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod discoverer;
pub mod error;
pub mod hashing;
pub mod lww;
pub mod node;
pub mod replicator;
pub mod router;
pub mod rpc_client;
pub mod service;
pub mod stabilizer;
pub mod store;
pub mod timer;
pub mod web;

pub use config::Config;
pub use error::RouterError;
pub use node::NodeCore;
