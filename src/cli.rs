//! Per-process identity: what address this node binds, who to join
//! through, and whether its debug RPC surface is open. Deliberately
//! separate from [`crate::config::Config`], which covers deployment-wide
//! tuning that's the same for every node in the ring.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "ringsocial", about = "Chord-ring node for the ringsocial backend")]
pub struct Cli {
    /// Address this node's gRPC service binds and advertises, e.g. 0.0.0.0:5000.
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub address: String,

    /// Address of an existing ring member to join through. If omitted, the
    /// discoverer tries DNS and the peer cache before starting a new ring.
    #[arg(long)]
    pub peer: Option<String>,

    /// Enables the GetNodeSummary debug RPC and the actix-web dashboard.
    #[arg(long)]
    pub dev_mode: bool,

    /// Optional .ini file overlaying compiled-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address the debug dashboard binds to, when --dev-mode is set.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub web_address: String,
}
