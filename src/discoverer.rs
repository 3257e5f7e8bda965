//! Ring membership bootstrap: resolve other nodes via the deployment's DNS
//! service alias, fall back to a cached address list if DNS comes up empty,
//! join through whichever candidate answers first, or start a fresh
//! one-node ring if nothing is reachable. Runs as a periodic background
//! check so a node that boots before any peer is ready keeps retrying
//! instead of forming an isolated ring permanently.

use std::sync::Arc;

use log::{info, warn};

use crate::cache;
use crate::node::{NodeCore, NodeInfo};
use crate::proto;
use crate::rpc_client;

pub async fn run(core: Arc<NodeCore>) {
    create_ring_or_join(&core).await;

    let mut interval = tokio::time::interval(core.config.discovery_interval);
    loop {
        interval.tick().await;
        if is_isolated(&core) {
            info!("node is isolated, attempting to discover and join a ring");
            create_ring_or_join(&core).await;
        }
    }
}

fn is_isolated(core: &Arc<NodeCore>) -> bool {
    core.is_self(&core.successor().address)
}

async fn create_ring_or_join(core: &Arc<NodeCore>) {
    let candidates = discover_nodes(core).await;
    if candidates.is_empty() {
        info!("no peers discovered, starting a new ring");
        create_ring(core);
        return;
    }

    if join(core, &candidates).await {
        return;
    }

    warn!("failed to join via any discovered peer, starting a new ring");
    create_ring(core);
}

/// Resolves `network_alias` via DNS; every address found is cached so a
/// later restart can fall back to it if DNS is unavailable.
async fn discover_nodes(core: &Arc<NodeCore>) -> Vec<String> {
    let alias = &core.config.network_alias;
    let lookup_target = format!("{alias}:{}", core.config.default_port);

    let lookup_result = tokio::net::lookup_host(&lookup_target).await;
    match lookup_result {
        Ok(addrs) => {
            let mut found = Vec::new();
            for addr in addrs {
                let candidate = format!("{}:{}", addr.ip(), core.config.default_port);
                cache::add(&core.config.cache_path, &candidate);
                if candidate != core.address() && !found.contains(&candidate) {
                    found.push(candidate);
                }
            }
            info!("discovered {} candidate peers via DNS", found.len());
            found
        }
        Err(e) => {
            warn!("DNS discovery via {alias} failed: {e}, falling back to peer cache");
            cache::load(&core.config.cache_path)
                .into_iter()
                .filter(|addr| addr != core.address())
                .collect()
        }
    }
}

async fn join(core: &Arc<NodeCore>, candidates: &[String]) -> bool {
    for candidate in candidates {
        info!("attempting to join ring via {candidate}");
        let mut client = match rpc_client::connect_with_retry(candidate, &core.config, 1).await {
            Ok(c) => c,
            Err(e) => {
                warn!("join via {candidate} failed: {e}");
                continue;
            }
        };

        if client.ping(proto::Empty {}).await.is_err() {
            continue;
        }

        match client.find_successor(proto::IdMsg { id: core.id() }).await {
            Ok(resp) => {
                let successor: NodeInfo = resp.into_inner().into();
                core.set_successor(successor.clone());
                core.set_predecessor(None);
                info!("joined ring via {candidate}, successor is {}", successor.address);
                return true;
            }
            Err(e) => warn!("find_successor via {candidate} failed: {e}"),
        }
    }
    false
}

fn create_ring(core: &Arc<NodeCore>) {
    core.set_successor(core.self_info.clone());
    core.set_predecessor(None);
    info!("created new ring, node {}@{} is alone", core.id(), core.address());
}
