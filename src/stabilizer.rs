//! Background task that keeps successor pointers, predecessor pointers and
//! the finger table converging as nodes join and leave. Ported from the
//! `stabilize` / `fix_fingers` / `check_predecessor` loop in this system's
//! node implementation, run here as one `tokio::spawn`ed loop instead of a
//! dedicated OS thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::Mutex as AsyncMutex;

use crate::hashing::is_between;
use crate::node::{NodeCore, NodeInfo};
use crate::proto;
use crate::rpc_client;

const FINGER_LOG_THROTTLE: Duration = Duration::from_secs(30);

pub async fn run(core: Arc<NodeCore>) {
    let mut interval = tokio::time::interval(core.config.stabilize_interval);
    let last_logged = AsyncMutex::new(Instant::now() - FINGER_LOG_THROTTLE);

    loop {
        interval.tick().await;
        stabilize(&core).await;
        fix_fingers(&core).await;
        check_predecessor(&core).await;
        maybe_log_fingers(&core, &last_logged).await;
    }
}

async fn stabilize(core: &Arc<NodeCore>) {
    let mut successor = core.successor();
    if !core.is_self(&successor.address) && !ping(core, &successor).await {
        warn!("successor {} is dead, finding new successor", successor.address);
        successor = find_next_alive_successor(core).await;
        core.set_successor(successor.clone());
    }

    if core.is_self(&successor.address) {
        return;
    }

    let mut client = match rpc_client::connect(&successor.address, &core.config).await {
        Ok(c) => c,
        Err(e) => {
            warn!("stabilize: successor {} unreachable: {e}", successor.address);
            return;
        }
    };

    if let Ok(resp) = client.get_predecessor(proto::Empty {}).await {
        let x: NodeInfo = resp.into_inner().into();
        if !x.address.is_empty() && is_between(x.id, core.id(), successor.id, false, false) {
            core.set_successor(x);
        }
    }

    let notify = proto::NodeInfo {
        id: core.id(),
        address: core.address().to_string(),
    };
    if let Err(e) = client.update_predecessor(notify).await {
        warn!("stabilize: notify to {} failed: {e}", successor.address);
    }
}

async fn ping(core: &Arc<NodeCore>, node: &NodeInfo) -> bool {
    if core.is_self(&node.address) {
        return true;
    }
    match rpc_client::connect(&node.address, &core.config).await {
        Ok(mut client) => client.ping(proto::Empty {}).await.is_ok(),
        Err(_) => false,
    }
}

/// Scans the finger table in order for the first live entry other than
/// self, promoting it to `finger[0]`; falls back to self if none answer.
async fn find_next_alive_successor(core: &Arc<NodeCore>) -> NodeInfo {
    for finger in core.finger_snapshot() {
        if !core.is_self(&finger.address) && ping(core, &finger).await {
            return finger;
        }
    }
    core.self_info.clone()
}

async fn fix_fingers(core: &Arc<NodeCore>) {
    let successor = core.successor();
    if core.is_self(&successor.address) {
        return;
    }

    for i in 0..core.m_bits as usize {
        let start = crate::hashing::finger_start(core.id(), i as u32, core.m_bits);
        match core.find_successor(start).await {
            Ok(node) => core.set_finger(i, node),
            Err(e) => warn!("fix_fingers: failed to resolve finger {i}: {e}"),
        }
    }
}

async fn check_predecessor(core: &Arc<NodeCore>) {
    let Some(pred) = core.predecessor() else {
        return;
    };
    if core.is_self(&pred.address) {
        return;
    }

    if !ping(core, &pred).await {
        info!("predecessor {} unreachable, clearing", pred.address);
        core.set_predecessor(None);
    }
}

async fn maybe_log_fingers(core: &Arc<NodeCore>, last_logged: &AsyncMutex<Instant>) {
    let mut guard = last_logged.lock().await;
    if guard.elapsed() < FINGER_LOG_THROTTLE {
        return;
    }
    *guard = Instant::now();
    let fingers = core.finger_snapshot();
    info!(
        "node {} successor={} predecessor={:?} fingers={:?}",
        core.id(),
        fingers[0].address,
        core.predecessor().map(|p| p.address),
        fingers.iter().map(|f| f.id).collect::<Vec<_>>()
    );
}
