//! Berkeley clock synchronization. Every tick, this node samples its own
//! clock plus a handful of finger-table peers' clocks via `GetTime`, nudges
//! its own offset toward the group average, and records the result so it's
//! visible the same way any other value is.

use std::sync::Arc;

use log::{debug, warn};

use crate::node::NodeCore;
use crate::proto;

pub const EVENT_TIME_KEY: &str = "__timer_local_time__";

pub async fn run(core: Arc<NodeCore>) {
    let mut interval = tokio::time::interval(core.config.timer_interval);
    loop {
        interval.tick().await;
        update_time(&core).await;
    }
}

async fn update_time(core: &Arc<NodeCore>) {
    let synchronized = berkeley_average(core).await;
    core.clock.apply_offset(synchronized - core.clock.now_ms());
    core.store.put_with_version(
        EVENT_TIME_KEY,
        synchronized.to_string().into_bytes(),
        synchronized,
    );
    debug!("synchronized clock to {synchronized}ms");
}

async fn berkeley_average(core: &Arc<NodeCore>) -> i64 {
    let mut samples = vec![core.clock.now_ms()];

    for peer in sample_peers(core, 3) {
        match crate::rpc_client::connect(&peer.address, &core.config).await {
            Ok(mut client) => match client.get_time(proto::Empty {}).await {
                Ok(resp) => samples.push(resp.into_inner().millis),
                Err(e) => warn!("GetTime to {} failed: {e}", peer.address),
            },
            Err(e) => warn!("GetTime: {} unreachable: {e}", peer.address),
        }
    }

    samples.iter().sum::<i64>() / samples.len() as i64
}

fn sample_peers(core: &Arc<NodeCore>, count: usize) -> Vec<crate::node::NodeInfo> {
    let mut seen = std::collections::HashSet::new();
    core.finger_snapshot()
        .into_iter()
        .filter(|f| f.address != core.address() && seen.insert(f.address.clone()))
        .take(count)
        .collect()
}
