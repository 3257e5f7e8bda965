//! Standalone tool that cross-checks a running ring's invariants from the
//! outside: every node's predecessor should be the node before it in
//! sorted id order, and every finger entry should point at whoever is
//! actually responsible for the id it targets. Requires each node to be
//! started with `--dev-mode` so `GetNodeSummary` is available.

use std::env;

use ringsocial::hashing::is_between;
use ringsocial::proto::chord_client::ChordClient;
use ringsocial::proto::{Empty, NodeSummaryMsg};

#[tokio::main]
async fn main() {
    let urls: Vec<String> = env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: validate_cluster <node-address> [<node-address> ...]");
        std::process::exit(1);
    }

    let mut summaries = Vec::new();
    for url in &urls {
        let endpoint = if url.starts_with("http") {
            url.clone()
        } else {
            format!("http://{url}")
        };
        match ChordClient::connect(endpoint).await {
            Ok(mut client) => match client.get_node_summary(Empty {}).await {
                Ok(resp) => summaries.push(resp.into_inner()),
                Err(e) => eprintln!("GetNodeSummary failed for {url}: {e} (is --dev-mode set?)"),
            },
            Err(e) => eprintln!("failed to connect to {url}: {e}"),
        }
    }

    if summaries.is_empty() {
        eprintln!("no reachable nodes, nothing to validate");
        std::process::exit(1);
    }

    summaries.sort_by_key(|s| s.self_info.as_ref().map(|n| n.id).unwrap_or(0));

    let mut ok = true;
    let n = summaries.len();

    for i in 0..n {
        let this_node = summaries[i].self_info.as_ref().unwrap();
        let expected_pred_address = &summaries[(i + n - 1) % n].self_info.as_ref().unwrap().address;
        let actual_pred_address = summaries[i]
            .predecessor
            .as_ref()
            .map(|p| p.address.clone())
            .unwrap_or_default();

        if n > 1 && &actual_pred_address != expected_pred_address {
            println!(
                "MISMATCH: node {} ({}) has predecessor {}, expected {}",
                this_node.id, this_node.address, actual_pred_address, expected_pred_address
            );
            ok = false;
        }
    }

    let ids: Vec<u64> = summaries
        .iter()
        .map(|s| s.self_info.as_ref().unwrap().id)
        .collect();

    for summary in &summaries {
        let this_node = summary.self_info.as_ref().unwrap();
        for (j, finger) in summary.fingers.iter().enumerate() {
            let expected = responsible_for(finger.id, &ids, &summaries);
            if expected != finger.address {
                println!(
                    "MISMATCH: node {} ({}) finger[{}] points to {} but {} is actually responsible for {}",
                    this_node.id, this_node.address, j, finger.address, expected, finger.id
                );
                ok = false;
            }
        }
    }

    if ok {
        println!("cluster looks consistent across {n} nodes");
    } else {
        println!("cluster has inconsistencies, see above");
        std::process::exit(1);
    }
}

fn responsible_for(id: u64, ids: &[u64], summaries: &[NodeSummaryMsg]) -> String {
    let n = ids.len();
    if n == 1 {
        return summaries[0].self_info.as_ref().unwrap().address.clone();
    }
    for i in 0..n {
        let lower = ids[(i + n - 1) % n];
        let upper = ids[i];
        if is_between(id, lower, upper, false, true) {
            return summaries[i].self_info.as_ref().unwrap().address.clone();
        }
    }
    summaries[0].self_info.as_ref().unwrap().address.clone()
}
