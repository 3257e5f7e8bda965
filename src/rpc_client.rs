//! gRPC client connection helpers shared by every background collaborator
//! that talks to a peer node.

use std::time::Duration;

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::config::Config;
use crate::proto::chord_client::ChordClient;

fn endpoint(address: &str, config: &Config) -> anyhow::Result<Endpoint> {
    let uri = if address.starts_with("http") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let mut endpoint = Endpoint::from_shared(uri)?.timeout(Duration::from_secs(10));

    if config.use_tls {
        let mut tls = ClientTlsConfig::new();
        if let Some(ca) = &config.tls_ca_cert {
            let pem = std::fs::read(ca)?;
            tls = tls.ca_certificate(tonic::transport::Certificate::from_pem(pem));
        }
        endpoint = endpoint.tls_config(tls)?;
    }

    Ok(endpoint)
}

/// Connects once, no retry. Used on the hot path where a failed connect
/// should just be treated as "peer unreachable right now".
pub async fn connect(address: &str, config: &Config) -> anyhow::Result<ChordClient<Channel>> {
    let channel = endpoint(address, config)?.connect().await?;
    Ok(ChordClient::new(channel))
}

/// Connects with a small number of retries and backoff, for use at startup
/// (joining an existing ring) where a peer may not have finished binding its
/// listener yet.
pub async fn connect_with_retry(
    address: &str,
    config: &Config,
    max_attempts: u32,
) -> anyhow::Result<ChordClient<Channel>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect(address, config).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < max_attempts => {
                log::warn!("Connect to {address} failed (attempt {attempt}/{max_attempts}): {e}");
                tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
