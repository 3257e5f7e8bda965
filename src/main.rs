use std::sync::Arc;

use clap::Parser;
use log::{info, LevelFilter};
use tonic::transport::Server;

use ringsocial::cli::Cli;
use ringsocial::clock::Clock;
use ringsocial::config::Config;
use ringsocial::node::{NodeCore, NodeInfo};
use ringsocial::proto::chord_server::ChordServer;
use ringsocial::proto::FILE_DESCRIPTOR_SET;
use ringsocial::service::RingService;
use ringsocial::store::LocalStore;
use ringsocial::{discoverer, replicator, stabilizer, timer, web};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let config = Config::load(args.config.as_ref());
    let self_info = NodeInfo::from_address(&args.address, config.m_bits);
    let store = Arc::new(LocalStore::new(config.store_path.clone()));
    let clock = Arc::new(Clock::new());

    info!("starting node {} at {}", self_info.id, self_info.address);
    let core = NodeCore::new(self_info, config, args.dev_mode, store, clock);

    if let Some(peer) = &args.peer {
        join_via(&core, peer).await;
    } else {
        core.set_successor(core.self_info.clone());
    }

    let mut handles = Vec::new();

    let grpc_core = core.clone();
    let grpc_address = args.address.clone();
    handles.push(tokio::spawn(async move {
        let service = ChordServer::new(RingService::new(grpc_core));
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build()
            .expect("failed to build reflection service");

        info!("gRPC service listening on {grpc_address}");
        Server::builder()
            .add_service(service)
            .add_service(reflection)
            .serve(grpc_address.parse().expect("invalid --address"))
            .await
            .expect("gRPC server failed");
    }));

    handles.push(tokio::spawn(stabilizer::run(core.clone())));
    handles.push(tokio::spawn(replicator::run(core.clone())));
    handles.push(tokio::spawn(discoverer::run(core.clone())));
    handles.push(tokio::spawn(timer::run(core.clone())));

    if args.dev_mode {
        let web_core = core.clone();
        let web_address = args.web_address.clone();
        info!("dev_mode enabled, starting debug dashboard on {web_address}");
        handles.push(tokio::spawn(async move {
            web::serve(web_core, web_address)
                .await
                .expect("debug dashboard failed");
        }));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}

async fn join_via(core: &Arc<NodeCore>, peer: &str) {
    match ringsocial::rpc_client::connect_with_retry(peer, &core.config, 5).await {
        Ok(mut client) => {
            match client
                .find_successor(ringsocial::proto::IdMsg { id: core.id() })
                .await
            {
                Ok(resp) => {
                    let successor: NodeInfo = resp.into_inner().into();
                    info!("joined ring via {peer}, successor is {}", successor.address);
                    core.set_successor(successor);
                }
                Err(e) => {
                    log::warn!("find_successor via {peer} failed ({e}), starting a new ring instead");
                    core.set_successor(core.self_info.clone());
                }
            }
        }
        Err(e) => {
            log::warn!("could not reach peer {peer} ({e}), starting a new ring instead");
            core.set_successor(core.self_info.clone());
        }
    }
}
