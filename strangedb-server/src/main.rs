mod cli;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use strangedb_api::grpc::proto::peer_service_server::PeerServiceServer;
use strangedb_api::{AppState, GrpcPeerClient, PeerServer};
use strangedb_cluster::{
    AntiEntropy, Coordinator, Gossiper, HintStore, HintedHandoff, PeerClientDelivery, ReadRepair, Ring,
};
use strangedb_core::HlcClock;
use strangedb_storage::{RecordStore, SledStore, TombstoneSweeper};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = cli::Cli::parse().into_config();

    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(&config.log_level))
        .with_target(false)
        .init();

    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    info!(node_id = %config.node_id, node_url = %config.node_url, "starting strangedb node");

    let store = Arc::new(SledStore::open(&config.data_dir)?);
    let clock = Arc::new(HlcClock::new(config.node_id.clone()));
    let ring = Arc::new(Ring::new(config.vnodes));
    ring.add_node(&config.node_url);
    if !config.only_gossip_confirmed_seeds {
        for seed in &config.seeds {
            ring.add_node(seed);
        }
    }

    let peer_client = Arc::new(GrpcPeerClient::new(config.rpc_timeout));
    let gossiper = Arc::new(Gossiper::new(
        config.node_url.clone(),
        &config.seeds,
        peer_client.clone(),
        config.gossip_interval,
    ));

    {
        let ring = ring.clone();
        let membership = gossiper.membership();
        gossiper.set_membership_change_callback(move |_alive| {
            for member in membership.all_members() {
                match member.state {
                    strangedb_cluster::NodeState::Alive => ring.add_node(&member.node_url),
                    strangedb_cluster::NodeState::Dead => ring.remove_node(&member.node_url),
                    strangedb_cluster::NodeState::Suspect => {}
                }
            }
        });
    }

    let hints = Arc::new(HintStore::new(config.max_hints, config.hint_ttl));
    let delivery = Arc::new(PeerClientDelivery::new(peer_client.clone()));
    let read_repair = Arc::new(ReadRepair::new(delivery.clone()));

    let coordinator = Arc::new(Coordinator::new(
        config.node_url.clone(),
        store.clone(),
        ring.clone(),
        clock.clone(),
        peer_client.clone(),
        hints.clone(),
        read_repair,
        &config,
    ));

    let hinted_handoff = Arc::new(HintedHandoff::new(
        hints.clone(),
        gossiper.membership(),
        delivery,
        config.hint_replay_interval,
    ));

    let anti_entropy = Arc::new(AntiEntropy::new(
        store.clone(),
        gossiper.membership(),
        peer_client.clone(),
        config.anti_entropy_interval,
    ));

    let tombstone_sweeper = TombstoneSweeper::new(store.clone(), config.tombstone_ttl, config.tombstone_sweep_interval);

    let token = CancellationToken::new();
    let mut background_tasks = gossiper.clone().spawn(token.clone());
    background_tasks.push(hinted_handoff.spawn(token.clone()));
    background_tasks.push(anti_entropy.spawn(token.clone()));
    background_tasks.push(tombstone_sweeper.spawn(token.clone()));

    let http_state = Arc::new(AppState {
        coordinator: coordinator.clone(),
        clock: clock.clone(),
        ring: ring.clone(),
        membership: gossiper.membership(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    });
    let http_router = strangedb_api::router(http_state).route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let http_addr: SocketAddr = config.http_addr.parse()?;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "http api listening");
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, http_router).await.expect("http server failed");
    });

    let grpc_addr: SocketAddr = config.grpc_addr.parse()?;
    let peer_server = PeerServer::new(store.clone(), gossiper.clone());
    info!(addr = %grpc_addr, "peer grpc listening");
    let grpc_token = token.clone();
    let grpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(PeerServiceServer::new(peer_server))
            .serve_with_shutdown(grpc_addr, grpc_token.cancelled())
            .await
            .expect("grpc server failed");
    });

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping background loops");
    token.cancel();

    http_task.abort();
    let _ = grpc_task.await;
    for task in background_tasks {
        let _ = task.await;
    }
    store.close().await?;

    info!("strangedb node stopped");
    Ok(())
}

fn parse_log_level(level: &str) -> tracing::Level {
    level.parse().unwrap_or(tracing::Level::INFO)
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
