use clap::Parser;
use cluster_registry::config::RegistryConfig;
use cluster_registry::membership::service::MembershipService;
use cluster_registry::registry::ClusterRegistry;
use cluster_registry::registry::handlers::router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Clustered service registry node.
///
/// Registry state lives in a process-local `MemoryStore`. Nodes of a multi-node
/// deployment only see each other's descriptors through a shared `TransactionalStore`
/// passed to `ClusterRegistryBuilder::store`.
#[derive(Debug, Parser)]
#[command(name = "cluster-registry", version)]
struct Args {
    /// UDP address for gossip membership.
    #[arg(long)]
    gossip: SocketAddr,

    /// TCP address for the HTTP surface (registry admin + /health).
    #[arg(long)]
    http: SocketAddr,

    /// Gossip address of an existing member. Repeatable.
    #[arg(long = "seed")]
    seeds: Vec<SocketAddr>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            RegistryConfig::from_file(path)?
        }
        None => RegistryConfig::default(),
    };

    tracing::info!("Starting node: gossip={} http={}", args.gossip, args.http);
    if !args.seeds.is_empty() {
        tracing::info!("Seed nodes: {:?}", args.seeds);
    } else {
        tracing::info!("Starting as seed node (founder)");
    }

    // 1. Membership (UDP gossip):
    let membership = MembershipService::new(args.gossip, args.http, args.seeds.clone()).await?;
    tracing::info!(
        "Node ID: {:?} (consistent id {})",
        membership.local_node.id,
        membership.local_node.consistent_id
    );
    tokio::spawn(membership.clone().start());

    // 2. Registry chain, heartbeat and background loops (process-local store):
    let registry = ClusterRegistry::builder(config)
        .cluster(membership.clone())
        .start()
        .await?;

    // 3. Stats reporter:
    let stats_membership = membership.clone();
    let stats_registry = registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            let alive = stats_membership.get_alive_members();
            tracing::info!(
                "Cluster stats: {} alive nodes, {} tracked descriptors, {} pending registrations",
                alive.len(),
                stats_registry.tracked().len(),
                stats_registry.fallback().pending_registrations().len()
            );
        }
    });

    // 4. HTTP server, then flip readiness:
    let listener = tokio::net::TcpListener::bind(args.http).await?;
    tracing::info!("HTTP server listening on {}", args.http);
    registry.readiness().turn_on();
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, router(registry.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    // 5. Withdraw local endpoints before stopping background work:
    registry.readiness().turn_off();
    if let Err(e) = registry.unavailable(None).await {
        tracing::warn!("Failed to withdraw local descriptors: {}", e);
    }
    registry.shutdown();

    Ok(())
}
