//! Nexus gateway entry point.
//!
//! Loads the bootstrap configuration (see [`nexus_gateway::config`]), seeds
//! the in-memory discovery registry and rule store from it, and serves until
//! Ctrl-C or SIGTERM.

use anyhow::Context;
use nexus_gateway::config::BootstrapConfig;
use nexus_gateway::discovery::InMemoryDiscovery;
use nexus_gateway::rule_store::InMemoryRuleStore;
use nexus_gateway::server::GatewayServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nexus_gateway=info")),
        )
        .init();

    let bootstrap = BootstrapConfig::from_env().context("loading gateway configuration")?;
    info!(
        services = bootstrap.services.len(),
        rules = bootstrap.rate_limits.len(),
        port = bootstrap.gateway.server.port,
        "configuration loaded"
    );

    let discovery = InMemoryDiscovery::from_instances(bootstrap.services);
    let rules = InMemoryRuleStore::from_rules(bootstrap.rate_limits)
        .context("invalid rate-limit rule in configuration")?;

    let server = GatewayServer::new(bootstrap.gateway, Arc::new(discovery), Arc::new(rules))
        .context("building gateway")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    server.serve(shutdown).await.context("serving gateway")?;
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
