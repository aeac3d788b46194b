use std::sync::Arc;

use clap::Parser;
use futures::future::join_all;
use kube::Client;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use unifiedpush_operator::cache::CachedApiProvider;
use unifiedpush_operator::config::Config;
use unifiedpush_operator::controller::ServerContext;
use unifiedpush_operator::controller::ServerReconciler;
use unifiedpush_operator::events::EventRecorder;
use unifiedpush_operator::k8s::K8sRepository;
use unifiedpush_operator::Reconcile;

const COMPONENT: &str = "unifiedpush-operator";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::parse();
    config.validate()?;
    let namespaces: Option<Vec<String>> = config
        .namespaces()
        .map(|namespaces| namespaces.into_iter().map(str::to_owned).collect());
    let limit = config.max_concurrent_reconciles;

    tracing::info!(?namespaces, limit, "Starting UnifiedPush operator");

    let client = Client::try_default().await?;
    let events = EventRecorder::new(Arc::new(CachedApiProvider::new(client.clone())), COMPONENT);
    let context = Arc::new(ServerContext::new(
        Arc::new(K8sRepository::new(client.clone())),
        Arc::new(events),
        Arc::new(config),
    ));

    let mut reconcilers = Vec::new();
    match &namespaces {
        Some(namespaces) => {
            for namespace in namespaces {
                reconcilers.push(ServerReconciler::new(client.clone(), Some(namespace.as_str()), Arc::clone(&context)).await?);
            }
        }
        None => reconcilers.push(ServerReconciler::new(client, None, context).await?),
    }

    join_all(reconcilers.into_iter().map(|reconciler| reconciler.start(Some(limit)))).await;

    tracing::info!("UnifiedPush operator stopped");
    Ok(())
}
