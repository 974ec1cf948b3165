use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use taskvisor::Subscribe;
use tracing::{error, info};

use kiln_core::{
    CiGateway, IdleReporter, MetricsHandle, NodeRegistry, NoopMetrics, OrphanReaper,
    ProviderRouter, Provisioner, Scheduler,
};
use kiln_jenkins::JenkinsClient;
use kiln_observe::Journal;
use kiln_openstack::OpenStackProvider;
use kiln_prometheus::PrometheusMetrics;

use crate::config::DaemonConfig;

pub fn build_providers(config: &DaemonConfig) -> anyhow::Result<ProviderRouter> {
    let mut router = ProviderRouter::new();
    if let Some(openstack) = &config.providers.openstack {
        let provider = OpenStackProvider::new(openstack.clone())
            .with_context(|| format!("provider {}", openstack.name))?;
        router.register(Arc::new(provider));
    }
    Ok(router)
}

/// Wire the gateways into the three reconcilers and run them until shutdown.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    // 1) Gateways
    let catalog = Arc::new(config.nodes.clone());
    let ci: Arc<dyn CiGateway> =
        Arc::new(JenkinsClient::new(config.jenkins.clone()).context("jenkins client")?);
    let providers = build_providers(&config)?;
    let registry = Arc::new(NodeRegistry::new(providers.clone()).with_policy(config.creation_policy()));
    info!(
        node_types = catalog.len(),
        providers = ?providers.names().collect::<Vec<_>>(),
        "kilnd: gateways ready"
    );

    // 2) Metrics
    let metrics: MetricsHandle = match config.metrics.listen {
        Some(listen) => {
            let prometheus = PrometheusMetrics::new().context("prometheus registry")?;
            tokio::spawn(serve_metrics(listen, prometheus.clone()));
            Arc::new(prometheus)
        }
        None => Arc::new(NoopMetrics),
    };

    // 3) Reconcilers
    let thresholds = config.reconcile();
    let provisioner = Provisioner::new(catalog, ci.clone(), registry.clone())
        .with_metrics(metrics.clone());
    let idle = IdleReporter::new(ci.clone(), registry.clone(), providers.clone(), thresholds)
        .with_metrics(metrics.clone());
    let reaper = OrphanReaper::new(ci, registry, providers, thresholds).with_metrics(metrics);

    let schedule = config.schedule();
    let scheduler = Scheduler::new()
        .with(Arc::new(provisioner), schedule.queue_interval)
        .with(Arc::new(idle), schedule.idle_interval)
        .with(Arc::new(reaper), schedule.orphan_interval);

    // 4) Supervise until SIGINT/SIGTERM
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Journal::from_config(&config.logging))];
    scheduler.run(subscribers).await?;
    info!("kilnd: stopped");
    Ok(())
}

async fn serve_metrics(listen: SocketAddr, metrics: PrometheusMetrics) {
    let app = metrics_router(metrics);
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%listen, error = %e, "metrics: failed to bind");
            return;
        }
    };
    info!(%listen, "metrics: serving /metrics");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "metrics: server stopped");
    }
}

fn metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
