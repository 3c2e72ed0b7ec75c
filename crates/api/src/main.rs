use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hatchery_observability::init();

    let config = hatchery_api::config::Config::from_env().context("invalid configuration")?;
    let orchestrator =
        hatchery_api::app::services::build_services(&config).context("failed to wire services")?;
    let app = hatchery_api::app::build_app(orchestrator.clone());

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
