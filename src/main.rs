use market_snapshot::{
    logger, AppState, CoinMarketCapProvider, RefreshScheduler, ServiceConfig,
    SqliteSnapshotRepository,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logger::init_tracing(config.log_json);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "market-snapshot exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let provider =
        CoinMarketCapProvider::new(&config.api_url, &config.api_key, config.fetch_timeout)?;
    let mut scheduler = RefreshScheduler::new(Arc::new(provider), (&config).into());

    if let Some(url) = &config.database_url {
        let repository = SqliteSnapshotRepository::connect(url).await?;
        scheduler = scheduler.with_repository(Arc::new(repository));
    }

    let scheduler = Arc::new(scheduler);
    if let Err(e) = scheduler.restore().await {
        tracing::warn!(error = %e, "Could not restore persisted snapshot, starting empty");
    }

    let refresh = scheduler.spawn();

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr.as_str()).await?;
    tracing::info!("market-snapshot listening on http://{addr}");

    let served =
        market_snapshot::server::serve(listener, AppState::new(scheduler), shutdown_signal())
            .await;

    refresh.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
