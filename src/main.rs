use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod artifact_store;
mod config;
mod deferred;
mod error;
mod extractor;
mod format;
mod orchestrator;
mod routes;
mod sweeper;
mod util;

use artifact_store::ArtifactStore;
use config::Config;
use deferred::DeferredDeletion;
use extractor::Ytdlp;
use orchestrator::Orchestrator;
use routes::AppState;
use sweeper::Sweeper;

pub use error::{Error, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  let config = Config::from_env()?;
  info!(
    deployment = ?config.deployment,
    dir = %config.download_dir.display(),
    ephemeral = config.ephemeral,
    policy = ?config.format_policy,
    "starting"
  );

  let store = Arc::new(ArtifactStore::new(&config.download_dir)?);
  let sweeper = Arc::new(Sweeper::new(
    store.clone(),
    config.sweep_interval,
    config.retention,
  ));
  let orchestrator = Arc::new(Orchestrator::new(
    Arc::new(Ytdlp::new(&config.engine)),
    store.clone(),
    sweeper.clone(),
    config.format_policy,
    config.sweep_before_fetch,
  ));
  let deferred = config
    .ephemeral
    .then(|| DeferredDeletion::new(store.clone(), config.delete_delay));

  let app = routes::router(AppState {
    orchestrator,
    deferred,
  });
  let addr = config.bind_addr;

  Toplevel::new(move |s: SubsystemHandle| async move {
    s.start(SubsystemBuilder::new("sweeper", move |h| {
      run_sweeper(h, sweeper)
    }));
    s.start(SubsystemBuilder::new("http", move |h| serve(h, addr, app)));
  })
  .catch_signals()
  .handle_shutdown_requests(Duration::from_secs(5))
  .await
  .map_err(|e| Error::Server(e.to_string()))
}

async fn run_sweeper(subsys: SubsystemHandle, sweeper: Arc<Sweeper>) -> Result<()> {
  let cancel = CancellationToken::new();
  tokio::join!(sweeper.run(cancel.clone()), async {
    subsys.on_shutdown_requested().await;
    cancel.cancel();
  });
  Ok(())
}

async fn serve(subsys: SubsystemHandle, addr: SocketAddr, app: Router) -> Result<()> {
  let server = axum::Server::try_bind(&addr)
    .map_err(|e| Error::Server(format!("cannot bind {addr}: {e}")))?;
  info!("Listening on {}", addr);

  server
    .serve(app.into_make_service())
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await
    .map_err(|e| Error::Server(e.to_string()))
}
