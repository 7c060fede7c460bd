use std::{io, sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact_store::{ArtifactStore, Removal};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  pub examined: usize,
  pub removed: usize,
  pub failed: usize,
}

/// Periodically deletes artifacts older than the retention threshold.
/// Catches whatever the deferred deletions missed: restarts, failed
/// hand-offs, partial downloads.
pub struct Sweeper {
  store: Arc<ArtifactStore>,
  interval: Duration,
  retention: Duration,
  // held for the duration of a sweep so sweeps never overlap
  sweeping: Mutex<()>,
}

impl Sweeper {
  pub fn new(
    store: Arc<ArtifactStore>,
    interval: Duration,
    retention: Duration,
  ) -> Self {
    Self {
      store,
      interval,
      retention,
      sweeping: Mutex::new(()),
    }
  }

  /// One pass over the store, waiting for any sweep already in progress.
  pub async fn sweep(&self) -> io::Result<SweepReport> {
    let _guard = self.sweeping.lock().await;
    self.sweep_locked().await
  }

  /// Sweeps unless another sweep is already running, in which case there
  /// is nothing left for this one to do.
  pub async fn try_sweep(&self) -> Option<io::Result<SweepReport>> {
    let _guard = self.sweeping.try_lock().ok()?;
    Some(self.sweep_locked().await)
  }

  async fn sweep_locked(&self) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut artifacts = Box::pin(self.store.list_all().await?);

    while let Some(path) = artifacts.next().await {
      report.examined += 1;

      let age = match self.store.age(&path).await {
        Ok(age) => age,
        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "cannot read artifact age");
          report.failed += 1;
          continue;
        }
      };

      if age < self.retention {
        continue;
      }

      match self.store.remove(&path).await {
        Removal::Deleted => report.removed += 1,
        Removal::Absent => {}
        Removal::Failed => report.failed += 1,
      }
    }

    Ok(report)
  }

  /// Sleeps for the interval, sweeps, and repeats until `cancel` fires.
  /// An in-flight sweep is abandoned on cancellation.
  pub async fn run(&self, cancel: CancellationToken) {
    info!(
      interval_secs = self.interval.as_secs(),
      retention_secs = self.retention.as_secs(),
      "sweeper started"
    );

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(self.interval) => {}
      }

      tokio::select! {
        _ = cancel.cancelled() => break,
        result = self.sweep() => match result {
          Ok(report) if report.removed > 0 || report.failed > 0 => {
            info!(?report, "sweep finished");
          }
          Ok(report) => debug!(?report, "sweep finished"),
          Err(e) => warn!(error = %e, "sweep skipped, cannot list artifacts"),
        },
      }
    }

    info!("sweeper stopped");
  }
}
