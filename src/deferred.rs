use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::artifact_store::{ArtifactStore, Removal};

/// Deletes served artifacts once their transfer has had time to finish.
#[derive(Clone)]
pub struct DeferredDeletion {
  store: Arc<ArtifactStore>,
  delay: Duration,
}

impl DeferredDeletion {
  pub fn new(store: Arc<ArtifactStore>, delay: Duration) -> Self {
    Self { store, delay }
  }

  /// Removes `path` once, `delay` from now. The task outlives the request
  /// that scheduled it and cannot be cancelled; callers are free to drop
  /// the handle.
  pub fn schedule(&self, path: PathBuf) -> JoinHandle<Removal> {
    let store = self.store.clone();
    let delay = self.delay;
    debug!(path = %path.display(), delay_secs = delay.as_secs(), "deletion scheduled");

    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      store.remove(&path).await
    })
  }
}
