use std::{
  io,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use futures::{stream, Stream};
use tracing::{debug, info, warn};

use crate::Result;

/// Extensions probed, in order, when the engine's output is not where it
/// was expected.
pub const KNOWN_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mkv", "mp3", "m4a"];

/// What a call to [`ArtifactStore::remove`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
  Deleted,
  Absent,
  Failed,
}

/// The ephemeral download directory. The directory listing is the only
/// record of which artifacts exist.
#[derive(Debug)]
pub struct ArtifactStore {
  base_dir: PathBuf,
}

impl ArtifactStore {
  pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
    let base_dir = base_dir.as_ref().to_owned();
    std::fs::create_dir_all(&base_dir)?;
    info!(dir = %base_dir.display(), "artifact store ready");
    Ok(Self { base_dir })
  }

  /// Recreates the directory if something removed it from under us.
  pub async fn ensure_dir(&self) -> Result<()> {
    tokio::fs::create_dir_all(&self.base_dir).await?;
    Ok(())
  }

  pub fn path_for(&self, name: &str, ext: &str) -> PathBuf {
    self.base_dir.join(format!("{name}.{ext}"))
  }

  /// Output template handed to the engine, which fills in `%(ext)s`.
  pub fn output_template(&self, name: &str) -> PathBuf {
    self.base_dir.join(format!("{name}.%(ext)s"))
  }

  pub async fn exists(&self, path: &Path) -> bool {
    tokio::fs::metadata(path)
      .await
      .map(|m| m.is_file())
      .unwrap_or(false)
  }

  /// Time since the artifact was last modified. Fails with `NotFound` if it
  /// is already gone.
  pub async fn age(&self, path: &Path) -> io::Result<Duration> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    // mtime in the future counts as brand new
    Ok(
      SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO),
    )
  }

  /// Finds the artifact for `name`, trying `preferred` first and then every
  /// known extension.
  pub async fn locate(&self, name: &str, preferred: &str) -> Option<PathBuf> {
    let candidates = std::iter::once(preferred)
      .chain(KNOWN_EXTENSIONS.into_iter().filter(|ext| *ext != preferred));

    for ext in candidates {
      let path = self.path_for(name, ext);
      if self.exists(&path).await {
        return Some(path);
      }
    }
    None
  }

  /// Deletes an artifact. Missing files count as already deleted and any
  /// other failure is logged rather than returned.
  pub async fn remove(&self, path: &Path) -> Removal {
    match tokio::fs::remove_file(path).await {
      Ok(()) => {
        info!(path = %path.display(), "deleted artifact");
        Removal::Deleted
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "artifact already gone");
        Removal::Absent
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete artifact");
        Removal::Failed
      }
    }
  }

  /// Lazily lists the regular files in the store. Entries that vanish or
  /// cannot be read mid-listing are skipped.
  pub async fn list_all(&self) -> io::Result<impl Stream<Item = PathBuf>> {
    let read_dir = tokio::fs::read_dir(&self.base_dir).await?;

    Ok(stream::unfold(read_dir, |mut read_dir| async move {
      loop {
        match read_dir.next_entry().await {
          Ok(Some(entry)) => match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {
              return Some((entry.path(), read_dir));
            }
            Ok(_) => continue,
            Err(e) => {
              debug!(path = %entry.path().display(), error = %e, "skipping entry");
              continue;
            }
          },
          Ok(None) => return None,
          Err(e) => {
            warn!(error = %e, "directory listing interrupted");
            return None;
          }
        }
      }
    }))
  }
}
