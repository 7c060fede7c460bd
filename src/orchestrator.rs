use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  artifact_store::ArtifactStore,
  extractor::{ExtractionEngine, FetchRequest},
  format::{quality_options, resolve, CapPolicy, ContainerKind, Quality, QualityOption},
  sweeper::Sweeper,
  util::{sanitize_or_fallback, FALLBACK_NAME},
  Error, Result,
};

/// A validated download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
  pub url: String,
  pub kind: ContainerKind,
  pub quality: Quality,
}

impl DownloadRequest {
  pub fn parse(
    url: &str,
    format: Option<&str>,
    resolution: Option<&str>,
  ) -> Result<Self> {
    Ok(Self {
      url: validate_url(url)?,
      kind: format.unwrap_or("mp4").parse()?,
      quality: resolution.unwrap_or("best").parse()?,
    })
  }
}

pub fn validate_url(url: &str) -> Result<String> {
  let url = url.trim();
  if url.is_empty() {
    return Err(Error::Validation("URL must not be empty".into()));
  }
  Ok(url.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
  pub title: String,
  pub thumbnail: String,
  pub duration: f64,
  pub uploader: String,
  pub formats: Vec<QualityOption>,
}

/// A finished download sitting in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub path: PathBuf,
  pub filename: String,
}

pub struct Orchestrator {
  engine: Arc<dyn ExtractionEngine>,
  store: Arc<ArtifactStore>,
  sweeper: Arc<Sweeper>,
  policy: CapPolicy,
  sweep_before_fetch: bool,
}

impl Orchestrator {
  pub fn new(
    engine: Arc<dyn ExtractionEngine>,
    store: Arc<ArtifactStore>,
    sweeper: Arc<Sweeper>,
    policy: CapPolicy,
    sweep_before_fetch: bool,
  ) -> Self {
    Self {
      engine,
      store,
      sweeper,
      policy,
      sweep_before_fetch,
    }
  }

  pub async fn info(&self, url: &str) -> Result<VideoInfo> {
    let url = validate_url(url)?;
    let info = self.engine.probe(&url).await?;

    Ok(VideoInfo {
      title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
      thumbnail: info.thumbnail.unwrap_or_default(),
      duration: info.duration.unwrap_or_default(),
      uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
      formats: quality_options(&info.heights),
    })
  }

  pub async fn download(&self, request: &DownloadRequest) -> Result<Artifact> {
    if self.sweep_before_fetch {
      if let Some(Err(e)) = self.sweeper.try_sweep().await {
        warn!(error = %e, "pre-download sweep failed");
      }
    }
    if let Err(e) = self.store.ensure_dir().await {
      warn!(error = %e, "cannot create download directory");
    }

    let info = self.engine.probe(&request.url).await?;
    let name =
      sanitize_or_fallback(info.title.as_deref().unwrap_or(FALLBACK_NAME));
    let chain = resolve(request.quality, request.kind, self.policy);

    let fetch = FetchRequest {
      url: request.url.clone(),
      chain,
      output_template: self.store.output_template(&name),
      kind: request.kind,
    };
    let reported = self.engine.fetch(&fetch).await?;

    let reported = match reported {
      Some(path) => self.store.exists(&path).await.then_some(path),
      None => None,
    };
    let path = match reported {
      Some(path) => path,
      None => self
        .store
        .locate(&name, request.kind.extension())
        .await
        .ok_or_else(|| Error::NotFoundAfterFetch(name.clone()))?,
    };

    let filename = path
      .file_name()
      .map(|f| f.to_string_lossy().into_owned())
      .unwrap_or_else(|| format!("{name}.{}", request.kind.extension()));
    info!(path = %path.display(), "download ready");

    Ok(Artifact { path, filename })
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{
    deferred::DeferredDeletion,
    extractor::mock::{MockEngine, MockStream},
  };

  struct Fixture {
    _tmp: tempfile::TempDir,
    store: Arc<ArtifactStore>,
    engine: Arc<MockEngine>,
    orchestrator: Orchestrator,
  }

  fn fixture(engine: MockEngine, policy: CapPolicy) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(ArtifactStore::new(tmp.path()).unwrap());
    let sweeper = Arc::new(Sweeper::new(
      store.clone(),
      Duration::from_secs(60),
      Duration::from_secs(600),
    ));
    let engine = Arc::new(engine);
    let orchestrator =
      Orchestrator::new(engine.clone(), store.clone(), sweeper, policy, true);
    Fixture {
      _tmp: tmp,
      store,
      engine,
      orchestrator,
    }
  }

  fn ladder_streams() -> Vec<MockStream> {
    vec![
      MockStream::video_only(1080, "mp4"),
      MockStream::video_only(720, "mp4"),
      MockStream::video_only(480, "webm"),
      MockStream::audio_only("m4a"),
      MockStream::muxed(360, "mp4"),
    ]
  }

  fn request(format: &str, resolution: &str) -> DownloadRequest {
    DownloadRequest::parse("https://example.com/v/1", Some(format), Some(resolution))
      .unwrap()
  }

  #[test]
  fn test_parse_request() {
    let req = DownloadRequest::parse("  https://a.b/c ", None, None).unwrap();
    assert_eq!(req.url, "https://a.b/c");
    assert_eq!(req.kind, ContainerKind::Video);
    assert_eq!(req.quality, Quality::Best);

    assert!(matches!(
      DownloadRequest::parse("   ", None, None),
      Err(Error::Validation(_))
    ));
    assert!(matches!(
      DownloadRequest::parse("https://a.b/c", None, Some("tall")),
      Err(Error::Validation(_))
    ));
  }

  #[tokio::test]
  async fn test_720p_selects_720_stream() {
    let f = fixture(MockEngine::new("Clip", ladder_streams()), CapPolicy::Strict);

    let artifact = f.orchestrator.download(&request("mp4", "720p")).await.unwrap();

    let selection = f.engine.last_selection().unwrap();
    assert_eq!(selection.height, Some(720));
    assert!(selection.criterion.contains("[height<=720]"));
    assert_eq!(artifact.path, f.store.path_for("Clip", "mp4"));
    assert_eq!(artifact.filename, "Clip.mp4");
  }

  #[tokio::test]
  async fn test_strict_cap_degrades_instead_of_exceeding() {
    let streams = vec![MockStream::muxed(1080, "mp4"), MockStream::muxed(720, "mp4")];
    let f = fixture(MockEngine::new("Tall only", streams.clone()), CapPolicy::Strict);
    f.orchestrator.download(&request("mp4", "480p")).await.unwrap();
    assert_eq!(f.engine.last_selection().unwrap().height, Some(720));

    let f = fixture(MockEngine::new("Tall only", streams), CapPolicy::BestEffort);
    f.orchestrator.download(&request("mp4", "480p")).await.unwrap();
    assert_eq!(f.engine.last_selection().unwrap().height, Some(1080));
  }

  #[tokio::test]
  async fn test_capped_selection_never_exceeds_when_possible() {
    let f = fixture(MockEngine::new("Clip", ladder_streams()), CapPolicy::Strict);

    for height in [144u32, 360, 480, 720, 1080, 2160] {
      f.orchestrator
        .download(&request("mp4", &format!("{height}p")))
        .await
        .unwrap();
      let chosen = f.engine.last_selection().unwrap().height.unwrap();
      if height >= 360 {
        assert!(chosen <= height, "{chosen} chosen for {height}p");
      }
    }
  }

  #[tokio::test]
  async fn test_audio_download() {
    let f = fixture(MockEngine::new("Song", ladder_streams()), CapPolicy::Strict);

    let artifact = f.orchestrator.download(&request("mp3", "1080p")).await.unwrap();

    assert_eq!(f.engine.last_selection().unwrap().criterion, "bestaudio");
    assert_eq!(artifact.filename, "Song.mp3");
  }

  #[tokio::test]
  async fn test_title_is_sanitized() {
    let f = fixture(
      MockEngine::new("What? <Live/Remix>", ladder_streams()),
      CapPolicy::Strict,
    );
    let artifact = f.orchestrator.download(&request("mp4", "best")).await.unwrap();
    assert_eq!(artifact.filename, "What LiveRemix.mp4");

    let mut engine = MockEngine::new("", ladder_streams());
    engine.title = None;
    let f = fixture(engine, CapPolicy::Strict);
    let artifact = f.orchestrator.download(&request("mp4", "best")).await.unwrap();
    assert_eq!(artifact.filename, "video.mp4");
  }

  #[tokio::test]
  async fn test_falls_back_to_other_extensions() {
    let mut engine = MockEngine::new("Clip", ladder_streams());
    engine.output_ext = Some("webm");
    engine.report_path = false;
    let f = fixture(engine, CapPolicy::Strict);

    let artifact = f.orchestrator.download(&request("mp4", "best")).await.unwrap();
    assert_eq!(artifact.path, f.store.path_for("Clip", "webm"));
  }

  #[tokio::test]
  async fn test_missing_output_is_not_found_after_fetch() {
    let mut engine = MockEngine::new("Ghost", ladder_streams());
    engine.output_ext = None;
    let f = fixture(engine, CapPolicy::Strict);

    let err = f.orchestrator.download(&request("mp4", "best")).await.unwrap_err();
    assert!(matches!(err, Error::NotFoundAfterFetch(name) if name == "Ghost"));
  }

  #[tokio::test]
  async fn test_engine_failure_is_extraction_error() {
    let f = fixture(MockEngine::failing("Private video"), CapPolicy::Strict);

    let err = f.orchestrator.download(&request("mp4", "best")).await.unwrap_err();
    assert!(matches!(err, Error::Extraction(msg) if msg == "Private video"));

    let err = f.orchestrator.info("https://example.com").await.unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
  }

  #[tokio::test]
  async fn test_info() {
    let f = fixture(MockEngine::new("Clip", ladder_streams()), CapPolicy::Strict);

    let info = f.orchestrator.info("https://example.com/v/1").await.unwrap();
    assert_eq!(info.title, "Clip");
    let ids: Vec<_> = info.formats.iter().map(|o| o.format_id.as_str()).collect();
    assert_eq!(ids, ["1080p", "720p", "480p", "360p"]);

    assert!(matches!(
      f.orchestrator.info("").await,
      Err(Error::Validation(_))
    ));
  }

  #[tokio::test]
  async fn test_same_title_requests_share_a_path() {
    let f = fixture(MockEngine::new("Same", ladder_streams()), CapPolicy::Strict);
    let deferred = DeferredDeletion::new(f.store.clone(), Duration::from_millis(200));

    let first = f.orchestrator.download(&request("mp4", "720p")).await.unwrap();
    let first_delete = deferred.schedule(first.path.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = f.orchestrator.download(&request("mp4", "480p")).await.unwrap();
    let second_delete = deferred.schedule(second.path.clone());

    assert_eq!(first.path, second.path);
    first_delete.await.unwrap();
    second_delete.await.unwrap();
    assert!(!f.store.exists(&first.path).await);
  }
}
