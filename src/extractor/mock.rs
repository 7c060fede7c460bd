//! In-memory stand-in for the extraction engine. It evaluates format chains
//! against a declared list of streams the way yt-dlp would and writes a
//! small file in place of the real download.

use std::{path::PathBuf, sync::Mutex};

use async_trait::async_trait;

use crate::{
  format::{ContainerKind, Criterion, Pick},
  Error, Result,
};

use super::{ExtractionEngine, FetchRequest, MediaInfo};

#[derive(Debug, Clone, Copy)]
pub struct MockStream {
  pub height: Option<u32>,
  pub ext: &'static str,
  pub video: bool,
  pub audio: bool,
}

impl MockStream {
  pub fn muxed(height: u32, ext: &'static str) -> Self {
    Self {
      height: Some(height),
      ext,
      video: true,
      audio: true,
    }
  }

  pub fn video_only(height: u32, ext: &'static str) -> Self {
    Self {
      height: Some(height),
      ext,
      video: true,
      audio: false,
    }
  }

  pub fn audio_only(ext: &'static str) -> Self {
    Self {
      height: None,
      ext,
      video: false,
      audio: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
  pub criterion: String,
  pub height: Option<u32>,
}

pub struct MockEngine {
  pub title: Option<String>,
  pub streams: Vec<MockStream>,
  pub failure: Option<String>,
  /// Extension of the written file; `None` writes nothing at all.
  pub output_ext: Option<&'static str>,
  pub report_path: bool,
  pub selections: Mutex<Vec<Selection>>,
}

impl MockEngine {
  pub fn new(title: &str, streams: Vec<MockStream>) -> Self {
    Self {
      title: Some(title.to_string()),
      streams,
      failure: None,
      output_ext: Some("mp4"),
      report_path: true,
      selections: Mutex::new(Vec::new()),
    }
  }

  pub fn failing(message: &str) -> Self {
    Self {
      failure: Some(message.to_string()),
      ..Self::new("unused", vec![])
    }
  }

  pub fn last_selection(&self) -> Option<Selection> {
    self.selections.lock().unwrap().last().cloned()
  }

  fn evaluate(&self, criterion: &Criterion) -> Option<Option<u32>> {
    let under = |s: &&MockStream, cap: Option<u32>| match (cap, s.height) {
      (Some(cap), Some(h)) => h <= cap,
      (Some(_), None) => false,
      (None, _) => true,
    };
    let ext_ok = |s: &&MockStream, ext: Option<&str>| ext.map_or(true, |e| s.ext == e);

    match criterion {
      Criterion::Audio => self
        .streams
        .iter()
        .find(|s| s.audio && !s.video)
        .map(|_| None),
      Criterion::Muxed {
        pick,
        max_height,
        ext,
      } => {
        let candidates = self
          .streams
          .iter()
          .filter(|s| s.video && s.audio)
          .filter(|s| under(s, *max_height) && ext_ok(s, *ext));
        let chosen = match pick {
          Pick::Best => candidates.max_by_key(|s| s.height),
          Pick::Worst => candidates.min_by_key(|s| s.height),
        };
        chosen.map(|s| s.height)
      }
      Criterion::Split {
        max_height,
        video_ext,
        audio_ext,
      } => {
        let video = self
          .streams
          .iter()
          .filter(|s| s.video && !s.audio)
          .filter(|s| under(s, *max_height) && ext_ok(s, *video_ext))
          .max_by_key(|s| s.height)?;
        self
          .streams
          .iter()
          .find(|s| s.audio && !s.video && ext_ok(s, *audio_ext))?;
        Some(video.height)
      }
    }
  }
}

#[async_trait]
impl ExtractionEngine for MockEngine {
  async fn probe(&self, _url: &str) -> Result<MediaInfo> {
    if let Some(msg) = &self.failure {
      return Err(Error::Extraction(msg.clone()));
    }

    Ok(MediaInfo {
      title: self.title.clone(),
      thumbnail: Some("https://img.example/thumb.jpg".to_string()),
      duration: Some(63.0),
      uploader: Some("uploader".to_string()),
      heights: self.streams.iter().filter(|s| s.video).filter_map(|s| s.height).collect(),
    })
  }

  async fn fetch(&self, request: &FetchRequest) -> Result<Option<PathBuf>> {
    if let Some(msg) = &self.failure {
      return Err(Error::Extraction(msg.clone()));
    }

    let selection = request
      .chain
      .criteria()
      .iter()
      .find_map(|c| {
        self.evaluate(c).map(|height| Selection {
          criterion: c.to_string(),
          height,
        })
      })
      .ok_or_else(|| Error::Extraction("requested format is not available".into()))?;
    self.selections.lock().unwrap().push(selection);

    let Some(ext) = self.output_ext else {
      return Ok(None);
    };
    let ext = match (request.kind, ext) {
      (ContainerKind::Audio, "mp4") => "mp3",
      (_, ext) => ext,
    };

    let template = request.output_template.to_string_lossy();
    let path = PathBuf::from(template.replace("%(ext)s", ext));
    tokio::fs::write(&path, b"media").await?;

    Ok(self.report_path.then_some(path))
  }
}
