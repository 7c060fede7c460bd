#[cfg(test)]
pub mod mock;
mod ytdlp;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
  format::{ContainerKind, FormatChain},
  Result,
};

pub use ytdlp::Ytdlp;

/// Metadata reported by the engine for a media URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
  pub title: Option<String>,
  pub thumbnail: Option<String>,
  pub duration: Option<f64>,
  pub uploader: Option<String>,
  /// Heights of every stream that carries video.
  pub heights: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub url: String,
  pub chain: FormatChain,
  /// Destination path containing a `%(ext)s` placeholder.
  pub output_template: PathBuf,
  pub kind: ContainerKind,
}

#[async_trait]
pub trait ExtractionEngine: Send + Sync {
  async fn probe(&self, url: &str) -> Result<MediaInfo>;

  /// Downloads the media and returns the path the engine says it wrote, if
  /// it said anything at all.
  async fn fetch(&self, request: &FetchRequest) -> Result<Option<PathBuf>>;
}
