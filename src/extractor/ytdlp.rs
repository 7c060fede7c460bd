use std::{
  ffi::OsString,
  path::PathBuf,
  process::{Output, Stdio},
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, sync::Semaphore};
use tracing::{debug, info};

use crate::{
  config::EngineConfig, format::ContainerKind, util::redact_proxy, Error,
  Result,
};

use super::{ExtractionEngine, FetchRequest, MediaInfo};

// run yt-dlp command line to probe and download media.
// requires yt-dlp executable to be in PATH unless configured otherwise.
pub struct Ytdlp {
  program: PathBuf,
  ffmpeg_location: Option<PathBuf>,
  proxy: Option<String>,
  // ensure only a limited set of ytdlp processes at a time
  permits: Semaphore,
}

#[derive(Deserialize)]
struct YtdlpInfo {
  title: Option<String>,
  thumbnail: Option<String>,
  duration: Option<f64>,
  uploader: Option<String>,
  #[serde(default)]
  formats: Vec<YtdlpFormat>,
}

#[derive(Deserialize)]
struct YtdlpFormat {
  height: Option<u32>,
  vcodec: Option<String>,
}

impl From<YtdlpInfo> for MediaInfo {
  fn from(info: YtdlpInfo) -> Self {
    let heights = info
      .formats
      .into_iter()
      .filter(|f| f.vcodec.as_deref().is_some_and(|c| c != "none"))
      .filter_map(|f| f.height)
      .filter(|h| *h > 0)
      .collect();

    Self {
      title: info.title,
      thumbnail: info.thumbnail,
      duration: info.duration,
      uploader: info.uploader,
      heights,
    }
  }
}

impl Ytdlp {
  pub fn new(config: &EngineConfig) -> Self {
    if let Some(proxy) = &config.proxy {
      info!(proxy = %redact_proxy(proxy), "yt-dlp will use a proxy");
    }

    Self {
      program: config.program.clone(),
      ffmpeg_location: config.ffmpeg_location.clone(),
      proxy: config.proxy.clone(),
      permits: Semaphore::new(config.concurrency.max(1)),
    }
  }

  fn common_args(&self) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
      "--no-playlist".into(),
      "--no-warnings".into(),
      "--no-color".into(),
      "--geo-bypass".into(),
      "--no-check-certificates".into(),
    ];

    if let Some(ffmpeg) = &self.ffmpeg_location {
      args.push("--ffmpeg-location".into());
      args.push(ffmpeg.into());
    }
    if let Some(proxy) = &self.proxy {
      args.push("--proxy".into());
      args.push(proxy.into());
    }
    args
  }

  fn probe_args(&self, url: &str) -> Vec<OsString> {
    let mut args = self.common_args();
    args.extend(["--dump-single-json", "--skip-download", "--"].map(OsString::from));
    args.push(url.into());
    args
  }

  fn fetch_args(&self, request: &FetchRequest) -> Vec<OsString> {
    let mut args = self.common_args();
    args.push("-f".into());
    args.push(request.chain.selector().into());
    args.push("-o".into());
    args.push(request.output_template.clone().into());

    // the sweeper ages artifacts by mtime, so it must be the download time
    args.push("--no-mtime".into());
    args.push("--no-progress".into());
    args.push("--print".into());
    args.push("after_move:filepath".into());

    match request.kind {
      ContainerKind::Video => {
        args.extend(
          [
            "--merge-output-format",
            "mp4",
            "--remux-video",
            "mp4",
            "--postprocessor-args",
            "ffmpeg:-c:v libx264 -c:a aac -movflags +faststart",
          ]
          .map(OsString::from),
        );
      }
      ContainerKind::Audio => {
        args.extend(
          ["-x", "--audio-format", "mp3", "--audio-quality", "192K"]
            .map(OsString::from),
        );
      }
    }

    args.push("--".into());
    args.push(request.url.clone().into());
    args
  }

  async fn run(&self, args: Vec<OsString>) -> Result<Output> {
    let mut cmd = Command::new(&self.program);
    cmd
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let _guard = self
      .permits
      .acquire()
      .await
      .map_err(|e| Error::Server(e.to_string()))?;
    debug!(program = %self.program.display(), "spawning yt-dlp");

    let output = cmd.output().await.map_err(|e| {
      Error::Extraction(format!("cannot run {}: {e}", self.program.display()))
    })?;

    detect_error(&output)?;
    Ok(output)
  }
}

#[async_trait]
impl ExtractionEngine for Ytdlp {
  async fn probe(&self, url: &str) -> Result<MediaInfo> {
    let output = self.run(self.probe_args(url)).await?;
    parse_info(&output.stdout)
  }

  async fn fetch(&self, request: &FetchRequest) -> Result<Option<PathBuf>> {
    info!(url = %request.url, format = %request.chain, "downloading");
    let output = self.run(self.fetch_args(request)).await?;
    Ok(written_path(&output.stdout))
  }
}

fn parse_info(stdout: &[u8]) -> Result<MediaInfo> {
  let info: YtdlpInfo = serde_json::from_slice(stdout).map_err(|e| {
    Error::Extraction(format!("unreadable metadata from yt-dlp: {e}"))
  })?;
  Ok(info.into())
}

// `--print after_move:filepath` prints the final path as the last line
fn written_path(stdout: &[u8]) -> Option<PathBuf> {
  String::from_utf8_lossy(stdout)
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .last()
    .map(PathBuf::from)
}

fn detect_error(output: &Output) -> Result<()> {
  let stderr = String::from_utf8_lossy(&output.stderr);
  let reported = stderr
    .lines()
    .filter_map(|line| line.split_once("ERROR:"))
    .map(|(_, msg)| msg.trim())
    .next();

  match reported {
    Some(msg) => Err(Error::Extraction(msg.to_string())),
    None if !output.status.success() => Err(Error::Extraction(format!(
      "yt-dlp exited with {}",
      output.status
    ))),
    None => Ok(()),
  }
}
