use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::{format::CapPolicy, Error, Result};

/// Where the service is running, detected from the host's environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
  Local,
  /// Hugging Face Spaces container, detected by `SPACE_ID`.
  Spaces,
  /// Render.com, detected by `RENDER`.
  Render,
}

impl Deployment {
  fn detect(lookup: &impl Fn(&str) -> Option<String>) -> Self {
    if lookup("SPACE_ID").is_some() {
      Deployment::Spaces
    } else if lookup("RENDER").is_some() {
      Deployment::Render
    } else {
      Deployment::Local
    }
  }

  pub fn is_hosted(self) -> bool {
    self != Deployment::Local
  }

  fn default_download_dir(self) -> PathBuf {
    match self {
      Deployment::Spaces => PathBuf::from("/app/downloads"),
      Deployment::Render => PathBuf::from("/tmp/downloads"),
      Deployment::Local => PathBuf::from("downloads"),
    }
  }

  fn default_ffmpeg(self) -> Option<PathBuf> {
    self.is_hosted().then(|| PathBuf::from("/usr/bin/ffmpeg"))
  }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub program: PathBuf,
  pub ffmpeg_location: Option<PathBuf>,
  pub proxy: Option<String>,
  pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
  pub deployment: Deployment,
  pub bind_addr: SocketAddr,
  pub download_dir: PathBuf,
  pub sweep_interval: Duration,
  pub retention: Duration,
  pub delete_delay: Duration,
  /// Schedule deletion of every artifact right after it is served.
  pub ephemeral: bool,
  pub format_policy: CapPolicy,
  pub sweep_before_fetch: bool,
  pub engine: EngineConfig,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Builds the configuration from any key/value source. Empty values
  /// count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let deployment = Deployment::detect(&get);

    let bind_addr = match get("BIND_ADDR") {
      Some(addr) => parse("BIND_ADDR", &addr)?,
      None => {
        let port: u16 = get("PORT")
          .map(|p| parse("PORT", &p))
          .transpose()?
          .unwrap_or(8080);
        SocketAddr::from(([0, 0, 0, 0], port))
      }
    };

    let config = Self {
      deployment,
      bind_addr,
      download_dir: get("DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| deployment.default_download_dir()),
      sweep_interval: seconds(&get, "SWEEP_INTERVAL_SECS", 60)?,
      retention: seconds(&get, "RETENTION_SECS", 600)?,
      delete_delay: seconds(&get, "DELETE_DELAY_SECS", 60)?,
      ephemeral: get("EPHEMERAL_STORAGE")
        .map(|v| flag("EPHEMERAL_STORAGE", &v))
        .transpose()?
        .unwrap_or(deployment.is_hosted()),
      format_policy: get("FORMAT_POLICY")
        .map(|v| v.parse())
        .transpose()?
        .unwrap_or_default(),
      sweep_before_fetch: get("SWEEP_BEFORE_FETCH")
        .map(|v| flag("SWEEP_BEFORE_FETCH", &v))
        .transpose()?
        .unwrap_or(true),
      engine: EngineConfig {
        program: get("YTDLP_PATH")
          .map(PathBuf::from)
          .unwrap_or_else(|| PathBuf::from("yt-dlp")),
        ffmpeg_location: get("FFMPEG_PATH")
          .map(PathBuf::from)
          .or_else(|| deployment.default_ffmpeg()),
        proxy: get("YTDLP_PROXY"),
        concurrency: get("YTDLP_CONCURRENCY")
          .map(|v| parse("YTDLP_CONCURRENCY", &v))
          .transpose()?
          .unwrap_or(1),
      },
    };

    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.sweep_interval.is_zero() {
      return Err(Error::Config("sweep interval must be positive".into()));
    }
    if self.engine.concurrency == 0 {
      return Err(Error::Config("YTDLP_CONCURRENCY must be positive".into()));
    }
    // otherwise the sweeper could remove an artifact still being served
    if self.retention < self.delete_delay {
      return Err(Error::Config(format!(
        "retention ({}s) must not be shorter than the deletion delay ({}s)",
        self.retention.as_secs(),
        self.delete_delay.as_secs()
      )));
    }
    Ok(())
  }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  value
    .trim()
    .parse()
    .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}

fn seconds(
  get: &impl Fn(&str) -> Option<String>,
  key: &str,
  default: u64,
) -> Result<Duration> {
  let secs = match get(key) {
    Some(v) => parse(key, &v)?,
    None => default,
  };
  Ok(Duration::from_secs(secs))
}

fn flag(key: &str, value: &str) -> Result<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(Error::Config(format!("{key}={value:?}: expected a boolean"))),
  }
}
