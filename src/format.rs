//! Maps a requested quality onto the ordered chain of format selectors the
//! extraction engine evaluates.
//!
//! The engine tries each criterion in order and uses the first one that
//! matches a stream. Capped requests use one of two policies for the last
//! resort: [`CapPolicy::Strict`] degrades to the lowest available stream and
//! [`CapPolicy::BestEffort`] takes the best stream regardless of height.

use std::{collections::BTreeSet, fmt, str::FromStr};

use itertools::Itertools;
use serde::Serialize;

use crate::{Error, Result};

/// Standard resolution ladder, tallest first.
pub const STANDARD_HEIGHTS: [u32; 8] = [2160, 1440, 1080, 720, 480, 360, 240, 144];

const VIDEO_EXT: &str = "mp4";
const AUDIO_EXT: &str = "m4a";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
  Best,
  Height(u32),
}

impl FromStr for Quality {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("best") || s == "Best Quality" {
      return Ok(Quality::Best);
    }

    let digits = s.strip_suffix(['p', 'P']).unwrap_or(s);
    match digits.parse::<u32>() {
      Ok(height) if height > 0 => Ok(Quality::Height(height)),
      _ => Err(Error::Validation(format!("invalid resolution: {s:?}"))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerKind {
  #[default]
  Video,
  Audio,
}

impl ContainerKind {
  /// Extension of the file the engine is asked to produce.
  pub fn extension(self) -> &'static str {
    match self {
      ContainerKind::Video => "mp4",
      ContainerKind::Audio => "mp3",
    }
  }
}

impl FromStr for ContainerKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "mp4" | "video" => Ok(ContainerKind::Video),
      "mp3" | "audio" | "audio-only" => Ok(ContainerKind::Audio),
      other => Err(Error::Validation(format!("unsupported format: {other:?}"))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
  /// Never prefer a stream taller than requested.
  #[default]
  Strict,
  /// Fall back to the best stream even if it exceeds the request.
  BestEffort,
}

impl FromStr for CapPolicy {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "strict" => Ok(CapPolicy::Strict),
      "best-effort" | "best_effort" => Ok(CapPolicy::BestEffort),
      other => Err(Error::Config(format!("unknown format policy: {other:?}"))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
  Best,
  Worst,
}

/// A single selection criterion, rendered in yt-dlp format syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
  /// One stream that already carries video and audio.
  Muxed {
    pick: Pick,
    max_height: Option<u32>,
    ext: Option<&'static str>,
  },
  /// Best video stream merged with the best audio stream.
  Split {
    max_height: Option<u32>,
    video_ext: Option<&'static str>,
    audio_ext: Option<&'static str>,
  },
  /// Best audio-only stream.
  Audio,
}

impl Criterion {
  /// Matches whenever the source has any muxed stream at all.
  pub fn is_universal(&self) -> bool {
    matches!(
      self,
      Criterion::Muxed {
        max_height: None,
        ext: None,
        ..
      }
    )
  }
}

fn write_filters(
  f: &mut fmt::Formatter<'_>,
  max_height: Option<u32>,
  ext: Option<&str>,
) -> fmt::Result {
  if let Some(h) = max_height {
    write!(f, "[height<={h}]")?;
  }
  if let Some(ext) = ext {
    write!(f, "[ext={ext}]")?;
  }
  Ok(())
}

impl fmt::Display for Criterion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Criterion::Muxed {
        pick,
        max_height,
        ext,
      } => {
        let name = match pick {
          Pick::Best => "best",
          Pick::Worst => "worst",
        };
        f.write_str(name)?;
        write_filters(f, *max_height, *ext)
      }
      Criterion::Split {
        max_height,
        video_ext,
        audio_ext,
      } => {
        f.write_str("bestvideo")?;
        write_filters(f, *max_height, *video_ext)?;
        f.write_str("+bestaudio")?;
        write_filters(f, None, *audio_ext)
      }
      Criterion::Audio => f.write_str("bestaudio"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatChain(Vec<Criterion>);

impl FormatChain {
  pub fn criteria(&self) -> &[Criterion] {
    &self.0
  }

  pub fn terminal(&self) -> Option<&Criterion> {
    self.0.last()
  }

  /// The chain as a single `-f` argument.
  pub fn selector(&self) -> String {
    self.0.iter().join("/")
  }
}

impl fmt::Display for FormatChain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.selector())
  }
}

pub fn resolve(
  quality: Quality,
  kind: ContainerKind,
  policy: CapPolicy,
) -> FormatChain {
  use Criterion::*;

  if kind == ContainerKind::Audio {
    return FormatChain(vec![Audio]);
  }

  let chain = match quality {
    Quality::Best => vec![
      Muxed {
        pick: Pick::Best,
        max_height: None,
        ext: Some(VIDEO_EXT),
      },
      Split {
        max_height: None,
        video_ext: Some(VIDEO_EXT),
        audio_ext: Some(AUDIO_EXT),
      },
      Split {
        max_height: None,
        video_ext: None,
        audio_ext: None,
      },
      Muxed {
        pick: Pick::Best,
        max_height: None,
        ext: None,
      },
    ],
    Quality::Height(h) => {
      let last_resort = match policy {
        CapPolicy::Strict => Pick::Worst,
        CapPolicy::BestEffort => Pick::Best,
      };

      vec![
        Split {
          max_height: Some(h),
          video_ext: Some(VIDEO_EXT),
          audio_ext: Some(AUDIO_EXT),
        },
        Split {
          max_height: Some(h),
          video_ext: None,
          audio_ext: None,
        },
        Muxed {
          pick: Pick::Best,
          max_height: Some(h),
          ext: Some(VIDEO_EXT),
        },
        Muxed {
          pick: Pick::Best,
          max_height: Some(h),
          ext: None,
        },
        Muxed {
          pick: last_resort,
          max_height: None,
          ext: None,
        },
      ]
    }
  };

  let chain = FormatChain(chain);
  debug_assert!(chain.terminal().is_some_and(Criterion::is_universal));
  chain
}

/// Rounds a probed height down to the nearest rung of the ladder.
/// Anything shorter than the lowest rung counts as the lowest rung.
pub fn normalize_height(height: u32) -> u32 {
  STANDARD_HEIGHTS
    .iter()
    .copied()
    .find(|&rung| height >= rung)
    .unwrap_or(144)
}

fn tier_note(height: u32) -> &'static str {
  match height {
    2160.. => "4K Ultra HD",
    1440.. => "2K QHD",
    1080.. => "Full HD",
    720.. => "HD",
    480.. => "SD",
    _ => "Low",
  }
}

/// A quality tier offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityOption {
  pub format_id: String,
  pub resolution: String,
  pub height: u32,
  pub ext: &'static str,
  pub note: &'static str,
  // not known per tier, always zero or empty
  pub filesize: u64,
  pub filesize_mb: u64,
  pub fps: &'static str,
  pub vcodec: &'static str,
}

impl QualityOption {
  fn placeholder() -> Self {
    Self {
      format_id: String::new(),
      resolution: String::new(),
      height: 0,
      ext: VIDEO_EXT,
      note: "",
      filesize: 0,
      filesize_mb: 0,
      fps: "",
      vcodec: "",
    }
  }
}

/// Offered tiers for a set of probed heights, tallest first. Sources that
/// report no heights get a single "best" entry.
pub fn quality_options(heights: &[u32]) -> Vec<QualityOption> {
  let tiers: BTreeSet<u32> = heights
    .iter()
    .filter(|&&h| h > 0)
    .map(|&h| normalize_height(h))
    .collect();

  if tiers.is_empty() {
    return vec![QualityOption {
      format_id: "best".to_string(),
      resolution: "Best Quality".to_string(),
      height: 9999,
      ext: VIDEO_EXT,
      note: "Auto",
      ..QualityOption::placeholder()
    }];
  }

  tiers
    .into_iter()
    .rev()
    .map(|height| QualityOption {
      format_id: format!("{height}p"),
      resolution: format!("{height}p"),
      height,
      ext: VIDEO_EXT,
      note: tier_note(height),
      ..QualityOption::placeholder()
    })
    .collect()
}
