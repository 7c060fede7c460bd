use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

mod sanitize;

pub use sanitize::{sanitize_filename, sanitize_or_fallback, FALLBACK_NAME};

// used to remove cred info from proxy url before printing
static AUTH_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"//[^:/]+(:[^@]+)?@").unwrap());

pub fn redact_proxy(proxy: &str) -> String {
  AUTH_REGEX.replace(proxy, "//<REDACTED>@").into_owned()
}

pub fn mime_type_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());

  match ext.as_deref() {
    Some("mp4") => "video/mp4",
    Some("webm") => "video/webm",
    Some("mkv") => "video/x-matroska",
    Some("mp3") => "audio/mpeg",
    Some("m4a") => "audio/mp4",
    _ => "application/octet-stream",
  }
}

// `filename` must stay ASCII for older clients, `filename*` carries the
// real name.
pub fn content_disposition(filename: &str) -> String {
  let fallback: String = filename
    .chars()
    .map(|c| match c {
      ' '..='~' if c != '"' && c != '\\' => c,
      _ => '_',
    })
    .collect();

  format!(
    "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
    urlencoding::encode(filename)
  )
}
