/// Characters reserved in file names on at least one major platform.
const RESERVED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest name, in UTF-8 bytes, that `sanitize_filename` will produce.
/// Leaves room for an extension under the usual 255-byte name limit.
pub const MAX_NAME_LEN: usize = 200;

/// Name used when a title sanitizes down to nothing.
pub const FALLBACK_NAME: &str = "video";

/// Strips reserved characters and truncates to [`MAX_NAME_LEN`] bytes,
/// never splitting a character.
///
/// The result may be empty if the title is empty or made only of reserved
/// characters; see [`sanitize_or_fallback`].
pub fn sanitize_filename(title: &str) -> String {
  let mut name = String::with_capacity(title.len().min(MAX_NAME_LEN));
  for c in title.chars().filter(|c| !RESERVED.contains(c)) {
    if name.len() + c.len_utf8() > MAX_NAME_LEN {
      break;
    }
    name.push(c);
  }
  name
}

pub fn sanitize_or_fallback(title: &str) -> String {
  let name = sanitize_filename(title);
  if name.trim().is_empty() {
    FALLBACK_NAME.to_string()
  } else {
    name
  }
}
