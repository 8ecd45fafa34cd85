//! Filename utilities: sanitization, naming-pattern expansion, and atomic
//! unique-path creation.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Replacement for forbidden characters.
const SEPARATOR: char = '_';

/// Longest filename we will emit, in bytes, extension included. Common
/// filesystems cap names at 255 bytes, not characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Windows reserved device names (case-insensitive, checked against the stem).
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

/// Sanitize a filename for cross-platform output.
///
/// Forbidden characters (`<>:"/\|?*`, control characters, embedded newlines)
/// become a single separator, consecutive separators collapse, reserved
/// device names get a separator prefix, and overlong names are truncated with
/// the extension preserved. The function is idempotent:
/// `sanitize_filename(sanitize_filename(x)) == sanitize_filename(x)`.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if is_forbidden(c) {
            if !last_was_sep {
                cleaned.push(SEPARATOR);
                last_was_sep = true;
            }
        } else {
            last_was_sep = c == SEPARATOR;
            cleaned.push(c);
        }
    }

    // Collapse separator runs introduced by adjacent originals like "_<_".
    let mut collapsed = String::with_capacity(cleaned.len());
    let mut prev_sep = false;
    for c in cleaned.chars() {
        if c == SEPARATOR {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        collapsed.push(c);
    }

    // Leading/trailing whitespace and dots confuse most filesystems; trailing
    // separators are noise. Leading separators stay (reserved-name prefix).
    let trimmed = trim_trailing(collapsed.trim_matches(|c: char| c.is_whitespace() || c == '.'));

    if trimmed.is_empty() {
        return "untitled".to_string();
    }

    let (stem, _) = split_extension(trimmed);
    let mut result = if RESERVED_NAMES
        .iter()
        .any(|r| stem.eq_ignore_ascii_case(r))
    {
        format!("{SEPARATOR}{trimmed}")
    } else {
        trimmed.to_string()
    };

    if result.len() > MAX_FILENAME_LEN {
        let (stem, ext) = split_extension(&result);
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len());
        let mut cut = keep.min(stem.len());
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = trim_trailing(&stem[..cut]);
        result = if truncated.is_empty() {
            format!("untitled{ext}")
        } else {
            format!("{truncated}{ext}")
        };
    }

    result
}

/// Strip trailing separators, whitespace, and dots down to a fixpoint, so
/// mixed tails like `"_._"` cannot survive one pass and break idempotence.
fn trim_trailing(mut s: &str) -> &str {
    loop {
        let next = s
            .trim_end_matches(SEPARATOR)
            .trim_end_matches(|c: char| c.is_whitespace() || c == '.');
        if next.len() == s.len() {
            return s;
        }
        s = next;
    }
}

/// Split `name` into (stem, extension-with-dot). Names without a plausible
/// extension return the whole string and "".
fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, &name[stem.len()..])
        }
        _ => (name, ""),
    }
}

/// Expand a naming pattern's placeholders.
///
/// Recognized placeholders: `{title}`, `{chapter_num}`, `{chapter_title}`.
/// Anything else passes through verbatim.
pub fn expand_pattern(
    pattern: &str,
    title: &str,
    chapter_num: usize,
    chapter_title: &str,
) -> String {
    pattern
        .replace("{title}", title)
        .replace("{chapter_num}", &chapter_num.to_string())
        .replace("{chapter_title}", chapter_title)
}

/// Claim a unique output path under `dir`, appending a numeric
/// disambiguation suffix before the extension until creation succeeds.
///
/// Creation uses exclusive-create semantics, so concurrent pipelines writing
/// into the same directory cannot claim the same name; the winner gets the
/// opened handle, the loser retries with the next suffix.
pub fn create_unique_file(dir: &Path, stem: &str, ext: &str) -> Result<(PathBuf, File)> {
    let mut counter = 0usize;
    loop {
        let name = if counter == 0 {
            format!("{stem}{ext}")
        } else {
            format!("{stem} ({counter}){ext}")
        };
        let candidate = dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter += 1;
                if counter > 9999 {
                    return Err(Error::FilesystemWrite(format!(
                        "could not find a unique name for {} in {}",
                        stem,
                        dir.display()
                    )));
                }
            }
            Err(e) => {
                return Err(Error::FilesystemWrite(format!(
                    "{}: {e}",
                    candidate.display()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_forbidden_characters() {
        assert_eq!(sanitize_filename("Test<>File|Name?"), "Test_File_Name");
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
    }

    #[test]
    fn test_sanitize_newlines_become_separator() {
        assert_eq!(sanitize_filename("Intro\nPart"), "Intro_Part");
        assert_eq!(sanitize_filename("a\r\n\tb"), "a_b");
    }

    #[test]
    fn test_sanitize_collapses_separators() {
        assert_eq!(sanitize_filename("a__<>__b"), "a_b");
    }

    #[test]
    fn test_sanitize_reserved_names() {
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename("con.txt"), "_con.txt");
        assert_eq!(sanitize_filename("CONTENT"), "CONTENT");
    }

    #[test]
    fn test_sanitize_empty_and_trim() {
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename("  ...  "), "untitled");
        assert_eq!(sanitize_filename("  name.  "), "name");
    }

    #[test]
    fn test_sanitize_truncates_preserving_extension() {
        let long = format!("{}.epub", "x".repeat(300));
        let out = sanitize_filename(&long);
        assert!(out.len() <= MAX_FILENAME_LEN);
        assert!(out.ends_with(".epub"));
    }

    #[test]
    fn test_sanitize_truncates_on_bytes_not_chars() {
        // 200 three-byte chars: 200 chars but 600 bytes.
        let long = format!("{}.epub", "書".repeat(200));
        let out = sanitize_filename(&long);
        assert!(out.len() <= MAX_FILENAME_LEN);
        assert!(out.ends_with(".epub"));
        assert!(out.starts_with('書'));
    }

    #[test]
    fn test_sanitize_idempotent() {
        for input in [
            "Test<>File|Name?.txt",
            "CON",
            "   Spaces and \t tabs \n\r newlines   ",
            "55_Exercise③\nKnow what you need",
            "a_._",
            &"y".repeat(400),
        ] {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_expand_pattern() {
        let name = expand_pattern("{title}_{chapter_num}_{chapter_title}", "Sample", 1, "Intro");
        assert_eq!(name, "Sample_1_Intro");
    }

    #[test]
    fn test_create_unique_file_disambiguates() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _f1) = create_unique_file(dir.path(), "chapter", ".epub").unwrap();
        let (second, _f2) = create_unique_file(dir.path(), "chapter", ".epub").unwrap();
        assert_eq!(first.file_name().unwrap(), "chapter.epub");
        assert_eq!(second.file_name().unwrap(), "chapter (1).epub");
        assert!(first.exists() && second.exists());
    }
}
