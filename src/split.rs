//! Splitting orchestrator.
//!
//! [`split`] runs one document through the whole pipeline: read, validate
//! the output directory, detect chapter spans, then write each span while
//! recording per-chapter outcomes. One bad chapter never blocks its
//! siblings; only reader failures, empty documents, and an unusable output
//! directory abort the run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::detect::{ChapterSpan, detect};
use crate::document::{Document, FileType};
use crate::error::{Error, Result};
use crate::settings::SplitSettings;
use crate::util::{create_unique_file, expand_pattern, sanitize_filename};

/// Outcome for one detected chapter.
#[derive(Debug)]
pub struct SplitResult {
    /// 1-based chapter number, matching the span's index.
    pub chapter_index: usize,
    pub chapter_title: String,
    /// Present only when the chapter was written successfully.
    pub output_path: Option<PathBuf>,
    /// Present only when the chapter failed.
    pub error: Option<Error>,
}

impl SplitResult {
    fn success(span: &ChapterSpan, path: PathBuf) -> Self {
        SplitResult {
            chapter_index: span.index,
            chapter_title: span.title.clone(),
            output_path: Some(path),
            error: None,
        }
    }

    fn failure(span: &ChapterSpan, error: Error) -> Self {
        SplitResult {
            chapter_index: span.index,
            chapter_title: span.title.clone(),
            output_path: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Ordered per-chapter report for one split run: exactly one entry per
/// detected chapter, success or error.
#[derive(Debug, Default)]
pub struct SplitReport {
    pub results: Vec<SplitResult>,
}

impl SplitReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SplitResult> {
        self.results.iter()
    }

    /// Number of chapters written successfully.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of chapters that failed.
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

impl<'a> IntoIterator for &'a SplitReport {
    type Item = &'a SplitResult;
    type IntoIter = std::slice::Iter<'a, SplitResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Parse a source file with the reader matching its extension.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    match FileType::from_path(path) {
        Some(FileType::Pdf) => crate::pdf::read_pdf(path),
        Some(FileType::Epub) => crate::epub::read_epub(path),
        None => Err(Error::UnreadableDocument(format!(
            "{}: unsupported file type",
            path.display()
        ))),
    }
}

/// Split one document into per-chapter files under `output_dir`.
///
/// Returns the full per-chapter report even when some entries carry errors.
/// Fatal errors ([`Error::is_fatal`]) abort before any chapter is attempted
/// and surface as the top-level `Err`.
pub fn split<P: AsRef<Path>, Q: AsRef<Path>>(
    source_path: P,
    settings: &SplitSettings,
    output_dir: Q,
) -> Result<SplitReport> {
    let source_path = source_path.as_ref();
    let output_dir = output_dir.as_ref();

    validate_output_dir(output_dir)?;

    let document = read_document(source_path)?;
    let spans = detect(&document, settings)?;
    info!(
        source = %source_path.display(),
        chapters = spans.len(),
        "detected chapter structure"
    );

    let mut report = SplitReport::default();
    for span in &spans {
        match write_chapter(&document, span, settings, output_dir) {
            Ok(path) => {
                debug!(chapter = span.index, path = %path.display(), "chapter written");
                report.results.push(SplitResult::success(span, path));
            }
            Err(e) => {
                warn!(chapter = span.index, error = %e, "chapter failed");
                report.results.push(SplitResult::failure(span, e));
            }
        }
    }

    Ok(report)
}

/// Ensure the output directory exists and is writable.
fn validate_output_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|e| Error::InvalidOutputDirectory(format!("{}: {e}", dir.display())))?;
    }

    let metadata = fs::metadata(dir)
        .map_err(|e| Error::InvalidOutputDirectory(format!("{}: {e}", dir.display())))?;
    if !metadata.is_dir() {
        return Err(Error::InvalidOutputDirectory(format!(
            "{}: not a directory",
            dir.display()
        )));
    }
    if metadata.permissions().readonly() {
        return Err(Error::InvalidOutputDirectory(format!(
            "{}: not writable",
            dir.display()
        )));
    }
    Ok(())
}

/// Write one span: name it, claim a unique path, dispatch to the writer for
/// the resolved format. A claimed file is removed again if the writer fails.
fn write_chapter(
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
    output_dir: &Path,
) -> Result<PathBuf> {
    let stem = sanitize_filename(&expand_pattern(
        &settings.naming_pattern,
        &document.title(),
        span.index,
        &span.title,
    ));
    let ext = settings.get_output_extension(document.file_type);

    let (path, mut file) = create_unique_file(output_dir, &stem, ext)?;

    let written = match settings.resolved_format(document.file_type) {
        FileType::Epub => crate::epub::write_epub_chapter(document, span, settings, &mut file),
        FileType::Pdf => crate::pdf::write_pdf_chapter(document, span, settings, &mut file),
    };

    match written {
        Ok(()) => Ok(path),
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension_is_fatal() {
        let err = read_document("/tmp/notes.txt").unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_output_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        validate_output_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_validate_output_dir_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let err = validate_output_dir(&file).unwrap_err();
        assert!(matches!(err, Error::InvalidOutputDirectory(_)));
    }
}
