//! Error types for tomesplit operations.

use thiserror::Error;

/// Errors that can occur while reading, detecting, or splitting a document.
///
/// Fatal variants abort a split run before any chapter is written; the rest
/// are recorded per chapter in the [`SplitReport`](crate::split::SplitReport)
/// without stopping the remaining chapters.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The source file is absent, not a valid container for its claimed
    /// format, or encrypted without a usable fallback.
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    /// The document has no content units to partition.
    #[error("no chapter structure: {0}")]
    NoChapterStructure(String),

    /// The output directory does not exist and cannot be created, or is not
    /// writable.
    #[error("invalid output directory: {0}")]
    InvalidOutputDirectory(String),

    /// A chapter span contains content the target format cannot represent.
    #[error("unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Writing a specific output file failed (disk full, permissions).
    #[error("filesystem write error: {0}")]
    FilesystemWrite(String),
}

impl Error {
    /// Whether this error aborts the whole run rather than a single chapter.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnreadableDocument(_)
                | Error::NoChapterStructure(_)
                | Error::InvalidOutputDirectory(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
