//! # tomesplit
//!
//! A fast, lightweight library for detecting chapter boundaries in EPUB and
//! PDF ebooks and splitting each source into one file per chapter.
//!
//! ## Features
//!
//! - Read EPUB and PDF files into a format-neutral [`Document`] model
//! - Detect chapters from the native outline (NCX / PDF bookmarks), with a
//!   heading-heuristic fallback for files without one
//! - Write each chapter as a self-contained EPUB or PDF, with sanitized
//!   filenames and inherited metadata
//! - Convert between formats at the text/metadata level while splitting
//!
//! ## Quick Start
//!
//! ```no_run
//! use tomesplit::{SplitSettings, split};
//!
//! let settings = SplitSettings::default();
//! let report = split("book.epub", &settings, "chapters/")?;
//! for result in &report {
//!     match &result.output_path {
//!         Some(path) => println!("{}: {}", result.chapter_index, path.display()),
//!         None => eprintln!("{}: failed", result.chapter_index),
//!     }
//! }
//! # Ok::<(), tomesplit::Error>(())
//! ```
//!
//! ## Working with the pipeline
//!
//! Each stage is usable on its own: [`read_document`] parses a source into a
//! [`Document`], [`detect`](detect::detect) partitions its content units
//! into [`ChapterSpan`]s, and the format writers emit individual spans.
//!
//! ```no_run
//! use tomesplit::{SplitSettings, detect::detect, split::read_document};
//!
//! let document = read_document("book.pdf")?;
//! let spans = detect(&document, &SplitSettings::default())?;
//! for span in &spans {
//!     println!("{}. {} ({} units)", span.index, span.title, span.len());
//! }
//! # Ok::<(), tomesplit::Error>(())
//! ```

pub mod detect;
pub mod document;
pub mod epub;
pub mod error;
pub mod pdf;
pub mod settings;
pub mod split;
pub mod util;

pub use detect::{ChapterSpan, HeadingMatcher};
pub use document::{ContentUnit, DocMetadata, Document, FileType, Outline, OutlineNode};
pub use error::{Error, Result};
pub use settings::{DetectionMode, OutputFormat, SplitSettings};
pub use split::{SplitReport, SplitResult, read_document, split};
