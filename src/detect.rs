//! Chapter-boundary detection.
//!
//! [`detect`] turns a [`Document`] into an ordered list of [`ChapterSpan`]s
//! that partition the content units exactly: contiguous, non-overlapping,
//! covering every unit once. Detection is outline-first; documents without a
//! usable outline fall back to heading heuristics over unit text.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::settings::{DetectionMode, SplitSettings};

/// A contiguous range of content units designated as one output chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSpan {
    /// 1-based sequence number.
    pub index: usize,
    pub title: String,
    pub start_unit_index: usize,
    /// Exclusive end; the final span's end is always the unit count.
    pub end_unit_index: usize,
}

impl ChapterSpan {
    /// Number of units covered by this span.
    pub fn len(&self) -> usize {
        self.end_unit_index - self.start_unit_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pluggable heading-pattern strategy for the heuristic fallback.
///
/// The default set matches numeric and keyword chapter headings in a unit's
/// leading lines: `Chapter 7`, `CHAPTER XII`, `Part 2`, `3. The Sea`,
/// `Prologue`, and CJK `第N章` headings.
#[derive(Debug, Clone)]
pub struct HeadingMatcher {
    patterns: Vec<Regex>,
}

fn default_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^\s*(?:chapter|chap\.?)\s+(?:\d+|[ivxlcdm]+)\b.*$",
            r"(?i)^\s*(?:part|book|section)\s+(?:\d+|[ivxlcdm]+)\b.*$",
            r"^\s*\d{1,3}[.)]\s+\S.*$",
            r"(?i)^\s*(?:prologue|epilogue|introduction|preface|foreword|afterword|appendix)\b.*$",
            r"^\s*第.{1,8}章.*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("built-in heading pattern"))
        .collect()
    })
}

impl Default for HeadingMatcher {
    fn default() -> Self {
        HeadingMatcher {
            patterns: default_patterns().clone(),
        }
    }
}

impl HeadingMatcher {
    /// Use a custom pattern set instead of the built-in one.
    pub fn new(patterns: Vec<Regex>) -> Self {
        HeadingMatcher { patterns }
    }

    /// Check a unit's leading text for a chapter-like heading, returning the
    /// matched heading line.
    pub fn match_heading(&self, text: &str) -> Option<String> {
        // Headings live at the top of a page or spine item; scanning deep
        // into body text produces false boundaries on every cross-reference.
        for line in text.lines().filter(|l| !l.trim().is_empty()).take(6) {
            for pattern in &self.patterns {
                if pattern.is_match(line) {
                    return Some(line.trim().to_string());
                }
            }
        }
        None
    }
}

/// A candidate boundary before normalization: a unit index and an optional
/// title taken from the structure that proposed it.
type Boundary = (usize, Option<String>);

/// Detect chapter spans in `document` according to `settings.detection_mode`.
///
/// Fails with [`Error::NoChapterStructure`] only when the document has no
/// content units. Zero usable boundaries yield a single span covering the
/// whole document.
pub fn detect(document: &Document, settings: &SplitSettings) -> Result<Vec<ChapterSpan>> {
    detect_with_matcher(document, settings, &HeadingMatcher::default())
}

/// [`detect`] with a caller-supplied heading strategy.
pub fn detect_with_matcher(
    document: &Document,
    settings: &SplitSettings,
    matcher: &HeadingMatcher,
) -> Result<Vec<ChapterSpan>> {
    if document.is_empty() {
        return Err(Error::NoChapterStructure(format!(
            "{} has no content units",
            document.source_path.display()
        )));
    }

    let boundaries = match settings.detection_mode {
        DetectionMode::Auto => {
            if document.outline.is_empty() {
                debug!(
                    source = %document.source_path.display(),
                    "outline empty, falling back to heading heuristics"
                );
                heading_boundaries(document, matcher)
            } else {
                outline_boundaries(document, settings.outline_depth)
            }
        }
        DetectionMode::Manual => settings
            .manual_boundaries
            .iter()
            .map(|&i| (i, None))
            .collect(),
        DetectionMode::Query => query_boundaries(document, &settings.query),
    };

    Ok(partition(boundaries, document.len()))
}

fn outline_boundaries(document: &Document, depth: usize) -> Vec<Boundary> {
    document
        .outline
        .flatten_to_depth(depth)
        .into_iter()
        .filter_map(|id| document.outline.node(id))
        .map(|node| {
            let title = Some(node.title.clone()).filter(|t| !t.trim().is_empty());
            (node.target_unit_index, title)
        })
        .collect()
}

fn heading_boundaries(document: &Document, matcher: &HeadingMatcher) -> Vec<Boundary> {
    document
        .content_units
        .iter()
        .enumerate()
        .filter_map(|(i, unit)| matcher.match_heading(&unit.text).map(|title| (i, Some(title))))
        .collect()
}

/// Match a structural query against the native TOC structure: outline entry
/// titles and content-unit names, case-insensitively.
fn query_boundaries(document: &Document, query: &str) -> Vec<Boundary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut boundaries: Vec<Boundary> = Vec::new();
    for id in document.outline.flatten_to_depth(usize::MAX) {
        if let Some(node) = document.outline.node(id)
            && node.title.to_lowercase().contains(&needle)
        {
            boundaries.push((node.target_unit_index, Some(node.title.clone())));
        }
    }
    for (i, unit) in document.content_units.iter().enumerate() {
        if unit.name.to_lowercase().contains(&needle) {
            boundaries.push((i, None));
        }
    }
    boundaries
}

/// Normalize boundaries and build the span partition of `[0, unit_count)`.
///
/// Boundaries are sorted, deduplicated (keeping the first title proposed for
/// an index), clamped, and dropped where they would create a zero-length
/// span. The first span always starts at 0 and the last always ends at
/// `unit_count`.
fn partition(mut boundaries: Vec<Boundary>, unit_count: usize) -> Vec<ChapterSpan> {
    boundaries.sort_by_key(|(i, _)| *i);
    boundaries.dedup_by(|(a, a_title), (b, b_title)| {
        if a == b {
            // Keep the earlier boundary, but adopt its sibling's title when
            // the earlier one has none.
            if b_title.is_none() {
                *b_title = a_title.take();
            }
            true
        } else {
            false
        }
    });
    boundaries.retain(|(i, _)| *i < unit_count);

    // A boundary at unit 0 duplicates the implicit start; keep its title for
    // the first span instead of emitting a zero-length chapter.
    let mut first_title = None;
    if let Some((0, title)) = boundaries.first_mut() {
        first_title = title.take();
        boundaries.remove(0);
    }

    let mut spans = Vec::with_capacity(boundaries.len() + 1);
    let mut titles = Vec::with_capacity(boundaries.len() + 1);
    let mut starts = vec![0usize];
    titles.push(first_title);
    for (i, title) in boundaries {
        starts.push(i);
        titles.push(title);
    }

    for (n, (&start, title)) in starts.iter().zip(titles).enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(unit_count);
        let index = n + 1;
        spans.push(ChapterSpan {
            index,
            title: title.unwrap_or_else(|| format!("Chapter {index}")),
            start_unit_index: start,
            end_unit_index: end,
        });
    }

    spans
}
