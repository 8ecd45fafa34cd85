//! Split configuration.
//!
//! [`SplitSettings`] is owned by the caller and read-only during a run. The
//! core trusts validated settings; [`SplitSettings::validate`] exists as a
//! convenience for callers that assemble settings from user input.

use crate::document::FileType;

/// Target format for chapter output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Emit chapters in the source document's format.
    #[default]
    SameAsInput,
    Pdf,
    Epub,
}

/// How chapter boundaries are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Outline-first, falling back to heading heuristics.
    #[default]
    Auto,
    /// Boundaries supplied directly as unit indices.
    Manual,
    /// Boundaries from a structural query against the native TOC structure.
    Query,
}

/// Configuration for one split run.
#[derive(Debug, Clone)]
pub struct SplitSettings {
    pub output_format: OutputFormat,
    /// Filename template. Recognized placeholders: `{title}`,
    /// `{chapter_num}`, `{chapter_title}`.
    pub naming_pattern: String,
    pub detection_mode: DetectionMode,
    /// Copy source metadata into each chapter file.
    pub preserve_metadata: bool,
    /// Outline levels flattened into boundaries in AUTO mode (1 = chapters
    /// only, 2 = chapters and sections, ...).
    pub outline_depth: usize,
    /// Boundary unit indices for [`DetectionMode::Manual`].
    pub manual_boundaries: Vec<usize>,
    /// Structural query for [`DetectionMode::Query`], matched against
    /// outline titles and content-unit names.
    pub query: String,
}

impl Default for SplitSettings {
    fn default() -> Self {
        SplitSettings {
            output_format: OutputFormat::SameAsInput,
            naming_pattern: "{title}_{chapter_num}_{chapter_title}".to_string(),
            detection_mode: DetectionMode::Auto,
            preserve_metadata: true,
            outline_depth: 1,
            manual_boundaries: Vec::new(),
            query: String::new(),
        }
    }
}

impl SplitSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_naming_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.naming_pattern = pattern.into();
        self
    }

    pub fn with_detection_mode(mut self, mode: DetectionMode) -> Self {
        self.detection_mode = mode;
        self
    }

    pub fn with_manual_boundaries(mut self, boundaries: Vec<usize>) -> Self {
        self.detection_mode = DetectionMode::Manual;
        self.manual_boundaries = boundaries;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.detection_mode = DetectionMode::Query;
        self.query = query.into();
        self
    }

    /// Resolve the output format against the source format.
    pub fn resolved_format(&self, source: FileType) -> FileType {
        match self.output_format {
            OutputFormat::SameAsInput => source,
            OutputFormat::Pdf => FileType::Pdf,
            OutputFormat::Epub => FileType::Epub,
        }
    }

    /// Output file extension (with leading dot) for a given source format.
    pub fn get_output_extension(&self, source: FileType) -> &'static str {
        self.resolved_format(source).extension()
    }

    /// True exactly when the resolved output format differs from the source.
    pub fn requires_format_conversion(&self, source: FileType) -> bool {
        self.resolved_format(source) != source
    }

    /// Check settings consistency, returning a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.naming_pattern.trim().is_empty() {
            problems.push("naming pattern is empty".to_string());
        }
        if self.detection_mode == DetectionMode::Query && self.query.trim().is_empty() {
            problems.push("query detection mode requires a query".to_string());
        }
        if self.detection_mode == DetectionMode::Manual && self.manual_boundaries.is_empty() {
            problems.push("manual detection mode requires boundaries".to_string());
        }
        problems
    }
}
