//! Format-neutral document model.
//!
//! A [`Document`] is what a format reader produces and what detection and
//! writing consume: an ordered sequence of [`ContentUnit`]s (pages for PDF,
//! spine items for EPUB), an [`Outline`] tree mirroring the source's native
//! table of contents, and a [`DocMetadata`] record.
//!
//! Unit indices are stable for the document's lifetime and `content_units`
//! order equals reading order, so a chapter span is just a half-open index
//! range.

use std::path::{Path, PathBuf};

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Epub,
}

impl FileType {
    /// Determine the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<FileType> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "epub" => Some(FileType::Epub),
            _ => None,
        }
    }

    /// The conventional file extension, including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Pdf => ".pdf",
            FileType::Epub => ".epub",
        }
    }
}

/// Document metadata with a fixed key set.
///
/// Every field is optional: real-world files routinely carry truncated or
/// absent metadata, and lookups must degrade to `None` rather than fail.
#[derive(Debug, Clone, Default)]
pub struct DocMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub identifier: Option<String>,
    pub date: Option<String>,
}

impl DocMetadata {
    /// Look up a metadata field by key name.
    ///
    /// Unknown keys and unset fields both yield `None`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let field = match key {
            "title" => &self.title,
            "author" => &self.author,
            "publisher" => &self.publisher,
            "language" => &self.language,
            "description" => &self.description,
            "identifier" => &self.identifier,
            "date" => &self.date,
            _ => return None,
        };
        field.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Set a field by key name. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let slot = match key {
            "title" => &mut self.title,
            "author" => &mut self.author,
            "publisher" => &mut self.publisher,
            "language" => &mut self.language,
            "description" => &mut self.description,
            "identifier" => &mut self.identifier,
            "date" => &mut self.date,
            _ => return,
        };
        if !value.trim().is_empty() {
            *slot = Some(value);
        }
    }
}

/// Index of a node within an [`Outline`] arena.
pub type NodeId = usize;

/// A single outline (bookmark / TOC) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub title: String,
    /// Index into [`Document::content_units`] this entry points at.
    pub target_unit_index: usize,
}

/// The document's native table-of-contents tree.
///
/// Nodes live in a flat arena addressed by [`NodeId`]; parent/child structure
/// is a separate index mapping, so traversal stays recursive without
/// ownership cycles. Sibling targets are non-decreasing in document order.
#[derive(Debug, Clone, Default)]
pub struct Outline {
    nodes: Vec<OutlineNode>,
    roots: Vec<NodeId>,
    children: Vec<Vec<NodeId>>,
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level entry, returning its id.
    pub fn push_root(&mut self, title: impl Into<String>, target_unit_index: usize) -> NodeId {
        let id = self.alloc(title, target_unit_index);
        self.roots.push(id);
        id
    }

    /// Add a child under `parent`, returning its id.
    ///
    /// An out-of-range parent id degrades to a top-level entry.
    pub fn push_child(
        &mut self,
        parent: NodeId,
        title: impl Into<String>,
        target_unit_index: usize,
    ) -> NodeId {
        let id = self.alloc(title, target_unit_index);
        match self.children.get_mut(parent) {
            Some(siblings) => siblings.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn alloc(&mut self, title: impl Into<String>, target_unit_index: usize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(OutlineNode {
            title: title.into(),
            target_unit_index,
        });
        self.children.push(Vec::new());
        id
    }

    /// Node lookup that returns `None` for out-of-range ids.
    pub fn node(&self, id: NodeId) -> Option<&OutlineNode> {
        self.nodes.get(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Child ids of `id`, empty for leaves and out-of-range ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of entries, including nested ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Flatten the tree to document order, keeping entries down to `depth`
    /// levels (1 = top-level only).
    pub fn flatten_to_depth(&self, depth: usize) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.collect(root, 1, depth.max(1), &mut out);
        }
        out
    }

    fn collect(&self, id: NodeId, level: usize, depth: usize, out: &mut Vec<NodeId>) {
        out.push(id);
        if level < depth {
            for &child in self.children(id) {
                self.collect(child, level + 1, depth, out);
            }
        }
    }
}

/// The smallest addressable block of a document's body: one page for PDF,
/// one spine item for EPUB.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Source-side name: spine href for EPUB, `page-N` label for PDF.
    pub name: String,
    /// Plain text of the unit, used by the heading heuristic and by
    /// cross-format conversion. May be empty for image-only pages.
    pub text: String,
    /// Raw body bytes (XHTML for EPUB spine items; empty for PDF pages,
    /// whose content the writer takes from the source file).
    pub body: Vec<u8>,
    pub media_type: String,
}

/// A named auxiliary resource (CSS, image, font) carried alongside EPUB
/// spine items so chapter output stays self-contained.
#[derive(Debug, Clone)]
pub struct SharedResource {
    pub href: String,
    pub data: Vec<u8>,
    pub media_type: String,
}

/// A parsed source document, fresh per split invocation.
#[derive(Debug, Clone)]
pub struct Document {
    pub source_path: PathBuf,
    pub file_type: FileType,
    pub metadata: DocMetadata,
    pub outline: Outline,
    pub content_units: Vec<ContentUnit>,
    /// Non-spine resources referenced by the content (EPUB only).
    pub resources: Vec<SharedResource>,
}

impl Document {
    pub fn new(source_path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Document {
            source_path: source_path.into(),
            file_type,
            metadata: DocMetadata::default(),
            outline: Outline::new(),
            content_units: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Number of content units.
    pub fn len(&self) -> usize {
        self.content_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_units.is_empty()
    }

    /// Unit lookup that returns `None` when `index` is out of range.
    pub fn unit(&self, index: usize) -> Option<&ContentUnit> {
        self.content_units.get(index)
    }

    /// Document title, falling back to the source file stem.
    pub fn title(&self) -> String {
        self.metadata
            .get("title")
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.source_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_get_is_defensive() {
        let mut meta = DocMetadata::default();
        meta.set("title", "A Book");
        meta.set("author", "   ");
        meta.set("no-such-key", "value");

        assert_eq!(meta.get("title"), Some("A Book"));
        assert_eq!(meta.get("author"), None);
        assert_eq!(meta.get("publisher"), None);
        assert_eq!(meta.get("no-such-key"), None);
    }

    #[test]
    fn test_outline_arena_structure() {
        let mut outline = Outline::new();
        let ch1 = outline.push_root("Chapter 1", 0);
        outline.push_child(ch1, "Section 1.1", 1);
        let ch2 = outline.push_root("Chapter 2", 3);

        assert_eq!(outline.roots(), &[ch1, ch2]);
        assert_eq!(outline.children(ch1).len(), 1);
        assert_eq!(outline.children(ch2).len(), 0);
        assert_eq!(outline.node(ch2).unwrap().target_unit_index, 3);
        assert_eq!(outline.node(99), None);
        assert_eq!(outline.len(), 3);
    }

    #[test]
    fn test_outline_flatten_depth() {
        let mut outline = Outline::new();
        let a = outline.push_root("A", 0);
        outline.push_child(a, "A.1", 1);
        outline.push_root("B", 4);

        assert_eq!(outline.flatten_to_depth(1).len(), 2);
        assert_eq!(outline.flatten_to_depth(2).len(), 3);
    }

    #[test]
    fn test_document_unit_out_of_range() {
        let doc = Document::new("/tmp/x.epub", FileType::Epub);
        assert!(doc.unit(0).is_none());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let doc = Document::new("/books/agnes-grey.epub", FileType::Epub);
        assert_eq!(doc.title(), "agnes-grey");
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(
            FileType::from_path(Path::new("a/b/Book.EPUB")),
            Some(FileType::Epub)
        );
        assert_eq!(
            FileType::from_path(Path::new("doc.pdf")),
            Some(FileType::Pdf)
        );
        assert_eq!(FileType::from_path(Path::new("notes.txt")), None);
    }
}
