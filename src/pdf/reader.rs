//! PDF reader: parses a PDF file into a [`Document`].
//!
//! Pages become content units in page order, each with the text lopdf can
//! extract from it. The bookmark tree under `/Outlines` becomes the outline;
//! entries whose destination cannot be resolved to a page are dropped with
//! their children promoted. Metadata comes from the trailer's Info
//! dictionary. Every lookup here is defensive: truncated or malformed
//! structures yield gaps, not failures.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Object, ObjectId};
use tracing::{debug, warn};

use crate::document::{ContentUnit, Document, FileType, NodeId, Outline};
use crate::error::{Error, Result};

/// Hard cap on outline entries, guarding against cyclic `First`/`Next`
/// chains in malformed files.
const MAX_OUTLINE_NODES: usize = 4096;

/// Read a PDF file from disk into a [`Document`].
///
/// Fails with [`Error::UnreadableDocument`] when the file is absent, not a
/// PDF, or encrypted. A missing or malformed bookmark tree yields an empty
/// outline; detection then falls back to heading heuristics over page text.
pub fn read_pdf<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let pdf = lopdf::Document::load(path)
        .map_err(|e| Error::UnreadableDocument(format!("{}: {e}", path.display())))?;

    if pdf.is_encrypted() {
        return Err(Error::UnreadableDocument(format!(
            "{}: password-protected",
            path.display()
        )));
    }

    let mut document = Document::new(path, FileType::Pdf);
    document.metadata = read_info_metadata(&pdf);
    if document.metadata.title.is_none() {
        document.metadata.title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    }

    // get_pages returns 1-based page numbers in page-tree order.
    let pages = pdf.get_pages();
    let mut page_index: HashMap<ObjectId, usize> = HashMap::with_capacity(pages.len());
    for (i, (&page_num, &object_id)) in pages.iter().enumerate() {
        page_index.insert(object_id, i);
        let text = match pdf.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                debug!(page = page_num, error = %e, "text extraction failed");
                String::new()
            }
        };
        document.content_units.push(ContentUnit {
            name: format!("page-{page_num}"),
            text,
            body: Vec::new(),
            media_type: "application/pdf".to_string(),
        });
    }

    read_outline(&pdf, &page_index, &mut document.outline);

    Ok(document)
}

/// Trailer → Info dictionary → fixed metadata keys, defensively.
fn read_info_metadata(pdf: &lopdf::Document) -> crate::document::DocMetadata {
    let mut metadata = crate::document::DocMetadata::default();

    let info = pdf
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| deref_dict(pdf, obj));

    let Some(info) = info else {
        debug!("PDF has no Info dictionary");
        return metadata;
    };

    let mut copy = |pdf_key: &[u8], key: &str| {
        if let Ok(obj) = info.get(pdf_key)
            && let Some(value) = decode_pdf_string(deref(pdf, obj))
        {
            metadata.set(key, value);
        }
    };

    copy(b"Title", "title");
    copy(b"Author", "author");
    copy(b"Subject", "description");
    copy(b"CreationDate", "date");

    metadata
}

/// Walk the `/Outlines` tree into the outline arena.
fn read_outline(pdf: &lopdf::Document, page_index: &HashMap<ObjectId, usize>, outline: &mut Outline) {
    let Ok(catalog) = pdf.catalog() else {
        return;
    };
    let Some(outlines) = catalog.get(b"Outlines").ok().and_then(|o| deref_dict(pdf, o)) else {
        return;
    };
    let Ok(first) = outlines.get(b"First") else {
        return;
    };

    let mut budget = MAX_OUTLINE_NODES;
    walk_siblings(pdf, first, None, page_index, outline, &mut budget);
}

fn walk_siblings<'a>(
    pdf: &'a lopdf::Document,
    first: &'a Object,
    parent: Option<NodeId>,
    page_index: &HashMap<ObjectId, usize>,
    outline: &mut Outline,
    budget: &mut usize,
) {
    let mut current = Some(first);
    while let Some(obj) = current {
        if *budget == 0 {
            warn!("outline exceeds {MAX_OUTLINE_NODES} entries, truncating");
            return;
        }
        *budget -= 1;

        let Some(dict) = deref_dict(pdf, obj) else {
            return;
        };

        let title = dict
            .get(b"Title")
            .ok()
            .and_then(|o| decode_pdf_string(deref(pdf, o)))
            .unwrap_or_default();

        // Unresolvable destinations drop the entry but keep its subtree,
        // attached one level up.
        let node = match resolve_destination(pdf, dict, page_index) {
            Some(target) => Some(match parent {
                Some(p) => outline.push_child(p, title, target),
                None => outline.push_root(title, target),
            }),
            None => {
                debug!(title = %title, "bookmark has no resolvable page destination");
                parent
            }
        };

        if let Ok(child) = dict.get(b"First") {
            walk_siblings(pdf, child, node, page_index, outline, budget);
        }

        current = dict.get(b"Next").ok();
    }
}

/// Resolve a bookmark's target page: direct `Dest` arrays and `GoTo` actions
/// are supported; named destinations are not and yield `None`.
fn resolve_destination(
    pdf: &lopdf::Document,
    item: &Dictionary,
    page_index: &HashMap<ObjectId, usize>,
) -> Option<usize> {
    let dest = match item.get(b"Dest") {
        Ok(dest) => dest,
        Err(_) => {
            let action = deref_dict(pdf, item.get(b"A").ok()?)?;
            action.get(b"D").ok()?
        }
    };

    match deref(pdf, dest) {
        Object::Array(elements) => match elements.first()? {
            Object::Reference(id) => page_index.get(id).copied(),
            Object::Integer(n) => {
                let n = usize::try_from(*n).ok()?;
                (n < page_index.len()).then_some(n)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Follow reference chains to the stored object, with a small hop limit.
fn deref<'a>(pdf: &'a lopdf::Document, mut obj: &'a Object) -> &'a Object {
    for _ in 0..8 {
        match obj {
            Object::Reference(id) => match pdf.get_object(*id) {
                Ok(resolved) => obj = resolved,
                Err(_) => return obj,
            },
            _ => return obj,
        }
    }
    obj
}

fn deref_dict<'a>(pdf: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match deref(pdf, obj) {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a PDF string object: UTF-16BE when BOM-prefixed, otherwise UTF-8
/// with a Latin-1 fallback for legacy producers.
fn decode_pdf_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    let decoded = if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8(bytes.clone())
            .unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
    };

    let trimmed = decoded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
