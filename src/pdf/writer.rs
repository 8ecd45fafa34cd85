//! PDF writer: emits one chapter span as a self-contained PDF.
//!
//! For PDF sources the span's pages are carved out of the source file
//! directly, preserving their full content. For EPUB sources a text-only PDF
//! is synthesized from the span's extracted text, one section of pages per
//! spine item; a span with no extractable text fails with
//! [`Error::UnsupportedConversion`].

use std::io::Write;

use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};

use crate::detect::ChapterSpan;
use crate::document::{Document, FileType};
use crate::error::{Error, Result};
use crate::settings::SplitSettings;

/// Letter-size text layout for synthesized pages.
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 72;
const LEADING: i64 = 14;
const LINES_PER_PAGE: usize = 48;
const CHARS_PER_LINE: usize = 88;

/// Write the units in `span` as a self-contained PDF to `writer`.
pub fn write_pdf_chapter<W: Write>(
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
    writer: &mut W,
) -> Result<()> {
    let mut pdf = match document.file_type {
        FileType::Pdf => extract_page_range(document, span)?,
        FileType::Epub => synthesize_text_pdf(document, span)?,
    };

    set_info(&mut pdf, document, span, settings);
    pdf.compress();
    pdf.save_to(writer)?;
    Ok(())
}

/// Reload the source PDF and delete every page outside the span.
fn extract_page_range(document: &Document, span: &ChapterSpan) -> Result<lopdf::Document> {
    let mut pdf = lopdf::Document::load(&document.source_path)?;

    let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
    let to_delete: Vec<u32> = page_numbers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < span.start_unit_index || *i >= span.end_unit_index)
        .map(|(_, &n)| n)
        .collect();

    if to_delete.len() == page_numbers.len() {
        return Err(Error::UnsupportedConversion(format!(
            "chapter {} covers no pages of the source",
            span.index
        )));
    }

    pdf.delete_pages(&to_delete);

    // The source bookmark tree points at pages that may no longer exist.
    if let Ok(root_id) = pdf.trailer.get(b"Root").and_then(|o| o.as_reference())
        && let Ok(Object::Dictionary(catalog)) = pdf.get_object_mut(root_id)
    {
        catalog.remove(b"Outlines");
    }

    pdf.prune_objects();
    Ok(pdf)
}

/// Build a text-only PDF from the span's unit text (cross-format path).
fn synthesize_text_pdf(document: &Document, span: &ChapterSpan) -> Result<lopdf::Document> {
    let lines = layout_lines(document, span);
    if lines.is_empty() {
        return Err(Error::UnsupportedConversion(format!(
            "chapter {} has no text representable as PDF",
            span.index
        )));
    }

    let mut pdf = lopdf::Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let font_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_lines in lines.chunks(LINES_PER_PAGE) {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 11.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new(
                "Td",
                vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()],
            ),
        ];
        for line in page_lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = pdf.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);

    Ok(pdf)
}

/// Flatten the span's unit text into wrapped lines, heading first.
fn layout_lines(document: &Document, span: &ChapterSpan) -> Vec<String> {
    let mut lines = Vec::new();
    for i in span.start_unit_index..span.end_unit_index {
        let Some(unit) = document.unit(i) else {
            continue;
        };
        for raw in unit.text.lines() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let mut current = String::new();
            for word in raw.split_whitespace() {
                if !current.is_empty() && current.len() + word.len() + 1 > CHARS_PER_LINE {
                    lines.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
            }
            if !current.is_empty() {
                lines.push(current);
            }
        }
    }
    lines
}

/// Replace the Info dictionary: chapter title and number always, source
/// metadata when preservation is requested.
fn set_info(
    pdf: &mut lopdf::Document,
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
) {
    let mut info = dictionary! {
        "Title" => Object::string_literal(span.title.as_str()),
        "Producer" => Object::string_literal(concat!("tomesplit ", env!("CARGO_PKG_VERSION"))),
    };

    if settings.preserve_metadata {
        if let Some(author) = document.metadata.get("author") {
            info.set("Author", Object::string_literal(author));
        }
        if let Some(title) = document.metadata.get("title") {
            info.set(
                "Subject",
                Object::string_literal(format!("{} - {}", title, span.title)),
            );
        }
        if let Some(date) = document.metadata.get("date") {
            info.set("CreationDate", Object::string_literal(date));
        }
    }

    let info_id = pdf.add_object(Object::Dictionary(info));
    pdf.trailer.set("Info", info_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ContentUnit;

    fn epub_doc_with_text(texts: &[&str]) -> Document {
        let mut doc = Document::new("/tmp/src.epub", FileType::Epub);
        for (i, text) in texts.iter().enumerate() {
            doc.content_units.push(ContentUnit {
                name: format!("c{i}.xhtml"),
                text: text.to_string(),
                body: Vec::new(),
                media_type: "application/xhtml+xml".to_string(),
            });
        }
        doc
    }

    fn span(start: usize, end: usize) -> ChapterSpan {
        ChapterSpan {
            index: 1,
            title: "Chapter 1".to_string(),
            start_unit_index: start,
            end_unit_index: end,
        }
    }

    #[test]
    fn test_layout_wraps_long_lines() {
        let long = "word ".repeat(60);
        let doc = epub_doc_with_text(&[&long]);
        let lines = layout_lines(&doc, &span(0, 1));
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= CHARS_PER_LINE));
    }

    #[test]
    fn test_synthesized_pdf_roundtrips() {
        let doc = epub_doc_with_text(&["Chapter 1\nOnce upon a time.", "The end."]);
        let settings = SplitSettings::default();
        let mut out = Vec::new();
        write_pdf_chapter(&doc, &span(0, 2), &settings, &mut out).unwrap();

        let parsed = lopdf::Document::load_mem(&out).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn test_empty_text_is_unsupported_conversion() {
        let doc = epub_doc_with_text(&["", "   "]);
        let settings = SplitSettings::default();
        let mut out = Vec::new();
        let err = write_pdf_chapter(&doc, &span(0, 2), &settings, &mut out).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConversion(_)));
    }
}
