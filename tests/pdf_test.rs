//! End-to-end splitting tests over programmatically built PDF fixtures.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Object, ObjectId, Stream, dictionary};

use tomesplit::pdf::read_pdf;
use tomesplit::{Error, OutputFormat, SplitSettings, split};

/// Build a PDF fixture on disk: one page per entry in `page_texts`, an Info
/// dictionary, and optionally a flat bookmark tree (`title`, 0-based page).
fn build_pdf(path: &Path, page_texts: &[&str], bookmarks: &[(&str, usize)]) {
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
    let mut page_ids: Vec<ObjectId> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = pdf.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
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
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    if !bookmarks.is_empty() {
        let outlines_id = pdf.new_object_id();
        let item_ids: Vec<ObjectId> = bookmarks.iter().map(|_| pdf.new_object_id()).collect();
        for (i, (title, page)) in bookmarks.iter().enumerate() {
            let mut item = dictionary! {
                "Title" => Object::string_literal(*title),
                "Parent" => outlines_id,
                "Dest" => vec![
                    Object::Reference(page_ids[*page]),
                    Object::Name(b"Fit".to_vec()),
                ],
            };
            if i > 0 {
                item.set("Prev", item_ids[i - 1]);
            }
            if i + 1 < item_ids.len() {
                item.set("Next", item_ids[i + 1]);
            }
            pdf.objects.insert(item_ids[i], Object::Dictionary(item));
        }
        pdf.objects.insert(
            outlines_id,
            Object::Dictionary(dictionary! {
                "Type" => "Outlines",
                "First" => item_ids[0],
                "Last" => *item_ids.last().unwrap(),
                "Count" => item_ids.len() as i64,
            }),
        );
        catalog.set("Outlines", outlines_id);
    }

    let catalog_id = pdf.add_object(Object::Dictionary(catalog));
    pdf.trailer.set("Root", catalog_id);

    let info_id = pdf.add_object(dictionary! {
        "Title" => Object::string_literal("Fixture Book"),
        "Author" => Object::string_literal("Jane Doe"),
    });
    pdf.trailer.set("Info", info_id);

    pdf.save(path).unwrap();
}

fn page_count(path: &Path) -> usize {
    let bytes = std::fs::read(path).unwrap();
    lopdf::Document::load_mem(&bytes).unwrap().get_pages().len()
}

#[test]
fn test_read_pdf_pages_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("fixture.pdf");
    build_pdf(&source, &["one", "two", "three", "four"], &[]);

    let document = read_pdf(&source).unwrap();
    assert_eq!(document.len(), 4);
    assert_eq!(document.metadata.get("title"), Some("Fixture Book"));
    assert_eq!(document.metadata.get("author"), Some("Jane Doe"));
    assert!(document.outline.is_empty());
    assert_eq!(document.content_units[0].name, "page-1");
}

#[test]
fn test_bookmarks_drive_detection() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("outlined.pdf");
    build_pdf(
        &source,
        &["a", "b", "c", "d"],
        &[("Opening", 0), ("Closing", 2)],
    );

    let document = read_pdf(&source).unwrap();
    assert_eq!(document.outline.len(), 2);

    let out = tmp.path().join("out");
    let report = split(&source, &SplitSettings::default(), &out).unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.results[0].chapter_title, "Opening");
    assert_eq!(report.results[1].chapter_title, "Closing");
    assert_eq!(page_count(report.results[0].output_path.as_ref().unwrap()), 2);
    assert_eq!(page_count(report.results[1].output_path.as_ref().unwrap()), 2);
}

#[test]
fn test_manual_split_page_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("plain.pdf");
    build_pdf(&source, &["a", "b", "c", "d", "e"], &[]);

    let out = tmp.path().join("out");
    let settings = SplitSettings::new().with_manual_boundaries(vec![2]);
    let report = split(&source, &settings, &out).unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(page_count(report.results[0].output_path.as_ref().unwrap()), 2);
    assert_eq!(page_count(report.results[1].output_path.as_ref().unwrap()), 3);
}

#[test]
fn test_pdf_to_epub_conversion() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("fixture.pdf");
    build_pdf(
        &source,
        &["The opening page.", "The closing page."],
        &[],
    );

    let out = tmp.path().join("out");
    let settings = SplitSettings::new()
        .with_output_format(OutputFormat::Epub)
        .with_manual_boundaries(vec![1]);
    let report = split(&source, &settings, &out).unwrap();

    assert_eq!(report.succeeded(), 2);
    for result in &report {
        let path = result.output_path.as_ref().unwrap();
        assert_eq!(path.extension().unwrap(), "epub");
        let chapter = tomesplit::epub::read_epub(path).unwrap();
        assert!(!chapter.is_empty());
    }
}

#[test]
fn test_missing_pdf_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let err = split(
        tmp.path().join("absent.pdf"),
        &SplitSettings::default(),
        tmp.path(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnreadableDocument(_)));
    assert!(err.is_fatal());
}
