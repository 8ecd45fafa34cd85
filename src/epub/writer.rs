//! EPUB writer: emits one chapter span as a self-contained EPUB.
//!
//! Produces a valid EPUB 2 container: mimetype first and uncompressed, then
//! `META-INF/container.xml`, a generated OPF and NCX, the span's content
//! documents, and the source's shared resources (CSS, images, fonts) so the
//! chapter renders standalone.

use std::io::{Seek, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::detect::ChapterSpan;
use crate::document::{ContentUnit, Document, FileType};
use crate::error::{Error, Result};
use crate::settings::SplitSettings;

/// Write the units in `span` as a self-contained EPUB to `writer`.
///
/// When the source is not an EPUB, units carry no XHTML body and a chapter
/// document is synthesized from their plain text; a span with no extractable
/// text at all fails with [`Error::UnsupportedConversion`].
pub fn write_epub_chapter<W: Write + Seek>(
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
    writer: W,
) -> Result<()> {
    let units: Vec<&ContentUnit> = (span.start_unit_index..span.end_unit_index)
        .filter_map(|i| document.unit(i))
        .collect();

    // (href, body, media_type) for each chapter document in the output.
    let mut docs: Vec<(String, Vec<u8>, String)> = Vec::with_capacity(units.len());
    for unit in &units {
        if unit.body.is_empty() {
            if unit.text.trim().is_empty() {
                continue;
            }
            let href = format!("{}.xhtml", sanitize_href(&unit.name));
            let body = synthesize_xhtml(&span.title, &unit.text);
            docs.push((href, body.into_bytes(), "application/xhtml+xml".to_string()));
        } else {
            docs.push((unit.name.clone(), unit.body.clone(), unit.media_type.clone()));
        }
    }

    if docs.is_empty() {
        return Err(Error::UnsupportedConversion(format!(
            "chapter {} has no content representable as EPUB",
            span.index
        )));
    }

    write_epub_chapter_to_writer(document, span, settings, &docs, writer)
}

/// Lower-level entry: package prepared chapter documents into the container.
pub fn write_epub_chapter_to_writer<W: Write + Seek>(
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
    docs: &[(String, Vec<u8>, String)],
    writer: W,
) -> Result<()> {
    let mut zip = ZipWriter::new(writer);

    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // mimetype must be the first entry and uncompressed.
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    let identifier = document
        .metadata
        .get("identifier")
        .map(|id| format!("{id}-ch{}", span.index))
        .unwrap_or_else(|| format!("urn:uuid:{}", uuid_v4()));

    // Shared resources only make sense when the chapter documents came from
    // an EPUB source and may reference them.
    let resources: &[_] = if document.file_type == FileType::Epub {
        &document.resources
    } else {
        &[]
    };

    let opf = generate_opf(document, span, settings, docs, resources, &identifier);
    zip.start_file("OEBPS/content.opf", options_deflate)?;
    zip.write_all(opf.as_bytes())?;

    let ncx = generate_ncx(span, docs, &identifier);
    zip.start_file("OEBPS/toc.ncx", options_deflate)?;
    zip.write_all(ncx.as_bytes())?;

    for (href, body, _) in docs {
        zip.start_file(format!("OEBPS/{href}"), options_deflate)?;
        zip.write_all(body)?;
    }

    for resource in resources {
        zip.start_file(format!("OEBPS/{}", resource.href), options_deflate)?;
        zip.write_all(&resource.data)?;
    }

    zip.finish()?;
    Ok(())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn generate_opf(
    document: &Document,
    span: &ChapterSpan,
    settings: &SplitSettings,
    docs: &[(String, Vec<u8>, String)],
    resources: &[crate::document::SharedResource],
    identifier: &str,
) -> String {
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
    );

    // Chapter-specific metadata is always set; source metadata only when
    // preservation is requested.
    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&span.title)
    ));
    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(identifier)
    ));
    opf.push_str(&format!(
        "    <meta name=\"chapter-number\" content=\"{}\"/>\n",
        span.index
    ));

    let language = document
        .metadata
        .get("language")
        .filter(|_| settings.preserve_metadata)
        .unwrap_or("en");
    opf.push_str(&format!("    <dc:language>{}</dc:language>\n", escape_xml(language)));

    if settings.preserve_metadata {
        if let Some(author) = document.metadata.get("author") {
            opf.push_str(&format!(
                "    <dc:creator>{}</dc:creator>\n",
                escape_xml(author)
            ));
        }
        if let Some(publisher) = document.metadata.get("publisher") {
            opf.push_str(&format!(
                "    <dc:publisher>{}</dc:publisher>\n",
                escape_xml(publisher)
            ));
        }
        if let Some(date) = document.metadata.get("date") {
            opf.push_str(&format!("    <dc:date>{}</dc:date>\n", escape_xml(date)));
        }
        if let Some(title) = document.metadata.get("title") {
            opf.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                escape_xml(&format!("{} - {}", title, span.title))
            ));
        }
    }

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );

    for (href, _, media_type) in docs {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            href_to_id(href),
            escape_xml(href),
            escape_xml(media_type)
        ));
    }
    for resource in resources {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            href_to_id(&resource.href),
            escape_xml(&resource.href),
            escape_xml(&resource.media_type)
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
    for (href, _, _) in docs {
        opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", href_to_id(href)));
    }
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_ncx(span: &ChapterSpan, docs: &[(String, Vec<u8>, String)], identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(&span.title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    if let Some((href, _, _)) = docs.first() {
        ncx.push_str("    <navPoint id=\"navpoint-1\" playOrder=\"1\">\n");
        ncx.push_str(&format!(
            "      <navLabel>\n        <text>{}</text>\n      </navLabel>\n",
            escape_xml(&span.title)
        ));
        ncx.push_str(&format!("      <content src=\"{}\"/>\n", escape_xml(href)));
        ncx.push_str("    </navPoint>\n");
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

/// Build a chapter XHTML document from plain unit text (cross-format path).
fn synthesize_xhtml(title: &str, text: &str) -> String {
    let mut body = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        body.push_str(&format!("  <p>{}</p>\n", escape_xml(line)));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{}</body>
</html>"#,
        escape_xml(title),
        body
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn href_to_id(href: &str) -> String {
    let id = href.replace(['/', '.', ' ', '-'], "_");
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        format!("id_{id}")
    } else {
        id
    }
}

/// Hrefs synthesized from PDF page labels must be zip- and id-safe.
fn sanitize_href(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Generate a simple UUID v4 (random)
fn uuid_v4() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed);

    // Simple PRNG for identifier generation; uniqueness matters, secrecy
    // does not.
    let mut state = seed;
    let mut bytes = [0u8; 16];
    for byte in &mut bytes {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        *byte = (state >> 33) as u8;
    }

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
        bytes[6],
        bytes[7],
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b < c"), "a &amp; b &lt; c");
    }

    #[test]
    fn test_href_to_id_stable() {
        assert_eq!(href_to_id("text/ch 1.xhtml"), "text_ch_1_xhtml");
        assert!(href_to_id("01.xhtml").starts_with("id_"));
    }

    #[test]
    fn test_synthesize_xhtml_paragraphs() {
        let xhtml = synthesize_xhtml("Ch & Co", "line one\n\nline <two>");
        assert!(xhtml.contains("<title>Ch &amp; Co</title>"));
        assert!(xhtml.contains("<p>line one</p>"));
        assert!(xhtml.contains("<p>line &lt;two&gt;</p>"));
    }

    #[test]
    fn test_sanitize_href() {
        assert_eq!(sanitize_href("page-3"), "page-3");
        assert_eq!(sanitize_href("a b/c"), "a-b-c");
    }
}
