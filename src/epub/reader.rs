//! EPUB reader: parses an EPUB container into a [`Document`].
//!
//! Follows the container chain: `META-INF/container.xml` names the OPF
//! package document, the OPF supplies metadata, manifest and spine, and the
//! NCX (when present and well-formed) supplies the outline. A missing or
//! malformed NCX degrades to an empty outline; detection then falls back to
//! heading heuristics.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::document::{ContentUnit, DocMetadata, Document, FileType, Outline, SharedResource};
use crate::error::{Error, Result};

/// Parsed OPF content
struct OpfData {
    metadata: DocMetadata,
    /// Maps manifest id -> (href, media_type)
    manifest: HashMap<String, (String, String)>,
    spine_ids: Vec<String>,
    ncx_href: Option<String>,
}

/// A raw NCX entry before spine resolution.
struct NavPoint {
    title: String,
    src: String,
    children: Vec<NavPoint>,
}

/// Read an EPUB file from disk into a [`Document`].
///
/// Fails with [`Error::UnreadableDocument`] when the file is absent or not a
/// valid EPUB container. Partial corruption inside the container (missing
/// NCX, truncated metadata) degrades to gaps in the model instead of failing.
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::UnreadableDocument(format!("{}: {e}", path.display())))?;
    read_epub_from_reader(file, path)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
///
/// `source_path` is recorded on the resulting document and used for title
/// fallback; it does not need to exist on disk.
pub fn read_epub_from_reader<R: Read + Seek>(reader: R, source_path: &Path) -> Result<Document> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| Error::UnreadableDocument(format!("{}: {e}", source_path.display())))?;

    // The container chain (container.xml -> OPF) is the document's spine;
    // any failure in it means the source is not a usable EPUB, so parse
    // errors here are fatal rather than their non-fatal Xml kind.
    let opf_path = find_opf_path(&mut archive).map_err(|e| match e {
        e @ Error::UnreadableDocument(_) => e,
        e => Error::UnreadableDocument(format!("{}: {e}", source_path.display())),
    })?;
    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    let opf_content = read_archive_file(&mut archive, &opf_path).map_err(|e| {
        Error::UnreadableDocument(format!("{}: missing package document: {e}", source_path.display()))
    })?;
    let OpfData {
        metadata,
        manifest,
        spine_ids,
        ncx_href,
    } = parse_opf(&opf_content).map_err(|e| {
        Error::UnreadableDocument(format!(
            "{}: malformed package document: {e}",
            source_path.display()
        ))
    })?;

    let mut document = Document::new(source_path, FileType::Epub);
    document.metadata = metadata;
    if document.metadata.title.is_none() {
        document.metadata.title = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
    }

    // Spine itemrefs become content units, in reading order. Units keep their
    // raw XHTML body plus a plain-text rendering for the heading heuristic.
    let mut spine_hrefs: Vec<String> = Vec::new();
    for id in &spine_ids {
        let Some((href, media_type)) = manifest.get(id) else {
            debug!(idref = %id, "spine itemref missing from manifest, skipping");
            continue;
        };
        let full_path = resolve_path(&opf_dir, href);
        let body = read_archive_file_bytes(&mut archive, &full_path).unwrap_or_default();
        if body.is_empty() {
            debug!(href = %href, "spine item has no content");
        }
        let text = extract_text(&body);
        spine_hrefs.push(href.clone());
        document.content_units.push(ContentUnit {
            name: href.clone(),
            text,
            body,
            media_type: media_type.clone(),
        });
    }

    // Everything else in the manifest rides along as a shared resource so
    // chapter output can stay self-contained (CSS, images, fonts).
    for (href, media_type) in manifest.values() {
        if spine_hrefs.iter().any(|s| s == href) || Some(href.as_str()) == ncx_href.as_deref() {
            continue;
        }
        let full_path = resolve_path(&opf_dir, href);
        if let Ok(data) = read_archive_file_bytes(&mut archive, &full_path) {
            document.resources.push(SharedResource {
                href: href.clone(),
                data,
                media_type: media_type.clone(),
            });
        }
    }

    // NCX is optional; a broken one yields an empty outline, not a failure.
    if let Some(ncx_href) = ncx_href {
        let ncx_path = resolve_path(&opf_dir, &ncx_href);
        match read_archive_file(&mut archive, &ncx_path) {
            Ok(ncx_content) => match parse_ncx(&ncx_content) {
                Ok(points) => {
                    attach_nav_points(&mut document.outline, None, &points, &spine_hrefs);
                }
                Err(e) => warn!(error = %e, "malformed NCX, continuing without outline"),
            },
            Err(e) => debug!(error = %e, "NCX listed in spine but absent from archive"),
        }
    }

    Ok(document)
}

/// Resolve NCX entries to spine indices and insert them into the arena.
/// Entries pointing outside the spine are dropped; their children are
/// promoted to the dropped entry's parent.
fn attach_nav_points(
    outline: &mut Outline,
    parent: Option<usize>,
    points: &[NavPoint],
    spine_hrefs: &[String],
) {
    for point in points {
        match resolve_spine_index(&point.src, spine_hrefs) {
            Some(index) => {
                let id = match parent {
                    Some(p) => outline.push_child(p, point.title.clone(), index),
                    None => outline.push_root(point.title.clone(), index),
                };
                attach_nav_points(outline, Some(id), &point.children, spine_hrefs);
            }
            None => {
                debug!(src = %point.src, "NCX entry does not resolve to a spine item");
                attach_nav_points(outline, parent, &point.children, spine_hrefs);
            }
        }
    }
}

/// Match an NCX `content src` against spine hrefs, ignoring fragments and
/// percent-encoding differences.
///
/// Exact matches are checked across the whole spine before any relative-path
/// suffix match is tried, and suffixes must start at a `/` boundary, so
/// `1.xhtml` can never be claimed by `ch1.xhtml` or `part1.xhtml`.
fn resolve_spine_index(src: &str, spine_hrefs: &[String]) -> Option<usize> {
    let bare = src.split('#').next().unwrap_or(src);
    let decoded = percent_decoded(bare);
    let hrefs: Vec<String> = spine_hrefs.iter().map(|h| percent_decoded(h)).collect();

    if let Some(index) = hrefs.iter().position(|href| *href == decoded) {
        return Some(index);
    }

    hrefs
        .iter()
        .position(|href| is_path_suffix(href, &decoded) || is_path_suffix(&decoded, href))
}

fn percent_decoded(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// True when `suffix` is a trailing path component sequence of `path`.
fn is_path_suffix(path: &str, suffix: &str) -> bool {
    path.len() > suffix.len()
        && path.ends_with(suffix)
        && path.as_bytes()[path.len() - suffix.len() - 1] == b'/'
}

/// Plain-text rendering of an XHTML body, for heading heuristics and
/// text-level conversion. Parse errors end extraction early rather than fail.
fn extract_text(body: &[u8]) -> String {
    let Ok(content) = std::str::from_utf8(strip_bom(body)) else {
        return String::new();
    };

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"script" | b"style" => skip_depth += 1,
                    // Block-level boundaries become line breaks so headings
                    // stay on their own line.
                    b"p" | b"div" | b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6" | b"li"
                    | b"br" | b"tr" | b"title" => {
                        if !text.is_empty() && !text.ends_with('\n') {
                            text.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if matches!(local_name(e.name().as_ref()), b"script" | b"style") {
                    skip_depth = skip_depth.saturating_sub(1);
                }
            }
            Ok(Event::Text(e)) => {
                if skip_depth == 0 {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    let trimmed = raw.trim();
                    if !trimmed.is_empty() {
                        if !text.is_empty() && !text.ends_with('\n') {
                            text.push(' ');
                        }
                        text.push_str(trimmed);
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if skip_depth == 0 {
                    text.push_str(resolve_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    text
}

fn resolve_entity(entity: &str) -> &'static str {
    match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => " ",
        _ => "",
    }
}

fn find_opf_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container = read_archive_file(archive, "META-INF/container.xml")
        .map_err(|e| Error::UnreadableDocument(format!("missing container.xml: {e}")))?;

    let mut reader = Reader::from_str(&container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::UnreadableDocument(
        "no rootfile found in container.xml".into(),
    ))
}

fn parse_opf(content: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut metadata = DocMetadata::default();
    let mut manifest: HashMap<String, (String, String)> = HashMap::new();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut ncx_href: Option<String> = None;
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"date" => {
                        if in_metadata {
                            current_element = Some(String::from_utf8_lossy(local).to_string());
                            buf_text.clear();
                        }
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => {
                        let mut id = String::new();
                        let mut href = String::new();
                        let mut media_type = String::new();

                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"id" => id = String::from_utf8(attr.value.to_vec())?,
                                b"href" => href = String::from_utf8(attr.value.to_vec())?,
                                b"media-type" => {
                                    media_type = String::from_utf8(attr.value.to_vec())?
                                }
                                _ => {}
                            }
                        }

                        if !id.is_empty() {
                            manifest.insert(id, (href, media_type));
                        }
                    }
                    b"itemref" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"idref" {
                                spine_ids.push(String::from_utf8(attr.value.to_vec())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if current_element.is_some() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    buf_text.push_str(&raw);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some() {
                    buf_text.push_str(resolve_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    match elem.as_str() {
                        // First creator wins; later ones are contributors in
                        // most real files.
                        "creator" => {
                            if metadata.author.is_none() {
                                metadata.set("author", buf_text.clone());
                            }
                        }
                        "identifier" => {
                            if metadata.identifier.is_none() {
                                metadata.set("identifier", buf_text.clone());
                            }
                        }
                        key => metadata.set(key, buf_text.clone()),
                    }
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    if let Some(toc_id) = toc_id
        && let Some((href, _)) = manifest.get(&toc_id)
    {
        ncx_href = Some(href.clone());
    }

    Ok(OpfData {
        metadata,
        manifest,
        spine_ids,
        ncx_href,
    })
}

fn parse_ncx(content: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // One state frame per open navPoint, plus a root frame.
    struct Frame {
        children: Vec<NavPoint>,
        text: Option<String>,
        src: Option<String>,
    }

    let mut stack: Vec<Frame> = vec![Frame {
        children: Vec::new(),
        text: None,
        src: None,
    }];
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"navPoint" => stack.push(Frame {
                    children: Vec::new(),
                    text: None,
                    src: None,
                }),
                b"text" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"content" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src"
                            && let Some(frame) = stack.last_mut()
                        {
                            frame.src = Some(String::from_utf8(attr.value.to_vec())?);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(frame) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    match &mut frame.text {
                        Some(existing) => existing.push_str(&raw),
                        None => frame.text = Some(raw.into_owned()),
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(frame) = stack.last_mut() {
                    let resolved = resolve_entity(&String::from_utf8_lossy(e.as_ref()));
                    match &mut frame.text {
                        Some(existing) => existing.push_str(resolved),
                        None => frame.text = Some(resolved.to_string()),
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" => {
                    if let Some(frame) = stack.pop() {
                        if let (Some(text), Some(src)) = (frame.text, frame.src) {
                            let point = NavPoint {
                                title: text,
                                src,
                                children: frame.children,
                            };
                            if let Some(parent) = stack.last_mut() {
                                parent.children.push(point);
                            }
                        } else if let Some(parent) = stack.last_mut() {
                            // Title-less or target-less entries are dropped
                            // but their children survive.
                            parent.children.extend(frame.children);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(stack.pop().map(|f| f.children).unwrap_or_default())
}

fn read_archive_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_archive_file_bytes(archive, path)?;
    let bytes = strip_bom(&bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    // Try direct lookup first
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Fallback: try percent-decoded path (handles malformed EPUBs)
    let decoded = percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| Error::UnreadableDocument(format!("invalid UTF-8 in path: {}", path)))?;

    let mut file = archive.by_name(&decoded)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Strip UTF-8 BOM (byte order mark) if present
fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

fn resolve_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", base, href)
    }
}

/// Extract local name from potentially namespaced XML name
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"opf:meta"), b"meta");
    }

    #[test]
    fn test_extract_text_blocks_and_entities() {
        let body = br#"<html><head><title>Ch</title><style>p{}</style></head>
<body><h1>Chapter 1</h1><p>Don&apos;t stop.</p><p>Second line.</p></body></html>"#;
        let text = extract_text(body);
        assert!(text.contains("Chapter 1\n"));
        assert!(text.contains("Don't stop."));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn test_resolve_spine_index_fragments_and_encoding() {
        let spine = vec!["text/ch%201.xhtml".to_string(), "text/ch2.xhtml".to_string()];
        assert_eq!(resolve_spine_index("text/ch2.xhtml#s1", &spine), Some(1));
        assert_eq!(resolve_spine_index("text/ch 1.xhtml", &spine), Some(0));
        assert_eq!(resolve_spine_index("ch2.xhtml", &spine), Some(1));
        assert_eq!(resolve_spine_index("nope.xhtml", &spine), None);
    }

    #[test]
    fn test_resolve_spine_index_exact_beats_suffix() {
        let spine = vec!["ch1.xhtml".to_string(), "1.xhtml".to_string()];
        assert_eq!(resolve_spine_index("1.xhtml", &spine), Some(1));
        assert_eq!(resolve_spine_index("ch1.xhtml", &spine), Some(0));
    }

    #[test]
    fn test_resolve_spine_index_suffix_needs_path_boundary() {
        let spine = vec!["part1.xhtml".to_string()];
        assert_eq!(resolve_spine_index("1.xhtml", &spine), None);

        let spine = vec!["OEBPS/text/1.xhtml".to_string()];
        assert_eq!(resolve_spine_index("text/1.xhtml", &spine), Some(0));
        assert_eq!(resolve_spine_index("ext/1.xhtml", &spine), None);
    }

    #[test]
    fn test_malformed_opf_is_fatal() {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;
        use zip::ZipWriter;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<container><rootfiles><rootfile full-path="content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        zip.start_file("content.opf", options).unwrap();
        zip.write_all(b"<package><metadata></mismatch>").unwrap();
        let buf = zip.finish().unwrap();

        let err = read_epub_from_reader(buf, Path::new("/tmp/bad.epub")).unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_opf_metadata_and_spine() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample &amp; Sons</dc:title>
    <dc:creator>First Author</dc:creator>
    <dc:creator>Second Author</dc:creator>
    <dc:language>en</dc:language>
    <dc:publisher>Acme</dc:publisher>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;
        let opf = parse_opf(opf).unwrap();
        assert_eq!(opf.metadata.get("title"), Some("Sample & Sons"));
        assert_eq!(opf.metadata.get("author"), Some("First Author"));
        assert_eq!(opf.metadata.get("publisher"), Some("Acme"));
        assert_eq!(opf.spine_ids, vec!["c1", "c2"]);
        assert_eq!(opf.ncx_href.as_deref(), Some("toc.ncx"));
    }

    #[test]
    fn test_parse_ncx_nested() {
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="c1.xhtml"/>
      <navPoint id="n2" playOrder="2">
        <navLabel><text>Section 1.1</text></navLabel>
        <content src="c1.xhtml#s1"/>
      </navPoint>
    </navPoint>
    <navPoint id="n3" playOrder="3">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="c2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;
        let points = parse_ncx(ncx).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].title, "Chapter 1");
        assert_eq!(points[0].children.len(), 1);
        assert_eq!(points[0].children[0].title, "Section 1.1");
        assert_eq!(points[1].src, "c2.xhtml");
    }
}
