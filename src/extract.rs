//! Text extraction and cleaning for uploaded documents.
//!
//! Turns a [`Document`]'s bytes into cleaned UTF-8 text ready for chunking.
//! The size limit is enforced before any parser sees the payload.
//!
//! | Content type | Extractor |
//! |--------------|-----------|
//! | `application/pdf` | `pdf-extract`, page by page |
//! | DOCX / PPTX / XLSX | ZIP + `quick-xml` over the OOXML parts |
//! | `text/plain`, `text/markdown` | UTF-8 decode (lossy) |
//!
//! # Cleaning
//!
//! 1. Control characters are dropped (tabs become spaces, `\r\n` becomes `\n`).
//! 2. Runs of spaces inside a line collapse to one; lines are trimmed.
//! 3. Header/footer lines repeating at the top or bottom of most pages are
//!    removed (digits are ignored when comparing, so `Page 3` matches `Page 4`).
//! 4. Pages and paragraphs are joined with a single blank line; longer runs
//!    of blank lines collapse.

use std::collections::HashMap;
use std::io::Read;

use study_rag_core::models::Document;
use study_rag_core::RagError;
use thiserror::Error;
use tracing::debug;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard for a single decompressed OOXML part.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Pages needed before header/footer detection kicks in.
const MIN_PAGES_FOR_EDGE_DETECTION: usize = 3;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

impl From<ExtractError> for RagError {
    fn from(e: ExtractError) -> Self {
        RagError::UnreadableDocument(e.to_string())
    }
}

/// Cleaned text plus what the extractor learned about the layout.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub page_count: Option<usize>,
}

/// Guess a content type from a file name's extension.
pub fn content_type_for(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "pptx" => Some(MIME_PPTX),
        "xlsx" => Some(MIME_XLSX),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

/// Reject a payload over `max_bytes` without looking inside it.
pub fn check_size(size: usize, max_bytes: usize) -> Result<(), RagError> {
    if size > max_bytes {
        return Err(RagError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Extract and clean a document's text.
///
/// Fails with [`RagError::PayloadTooLarge`] before parsing and with
/// [`RagError::UnreadableDocument`] when the parser fails or nothing but
/// whitespace survives cleaning.
pub fn extract_document(doc: &Document, max_bytes: usize) -> Result<Extracted, RagError> {
    check_size(doc.size(), max_bytes)?;

    let pages = extract_pages(&doc.bytes, &doc.content_type)?;
    let page_count = (doc.content_type == MIME_PDF).then_some(pages.len());
    let text = clean_pages(&pages);
    debug!(
        document_id = %doc.id,
        pages = pages.len(),
        chars = text.len(),
        "extracted text"
    );

    if text.is_empty() {
        return Err(RagError::UnreadableDocument(
            "document contains no extractable text (image-only or empty)".to_string(),
        ));
    }
    Ok(Extracted { text, page_count })
}

/// Raw text per page (or per slide / sheet / whole file).
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes).map(|t| vec![t]),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(vec![String::from_utf8_lossy(bytes).into_owned()]),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// ============ Cleaning ============

/// Normalise and join extracted pages.
pub fn clean_pages(pages: &[String]) -> String {
    let mut pages: Vec<Vec<String>> = pages.iter().map(|p| normalize_lines(p)).collect();
    strip_repeated_edges(&mut pages);

    let mut out = String::new();
    let mut paragraph_break = false;
    for page in &pages {
        for line in page.iter().map(String::as_str).chain(std::iter::once("")) {
            if line.is_empty() {
                paragraph_break = !out.is_empty();
                continue;
            }
            if !out.is_empty() {
                out.push_str(if paragraph_break { "\n\n" } else { "\n" });
            }
            out.push_str(line);
            paragraph_break = false;
        }
    }
    out
}

fn normalize_lines(page: &str) -> Vec<String> {
    page.replace("\r\n", "\n")
        .split(['\n', '\r', '\x0c'])
        .map(|line| {
            let mut out = String::with_capacity(line.len());
            for c in line.chars() {
                let c = if c == '\t' { ' ' } else { c };
                if c.is_control() {
                    continue;
                }
                if c.is_whitespace() && out.ends_with(' ') {
                    continue;
                }
                out.push(if c.is_whitespace() { ' ' } else { c });
            }
            out.trim().to_string()
        })
        .collect()
}

fn edge_key(line: &str) -> String {
    line.chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect()
}

fn first_content(page: &[String]) -> Option<usize> {
    page.iter().position(|l| !l.is_empty())
}

fn last_content(page: &[String]) -> Option<usize> {
    page.iter().rposition(|l| !l.is_empty())
}

/// Drop first/last lines that recur on at least half of the pages.
fn strip_repeated_edges(pages: &mut [Vec<String>]) {
    if pages.len() < MIN_PAGES_FOR_EDGE_DETECTION {
        return;
    }
    let quorum = pages.len().div_ceil(2).max(2);

    for pick in [first_content as fn(&[String]) -> Option<usize>, last_content] {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for page in pages.iter() {
            if let Some(i) = pick(page) {
                *counts.entry(edge_key(&page[i])).or_insert(0) += 1;
            }
        }
        for page in pages.iter_mut() {
            if let Some(i) = pick(page) {
                if counts.get(&edge_key(&page[i])).copied().unwrap_or(0) >= quorum {
                    page.remove(i);
                }
            }
        }
    }
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Numbered parts such as `ppt/slides/slide7.xml`, in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collect `<t>` text runs, ending a paragraph at each `</p>`.
fn collect_runs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) if matches!(e.local_name().as_ref(), b"tab" | b"br") => {
                out.push(' ')
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    numbered_parts(&archive, "ppt/slides/slide")
        .into_iter()
        .map(|name| collect_runs(&read_entry(&mut archive, &name)?))
        .collect()
}

fn extract_xlsx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };
    numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
        .map(|name| sheet_cells(&read_entry(&mut archive, &name)?, &shared))
        .collect()
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Shared-string and inline cells of one sheet, one row per line.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cell_kind: Option<Vec<u8>> = None;
    let mut in_value = false;
    let mut cells = 0usize;
    while cells < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_kind = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned());
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                let text = match cell_kind.as_deref() {
                    Some(b"s") => value.parse::<usize>().ok().and_then(|i| shared.get(i)).cloned(),
                    Some(b"inlineStr") | Some(b"str") => Some(value.to_string()),
                    _ => None,
                };
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    row.push(text);
                    cells += 1;
                }
                in_value = false;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_kind = None,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join(" ")),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}
