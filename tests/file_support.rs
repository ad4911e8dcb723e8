//! Integration tests for document extraction: PDF and Office formats,
//! size limits, and unreadable input.

mod common;

use study_rag::extract::{
    content_type_for, extract_document, MIME_DOCX, MIME_PDF, MIME_PPTX, MIME_TEXT,
};
use study_rag_core::models::Document;
use study_rag_core::RagError;

use common::{docx_with_paragraphs, pdf_with_pages, GEOGRAPHY};

const LIMIT: usize = 4 * 1024 * 1024;

#[test]
fn file_support_pdf_pages_are_extracted() {
    let bytes = pdf_with_pages(&[
        &["Mitochondria produce energy for the cell."],
        &["Ribosomes assemble proteins from amino acids."],
    ]);
    let doc = Document::new("biology.pdf", MIME_PDF, bytes);
    let extracted = extract_document(&doc, LIMIT).unwrap();

    assert_eq!(extracted.page_count, Some(2));
    assert!(extracted.text.contains("Mitochondria"), "{}", extracted.text);
    assert!(extracted.text.contains("Ribosomes"), "{}", extracted.text);
    let first = extracted.text.find("Mitochondria").unwrap();
    let second = extracted.text.find("Ribosomes").unwrap();
    assert!(first < second, "pages out of order: {}", extracted.text);
}

#[test]
fn file_support_pdf_lines_keep_their_words() {
    let doc = Document::new("geo.pdf", MIME_PDF, pdf_with_pages(&[&GEOGRAPHY]));
    let text = extract_document(&doc, LIMIT).unwrap().text;
    for word in ["capital", "France", "population", "Eiffel", "1889"] {
        assert!(text.contains(word), "missing {word} in {text}");
    }
}

#[test]
fn file_support_docx_paragraphs() {
    let bytes = docx_with_paragraphs(&["Photosynthesis makes sugar.", "Plants need light."]);
    let doc = Document::new("notes.docx", MIME_DOCX, bytes);
    let extracted = extract_document(&doc, LIMIT).unwrap();

    assert_eq!(extracted.page_count, None);
    assert_eq!(
        extracted.text,
        "Photosynthesis makes sugar.\n\nPlants need light."
    );
}

#[test]
fn file_support_docx_without_text_is_unreadable() {
    let doc = Document::new("empty.docx", MIME_DOCX, docx_with_paragraphs(&[]));
    let err = extract_document(&doc, LIMIT).unwrap_err();
    assert!(matches!(err, RagError::UnreadableDocument(_)));
}

#[test]
fn file_support_corrupt_files_are_unreadable() {
    for (name, mime) in [("bad.pdf", MIME_PDF), ("bad.pptx", MIME_PPTX)] {
        let doc = Document::new(name, mime, b"not a valid document".to_vec());
        let err = extract_document(&doc, LIMIT).unwrap_err();
        assert_eq!(err.kind(), "unreadable_document", "{name}");
    }
}

#[test]
fn file_support_size_limit_checked_first() {
    let doc = Document::new("big.pdf", MIME_PDF, vec![0u8; 2000]);
    let err = extract_document(&doc, 1000).unwrap_err();
    assert!(matches!(
        err,
        RagError::PayloadTooLarge {
            size: 2000,
            limit: 1000
        }
    ));
}

#[test]
fn file_support_content_types_by_extension() {
    assert_eq!(content_type_for("Lecture 3.PDF"), Some(MIME_PDF));
    assert_eq!(content_type_for("notes.txt"), Some(MIME_TEXT));
    assert_eq!(content_type_for("archive.tar.gz"), None);
}
