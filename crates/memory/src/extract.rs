//! Plain-text extraction for uploaded documents.
//!
//! `.txt` and `.md` must be UTF-8. `.pdf` text comes from `pdf-extract`;
//! `.docx` paragraphs are read from `word/document.xml` inside the archive.

use quick_xml::events::Event;
use ragent_core::error::RetrievalError;
use std::io::{Cursor, Read};
use std::path::Path;

/// File extensions the index accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".txt", ".md", ".pdf", ".docx"];

/// Lower-cased extension with its leading dot, or the whole name when it has none.
pub(crate) fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| filename.to_string())
}

pub fn is_supported_file(filename: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(filename).as_str())
}

/// Turn the raw bytes of `filename` into indexable text.
///
/// CPU-bound; async callers should run it on a blocking thread.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, RetrievalError> {
    match extension_of(filename).as_str() {
        ".txt" | ".md" => String::from_utf8(bytes.to_vec())
            .map_err(|_| RetrievalError::InvalidDocument(format!("'{filename}' is not valid UTF-8 text"))),
        ".pdf" => pdf_text(bytes)
            .map_err(|e| RetrievalError::InvalidDocument(format!("cannot read PDF '{filename}': {e}"))),
        ".docx" => docx_text(bytes)
            .map_err(|e| RetrievalError::InvalidDocument(format!("cannot read DOCX '{filename}': {e}"))),
        other => Err(RetrievalError::UnsupportedFormat(other.to_string())),
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;
    // Pages are separated by form feeds.
    Ok(text
        .split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a ZIP archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| "missing word/document.xml".to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {e}"))?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    paragraph.clear();
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| format!("bad XML text: {e}"))?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("XML parse error at {}: {e}", reader.buffer_position())),
        }
    }

    Ok(paragraphs.join("\n\n"))
}
