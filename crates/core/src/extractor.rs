use crate::error::IngestError;
use lopdf::Document;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;

/// Document formats the loader recognizes. Anything else is skipped without
/// comment during a directory scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    WordProcessing,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension.eq_ignore_ascii_case("txt") {
            Some(DocumentFormat::PlainText)
        } else if extension.eq_ignore_ascii_case("docx") {
            Some(DocumentFormat::WordProcessing)
        } else if extension.eq_ignore_ascii_case("pdf") {
            Some(DocumentFormat::Pdf)
        } else {
            None
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension().and_then(|ext| ext.to_str())?;
        Self::from_extension(extension)
    }
}

/// Extracts normalized text from one document file, dispatching on the file
/// extension. Plain text is read verbatim; word-processor paragraphs and PDF
/// pages are joined with newlines.
pub fn extract_text(path: &Path) -> Result<String, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    let bytes = std::fs::read(path)?;
    extract_text_from_bytes(name, &bytes)
}

/// Byte-slice variant of [`extract_text`] for callers that hold uploaded
/// documents in memory rather than on disk.
pub fn extract_text_from_bytes(name: &str, bytes: &[u8]) -> Result<String, IngestError> {
    let format = DocumentFormat::from_file_name(name).ok_or_else(|| {
        IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: "unrecognized file extension".to_string(),
        }
    })?;

    match format {
        DocumentFormat::PlainText => {
            String::from_utf8(bytes.to_vec()).map_err(|error| IngestError::UnreadableDocument {
                name: name.to_string(),
                reason: format!("not valid utf-8: {error}"),
            })
        }
        DocumentFormat::WordProcessing => extract_docx_text(name, bytes),
        DocumentFormat::Pdf => extract_pdf_text(name, bytes),
    }
}

fn extract_pdf_text(name: &str, bytes: &[u8]) -> Result<String, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: format!("pdf parse error: {error}"),
        })?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::UnreadableDocument {
                name: name.to_string(),
                reason: format!("pdf text extraction failed on page {page_no}: {error}"),
            })?;

        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    if pages.is_empty() {
        return Err(IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: "pdf had no readable page text".to_string(),
        });
    }

    Ok(pages.join("\n"))
}

/// A docx file is a zip archive; the body lives in `word/document.xml` as
/// WordprocessingML, with visible text inside `<w:t>` runs grouped into
/// `<w:p>` paragraphs.
fn extract_docx_text(name: &str, bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|error| {
            IngestError::UnreadableDocument {
                name: name.to_string(),
                reason: format!("not a readable docx archive: {error}"),
            }
        })?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: format!("docx body missing: {error}"),
        })?
        .read_to_string(&mut xml)
        .map_err(|error| IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: format!("docx body unreadable: {error}"),
        })?;

    let paragraphs = docx_paragraph_texts(&xml)?;
    if paragraphs.is_empty() {
        return Err(IngestError::UnreadableDocument {
            name: name.to_string(),
            reason: "docx had no paragraph text".to_string(),
        });
    }

    Ok(paragraphs.join("\n"))
}

fn docx_paragraph_texts(xml: &str) -> Result<Vec<String>, IngestError> {
    let run_re = Regex::new(r"<w:t[^>]*>([^<]*)</w:t>")?;

    let mut paragraphs = Vec::new();
    for paragraph_xml in xml.split("</w:p>") {
        let mut paragraph = String::new();
        for capture in run_re.captures_iter(paragraph_xml) {
            paragraph.push_str(&unescape_xml(&capture[1]));
        }
        if !paragraph.trim().is_empty() {
            paragraphs.push(paragraph);
        }
    }

    Ok(paragraphs)
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::{docx_paragraph_texts, extract_text_from_bytes, DocumentFormat};

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_file_name("Reg151.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_file_name("annex.docx"),
            Some(DocumentFormat::WordProcessing)
        );
        assert_eq!(DocumentFormat::from_file_name("notes.md"), None);
        assert_eq!(DocumentFormat::from_file_name("no_extension"), None);
    }

    #[test]
    fn plain_text_is_read_verbatim() {
        let text = extract_text_from_bytes("reg.txt", "line one\nline two".as_bytes()).unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn invalid_utf8_text_is_unreadable() {
        let result = extract_text_from_bytes("reg.txt", &[0xff, 0xfe, 0x00]);
        assert!(result.is_err());
    }

    #[test]
    fn docx_paragraphs_keep_order_and_unescape_entities() {
        let xml = "<w:document><w:body>\
            <w:p><w:r><w:t>First </w:t></w:r><w:r><w:t xml:space=\"preserve\">run</w:t></w:r></w:p>\
            <w:p><w:r><w:t>Sound &lt; 75 dB(A) &amp; audible</w:t></w:r></w:p>\
            <w:p></w:p>\
            </w:body></w:document>";

        let paragraphs = docx_paragraph_texts(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec![
                "First run".to_string(),
                "Sound < 75 dB(A) & audible".to_string()
            ]
        );
    }

    #[test]
    fn corrupt_docx_is_unreadable() {
        let result = extract_text_from_bytes("broken.docx", b"not a zip archive");
        assert!(result.is_err());
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let result = extract_text_from_bytes("broken.pdf", b"%PDF-1.4\n%broken");
        assert!(result.is_err());
    }
}
