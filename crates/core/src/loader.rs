use crate::error::IngestError;
use crate::extractor::{extract_text_from_bytes, DocumentFormat};
use crate::models::{DocumentFingerprint, SourceDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An uploaded document held in memory, as handed over by an ingestion
/// front-end that never touches the filesystem.
#[derive(Debug, Clone)]
pub struct NamedBytes {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of a best-effort load: every readable recognized document, its
/// provenance fingerprint, and the files that were skipped with the reason.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    pub fingerprints: Vec<DocumentFingerprint>,
    pub skipped: Vec<SkippedFile>,
}

/// Recursively lists recognized document files (txt, docx, pdf) under
/// `folder`, sorted for deterministic ingestion order.
pub fn discover_document_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let recognized = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DocumentFormat::from_extension)
            .is_some();

        if recognized {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    Ok(digest_bytes(&bytes))
}

/// Loads every recognized document under `folder`. A file that cannot be
/// read or parsed lands in `LoadReport::skipped` and the scan continues; an
/// empty or absent folder simply yields an empty report.
pub fn load_documents_from_dir(folder: &Path) -> LoadReport {
    let mut report = LoadReport::default();

    for path in discover_document_files(folder) {
        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_string(),
            None => {
                report.skipped.push(SkippedFile {
                    name: path.display().to_string(),
                    reason: "path has no file name".to_string(),
                });
                continue;
            }
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) => {
                report.skipped.push(SkippedFile {
                    name,
                    reason: format!("io error: {error}"),
                });
                continue;
            }
        };

        match extract_text_from_bytes(&name, &bytes) {
            Ok(content) => {
                report.fingerprints.push(DocumentFingerprint {
                    source_id: name.clone(),
                    source_path: path.to_string_lossy().to_string(),
                    checksum: digest_bytes(&bytes),
                    ingested_at: Utc::now(),
                });
                report.documents.push(SourceDocument {
                    content,
                    source_id: name,
                });
            }
            Err(error) => report.skipped.push(SkippedFile {
                name,
                reason: error.to_string(),
            }),
        }
    }

    report
}

/// In-memory counterpart of [`load_documents_from_dir`] for `(filename,
/// bytes)` pairs. Files with unrecognized extensions are skipped silently,
/// matching the directory scan.
pub fn load_documents_from_bytes(files: &[NamedBytes]) -> LoadReport {
    let mut report = LoadReport::default();

    for file in files {
        if DocumentFormat::from_file_name(&file.name).is_none() {
            continue;
        }

        match extract_text_from_bytes(&file.name, &file.bytes) {
            Ok(content) => {
                report.fingerprints.push(DocumentFingerprint {
                    source_id: file.name.clone(),
                    source_path: file.name.clone(),
                    checksum: digest_bytes(&file.bytes),
                    ingested_at: Utc::now(),
                });
                report.documents.push(SourceDocument {
                    content,
                    source_id: file.name.clone(),
                });
            }
            Err(error) => report.skipped.push(SkippedFile {
                name: file.name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::{
        digest_file, discover_document_files, load_documents_from_bytes,
        load_documents_from_dir, NamedBytes,
    };
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("b.txt"), "late")?;
        fs::write(base.join("a.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(nested.join("c.docx"), b"zip")?;
        fs::write(base.join("ignored.md"), "not recognized")?;

        let files = discover_document_files(base);
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("a.pdf"));
        assert!(files[1].ends_with("b.txt"));
        assert!(files[2].ends_with("nested/c.docx"));
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        assert_eq!(digest_file(&file_path)?, digest_file(&file_path)?);
        Ok(())
    }

    #[test]
    fn unreadable_files_are_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.txt"), "AVAS shall emit sound in reverse")?;
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken")?;

        let report = load_documents_from_dir(dir.path());

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].source_id, "good.txt");
        assert_eq!(report.fingerprints.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "broken.pdf");
        Ok(())
    }

    #[test]
    fn empty_directory_yields_empty_report() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let report = load_documents_from_dir(dir.path());
        assert!(report.documents.is_empty());
        assert!(report.skipped.is_empty());
        Ok(())
    }

    #[test]
    fn in_memory_files_follow_the_same_policy() {
        let files = vec![
            NamedBytes {
                name: "rules.txt".to_string(),
                bytes: b"braking distance limits".to_vec(),
            },
            NamedBytes {
                name: "notes.md".to_string(),
                bytes: b"ignored silently".to_vec(),
            },
            NamedBytes {
                name: "scan.pdf".to_string(),
                bytes: b"%PDF-1.4\n%broken".to_vec(),
            },
        ];

        let report = load_documents_from_bytes(&files);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].content, "braking distance limits");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "scan.pdf");
    }
}
