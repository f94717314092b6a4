//! Turns a folder of Amharic documents into Harmony corpus rows.

use std::fs::{self, File};
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::export::{write_csv, write_jsonl, write_parquet};
use super::harmony::{CorpusCsvRecord, CorpusRow};
use crate::error::DatasetError;

pub const CHUNK_CHARS: usize = 2000;
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "csv", "json", "jsonl", "pdf", "docx"];

/// Files the converter will read, sorted by name. Not recursive.
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && document_kind(path).is_some())
        .collect();
    files.sort();
    Ok(files)
}

fn document_kind(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().copied().find(|s| *s == ext)
}

/// Plain text of one document. Unreadable files yield `None`.
pub fn extract_text(path: &Path) -> Option<String> {
    let result = match document_kind(path)? {
        "csv" => extract_csv(path),
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        _ => fs::read_to_string(path).map_err(DatasetError::from),
    };

    match result {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "skipping unreadable document");
            None
        }
    }
}

/// Header and records, one line each, fields separated by spaces.
fn extract_csv(path: &Path) -> Result<String, DatasetError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut lines = vec![reader.headers()?.iter().collect::<Vec<_>>().join(" ")];
    for record in reader.records() {
        lines.push(record?.iter().collect::<Vec<_>>().join(" "));
    }
    Ok(lines.join("\n"))
}

/// Text of every page. The PDF parser can panic on malformed files, which
/// is treated like any other unreadable document.
fn extract_pdf(path: &Path) -> Result<String, DatasetError> {
    match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DatasetError::Document(e.to_string())),
        Err(_) => Err(DatasetError::Document("PDF parser panicked".to_string())),
    }
}

/// Paragraph text from `word/document.xml`, one paragraph per line.
fn extract_docx(path: &Path) -> Result<String, DatasetError> {
    let mut archive =
        ZipArchive::new(File::open(path)?).map_err(|e| DatasetError::Document(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| DatasetError::Document(e.to_string()))?
        .read_to_string(&mut xml)?;

    docx_paragraphs(&xml).map_err(|e| DatasetError::Document(e.to_string()))
}

fn docx_paragraphs(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let raw = t.decode()?;
                current.push_str(&quick_xml::escape::unescape(&raw)?);
            }
            Event::GeneralRef(r) if in_text => {
                if let Some(c) = r.resolve_char_ref()? {
                    current.push(c);
                } else if let Some(s) = quick_xml::escape::resolve_predefined_entity(&r.decode()?) {
                    current.push_str(s);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// Fixed-size pieces counted in characters, never splitting a code point.
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub fn convert_directory(dir: &Path) -> Result<Vec<CorpusRow>, DatasetError> {
    let mut rows = Vec::new();

    for file in find_documents(dir)? {
        let Some(text) = extract_text(&file) else {
            continue;
        };
        if text.trim().is_empty() {
            debug!(file = %file.display(), "empty document");
            continue;
        }

        let before = rows.len();
        rows.extend(chunk_text(&text, CHUNK_CHARS).iter().map(|c| CorpusRow::from_chunk(c)));
        debug!(file = %file.display(), chunks = rows.len() - before, "document converted");
    }

    Ok(rows)
}

/// Writes `amharic_harmony.jsonl`, `amharic_harmony.csv` and
/// `amharic_harmony.parquet` into `out_dir`.
pub fn save_corpus(rows: &[CorpusRow], out_dir: &Path) -> Result<(), DatasetError> {
    fs::create_dir_all(out_dir)?;
    write_jsonl(&out_dir.join("amharic_harmony.jsonl"), rows)?;

    let records = rows
        .iter()
        .map(CorpusCsvRecord::new)
        .collect::<Result<Vec<_>, _>>()?;
    write_csv(&out_dir.join("amharic_harmony.csv"), &records, false)?;
    write_parquet(&out_dir.join("amharic_harmony.parquet"), &records)?;

    info!(rows = rows.len(), dir = %out_dir.display(), "corpus saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::export::read_parquet_columns;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>ሰላም</w:t></w:r><w:r><w:t xml:space="preserve"> ዓለም</w:t></w:r></w:p>
    <w:p><w:r><w:t>ቡና &amp; ሻይ</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn write_docx(path: &Path, document_xml: &str) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_chunk_text_counts_characters() {
        let text = "ሀ".repeat(4500);
        let chunks = chunk_text(&text, CHUNK_CHARS);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[2].chars().count(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_convert_directory_filters_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "ሰላም ዓለም").unwrap();
        fs::write(dir.path().join("a.csv"), "ቃል,ትርጉም\nሰላም,peace\n").unwrap();
        fs::write(dir.path().join("blank.txt"), "   \n").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("long.jsonl"), "ለ".repeat(2001)).unwrap();

        let rows = convert_directory(dir.path()).unwrap();
        let finals: Vec<&str> = rows.iter().map(|r| r.final_text.as_str()).collect();

        assert_eq!(finals.len(), 4);
        assert_eq!(finals[0], "ቃል ትርጉም\nሰላም peace");
        assert_eq!(finals[1], "ሰላም ዓለም");
        assert_eq!(finals[3], "ለ");
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        write_docx(&path, DOCUMENT_XML);

        assert_eq!(extract_text(&path).unwrap(), "ሰላም ዓለም\nቡና & ሻይ");
    }

    #[test]
    fn test_broken_pdf_and_docx_contribute_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4 not really").unwrap();
        fs::write(dir.path().join("b.docx"), b"PK but not a zip").unwrap();
        write_docx(&dir.path().join("c.docx"), DOCUMENT_XML);
        fs::write(dir.path().join("d.txt"), "ጽሑፍ").unwrap();

        let files = find_documents(dir.path()).unwrap();
        assert_eq!(files.len(), 4);
        assert!(extract_text(&dir.path().join("a.pdf")).is_none());
        assert!(extract_text(&dir.path().join("b.docx")).is_none());

        let rows = convert_directory(dir.path()).unwrap();
        let finals: Vec<&str> = rows.iter().map(|r| r.final_text.as_str()).collect();
        assert_eq!(finals, vec!["ሰላም ዓለም\nቡና & ሻይ", "ጽሑፍ"]);
    }

    #[test]
    fn test_save_corpus_writes_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![CorpusRow::from_chunk("ጽሑፍ")];
        save_corpus(&rows, dir.path()).unwrap();

        let jsonl = fs::read_to_string(dir.path().join("amharic_harmony.jsonl")).unwrap();
        let parsed: CorpusRow = serde_json::from_str(jsonl.trim()).unwrap();
        assert_eq!(parsed, rows[0]);

        let csv = fs::read_to_string(dir.path().join("amharic_harmony.csv")).unwrap();
        assert!(csv.starts_with("reasoning_language,developer,user,analysis,final,messages"));

        let (columns, values) = read_parquet_columns(&dir.path().join("amharic_harmony.parquet"));
        assert_eq!(columns[4], "final");
        assert_eq!(values, vec![vec![
            "Amharic".to_string(),
            rows[0].developer.clone(),
            rows[0].user.clone(),
            String::new(),
            "ጽሑፍ".to_string(),
            serde_json::to_string(&rows[0].messages).unwrap(),
        ]]);
    }
}
