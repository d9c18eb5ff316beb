//! Text extraction from uploaded documents.
//!
//! Dispatches on content type to a backend that turns a file on disk into
//! plain text, joining multi-page/multi-sheet sources with a `[Page N]`
//! marker so downstream chunking can still recover page numbers when the
//! original layout mattered (the same convention the original ingestion
//! service used for OCR output).

use std::path::Path;

use calamine::Reader;

use crate::error::ExtractError;

/// One page (or sheet, or the whole document for flat formats) of
/// extracted text. `title` is set for spreadsheet sheets so `join_pages`
/// can render `[Sheet: <title>]` instead of `[Page N]`.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub page_number: i32,
    pub title: Option<String>,
    pub text: String,
}

/// Extract text from `path`, dispatching on `content_type`.
pub fn extract_text(path: &Path, content_type: &str) -> Result<Vec<ExtractedPage>, ExtractError> {
    match content_type {
        "application/pdf" => extract_pdf(path),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            extract_docx(path)
        }
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            extract_xlsx(path)
        }
        "text/csv" => extract_csv(path),
        "text/plain" | "text/markdown" => extract_plain(path),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Join extracted pages into one string. Sheets carry a `[Sheet: <title>]`
/// marker instead of `[Page N]`; the chunker treats either as ordinary text.
pub fn join_pages(pages: &[ExtractedPage]) -> String {
    pages
        .iter()
        .map(|p| match &p.title {
            Some(title) => format!("[Sheet: {title}]\n{}", p.text),
            None => format!("[Page {}]\n{}", p.page_number, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_pdf(path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| ExtractError::Backend(format!("pdf-extract failed: {e}")))?;

    // pdf-extract joins pages with form-feed characters; split them back
    // out so page numbers survive into the chunk metadata.
    let pages = text
        .split('\u{c}')
        .enumerate()
        .map(|(idx, page_text)| ExtractedPage {
            page_number: idx as i32 + 1,
            title: None,
            text: page_text.to_string(),
        })
        .collect();
    Ok(pages)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for run_child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = run_child {
            for run_content in &run.children {
                if let docx_rs::RunChild::Text(t) = run_content {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Flatten one table row's cells to `" | "`-joined text, per spec §4.1.
fn table_row_text(row: &docx_rs::TableRow) -> String {
    let mut cells = Vec::with_capacity(row.cells.len());
    for cell_child in &row.cells {
        let docx_rs::TableRowChild::TableCell(cell) = cell_child;
        let mut paragraphs = Vec::new();
        for content in &cell.children {
            if let docx_rs::TableCellContent::Paragraph(p) = content {
                paragraphs.push(paragraph_text(p));
            }
        }
        cells.push(paragraphs.join(" "));
    }
    cells.join(" | ")
}

/// Extract paragraphs in document order, then table rows as `" | "`-joined
/// cells, per spec §4.1. DOCX is treated as a single page.
fn extract_docx(path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Backend(e.to_string()))?;
    let docx = docx_rs::read_docx(&bytes)
        .map_err(|e| ExtractError::Backend(format!("docx-rs failed: {e:?}")))?;

    let mut paragraphs = String::new();
    let mut tables = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => {
                paragraphs.push_str(&paragraph_text(paragraph));
                paragraphs.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row_child in &table.rows {
                    let docx_rs::TableChild::TableRow(row) = row_child;
                    tables.push_str(&table_row_text(row));
                    tables.push('\n');
                }
            }
            _ => {}
        }
    }

    let text = if tables.is_empty() {
        paragraphs
    } else {
        format!("{paragraphs}\n{tables}")
    };

    Ok(vec![ExtractedPage {
        page_number: 1,
        title: None,
        text,
    }])
}

fn extract_xlsx(path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
    let mut workbook: calamine::Xlsx<_> = calamine::open_workbook(path)
        .map_err(|e| ExtractError::Backend(format!("calamine failed to open workbook: {e}")))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut pages = Vec::with_capacity(sheet_names.len());
    for (idx, name) in sheet_names.into_iter().enumerate() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Backend(format!("calamine failed to read sheet: {e}")))?;
        let mut text = String::new();
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            text.push_str(&cells.join("\t"));
            text.push('\n');
        }
        pages.push(ExtractedPage {
            page_number: idx as i32 + 1,
            title: Some(name),
            text,
        });
    }
    Ok(pages)
}

fn extract_csv(path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| ExtractError::Backend(e.to_string()))?;
    let mut text = String::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Backend(e.to_string()))?;
        text.push_str(&record.iter().collect::<Vec<_>>().join(","));
        text.push('\n');
    }
    Ok(vec![ExtractedPage {
        page_number: 1,
        title: None,
        text,
    }])
}

fn extract_plain(path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Backend(e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes).to_string();
    Ok(vec![ExtractedPage {
        page_number: 1,
        title: None,
        text,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn plain_text_round_trips() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "hello world").unwrap();
        let pages = extract_plain(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "hello world");
    }

    #[test]
    fn join_pages_inserts_page_markers() {
        let pages = vec![
            ExtractedPage {
                page_number: 1,
                title: None,
                text: "first".to_string(),
            },
            ExtractedPage {
                page_number: 2,
                title: None,
                text: "second".to_string(),
            },
        ];
        let joined = join_pages(&pages);
        assert_eq!(joined, "[Page 1]\nfirst\n\n[Page 2]\nsecond");
    }

    #[test]
    fn join_pages_uses_sheet_title_when_present() {
        let pages = vec![ExtractedPage {
            page_number: 1,
            title: Some("Revenue".to_string()),
            text: "a\tb".to_string(),
        }];
        let joined = join_pages(&pages);
        assert_eq!(joined, "[Sheet: Revenue]\na\tb");
    }

    #[test]
    fn unsupported_content_type_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "data").unwrap();
        let err = extract_text(file.path(), "application/x-weird").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }
}
