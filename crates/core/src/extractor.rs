use crate::error::ExtractionError;
use crate::models::ContentBlock;
use crate::tables::{detect_tables, render_table, spans_from_operations, TableRows};
use lopdf::content::Content;
use lopdf::{Document, ObjectId};
use std::path::Path;
use tracing::debug;

pub trait PdfExtractor {
    /// Extracts text and table blocks in page order.
    fn extract(&self, path: &Path) -> Result<Vec<ContentBlock>, ExtractionError>;
}

/// Extractor backed by `lopdf`: full-page text plus layout-detected tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    fn page_text(document: &Document, page_no: u32) -> Option<String> {
        match document.extract_text(&[page_no]) {
            Ok(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(error) => {
                debug!(page = page_no, error = %error, "page has no extractable text");
                None
            }
        }
    }

    fn page_tables(document: &Document, page_no: u32, page_id: ObjectId) -> Vec<TableRows> {
        let operations = document
            .get_page_content(page_id)
            .and_then(|bytes| Content::decode(&bytes))
            .map(|content| content.operations);

        match operations {
            Ok(operations) => detect_tables(spans_from_operations(&operations)),
            Err(error) => {
                debug!(page = page_no, error = %error, "page content stream is unreadable");
                Vec::new()
            }
        }
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<ContentBlock>, ExtractionError> {
        let document =
            Document::load(path).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut blocks = Vec::new();
        for (page_no, page_id) in document.get_pages() {
            if let Some(text) = Self::page_text(&document, page_no) {
                blocks.push(ContentBlock::text(page_no, text));
            }

            let tables = Self::page_tables(&document, page_no, page_id);
            for (position, rows) in tables.iter().enumerate() {
                let rendered = render_table(rows);
                if !rendered.is_empty() {
                    blocks.push(ContentBlock::table(page_no, position + 1, rendered));
                }
            }
        }

        debug!(path = %path.display(), blocks = blocks.len(), "extracted pdf");
        Ok(blocks)
    }
}
