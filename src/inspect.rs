//! Sanity checks on produced PDFs, using hayro as a pure-Rust parser.

use std::sync::Arc;

use hayro::Pdf;

use crate::error::{RenderError, Result};

/// Parse `buf` as a PDF and return its number of pages.
pub fn page_count(buf: &[u8]) -> Result<usize> {
    let data = Arc::new(buf.to_vec());
    let pdf = Pdf::new(data).map_err(|e| RenderError::InvalidPdf(format!("{:?}", e)))?;
    let pages = pdf.pages().iter().count();
    if pages == 0 {
        return Err(RenderError::InvalidPdf("document has no pages".to_string()));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf() {
        let err = page_count(b"warning: font missing").unwrap_err();
        assert!(matches!(err, RenderError::InvalidPdf(_)));
    }
}
