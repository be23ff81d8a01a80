// Uploaded document → plain text for the topic extraction prompt.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::errors::AppError;

/// Longest document text sent to the model, in characters.
pub const MAX_DOCUMENT_CHARS: usize = 150_000;

const PDF_MAGIC: &[u8] = b"%PDF";

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extracts text from a PDF or reads anything else as (lossy) UTF-8, then
/// truncates to [`MAX_DOCUMENT_CHARS`].
pub async fn extract_text(bytes: Bytes) -> Result<String, AppError> {
    let text = if is_pdf(&bytes) {
        // pdf-extract is CPU bound and panics on some malformed files
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| {
                warn!("PDF extraction task failed: {e}");
                AppError::Validation("uploaded PDF could not be read".to_string())
            })?
            .map_err(|e| {
                warn!("PDF extraction failed: {e}");
                AppError::Validation(format!("uploaded PDF could not be read: {e}"))
            })?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    Ok(truncate_chars(text, MAX_DOCUMENT_CHARS))
}

/// Cuts `text` to at most `max` characters, on a character boundary.
pub fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max) {
        debug!(chars = max, "Truncating document text");
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"Unit 1: Numbers"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo".to_string(), 2), "hé");
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
        assert_eq!(truncate_chars("exact".to_string(), 5), "exact");
    }

    #[tokio::test]
    async fn test_plain_text_is_read_lossily() {
        let text = extract_text(Bytes::from_static(b"Unit 1\xff: Numbers"))
            .await
            .unwrap();
        assert_eq!(text, "Unit 1\u{fffd}: Numbers");
    }

    #[tokio::test]
    async fn test_long_text_is_truncated() {
        let long = "a".repeat(MAX_DOCUMENT_CHARS + 10);
        let text = extract_text(Bytes::from(long)).await.unwrap();
        assert_eq!(text.chars().count(), MAX_DOCUMENT_CHARS);
    }

    #[tokio::test]
    async fn test_broken_pdf_is_a_validation_error() {
        let result = extract_text(Bytes::from_static(b"%PDF-1.4 not really a pdf")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
