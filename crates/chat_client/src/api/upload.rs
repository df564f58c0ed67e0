use crate::error::{ApiError, ApiResult};

/// Largest accepted document upload (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Check a document before it is sent: a `.pdf` name and at most
/// [`MAX_UPLOAD_BYTES`] of non-empty content.
pub fn validate_upload(file_name: &str, size: u64) -> ApiResult<()> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("No filename provided".to_string()));
    }
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::Validation(format!(
            "Only PDF files are supported: {name}"
        )));
    }
    if size == 0 {
        return Err(ApiError::Validation(format!("{name} is empty")));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ApiError::Validation(format!(
            "{name} is too large ({size} bytes, max {MAX_UPLOAD_BYTES})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_pdf_within_limit() {
        validate_upload("report.pdf", 1024).expect("valid");
        validate_upload("REPORT.PDF", MAX_UPLOAD_BYTES).expect("limit is inclusive");
    }

    #[test]
    fn test_rejects_other_extensions() {
        let err = validate_upload("notes.txt", 10).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(validate_upload("", 10).is_err());
        assert!(validate_upload("a.pdf", 0).is_err());
        assert!(validate_upload("a.pdf", MAX_UPLOAD_BYTES + 1).is_err());
    }
}
