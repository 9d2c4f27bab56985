use common::domain::DocumentRef;
use std::fmt;

/// Documents at or above this size (bytes) always go through the async path
pub const SYNC_SIZE_THRESHOLD: u64 = 100 * 1024;

/// MIME types the inline translator can handle
pub const SYNC_MIME_TYPES: [&str; 3] = [
    "text/plain",
    "text/html",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Which translation strategy handles a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingPath {
    Sync,
    Async,
}

impl ProcessingPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingPath::Sync => "sync",
            ProcessingPath::Async => "async",
        }
    }
}

impl fmt::Display for ProcessingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Choose the processing path for a document.
///
/// Sync only when the MIME type is supported inline and the declared size
/// is known and strictly below [`SYNC_SIZE_THRESHOLD`]. An undeclared size
/// routes to the async path. MIME matching is exact.
pub fn classify(mime_type: &str, size: Option<u64>) -> ProcessingPath {
    let supported = SYNC_MIME_TYPES.contains(&mime_type);
    match size {
        Some(size) if supported && size < SYNC_SIZE_THRESHOLD => ProcessingPath::Sync,
        _ => ProcessingPath::Async,
    }
}

pub fn classify_document(document: &DocumentRef) -> ProcessingPath {
    classify(&document.mime_type, document.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    #[test]
    fn test_small_supported_documents_are_sync() {
        assert_eq!(classify("text/plain", Some(50 * 1024)), ProcessingPath::Sync);
        assert_eq!(classify("text/html", Some(1)), ProcessingPath::Sync);
        assert_eq!(classify(DOCX, Some(2048)), ProcessingPath::Sync);
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(classify("text/plain", Some(102_399)), ProcessingPath::Sync);
        assert_eq!(classify("text/plain", Some(102_400)), ProcessingPath::Async);
        assert_eq!(classify("text/plain", Some(200 * 1024)), ProcessingPath::Async);
    }

    #[test]
    fn test_zero_size_is_sync() {
        assert_eq!(classify("text/html", Some(0)), ProcessingPath::Sync);
    }

    #[test]
    fn test_unknown_size_is_async() {
        assert_eq!(classify("text/plain", None), ProcessingPath::Async);
        assert_eq!(classify(DOCX, None), ProcessingPath::Async);
    }

    #[test]
    fn test_unsupported_mime_type_is_async_regardless_of_size() {
        assert_eq!(classify("application/pdf", Some(10)), ProcessingPath::Async);
        assert_eq!(classify("image/png", Some(0)), ProcessingPath::Async);
        assert_eq!(classify("", Some(10)), ProcessingPath::Async);
    }

    #[test]
    fn test_mime_matching_is_exact() {
        assert_eq!(classify("Text/Plain", Some(10)), ProcessingPath::Async);
        assert_eq!(
            classify("text/plain; charset=utf-8", Some(10)),
            ProcessingPath::Async
        );
    }

    #[test]
    fn test_classify_document_ref() {
        let doc = DocumentRef {
            mime_type: "text/plain".to_string(),
            size: Some(42),
        };
        assert_eq!(classify_document(&doc), ProcessingPath::Sync);
        assert_eq!(ProcessingPath::Sync.to_string(), "sync");
        assert_eq!(ProcessingPath::Async.as_str(), "async");
    }
}
