//! Per-viewer session context
//!
//! Holds the current document and page handles. Both are replaced whenever
//! the host reports a new load or render; the last report wins. A new
//! document clears the page handle.

use crate::document::{PageHandle, PdfDocument};
use crate::key::derive_storage_key_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No document handle yet.
    Uninitialized,
    /// A document is loaded and its annotations were restored.
    DocumentLoaded,
    /// A page has also been rendered; notes can be added.
    PageReady,
}

#[derive(Debug)]
pub struct SessionContext {
    key_prefix: String,
    document: Option<PdfDocument>,
    page: Option<PageHandle>,
}

impl SessionContext {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            document: None,
            page: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.document, &self.page) {
            (None, _) => SessionState::Uninitialized,
            (Some(_), None) => SessionState::DocumentLoaded,
            (Some(_), Some(_)) => SessionState::PageReady,
        }
    }

    pub fn document(&self) -> Option<&PdfDocument> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut PdfDocument> {
        self.document.as_mut()
    }

    pub fn page(&self) -> Option<&PageHandle> {
        self.page.as_ref()
    }

    /// Replace the document handle and clear the page handle, which
    /// belonged to the previous document.
    pub fn set_document(&mut self, document: PdfDocument) -> Option<PdfDocument> {
        self.page = None;
        self.document.replace(document)
    }

    pub fn set_page(&mut self, page: PageHandle) -> Option<PageHandle> {
        self.page.replace(page)
    }

    /// Storage key of the current document.
    pub fn storage_key(&self) -> Option<String> {
        self.document
            .as_ref()
            .map(|doc| derive_storage_key_with(&self.key_prefix, doc.location()))
    }
}
