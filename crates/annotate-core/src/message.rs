//! Cross-context messages sent by the loader
//!
//! ```json
//! {"type":"pdf-loaded","pdfDocument":{"url":"https://host/a.pdf","data":"JVBERi0..."}}
//! {"type":"page-rendered","page":{"pageNumber":3}}
//! ```
//!
//! Any other field is ignored. No acknowledgement is sent back.

use crate::error::AnnotateError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    PdfLoaded {
        #[serde(rename = "pdfDocument")]
        pdf_document: DocumentSource,
    },
    PageRendered {
        page: PageRef,
    },
}

impl HostMessage {
    pub fn from_json(json: &str) -> Result<Self, AnnotateError> {
        serde_json::from_str(json).map_err(|e| AnnotateError::Message(e.to_string()))
    }
}

/// Location and raw bytes of a loaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub url: String,
    /// Base64 in JSON.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    pub page_number: u32,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
