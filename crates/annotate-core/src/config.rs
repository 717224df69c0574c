//! TOML configuration
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{AnnotateError, StoreError};
use crate::export::{ANNOTATED_SUFFIX, FALLBACK_FILENAME};
use crate::key::DEFAULT_KEY_PREFIX;
use crate::record::{IdGenerator, PdfRect, TimestampIds, UniqueIds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// Namespace prepended to every derived storage key
    pub key_prefix: String,
    /// Text of a note created by the "add note" button
    pub note_text: String,
    /// Where a new note is placed when the host gives no geometry
    pub note_rect: PdfRect,
    pub filename_suffix: String,
    pub fallback_filename: String,
    pub id_scheme: IdScheme,
    /// Directory of the file-backed store (native hosts only)
    pub store_dir: Option<PathBuf>,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            note_text: "New note".to_string(),
            note_rect: PdfRect::new(100.0, 100.0, 300.0, 150.0),
            filename_suffix: ANNOTATED_SUFFIX.to_string(),
            fallback_filename: FALLBACK_FILENAME.to_string(),
            id_scheme: IdScheme::default(),
            store_dir: None,
        }
    }
}

impl AnnotateConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AnnotateError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(StoreError::from)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(s: &str) -> Result<Self, AnnotateError> {
        Ok(toml::from_str(s)?)
    }
}

/// How annotation ids are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `note_<millis>_<uuid>`
    #[default]
    Unique,
    /// `note_<millis>`, collides within one millisecond
    Timestamp,
}

impl IdScheme {
    pub fn generator(self) -> Box<dyn IdGenerator> {
        match self {
            IdScheme::Unique => Box::new(UniqueIds),
            IdScheme::Timestamp => Box::new(TimestampIds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(AnnotateConfig::from_toml("").unwrap(), AnnotateConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = AnnotateConfig::from_toml(
            r#"
            note_text = "Review"
            note_rect = [10.0, 20.0, 30.0, 40.0]
            id_scheme = "timestamp"
            store_dir = "/var/lib/annotations"
            "#,
        )
        .unwrap();
        assert_eq!(config.note_text, "Review");
        assert_eq!(config.note_rect, PdfRect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(config.id_scheme, IdScheme::Timestamp);
        assert_eq!(config.store_dir, Some(PathBuf::from("/var/lib/annotations")));
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(config.id_scheme.generator().next_id(7), "note_7");
    }

    #[test]
    fn test_unknown_scheme_is_an_error() {
        let err = AnnotateConfig::from_toml(r#"id_scheme = "random""#).unwrap_err();
        assert!(matches!(err, AnnotateError::Config(_)));
    }
}
