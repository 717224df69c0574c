//! Annotation records as persisted, and as written into the annotation table
//!
//! A persisted [`AnnotationRecord`] may omit the presentation fields
//! (type, color, flags, rect, rotation). Before it reaches the annotation
//! table it is resolved into a [`ResolvedAnnotation`] where every field is
//! present, using the fixed defaults below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subtype written when a record carries no type tag.
pub const DEFAULT_TYPE: &str = "Text";
/// Yellow, as RGB components in the 0-1 range.
pub const DEFAULT_COLOR: [f64; 3] = [1.0, 1.0, 0.0];
/// PDF annotation flag bit 3 (Print).
pub const DEFAULT_FLAGS: u32 = 4;
pub const DEFAULT_RECT: PdfRect = PdfRect {
    x0: 50.0,
    y0: 50.0,
    x1: 250.0,
    y1: 100.0,
};
pub const DEFAULT_ROTATION: i32 = 0;

/// Prefix of every generated annotation id.
pub const NOTE_ID_PREFIX: &str = "note_";

/// All annotations of one document, keyed by annotation id.
pub type AnnotationMap = BTreeMap<String, AnnotationRecord>;

/// Rectangle in PDF user space, serialized as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PdfRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PdfRect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn is_finite(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl From<[f64; 4]> for PdfRect {
    fn from([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<PdfRect> for [f64; 4] {
    fn from(rect: PdfRect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

/// A single user-authored note as stored in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    /// Empty in legacy entries; the map key is authoritative.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<PdfRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    pub page_number: u32,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl AnnotationRecord {
    /// Fill every absent presentation field with its fixed default.
    pub fn resolve(&self) -> ResolvedAnnotation {
        ResolvedAnnotation {
            id: self.id.clone(),
            kind: self
                .kind
                .clone()
                .unwrap_or_else(|| DEFAULT_TYPE.to_string()),
            text: self.text.clone(),
            rect: self.rect.unwrap_or(DEFAULT_RECT),
            color: self.color.unwrap_or(DEFAULT_COLOR),
            flags: self.flags.unwrap_or(DEFAULT_FLAGS),
            rotation: self.rotation.unwrap_or(DEFAULT_ROTATION),
            page_number: self.page_number,
            timestamp: self.timestamp,
        }
    }
}

/// An annotation with every field present, as held by the annotation table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAnnotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub rect: PdfRect,
    pub color: [f64; 3],
    pub flags: u32,
    pub rotation: i32,
    pub page_number: u32,
    pub timestamp: i64,
}

impl ResolvedAnnotation {
    /// Convert back to the persisted shape, keeping every field explicit.
    pub fn to_record(&self) -> AnnotationRecord {
        AnnotationRecord {
            id: self.id.clone(),
            kind: Some(self.kind.clone()),
            text: self.text.clone(),
            rect: Some(self.rect),
            color: Some(self.color),
            flags: Some(self.flags),
            rotation: Some(self.rotation),
            page_number: self.page_number,
            timestamp: self.timestamp,
        }
    }
}

/// User input for a new note. The page comes from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub text: String,
    pub rect: PdfRect,
}

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Produces annotation ids.
pub trait IdGenerator {
    fn next_id(&self, timestamp_ms: i64) -> String;
}

/// `note_<millis>`. Two notes created within the same millisecond collide.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIds;

impl IdGenerator for TimestampIds {
    fn next_id(&self, timestamp_ms: i64) -> String {
        format!("{}{}", NOTE_ID_PREFIX, timestamp_ms)
    }
}

/// `note_<millis>_<uuid>`. Sorts by creation time, unique within a document.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniqueIds;

impl IdGenerator for UniqueIds {
    fn next_id(&self, timestamp_ms: i64) -> String {
        format!(
            "{}{}_{}",
            NOTE_ID_PREFIX,
            timestamp_ms,
            uuid::Uuid::new_v4().simple()
        )
    }
}
