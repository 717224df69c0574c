//! Document and page handles over `lopdf`
//!
//! [`PdfDocument`] owns the parsed document together with its annotation
//! table, the in-memory map consumed when the document is serialized.

use crate::error::DocumentError;
use crate::record::{AnnotationMap, PdfRect, ResolvedAnnotation};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

/// In-memory annotations of one loaded document, keyed by annotation id.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    entries: BTreeMap<String, ResolvedAnnotation>,
    writes: usize,
}

impl AnnotationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ResolvedAnnotation> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedAnnotation> {
        self.entries.values()
    }

    pub fn for_page(&self, page_number: u32) -> Vec<&ResolvedAnnotation> {
        self.entries
            .values()
            .filter(|a| a.page_number == page_number)
            .collect()
    }

    /// Number of writes since the document was loaded, overwrites included.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Snapshot of the table in the persisted shape.
    pub fn to_map(&self) -> AnnotationMap {
        self.entries
            .iter()
            .map(|(id, a)| (id.clone(), a.to_record()))
            .collect()
    }

    fn set(&mut self, annotation: ResolvedAnnotation) {
        self.writes += 1;
        self.entries.insert(annotation.id.clone(), annotation);
    }
}

/// A rendered page, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHandle {
    page_number: u32,
    media_box: Option<PdfRect>,
}

impl PageHandle {
    /// A page known only by number, before it is fetched from a document.
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number,
            media_box: None,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn media_box(&self) -> Option<PdfRect> {
        self.media_box
    }
}

/// A loaded PDF plus the annotations written into it this session.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    location: String,
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
    table: AnnotationTable,
}

impl PdfDocument {
    pub fn load(location: &str, bytes: &[u8]) -> Result<Self, DocumentError> {
        let document =
            Document::load_mem(bytes).map_err(|e| DocumentError::ParseError(e.to_string()))?;
        let pages = document.get_pages();

        Ok(Self {
            location: location.to_string(),
            document,
            pages,
            table: AnnotationTable::new(),
        })
    }

    /// The URL or path the document was opened from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn annotation_table(&self) -> &AnnotationTable {
        &self.table
    }

    pub(crate) fn lopdf(&self) -> &Document {
        &self.document
    }

    pub(crate) fn page_ids(&self) -> &BTreeMap<u32, ObjectId> {
        &self.pages
    }

    /// Write an annotation into the table after checking it against the document.
    pub fn put_annotation(&mut self, annotation: ResolvedAnnotation) -> Result<(), DocumentError> {
        let invalid = |reason: &str| DocumentError::InvalidAnnotation {
            id: annotation.id.clone(),
            reason: reason.to_string(),
        };

        if annotation.id.is_empty() {
            return Err(invalid("empty id"));
        }
        if !annotation.rect.is_finite() {
            return Err(invalid("rect has non-finite coordinates"));
        }
        if annotation.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(invalid("color component outside 0-1"));
        }
        self.check_page(annotation.page_number)?;

        self.table.set(annotation);
        Ok(())
    }

    /// Fetch a page by number, resolving its MediaBox.
    pub fn get_page(&self, page_number: u32) -> Result<PageHandle, DocumentError> {
        let page_id = self.check_page(page_number)?;
        let media_box = self
            .document
            .get_dictionary(page_id)
            .ok()
            .and_then(|dict| dict.get(b"MediaBox").ok())
            .and_then(|obj| obj.as_array().ok())
            .and_then(|arr| rect_from_array(arr));

        Ok(PageHandle {
            page_number,
            media_box,
        })
    }

    fn check_page(&self, page_number: u32) -> Result<ObjectId, DocumentError> {
        self.pages
            .get(&page_number)
            .copied()
            .ok_or(DocumentError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count(),
            })
    }
}

fn rect_from_array(arr: &[Object]) -> Option<PdfRect> {
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0_f64; 4];
    for (slot, obj) in values.iter_mut().zip(arr) {
        *slot = match obj {
            Object::Integer(v) => *v as f64,
            Object::Real(v) => *v as f64,
            _ => return None,
        };
    }
    Some(PdfRect::from(values))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::AnnotationRecord;
    use pretty_assertions::assert_eq;

    pub(crate) fn create_test_pdf(page_count: u32) -> Vec<u8> {
        use lopdf::dictionary;

        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..page_count {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn note(id: &str, page_number: u32) -> ResolvedAnnotation {
        AnnotationRecord {
            id: id.to_string(),
            kind: None,
            text: format!("text of {}", id),
            rect: None,
            color: None,
            flags: None,
            rotation: None,
            page_number,
            timestamp: 1,
        }
        .resolve()
    }

    #[test]
    fn test_load_counts_pages() {
        let doc = PdfDocument::load("file:///a.pdf", &create_test_pdf(3)).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.location(), "file:///a.pdf");
        assert!(doc.annotation_table().is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = PdfDocument::load("x", b"not a pdf").unwrap_err();
        assert!(matches!(err, DocumentError::ParseError(_)));
    }

    #[test]
    fn test_get_page_reads_media_box() {
        let doc = PdfDocument::load("a.pdf", &create_test_pdf(2)).unwrap();
        let page = doc.get_page(2).unwrap();
        assert_eq!(page.page_number(), 2);
        assert_eq!(
            page.media_box(),
            Some(PdfRect::new(0.0, 0.0, 612.0, 792.0))
        );
        assert!(matches!(
            doc.get_page(3),
            Err(DocumentError::PageOutOfRange {
                page: 3,
                page_count: 2
            })
        ));
    }

    #[test]
    fn test_put_annotation_counts_writes() {
        let mut doc = PdfDocument::load("a.pdf", &create_test_pdf(2)).unwrap();
        doc.put_annotation(note("n1", 1)).unwrap();
        doc.put_annotation(note("n2", 2)).unwrap();
        doc.put_annotation(note("n1", 1)).unwrap();

        let table = doc.annotation_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.write_count(), 3);
        assert_eq!(table.for_page(2).len(), 1);
        assert_eq!(table.to_map()["n2"].text, "text of n2");
    }

    #[test]
    fn test_put_annotation_rejects_bad_entries() {
        let mut doc = PdfDocument::load("a.pdf", &create_test_pdf(1)).unwrap();

        assert!(matches!(
            doc.put_annotation(note("far", 9)),
            Err(DocumentError::PageOutOfRange { .. })
        ));

        let mut nan = note("nan", 1);
        nan.rect.x0 = f64::NAN;
        assert!(matches!(
            doc.put_annotation(nan),
            Err(DocumentError::InvalidAnnotation { .. })
        ));

        assert!(doc.put_annotation(note("", 1)).is_err());
        assert_eq!(doc.annotation_table().write_count(), 0);
    }
}
