//! Serialize a document together with its annotation table

use crate::document::PdfDocument;
use crate::error::ExportError;
use crate::record::{PdfRect, ResolvedAnnotation};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

pub const ANNOTATED_SUFFIX: &str = "_annotated";
pub const FALLBACK_FILENAME: &str = "annotated.pdf";
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Produce PDF bytes containing every annotation of the document's table.
pub fn serialize_with_annotations(pdf: &PdfDocument) -> Result<Vec<u8>, ExportError> {
    let mut doc = pdf.lopdf().clone();
    let table = pdf.annotation_table();

    for (page_num, page_id) in pdf.page_ids() {
        for annotation in table.for_page(*page_num) {
            add_annotation(&mut doc, *page_id, annotation)?;
        }
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| ExportError::OperationError(e.to_string()))?;

    tracing::debug!(
        annotations = table.len(),
        bytes = output.len(),
        "Serialized annotated PDF"
    );
    Ok(output)
}

/// Name offered for the download: `<stem>_annotated.pdf`, or the fallback
/// when the location does not name a `.pdf` file.
///
/// The result is always a bare file name: separators that only appear after
/// percent-decoding are cut off like real ones, and characters that are not
/// valid in file names are replaced.
pub fn annotated_filename(location: &str, suffix: &str, fallback: &str) -> String {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit(['/', '\\']).next().unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = sanitize_file_name(decoded.rsplit(['/', '\\']).next().unwrap_or_default());

    let stem = name
        .len()
        .checked_sub(4)
        .and_then(|split| match (name.get(..split), name.get(split..)) {
            (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".pdf") => Some(stem),
            _ => None,
        });

    match stem {
        Some(stem) if !stem.is_empty() => format!("{}{}.pdf", stem, suffix),
        _ => fallback.to_string(),
    }
}

/// Replace reserved characters, drop control characters and trim leading
/// and trailing dots and whitespace.
fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => Some('_'),
            '\0'..='\x1f' | '\x7f' => None,
            c => Some(c),
        })
        .collect();
    replaced.trim().trim_matches('.').to_string()
}

fn add_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    annotation: &ResolvedAnnotation,
) -> Result<(), ExportError> {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(annotation.kind.as_bytes().to_vec()));
    annot.set("Rect", rect_object(&annotation.rect));
    annot.set("Contents", text_string(&annotation.text));
    annot.set("NM", text_string(&annotation.id));
    if let Some(date) = pdf_date(annotation.timestamp) {
        annot.set("M", Object::String(date.into_bytes(), StringFormat::Literal));
    }
    annot.set(
        "C",
        Object::Array(
            annotation
                .color
                .iter()
                .map(|c| Object::Real(*c as f32))
                .collect(),
        ),
    );
    annot.set("F", Object::Integer(annotation.flags as i64));
    if annotation.rotation != 0 {
        annot.set("Rotate", Object::Integer(annotation.rotation as i64));
    }
    annot.set("Open", Object::Boolean(false));
    annot.set("P", Object::Reference(page_id));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, annot_id)
}

fn rect_object(rect: &PdfRect) -> Object {
    Object::Array(vec![
        Object::Real(rect.x0 as f32),
        Object::Real(rect.y0 as f32),
        Object::Real(rect.x1 as f32),
        Object::Real(rect.y1 as f32),
    ])
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn pdf_date(timestamp_ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("D:%Y%m%d%H%M%SZ").to_string())
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), ExportError> {
    // An indirect /Annots array lives in its own object.
    let indirect = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|annots| annots.as_reference().ok());

    if let Some(array_id) = indirect {
        if let Ok(Object::Array(ref mut arr)) = doc.get_object_mut(array_id) {
            arr.push(Object::Reference(annot_id));
            return Ok(());
        }
    }

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| ExportError::OperationError(e.to_string()))?;

    if let Object::Dictionary(ref mut page_dict) = page {
        if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
            arr.push(Object::Reference(annot_id));
        } else {
            page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
        }
        Ok(())
    } else {
        Err(ExportError::OperationError(format!(
            "page object {:?} is not a dictionary",
            page_id
        )))
    }
}
