//! Moves annotations between the store and the document's annotation table

use crate::error::AnnotateError;
use crate::persistence::{AnnotationStore, KeyedStore};
use crate::record::{AnnotationRecord, Clock, IdGenerator, NoteDraft, ResolvedAnnotation, DEFAULT_TYPE};
use crate::session::SessionContext;
use tracing::{debug, info, warn};

/// Outcome of a restore pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Copy every persisted record of the current document into its annotation table.
///
/// Records are resolved against the fixed defaults first. A stored entry
/// that does not decode, or a record the document rejects, is logged and
/// skipped; the rest are still restored.
/// Afterwards the current page, if any, is re-fetched from the document.
pub async fn restore_annotations<S: AnnotationStore + ?Sized>(
    session: &mut SessionContext,
    store: &S,
) -> Result<RestoreReport, AnnotateError> {
    let key = session
        .storage_key()
        .ok_or(AnnotateError::NotReady("no document loaded"))?;
    let loaded = store.load_entries(&key).await?;

    let mut report = RestoreReport {
        restored: 0,
        skipped: loaded.rejected.len(),
    };
    if let Some(doc) = session.document_mut() {
        for (id, record) in loaded.records {
            let mut annotation = record.resolve();
            if annotation.id.is_empty() {
                annotation.id = id.clone();
            }
            match doc.put_annotation(annotation) {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping stored annotation");
                    report.skipped += 1;
                }
            }
        }
    }

    info!(
        key = %key,
        restored = report.restored,
        skipped = report.skipped,
        "Restored annotations"
    );

    refetch_current_page(session);
    Ok(report)
}

/// Ask the document for the current page again so a viewer can redraw it.
fn refetch_current_page(session: &mut SessionContext) {
    let Some(page_number) = session.page().map(|p| p.page_number()) else {
        return;
    };
    let Some(doc) = session.document() else {
        return;
    };

    match doc.get_page(page_number) {
        Ok(page) => {
            debug!(page = page_number, "Re-fetched page after restore");
            session.set_page(page);
        }
        Err(e) => warn!(page = page_number, error = %e, "Page re-fetch failed"),
    }
}

/// Create a note on the current page.
///
/// The note is written to the annotation table first, then added to the
/// persisted map in one serialized update. When that update fails the
/// table keeps the note and [`AnnotateError::Unsaved`] is returned.
pub async fn create_note<S: AnnotationStore>(
    session: &mut SessionContext,
    store: &KeyedStore<S>,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
    draft: NoteDraft,
) -> Result<ResolvedAnnotation, AnnotateError> {
    let key = session
        .storage_key()
        .ok_or(AnnotateError::NotReady("no document loaded"))?;
    let page_number = session
        .page()
        .map(|p| p.page_number())
        .ok_or(AnnotateError::NotReady("no page rendered"))?;

    let timestamp = clock.now_millis();
    let record = AnnotationRecord {
        id: ids.next_id(timestamp),
        kind: Some(DEFAULT_TYPE.to_string()),
        text: draft.text,
        rect: Some(draft.rect),
        color: None,
        flags: None,
        rotation: None,
        page_number,
        timestamp,
    };
    let annotation = record.resolve();

    session
        .document_mut()
        .ok_or(AnnotateError::NotReady("no document loaded"))?
        .put_annotation(annotation.clone())?;

    let id = record.id.clone();
    store
        .update(&key, move |map| {
            map.insert(record.id.clone(), record);
        })
        .await
        .map_err(|source| AnnotateError::Unsaved {
            id: id.clone(),
            source,
        })?;

    info!(id = %id, page = page_number, "Created note");
    Ok(annotation)
}
