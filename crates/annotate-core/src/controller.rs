//! UI controller
//!
//! Owns the session and routes loader messages and button presses to the
//! bridge and export modules. Hosts (browser, CLI) plug in through the
//! [`ControlSurface`], [`Notifier`] and [`DownloadHost`] traits.

use crate::bridge::{self, RestoreReport};
use crate::config::AnnotateConfig;
use crate::document::{PageHandle, PdfDocument};
use crate::error::{AnnotateError, ExportError};
use crate::export::{annotated_filename, serialize_with_annotations, PDF_MIME_TYPE};
use crate::message::HostMessage;
use crate::persistence::{AnnotationStore, KeyedStore};
use crate::record::{Clock, IdGenerator, NoteDraft, ResolvedAnnotation, SystemClock};
use crate::session::{SessionContext, SessionState};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Id of the element whose geometry places new notes.
pub const CONTAINER_ID: &str = "pdf-container";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    AddTextNote,
    SaveAnnotatedPdf,
}

impl Control {
    pub const ALL: [Control; 2] = [Control::AddTextNote, Control::SaveAnnotatedPdf];

    /// DOM id of the button.
    pub fn element_id(self) -> &'static str {
        match self {
            Control::AddTextNote => "addTextNote",
            Control::SaveAnnotatedPdf => "saveAnnotatedPdf",
        }
    }
}

pub trait ControlSurface {
    fn set_enabled(&self, control: Control, enabled: bool);
}

/// Blocking user-facing message, e.g. `window.alert`.
pub trait Notifier {
    fn alert(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    /// Ask the user where to save.
    pub save_as: bool,
}

#[async_trait(?Send)]
pub trait DownloadHost {
    async fn download(&self, request: DownloadRequest) -> Result<(), ExportError>;
}

/// Host capabilities handed to the controller.
pub struct Hosts {
    pub controls: Box<dyn ControlSurface>,
    pub notifier: Box<dyn Notifier>,
    pub downloads: Box<dyn DownloadHost>,
}

/// Disables a control and re-enables it when dropped.
struct DisabledWhile<'a> {
    surface: &'a dyn ControlSurface,
    control: Control,
}

impl<'a> DisabledWhile<'a> {
    fn new(surface: &'a dyn ControlSurface, control: Control) -> Self {
        surface.set_enabled(control, false);
        Self { surface, control }
    }
}

impl Drop for DisabledWhile<'_> {
    fn drop(&mut self) {
        self.surface.set_enabled(self.control, true);
    }
}

pub struct UiController<S> {
    config: AnnotateConfig,
    session: SessionContext,
    store: KeyedStore<S>,
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
    hosts: Hosts,
    wired: bool,
}

impl<S: AnnotationStore> UiController<S> {
    pub fn new(config: AnnotateConfig, store: S, hosts: Hosts) -> Self {
        Self {
            session: SessionContext::new(config.key_prefix.clone()),
            ids: config.id_scheme.generator(),
            clock: Box::new(SystemClock),
            store: KeyedStore::new(store),
            config,
            hosts,
            wired: false,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn config(&self) -> &AnnotateConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn store(&self) -> &KeyedStore<S> {
        &self.store
    }

    /// Dispatch a message from the loader.
    pub async fn handle_message(&mut self, message: HostMessage) {
        match message {
            HostMessage::PdfLoaded { pdf_document } => {
                match PdfDocument::load(&pdf_document.url, &pdf_document.data) {
                    Ok(doc) => {
                        self.set_pdf_document(doc).await;
                    }
                    Err(e) => warn!(url = %pdf_document.url, error = %e, "Ignoring unreadable document"),
                }
            }
            HostMessage::PageRendered { page } => {
                self.set_current_page(PageHandle::new(page.page_number));
            }
        }
    }

    /// Parse and dispatch a JSON message; anything unrecognized is ignored.
    pub async fn handle_json_message(&mut self, json: &str) {
        match HostMessage::from_json(json) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => debug!(error = %e, "Ignoring message"),
        }
    }

    /// Replace the current document and restore its annotations. The page
    /// handle is cleared until the new document reports a rendered page.
    pub async fn set_pdf_document(&mut self, doc: PdfDocument) -> Option<RestoreReport> {
        info!(location = %doc.location(), pages = doc.page_count(), "Document loaded");
        self.session.set_document(doc);
        self.initialize().await
    }

    /// Record the rendered page. Buttons are wired on the first one.
    ///
    /// With a document loaded, the page is looked up in it; a number the
    /// document does not have is ignored with a warning. Returns whether
    /// the page was recorded.
    pub fn set_current_page(&mut self, page: PageHandle) -> bool {
        let page = match self.session.document() {
            Some(doc) => match doc.get_page(page.page_number()) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(error = %e, "Ignoring rendered page");
                    return false;
                }
            },
            None => page,
        };
        debug!(page = page.page_number(), "Page rendered");
        self.session.set_page(page);

        if !self.wired {
            for control in Control::ALL {
                self.hosts.controls.set_enabled(control, true);
            }
            self.wired = true;
            info!("Annotation controls ready");
        }
        true
    }

    /// Restore annotations of the current document. Without a document this
    /// only logs a warning; nothing is retried.
    pub async fn initialize(&mut self) -> Option<RestoreReport> {
        if self.session.document().is_none() {
            warn!("Initialization requested before a document was loaded");
            return None;
        }

        match bridge::restore_annotations(&mut self.session, &self.store).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Could not restore annotations");
                None
            }
        }
    }

    /// Handler of the `addTextNote` button.
    pub async fn add_text_note(&mut self) -> Result<ResolvedAnnotation, AnnotateError> {
        let draft = NoteDraft {
            text: self.config.note_text.clone(),
            rect: self.config.note_rect,
        };
        self.add_note(draft).await
    }

    /// Create a note on the current page. Failures are logged, never alerted.
    pub async fn add_note(&mut self, draft: NoteDraft) -> Result<ResolvedAnnotation, AnnotateError> {
        let result = bridge::create_note(
            &mut self.session,
            &self.store,
            self.ids.as_ref(),
            self.clock.as_ref(),
            draft,
        )
        .await;

        match &result {
            Ok(_) => {}
            Err(AnnotateError::NotReady(what)) => warn!("Cannot add note: {}", what),
            Err(AnnotateError::Unsaved { id, source }) => {
                warn!(id = %id, error = %source, "Note kept in viewer but not persisted")
            }
            Err(e) => warn!(error = %e, "Failed to add note"),
        }
        result
    }

    /// Handler of the `saveAnnotatedPdf` button.
    ///
    /// The button is disabled for the duration and re-enabled on every
    /// outcome. Export and download failures raise one alert. Returns the
    /// offered filename.
    pub async fn save_annotated_pdf(&self) -> Result<String, AnnotateError> {
        let _disabled = DisabledWhile::new(self.hosts.controls.as_ref(), Control::SaveAnnotatedPdf);

        let result = self.export_and_download().await;
        match &result {
            Ok(filename) => info!(filename = %filename, "Annotated PDF handed to download"),
            Err(AnnotateError::NotReady(what)) => warn!("Cannot save annotated PDF: {}", what),
            Err(e) => {
                error!(error = %e, "Saving annotated PDF failed");
                self.hosts
                    .notifier
                    .alert(&format!("Failed to save annotated PDF: {}", e));
            }
        }
        result
    }

    async fn export_and_download(&self) -> Result<String, AnnotateError> {
        let doc = self
            .session
            .document()
            .ok_or(AnnotateError::NotReady("no document loaded"))?;

        let bytes = serialize_with_annotations(doc)?;
        let filename = annotated_filename(
            doc.location(),
            &self.config.filename_suffix,
            &self.config.fallback_filename,
        );

        self.hosts
            .downloads
            .download(DownloadRequest {
                filename: filename.clone(),
                mime_type: PDF_MIME_TYPE,
                bytes,
                save_as: true,
            })
            .await?;
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::create_test_pdf;
    use crate::message::{DocumentSource, PageRef};
    use crate::persistence::MemoryStore;
    use crate::record::FixedClock;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        controls: RefCell<Vec<(Control, bool)>>,
        alerts: RefCell<Vec<String>>,
        downloads: RefCell<Vec<DownloadRequest>>,
        fail_download: RefCell<bool>,
    }

    struct Surface(Rc<Recorder>);
    impl ControlSurface for Surface {
        fn set_enabled(&self, control: Control, enabled: bool) {
            self.0.controls.borrow_mut().push((control, enabled));
        }
    }

    struct Alerts(Rc<Recorder>);
    impl Notifier for Alerts {
        fn alert(&self, message: &str) {
            self.0.alerts.borrow_mut().push(message.to_string());
        }
    }

    struct Downloads(Rc<Recorder>);
    #[async_trait(?Send)]
    impl DownloadHost for Downloads {
        async fn download(&self, request: DownloadRequest) -> Result<(), ExportError> {
            if *self.0.fail_download.borrow() {
                return Err(ExportError::Download("USER_CANCELED".to_string()));
            }
            self.0.downloads.borrow_mut().push(request);
            Ok(())
        }
    }

    fn controller() -> (UiController<Rc<MemoryStore>>, Rc<Recorder>, Rc<MemoryStore>) {
        let recorder = Rc::new(Recorder::default());
        let store = Rc::new(MemoryStore::new());
        let hosts = Hosts {
            controls: Box::new(Surface(recorder.clone())),
            notifier: Box::new(Alerts(recorder.clone())),
            downloads: Box::new(Downloads(recorder.clone())),
        };
        let controller = UiController::new(AnnotateConfig::default(), store.clone(), hosts)
            .with_clock(FixedClock(1_700_000_000_000));
        (controller, recorder, store)
    }

    fn loaded_message(url: &str) -> HostMessage {
        HostMessage::PdfLoaded {
            pdf_document: DocumentSource {
                url: url.to_string(),
                data: create_test_pdf(2),
            },
        }
    }

    #[tokio::test]
    async fn test_initialize_without_document_is_noop() {
        let (mut controller, _, store) = controller();
        assert_eq!(controller.initialize().await, None);
        assert_eq!(controller.state(), SessionState::Uninitialized);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_messages_drive_state_machine() {
        let (mut controller, recorder, _) = controller();

        controller.handle_message(loaded_message("https://h/a.pdf")).await;
        assert_eq!(controller.state(), SessionState::DocumentLoaded);
        assert!(recorder.controls.borrow().is_empty());

        controller
            .handle_message(HostMessage::PageRendered {
                page: PageRef { page_number: 2 },
            })
            .await;
        assert_eq!(controller.state(), SessionState::PageReady);
        assert_eq!(
            *recorder.controls.borrow(),
            vec![
                (Control::AddTextNote, true),
                (Control::SaveAnnotatedPdf, true)
            ]
        );

        controller
            .handle_json_message(r#"{"type":"page-rendered","page":{"pageNumber":1}}"#)
            .await;
        assert_eq!(controller.session().page().unwrap().page_number(), 1);
        assert_eq!(recorder.controls.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_ignored() {
        let (mut controller, recorder, _) = controller();
        controller.handle_message(loaded_message("a.pdf")).await;

        controller
            .handle_json_message(r#"{"type":"page-rendered","page":{"pageNumber":9}}"#)
            .await;
        assert_eq!(controller.state(), SessionState::DocumentLoaded);
        assert!(!controller.set_current_page(PageHandle::new(0)));
        assert!(recorder.controls.borrow().is_empty());

        assert!(controller.set_current_page(PageHandle::new(2)));
        assert!(controller.session().page().unwrap().media_box().is_some());
    }

    #[tokio::test]
    async fn test_switching_documents_clears_the_page() {
        let (mut controller, recorder, store) = controller();
        let three = PdfDocument::load("a.pdf", &create_test_pdf(3)).unwrap();
        controller.set_pdf_document(three).await;
        assert!(controller.set_current_page(PageHandle::new(3)));

        let one = PdfDocument::load("b.pdf", &create_test_pdf(1)).unwrap();
        controller.set_pdf_document(one).await;
        assert_eq!(controller.state(), SessionState::DocumentLoaded);

        let err = controller.add_text_note().await.unwrap_err();
        assert!(matches!(err, AnnotateError::NotReady("no page rendered")));
        assert_eq!(store.save_count(), 0);
        assert!(recorder.alerts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_document_is_ignored() {
        let (mut controller, _, _) = controller();
        controller
            .handle_message(HostMessage::PdfLoaded {
                pdf_document: DocumentSource {
                    url: "x.pdf".to_string(),
                    data: b"garbage".to_vec(),
                },
            })
            .await;
        controller.handle_json_message("{not json").await;
        assert_eq!(controller.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_add_note_before_page_is_rejected_quietly() {
        let (mut controller, recorder, store) = controller();
        controller.handle_message(loaded_message("a.pdf")).await;
        let err = controller.add_text_note().await.unwrap_err();
        assert!(matches!(err, AnnotateError::NotReady(_)));
        assert_eq!(store.save_count(), 0);
        assert!(recorder.alerts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_add_text_note_uses_configured_defaults() {
        let (mut controller, _, _) = controller();
        controller.handle_message(loaded_message("a.pdf")).await;
        controller.set_current_page(PageHandle::new(2));

        let note = controller.add_text_note().await.unwrap();
        assert_eq!(note.text, "New note");
        assert_eq!(note.rect, AnnotateConfig::default().note_rect);
        assert_eq!(note.page_number, 2);
    }

    #[tokio::test]
    async fn test_save_downloads_with_derived_name() {
        let (mut controller, recorder, _) = controller();
        controller
            .handle_message(loaded_message("https://h/docs/thesis.pdf"))
            .await;
        controller.set_current_page(PageHandle::new(1));
        controller.add_text_note().await.unwrap();

        let filename = controller.save_annotated_pdf().await.unwrap();
        assert_eq!(filename, "thesis_annotated.pdf");

        let downloads = recorder.downloads.borrow();
        assert_eq!(downloads.len(), 1);
        assert!(downloads[0].save_as);
        assert_eq!(downloads[0].mime_type, "application/pdf");
        assert!(downloads[0].bytes.starts_with(b"%PDF-"));

        let controls = recorder.controls.borrow();
        assert_eq!(
            &controls[controls.len() - 2..],
            &[
                (Control::SaveAnnotatedPdf, false),
                (Control::SaveAnnotatedPdf, true)
            ]
        );
    }

    #[tokio::test]
    async fn test_save_failure_alerts_once_and_reenables() {
        let (mut controller, recorder, _) = controller();
        controller.handle_message(loaded_message("viewer")).await;
        *recorder.fail_download.borrow_mut() = true;

        let err = controller.save_annotated_pdf().await.unwrap_err();
        assert!(matches!(err, AnnotateError::Export(ExportError::Download(_))));
        assert_eq!(recorder.alerts.borrow().len(), 1);
        assert_eq!(
            recorder.controls.borrow().last(),
            Some(&(Control::SaveAnnotatedPdf, true))
        );
    }

    #[tokio::test]
    async fn test_save_without_document_warns_without_alert() {
        let (controller, recorder, _) = controller();
        let err = controller.save_annotated_pdf().await.unwrap_err();
        assert!(matches!(err, AnnotateError::NotReady(_)));
        assert!(recorder.alerts.borrow().is_empty());
        assert_eq!(
            recorder.controls.borrow().last(),
            Some(&(Control::SaveAnnotatedPdf, true))
        );
    }
}
