//! WASM bindings for the PDF annotation viewer
//!
//! The viewer page renders the PDF; this module keeps the notes. It loads
//! and saves them in `localStorage`, enables the toolbar buttons once a
//! page is on screen and exports an annotated copy as a download.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { Annotator } from './pkg/annotate_wasm.js';
//!
//! await init();
//!
//! const annotator = new Annotator();
//! annotator.attach(); // message listener + button clicks
//!
//! // Or drive it directly
//! await annotator.setPdfDocument(url, bytes);
//! await annotator.setCurrentPage(1);
//! ```

pub mod console;
pub mod dom;
pub mod storage;

use annotate_core::{
    AnnotateConfig, Control, Hosts, NoteDraft, PageHandle, PdfDocument, UiController,
};
use futures::lock::Mutex;
use std::rc::Rc;
use tracing_subscriber::filter::LevelFilter;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::MessageEvent;

pub use dom::{BlobDownloads, DomButtons, JsClock, WindowAlert};
pub use storage::LocalStorageStore;

type Controller = UiController<LocalStorageStore>;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console::init(LevelFilter::INFO);
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Storage key under which the notes of `location` are kept
#[wasm_bindgen(js_name = storageKey)]
pub fn storage_key(location: &str) -> String {
    annotate_core::derive_storage_key(location)
}

/// Annotation session of one viewer page.
///
/// Every method queues on one lock, so overlapping calls from JavaScript
/// run one after another.
#[wasm_bindgen]
pub struct Annotator {
    inner: Rc<Mutex<Controller>>,
}

#[wasm_bindgen]
impl Annotator {
    /// Create a session. `config_toml` overrides the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_toml: Option<String>) -> Result<Annotator, JsValue> {
        let config = match config_toml {
            Some(toml) => AnnotateConfig::from_toml(&toml).map_err(to_js)?,
            None => AnnotateConfig::default(),
        };
        let hosts = Hosts {
            controls: Box::new(DomButtons),
            notifier: Box::new(WindowAlert),
            downloads: Box::new(BlobDownloads),
        };
        let controller = UiController::new(config, LocalStorageStore, hosts).with_clock(JsClock);

        Ok(Annotator {
            inner: Rc::new(Mutex::new(controller)),
        })
    }

    /// Load a document and restore its notes. Resolves to the number restored.
    #[wasm_bindgen(js_name = setPdfDocument)]
    pub fn set_pdf_document(&self, url: String, bytes: Vec<u8>) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let doc = PdfDocument::load(&url, &bytes).map_err(to_js)?;
            let report = inner.lock().await.set_pdf_document(doc).await;
            Ok(JsValue::from(report.map(|r| r.restored as u32).unwrap_or(0)))
        })
    }

    /// Record the page currently on screen, as a `page-rendered` message
    /// would. Resolves to `false` when the document has no such page.
    #[wasm_bindgen(js_name = setCurrentPage)]
    pub fn set_current_page(&self, page_number: u32) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let accepted = inner
                .lock()
                .await
                .set_current_page(PageHandle::new(page_number));
            Ok(JsValue::from_bool(accepted))
        })
    }

    /// Handle a loader message given as a JSON string.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, json: String) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.lock().await.handle_json_message(&json).await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// `addTextNote` button. Resolves to the note id, or `undefined` when
    /// no note could be stored.
    #[wasm_bindgen(js_name = addTextNote)]
    pub fn add_text_note(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { Ok(add_text_note(&inner).await) })
    }

    /// `saveAnnotatedPdf` button. Resolves to the offered filename, or
    /// `undefined` after a failure (already alerted).
    #[wasm_bindgen(js_name = saveAnnotatedPdf)]
    pub fn save_annotated_pdf(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { Ok(save_annotated_pdf(&inner).await) })
    }

    /// Listen for loader messages on `window` and wire the toolbar buttons.
    pub fn attach(&self) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let document = window.document().ok_or("No document")?;

        let inner = self.inner.clone();
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let data = event.data();
            let json = match data.as_string() {
                Some(s) => s,
                None => match js_sys::JSON::stringify(&data) {
                    Ok(s) => String::from(s),
                    Err(_) => return,
                },
            };
            let inner = inner.clone();
            spawn_local(async move {
                inner.lock().await.handle_json_message(&json).await;
            });
        });
        window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
        on_message.forget();

        for control in Control::ALL {
            let Some(button) = document.get_element_by_id(control.element_id()) else {
                tracing::warn!(id = control.element_id(), "Button not found");
                continue;
            };
            let inner = self.inner.clone();
            let on_click = Closure::<dyn FnMut()>::new(move || {
                let inner = inner.clone();
                spawn_local(async move {
                    match control {
                        Control::AddTextNote => {
                            add_text_note(&inner).await;
                        }
                        Control::SaveAnnotatedPdf => {
                            save_annotated_pdf(&inner).await;
                        }
                    }
                });
            });
            button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
            on_click.forget();
        }

        Ok(())
    }
}

async fn add_text_note(inner: &Mutex<Controller>) -> JsValue {
    let mut controller = inner.lock().await;
    let config = controller.config();
    let draft = NoteDraft {
        text: config.note_text.clone(),
        rect: dom::place_note(config.note_rect, dom::container_width()),
    };
    match controller.add_note(draft).await {
        Ok(note) => JsValue::from_str(&note.id),
        Err(_) => JsValue::UNDEFINED,
    }
}

async fn save_annotated_pdf(inner: &Mutex<Controller>) -> JsValue {
    match inner.lock().await.save_annotated_pdf().await {
        Ok(filename) => JsValue::from_str(&filename),
        Err(_) => JsValue::UNDEFINED,
    }
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};
    use wasm_bindgen_futures::JsFuture;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn create_test_pdf(page_count: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..page_count)
            .map(|_| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => Object::Reference(pages_id),
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                }))
            })
            .collect();
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

    #[wasm_bindgen_test]
    async fn test_notes_are_restored_by_a_new_annotator() {
        let url = format!("https://example.test/{}.pdf", js_sys::Math::random());

        let first = Annotator::new(None).unwrap();
        let restored = JsFuture::from(first.set_pdf_document(url.clone(), create_test_pdf(2)))
            .await
            .unwrap();
        assert_eq!(restored.as_f64(), Some(0.0));

        let accepted = JsFuture::from(first.set_current_page(5)).await.unwrap();
        assert_eq!(accepted.as_bool(), Some(false));
        let accepted = JsFuture::from(first.set_current_page(2)).await.unwrap();
        assert_eq!(accepted.as_bool(), Some(true));

        let id = JsFuture::from(first.add_text_note())
            .await
            .unwrap()
            .as_string()
            .unwrap();
        assert!(id.starts_with("note_"));

        let second = Annotator::new(None).unwrap();
        let restored = JsFuture::from(second.set_pdf_document(url.clone(), create_test_pdf(2)))
            .await
            .unwrap();
        assert_eq!(restored.as_f64(), Some(1.0));

        let storage = web_sys::window().unwrap().local_storage().unwrap().unwrap();
        storage.remove_item(&storage_key(&url)).unwrap();
    }

    #[wasm_bindgen_test]
    async fn test_add_note_before_page_resolves_undefined() {
        let annotator = Annotator::new(None).unwrap();
        let id = JsFuture::from(annotator.add_text_note()).await.unwrap();
        assert!(id.is_undefined());
    }

    #[wasm_bindgen_test]
    fn test_invalid_config_is_rejected() {
        assert!(Annotator::new(Some("id_scheme = 3".to_string())).is_err());
    }
}
