//! Browser implementations of the controller's host traits

use annotate_core::{
    Clock, Control, ControlSurface, DownloadHost, DownloadRequest, ExportError, Notifier, PdfRect,
    CONTAINER_ID,
};
use async_trait::async_trait;
use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use tracing::{info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, BlobPropertyBag, Document, HtmlAnchorElement, HtmlButtonElement, Url};

fn document() -> Option<Document> {
    web_sys::window()?.document()
}

fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

/// Toggles the `disabled` attribute of the toolbar buttons.
pub struct DomButtons;

impl ControlSurface for DomButtons {
    fn set_enabled(&self, control: Control, enabled: bool) {
        let button = document()
            .and_then(|doc| doc.get_element_by_id(control.element_id()))
            .and_then(|el| el.dyn_into::<HtmlButtonElement>().ok());

        match button {
            Some(button) => button.set_disabled(!enabled),
            None => warn!(id = control.element_id(), "Button not found"),
        }
    }
}

pub struct WindowAlert;

impl Notifier for WindowAlert {
    fn alert(&self, message: &str) {
        if let Some(window) = web_sys::window() {
            let _ = window.alert_with_message(message);
        }
    }
}

/// How long an object URL outlives the click that started its download.
const REVOKE_DELAY_MS: i32 = 10_000;

/// Saves through the File System Access picker when the request asks where
/// to save and the browser has one; otherwise offers the bytes through a
/// temporary object URL and an `<a download>` click.
pub struct BlobDownloads;

enum PickerOutcome {
    Saved,
    Cancelled,
    Unavailable,
}

impl BlobDownloads {
    async fn save_with_picker(request: &DownloadRequest) -> Result<PickerOutcome, JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let picker = Reflect::get(&window, &"showSaveFilePicker".into())?;
        let Some(picker) = picker.dyn_ref::<Function>() else {
            return Ok(PickerOutcome::Unavailable);
        };

        let accept = Object::new();
        Reflect::set(&accept, &request.mime_type.into(), &Array::of1(&".pdf".into()))?;
        let file_type = Object::new();
        Reflect::set(&file_type, &"description".into(), &"PDF document".into())?;
        Reflect::set(&file_type, &"accept".into(), &accept)?;
        let options = Object::new();
        Reflect::set(&options, &"suggestedName".into(), &request.filename.as_str().into())?;
        Reflect::set(&options, &"types".into(), &Array::of1(&file_type))?;

        let handle = match await_call(picker, &window, &[options.into()]).await {
            Ok(handle) => handle,
            Err(e) => match error_name(&e).as_deref() {
                Some("AbortError") => return Ok(PickerOutcome::Cancelled),
                // No user activation left, e.g. after a slow export
                Some("SecurityError") => return Ok(PickerOutcome::Unavailable),
                _ => return Err(e),
            },
        };

        let writable = await_method(&handle, "createWritable", &[]).await?;
        let bytes = Uint8Array::from(request.bytes.as_slice());
        await_method(&writable, "write", &[bytes.into()]).await?;
        await_method(&writable, "close", &[]).await?;
        Ok(PickerOutcome::Saved)
    }

    fn save_with_anchor(request: &DownloadRequest) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let doc = window.document().ok_or("No document")?;

        let parts = Array::new();
        parts.push(&Uint8Array::from(request.bytes.as_slice()));
        let options = BlobPropertyBag::new();
        options.set_type(request.mime_type);
        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;

        let url = Url::create_object_url_with_blob(&blob)?;
        let anchor: HtmlAnchorElement = doc.create_element("a")?.dyn_into()?;
        anchor.set_href(&url);
        anchor.set_download(&request.filename);
        anchor.click();

        // Revoking in the same tick can cancel the download.
        let revoke = Closure::once_into_js(move || {
            let _ = Url::revoke_object_url(&url);
        });
        window.set_timeout_with_callback_and_timeout_and_arguments_0(
            revoke.unchecked_ref(),
            REVOKE_DELAY_MS,
        )?;
        Ok(())
    }
}

/// Call `f` with `this` and await the promise it returns.
async fn await_call(f: &Function, this: &JsValue, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let args: Array = args.iter().collect();
    let promise: Promise = f.apply(this, &args)?.dyn_into()?;
    JsFuture::from(promise).await
}

async fn await_method(target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let method: Function = Reflect::get(target, &name.into())?.dyn_into()?;
    await_call(&method, target, args).await
}

fn error_name(error: &JsValue) -> Option<String> {
    Reflect::get(error, &"name".into()).ok()?.as_string()
}

#[async_trait(?Send)]
impl DownloadHost for BlobDownloads {
    async fn download(&self, request: DownloadRequest) -> Result<(), ExportError> {
        let to_export = |e: JsValue| ExportError::Download(js_message(&e));

        if request.save_as {
            match Self::save_with_picker(&request).await.map_err(to_export)? {
                PickerOutcome::Saved => return Ok(()),
                PickerOutcome::Cancelled => {
                    info!(filename = %request.filename, "Save dialog dismissed");
                    return Ok(());
                }
                PickerOutcome::Unavailable => {}
            }
        }
        Self::save_with_anchor(&request).map_err(to_export)
    }
}

/// `Date.now()`
pub struct JsClock;

impl Clock for JsClock {
    fn now_millis(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}

/// Client width of the viewer container, if it is laid out.
pub fn container_width() -> Option<f64> {
    let width = document()?.get_element_by_id(CONTAINER_ID)?.client_width();
    (width > 0).then_some(width as f64)
}

/// Keep a new note inside a container of the given width, centred
/// horizontally when the configured position would overflow it.
pub fn place_note(rect: PdfRect, container_width: Option<f64>) -> PdfRect {
    let Some(width) = container_width else {
        return rect;
    };
    if rect.x1 <= width {
        return rect;
    }
    let x0 = ((width - rect.width()) / 2.0).max(0.0);
    PdfRect::new(x0, rect.y0, x0 + rect.width(), rect.y1)
}


#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_buttons_toggle_disabled() {
        let doc = document().unwrap();
        let button: HtmlButtonElement = doc.create_element("button").unwrap().dyn_into().unwrap();
        button.set_id(Control::SaveAnnotatedPdf.element_id());
        doc.body().unwrap().append_child(&button).unwrap();

        DomButtons.set_enabled(Control::SaveAnnotatedPdf, false);
        assert!(button.disabled());
        DomButtons.set_enabled(Control::SaveAnnotatedPdf, true);
        assert!(!button.disabled());

        button.remove();
    }

    #[wasm_bindgen_test]
    async fn test_download_without_save_dialog_uses_anchor() {
        let request = DownloadRequest {
            filename: "report_annotated.pdf".to_string(),
            mime_type: "application/pdf",
            bytes: b"%PDF-1.7".to_vec(),
            save_as: false,
        };
        assert!(BlobDownloads.download(request).await.is_ok());
    }

    #[wasm_bindgen_test]
    fn test_js_clock_is_wall_time() {
        let now = JsClock.now_millis();
        assert!(now > 1_600_000_000_000);
    }
}
