//! `window.localStorage` backed annotation store

use annotate_core::persistence::{decode_map, encode_map, LoadedMap};
use annotate_core::{AnnotationMap, AnnotationStore, StoreError};
use async_trait::async_trait;
use wasm_bindgen::JsValue;
use web_sys::Storage;

/// One JSON string per storage key.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageStore;

impl LocalStorageStore {
    fn storage() -> Result<Storage, StoreError> {
        let window = web_sys::window().ok_or_else(|| StoreError::Backend("No window".into()))?;
        window
            .local_storage()
            .map_err(js_error)?
            .ok_or_else(|| StoreError::Backend("No localStorage".into()))
    }
}

fn js_error(value: JsValue) -> StoreError {
    StoreError::Backend(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
}

#[async_trait(?Send)]
impl AnnotationStore for LocalStorageStore {
    async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError> {
        match Self::storage()?.get_item(key).map_err(js_error)? {
            Some(json) => decode_map(&json),
            None => Ok(LoadedMap::default()),
        }
    }

    async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError> {
        let json = encode_map(map)?;
        // QuotaExceededError surfaces here
        Self::storage()?.set_item(key, &json).map_err(js_error)
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use annotate_core::{AnnotationRecord, PdfRect};
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn unique_key(name: &str) -> String {
        format!("annotate_test_{}_{}", name, js_sys::Math::random())
    }

    #[wasm_bindgen_test]
    async fn test_local_storage_round_trip() {
        let key = unique_key("round_trip");
        let store = LocalStorageStore;
        assert!(store.load(&key).await.unwrap().is_empty());

        let mut map = AnnotationMap::new();
        map.insert(
            "note_1".to_string(),
            AnnotationRecord {
                id: "note_1".to_string(),
                kind: Some("Text".to_string()),
                text: "stored in the browser".to_string(),
                rect: Some(PdfRect::new(1.0, 2.0, 3.0, 4.0)),
                color: None,
                flags: None,
                rotation: None,
                page_number: 1,
                timestamp: 7,
            },
        );
        store.save(&key, &map).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), map);

        LocalStorageStore::storage().unwrap().remove_item(&key).unwrap();
    }

    #[wasm_bindgen_test]
    async fn test_local_storage_rejects_malformed_entries() {
        let key = unique_key("malformed");
        let storage = LocalStorageStore::storage().unwrap();
        storage
            .set_item(&key, r#"{"ok":{"text":"a","pageNumber":1},"bad":{"text":"a"}}"#)
            .unwrap();

        let loaded = LocalStorageStore.load_entries(&key).await.unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.rejected, vec!["bad".to_string()]);

        storage.remove_item(&key).unwrap();
    }
}
