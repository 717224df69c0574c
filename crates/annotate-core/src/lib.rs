//! PDF annotation persistence and export
//!
//! Keeps user-added notes for a PDF across reloads and exports an annotated
//! copy of the document using lopdf.
//!
//! - `key`: document location → storage key
//! - `persistence`: async key-value stores of annotation maps
//! - `bridge`: store ⇄ annotation table (restore, create)
//! - `controller`: loader messages and button handlers
//! - `export`: annotated PDF bytes and download filename

pub mod bridge;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod export;
pub mod key;
pub mod message;
pub mod persistence;
pub mod record;
pub mod session;

pub use bridge::{create_note, restore_annotations, RestoreReport};
pub use config::{AnnotateConfig, IdScheme};
pub use controller::{
    Control, ControlSurface, DownloadHost, DownloadRequest, Hosts, Notifier, UiController,
    CONTAINER_ID,
};
pub use document::{AnnotationTable, PageHandle, PdfDocument};
pub use error::{AnnotateError, DocumentError, ExportError, StoreError};
pub use export::{annotated_filename, serialize_with_annotations};
pub use key::{decode_storage_key, derive_storage_key, derive_storage_key_with};
pub use message::{DocumentSource, HostMessage, PageRef};
#[cfg(feature = "fs-store")]
pub use persistence::FileStore;
pub use persistence::{AnnotationStore, KeyedStore, LoadedMap, MemoryStore};
pub use record::{
    AnnotationMap, AnnotationRecord, Clock, FixedClock, IdGenerator, NoteDraft, PdfRect,
    ResolvedAnnotation, SystemClock, TimestampIds, UniqueIds,
};
pub use session::{SessionContext, SessionState};
