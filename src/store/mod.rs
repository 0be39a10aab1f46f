//! HTTP clients for the external blob and metadata stores.
//!
//! Both stores are managed services reached over HTTP. The object store holds
//! uploaded source files under opaque keys; the metadata store is a document
//! store holding file records keyed by `(user_id, file_id)` and user profiles
//! keyed by `user_id`. Raw extracted text is never written to either table.

mod metadata;
mod object;
mod types;

pub use metadata::MetadataStoreClient;
pub use object::ObjectStoreClient;
pub use types::{FileRecord, StoreError, StoredProfile};

/// Key under which an uploaded blob is stored, derived from the file id.
pub fn storage_key(file_id: &str) -> String {
    format!("uploads/{file_id}")
}
