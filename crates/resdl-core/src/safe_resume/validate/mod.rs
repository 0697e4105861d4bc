//! Compares stored file metadata with the validators of a fresh response.

mod error;

use crate::chunk_store::FileMeta;

pub use error::{ValidationError, ValidationErrorKind};

/// Returns Ok(()) if stored chunks can be safely extended with the remote data.
///
/// A validator is only compared when both sides carry it: servers often omit
/// Last-Modified on ranged responses, and the total is unknown until the first
/// response. Returns Err(ValidationError) when any compared value differs.
pub fn validate_for_resume(stored: &FileMeta, remote: &FileMeta) -> Result<(), ValidationError> {
    fn differs<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
        matches!((a, b), (Some(a), Some(b)) if a != b)
    }

    let etag_changed = differs(&stored.etag, &remote.etag);
    let last_modified_changed = differs(&stored.last_modified, &remote.last_modified);
    let size_changed = differs(&stored.total_size, &remote.total_size);

    if etag_changed || last_modified_changed || size_changed {
        return Err(ValidationError {
            kind: ValidationErrorKind::RemoteChanged {
                etag_changed,
                last_modified_changed,
                size_changed,
            },
        });
    }

    Ok(())
}
