//! Safe resume: re-validate ETag/Last-Modified/size before appending to stored chunks.
//!
//! When a transfer resumes with stored chunks, the validators on the ranged
//! response are compared with the stored file metadata. If the remote file was
//! replaced, the engine either purges and restarts from zero or stops with an
//! error, depending on `restart_on_remote_change`.

mod validate;

pub use validate::{validate_for_resume, ValidationError, ValidationErrorKind};
