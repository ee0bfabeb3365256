pub use engine_core::error::SyncError;

use crate::control_plane::UploadObjectError;

/// Classifies a `reqwest` failure into the `Transient` vs fatal split the
/// control plane's retry policy needs (§4.4): connection resets, timeouts
/// and 5xx/429 responses are transient; everything else is `UploadFailed`.
pub fn classify_reqwest_error(err: &reqwest::Error) -> model::error::ErrorKind {
    use model::error::ErrorKind;

    if err.is_timeout() || err.is_connect() {
        return ErrorKind::Transient;
    }
    if let Some(status) = err.status() {
        if status.is_server_error() || status.as_u16() == 429 {
            return ErrorKind::Transient;
        }
    }
    ErrorKind::UploadFailed
}

/// An artifact disappearing mid-upload is not something a retry can fix, so
/// only the HTTP side of [`UploadObjectError`] inherits `reqwest`'s
/// transient/fatal split.
pub fn classify_upload_object_error(err: &UploadObjectError) -> model::error::ErrorKind {
    match err {
        UploadObjectError::Io(_) => model::error::ErrorKind::UploadFailed,
        UploadObjectError::Http(e) => classify_reqwest_error(e),
    }
}
