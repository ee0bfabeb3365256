use connectors::ConnectorError;
use model::error::ErrorKind;
use thiserror::Error;

/// Top-level error a mapping run can fail with. Every variant classifies
/// into §7's taxonomy via [`SyncError::kind`], which is all the Runner
/// consults when deciding whether to stop the run or record a
/// `MappingOutcome::Failed` and move on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            SyncError::Connector(e) => e.kind(),
            SyncError::UploadFailed(_) => ErrorKind::UploadFailed,
            SyncError::StateStore(_) => ErrorKind::StateCorrupt,
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Errors from the JSON-file state store (§4.5). Corruption is recovered by
/// the store itself (quarantine + empty state); this variant exists for the
/// I/O failures that recovery can't paper over.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("could not read state file: {0}")]
    Read(String),

    #[error("could not write state file: {0}")]
    Write(String),
}
