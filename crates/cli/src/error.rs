use engine_config::ConfigError;
use engine_core::error::SyncError;
use thiserror::Error;

/// Errors the CLI surfaces before handing control to a [`engine_runtime::Runner`]
/// (or that escape it entirely). A failure inside an individual mapping run
/// never reaches here — the Runner folds those into `MappingOutcome::Failed`
/// and `main` reads the exit code off the resulting `RunReport`.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
