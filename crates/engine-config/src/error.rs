use thiserror::Error;

/// Configuration-time failures (§4.5/§6): malformed mapping files, missing
/// secrets, bad environment overrides. All of these are `ConfigInvalid` in
/// §7's taxonomy and are fatal before any task starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read mapping file {path}: {source}")]
    ReadMappingFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mapping file {path} is not valid JSON: {source}")]
    ParseMappingFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("mapping {0}")]
    InvalidMapping(#[from] model::mapping::MappingValidationError),

    #[error("duplicate mapping id `{0}`")]
    DuplicateMappingId(String),

    #[error("no mappings found under {0}")]
    NoMappingsFound(String),

    #[error("mapping `{mapping_id}` requested but not found")]
    UnknownMapping { mapping_id: String },

    #[error("secret `{0}` not found (expected environment variable {1})")]
    SecretNotFound(String, String),

    #[error("invalid value for {name}: `{value}`")]
    InvalidEnvValue { name: String, value: String },
}
