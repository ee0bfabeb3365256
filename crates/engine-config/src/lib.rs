pub mod error;
pub mod mapping_file;
pub mod paths;
pub mod run_options;
pub mod secrets;

pub use error::ConfigError;
pub use paths::BridgePaths;
pub use run_options::{CliFlags, MappingSelector, RunOptions};
pub use secrets::{EnvSecretResolver, SecretResolver};
