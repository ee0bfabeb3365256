pub mod adapter;
pub mod error;
pub mod log;
pub mod row;
pub mod sql;

pub use adapter::{apply_schema_drift_check, FetchResult, SourceAdapter};
pub use error::ConnectorError;
