pub mod batch;
pub mod error;
pub mod mapping;
pub mod outcome;
pub mod run_state;
pub mod watermark;

pub use batch::{Batch, Record};
pub use error::ErrorKind;
pub use mapping::{IncrementalMode, Mapping, Source, TransferParams};
pub use outcome::MappingOutcome;
pub use run_state::RunState;
pub use watermark::Watermark;
