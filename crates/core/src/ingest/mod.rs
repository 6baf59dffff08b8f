pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod types;

pub use error::{IngestError, IngestResult};
pub use fetcher::{HttpSheetSource, SheetSource};
