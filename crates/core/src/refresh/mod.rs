pub mod scheduler;

pub use scheduler::{RefreshOutcome, RefreshScheduler};

use crate::domain::NormalizedDataset;
use crate::ingest::envelope::{self, EnvelopeStrategy};
use crate::ingest::{IngestResult, SheetSource};
use crate::normalize::{normalize, NormalizeOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub envelope: EnvelopeStrategy,
    pub normalize: NormalizeOptions,
}

/// fetch → unwrap → normalize. The network wait is the only suspension point.
pub async fn run_pipeline(
    source: &dyn SheetSource,
    options: &PipelineOptions,
) -> IngestResult<NormalizedDataset> {
    let raw = source.fetch().await?;
    let table = envelope::parse(&raw, options.envelope)?;
    normalize(&table, &options.normalize)
}
