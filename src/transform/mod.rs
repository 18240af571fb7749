//! Schema transformation: the record transformer and the stage driving it.

mod blob_ids;
mod decode;
mod record;

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogError, MetricCatalog};
use crate::job_store::{self, JOB_NUMBER_FIELD, StoreError, WriteOutcome};
use crate::selection::JobSelection;
use crate::stage::StageReport;

pub use blob_ids::{BlobIdSource, RandomBlobIds, SequentialBlobIds};
pub use record::{ENV_FIELDS, ENV_NAME, transform_job};

/// Reasons a single job could not be transformed.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A measurement's `(metric, spec, filter)` triple is not in the catalog.
    #[error("Job {job_number}: {source}")]
    Catalog {
        job_number: u64,
        #[source]
        source: CatalogError,
    },
    /// The old document lacks something the new schema needs.
    #[error("Job {job_number} is malformed: {message}")]
    Malformed { job_number: u64, message: String },
    /// Reading or writing job files failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transform every selected job from `input_dir` into `output_dir`.
///
/// Outputs are named by the input file's job number, so reruns and the load
/// stage find them under the same key. Jobs whose output already exists are
/// skipped. A failing job is logged and counted; the remaining jobs are still
/// processed.
pub fn run_transform(
    selection: &JobSelection,
    input_dir: &Path,
    output_dir: &Path,
    catalog: &MetricCatalog,
    ids: &mut dyn BlobIdSource,
) -> StageReport {
    let mut report = StageReport::default();
    let job_numbers = match selection.resolve(input_dir) {
        Ok(job_numbers) => job_numbers,
        Err(err) => {
            error!("Cannot list jobs to transform: {err}");
            return StageReport::aborted();
        }
    };
    if job_numbers.is_empty() {
        error!("No input files found in {} to transform", input_dir.display());
        return report;
    }
    let total = job_numbers.len();
    for (index, job_number) in job_numbers.into_iter().enumerate() {
        if job_store::job_path(output_dir, job_number).exists() {
            debug!("Job {job_number} already transformed; skipping.");
            report.skipped += 1;
            continue;
        }
        match transform_file(job_number, input_dir, output_dir, catalog, ids) {
            Ok(WriteOutcome::Written) => report.succeeded += 1,
            Ok(WriteOutcome::AlreadyPresent) => report.skipped += 1,
            Err(err) => {
                error!("Failed to transform job {job_number}: {err}");
                report.failed += 1;
            }
        }
        info!("Transform: {}/{} (job {job_number})", index + 1, total);
    }
    report
}

fn transform_file(
    job_number: u64,
    input_dir: &Path,
    output_dir: &Path,
    catalog: &MetricCatalog,
    ids: &mut dyn BlobIdSource,
) -> Result<WriteOutcome, TransformError> {
    let old = job_store::read_job(job_number, input_dir)?;
    debug!("Loaded job {job_number} from '{}'.", input_dir.display());
    let transformed = transform_job(&old, catalog, ids)?;
    let stamped = transformed
        .get(JOB_NUMBER_FIELD)
        .and_then(serde_json::Value::as_u64);
    if let Some(stamped) = stamped
        && stamped != job_number
    {
        warn!("Job file {job_number} describes job {stamped}; keeping file number {job_number}");
    }
    Ok(job_store::write_job(job_number, &transformed, output_dir)?)
}
