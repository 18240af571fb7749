//! Push transformed jobs to the destination API and record the id correlation.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::elide::elide;
use crate::http_client::{ApiClient, HttpError};
use crate::job_store::{self, JOB_NUMBER_FIELD, StoreError};
use crate::selection::JobSelection;
use crate::stage::StageReport;

/// Correlation map file inside the data directory.
pub const JOB_MAP_FILE: &str = "jobmap.json";

/// Old job number → job number assigned by the destination.
pub type JobMap = BTreeMap<u64, u64>;

/// Reasons a single job could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The destination's reply carried no `message`.
    #[error("Job {job_number}: response has no message: '{body}'")]
    MissingMessage { job_number: u64, body: String },
    /// The confirmation message did not contain a backtick-delimited id.
    #[error("Job {job_number}: could not find the new job id in '{message}'")]
    UnrecognizedConfirmation { job_number: u64, message: String },
    /// The stored correlation map is not a number → number object.
    #[error("Job map {path} is malformed: {source}")]
    JobMap {
        path: String,
        source: serde_json::Error,
    },
}

/// New job id from the destination's confirmation message.
///
/// The destination only reports the id inside free text such as
/// ``Job `1234` successfully created``; the integer between the first pair of
/// backticks is taken. This is the single place that knows the format.
pub fn parse_created_id(message: &str) -> Option<u64> {
    let mut parts = message.split('`');
    parts.next()?;
    let candidate = parts.next()?;
    parts.next()?;
    candidate.trim().parse().ok()
}

/// Read the correlation map, treating a missing file as empty.
pub fn read_job_map(path: &Path) -> Result<JobMap, LoadError> {
    if !path.is_file() {
        return Ok(JobMap::new());
    }
    let value = job_store::read_json(path)?;
    serde_json::from_value(value).map_err(|source| LoadError::JobMap {
        path: path.display().to_string(),
        source,
    })
}

/// Persist the correlation map, replacing any previous file.
pub fn write_job_map(path: &Path, job_map: &JobMap) -> Result<(), LoadError> {
    let value = serde_json::to_value(job_map).map_err(|source| LoadError::JobMap {
        path: path.display().to_string(),
        source,
    })?;
    job_store::replace_json(path, &value)?;
    Ok(())
}

/// POST every selected transformed job not yet present in the correlation map.
///
/// Refuses to run without credentials. The merged map is written once at
/// the end when anything new was loaded.
pub fn run_load(
    client: &ApiClient,
    selection: &JobSelection,
    input_dir: &Path,
    job_map_path: &Path,
) -> StageReport {
    let mut report = StageReport::default();
    if !client.is_authorized() {
        warn!("No authentication to load jobs; skipping the load stage.");
        return report;
    }
    let mut job_map = match read_job_map(job_map_path) {
        Ok(job_map) => job_map,
        Err(err) => {
            error!("Refusing to load without a readable job map: {err}");
            return StageReport::aborted();
        }
    };
    let job_numbers = match selection.resolve(input_dir) {
        Ok(job_numbers) => job_numbers,
        Err(err) => {
            error!("Cannot list jobs to load: {err}");
            return StageReport::aborted();
        }
    };
    if job_numbers.is_empty() {
        error!("No input files found in {} to load", input_dir.display());
        return report;
    }

    let total = job_numbers.len();
    for (index, job_number) in job_numbers.into_iter().enumerate() {
        if let Some(new_id) = job_map.get(&job_number) {
            debug!("Job {job_number} already loaded as {new_id}; skipping.");
            report.skipped += 1;
            continue;
        }
        match load_job(client, job_number, input_dir) {
            Ok(new_id) => {
                job_map.insert(job_number, new_id);
                report.succeeded += 1;
                info!("Load: {}/{} (job {job_number} -> {new_id})", index + 1, total);
            }
            Err(err) => {
                error!("Failed to load job {job_number}: {err}");
                report.failed += 1;
            }
        }
    }

    if report.succeeded > 0 {
        match write_job_map(job_map_path, &job_map) {
            Ok(()) => info!(
                "Wrote {} job mappings to '{}'.",
                job_map.len(),
                job_map_path.display()
            ),
            Err(err) => {
                error!("Failed to write job map: {err}");
                report.aborted = true;
            }
        }
    }
    report
}

fn load_job(client: &ApiClient, job_number: u64, input_dir: &Path) -> Result<u64, LoadError> {
    let mut job = job_store::read_job(job_number, input_dir)?;
    let stored = job
        .as_object_mut()
        .and_then(|fields| fields.remove(JOB_NUMBER_FIELD));
    if let Some(stored) = stored
        && stored.as_u64() != Some(job_number)
    {
        warn!("{JOB_NUMBER_FIELD} {stored} did not match filename job {job_number}");
    }
    let url = client.endpoint("job");
    info!("Sending transformed job {job_number} to {url}");
    let response = client.post_json(&url, &job)?;
    let Some(message) = response.get("message").and_then(Value::as_str) else {
        return Err(LoadError::MissingMessage {
            job_number,
            body: elide(&response.to_string()).into_owned(),
        });
    };
    parse_created_id(message).ok_or_else(|| LoadError::UnrecognizedConfirmation {
        job_number,
        message: elide(message).into_owned(),
    })
}
