//! Pull old-schema jobs from the source API into the job store.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::http_client::ApiClient;
use crate::job_store::{self, WriteOutcome};
use crate::selection::JobSelection;
use crate::stage::StageReport;

/// Fetch the selected jobs into `jobs_dir`, skipping those already on disk.
pub fn run_extract(client: &ApiClient, selection: &JobSelection, jobs_dir: &Path) -> StageReport {
    match selection {
        JobSelection::All => extract_all(client, jobs_dir),
        JobSelection::Only(job_numbers) => {
            extract_selected(client, job_numbers.iter().copied(), jobs_dir)
        }
    }
}

fn extract_all(client: &ApiClient, jobs_dir: &Path) -> StageReport {
    let mut report = StageReport::default();
    let mut next = Some(client.endpoint("jobs"));
    let mut seen = 0usize;
    while let Some(url) = next.take() {
        let page = match client.get_json(&url) {
            Ok(page) => page,
            Err(err) => {
                error!("Failed to fetch job listing page: {err}");
                report.failed += 1;
                break;
            }
        };
        let count = page.get("count").and_then(Value::as_u64).unwrap_or(0);
        let Some(results) = page.get("results").and_then(Value::as_array) else {
            error!("Job listing page {url} has no results list");
            report.failed += 1;
            break;
        };
        for job in results {
            seen += 1;
            store_listed_job(job, jobs_dir, &mut report);
            debug!("Extract: {seen}/{count}");
        }
        info!("Extract: {seen}/{count} jobs listed");
        next = page
            .get("next")
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty() && *link != url)
            .map(str::to_string);
    }
    report
}

fn store_listed_job(job: &Value, jobs_dir: &Path, report: &mut StageReport) {
    let job_number = match job_store::job_number_for(job) {
        Ok(job_number) => job_number,
        Err(err) => {
            error!("Skipping listed job: {err}");
            report.failed += 1;
            return;
        }
    };
    match job_store::write_job(job_number, job, jobs_dir) {
        Ok(WriteOutcome::Written) => report.succeeded += 1,
        Ok(WriteOutcome::AlreadyPresent) => report.skipped += 1,
        Err(err) => {
            error!("Failed to store job {job_number}: {err}");
            report.failed += 1;
        }
    }
}

fn extract_selected(
    client: &ApiClient,
    job_numbers: impl ExactSizeIterator<Item = u64>,
    jobs_dir: &Path,
) -> StageReport {
    let mut report = StageReport::default();
    let total = job_numbers.len();
    for (index, job_number) in job_numbers.enumerate() {
        if job_store::job_path(jobs_dir, job_number).exists() {
            debug!("Job {job_number} already extracted; skipping.");
            report.skipped += 1;
            continue;
        }
        let url = client.endpoint(&format!("jobs/{job_number}/"));
        let job = match client.get_json(&url) {
            Ok(job) => job,
            Err(err) => {
                error!("Failed to fetch job {job_number}: {err}");
                report.failed += 1;
                continue;
            }
        };
        match job_store::job_number_for(&job) {
            Ok(found) if found != job_number => {
                warn!("Requested job {job_number} but the source returned job {found}")
            }
            Ok(_) => {}
            Err(err) => debug!("Job {job_number}: {err}"),
        }
        match job_store::write_job(job_number, &job, jobs_dir) {
            Ok(WriteOutcome::Written) => report.succeeded += 1,
            Ok(WriteOutcome::AlreadyPresent) => report.skipped += 1,
            Err(err) => {
                error!("Failed to store job {job_number}: {err}");
                report.failed += 1;
            }
        }
        info!("Extract: {}/{} (job {job_number})", index + 1, total);
    }
    report
}
