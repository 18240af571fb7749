//! File-per-job persistence shared by the extract, transform and load stages.
//!
//! A job file is written once and never overwritten: writes go to a temporary
//! file in the target directory and are persisted without clobbering, so a
//! killed run leaves either a complete file or nothing. Re-running a stage
//! therefore resumes from whatever files already exist.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

/// Directory below the data dir holding extracted (old-schema) jobs.
pub const JOBS_DIR: &str = "jobs";
/// Directory below the data dir holding transformed (new-schema) jobs.
pub const TRANSFORMED_DIR: &str = "transformed";
/// Correlation field persisted in transformed jobs and stripped before upload.
pub const JOB_NUMBER_FIELD: &str = "_job_number";

static JOB_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^job-(\d+)\.json$").expect("job file regex must compile"));

/// Errors raised by job file persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No file exists for the requested job.
    #[error("Job {job_number} not found in {dir}")]
    NotFound { job_number: u64, dir: PathBuf },
    /// Failed to create a store directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    /// Failed to enumerate a store directory.
    #[error("Failed to list {path}: {source}")]
    List { path: PathBuf, source: io::Error },
    /// Failed to read a file.
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    /// Failed to write a file.
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    /// A file did not contain valid JSON.
    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A document could not be serialized.
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The job carries neither a usable `_job_number` nor `links.self`.
    #[error("Cannot derive job number: {0}")]
    JobNumber(String),
}

/// Result of a no-clobber write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    AlreadyPresent,
}

/// Path of the file holding `job_number` inside `dir`.
pub fn job_path(dir: &Path, job_number: u64) -> PathBuf {
    dir.join(format!("job-{job_number}.json"))
}

/// Write `document` as `job-<job_number>.json`, leaving an existing file untouched.
pub fn write_job(
    job_number: u64,
    document: &Value,
    dir: &Path,
) -> Result<WriteOutcome, StoreError> {
    write_json_new(&job_path(dir, job_number), document)
}

/// Read the document stored for `job_number`.
pub fn read_job(job_number: u64, dir: &Path) -> Result<Value, StoreError> {
    let path = job_path(dir, job_number);
    if !path.is_file() {
        return Err(StoreError::NotFound {
            job_number,
            dir: dir.to_path_buf(),
        });
    }
    read_json(&path)
}

/// Job numbers with a file in `dir`, ascending. A missing directory is empty.
pub fn list_jobs(dir: &Path) -> Result<Vec<u64>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| StoreError::List {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut numbers: Vec<u64> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name();
            let captures = JOB_FILE_PATTERN.captures(name.to_str()?)?;
            captures[1].parse::<u64>().ok()
        })
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    Ok(numbers)
}

/// Derive a job's number.
///
/// A stored `_job_number` takes precedence over the number embedded in
/// `links.self`; when both exist and disagree a warning is logged.
pub fn job_number_for(job: &Value) -> Result<u64, StoreError> {
    let stored = job.get(JOB_NUMBER_FIELD).and_then(as_job_number);
    let linked = job
        .pointer("/links/self")
        .and_then(Value::as_str)
        .map(job_number_from_link);
    match (stored, linked) {
        (Some(stored), Some(Ok(linked))) if stored != linked => {
            warn!(
                "Stored {JOB_NUMBER_FIELD} {stored} does not match links.self job {linked}; using {stored}"
            );
            Ok(stored)
        }
        (Some(stored), _) => Ok(stored),
        (None, Some(linked)) => linked,
        (None, None) => Err(StoreError::JobNumber(format!(
            "job has neither {JOB_NUMBER_FIELD} nor links.self"
        ))),
    }
}

/// Job number from a `links.self` URL such as `https://host/jobs/42/`.
///
/// The number is the last path segment but one, so the trailing slash the
/// source API emits is required.
pub fn job_number_from_link(link: &str) -> Result<u64, StoreError> {
    let segments: Vec<String> = match Url::parse(link) {
        Ok(url) => url
            .path_segments()
            .map(|segments| segments.map(str::to_string).collect())
            .unwrap_or_default(),
        Err(_) => link.split('/').map(str::to_string).collect(),
    };
    let candidate = segments
        .len()
        .checked_sub(2)
        .and_then(|index| segments.get(index))
        .ok_or_else(|| StoreError::JobNumber(format!("links.self '{link}' is too short")))?;
    candidate
        .parse::<u64>()
        .map_err(|_| StoreError::JobNumber(format!("links.self '{link}' has no job number")))
}

fn as_job_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Read and decode a JSON file.
pub fn read_json(path: &Path) -> Result<Value, StoreError> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `value` to `path` unless the file already exists.
pub fn write_json_new(path: &Path, value: &Value) -> Result<WriteOutcome, StoreError> {
    if path.exists() {
        info!("File '{}' exists; remove it to allow rewriting.", path.display());
        return Ok(WriteOutcome::AlreadyPresent);
    }
    let temp = write_temp(path, value)?;
    match temp.persist_noclobber(path) {
        Ok(_) => {
            debug!("Wrote '{}'.", path.display());
            Ok(WriteOutcome::Written)
        }
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            info!("File '{}' exists; remove it to allow rewriting.", path.display());
            Ok(WriteOutcome::AlreadyPresent)
        }
        Err(err) => Err(StoreError::Write {
            path: path.to_path_buf(),
            source: err.error,
        }),
    }
}

/// Atomically replace `path` with `value`.
pub fn replace_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    let temp = write_temp(path, value)?;
    temp.persist(path).map_err(|err| StoreError::Write {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    debug!("Replaced '{}'.", path.display());
    Ok(())
}

/// Serialize with sorted keys and four-space indentation.
pub fn to_pretty_bytes(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    sorted(value).serialize(&mut serializer)?;
    Ok(out)
}

// Map ordering depends on serde_json features chosen elsewhere in the build.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), sorted(value));
            }
            Value::Object(map)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn write_temp(path: &Path, value: &Value) -> Result<NamedTempFile, StoreError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let bytes = to_pretty_bytes(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    let write_error = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(&bytes).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_sorted_keys_with_four_space_indent() {
        let dir = tempdir().unwrap();
        let outcome = write_job(7, &json!({"b": 1, "a": {"d": 2, "c": 3}}), dir.path()).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        let text = fs::read_to_string(job_path(dir.path(), 7)).unwrap();
        assert_eq!(
            text,
            "{\n    \"a\": {\n        \"c\": 3,\n        \"d\": 2\n    },\n    \"b\": 1\n}"
        );
    }

    #[test]
    fn second_write_is_a_noop() {
        let dir = tempdir().unwrap();
        write_job(3, &json!({"v": "first"}), dir.path()).unwrap();
        let before = fs::read(job_path(dir.path(), 3)).unwrap();
        let outcome = write_job(3, &json!({"v": "second"}), dir.path()).unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
        assert_eq!(fs::read(job_path(dir.path(), 3)).unwrap(), before);
    }

    #[test]
    fn write_creates_missing_directory_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("transformed");
        write_job(1, &json!({}), &nested).unwrap();
        let names: Vec<_> = fs::read_dir(&nested)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("job-1.json")]);
    }

    #[test]
    fn lists_only_job_files() {
        let dir = tempdir().unwrap();
        for name in ["job-12.json", "job-3.json", "job-x.json", "notes.txt", "job-4.json.tmp"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("job-99.json")).unwrap();
        assert_eq!(list_jobs(dir.path()).unwrap(), vec![3, 12]);
    }

    #[test]
    fn missing_directory_lists_empty() {
        let dir = tempdir().unwrap();
        assert!(list_jobs(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn read_missing_job_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read_job(5, dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { job_number: 5, .. }));
    }

    #[test]
    fn read_returns_written_document() {
        let dir = tempdir().unwrap();
        let doc = json!({"measurements": [], "_job_number": 8});
        write_job(8, &doc, dir.path()).unwrap();
        assert_eq!(read_job(8, dir.path()).unwrap(), doc);
    }

    #[test]
    fn job_number_from_links_self() {
        let job = json!({"links": {"self": "https://squash.example/jobs/42/"}});
        assert_eq!(job_number_for(&job).unwrap(), 42);
    }

    #[test]
    fn stored_job_number_wins_over_link() {
        let job = json!({"_job_number": 43, "links": {"self": "https://squash.example/jobs/42/"}});
        assert_eq!(job_number_for(&job).unwrap(), 43);
    }

    #[test]
    fn relative_links_and_query_strings_are_handled() {
        assert_eq!(job_number_from_link("/jobs/17/").unwrap(), 17);
        assert_eq!(job_number_from_link("http://h/jobs/18/?format=json").unwrap(), 18);
    }

    #[test]
    fn link_without_trailing_slash_is_rejected() {
        assert!(job_number_from_link("https://squash.example/jobs/42").is_err());
        assert!(job_number_for(&json!({"ci_id": "1"})).is_err());
    }

    #[test]
    fn replace_json_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobmap.json");
        replace_json(&path, &json!({"1": 2})).unwrap();
        replace_json(&path, &json!({"1": 3})).unwrap();
        assert_eq!(read_json(&path).unwrap(), json!({"1": 3}));
    }
}
