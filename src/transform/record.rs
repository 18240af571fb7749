//! Old-schema job → new-schema job.

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::blob_ids::BlobIdSource;
use super::decode::{decode_embedded, decode_text};
use super::TransformError;
use crate::catalog::MetricCatalog;
use crate::job_store::{self, JOB_NUMBER_FIELD};

/// Old top-level scalars collected into `meta.env`.
pub const ENV_FIELDS: [&str; 7] = [
    "ci_id",
    "ci_name",
    "ci_dataset",
    "ci_label",
    "date",
    "ci_url",
    "status",
];
/// Constant environment name stamped into every transformed job.
pub const ENV_NAME: &str = "jenkins";

/// Produce the new-schema document for one old-schema job.
///
/// The old document is never modified. Output is deterministic for a
/// deterministic `ids` source.
pub fn transform_job(
    old: &Value,
    catalog: &MetricCatalog,
    ids: &mut dyn BlobIdSource,
) -> Result<Value, TransformError> {
    let job_number = job_store::job_number_for(old)?;
    let mut blobs = job_blobs(old, job_number);

    let old_measurements: &[Value] = match old.get("measurements") {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => {
            return Err(TransformError::Malformed {
                job_number,
                message: "measurements is not a list".to_string(),
            });
        }
    };
    let mut measurements = Vec::with_capacity(old_measurements.len());
    for old_measurement in old_measurements {
        let (measurement, synthesized) =
            transform_measurement(old_measurement, job_number, catalog, ids)?;
        blobs.extend(synthesized);
        measurements.push(measurement);
    }

    let mut meta = Map::new();
    meta.insert("env".to_string(), env_for(old));
    meta.insert("packages".to_string(), packages_for(old, job_number));

    let mut job = Map::new();
    job.insert("measurements".to_string(), Value::Array(measurements));
    job.insert("blobs".to_string(), Value::Array(blobs));
    job.insert("meta".to_string(), Value::Object(meta));
    job.insert(JOB_NUMBER_FIELD.to_string(), Value::from(job_number));
    Ok(Value::Object(job))
}

fn transform_measurement(
    old: &Value,
    job_number: u64,
    catalog: &MetricCatalog,
    ids: &mut dyn BlobIdSource,
) -> Result<(Value, Option<Value>), TransformError> {
    let metric = old
        .get("metric")
        .and_then(Value::as_str)
        .ok_or_else(|| TransformError::Malformed {
            job_number,
            message: "measurement has no metric name".to_string(),
        })?;
    let metadata = old.get("metadata").and_then(decode_metadata);
    let spec = metadata_str(metadata.as_ref(), "spec_name");
    let filter = metadata_str(metadata.as_ref(), "filter_name");

    let name = catalog
        .canonical_name_for(metric, spec, filter)
        .map_err(|source| TransformError::Catalog { job_number, source })?;
    let unit = catalog.unit_for(metric);
    let mut blob_refs = metadata.as_ref().and_then(blob_refs_from);

    let synthesized = metadata.as_ref().and_then(merged_payload).map(|data| {
        let identifier = ids.next_blob_id();
        blob_refs
            .get_or_insert_with(Vec::new)
            .push(Value::String(identifier.clone()));
        json!({"name": name, "data": data, "identifier": identifier})
    });

    let measurement = json!({
        "identifier": null,
        "value": old.get("value").cloned().unwrap_or(Value::Null),
        "metric": name,
        "unit": unit,
        "blob_refs": blob_refs,
    });
    Ok((measurement, synthesized))
}

fn decode_metadata(value: &Value) -> Option<Map<String, Value>> {
    match decode_embedded(value, "measurement metadata")? {
        Value::Object(fields) => Some(fields),
        Value::Null => None,
        other => {
            debug!("Ignoring non-object measurement metadata: {other}");
            None
        }
    }
}

fn metadata_str<'a>(metadata: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a str> {
    metadata?
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn blob_refs_from(metadata: &Map<String, Value>) -> Option<Vec<Value>> {
    let Some(Value::Object(blobs)) = metadata.get("blobs") else {
        return None;
    };
    Some(
        blobs
            .values()
            .filter_map(Value::as_str)
            .map(|id| Value::String(id.to_string()))
            .collect(),
    )
}

// `parameters` wins over `extras` on key clashes; non-object payloads keep their own key.
fn merged_payload(metadata: &Map<String, Value>) -> Option<Value> {
    let mut merged = Map::new();
    for key in ["extras", "parameters"] {
        match metadata.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Object(fields)) => {
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                merged.insert(key.to_string(), other.clone());
            }
        }
    }
    (!merged.is_empty()).then_some(Value::Object(merged))
}

fn job_blobs(old: &Value, job_number: u64) -> Vec<Value> {
    match old.get("blobs") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(text)) => match decode_text(text, "job blobs") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                warn!("Job {job_number}: decoded blobs are not a list; dropping them");
                Vec::new()
            }
        },
        Some(_) => {
            warn!("Job {job_number}: blobs are neither a list nor a string; dropping them");
            Vec::new()
        }
    }
}

fn env_for(old: &Value) -> Value {
    let mut env: Map<String, Value> = ENV_FIELDS
        .iter()
        .map(|field| {
            (
                field.to_string(),
                old.get(*field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect();
    env.insert("env_name".to_string(), Value::from(ENV_NAME));
    Value::Object(env)
}

fn packages_for(old: &Value, job_number: u64) -> Value {
    let mut packages = Map::new();
    let Some(items) = old.get("packages").and_then(Value::as_array) else {
        return Value::Object(packages);
    };
    for item in items {
        let Some(fields) = item.as_object() else {
            warn!("Job {job_number}: skipping package that is not an object");
            continue;
        };
        let Some(name) = fields.get("name").and_then(Value::as_str) else {
            warn!("Job {job_number}: skipping package without a name");
            continue;
        };
        let package: Map<String, Value> = fields
            .iter()
            .map(|(key, value)| (renamed_package_field(key).to_string(), value.clone()))
            .collect();
        if packages
            .insert(name.to_string(), Value::Object(package))
            .is_some()
        {
            debug!("Job {job_number}: package '{name}' listed twice; keeping the later entry");
        }
    }
    Value::Object(packages)
}

fn renamed_package_field(key: &str) -> &str {
    match key {
        "build_version" => "eups_version",
        "git_commit" => "git_sha",
        other => other,
    }
}
