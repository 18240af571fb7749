//! Metric Catalog: physical units per metric and canonical metric names.
//!
//! Units come from the source API's paginated `/metrics/` listing and are
//! keyed by the old metric name. Canonical names come from a closed static
//! table keyed by `(metric, spec, filter)`; a triple missing from the table
//! is an error, never a guess.

mod canonical;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http_client::{ApiClient, HttpError};
use crate::job_store::{self, StoreError, WriteOutcome};
use canonical::CANONICAL_NAMES;

/// Cached unit table inside the data directory.
pub const METRIC_CACHE_FILE: &str = "metrics.json";

/// Errors raised while building or querying the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The `(metric, spec, filter)` triple is not in the canonical table.
    #[error(
        "Metric not recognized: metric={metric} spec={spec:?} filter={filter:?} (would have been `{fallback}`)"
    )]
    UnknownMetric {
        metric: String,
        spec: Option<String>,
        filter: Option<String>,
        fallback: String,
    },
    /// The metric listing could not be fetched.
    #[error("Failed to fetch metric listing: {0}")]
    Fetch(#[from] HttpError),
    /// A listing page did not have the expected shape.
    #[error("Malformed metric listing from {url}: {message}")]
    Listing { url: String, message: String },
    /// The unit cache could not be read or written.
    #[error("Metric unit cache: {0}")]
    Cache(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct MetricPage {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<String>,
    results: Vec<MetricUnit>,
}

#[derive(Debug, Deserialize)]
struct MetricUnit {
    metric: String,
    #[serde(default)]
    unit: Option<String>,
}

/// Read-only lookup tables used by the transformer.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    units: BTreeMap<String, String>,
}

impl MetricCatalog {
    /// Build a catalog from `(metric, unit)` pairs.
    pub fn from_units<I, K, V>(units: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            units: units
                .into_iter()
                .map(|(metric, unit)| (metric.into(), unit.into()))
                .collect(),
        }
    }

    /// Walk the paginated `/metrics/` listing of the source API.
    pub fn fetch(client: &ApiClient) -> Result<Self, CatalogError> {
        let mut units = BTreeMap::new();
        let mut next = Some(client.endpoint("metrics/"));
        while let Some(url) = next.take() {
            let page: MetricPage = serde_json::from_value(client.get_json(&url)?).map_err(|err| {
                CatalogError::Listing {
                    url: url.clone(),
                    message: err.to_string(),
                }
            })?;
            for MetricUnit { metric, unit } in page.results {
                match unit {
                    Some(unit) => {
                        units.insert(metric, unit);
                    }
                    None => debug!("Metric '{metric}' has no unit"),
                }
            }
            debug!("Metric unit map: {}/{}", units.len(), page.count.unwrap_or(0));
            next = page.next.filter(|link| !link.is_empty() && *link != url);
        }
        info!("Created metric unit map with {} metrics.", units.len());
        Ok(Self { units })
    }

    /// Reuse the unit table cached in `data_dir`, fetching and caching it when absent.
    pub fn load_or_fetch(client: &ApiClient, data_dir: &Path) -> Result<Self, CatalogError> {
        let path = data_dir.join(METRIC_CACHE_FILE);
        if path.is_file() {
            let catalog = Self::from_cache(&job_store::read_json(&path)?)?;
            info!(
                "Loaded {} metric units from '{}'.",
                catalog.units.len(),
                path.display()
            );
            return Ok(catalog);
        }
        let catalog = Self::fetch(client)?;
        let cache = Value::Object(
            catalog
                .units
                .iter()
                .map(|(metric, unit)| (metric.clone(), Value::String(unit.clone())))
                .collect(),
        );
        if job_store::write_json_new(&path, &cache)? == WriteOutcome::AlreadyPresent {
            warn!("Metric unit cache '{}' appeared during fetch.", path.display());
        }
        Ok(catalog)
    }

    fn from_cache(cache: &Value) -> Result<Self, CatalogError> {
        let Some(fields) = cache.as_object() else {
            return Err(CatalogError::Listing {
                url: METRIC_CACHE_FILE.to_string(),
                message: "cache is not an object".to_string(),
            });
        };
        Ok(Self::from_units(fields.iter().filter_map(|(metric, unit)| {
            unit.as_str().map(|unit| (metric.clone(), unit.to_string()))
        })))
    }

    /// Physical unit for an old metric name.
    pub fn unit_for(&self, metric: &str) -> Option<&str> {
        self.units.get(metric).map(String::as_str)
    }

    /// Number of metrics with a known unit.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Canonical new-schema name for `(metric, spec, filter)`.
    ///
    /// Blank spec and filter values count as absent.
    pub fn canonical_name_for(
        &self,
        metric: &str,
        spec: Option<&str>,
        filter: Option<&str>,
    ) -> Result<&'static str, CatalogError> {
        let spec = spec.filter(|spec| !spec.is_empty());
        let filter = filter.filter(|filter| !filter.is_empty());
        CANONICAL_NAMES
            .iter()
            .find(|entry| entry.metric == metric && entry.spec == spec && entry.filter == filter)
            .map(|entry| entry.name)
            .ok_or_else(|| CatalogError::UnknownMetric {
                metric: metric.to_string(),
                spec: spec.map(str::to_string),
                filter: filter.map(str::to_string),
                fallback: fallback_name(metric, spec, filter),
            })
    }
}

/// `metric[_spec][_filter]`, reported alongside unknown triples.
pub fn fallback_name(metric: &str, spec: Option<&str>, filter: Option<&str>) -> String {
    let mut name = metric.to_string();
    for part in [spec, filter].into_iter().flatten() {
        name.push('_');
        name.push_str(part);
    }
    name
}
