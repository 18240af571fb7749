//! Run the selected stages in pipeline order and collect their reports.

use std::fmt;

use tracing::{error, info};

use crate::auth;
use crate::catalog::MetricCatalog;
use crate::config::Settings;
use crate::extract::run_extract;
use crate::http_client::ApiClient;
use crate::load::run_load;
use crate::stage::{Stage, StageReport};
use crate::transform::{BlobIdSource, RandomBlobIds, run_transform};

/// Per-stage outcome of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub reports: Vec<(Stage, StageReport)>,
}

impl MigrationSummary {
    pub fn report_for(&self, stage: Stage) -> Option<&StageReport> {
        self.reports
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, report)| report)
    }

    /// True when any stage aborted or any item failed.
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|(_, report)| report.has_failures())
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (stage, report) in &self.reports {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{stage}: {report}")?;
        }
        Ok(())
    }
}

/// Drives extract, transform and load for one set of settings.
#[derive(Debug)]
pub struct Migrator {
    settings: Settings,
}

impl Migrator {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run with random blob identifiers.
    pub fn run(&self) -> MigrationSummary {
        self.run_with_ids(&mut RandomBlobIds)
    }

    /// Run with the given blob identifier source.
    pub fn run_with_ids(&self, ids: &mut dyn BlobIdSource) -> MigrationSummary {
        let settings = &self.settings;
        let source = ApiClient::new(&settings.source_url, settings.retry);
        let mut summary = MigrationSummary::default();
        for stage in Stage::ALL {
            if !settings.stages.contains(&stage) {
                continue;
            }
            info!("Starting {stage} stage.");
            let report = match stage {
                Stage::Extract => run_extract(&source, &settings.jobs, &settings.jobs_dir()),
                Stage::Transform => self.transform(&source, ids),
                Stage::Load => self.load(),
            };
            info!("Finished {stage} stage: {report}");
            summary.reports.push((stage, report));
        }
        summary
    }

    fn transform(&self, source: &ApiClient, ids: &mut dyn BlobIdSource) -> StageReport {
        let settings = &self.settings;
        let catalog = match MetricCatalog::load_or_fetch(source, &settings.data_dir) {
            Ok(catalog) => catalog,
            Err(err) => {
                error!("Cannot build the metric catalog: {err}");
                return StageReport::aborted();
            }
        };
        run_transform(
            &settings.jobs,
            &settings.jobs_dir(),
            &settings.transformed_dir(),
            &catalog,
            ids,
        )
    }

    fn load(&self) -> StageReport {
        let settings = &self.settings;
        let mut dest = ApiClient::new(&settings.dest_url, settings.retry);
        let credential = auth::resolve_credential(
            &dest,
            settings.username.as_deref(),
            settings.password.as_deref(),
            settings.token.as_deref(),
            &settings.auth_scheme,
        );
        if let Some(credential) = credential {
            dest = dest.with_authorization(credential.header_value());
        }
        run_load(
            &dest,
            &settings.jobs,
            &settings.transformed_dir(),
            &settings.job_map_path(),
        )
    }
}
