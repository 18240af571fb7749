//! Command-line entry point for a migration run.

use std::process::ExitCode;

use jobport::config::{self, Command};
use jobport::logging;
use jobport::migrate::Migrator;

const EXIT_CONFIG: u8 = 1;
const EXIT_FAILURES: u8 = 2;

fn main() -> ExitCode {
    let settings = match config::from_process() {
        Ok(Command::Run(settings)) => settings,
        Ok(Command::Help) => {
            println!("{}", config::help_text());
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{err}\n\n{}", config::help_text());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(err) = logging::init(&settings.log_dir(), settings.log_level) {
        logging::init_stderr(settings.log_level);
        tracing::warn!("Log file disabled: {err}");
    }
    tracing::debug!("Settings: {settings:?}");

    let summary = Migrator::new(settings).run();
    tracing::info!("Migration finished: {summary}");
    if summary.has_failures() {
        ExitCode::from(EXIT_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}
