//! Run settings from command-line flags, `JOBPORT_` environment variables and
//! an optional TOML file.
//!
//! Precedence, highest first: command line, environment, config file, built-in
//! defaults. The config file path itself comes from the command line or the
//! environment only.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::Level;
use url::Url;

use crate::auth::DEFAULT_AUTH_SCHEME;
use crate::http_client::RetryConfig;
use crate::job_store::{JOBS_DIR, TRANSFORMED_DIR};
use crate::load::JOB_MAP_FILE;
use crate::selection::{JobSelection, SelectionError};
use crate::stage::Stage;

/// Prefix for environment overrides, e.g. `JOBPORT_DATA_DIR`.
pub const ENV_PREFIX: &str = "JOBPORT_";

pub const DEFAULT_DATA_DIR: &str = "./migration_data";
pub const DEFAULT_SOURCE_URL: &str = "http://localhost:8000";
pub const DEFAULT_DEST_URL: &str = "http://localhost:5000";
const LOGS_DIR: &str = "logs";

/// Errors that may occur while assembling settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An argument that no flag recognizes.
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
    /// A flag given as the last argument with no value.
    #[error("{flag} requires a value")]
    MissingValue { flag: String },
    /// A value that does not parse for its setting.
    #[error("Invalid {key} value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// A source or destination URL that is not an absolute http(s) URL.
    #[error("Invalid {key} '{value}': {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the config file.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// What the command line asked for.
#[derive(Debug)]
pub enum Command {
    Run(Settings),
    Help,
}

/// Fully resolved settings for one run.
#[derive(Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub auth_scheme: String,
    pub log_level: Level,
    pub source_url: String,
    pub dest_url: String,
    pub jobs: JobSelection,
    /// Stages to run, deduplicated and in pipeline order.
    pub stages: Vec<Stage>,
    pub retry: RetryConfig,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("data_dir", &self.data_dir)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("token", &redacted(&self.token))
            .field("auth_scheme", &self.auth_scheme)
            .field("log_level", &self.log_level)
            .field("source_url", &self.source_url)
            .field("dest_url", &self.dest_url)
            .field("jobs", &self.jobs)
            .field("stages", &self.stages)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Settings {
    /// Defaults for everything except the data directory and the two endpoints.
    pub fn new(data_dir: impl Into<PathBuf>, source_url: &str, dest_url: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            username: None,
            password: None,
            token: None,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            log_level: Level::INFO,
            source_url: source_url.to_string(),
            dest_url: dest_url.to_string(),
            jobs: JobSelection::All,
            stages: Stage::ALL.to_vec(),
            retry: RetryConfig::default(),
        }
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join(JOBS_DIR)
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.data_dir.join(TRANSFORMED_DIR)
    }

    pub fn job_map_path(&self) -> PathBuf {
        self.data_dir.join(JOB_MAP_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR)
    }
}

struct Flag {
    key: &'static str,
    names: &'static [&'static str],
}

const FLAGS: &[Flag] = &[
    Flag {
        key: "data_dir",
        names: &["-d", "--data-dir", "--directory"],
    },
    Flag {
        key: "username",
        names: &["-n", "--username", "--user"],
    },
    Flag {
        key: "password",
        names: &["-p", "--password", "--pass", "--pw"],
    },
    Flag {
        key: "token",
        names: &["-t", "--token"],
    },
    Flag {
        key: "auth_scheme",
        names: &["--auth-scheme"],
    },
    Flag {
        key: "log_level",
        names: &["-l", "--log-level", "--loglevel"],
    },
    Flag {
        key: "source_url",
        names: &["-s", "--source-url", "--from-url"],
    },
    Flag {
        key: "dest_url",
        names: &["-u", "--dest-url", "--to-url"],
    },
    Flag {
        key: "jobs",
        names: &["-j", "--jobs"],
    },
    Flag {
        key: "stages",
        names: &["--stages"],
    },
    Flag {
        key: "retry_attempts",
        names: &["--retry-attempts"],
    },
    Flag {
        key: "config",
        names: &["-c", "--config"],
    },
];

type Layer = BTreeMap<&'static str, String>;

/// Keys accepted in the TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<String>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    auth_scheme: Option<String>,
    log_level: Option<String>,
    source_url: Option<String>,
    dest_url: Option<String>,
    jobs: Option<String>,
    stages: Option<String>,
    retry_attempts: Option<u32>,
}

impl FileConfig {
    fn into_layer(self) -> Layer {
        let entries = [
            ("data_dir", self.data_dir),
            ("username", self.username),
            ("password", self.password),
            ("token", self.token),
            ("auth_scheme", self.auth_scheme),
            ("log_level", self.log_level),
            ("source_url", self.source_url),
            ("dest_url", self.dest_url),
            ("jobs", self.jobs),
            ("stages", self.stages),
            ("retry_attempts", self.retry_attempts.map(|n| n.to_string())),
        ];
        entries
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect()
    }
}

/// Resolve settings from the running process's arguments and environment.
pub fn from_process() -> Result<Command, ConfigError> {
    load(std::env::args().skip(1), |name| std::env::var(name).ok())
}

/// Resolve settings from `args` (program name excluded) and an env lookup.
pub fn load<I, S, F>(args: I, env: F) -> Result<Command, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(&str) -> Option<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let Some(cli) = parse_args(&args)? else {
        return Ok(Command::Help);
    };
    let env = env_layer(env);
    let mut merged = match cli.get("config").or_else(|| env.get("config")) {
        Some(path) => read_config_file(Path::new(path))?,
        None => Layer::new(),
    };
    merged.extend(env);
    merged.extend(cli);
    build_settings(&merged).map(Command::Run)
}

fn parse_args(args: &[String]) -> Result<Option<Layer>, ConfigError> {
    let mut layer = Layer::new();
    let mut idx = 0usize;
    while idx < args.len() {
        let arg = args[idx].as_str();
        if arg == "-h" || arg == "--help" {
            return Ok(None);
        }
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value)),
            _ => (arg, None),
        };
        let key = flag_key(name).ok_or_else(|| ConfigError::UnknownArgument(arg.to_string()))?;
        let value = match inline {
            Some(value) => value.to_string(),
            None => value_after(args, &mut idx, name)?.to_string(),
        };
        layer.insert(key, value);
        idx += 1;
    }
    Ok(Some(layer))
}

fn flag_key(name: &str) -> Option<&'static str> {
    FLAGS
        .iter()
        .find(|flag| flag.names.contains(&name))
        .map(|flag| flag.key)
}

fn value_after<'a>(
    args: &'a [String],
    idx: &mut usize,
    flag: &str,
) -> Result<&'a str, ConfigError> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue {
            flag: flag.to_string(),
        })
}

fn env_layer(env: impl Fn(&str) -> Option<String>) -> Layer {
    FLAGS
        .iter()
        .filter_map(|flag| {
            let name = format!("{ENV_PREFIX}{}", flag.key.to_ascii_uppercase());
            env(&name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (flag.key, value))
        })
        .collect()
}

fn read_config_file(path: &Path) -> Result<Layer, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.into_layer())
}

fn build_settings(layer: &Layer) -> Result<Settings, ConfigError> {
    let text = |key: &str| {
        layer
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    };
    let source_url = validate_url("source_url", text("source_url").unwrap_or(DEFAULT_SOURCE_URL))?;
    let dest_url = validate_url("dest_url", text("dest_url").unwrap_or(DEFAULT_DEST_URL))?;
    let mut settings = Settings::new(
        text("data_dir").unwrap_or(DEFAULT_DATA_DIR),
        &source_url,
        &dest_url,
    );
    settings.username = text("username").map(str::to_string);
    settings.password = layer.get("password").filter(|value| !value.is_empty()).cloned();
    settings.token = text("token").map(str::to_string);
    if let Some(scheme) = text("auth_scheme") {
        settings.auth_scheme = scheme.to_string();
    }
    if let Some(level) = text("log_level") {
        settings.log_level = parse_log_level(level)?;
    }
    if let Some(jobs) = text("jobs") {
        settings.jobs = jobs.parse()?;
    }
    if let Some(stages) = text("stages") {
        settings.stages = parse_stages(stages)?;
    }
    if let Some(attempts) = text("retry_attempts") {
        settings.retry.max_attempts = parse_attempts(attempts)?;
    }
    Ok(settings)
}

fn validate_url(key: &'static str, value: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Map a level name to a tracing level; `critical` is treated as `error`.
pub fn parse_log_level(text: &str) -> Result<Level, ConfigError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "critical" | "error" => Ok(Level::ERROR),
        "warning" | "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(ConfigError::InvalidValue {
            key: "log_level",
            value: text.to_string(),
            reason: "expected critical, error, warning, info, debug or trace".to_string(),
        }),
    }
}

fn parse_stages(text: &str) -> Result<Vec<Stage>, ConfigError> {
    let mut stages = text
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<Stage>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| ConfigError::InvalidValue {
            key: "stages",
            value: text.to_string(),
            reason,
        })?;
    if stages.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "stages",
            value: text.to_string(),
            reason: "no stage named".to_string(),
        });
    }
    stages.sort();
    stages.dedup();
    Ok(stages)
}

fn parse_attempts(text: &str) -> Result<usize, ConfigError> {
    match text.parse::<usize>() {
        Ok(attempts) if attempts > 0 => Ok(attempts),
        _ => Err(ConfigError::InvalidValue {
            key: "retry_attempts",
            value: text.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}

/// Usage text for `--help`.
pub fn help_text() -> &'static str {
    "Usage: jobport [options]\n\n\
Migrate jobs from a source API to a destination API.\n\n\
Options (each also settable as JOBPORT_<NAME>, e.g. JOBPORT_DATA_DIR):\n\
  -d, --data-dir <path>      Working directory for job files (default: ./migration_data)\n\
  -n, --username <name>      Destination username\n\
  -p, --password <pw>        Destination password\n\
  -t, --token <token>        Destination token; wins over username/password\n\
      --auth-scheme <name>   Authorization header scheme (default: JWT)\n\
  -l, --log-level <level>    critical, error, warning, info, debug or trace (default: info)\n\
  -s, --source-url <url>     Source API base URL (default: http://localhost:8000)\n\
  -u, --dest-url <url>       Destination API base URL (default: http://localhost:5000)\n\
  -j, --jobs <list>          Job numbers and ranges, e.g. 3,5-8 (default: all)\n\
      --stages <list>        Stages to run (default: extract,transform,load)\n\
      --retry-attempts <n>   Attempts per request on connection errors (default: 8)\n\
  -c, --config <path>        TOML file with any of the settings above\n\
  -h, --help                 Show this help\n"
}
