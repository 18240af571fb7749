//! Pipeline stages and their per-item outcome counts.

use std::fmt;
use std::str::FromStr;

/// One step of the migration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 3] = [Stage::Extract, Stage::Transform, Stage::Load];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "extract" => Ok(Self::Extract),
            "transform" => Ok(Self::Transform),
            "load" => Ok(Self::Load),
            other => Err(format!("Unknown stage '{other}'")),
        }
    }
}

/// Per-item outcome counts for one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Items processed and written or sent.
    pub succeeded: usize,
    /// Items already done by an earlier run.
    pub skipped: usize,
    /// Items that failed and were passed over.
    pub failed: usize,
    /// The stage could not start at all.
    pub aborted: bool,
}

impl StageReport {
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.aborted || self.failed > 0
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.aborted {
            return f.write_str("aborted");
        }
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}
