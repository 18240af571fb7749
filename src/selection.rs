//! Job-number selection: every job present on disk, or an explicit set.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use crate::job_store::{self, StoreError};

/// Widest range a selector may expand to.
const MAX_RANGE_SPAN: u64 = 1_000_000;

/// Which jobs a stage operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JobSelection {
    /// Every job the stage can find.
    #[default]
    All,
    /// Exactly these job numbers.
    Only(BTreeSet<u64>),
}

/// Invalid job selector text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Invalid job number `{0}`")]
    InvalidNumber(String),
    #[error("Range `{0}` ends before it starts")]
    ReversedRange(String),
    #[error("Range `{0}` spans more than {MAX_RANGE_SPAN} jobs")]
    RangeTooLarge(String),
}

impl JobSelection {
    /// Job numbers to process, listing `dir` when every job is selected.
    pub fn resolve(&self, dir: &Path) -> Result<Vec<u64>, StoreError> {
        match self {
            Self::All => job_store::list_jobs(dir),
            Self::Only(numbers) => Ok(numbers.iter().copied().collect()),
        }
    }
}

impl FromStr for JobSelection {
    type Err = SelectionError;

    /// Parse `3,5-8` style selectors; ranges are inclusive and blank input selects all.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut numbers = BTreeSet::new();
        for part in text.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_number(start)?;
                    let end = parse_number(end)?;
                    if end < start {
                        return Err(SelectionError::ReversedRange(part.to_string()));
                    }
                    if end - start >= MAX_RANGE_SPAN {
                        return Err(SelectionError::RangeTooLarge(part.to_string()));
                    }
                    numbers.extend(start..=end);
                }
                None => {
                    numbers.insert(parse_number(part)?);
                }
            }
        }
        if numbers.is_empty() {
            Ok(Self::All)
        } else {
            Ok(Self::Only(numbers))
        }
    }
}

fn parse_number(text: &str) -> Result<u64, SelectionError> {
    let text = text.trim();
    text.parse()
        .map_err(|_| SelectionError::InvalidNumber(text.to_string()))
}
