//! Identifier sources for synthesized blobs.

use uuid::Uuid;

/// Hands out a fresh identifier for every synthesized blob.
pub trait BlobIdSource {
    fn next_blob_id(&mut self) -> String;
}

/// Random UUID v4 identifiers; used for real runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBlobIds;

impl BlobIdSource for RandomBlobIds {
    fn next_blob_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix><n>` identifiers for reproducible output.
#[derive(Debug, Default, Clone)]
pub struct SequentialBlobIds {
    prefix: String,
    issued: u64,
}

impl SequentialBlobIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: 0,
        }
    }
}

impl BlobIdSource for SequentialBlobIds {
    fn next_blob_id(&mut self) -> String {
        self.issued += 1;
        format!("{}{:06}", self.prefix, self.issued)
    }
}
