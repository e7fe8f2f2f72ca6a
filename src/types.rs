use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::LfndbError;

/// Upload state of a tracked file, persisted as the uppercase wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    #[default]
    NotUploaded,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::NotUploaded => "NOTUPLOADED",
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = LfndbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOTUPLOADED" => Ok(UploadStatus::NotUploaded),
            "UPLOADED" => Ok(UploadStatus::Uploaded),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(LfndbError::Decode(format!(
                "unknown upload status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockStatus {
    #[default]
    Open,
    Closed,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockStatus::Open => "OPEN",
            BlockStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for BlockStatus {
    type Err = LfndbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(BlockStatus::Open),
            "CLOSED" => Ok(BlockStatus::Closed),
            other => Err(LfndbError::Decode(format!(
                "unknown block status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a produced file: the application tuple that identifies one
/// configuration of the producing job. Two files produced by the same tuple
/// share one algorithm row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Algorithm {
    pub app_name: String,
    pub app_ver: String,
    pub app_fam: String,
    pub pset_hash: String,
    pub config_content: Option<String>,
}

impl Algorithm {
    pub fn new(
        app_name: impl Into<String>,
        app_ver: impl Into<String>,
        app_fam: impl Into<String>,
        pset_hash: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_ver: app_ver.into(),
            app_fam: app_fam.into(),
            pset_hash: pset_hash.into(),
            config_content: None,
        }
    }

    pub fn with_config(mut self, content: impl Into<String>) -> Self {
        self.config_content = Some(content.into());
        self
    }

    /// Hex SHA-256 of raw configuration content, for producers that hand
    /// over configuration without a precomputed hash.
    pub fn hash_config(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The (id, LFN) identity pair of one tracked file, as returned by the
/// upload-discovery queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIdent {
    pub id: i64,
    pub lfn: String,
}

/// A named upload unit grouping files bound for the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub name: String,
    pub status: BlockStatus,
    pub created_at: i64,
    pub locations: BTreeSet<String>,
}
