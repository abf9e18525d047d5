use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::MendError;

pub const KIB: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Wav,
    Mp3,
}

impl ResourceKind {
    pub fn extension(self) -> &'static str {
        match self {
            ResourceKind::Pdf => "pdf",
            ResourceKind::Wav => "wav",
            ResourceKind::Mp3 => "mp3",
        }
    }

    /// Anything smaller than this is an error page or a stub, never the real file.
    pub fn min_valid_size(self) -> u64 {
        match self {
            ResourceKind::Pdf => 50 * KIB,
            ResourceKind::Wav | ResourceKind::Mp3 => KIB,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(ResourceKind::Pdf),
            "wav" => Some(ResourceKind::Wav),
            "mp3" => Some(ResourceKind::Mp3),
            _ => None,
        }
    }

    /// Infers the kind from the extension of the last path segment, ignoring
    /// the query string.
    pub fn from_url(url: &Url) -> Option<Self> {
        let segment = url.path_segments()?.last()?;
        let (_, ext) = segment.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ResourceKind {
    type Err = MendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_start_matches('.');
        Self::from_extension(trimmed).ok_or_else(|| MendError::InvalidKind(value.to_string()))
    }
}

/// One fetchable item. Built once by enumeration, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    url: Url,
    kind: ResourceKind,
}

impl Resource {
    /// `name` must already be sanitized; `url` must be absolute.
    pub fn new(name: String, url: Url, kind: ResourceKind) -> Self {
        Self { name, url, kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Missing,
    Corrupt,
    Partial,
    Valid,
}

impl TransferState {
    pub fn needs_repair(self) -> bool {
        !matches!(self, TransferState::Valid)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Missing => write!(f, "missing"),
            TransferState::Corrupt => write!(f, "corrupt"),
            TransferState::Partial => write!(f, "partial"),
            TransferState::Valid => write!(f, "valid"),
        }
    }
}
