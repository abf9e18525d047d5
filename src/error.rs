use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MendError {
    #[error("missing config file fetchmend.json in current directory")]
    #[diagnostic(help("pass --config <path> or create fetchmend.json"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("invalid resource url: {0}")]
    InvalidUrl(String),

    #[error("cannot infer resource kind from url: {0}")]
    #[diagnostic(help("set \"kind\" to pdf, wav or mp3 for this resource"))]
    UnknownKind(String),

    #[error("invalid resource kind: {0}")]
    InvalidKind(String),

    #[error("no resources to process")]
    #[diagnostic(help("check the resource list and any --kind / --only filters"))]
    EmptyCatalog,

    #[error("http client error: {0}")]
    Http(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Why a single transfer attempt failed.
///
/// These never abort a run: the transfer loop retries them, and only the last
/// one is reported back for the item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned status {status}")]
    HttpStatus { status: u16 },

    #[error("downloaded only {bytes} bytes (minimum {minimum}), likely not the real file")]
    TooSmall { bytes: u64, minimum: u64 },

    #[error("local storage error: {0}")]
    Storage(String),
}

impl TransferFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferFailure::NetworkTimeout(_) => "network_timeout",
            TransferFailure::Network(_) => "network",
            TransferFailure::HttpStatus { .. } => "http_status",
            TransferFailure::TooSmall { .. } => "too_small",
            TransferFailure::Storage(_) => "storage",
        }
    }
}
