use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::ResolvedConfig;
use crate::domain::TransferState;
use crate::error::TransferFailure;
use crate::http::{HttpTransport, Sleeper};
use crate::reconcile::{AuditReport, Reconciler, RepairSummary};
use crate::storage::Storage;
use crate::transfer::TransferManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Download everything that is not valid yet, in one pass.
    Fetch,
    /// Audit, report, then repair.
    Check,
    /// Audit only.
    Audit,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub root: Utf8PathBuf,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RepairSummary>,
}

impl RunReport {
    /// False when something is left to do: a failed transfer, or for an
    /// audit-only run any file that is not valid.
    pub fn is_clean(&self) -> bool {
        match self.mode {
            RunMode::Audit => self.audit.as_ref().is_none_or(AuditReport::all_valid),
            RunMode::Fetch | RunMode::Check => self.summary.is_none_or(|summary| summary.failed == 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// An item is about to be transferred.
    ItemStarted {
        index: usize,
        total: usize,
        label: String,
        state: TransferState,
    },
    /// An item was already valid on disk.
    Skipped {
        index: usize,
        total: usize,
        label: String,
        size: u64,
    },
    /// A corrupt file was deleted before its transfer.
    Discarded { label: String },
    /// A response was accepted and the body is being written.
    Started { resume_from: u64, total: Option<u64> },
    Progress { done: u64, total: u64 },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        bytes_on_disk: u64,
        wait: Duration,
        failure: TransferFailure,
    },
    Saved { bytes: u64 },
    Failed {
        attempts: u32,
        failure: TransferFailure,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    /// Called once with the audit, before any repair work starts.
    fn audit(&self, _report: &AuditReport) {}
}

pub struct App<T: HttpTransport, S: Storage, Z: Sleeper> {
    reconciler: Reconciler<T, S, Z>,
}

impl<T: HttpTransport, S: Storage, Z: Sleeper> App<T, S, Z> {
    pub fn new(reconciler: Reconciler<T, S, Z>) -> Self {
        Self { reconciler }
    }

    pub fn from_config(transport: T, storage: S, sleeper: Z, config: &ResolvedConfig) -> Self {
        let transfer = TransferManager::new(transport, storage, sleeper, config.transfer);
        Self::new(Reconciler::new(
            transfer,
            config.output_root.clone(),
            config.inter_item_delay,
        ))
    }

    pub fn run(&self, mode: RunMode, catalog: &Catalog, sink: &dyn ProgressSink) -> RunReport {
        let root = self.reconciler.root().to_path_buf();
        info!(?mode, root = %root, items = catalog.len(), "run started");

        let (audit, summary) = match mode {
            RunMode::Fetch => (None, Some(self.reconciler.fetch(catalog, sink))),
            RunMode::Check => {
                let (report, summary) = self.reconciler.audit_and_repair(catalog, sink);
                (Some(report), Some(summary))
            }
            RunMode::Audit => {
                let report = self.reconciler.audit(catalog);
                sink.audit(&report);
                (Some(report), None)
            }
        };

        RunReport {
            mode,
            root,
            generated_at: Utc::now(),
            audit,
            summary,
        }
    }
}
