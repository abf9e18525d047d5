use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{Catalog, CatalogItem};
use crate::domain::{ResourceKind, TransferState};
use crate::http::{HttpTransport, Sleeper};
use crate::integrity::inspect;
use crate::storage::Storage;
use crate::transfer::{TransferManager, TransferOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    #[serde(skip)]
    item: CatalogItem,
    pub label: String,
    pub kind: ResourceKind,
    pub url: String,
    pub path: Utf8PathBuf,
    pub state: TransferState,
    pub size: Option<u64>,
}

impl AuditEntry {
    pub fn item(&self) -> &CatalogItem {
        &self.item
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub valid: usize,
    pub partial: usize,
    pub corrupt: usize,
    pub missing: usize,
}

impl StateCounts {
    fn add(&mut self, state: TransferState) {
        match state {
            TransferState::Valid => self.valid += 1,
            TransferState::Partial => self.partial += 1,
            TransferState::Corrupt => self.corrupt += 1,
            TransferState::Missing => self.missing += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.valid + self.needs_repair()
    }

    pub fn needs_repair(&self) -> usize {
        self.partial + self.corrupt + self.missing
    }
}

/// Per-item state of a catalog against the disk, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub root: Utf8PathBuf,
    pub entries: Vec<AuditEntry>,
    pub counts: StateCounts,
}

impl AuditReport {
    pub fn all_valid(&self) -> bool {
        self.counts.needs_repair() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub already_valid: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RepairSummary {
    fn record(&mut self, outcome: &TransferOutcome) {
        if outcome.is_saved() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Brings the files under `root` in line with a catalog.
///
/// The disk is the only state: every decision starts from
/// [`inspect`] on the destination path, so rerunning after an interruption
/// picks up exactly where the last run stopped.
pub struct Reconciler<T: HttpTransport, S: Storage, Z: Sleeper> {
    transfer: TransferManager<T, S, Z>,
    root: Utf8PathBuf,
    inter_item_delay: Duration,
}

impl<T: HttpTransport, S: Storage, Z: Sleeper> Reconciler<T, S, Z> {
    pub fn new(
        transfer: TransferManager<T, S, Z>,
        root: impl Into<Utf8PathBuf>,
        inter_item_delay: Duration,
    ) -> Self {
        Self {
            transfer,
            root: root.into(),
            inter_item_delay,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Classifies every item. Touches the disk only.
    pub fn audit(&self, catalog: &Catalog) -> AuditReport {
        let mut counts = StateCounts::default();
        let entries = catalog
            .iter()
            .map(|item| {
                let path = item.destination(&self.root);
                let resource = item.resource();
                let inspection = inspect(self.transfer.storage(), &path, resource.kind());
                counts.add(inspection.state);
                debug!(path = %path, state = %inspection.state, "audited");
                AuditEntry {
                    item: item.clone(),
                    label: item.label(),
                    kind: resource.kind(),
                    url: resource.url().to_string(),
                    path,
                    state: inspection.state,
                    size: inspection.size,
                }
            })
            .collect();

        info!(
            valid = counts.valid,
            partial = counts.partial,
            corrupt = counts.corrupt,
            missing = counts.missing,
            "audit finished"
        );
        AuditReport {
            root: self.root.clone(),
            entries,
            counts,
        }
    }

    pub fn repair(&self, report: &AuditReport, sink: &dyn ProgressSink) -> RepairSummary {
        let mut summary = RepairSummary {
            already_valid: report.counts.valid,
            ..RepairSummary::default()
        };
        if report.all_valid() {
            info!("all files valid, nothing to repair");
            return summary;
        }

        for entry in report
            .entries
            .iter()
            .filter(|entry| entry.state == TransferState::Corrupt)
        {
            self.discard(&entry.path, &entry.label, sink);
        }

        let pending = report
            .entries
            .iter()
            .filter(|entry| entry.state.needs_repair())
            .collect::<Vec<_>>();
        let total = pending.len();
        for (index, entry) in pending.into_iter().enumerate() {
            if index > 0 {
                self.pause();
            }
            sink.event(ProgressEvent::ItemStarted {
                index: index + 1,
                total,
                label: entry.label.clone(),
                state: entry.state,
            });
            let outcome = self.download(entry.item(), &entry.path, sink);
            summary.record(&outcome);
        }

        self.log_summary(&summary);
        summary
    }

    /// Audit, hand the report to the sink, then repair from it.
    pub fn audit_and_repair(
        &self,
        catalog: &Catalog,
        sink: &dyn ProgressSink,
    ) -> (AuditReport, RepairSummary) {
        let report = self.audit(catalog);
        sink.audit(&report);
        let summary = self.repair(&report, sink);
        (report, summary)
    }

    /// Single pass in catalog order: skip what is valid, fix the rest.
    pub fn fetch(&self, catalog: &Catalog, sink: &dyn ProgressSink) -> RepairSummary {
        let mut summary = RepairSummary::default();
        let total = catalog.len();
        let mut downloaded_any = false;

        for (index, item) in catalog.iter().enumerate() {
            let path = item.destination(&self.root);
            let inspection = inspect(self.transfer.storage(), &path, item.resource().kind());
            let label = item.label();

            if inspection.state == TransferState::Valid {
                debug!(path = %path, "already valid, skipping");
                sink.event(ProgressEvent::Skipped {
                    index: index + 1,
                    total,
                    label,
                    size: inspection.size.unwrap_or(0),
                });
                summary.already_valid += 1;
                continue;
            }

            if downloaded_any {
                self.pause();
            }
            if inspection.state == TransferState::Corrupt {
                self.discard(&path, &label, sink);
            }
            sink.event(ProgressEvent::ItemStarted {
                index: index + 1,
                total,
                label,
                state: inspection.state,
            });
            let outcome = self.download(item, &path, sink);
            summary.record(&outcome);
            downloaded_any = true;
        }

        self.log_summary(&summary);
        summary
    }

    fn download(
        &self,
        item: &CatalogItem,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> TransferOutcome {
        let resource = item.resource();
        self.transfer
            .download(resource.url(), path, resource.kind(), sink)
    }

    fn discard(&self, path: &Utf8Path, label: &str, sink: &dyn ProgressSink) {
        match self.transfer.storage().remove(path) {
            Ok(()) => {
                debug!(path = %path, "removed corrupt file");
                sink.event(ProgressEvent::Discarded {
                    label: label.to_string(),
                });
            }
            Err(err) => warn!(path = %path, "could not remove corrupt file: {err}"),
        }
    }

    fn pause(&self) {
        self.transfer.sleeper().sleep(self.inter_item_delay);
    }

    fn log_summary(&self, summary: &RepairSummary) {
        info!(
            already_valid = summary.already_valid,
            succeeded = summary.succeeded,
            failed = summary.failed,
            root = %self.root,
            "run finished"
        );
    }
}
