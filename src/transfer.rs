use std::io::{self, Read, Write};
use std::time::Duration;

use camino::Utf8Path;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::ResourceKind;
use crate::error::TransferFailure;
use crate::http::{HttpResponse, HttpTransport, Sleeper, classify_read_error};
use crate::storage::Storage;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(5);
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

const STATUS_OK: u16 = 200;
const STATUS_PARTIAL_CONTENT: u16 = 206;
const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Total attempts per resource, including the first one.
    pub max_retries: u32,
    /// Attempt `n` that fails waits `n * backoff_step` before the next one.
    pub backoff_step: Duration,
    pub chunk_size: usize,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_step: DEFAULT_BACKOFF_STEP,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TransferOutcome {
    Saved {
        bytes: u64,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        #[serde(serialize_with = "serialize_failure")]
        last_failure: TransferFailure,
        /// Left on disk for the next run to resume.
        bytes_on_disk: u64,
    },
}

impl TransferOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, TransferOutcome::Saved { .. })
    }
}

fn serialize_failure<S: serde::Serializer>(
    failure: &TransferFailure,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&failure.to_string())
}

/// Downloads one resource at a time, resuming from whatever is already on
/// disk and retrying with linear backoff.
pub struct TransferManager<T: HttpTransport, S: Storage, Z: Sleeper> {
    transport: T,
    storage: S,
    sleeper: Z,
    policy: TransferPolicy,
}

impl<T: HttpTransport, S: Storage, Z: Sleeper> TransferManager<T, S, Z> {
    pub fn new(transport: T, storage: S, sleeper: Z, policy: TransferPolicy) -> Self {
        Self {
            transport,
            storage,
            sleeper,
            policy,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    pub fn download(
        &self,
        url: &Url,
        dest: &Utf8Path,
        kind: ResourceKind,
        sink: &dyn ProgressSink,
    ) -> TransferOutcome {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 1;
        loop {
            let failure = match self.attempt(url, dest, kind, sink) {
                Ok(bytes) => {
                    info!(%url, path = %dest, bytes, attempt, "saved");
                    sink.event(ProgressEvent::Saved { bytes });
                    return TransferOutcome::Saved {
                        bytes,
                        attempts: attempt,
                    };
                }
                Err(failure) => failure,
            };

            if attempt >= max_attempts {
                return self.give_up(url, dest, attempt, failure, sink);
            }

            let bytes_on_disk = self.bytes_on_disk(dest);
            let wait = self.policy.backoff_step * attempt;
            warn!(
                %url,
                attempt,
                max_attempts,
                bytes_on_disk,
                wait_secs = wait.as_secs_f64(),
                reason = failure.kind(),
                "attempt failed: {failure}"
            );
            sink.event(ProgressEvent::Retrying {
                attempt,
                max_attempts,
                bytes_on_disk,
                wait,
                failure,
            });
            self.sleeper.sleep(wait);
            attempt += 1;
        }
    }

    fn give_up(
        &self,
        url: &Url,
        dest: &Utf8Path,
        attempts: u32,
        failure: TransferFailure,
        sink: &dyn ProgressSink,
    ) -> TransferOutcome {
        let bytes_on_disk = self.bytes_on_disk(dest);
        if bytes_on_disk == 0 && matches!(self.storage.stat(dest), Ok(Some(_))) {
            if let Err(err) = self.storage.remove(dest) {
                warn!(path = %dest, "could not remove empty stub: {err}");
            }
        }
        error!(%url, attempts, bytes_on_disk, "giving up: {failure}");
        sink.event(ProgressEvent::Failed {
            attempts,
            failure: failure.clone(),
        });
        TransferOutcome::Failed {
            attempts,
            last_failure: failure,
            bytes_on_disk,
        }
    }

    fn bytes_on_disk(&self, dest: &Utf8Path) -> u64 {
        self.storage.stat(dest).ok().flatten().unwrap_or(0)
    }

    /// One request-and-stream cycle. Returns the final file size.
    fn attempt(
        &self,
        url: &Url,
        dest: &Utf8Path,
        kind: ResourceKind,
        sink: &dyn ProgressSink,
    ) -> Result<u64, TransferFailure> {
        let mut resume_from = self.storage.stat(dest).map_err(storage_failure)?.unwrap_or(0);
        let mut range = (resume_from > 0).then_some(resume_from);
        if let Some(from) = range {
            debug!(%url, from, "resuming with range request");
        }

        let mut response = self.transport.get(url, range)?;
        if response.status == STATUS_RANGE_NOT_SATISFIABLE {
            debug!(%url, resume_from, "range rejected, restarting from zero");
            resume_from = 0;
            range = None;
            response = self.transport.get(url, None)?;
        }

        // A 206 only counts as a continuation when we actually asked for a range.
        let append = match response.status {
            STATUS_PARTIAL_CONTENT if range.is_some() => true,
            STATUS_OK | STATUS_PARTIAL_CONTENT => false,
            status => return Err(TransferFailure::HttpStatus { status }),
        };
        if !append {
            resume_from = 0;
        }
        let total = response.content_length.map(|remaining| resume_from + remaining);
        sink.event(ProgressEvent::Started {
            resume_from,
            total,
        });

        let written = self.write_body(dest, append, resume_from, total, response, sink)?;

        let minimum = kind.min_valid_size();
        if written < minimum {
            if let Err(err) = self.storage.remove(dest) {
                warn!(path = %dest, "could not remove undersized file: {err}");
            }
            return Err(TransferFailure::TooSmall {
                bytes: written,
                minimum,
            });
        }
        Ok(written)
    }

    /// Streams the body into `dest`. The writer is flushed and dropped on
    /// every path out of here, so whatever arrived stays on disk.
    fn write_body(
        &self,
        dest: &Utf8Path,
        append: bool,
        resume_from: u64,
        total: Option<u64>,
        mut response: HttpResponse,
        sink: &dyn ProgressSink,
    ) -> Result<u64, TransferFailure> {
        let mut writer = if append {
            self.storage.open_append(dest)
        } else {
            self.storage.open_overwrite(dest)
        }
        .map_err(storage_failure)?;

        let mut written = resume_from;
        let streamed = self.copy_chunks(&mut response.body, &mut writer, &mut written, total, sink);
        let flushed = writer.flush();
        drop(writer);

        streamed?;
        flushed.map_err(storage_failure)?;
        Ok(written)
    }

    fn copy_chunks(
        &self,
        body: &mut dyn Read,
        writer: &mut dyn Write,
        written: &mut u64,
        total: Option<u64>,
        sink: &dyn ProgressSink,
    ) -> Result<(), TransferFailure> {
        let mut buf = vec![0u8; self.policy.chunk_size.max(1)];
        let mut last_percent = None;
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(classify_read_error(&err)),
            };
            writer.write_all(&buf[..n]).map_err(storage_failure)?;
            *written += n as u64;

            if let Some(total) = total.filter(|total| *total > 0) {
                let percent = (*written * 100 / total).min(100);
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    sink.event(ProgressEvent::Progress {
                        done: *written,
                        total,
                    });
                }
            }
        }
    }
}

fn storage_failure(err: io::Error) -> TransferFailure {
    TransferFailure::Storage(err.to_string())
}
