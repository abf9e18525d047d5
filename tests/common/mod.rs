#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Url;

use fetchmend::app::{ProgressEvent, ProgressSink};
use fetchmend::error::TransferFailure;
use fetchmend::http::{HttpResponse, HttpTransport, Sleeper};
use fetchmend::reconcile::AuditReport;

/// What the fake server does with the next request.
#[derive(Debug, Clone)]
pub enum Step {
    /// Honour the range when there is one.
    Serve,
    /// Always send the whole file with 200.
    IgnoreRange,
    /// 416 when a range is sent, otherwise serve normally.
    RejectRange,
    Status(u16),
    Fail(TransferFailure),
    /// Serve normally but time out after this many body bytes.
    CutAfter(usize),
}

#[derive(Default)]
pub struct ScriptedTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<(String, Option<u64>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, content: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), content);
    }

    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn requests(&self) -> Vec<(String, Option<u64>)> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(
        &self,
        content: &[u8],
        range_from: Option<u64>,
        honour_range: bool,
        cut_after: Option<usize>,
    ) -> HttpResponse {
        let (status, body) = match range_from {
            Some(from) if honour_range => (206, content[from as usize..].to_vec()),
            _ => (200, content.to_vec()),
        };
        let content_length = Some(body.len() as u64);
        let body: Box<dyn Read + Send> = match cut_after {
            Some(limit) => Box::new(CutReader {
                inner: Cursor::new(body[..limit.min(body.len())].to_vec()),
            }),
            None => Box::new(Cursor::new(body)),
        };
        HttpResponse {
            status,
            content_length,
            body,
        }
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &Url, range_from: Option<u64>) -> Result<HttpResponse, TransferFailure> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), range_from));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Serve);
        let content = match self.files.lock().unwrap().get(url.as_str()) {
            Some(content) => content.clone(),
            None => return Ok(empty(404)),
        };

        match step {
            Step::Serve => Ok(self.respond(&content, range_from, true, None)),
            Step::IgnoreRange => Ok(self.respond(&content, range_from, false, None)),
            Step::RejectRange if range_from.is_some() => Ok(empty(416)),
            Step::RejectRange => Ok(self.respond(&content, None, false, None)),
            Step::Status(status) => Ok(empty(status)),
            Step::Fail(failure) => Err(failure),
            Step::CutAfter(limit) => Ok(self.respond(&content, range_from, true, Some(limit))),
        }
    }
}

fn empty(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        content_length: Some(0),
        body: Box::new(io::empty()),
    }
}

/// Yields its bytes, then fails the way a stalled socket does.
struct CutReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for CutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            n => Ok(n),
        }
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
    audits: Mutex<usize>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn audits(&self) -> usize {
        *self.audits.lock().unwrap()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn audit(&self, _report: &AuditReport) {
        *self.audits.lock().unwrap() += 1;
    }
}

/// A well-formed PDF of exactly `size` bytes.
pub fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend((0..size - bytes.len() - 6).map(|i| b'a' + (i % 26) as u8));
    bytes.extend_from_slice(b"%%EOF\n");
    bytes
}

pub fn audio_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
