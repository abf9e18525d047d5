use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, REFERER, USER_AGENT};
use tracing::debug;

use crate::error::{MendError, TransferFailure};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    /// `Content-Length` as sent; for a 206 this is the remaining bytes only.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

pub trait HttpTransport: Send + Sync {
    /// Issues a GET, with `Range: bytes=<from>-` when `range_from` is set.
    /// Any status is returned as a response; only transport failures are errors.
    fn get(&self, url: &Url, range_from: Option<u64>) -> Result<HttpResponse, TransferFailure>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &Url, range_from: Option<u64>) -> Result<HttpResponse, TransferFailure> {
        (**self).get(url, range_from)
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub referer: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("fetchmend/{}", env!("CARGO_PKG_VERSION")),
            referer: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// The one HTTP session of a run. Build it once and pass it to whatever
/// needs the network.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self, MendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| MendError::Http(format!("invalid user agent: {err}")))?,
        );
        if let Some(referer) = settings.referer.as_deref() {
            headers.insert(
                REFERER,
                HeaderValue::from_str(referer)
                    .map_err(|err| MendError::Http(format!("invalid referer: {err}")))?,
            );
        }

        // `timeout` bounds each connect, read and write operation of the
        // blocking client, which is the idle timeout we want for big files.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()
            .map_err(|err| MendError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url, range_from: Option<u64>) -> Result<HttpResponse, TransferFailure> {
        let mut request = self.client.get(url.clone());
        if let Some(from) = range_from {
            request = request.header(RANGE, format!("bytes={from}-"));
        }
        let response = request.send().map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(%url, ?range_from, status, ?content_length, "response received");
        Ok(HttpResponse {
            status,
            content_length,
            body: Box::new(response),
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransferFailure {
    if err.is_timeout() {
        TransferFailure::NetworkTimeout(err.to_string())
    } else {
        TransferFailure::Network(err.to_string())
    }
}

/// Maps a body read error to the failure kind the retry loop reports.
pub fn classify_read_error(err: &io::Error) -> TransferFailure {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            TransferFailure::NetworkTimeout(err.to_string())
        }
        _ => TransferFailure::Network(err.to_string()),
    }
}

/// Blocking pause, used for retry backoff and the politeness delay.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
