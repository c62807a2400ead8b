//! Push connection transport: server-sent events over HTTP
//!
//! A transport opens one connection per attempt and reports everything it
//! sees through a [`SignalSink`] tagged with that attempt's id. The stream
//! client decides which attempt is still current.

use crate::events::AttemptId;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the server sent none
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<Duration>,
}

impl SseFrame {
    pub fn new(event: &str, data: &str) -> Self {
        Self {
            event: event.to_string(),
            data: data.to_string(),
            id: None,
            retry: None,
        }
    }
}

/// Longest line the decoder buffers before discarding it
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Incremental `text/event-stream` decoder.
///
/// Lines end with LF, CRLF or a lone CR. Bytes may be split anywhere,
/// including inside a UTF-8 sequence or a CRLF pair.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    /// Last byte was a CR; a following LF belongs to the same line end
    after_cr: bool,
    /// Current line overflowed and is skipped up to its end
    discarding: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for &byte in bytes {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    if let Some(frame) = self.end_line() {
                        frames.push(frame);
                    }
                }
                _ => {
                    self.after_cr = false;
                    if self.discarding {
                        continue;
                    }
                    if self.line.len() >= MAX_LINE_BYTES {
                        tracing::warn!(
                            "SSE line exceeds {} bytes, discarding it and the event in progress",
                            MAX_LINE_BYTES
                        );
                        self.line.clear();
                        self.reset_event();
                        self.discarding = true;
                        continue;
                    }
                    self.line.push(byte);
                }
            }
        }

        frames
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        if self.discarding {
            self.discarding = false;
            return None;
        }
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        self.process_line(&line)
    }

    fn reset_event(&mut self) {
        self.event = None;
        self.data.clear();
        self.has_data = false;
        self.retry = None;
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            other => tracing::debug!("Ignoring unknown SSE field '{}'", other),
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let retry = self.retry.take();

        if !self.has_data {
            self.data.clear();
            return None;
        }

        self.has_data = false;
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data),
            id: self.id.clone(),
            retry,
        })
    }
}

/// What a transport observed on one connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Server accepted the request and the event stream is open
    Opened,
    Frame(SseFrame),
    /// Connection could not be opened or broke mid-stream
    Failed(String),
    /// Server ended the stream
    Closed,
}

/// Transport event tagged with the attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSignal {
    pub attempt: AttemptId,
    pub event: TransportEvent,
}

/// Attempt-scoped sender handed to a transport when it opens a connection
#[derive(Debug, Clone)]
pub struct SignalSink {
    attempt: AttemptId,
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl SignalSink {
    pub fn new(attempt: AttemptId, tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Returns `false` once the receiving side is gone
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportSignal {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

/// Owner of one open connection; closing it stops the reader
#[derive(Debug)]
pub struct ConnectionHandle {
    attempt: AttemptId,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    pub fn new(attempt: AttemptId, task: JoinHandle<()>) -> Self {
        Self {
            attempt,
            task: Some(task),
        }
    }

    /// Handle for transports that do not run a background task
    pub fn detached(attempt: AttemptId) -> Self {
        Self { attempt, task: None }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::debug!("Closed stream connection for attempt {}", self.attempt);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens push connections
pub trait StreamTransport: Send + Sync {
    fn open(&self, url: Url, sink: SignalSink) -> ConnectionHandle;
}

/// SSE over HTTP using reqwest's streaming body
#[derive(Debug, Clone)]
pub struct SseTransport {
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn run(http: reqwest::Client, url: Url, sink: SignalSink) {
        tracing::info!("Opening event stream {}", url);

        let response = match http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                sink.send(TransportEvent::Failed(format!("request failed: {}", e)));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            sink.send(TransportEvent::Failed(format!("HTTP {} from {}", status, url)));
            return;
        }

        if !sink.send(TransportEvent::Opened) {
            return;
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.feed(&bytes) {
                        if !sink.send(TransportEvent::Frame(frame)) {
                            return;
                        }
                    }
                }
                Err(e) => {
                    sink.send(TransportEvent::Failed(format!("stream read failed: {}", e)));
                    return;
                }
            }
        }

        sink.send(TransportEvent::Closed);
    }
}

impl StreamTransport for SseTransport {
    fn open(&self, url: Url, sink: SignalSink) -> ConnectionHandle {
        let attempt = sink.attempt();
        let task = tokio::spawn(Self::run(self.http.clone(), url, sink));
        ConnectionHandle::new(attempt, task)
    }
}
