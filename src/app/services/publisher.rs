//! Downstream publishing of accepted records
//!
//! Pipelines hand records to a [`Publisher`], which encodes each one as a
//! JSON message and queues it without waiting. A single writer task owns
//! the [`Transport`] and delivers queued messages, bounding every attempt
//! with a timeout and retrying with exponential backoff. A message is
//! dropped and counted against its site when the queue is full or every
//! attempt fails, so a slow or stalled consumer never holds up parsing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::app::models::{OutboundMessage, Record};
use crate::app::services::metrics::MetricsSink;
use crate::constants::{
    DEFAULT_PUBLISH_ATTEMPTS, DEFAULT_PUBLISH_BACKOFF, DEFAULT_PUBLISH_DRAIN_GRACE,
    DEFAULT_PUBLISH_QUEUE_CAPACITY, DEFAULT_PUBLISH_SEND_TIMEOUT, MAX_PUBLISH_BACKOFF,
};
use crate::{Error, Result};

/// Bounded exponential backoff for publish attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Limit on one attempt; the connection is dropped when it elapses
    pub send_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            initial_backoff: DEFAULT_PUBLISH_BACKOFF,
            max_backoff: MAX_PUBLISH_BACKOFF,
            send_timeout: DEFAULT_PUBLISH_SEND_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Queue and delivery settings for a [`Publisher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub retry: RetryPolicy,
    /// Messages waiting for the writer before new ones are dropped
    pub queue_capacity: usize,
    /// How long [`Publisher::close`] waits for the queue to drain
    pub drain_grace: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            queue_capacity: DEFAULT_PUBLISH_QUEUE_CAPACITY,
            drain_grace: DEFAULT_PUBLISH_DRAIN_GRACE,
        }
    }
}

impl PublishOptions {
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }
}

/// JSON-lines connection to a TCP endpoint, opened on first use
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if self.stream.is_none() {
            let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
                Error::transport(format!("Failed to connect to {}", self.addr), Some(e))
            })?;
            debug!("Connected to publish endpoint {}", self.addr);
            self.stream = Some(stream);
        }

        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::transport("No connection", None));
        };

        let written = stream.write_all(&json_line(&message.body)).await;
        if let Err(e) = written {
            self.reset();
            return Err(Error::transport(
                format!("Failed to write to {}", self.addr),
                Some(e),
            ));
        }
        Ok(())
    }

    /// Forget the connection; the next send reconnects
    fn reset(&mut self) {
        self.stream = None;
    }
}

/// Where published messages go
#[derive(Debug)]
pub enum Transport {
    /// One JSON object per line on standard output
    Stdout,
    /// One JSON object per line over TCP
    Tcp(TcpTransport),
    /// In-process channel
    Channel(mpsc::UnboundedSender<OutboundMessage>),
}

impl Transport {
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::Tcp(TcpTransport::new(addr))
    }

    /// Channel transport and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::Channel(sender), receiver)
    }

    pub fn describe(&self) -> String {
        match self {
            Transport::Stdout => "stdout".to_string(),
            Transport::Tcp(tcp) => format!("tcp://{}", tcp.addr()),
            Transport::Channel(_) => "channel".to_string(),
        }
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        match self {
            Transport::Stdout => write_stdout_line(&message.body).await,
            Transport::Tcp(tcp) => tcp.send(message).await,
            Transport::Channel(sender) => sender
                .send(message.clone())
                .map_err(|_| Error::transport("Receiver closed", None)),
        }
    }

    fn reset(&mut self) {
        if let Transport::Tcp(tcp) = self {
            tcp.reset();
        }
    }
}

fn json_line(body: &[u8]) -> Vec<u8> {
    let mut line = Vec::with_capacity(body.len() + 1);
    line.extend_from_slice(body);
    line.push(b'\n');
    line
}

async fn write_stdout_line(body: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&json_line(body))
        .await
        .map_err(|e| Error::transport("Failed to write to stdout", Some(e)))?;
    stdout
        .flush()
        .await
        .map_err(|e| Error::transport("Failed to flush stdout", Some(e)))
}

#[derive(Debug, Default)]
struct PublishCounters {
    published: AtomicU64,
    dropped: AtomicU64,
    /// Queued or in flight
    pending: AtomicU64,
}

/// Owns the transport and drains the queue
struct PublishWriter {
    transport: Transport,
    retry: RetryPolicy,
    counters: Arc<PublishCounters>,
    metrics: Arc<dyn MetricsSink>,
}

impl PublishWriter {
    async fn run(mut self, mut queue: mpsc::Receiver<OutboundMessage>) {
        while let Some(message) = queue.recv().await {
            match self.deliver(&message).await {
                Ok(()) => {
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_message_dropped(&message.site);
                    warn!(
                        site = %message.site,
                        "Dropping message after {} attempts to {}: {}",
                        self.retry.max_attempts.max(1),
                        self.transport.describe(),
                        e
                    );
                }
            }
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
        }
        debug!("Publish queue to {} closed", self.transport.describe());
    }

    async fn deliver(&mut self, message: &OutboundMessage) -> Result<()> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let sent = timeout(self.retry.send_timeout, self.transport.send(message)).await;
            let result = match sent {
                Ok(result) => result,
                Err(_) => {
                    self.transport.reset();
                    Err(Error::transport(
                        format!(
                            "{} made no progress within {:?}",
                            self.transport.describe(),
                            self.retry.send_timeout
                        ),
                        None,
                    ))
                }
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    debug!(
                        site = %message.site,
                        "Publish attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared publisher for every pipeline
pub struct Publisher {
    target: Option<String>,
    queue: Mutex<Option<mpsc::Sender<OutboundMessage>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<PublishCounters>,
    metrics: Option<Arc<dyn MetricsSink>>,
    drain_grace: Duration,
}

impl Publisher {
    /// Start the writer task for `transport`
    ///
    /// Must be called from within a tokio runtime. Dropped messages are
    /// reported to `metrics` per site.
    pub fn spawn(
        transport: Transport,
        options: PublishOptions,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let counters = Arc::new(PublishCounters::default());
        let target = transport.describe();

        let writer = PublishWriter {
            transport,
            retry: options.retry,
            counters: Arc::clone(&counters),
            metrics: Arc::clone(&metrics),
        };
        let handle = tokio::spawn(writer.run(receiver));
        debug!(
            "Publishing to {} (queue capacity {})",
            target, options.queue_capacity
        );

        Self {
            target: Some(target),
            queue: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(handle)),
            counters,
            metrics: Some(metrics),
            drain_grace: options.drain_grace,
        }
    }

    /// Publisher with no endpoint; every publish succeeds without sending
    pub fn disabled() -> Self {
        Self {
            target: None,
            queue: Mutex::new(None),
            writer: Mutex::new(None),
            counters: Arc::new(PublishCounters::default()),
            metrics: None,
            drain_grace: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Queue one record for delivery without waiting on the transport
    ///
    /// Fails, and counts the message as dropped, when the record cannot be
    /// encoded, the queue is full, or the publisher is closed. Delivery
    /// failures after queueing are counted by the writer.
    pub fn publish(&self, record: &Record) -> Result<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };

        let message = match OutboundMessage::from_record(record) {
            Ok(message) => message,
            Err(e) => {
                self.count_dropped(&record.site);
                return Err(e);
            }
        };

        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        let queued = match lock(&self.queue).as_ref() {
            Some(queue) => queue.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => format!("Publish queue to {} is full", target),
                TrySendError::Closed(_) => format!("Publish writer for {} has stopped", target),
            }),
            None => Err(format!("Publisher for {} is closed", target)),
        };

        queued.map_err(|reason| {
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
            self.count_dropped(&record.site);
            Error::transport(reason, None)
        })
    }

    /// Stop accepting records and wait for the queue to drain
    ///
    /// Messages still undelivered when the drain grace period runs out are
    /// abandoned and counted as dropped.
    pub async fn close(&self) {
        drop(lock(&self.queue).take());
        let Some(mut writer) = lock(&self.writer).take() else {
            return;
        };

        match timeout(self.drain_grace, &mut writer).await {
            Ok(Ok(())) => debug!("Publish queue drained"),
            Ok(Err(e)) => {
                let abandoned = self.abandon_pending();
                warn!("Publish writer failed with {} messages queued: {}", abandoned, e);
            }
            Err(_) => {
                writer.abort();
                let _ = writer.await;
                let abandoned = self.abandon_pending();
                warn!(
                    "Abandoned {} undelivered messages after {:?}",
                    abandoned, self.drain_grace
                );
            }
        }
    }

    fn count_dropped(&self, site: &str) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_message_dropped(site);
        }
    }

    fn abandon_pending(&self) -> u64 {
        let abandoned = self.counters.pending.swap(0, Ordering::Relaxed);
        self.counters.dropped.fetch_add(abandoned, Ordering::Relaxed);
        abandoned
    }

    pub fn published_count(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Messages queued or in flight
    pub fn pending_count(&self) -> u64 {
        self.counters.pending.load(Ordering::Relaxed)
    }
}
