use super::retry::RetryPolicy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

/// Default in-memory buffer capacity before a forced flush.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;
/// Default interval of the background drain ticker.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("invalid listener endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("request to listener failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("listener returned status {status}")]
    HttpStatus { status: u16 },
}

#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub endpoint: String,
    pub token: String,
    pub buffer_capacity: usize,
    pub drain_interval: Duration,
    pub retry: RetryPolicy,
    /// Verbose transport logging (payload sizes per request).
    pub verbose: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            retry: RetryPolicy::default(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipperStats {
    pub shipped_bytes: u64,
    pub dropped_bytes: u64,
    pub failed_requests: u64,
}

/// Buffered ingestion client for the remote listener.
///
/// `write` appends NDJSON payloads to an in-memory buffer; `flush` transmits
/// whatever is buffered. The buffer is safe for concurrent write/flush from
/// the coordinator and the background drain ticker.
pub struct Shipper {
    client: reqwest::Client,
    url: Url,
    buffer: Mutex<Vec<u8>>,
    capacity: usize,
    retry: RetryPolicy,
    verbose: bool,
    shipped_bytes: AtomicU64,
    dropped_bytes: AtomicU64,
    failed_requests: AtomicU64,
    drain_interval: Duration,
}

impl Shipper {
    pub fn new(config: ShipperConfig) -> Result<Arc<Self>, SenderError> {
        let mut url =
            Url::parse(&config.endpoint).map_err(|err| SenderError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: err.to_string(),
            })?;
        // The listener authenticates with the account token as a query
        // parameter.
        url.query_pairs_mut().append_pair("token", &config.token);

        Ok(Arc::new(Self {
            client: reqwest::Client::new(),
            url,
            buffer: Mutex::new(Vec::new()),
            capacity: config.buffer_capacity,
            retry: config.retry,
            verbose: config.verbose,
            shipped_bytes: AtomicU64::new(0),
            dropped_bytes: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            drain_interval: config.drain_interval,
        }))
    }

    /// Appends one payload to the buffer. If the payload would overflow the
    /// configured capacity, the current buffer content is transmitted first.
    pub async fn write(&self, payload: &[u8]) -> Result<(), SenderError> {
        let overflow = {
            let mut buffer = self.buffer.lock();
            let overflow = if !buffer.is_empty()
                && buffer.len() + payload.len() + 1 > self.capacity
            {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            };
            if !buffer.is_empty() {
                buffer.push(b'\n');
            }
            buffer.extend_from_slice(payload);
            overflow
        };

        match overflow {
            Some(pending) => {
                debug!(
                    bytes = pending.len(),
                    "buffer capacity reached, flushing early"
                );
                self.transmit(pending).await
            }
            None => Ok(()),
        }
    }

    /// Transmits the buffered payload, if any. Idempotent on an empty buffer.
    pub async fn flush(&self) -> Result<(), SenderError> {
        let pending = std::mem::take(&mut *self.buffer.lock());
        if pending.is_empty() {
            return Ok(());
        }
        self.transmit(pending).await
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn stats(&self) -> ShipperStats {
        ShipperStats {
            shipped_bytes: self.shipped_bytes.load(Ordering::Relaxed),
            dropped_bytes: self.dropped_bytes.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }

    /// Background flusher: transmits buffered output every drain interval
    /// until cancelled.
    pub fn spawn_drain_ticker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let shipper = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(shipper.drain_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(err) = shipper.flush().await {
                            warn!(%err, "periodic drain failed");
                        }
                    }
                }
            }
        })
    }

    /// Sends one payload with bounded backoff. After the last attempt the
    /// payload is dropped and accounted, never re-queued: the host does not
    /// replay, and halting delivery would lose every later record too.
    async fn transmit(&self, payload: Vec<u8>) -> Result<(), SenderError> {
        let mut attempt = 0;
        loop {
            match self.post(&payload).await {
                Ok(()) => {
                    self.shipped_bytes
                        .fetch_add(payload.len() as u64, Ordering::Relaxed);
                    if self.verbose {
                        debug!(bytes = payload.len(), "payload shipped");
                    }
                    return Ok(());
                }
                Err(err) => {
                    self.failed_requests.fetch_add(1, Ordering::Relaxed);
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        self.dropped_bytes
                            .fetch_add(payload.len() as u64, Ordering::Relaxed);
                        error!(
                            %err,
                            attempts = attempt,
                            dropped_bytes = payload.len(),
                            "giving up on payload after retries"
                        );
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(%err, attempt, delay_ms = delay.as_millis() as u64, "transmit failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn post(&self, payload: &[u8]) -> Result<(), SenderError> {
        if self.verbose {
            debug!(bytes = payload.len(), "posting payload to listener");
        }
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload.to_vec())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SenderError::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

impl std::fmt::Debug for Shipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The full URL carries the account token; log the host only.
        f.debug_struct("Shipper")
            .field("endpoint_host", &self.url.host_str())
            .field("capacity", &self.capacity)
            .field("buffered_bytes", &self.buffered_bytes())
            .field("stats", &self.stats())
            .finish()
    }
}
