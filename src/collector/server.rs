use crate::buffer::BatchQueue;
use crate::parser::Batch;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Port the host is subscribed to push log deliveries to.
pub const DEFAULT_LISTENER_PORT: u16 = 4243;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to bind log listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Local HTTP endpoint the host pushes log batches to.
///
/// The handler only parses and enqueues, then answers 200 immediately: the
/// host enforces its own flow control and must never be blocked by
/// conversion work. Bound before the Logs API subscription is made so no
/// delivery is refused.
pub struct LogListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    queue: BatchQueue,
}

impl LogListener {
    pub async fn bind(port: u16, queue: BatchQueue) -> Result<Self, CollectorError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CollectorError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| CollectorError::Bind {
            addr,
            source,
        })?;
        Ok(Self {
            listener,
            local_addr,
            queue,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves push deliveries until cancelled.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    accepted = self.listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!(%peer, "accepted push connection");
                                let queue = self.queue.clone();
                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);
                                    let service = service_fn(move |req| {
                                        let queue = queue.clone();
                                        async move { handle_delivery(req, queue).await }
                                    });
                                    if let Err(err) =
                                        http1::Builder::new().serve_connection(io, service).await
                                    {
                                        debug!(%err, "push connection ended with error");
                                    }
                                });
                            }
                            Err(err) => warn!(%err, "failed to accept push connection"),
                        }
                    }
                }
            }
            debug!("log listener stopped");
        })
    }
}

/// Parses one delivery (a JSON array of raw records) and enqueues it whole.
/// Always answers 200: a malformed body is logged and discarded, never
/// surfaced to the host.
async fn handle_delivery(
    req: Request<Incoming>,
    queue: BatchQueue,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body = req.into_body().collect().await?.to_bytes();
    match serde_json::from_slice::<Batch>(&body) {
        Ok(batch) if batch.is_empty() => debug!("received empty delivery"),
        Ok(batch) => {
            debug!(records = batch.len(), "received log batch");
            if queue.push(batch).is_err() {
                warn!("batch queue is closed, discarding delivery");
            }
        }
        Err(err) => warn!(%err, bytes = body.len(), "discarding malformed log delivery"),
    }
    // 200 with an empty body, whatever happened above.
    Ok(Response::new(Full::new(Bytes::new())))
}
