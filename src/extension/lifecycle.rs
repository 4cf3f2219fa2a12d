use super::client::{ExtensionClient, ExtensionError};
use super::events::EventType;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle of the extension process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unregistered,
    Registered,
    Subscribed,
    Running,
    Draining,
    Terminated,
}

/// Drives the extension through its states and races OS termination signals
/// against the host's SHUTDOWN event into one shared cancellation. Whichever
/// arrives first wins; the second trigger is a no-op.
pub struct LifecycleController {
    client: ExtensionClient,
    state: LifecycleState,
    extension_id: Option<String>,
    cancel: CancellationToken,
}

impl LifecycleController {
    pub fn new(client: ExtensionClient) -> Self {
        Self {
            client,
            state: LifecycleState::Unregistered,
            extension_id: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Cancellation observed cooperatively by every long-running activity.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.as_deref()
    }

    /// Unregistered → Registered. Failure is fatal: without an identity
    /// nothing can proceed.
    pub async fn register(&mut self, name: &str) -> Result<(), ExtensionError> {
        let extension_id = self.client.register(name).await?;
        self.extension_id = Some(extension_id);
        self.state = LifecycleState::Registered;
        Ok(())
    }

    /// Registered → Subscribed. Failure is fatal.
    pub async fn subscribe(&mut self, types: &[&str], port: u16) -> Result<(), ExtensionError> {
        let extension_id = self
            .extension_id
            .clone()
            .ok_or(ExtensionError::MissingExtensionId)?;
        self.client.subscribe(&extension_id, types, port).await?;
        self.state = LifecycleState::Subscribed;
        Ok(())
    }

    /// Watches for SIGTERM/SIGINT and fires the shared cancellation.
    pub fn spawn_signal_watcher(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let Ok(mut sigterm) = unix_signal(SignalKind::terminate()) else {
                    error!("failed to install SIGTERM handler");
                    return;
                };
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("received SIGINT, draining"),
                        Err(err) => {
                            error!(%err, "failed to listen for SIGINT");
                            return;
                        }
                    },
                    _ = sigterm.recv() => info!("received SIGTERM, draining"),
                }
                cancel.cancel();
            }

            #[cfg(not(unix))]
            {
                match signal::ctrl_c().await {
                    Ok(()) => {
                        info!("received interrupt, draining");
                        cancel.cancel();
                    }
                    Err(err) => error!(%err, "failed to listen for interrupt"),
                }
            }
        })
    }

    /// Subscribed → Running → Draining. Blocks on the host's next-event long
    /// poll until a SHUTDOWN event or an external signal fires the shared
    /// cancellation. A broken host connection is fatal and is reported after
    /// the state has still moved to Draining so callers can flush.
    pub async fn run_event_loop(&mut self) -> Result<(), ExtensionError> {
        let extension_id = self
            .extension_id
            .clone()
            .ok_or(ExtensionError::MissingExtensionId)?;
        self.state = LifecycleState::Running;
        info!("waiting for host events");

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("external termination won the shutdown race");
                    break Ok(());
                }
                event = self.client.next_event(&extension_id) => match event {
                    Ok(event) if event.event_type == EventType::Shutdown => {
                        info!(reason = ?event.shutdown_reason, "received SHUTDOWN event");
                        self.cancel.cancel();
                        break Ok(());
                    }
                    Ok(event) => {
                        debug!(request_id = ?event.request_id, "invocation event");
                    }
                    Err(err) => {
                        // Lost connection to the host; nothing sensible can
                        // continue, but draining still has to happen.
                        self.cancel.cancel();
                        break Err(err);
                    }
                },
            }
        };

        self.state = LifecycleState::Draining;
        result
    }

    /// Draining → Terminated, once the final drain and flush are done.
    pub fn mark_terminated(&mut self) {
        self.state = LifecycleState::Terminated;
        info!("lifecycle terminated");
    }
}
