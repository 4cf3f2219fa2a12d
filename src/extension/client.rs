use super::events::NextEventResponse;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

pub const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
pub const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";

const EXTENSION_API_VERSION: &str = "2020-01-01";
const LOGS_API_VERSION: &str = "2020-08-15";

// Buffering the host applies before pushing a delivery to us.
const BUFFERING_TIMEOUT_MS: u32 = 1_000;
const BUFFERING_MAX_BYTES: u32 = 262_144;
const BUFFERING_MAX_ITEMS: u32 = 10_000;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("AWS_LAMBDA_RUNTIME_API must be set")]
    MissingRuntimeApi,
    #[error("request to extensions API failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{operation} returned unexpected status {status}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
    },
    #[error("registration response carried no extension identifier")]
    MissingExtensionId,
}

/// Client for the host's extensions API and Logs API.
///
/// Built without a request timeout: `next_event` is a long poll that blocks
/// until the next invocation or shutdown.
pub struct ExtensionClient {
    http: reqwest::Client,
    base: String,
}

impl ExtensionClient {
    /// Reads the runtime API address from the reserved environment variable.
    pub fn from_env() -> Result<Self, ExtensionError> {
        let runtime_api =
            std::env::var("AWS_LAMBDA_RUNTIME_API").map_err(|_| ExtensionError::MissingRuntimeApi)?;
        Ok(Self::new(&runtime_api))
    }

    /// `runtime_api` is the `host:port` of the local runtime API endpoint.
    pub fn new(runtime_api: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{runtime_api}"),
        }
    }

    /// Registers the extension for INVOKE and SHUTDOWN events and returns
    /// the identity every later call must carry.
    pub async fn register(&self, name: &str) -> Result<String, ExtensionError> {
        let url = format!("{}/{}/extension/register", self.base, EXTENSION_API_VERSION);
        let response = self
            .http
            .post(&url)
            .header(EXTENSION_NAME_HEADER, name)
            .json(&json!({ "events": ["INVOKE", "SHUTDOWN"] }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtensionError::UnexpectedStatus {
                operation: "register",
                status: status.as_u16(),
            });
        }
        let extension_id = response
            .headers()
            .get(EXTENSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ExtensionError::MissingExtensionId)?;
        info!(name, "registered with extensions API");
        Ok(extension_id)
    }

    /// Blocks until the host delivers the next lifecycle event.
    pub async fn next_event(&self, extension_id: &str) -> Result<NextEventResponse, ExtensionError> {
        let url = format!(
            "{}/{}/extension/event/next",
            self.base, EXTENSION_API_VERSION
        );
        let response = self
            .http
            .get(&url)
            .header(EXTENSION_ID_HEADER, extension_id)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtensionError::UnexpectedStatus {
                operation: "next_event",
                status: status.as_u16(),
            });
        }
        let event = response.json::<NextEventResponse>().await?;
        debug!(event_type = ?event.event_type, "received host event");
        Ok(event)
    }

    /// Subscribes the local push endpoint to the requested log types.
    pub async fn subscribe(
        &self,
        extension_id: &str,
        types: &[&str],
        port: u16,
    ) -> Result<(), ExtensionError> {
        let url = format!("{}/{}/logs", self.base, LOGS_API_VERSION);
        let body = json!({
            "destination": {
                "protocol": "HTTP",
                "URI": format!("http://sandbox.localdomain:{port}"),
            },
            "types": types,
            "buffering": {
                "timeoutMs": BUFFERING_TIMEOUT_MS,
                "maxBytes": BUFFERING_MAX_BYTES,
                "maxItems": BUFFERING_MAX_ITEMS,
            },
        });
        let response = self
            .http
            .put(&url)
            .header(EXTENSION_ID_HEADER, extension_id)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtensionError::UnexpectedStatus {
                operation: "subscribe",
                status: status.as_u16(),
            });
        }
        info!(?types, port, "subscribed to log stream");
        Ok(())
    }
}
