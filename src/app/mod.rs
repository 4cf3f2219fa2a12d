pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, LogLevel};

use crate::buffer::batch_queue;
use crate::collector::LogListener;
use crate::extension::{ExtensionClient, LifecycleController};
use crate::parser::RecordConverter;
use crate::sender::{DeliveryCoordinator, Shipper, ShipperConfig};
use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args_and_env(args)?;
        Ok(Self { config })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config;

        let (level, level_fell_back) = config.log_level();
        logging::init(level);
        if level_fell_back {
            warn!(
                configured = %config.log_level,
                "unknown log level, reverting to default"
            );
        }
        let (_, platform_toggle_fell_back) = config.enable_platform_logs();
        if platform_toggle_fell_back {
            warn!(
                configured = %config.enable_platform_logs,
                "could not parse platform logs toggle, reverting to default"
            );
        }
        let (_, rejected_fields) = config.custom_fields();
        for fragment in rejected_fields {
            warn!(fragment = %fragment, "skipping malformed custom field pair");
        }

        info!(version = env!("CARGO_PKG_VERSION"), "starting log shipper extension");

        // Register as early as possible so the runtime can start in parallel.
        let client = ExtensionClient::from_env()?;
        let mut lifecycle = LifecycleController::new(client);
        lifecycle.register(&extension_name()).await?;
        let cancel = lifecycle.cancellation();

        let (queue, consumer) = batch_queue();

        // Bind before subscribing so no delivery is refused.
        let listener = LogListener::bind(config.port, queue).await?;
        let listener_task = listener.spawn(cancel.clone());

        lifecycle
            .subscribe(&config.subscription_types(), config.port)
            .await?;

        let converter = Arc::new(RecordConverter::new(config.convert_settings()));
        let shipper = Shipper::new(ShipperConfig {
            endpoint: config.listener.clone(),
            token: config.token.clone(),
            verbose: config.verbose_shipping,
            ..ShipperConfig::default()
        })?;
        let ticker_task = shipper.spawn_drain_ticker(cancel.clone());

        let coordinator =
            DeliveryCoordinator::new(consumer, converter, shipper.clone(), cancel.clone());
        let coordinator_task = tokio::spawn(coordinator.run());

        lifecycle.spawn_signal_watcher();

        // Blocks until a SHUTDOWN event or an external signal starts the
        // drain; a broken host connection also lands here, as an error.
        let event_result = lifecycle.run_event_loop().await;

        // Draining: the coordinator sweeps the queue and forces the final
        // flush before we report terminated.
        if let Err(err) = coordinator_task.await {
            error!(%err, "delivery coordinator panicked");
        }
        let _ = ticker_task.await;
        listener_task.abort();

        let stats = shipper.stats();
        info!(
            shipped_bytes = stats.shipped_bytes,
            dropped_bytes = stats.dropped_bytes,
            "final flush complete"
        );
        lifecycle.mark_terminated();

        event_result?;
        Ok(())
    }
}

/// The extension registers under its on-disk binary name, matching how the
/// host resolves extensions from the extensions directory.
fn extension_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Binary entry point: fatal startup errors exit non-zero, graceful
/// shutdown exits zero.
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        Config::parse_from(["lambda-log-shipper", "--help"]);
    }

    match App::from_args(args) {
        Ok(app) => {
            if let Err(err) = app.run().await {
                error!("extension error: {err}");
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("configuration error: {err}");
            process::exit(1);
        }
    }
    Ok(())
}
