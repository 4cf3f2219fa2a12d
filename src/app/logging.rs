use super::config::LogLevel;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global tracing subscriber once, filtered at the configured
/// level with the noisy HTTP dependencies quieted. Safe to call more than
/// once (later calls are no-ops), which keeps tests simple.
pub fn init(level: LogLevel) {
    let filter = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn",
        level.as_filter()
    );
    let env_filter = EnvFilter::try_new(&filter)
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::default().as_filter()));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).compact());

    // AlreadySet means another component (or a test) installed one first.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
