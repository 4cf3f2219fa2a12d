pub mod server;

pub use server::{CollectorError, DEFAULT_LISTENER_PORT, LogListener};
