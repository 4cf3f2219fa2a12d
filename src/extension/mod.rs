//! Integration with the host's extension lifecycle: registration, Logs API
//! subscription, the blocking next-event wait, and coordinated shutdown.

pub mod client;
pub mod events;
pub mod lifecycle;

pub use client::{ExtensionClient, ExtensionError};
pub use events::{EventType, NextEventResponse};
pub use lifecycle::{LifecycleController, LifecycleState};
