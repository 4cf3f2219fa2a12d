pub mod coordinator;
pub mod retry;
pub mod shipper;

pub use coordinator::DeliveryCoordinator;
pub use retry::RetryPolicy;
pub use shipper::{SenderError, Shipper, ShipperConfig, ShipperStats};
