pub mod health;
pub mod metrics;
pub mod tracing;

pub use health::{HealthState, PortUtilization};
pub use metrics::ServerMetrics;
pub use tracing::init_tracing;
