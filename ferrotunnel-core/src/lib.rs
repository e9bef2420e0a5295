pub mod pending;
pub mod port;
pub mod rate_limit;
pub mod reconnect;
pub mod tunnel;

pub use pending::{PendingOutcome, PendingRegistry};
pub use port::PortAllocator;
pub use rate_limit::{GovernorRateLimitStore, IngressAdmission, RateLimitStore};
pub use tunnel::client::TunnelClient;
pub use tunnel::server::{ConnectionEvent, ConnectionEventSink, IngressSpawner, ServerState, TracingEventSink};
pub use tunnel::{Session, SessionId, SessionState, TunnelRegistry};
