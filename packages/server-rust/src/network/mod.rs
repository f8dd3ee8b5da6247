//! HTTP binding: server lifecycle, call and health handlers, middleware,
//! shutdown control and the client-side transport.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;
pub mod transport;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
pub use transport::HttpTransport;
