pub mod handler;
pub mod logging;
pub mod registry;

pub use handler::{HandlerOptions, RouteHandler, RouteResponse};
pub use logging::{init_logging, init_test_logging, LogConfig};
pub use registry::{Registry, RegistryError};
