pub mod transport;
#[cfg(feature = "reqwest")]
pub mod reqwest_transport;

pub use transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
#[cfg(feature = "reqwest")]
pub use reqwest_transport::{ReqwestTransport, TransportConfig};
