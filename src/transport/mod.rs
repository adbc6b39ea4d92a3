pub mod http;
pub mod pool;

pub use http::{HttpResponse, HttpTransport, HyperTransport};
pub use pool::{ConnectionPool, HttpClient};
