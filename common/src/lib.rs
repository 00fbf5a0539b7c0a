pub mod clock;
pub mod errors;
pub mod http_client;
pub mod models;
pub mod tracing;
