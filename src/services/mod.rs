pub mod batch;
pub mod credentials;
pub mod executor;
pub mod http_transport;
pub mod insights;
pub mod logger;
pub mod request_builder;
pub mod secrets;
pub mod session_auth;
