pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod handlers;
pub mod payload;
pub mod stream;
pub mod upstream;
