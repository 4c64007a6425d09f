pub mod app;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod models;
pub mod server;
pub mod services;
pub mod stores;
pub mod utils;
