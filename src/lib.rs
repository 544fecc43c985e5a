pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod middleware;
pub mod server;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod testing;
