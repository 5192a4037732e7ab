pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod services;
pub mod store;
pub mod thread;
pub mod utils;
