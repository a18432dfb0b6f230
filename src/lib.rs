pub mod cache;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod errors;
pub mod host;
pub mod models;
pub mod store;
pub mod tags;
pub mod utils;
