pub mod api;
pub mod catalog;
pub mod config;
pub mod core;
pub mod market;
pub mod session;
