// src/lib.rs
pub mod browser;
pub mod calc;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod models;
pub mod scrape;
pub mod utils;
pub mod web_server;
