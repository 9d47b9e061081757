// src/apify/mod.rs
// Apify platform REST API: wire types and client

pub mod client;
pub mod types;

pub use client::ApifyClient;
pub use types::*;
