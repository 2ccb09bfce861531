//! `Streamroster` feed server library.
//!
//! A development stand-in for the production ingestion server: it serves
//! the same WebSocket push surface and HTTP control endpoints, but the
//! chat events it broadcasts are injected by the embedding process (or
//! tests) instead of coming from live platform connections.

pub mod config;
pub mod feed;
