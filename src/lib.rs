//! MGNREGA Dash Library
//!
//! Exposes the cache, resolver and HTTP surface for the binary and for
//! integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod resolver;
pub mod server;
