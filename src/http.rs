//! HTTP transport helpers for the token endpoint.

pub mod client;
