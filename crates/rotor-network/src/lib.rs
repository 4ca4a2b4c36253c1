//! Rotor Network Layer
//!
//! Small async HTTP client shared by the discovery client and the
//! control daemon client.
//!
//! Architecture:
//! 1. URL parsed into an origin-form request with an explicit Host header
//! 2. Plain TCP for the local daemon, rustls for HTTPS discovery
//! 3. Single hyper HTTP/1.1 exchange per request, bounded by timeouts

mod client;

pub use client::{HttpClient, HttpClientConfig, HttpError, Response};
pub use hyper::{Method, StatusCode};
