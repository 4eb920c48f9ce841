//! badhttpd - a deliberately misbehaving HTTP server
//!
//! Hangs, redirect loops, delays, disconnects and protocol errors, driven by
//! directives embedded in the request path, for testing how HTTP clients
//! cope with hostile servers.

pub mod config;
pub mod http;
pub mod server;
