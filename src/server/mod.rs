//! TCP front end: the accept loop and the registry of live connections.

pub mod listener;
pub mod registry;

pub use registry::{ConnectionRegistry, Registration};
