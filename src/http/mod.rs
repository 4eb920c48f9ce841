//! Line-oriented HTTP handling with scripted misbehaviour.
//!
//! # Architecture
//!
//! - **`directive`**: the `/key:value` path mini-language
//! - **`request`**: request line and header line parsing
//! - **`record`**: per-connection state and the request state machine
//! - **`dispatch`**: decides between error, redirect and hanging
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes and writes responses to the client
//! - **`connection`**: the tokio task driving one client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │     Pre     │ ← Wait for "GET /path HTTP/1.1"
//!        └──────┬──────┘
//!               │ Request line (directives parsed)
//!               ▼
//!        ┌──────────────────┐
//!        │   ReadHeader     │ ← "Name: value" lines
//!        └──────┬───────────┘
//!               │ Blank line
//!               ▼
//!        ┌──────────────────┐
//!        │    Respond       │ ← Dispatch now or after `delay`
//!        └──────┬───────────┘
//!               │ Any further line
//!               ▼
//!        ┌──────────────────┐
//!        │    Invalid       │ ← Close
//!        └──────────────────┘
//! ```
//!
//! Malformed input in any state leads to `Invalid`. If the state a line
//! leads to is the one named by `hangon`, the connection goes to `Hang`
//! instead: it stops reading and waits for the idle sweep, or closes at once
//! when `disconnect` is in effect.
//!
//! # Example
//!
//! ```text
//! GET /redir:2/next:/done HTTP/1.1     -> 302 Location: http://host/done
//! GET /redir:2 HTTP/1.1                -> 302 Location: http://host/redir:1
//! GET /redir:loop HTTP/1.1             -> 302 Location: http://host/redir:loop
//! GET /hangon:respond/timeout:5 ...    -> nothing, closed after 5s idle
//! GET /delay:2/next:/x HTTP/1.1        -> 302 after two seconds
//! ```

pub mod connection;
pub mod directive;
pub mod dispatch;
pub mod record;
pub mod request;
pub mod response;
pub mod writer;
