//! Per-connection state and the line-driven request state machine.
//!
//! The record is fed one input line at a time through
//! [`ConnectionRecord::on_line`], which updates the record and tells the
//! caller what to do next. No I/O happens here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;
use crate::http::directive::{DirectiveError, DirectiveSet, HangState};
use crate::http::request::{Method, parse_header_line, parse_request_line};
use crate::server::registry::Activity;

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the request line
    Pre,
    /// Reading header lines until a blank line
    ReadHeader,
    /// Header block complete, response dispatched or scheduled
    Respond,
    /// Frozen on purpose; no more input is processed
    Hang,
    /// Malformed input, the connection is being closed
    Invalid,
}

impl From<HangState> for State {
    fn from(hang: HangState) -> Self {
        match hang {
            HangState::ReadHeader => State::ReadHeader,
            HangState::Respond => State::Respond,
        }
    }
}

/// What the connection should do after a line has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    /// Keep reading lines
    Continue,
    /// Headers are complete; run the dispatcher now or after `delay`
    Dispatch { delay: Option<Duration> },
    /// Stop reading; close straight away if `disconnect` is set
    Hang { disconnect: bool },
    /// Input was malformed; close the connection
    Close,
}

/// Mutable state of one live connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub state: State,
    pub method: Option<Method>,
    pub raw_path: String,
    /// Lowercased header name to value, last write wins
    pub headers: HashMap<String, String>,
    pub directives: DirectiveSet,
    /// Directive parse failure, reported when the response is due
    pub parse_error: Option<DirectiveError>,
    pub freeze_state: Option<State>,
    pub disconnect_on_freeze: bool,
    activity: Arc<Activity>,
    default_timeout: Option<Duration>,
    default_disconnect: bool,
}

impl ConnectionRecord {
    pub fn new(activity: Arc<Activity>, config: &Config) -> Self {
        let record = Self {
            state: State::Pre,
            method: None,
            raw_path: String::new(),
            headers: HashMap::new(),
            directives: DirectiveSet::new(),
            parse_error: None,
            freeze_state: None,
            disconnect_on_freeze: config.disconnect,
            activity,
            default_timeout: config.idle_timeout(),
            default_disconnect: config.disconnect,
        };
        record.activity.set_timeout(record.default_timeout);
        record
    }

    /// Timeout currently enforced by the idle sweep.
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.activity.timeout()
    }

    pub fn last_activity(&self) -> Instant {
        self.activity.last_activity()
    }

    pub fn touch(&self, now: Instant) {
        self.activity.touch(now);
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|value| value.as_str())
    }

    /// Processes one input line (without its line terminator).
    pub fn on_line(&mut self, line: &str, now: Instant) -> LineAction {
        self.touch(now);

        let previous = self.state;
        let next = match previous {
            State::Pre => match parse_request_line(line) {
                Ok(request) => {
                    tracing::info!(request = line, "Request line");
                    self.method = Some(request.method);
                    self.raw_path = request.path;
                    self.headers.clear();
                    self.parse_directives();
                    State::ReadHeader
                }
                Err(e) => {
                    tracing::debug!(?e, line, "Rejecting request line");
                    State::Invalid
                }
            },
            State::ReadHeader if line.is_empty() => State::Respond,
            State::ReadHeader => match parse_header_line(line) {
                Ok((name, value)) => {
                    self.headers.insert(name.to_ascii_lowercase(), value);
                    State::ReadHeader
                }
                Err(e) => {
                    tracing::debug!(?e, line, "Rejecting header line");
                    State::Invalid
                }
            },
            State::Respond => State::Invalid,
            State::Hang => return LineAction::Hang { disconnect: self.disconnect_on_freeze },
            State::Invalid => return LineAction::Close,
        };

        self.apply_overrides();

        if self.freeze_state == Some(next) {
            tracing::debug!(frozen = ?next, disconnect = self.disconnect_on_freeze, "Hanging");
            self.state = State::Hang;
            return LineAction::Hang {
                disconnect: self.disconnect_on_freeze,
            };
        }

        self.state = next;
        match (previous, next) {
            (_, State::Invalid) => {
                tracing::debug!("Reached invalid state");
                LineAction::Close
            }
            (State::ReadHeader, State::Respond) => LineAction::Dispatch {
                delay: self.directives.delay(),
            },
            _ => LineAction::Continue,
        }
    }

    fn parse_directives(&mut self) {
        match DirectiveSet::parse_with_timeout(&self.raw_path, self.default_timeout) {
            Ok(directives) => {
                self.directives = directives;
                self.parse_error = None;
            }
            Err(e) => {
                tracing::warn!(path = %self.raw_path, error = %e, "Directive parse error");
                self.directives = DirectiveSet::new();
                self.parse_error = Some(e);
            }
        }
    }

    /// Derives timeout, freeze state and disconnect behaviour from the
    /// current directives, falling back to the server defaults.
    fn apply_overrides(&mut self) {
        let timeout = match self.directives.timeout() {
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout),
            None => self.default_timeout,
        };
        self.activity.set_timeout(timeout);
        self.freeze_state = self.directives.hang_on().map(State::from);
        self.disconnect_on_freeze = self.directives.disconnect().unwrap_or(self.default_disconnect);
    }
}
