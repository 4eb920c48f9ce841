//! Path directive mini-language.
//!
//! A request path such as `/redir:3/timeout:10/next:/elsewhere` is read as a
//! sequence of `/key:value` segments that steer how the server misbehaves for
//! that connection. Parsing runs left to right and stops at the first segment
//! that is not `key:value` shaped, or at `next`, which swallows the remainder
//! of the path verbatim.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Keys understood by the directive parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKey {
    Redir,
    Next,
    Disconnect,
    HangOn,
    Timeout,
    Delay,
}

impl DirectiveKey {
    /// Looks up a key by its path spelling (case-sensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "redir" => Some(DirectiveKey::Redir),
            "next" => Some(DirectiveKey::Next),
            "disconnect" => Some(DirectiveKey::Disconnect),
            "hangon" => Some(DirectiveKey::HangOn),
            "timeout" => Some(DirectiveKey::Timeout),
            "delay" => Some(DirectiveKey::Delay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKey::Redir => "redir",
            DirectiveKey::Next => "next",
            DirectiveKey::Disconnect => "disconnect",
            DirectiveKey::HangOn => "hangon",
            DirectiveKey::Timeout => "timeout",
            DirectiveKey::Delay => "delay",
        }
    }
}

/// Protocol state a connection can be told to freeze in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangState {
    /// Freeze right after the request line, before any header is read.
    ReadHeader,
    /// Freeze once the header block is complete, without responding.
    Respond,
}

impl HangState {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read_header" => Some(HangState::ReadHeader),
            "respond" => Some(HangState::Respond),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HangState::ReadHeader => "read_header",
            HangState::Respond => "respond",
        }
    }
}

/// Redirect count that marks an endless self-redirect loop.
pub const REDIRECT_LOOP: i64 = -1;

/// A single parsed directive with its typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Remaining self-redirects; negative means loop forever.
    Redir(i64),
    /// Final redirect target, taken verbatim.
    Next(String),
    Disconnect(bool),
    HangOn(HangState),
    /// Idle timeout in seconds, 0 disables it.
    Timeout(f64),
    /// Seconds to wait before responding.
    Delay(f64),
}

impl Directive {
    pub fn key(&self) -> DirectiveKey {
        match self {
            Directive::Redir(_) => DirectiveKey::Redir,
            Directive::Next(_) => DirectiveKey::Next,
            Directive::Disconnect(_) => DirectiveKey::Disconnect,
            Directive::HangOn(_) => DirectiveKey::HangOn,
            Directive::Timeout(_) => DirectiveKey::Timeout,
            Directive::Delay(_) => DirectiveKey::Delay,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key().as_str();
        match self {
            Directive::Redir(REDIRECT_LOOP) => write!(f, "{key}:loop"),
            Directive::Redir(count) => write!(f, "{key}:{count}"),
            Directive::Next(target) => write!(f, "{key}:{target}"),
            Directive::Disconnect(flag) => write!(f, "{key}:{flag}"),
            Directive::HangOn(state) => write!(f, "{key}:{}", state.as_str()),
            Directive::Timeout(secs) | Directive::Delay(secs) => write!(f, "{key}:{secs}"),
        }
    }
}

/// Reasons a request path is rejected by the directive parser.
///
/// The `Display` text is sent back verbatim as the body of the error
/// response, so keep it short and client-readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("repeated key {0}")]
    RepeatedKey(String),

    #[error("invalid key {0}")]
    InvalidKey(String),

    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("delay longer than timeout")]
    DelayExceedsTimeout,
}

/// Ordered set of directives parsed from one request path.
///
/// Insertion order is preserved so that re-serialising a set reproduces the
/// path the client sent, apart from `next`, which always goes last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveSet {
    entries: Vec<Directive>,
}

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a request path, validating `delay` only against a `timeout`
    /// directive found in the same path.
    pub fn parse(path: &str) -> Result<Self, DirectiveError> {
        Self::parse_with_timeout(path, None)
    }

    /// Parses a request path.
    ///
    /// `default_timeout` is the server-wide idle timeout; it bounds `delay`
    /// when the path carries no `timeout` of its own.
    pub fn parse_with_timeout(
        path: &str,
        default_timeout: Option<Duration>,
    ) -> Result<Self, DirectiveError> {
        let mut set = DirectiveSet::new();
        let mut seen: Vec<DirectiveKey> = Vec::new();
        let mut rest = path;

        while let Some((raw_key, value, tail)) = split_segment(rest) {
            let key = DirectiveKey::from_str(raw_key)
                .ok_or_else(|| DirectiveError::InvalidKey(raw_key.to_string()))?;

            if seen.contains(&key) {
                return Err(DirectiveError::RepeatedKey(raw_key.to_string()));
            }
            seen.push(key);

            if key == DirectiveKey::Next {
                // Everything after "next:" is the target, slashes included.
                let target = &rest[1 + raw_key.len() + 1..];
                set.entries.push(Directive::Next(target.to_string()));
                break;
            }

            match key {
                DirectiveKey::Redir => {
                    let count = parse_redir(value)?;
                    // Zero means "no redirect" and is not kept.
                    if count != 0 {
                        set.entries.push(Directive::Redir(count));
                    }
                }
                DirectiveKey::Disconnect => {
                    set.entries.push(Directive::Disconnect(!matches!(value, "false" | "0")));
                }
                DirectiveKey::HangOn => {
                    let state = HangState::from_str(value)
                        .ok_or_else(|| invalid_value(key, value))?;
                    set.entries.push(Directive::HangOn(state));
                }
                DirectiveKey::Timeout => {
                    set.entries.push(Directive::Timeout(parse_seconds(key, value)?));
                }
                DirectiveKey::Delay => {
                    set.entries.push(Directive::Delay(parse_seconds(key, value)?));
                }
                DirectiveKey::Next => unreachable!("handled above"),
            }

            rest = tail;
        }

        if let Some(delay) = set.delay() {
            let limit = match set.timeout() {
                Some(timeout) => non_zero(timeout),
                None => default_timeout.and_then(non_zero),
            };
            if limit.is_some_and(|limit| delay > limit) {
                return Err(DirectiveError::DelayExceedsTimeout);
            }
        }

        Ok(set)
    }

    /// Rebuilds a `/key:value/...` path, with `next` placed last.
    ///
    /// An empty set serialises to `/` so the result is always a usable
    /// request target.
    pub fn serialize(&self) -> String {
        let mut path = String::new();
        for directive in self.entries.iter().filter(|d| d.key() != DirectiveKey::Next) {
            path.push('/');
            path.push_str(&directive.to_string());
        }
        if let Some(target) = self.next() {
            path.push_str("/next:");
            path.push_str(target);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    pub fn get(&self, key: DirectiveKey) -> Option<&Directive> {
        self.entries.iter().find(|d| d.key() == key)
    }

    pub fn contains(&self, key: DirectiveKey) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces a directive, keeping the position of a replaced one.
    pub fn set(&mut self, directive: Directive) {
        match self.entries.iter_mut().find(|d| d.key() == directive.key()) {
            Some(slot) => *slot = directive,
            None => self.entries.push(directive),
        }
    }

    pub fn remove(&mut self, key: DirectiveKey) -> Option<Directive> {
        let index = self.entries.iter().position(|d| d.key() == key)?;
        Some(self.entries.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn redir(&self) -> Option<i64> {
        match self.get(DirectiveKey::Redir) {
            Some(Directive::Redir(count)) => Some(*count),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<&str> {
        match self.get(DirectiveKey::Next) {
            Some(Directive::Next(target)) => Some(target),
            _ => None,
        }
    }

    pub fn disconnect(&self) -> Option<bool> {
        match self.get(DirectiveKey::Disconnect) {
            Some(Directive::Disconnect(flag)) => Some(*flag),
            _ => None,
        }
    }

    pub fn hang_on(&self) -> Option<HangState> {
        match self.get(DirectiveKey::HangOn) {
            Some(Directive::HangOn(state)) => Some(*state),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.get(DirectiveKey::Timeout) {
            Some(Directive::Timeout(secs)) => Duration::try_from_secs_f64(*secs).ok(),
            _ => None,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self.get(DirectiveKey::Delay) {
            Some(Directive::Delay(secs)) => Duration::try_from_secs_f64(*secs).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for DirectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Splits `/key:value[/tail]` into its parts.
///
/// Returns `None` once the path no longer starts with a well-formed segment;
/// the key must be non-empty ASCII alphanumerics.
fn split_segment(path: &str) -> Option<(&str, &str, &str)> {
    let body = path.strip_prefix('/')?;
    let (key, after) = body.split_once(':')?;
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    match after.find('/') {
        Some(i) => Some((key, &after[..i], &after[i..])),
        None => Some((key, after, "")),
    }
}

fn parse_redir(value: &str) -> Result<i64, DirectiveError> {
    match value {
        "true" => Ok(1),
        "false" => Ok(0),
        "loop" => Ok(REDIRECT_LOOP),
        _ => value
            .parse::<i64>()
            .map_err(|_| invalid_value(DirectiveKey::Redir, value)),
    }
}

fn parse_seconds(key: DirectiveKey, value: &str) -> Result<f64, DirectiveError> {
    let secs = value
        .parse::<f64>()
        .map_err(|_| invalid_value(key, value))?;
    if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(invalid_value(key, value));
    }
    Ok(secs)
}

fn invalid_value(key: DirectiveKey, value: &str) -> DirectiveError {
    DirectiveError::InvalidValue {
        key: key.as_str(),
        value: value.to_string(),
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}
