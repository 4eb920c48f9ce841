//! Response dispatch
//!
//! Once a request's header block is complete the dispatcher decides the one
//! thing that happens next:
//!
//! 1. a directive parse error was recorded: 500 with the error text
//! 2. `redir` is negative (endless loop) and `next` is present: 500
//! 3. `next` is present: 302 to it, verbatim (it must start with `/`)
//! 4. `redir` is present: 302 back to ourselves with the count decremented
//!    (or kept, for an endless loop)
//! 5. otherwise nothing is sent and the connection keeps hanging
//!
//! Every response closes the connection.

use thiserror::Error;
use tokio::time::Instant;

use crate::http::directive::{Directive, DirectiveKey, DirectiveSet};
use crate::http::record::ConnectionRecord;
use crate::http::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("infinite redirect and 'next' do not mix")]
    InfiniteRedirectWithNext,

    #[error("invalid destination")]
    InvalidDestination,
}

/// Outcome of [`respond`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Error(Response),
    Redirect(Response),
    /// Nothing to send; the connection keeps hanging
    Hang,
}

impl Dispatch {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Dispatch::Error(response) | Dispatch::Redirect(response) => Some(response),
            Dispatch::Hang => None,
        }
    }
}

/// Decides and builds the response for a connection whose headers are done.
///
/// `fallback_host` is used for the `Location` header when the client sent
/// no `Host`. The record's directives are updated in place when a redirect
/// count is consumed.
pub fn respond(record: &mut ConnectionRecord, fallback_host: &str, now: Instant) -> Dispatch {
    record.touch(now);

    if let Some(error) = &record.parse_error {
        return Dispatch::Error(Response::server_error(error.to_string()));
    }

    let destination = match redirect_target(&mut record.directives) {
        Ok(Some(destination)) => destination,
        Ok(None) => {
            tracing::debug!("Nothing to dispatch, hanging");
            return Dispatch::Hang;
        }
        Err(e) => return Dispatch::Error(Response::server_error(e.to_string())),
    };

    // Targets are appended to the host, so anything not rooted at `/`
    // would name a different host.
    if !destination.starts_with('/') {
        return Dispatch::Error(Response::server_error(
            DispatchError::InvalidDestination.to_string(),
        ));
    }

    let host = record.header("Host").unwrap_or(fallback_host);
    let location = format!("http://{host}{destination}");
    tracing::debug!(%location, "Redirecting");

    Dispatch::Redirect(Response::redirect(location))
}

/// Works out where to redirect, consuming one step of a finite `redir`.
///
/// Returns `Ok(None)` when the directives ask for no redirect at all.
pub fn redirect_target(directives: &mut DirectiveSet) -> Result<Option<String>, DispatchError> {
    let redir = directives.redir();

    if let Some(next) = directives.next() {
        if redir.is_some_and(|count| count < 0) {
            return Err(DispatchError::InfiniteRedirectWithNext);
        }
        return Ok(Some(next.to_string()));
    }

    match redir {
        None => Ok(None),
        Some(count) if count < 0 => Ok(Some(directives.serialize())),
        Some(count) if count - 1 <= 0 => {
            directives.remove(DirectiveKey::Redir);
            Ok(Some(directives.serialize()))
        }
        Some(count) => {
            directives.set(Directive::Redir(count - 1));
            Ok(Some(directives.serialize()))
        }
    }
}
