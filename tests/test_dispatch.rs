//! Tests for response dispatch

use std::sync::Arc;

use badhttpd::config::Config;
use badhttpd::http::directive::{DirectiveKey, DirectiveSet};
use badhttpd::http::dispatch::{Dispatch, DispatchError, redirect_target, respond};
use badhttpd::http::record::{ConnectionRecord, LineAction};
use badhttpd::http::response::StatusCode;
use badhttpd::server::registry::Activity;
use tokio::time::Instant;

const FALLBACK: &str = "127.0.0.1:8051";

/// Feeds a request through a fresh record and dispatches it.
fn request(lines: &[&str]) -> Dispatch {
    let now = Instant::now();
    let mut rec = ConnectionRecord::new(Arc::new(Activity::new(now)), &Config::default());

    let mut last = LineAction::Continue;
    for line in lines {
        last = rec.on_line(line, now);
    }
    assert!(matches!(last, LineAction::Dispatch { .. }), "{last:?}");

    respond(&mut rec, FALLBACK, now)
}

fn location(dispatch: &Dispatch) -> String {
    match dispatch {
        Dispatch::Redirect(response) => {
            assert_eq!(response.status, StatusCode::Found);
            response.header("Location").unwrap().to_string()
        }
        other => panic!("expected redirect, got {other:?}"),
    }
}

fn error_body(dispatch: &Dispatch) -> String {
    match dispatch {
        Dispatch::Error(response) => {
            assert_eq!(response.status, StatusCode::InternalServerError);
            String::from_utf8(response.body.clone()).unwrap()
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn test_next_redirects_verbatim() {
    let dispatch = request(&["GET /next:/some/where?x=1 HTTP/1.1", "Host: x", ""]);
    assert_eq!(location(&dispatch), "http://x/some/where?x=1");
}

#[test]
fn test_redirect_uses_fallback_host() {
    let dispatch = request(&["GET /next:/y HTTP/1.1", ""]);
    assert_eq!(location(&dispatch), "http://127.0.0.1:8051/y");
}

#[test]
fn test_next_wins_over_finite_redir() {
    let dispatch = request(&["GET /redir:3/next:/foo HTTP/1.1", "Host: x", ""]);
    assert_eq!(location(&dispatch), "http://x/foo");
}

#[test]
fn test_infinite_redir_with_next_is_error() {
    let dispatch = request(&["GET /redir:loop/next:/foo HTTP/1.1", ""]);
    assert_eq!(error_body(&dispatch), "infinite redirect and 'next' do not mix\r\n");
}

#[test]
fn test_redir_loop_never_ends() {
    for _ in 0..3 {
        let dispatch = request(&["GET /redir:loop HTTP/1.1", "Host: x", ""]);
        assert_eq!(location(&dispatch), "http://x/redir:loop");
    }
}

#[test]
fn test_redir_chain_terminates() {
    let first = request(&["GET /redir:2 HTTP/1.1", "Host: x", ""]);
    assert_eq!(location(&first), "http://x/redir:1");

    let second = request(&["GET /redir:1 HTTP/1.1", "Host: x", ""]);
    assert_eq!(location(&second), "http://x/");

    let third = request(&["GET / HTTP/1.1", "Host: x", ""]);
    assert_eq!(third, Dispatch::Hang);
}

#[test]
fn test_redir_keeps_other_directives() {
    let dispatch = request(&["GET /redir:3/timeout:9/next:/end HTTP/1.1", "Host: x", ""]);
    // next wins, so the count is untouched
    assert_eq!(location(&dispatch), "http://x/end");

    let dispatch = request(&["GET /timeout:9/redir:3/delay:1 HTTP/1.1", "Host: x", ""]);
    assert_eq!(location(&dispatch), "http://x/timeout:9/redir:2/delay:1");
}

#[test]
fn test_deferred_parse_error_wins() {
    let dispatch = request(&["GET /timeout:5/timeout:6/next:/x HTTP/1.1", ""]);
    assert_eq!(error_body(&dispatch), "repeated key timeout\r\n");

    let dispatch = request(&["GET /delay:10/timeout:5 HTTP/1.1", ""]);
    assert_eq!(error_body(&dispatch), "delay longer than timeout\r\n");
}

#[test]
fn test_empty_next_is_invalid_destination() {
    let dispatch = request(&["GET /next: HTTP/1.1", ""]);
    assert_eq!(error_body(&dispatch), "invalid destination\r\n");
}

#[test]
fn test_next_without_leading_slash_is_invalid_destination() {
    let dispatch = request(&["GET /next:foo HTTP/1.1", "Host: x", ""]);
    assert_eq!(error_body(&dispatch), "invalid destination\r\n");

    let dispatch = request(&["GET /next:evil.example/path HTTP/1.1", "Host: x", ""]);
    assert_eq!(error_body(&dispatch), "invalid destination\r\n");
}

#[test]
fn test_host_header_any_case_last_wins() {
    let dispatch = request(&["GET /next:/a HTTP/1.1", "Host: first", "host: second", ""]);
    assert_eq!(location(&dispatch), "http://second/a");

    let dispatch = request(&["GET /next:/a HTTP/1.1", "host: first", "HOST: third", ""]);
    assert_eq!(location(&dispatch), "http://third/a");
}

#[test]
fn test_no_redirect_directives_hang() {
    let dispatch = request(&["GET /timeout:5 HTTP/1.1", ""]);
    assert_eq!(dispatch, Dispatch::Hang);
    assert!(dispatch.response().is_none());
}

#[test]
fn test_redirect_target_decrements() {
    let mut set = DirectiveSet::parse("/redir:3").unwrap();

    assert_eq!(redirect_target(&mut set), Ok(Some("/redir:2".to_string())));
    assert_eq!(set.redir(), Some(2));
    assert_eq!(redirect_target(&mut set), Ok(Some("/redir:1".to_string())));
    assert_eq!(redirect_target(&mut set), Ok(Some("/".to_string())));
    assert!(!set.contains(DirectiveKey::Redir));
    assert_eq!(redirect_target(&mut set), Ok(None));
}

#[test]
fn test_redirect_target_negative_with_next() {
    let mut set = DirectiveSet::parse("/redir:-2/next:/a").unwrap();
    assert_eq!(
        redirect_target(&mut set),
        Err(DispatchError::InfiniteRedirectWithNext)
    );
}

#[test]
fn test_dispatch_updates_activity() {
    let start = Instant::now();
    let mut rec = ConnectionRecord::new(Arc::new(Activity::new(start)), &Config::default());
    rec.on_line("GET /next:/a HTTP/1.1", start);
    rec.on_line("", start);

    let later = start + std::time::Duration::from_secs(2);
    respond(&mut rec, FALLBACK, later);
    assert_eq!(rec.last_activity(), later);
}
