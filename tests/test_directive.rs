//! Tests for the path directive codec

use badhttpd::http::directive::{
    Directive, DirectiveError, DirectiveKey, DirectiveSet, HangState, REDIRECT_LOOP,
};
use std::time::Duration;

#[test]
fn test_parse_all_keys() {
    let set = DirectiveSet::parse(
        "/redir:3/disconnect:true/hangon:respond/timeout:10/delay:2.5/next:/done",
    )
    .unwrap();

    assert_eq!(set.redir(), Some(3));
    assert_eq!(set.disconnect(), Some(true));
    assert_eq!(set.hang_on(), Some(HangState::Respond));
    assert_eq!(set.timeout(), Some(Duration::from_secs(10)));
    assert_eq!(set.delay(), Some(Duration::from_millis(2500)));
    assert_eq!(set.next(), Some("/done"));
    assert_eq!(set.len(), 6);
}

#[test]
fn test_parse_redir_tokens() {
    assert_eq!(DirectiveSet::parse("/redir:true").unwrap().redir(), Some(1));
    assert_eq!(DirectiveSet::parse("/redir:loop").unwrap().redir(), Some(REDIRECT_LOOP));
    assert_eq!(DirectiveSet::parse("/redir:-5").unwrap().redir(), Some(-5));
    assert_eq!(DirectiveSet::parse("/redir:7").unwrap().redir(), Some(7));
}

#[test]
fn test_parse_redir_zero_and_false_are_dropped() {
    let set = DirectiveSet::parse("/redir:false").unwrap();
    assert!(set.is_empty());
    assert!(!set.contains(DirectiveKey::Redir));

    let set = DirectiveSet::parse("/redir:0/timeout:3").unwrap();
    assert_eq!(set.redir(), None);
    assert_eq!(set.len(), 1);
}

#[test]
fn test_parse_invalid_redir_value() {
    let err = DirectiveSet::parse("/redir:lots").unwrap_err();
    assert_eq!(
        err,
        DirectiveError::InvalidValue {
            key: "redir",
            value: "lots".to_string()
        }
    );
    assert_eq!(err.to_string(), "invalid value for 'redir': lots");

    // Only whole counts are accepted, and an empty count is not zero.
    assert!(DirectiveSet::parse("/redir:1.5").is_err());
    assert!(DirectiveSet::parse("/redir:").is_err());
}

#[test]
fn test_parse_repeated_key() {
    let err = DirectiveSet::parse("/timeout:5/timeout:6").unwrap_err();
    assert_eq!(err, DirectiveError::RepeatedKey("timeout".to_string()));
    assert_eq!(err.to_string(), "repeated key timeout");
}

#[test]
fn test_parse_repeated_key_even_when_first_was_dropped() {
    let err = DirectiveSet::parse("/redir:0/redir:2").unwrap_err();
    assert_eq!(err, DirectiveError::RepeatedKey("redir".to_string()));
}

#[test]
fn test_parse_unknown_key() {
    let err = DirectiveSet::parse("/bogus:1").unwrap_err();
    assert_eq!(err, DirectiveError::InvalidKey("bogus".to_string()));
    assert_eq!(err.to_string(), "invalid key bogus");
}

#[test]
fn test_parse_invalid_hangon() {
    let err = DirectiveSet::parse("/hangon:forever").unwrap_err();
    assert_eq!(err.to_string(), "invalid value for 'hangon': forever");
}

#[test]
fn test_parse_invalid_numbers() {
    assert!(DirectiveSet::parse("/timeout:soon").is_err());
    assert!(DirectiveSet::parse("/timeout:-1").is_err());
    assert!(DirectiveSet::parse("/timeout:").is_err());
    assert!(DirectiveSet::parse("/delay:NaN").is_err());
    assert!(DirectiveSet::parse("/delay:inf").is_err());
}

#[test]
fn test_delay_longer_than_timeout() {
    let err = DirectiveSet::parse("/delay:10/timeout:5").unwrap_err();
    assert_eq!(err, DirectiveError::DelayExceedsTimeout);

    let err = DirectiveSet::parse("/timeout:5/delay:10").unwrap_err();
    assert_eq!(err, DirectiveError::DelayExceedsTimeout);
}

#[test]
fn test_delay_within_timeout() {
    let set = DirectiveSet::parse("/timeout:5/delay:5").unwrap();
    assert_eq!(set.delay(), Some(Duration::from_secs(5)));
}

#[test]
fn test_delay_checked_against_default_timeout() {
    let global = Some(Duration::from_secs(3));

    let err = DirectiveSet::parse_with_timeout("/delay:4", global).unwrap_err();
    assert_eq!(err, DirectiveError::DelayExceedsTimeout);

    // A directive timeout replaces the global one.
    assert!(DirectiveSet::parse_with_timeout("/delay:4/timeout:8", global).is_ok());

    // No timeout anywhere: any delay goes.
    assert!(DirectiveSet::parse_with_timeout("/delay:400", None).is_ok());
    assert!(DirectiveSet::parse_with_timeout("/delay:400/timeout:0", global).is_ok());
}

#[test]
fn test_disconnect_values() {
    assert_eq!(DirectiveSet::parse("/disconnect:").unwrap().disconnect(), Some(true));
    assert_eq!(DirectiveSet::parse("/disconnect:yes").unwrap().disconnect(), Some(true));
    assert_eq!(DirectiveSet::parse("/disconnect:false").unwrap().disconnect(), Some(false));
}

#[test]
fn test_parsing_stops_at_plain_segment() {
    let set = DirectiveSet::parse("/timeout:5/favicon.ico/bogus:1").unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.timeout(), Some(Duration::from_secs(5)));
}

#[test]
fn test_next_stops_parsing() {
    let set = DirectiveSet::parse("/next:/a/timeout:5/timeout:6").unwrap();
    assert_eq!(set.next(), Some("/a/timeout:5/timeout:6"));
    assert_eq!(set.timeout(), None);
}

#[test]
fn test_redir_with_next_parses_for_both_signs() {
    let finite = DirectiveSet::parse("/redir:3/next:/foo").unwrap();
    assert_eq!(finite.redir(), Some(3));
    assert_eq!(finite.next(), Some("/foo"));

    let endless = DirectiveSet::parse("/redir:loop/next:/foo").unwrap();
    assert_eq!(endless.redir(), Some(REDIRECT_LOOP));
}

#[test]
fn test_serialize_places_next_last() {
    let mut set = DirectiveSet::parse("/next:/target").unwrap();
    set.set(Directive::Timeout(4.0));
    set.set(Directive::Redir(2));

    assert_eq!(set.serialize(), "/timeout:4/redir:2/next:/target");
}

#[test]
fn test_serialize_keeps_loop_token() {
    let set = DirectiveSet::parse("/redir:loop/hangon:read_header").unwrap();
    assert_eq!(set.serialize(), "/redir:loop/hangon:read_header");
    assert_eq!(set.to_string(), set.serialize());
}

#[test]
fn test_serialize_empty_set_is_root() {
    assert_eq!(DirectiveSet::new().serialize(), "/");
}

#[test]
fn test_round_trip() {
    let paths = [
        "/redir:3",
        "/redir:loop/timeout:2.5",
        "/disconnect:false/hangon:respond",
        "/timeout:10/delay:1/next:/x/y",
        "/redir:-4/next:",
    ];

    for path in paths {
        let set = DirectiveSet::parse(path).unwrap();
        assert_eq!(DirectiveSet::parse(&set.serialize()).unwrap(), set, "{path}");
    }
}

#[test]
fn test_set_replaces_in_place() {
    let mut set = DirectiveSet::parse("/redir:3/timeout:5").unwrap();
    set.set(Directive::Redir(2));

    assert_eq!(set.serialize(), "/redir:2/timeout:5");
    assert_eq!(set.remove(DirectiveKey::Redir), Some(Directive::Redir(2)));
    assert_eq!(set.serialize(), "/timeout:5");
}
