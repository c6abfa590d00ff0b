use super::*;
use crate::error::GateError;

fn tag(payload: &str) -> String {
    format!("{TOOL_CALL_OPEN}{payload}{TOOL_CALL_CLOSE}")
}

// -- whole-string extraction --------------------------------------------

#[test]
fn extracts_single_call() {
    let text = format!("Let me check.\n{}\nDone.", tag(r#"{"name":"ping","arguments":{}}"#));
    let extraction = extract(&text).unwrap();
    assert_eq!(extraction.invocations.len(), 1);
    assert_eq!(extraction.invocations[0].tool, "ping");
    assert!(extraction.invocations[0].args.is_empty());
    assert_eq!(extraction.remaining, "Let me check.\n\nDone.".trim());
    assert!(extraction.invocations[0].meta.confidence.is_none());
    assert_eq!(extraction.invocations[0].meta.parser, ParserKind::Embedding);
}

#[test]
fn extracts_multiple_calls_in_source_order() {
    let text = format!(
        "a {} b {} c",
        tag(r#"{"name":"first","arguments":{"n":1}}"#),
        tag(r#"{"name":"second"}"#),
    );
    let extraction = extract(&text).unwrap();
    assert_eq!(extraction.invocations.len(), 2);
    assert_eq!(extraction.invocations[0].tool, "first");
    assert_eq!(extraction.invocations[0].args["n"], 1);
    assert_eq!(extraction.invocations[1].tool, "second");
    assert_eq!(extraction.remaining, "a  b  c".trim());
    assert!(!extraction.remaining.contains(TOOL_CALL_OPEN));
}

#[test]
fn tolerates_multiline_payload_and_whitespace() {
    let text = format!(
        "{}\n  {{\n    \"name\": \"file.read\",\n    \"arguments\": {{\"path\": \"a.txt\"}}\n  }}\n{}",
        TOOL_CALL_OPEN, TOOL_CALL_CLOSE
    );
    let extraction = extract(&text).unwrap();
    assert_eq!(extraction.invocations.len(), 1);
    assert_eq!(extraction.invocations[0].tool, "file.read");
    assert_eq!(extraction.invocations[0].args["path"], "a.txt");
    assert!(extraction.remaining.is_empty());
}

#[test]
fn null_arguments_become_empty() {
    let text = tag(r#"{"name":"ping","arguments":null}"#);
    let extraction = extract(&text).unwrap();
    assert!(extraction.invocations[0].args.is_empty());
}

#[test]
fn invalid_json_payload_is_malformed() {
    let bad = tag("{not json");
    let text = format!("prefix {bad} suffix");
    let err = extract(&text).unwrap_err();
    match err {
        GateError::MalformedToolCall { raw } => assert_eq!(raw, bad),
    }
}

#[test]
fn missing_name_is_malformed() {
    let bad = tag(r#"{"arguments":{}}"#);
    let err = extract(&bad).unwrap_err();
    match err {
        GateError::MalformedToolCall { raw } => assert_eq!(raw, bad),
    }
}

#[test]
fn empty_name_is_malformed() {
    assert!(extract(&tag(r#"{"name":"  "}"#)).is_err());
}

#[test]
fn non_object_arguments_is_malformed() {
    assert!(extract(&tag(r#"{"name":"x","arguments":[1,2]}"#)).is_err());
}

#[test]
fn unterminated_tag_stays_in_remainder() {
    let text = format!("hello {TOOL_CALL_OPEN}{{\"name\":\"pi");
    let extraction = extract(&text).unwrap();
    assert!(extraction.invocations.is_empty());
    assert_eq!(extraction.remaining, text.trim());
}

#[test]
fn plain_text_passes_through() {
    let extraction = extract("no calls here, just prose").unwrap();
    assert!(extraction.invocations.is_empty());
    assert_eq!(extraction.remaining, "no calls here, just prose");
}

// -- streaming ----------------------------------------------------------

#[test]
fn feed_split_at_arbitrary_offset_matches_whole_feed() {
    let whole = format!("preamble {}", tag(r#"{"name":"ping","arguments":{"n":1}}"#));

    for split in 1..whole.len() {
        let mut streaming = StreamingExtractor::new();
        let first = streaming.feed(&whole[..split]).unwrap();
        let second = streaming.feed(&whole[split..]).unwrap();

        let mut found = first.invocations;
        found.extend(second.invocations);
        assert_eq!(found.len(), 1, "split at byte {split}");
        assert_eq!(found[0].tool, "ping");
        assert_eq!(found[0].args["n"], 1);
    }
}

#[test]
fn feed_returns_only_newly_found_invocations() {
    let mut streaming = StreamingExtractor::new();
    let first = streaming
        .feed(&tag(r#"{"name":"a"}"#))
        .unwrap();
    assert_eq!(first.invocations.len(), 1);

    let second = streaming
        .feed(&tag(r#"{"name":"b"}"#))
        .unwrap();
    assert_eq!(second.invocations.len(), 1);
    assert_eq!(second.invocations[0].tool, "b");
}

#[test]
fn partial_tag_is_preserved_across_feeds() {
    let mut streaming = StreamingExtractor::new();
    let outcome = streaming
        .feed(&format!("{} text {TOOL_CALL_OPEN}{{\"na", tag(r#"{"name":"a"}"#)))
        .unwrap();
    assert_eq!(outcome.invocations.len(), 1);
    assert!(streaming.pending_len() > 0);

    let outcome = streaming
        .feed(&format!("me\":\"b\"}}{TOOL_CALL_CLOSE}"))
        .unwrap();
    assert_eq!(outcome.invocations.len(), 1);
    assert_eq!(outcome.invocations[0].tool, "b");
}

#[test]
fn flush_returns_trailing_invocations_and_text() {
    let mut streaming = StreamingExtractor::new();
    streaming.feed("unfinished prose and ").unwrap();
    streaming.feed(&tag(r#"{"name":"late"}"#)).unwrap();
    streaming.feed("trailing words").unwrap();

    let (invocations, remaining) = streaming.flush().unwrap();
    assert!(invocations.is_empty());
    assert_eq!(remaining, "unfinished prose and trailing words");
    assert_eq!(streaming.pending_len(), 0);
}

#[test]
fn flush_completes_a_buffered_call() {
    let mut streaming = StreamingExtractor::new();
    let text = tag(r#"{"name":"x"}"#);
    let (head, tail) = text.split_at(text.len() / 2);
    streaming.feed(head).unwrap();
    let outcome = streaming.feed(tail).unwrap();
    assert_eq!(outcome.invocations.len(), 1);

    let (invocations, remaining) = streaming.flush().unwrap();
    assert!(invocations.is_empty());
    assert!(remaining.is_empty());
}

#[test]
fn malformed_payload_fails_the_feed() {
    let mut streaming = StreamingExtractor::new();
    let err = streaming.feed(&tag("{broken")).unwrap_err();
    assert!(matches!(err, GateError::MalformedToolCall { .. }));
}

#[test]
fn overflow_releases_buffer_as_plain_text() {
    let mut streaming = StreamingExtractor::with_max_buffer(64);
    let big = "x".repeat(128);
    let outcome = streaming.feed(&big).unwrap();
    assert!(outcome.invocations.is_empty());
    assert_eq!(outcome.overflow.as_deref(), Some(big.as_str()));
    assert_eq!(streaming.pending_len(), 0);
}
