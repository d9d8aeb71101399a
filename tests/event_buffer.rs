mod common;

use beacon::kernel::telemetry::buffer::{Identity, HEADER};
use beacon::error::BufferError;
use beacon::ParamValue;
use common::{buffer, event_list, field, fixed_time, parse, parse_raw};

fn write_event(b: &mut beacon::kernel::telemetry::EventBuffer, name: &str, params: &[(&str, ParamValue)]) {
    b.begin_event(name, &fixed_time(), None, false).unwrap();
    for (key, value) in params {
        b.push_scalar(value, Some(*key)).unwrap();
    }
    b.end_event().unwrap();
}

#[test]
fn test_n_events_serialize_to_one_valid_document() {
    for n in [1usize, 2, 7, 50] {
        let mut b = buffer();
        for i in 0..n {
            write_event(
                &mut b,
                &format!("e{}", i),
                &[
                    ("f32", ParamValue::F32(0.5)),
                    ("f64", ParamValue::F64(-1.25e-3)),
                    ("i32", ParamValue::I32(i as i32)),
                    ("i64", ParamValue::I64(i64::MIN)),
                    ("s", ParamValue::Str("x".into())),
                    ("b", ParamValue::Bool(i % 2 == 0)),
                ],
            );
        }

        let doc = parse(&b.snapshot().unwrap().serialize());
        let list = event_list(&doc);
        assert_eq!(list.len(), n);
        assert_eq!(list[0]["eventParams"]["i64"], serde_json::json!(i64::MIN));
        assert_eq!(list[0]["eventParams"]["f64"], serde_json::json!(-0.00125));
        assert_eq!(list[n - 1]["eventName"], format!("e{}", n - 1));
    }
}

#[test]
fn test_zero_events_snapshot_is_none_and_harmless() {
    let mut b = buffer();
    assert!(b.snapshot().is_none());
    assert!(b.checkout().is_none());
    assert_eq!(b.raw_contents(), HEADER);
    assert_eq!(b.events_recorded(), 0);

    // An event still being written does not count.
    b.begin_event("open", &fixed_time(), None, false).unwrap();
    assert!(b.snapshot().is_none());
    b.end_event().unwrap();
    assert!(b.snapshot().is_some());
}

#[test]
fn test_repeated_snapshots_are_equivalent() {
    let mut b = buffer();
    write_event(&mut b, "a", &[("n", ParamValue::I32(1))]);
    write_event(&mut b, "b", &[]);

    let first = b.snapshot().unwrap();
    let second = b.snapshot().unwrap();
    assert_eq!(first.serialize(), second.serialize());
    assert_eq!(b.events_recorded(), 2);

    // Writing continues seamlessly after a snapshot.
    write_event(&mut b, "c", &[]);
    let doc = parse(&b.snapshot().unwrap().serialize());
    assert_eq!(field(&doc, "eventName"), ["a", "b", "c"]);
}

#[test]
fn test_hostile_strings_round_trip() {
    let nasty = "quote \" backslash \\ newline \n tab \t nul \u{0} bell \u{7} unicode é 🚀 end";
    let mut b = buffer();
    b.set_identity(Identity {
        user_id: "user\"with\\quotes".into(),
        session_id: "s".into(),
        install_id: "i\n".into(),
        player_id: Some("p".into()),
    });
    b.begin_event("weird\"name", &fixed_time(), Some(3), true).unwrap();
    b.push_str(nasty, Some("key \"with\" quotes")).unwrap();
    b.end_event().unwrap();

    let doc = parse(&b.snapshot().unwrap().serialize());
    let event = &event_list(&doc)[0];
    assert_eq!(event["eventName"], "weird\"name");
    assert_eq!(event["userID"], "user\"with\\quotes");
    assert_eq!(event["unityInstallationID"], "i\n");
    assert_eq!(event["unityPlayerID"], "p");
    assert_eq!(event["eventVersion"], 3);
    assert_eq!(event["eventParams"]["key \"with\" quotes"], nasty);
}

#[test]
fn test_envelope_fields_and_timestamp_format() {
    let mut b = buffer();
    b.set_identity(Identity {
        user_id: "u1".into(),
        session_id: "s1".into(),
        install_id: "i1".into(),
        player_id: Some(String::new()),
    });
    b.begin_event("start", &fixed_time(), None, true).unwrap();
    b.end_event().unwrap();
    b.begin_event("plain", &fixed_time(), None, false).unwrap();
    b.end_event().unwrap();

    let doc = parse(&b.snapshot().unwrap().serialize());
    let list = event_list(&doc);
    assert_eq!(list[0]["eventTimestamp"], "2024-05-17 09:15:00.000 +00:00");
    assert_eq!(list[0]["sessionID"], "s1");
    assert_eq!(list[0]["unityInstallationID"], "i1");
    assert!(list[0].get("unityPlayerID").is_none(), "empty player id is omitted");
    assert!(list[0].get("eventVersion").is_none());
    assert!(list[1].get("unityInstallationID").is_none());
    assert_ne!(list[0]["eventUUID"], list[1]["eventUUID"]);
}

#[test]
fn test_non_finite_floats_keep_document_valid() {
    let mut b = buffer();
    write_event(
        &mut b,
        "floats",
        &[
            ("nan", ParamValue::F64(f64::NAN)),
            ("neg_inf", ParamValue::F32(f32::NEG_INFINITY)),
        ],
    );
    let doc = parse(&b.snapshot().unwrap().serialize());
    let params = &event_list(&doc)[0]["eventParams"];
    assert!(params["nan"].is_null());
    assert!(params["neg_inf"].is_null());
}

#[test]
fn test_checkout_merge_preserves_order_without_duplicates() {
    let mut b = buffer();
    write_event(&mut b, "old1", &[]);
    write_event(&mut b, "old2", &[]);

    let token = b.checkout().unwrap();
    assert_eq!(token.event_count(), 2);
    assert_eq!(b.events_recorded(), 0);

    write_event(&mut b, "new1", &[]);
    let in_flight = parse(&token.serialize());
    assert_eq!(field(&in_flight, "eventName"), ["old1", "old2"]);

    b.merge(token);
    assert_eq!(b.events_recorded(), 3);
    let doc = parse_raw(&b.raw_contents());
    assert_eq!(field(&doc, "eventName"), ["old1", "old2", "new1"]);
}

#[test]
fn test_clear_resets_to_header() {
    let mut b = buffer();
    write_event(&mut b, "a", &[]);
    b.begin_event("half", &fixed_time(), None, false).unwrap();
    b.clear();
    assert_eq!(b.raw_contents(), HEADER);
    assert_eq!(b.len(), HEADER.len());
    assert_eq!(b.events_recorded(), 0);
    assert!(!b.is_event_open());
}

#[test]
fn test_restore_counts_events_exactly_and_goes_first() {
    let mut source = buffer();
    for name in ["c1", "c2", "c3"] {
        write_event(&mut source, name, &[("s", ParamValue::Str("a,b".into()))]);
    }
    let image = source.raw_contents();

    let mut b = buffer();
    write_event(&mut b, "live", &[]);
    assert_eq!(b.restore(&image), Ok(3));
    assert_eq!(b.events_recorded(), 4);

    let doc = parse_raw(&b.raw_contents());
    assert_eq!(field(&doc, "eventName"), ["c1", "c2", "c3", "live"]);
}

#[test]
fn test_nested_timestamp_fields_use_collect_format() {
    let mut b = buffer();
    b.begin_event("match", &fixed_time(), None, false).unwrap();
    b.push_object_start(Some("window")).unwrap();
    b.push_timestamp(&fixed_time(), "from").unwrap();
    b.push_timestamp(&(fixed_time() + chrono::Duration::milliseconds(1500)), "to")
        .unwrap();
    b.push_object_end().unwrap();
    b.end_event().unwrap();

    let doc = parse(&b.snapshot().unwrap().serialize());
    let window = &event_list(&doc)[0]["eventParams"]["window"];
    assert_eq!(window["from"], "2024-05-17 09:15:00.000 +00:00");
    assert_eq!(window["to"], "2024-05-17 09:15:01.500 +00:00");
}

#[test]
fn test_misplaced_keys_are_refused_and_batch_stays_valid() {
    let mut b = buffer();
    b.begin_event("shape", &fixed_time(), None, false).unwrap();

    // 1. eventParams is an object: bare values are refused
    assert_eq!(b.push_i32(5, None), Err(BufferError::KeyRequired));

    // 2. Arrays take bare elements only
    b.push_array_start("a").unwrap();
    assert_eq!(b.push_i32(1, Some("k")), Err(BufferError::UnexpectedKey("k".to_string())));
    assert_eq!(
        b.push_timestamp(&fixed_time(), "at"),
        Err(BufferError::UnexpectedKey("at".to_string()))
    );
    assert_eq!(b.push_array_start("inner"), Err(BufferError::UnexpectedKey("inner".to_string())));
    b.push_i32(1, None).unwrap();

    // 3. Objects nested in arrays need keys again
    b.push_object_start(None).unwrap();
    assert_eq!(b.push_str("x", None), Err(BufferError::KeyRequired));
    assert_eq!(b.push_object_start(None), Err(BufferError::KeyRequired));
    b.push_str("x", Some("k")).unwrap();
    b.push_object_end().unwrap();
    b.push_array_end().unwrap();
    b.end_event().unwrap();

    let doc = parse(&b.snapshot().unwrap().serialize());
    assert_eq!(
        event_list(&doc)[0]["eventParams"],
        serde_json::json!({ "a": [1, { "k": "x" }] })
    );
}
