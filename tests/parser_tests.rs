//! Tests for SSE decoding and event payload normalisation

use market_monitor::{
    connection::{SseDecoder, SseFrame, MAX_LINE_BYTES},
    data::DataType,
    error::ParseError,
    events::StreamEvent,
    parser::{EventDecoder, JsonEventDecoder},
};
use rust_decimal_macros::dec;
use std::time::Duration;

fn decode(event: &str, data: &str) -> Result<Option<StreamEvent>, ParseError> {
    JsonEventDecoder::new().decode(&SseFrame::new(event, data))
}

#[test]
fn test_sse_single_event() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b"event: heartbeat\ndata: {}\n\n");

    assert_eq!(frames, vec![SseFrame::new("heartbeat", "{}")]);
}

#[test]
fn test_sse_default_event_name_is_message() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b"data: hello\n\n");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "message");
    assert_eq!(frames[0].data, "hello");
}

#[test]
fn test_sse_multiline_data_and_crlf() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b"event: error\r\ndata: line one\r\ndata: line two\r\n\r\n");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "error");
    assert_eq!(frames[0].data, "line one\nline two");
}

#[test]
fn test_sse_chunks_split_anywhere() {
    let payload = "event: market_data\ndata: {\"symbol\":\"恒生\"}\n\n".as_bytes();
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();

    for chunk in payload.chunks(3) {
        frames.extend(decoder.feed(chunk));
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "{\"symbol\":\"恒生\"}");
}

#[test]
fn test_sse_comments_and_empty_events_are_skipped() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b": keep-alive\n\nevent: connected\n\ndata: x\n\n");

    // The `connected` block carried no data and is not dispatched; its event
    // name does not leak into the next block
    assert_eq!(frames, vec![SseFrame::new("message", "x")]);
}

#[test]
fn test_sse_lone_carriage_return_ends_lines() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b"event: heartbeat\rdata: {}\r\r");

    assert_eq!(frames, vec![SseFrame::new("heartbeat", "{}")]);
}

#[test]
fn test_sse_crlf_split_across_chunks() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.feed(b"data: a\r").is_empty());
    assert!(decoder.feed(b"\n").is_empty());
    assert_eq!(decoder.feed(b"\r\n"), vec![SseFrame::new("message", "a")]);
}

#[test]
fn test_sse_oversized_line_is_discarded() {
    let mut decoder = SseDecoder::new();
    let mut payload = b"data: partial\ndata: ".to_vec();
    payload.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 16));
    payload.extend_from_slice(b"\n\ndata: ok\n\n");

    let frames = decoder.feed(&payload);

    assert_eq!(frames, vec![SseFrame::new("message", "ok")]);
}

#[test]
fn test_sse_id_and_retry_fields() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.feed(b"id: 42\nretry: 3000\ndata: a\n\ndata: b\n\n");

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].id.as_deref(), Some("42"));
    assert_eq!(frames[0].retry, Some(Duration::from_millis(3000)));
    assert_eq!(frames[1].id.as_deref(), Some("42"));
    assert_eq!(frames[1].retry, None);
}

#[test]
fn test_sse_incomplete_frame_waits_for_blank_line() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.feed(b"data: partial\n").is_empty());
    assert_eq!(decoder.feed(b"\n").len(), 1);
}

#[test]
fn test_decode_market_data_normalises_fields() {
    let data = r#"{
        "source": "wencai",
        "symbol": "HSI",
        "type": "kline1m",
        "price": 16500.25,
        "timestamp": "2024-03-01T09:31:00",
        "volume": 1500,
        "open_price": 16480,
        "high_price": 16510,
        "low_price": 16470,
        "close_price": 16500.25,
        "change": 20.25,
        "change_percent": 0.12
    }"#;

    let snapshot = match decode("market_data", data).expect("valid payload") {
        Some(StreamEvent::MarketData(snapshot)) => snapshot,
        other => panic!("expected market data, got {:?}", other),
    };

    assert_eq!(snapshot.source_id.as_deref(), Some("wencai"));
    assert_eq!(snapshot.market, "HSI");
    assert_eq!(snapshot.data_type, DataType::Kline1m);
    assert_eq!(snapshot.price, dec!(16500.25));
    assert_eq!(snapshot.open, Some(dec!(16480)));
    assert_eq!(snapshot.high, Some(dec!(16510)));
    assert_eq!(snapshot.low, Some(dec!(16470)));
    assert_eq!(snapshot.close, Some(dec!(16500.25)));
    assert_eq!(snapshot.change_percent, Some(dec!(0.12)));
    assert!(snapshot.timestamp.is_some());
}

#[test]
fn test_decode_market_data_minimal() {
    let event = decode("market_data", r#"{"symbol":"BTC","price":100,"type":"realtime"}"#)
        .expect("valid payload");

    match event {
        Some(StreamEvent::MarketData(snapshot)) => {
            assert_eq!(snapshot.price, dec!(100));
            assert!(snapshot.source_id.is_none());
            assert!(snapshot.volume.is_none());
            assert!(snapshot.timestamp.is_none());
        }
        other => panic!("expected market data, got {:?}", other),
    }
}

#[test]
fn test_decode_market_data_null_optionals() {
    let event = decode(
        "market_data",
        r#"{"symbol":"DJI","price":"39000.1","type":"realtime","volume":null,"change":null}"#,
    )
    .expect("valid payload");

    assert!(matches!(event, Some(StreamEvent::MarketData(s)) if s.price == dec!(39000.1)));
}

#[test]
fn test_decode_unparseable_timestamp_is_absent() {
    let event = decode(
        "market_data",
        r#"{"symbol":"BTC","price":1,"type":"realtime","timestamp":"soon"}"#,
    )
    .expect("timestamp problems are not fatal");

    assert!(matches!(event, Some(StreamEvent::MarketData(s)) if s.timestamp.is_none()));
}

#[test]
fn test_decode_rejects_missing_required_fields() {
    for (data, field) in [
        (r#"{"price":1,"type":"realtime"}"#, "symbol"),
        (r#"{"symbol":"BTC","price":1}"#, "type"),
        (r#"{"symbol":"BTC","type":"realtime"}"#, "price"),
        (r#"{"symbol":"","price":1,"type":"realtime"}"#, "symbol"),
    ] {
        match decode("market_data", data) {
            Err(ParseError::MissingField(missing)) => assert_eq!(missing, field),
            other => panic!("expected missing {}, got {:?}", field, other),
        }
    }
}

#[test]
fn test_decode_rejects_bad_json() {
    assert!(matches!(decode("market_data", "{not json"), Err(ParseError::InvalidJson(_))));
    assert!(matches!(
        decode("market_data", r#"{"symbol":"BTC","price":"abc","type":"realtime"}"#),
        Err(ParseError::InvalidJson(_))
    ));
}

#[test]
fn test_decode_acknowledgements() {
    assert_eq!(decode("connected", "{}").expect("ok"), Some(StreamEvent::Connected));
    assert_eq!(
        decode("connected", r#"{"connection_id":"sse_1"}"#).expect("ok"),
        Some(StreamEvent::Connected)
    );
    assert_eq!(decode("heartbeat", "").expect("ok"), Some(StreamEvent::Heartbeat));
    assert!(matches!(decode("heartbeat", "[1]"), Err(ParseError::MalformedMessage(_))));
}

#[test]
fn test_decode_server_error() {
    assert_eq!(
        decode("error", r#"{"message":"source offline"}"#).expect("ok"),
        Some(StreamEvent::ServerError {
            message: "source offline".to_string()
        })
    );
    assert!(matches!(
        decode("error", "{}").expect("ok"),
        Some(StreamEvent::ServerError { .. })
    ));
}

#[test]
fn test_decode_ignores_unknown_events() {
    assert_eq!(decode("message", "{}").expect("ok"), None);
    assert_eq!(decode("ping", "whatever").expect("ok"), None);
}
