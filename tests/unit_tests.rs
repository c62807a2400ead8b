//! Unit tests for individual modules

use market_monitor::{
    data::*,
    error::*,
    events::*,
    filter::*,
    format::*,
    state::*,
};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

// Test FilterState
#[test]
fn test_filter_starts_unrestricted() {
    let filters = FilterState::new();
    for dimension in FilterDimension::EVERY {
        let selection = filters.active_selections(dimension);
        assert!(selection.is_all());
        assert_eq!(selection.members().collect::<Vec<_>>(), vec![ALL]);
    }
    assert!(filters.selection().query_pairs().is_empty());
}

#[test]
fn test_filter_toggle_concrete_drops_all() {
    let mut filters = FilterState::new();

    let selection = filters.toggle(FilterDimension::Source, "wencai");
    assert!(!selection.is_all());
    assert_eq!(selection.members().collect::<Vec<_>>(), vec!["wencai"]);
}

#[test]
fn test_filter_toggle_all_is_exclusive() {
    let mut filters = FilterState::new();
    filters.toggle(FilterDimension::Market, "HSI");
    filters.toggle(FilterDimension::Market, "DJI");

    let selection = filters.toggle(FilterDimension::Market, ALL);
    assert_eq!(selection.members().collect::<Vec<_>>(), vec![ALL]);
}

#[test]
fn test_filter_last_member_off_restores_all() {
    let mut filters = FilterState::new();
    filters.toggle(FilterDimension::DataType, "realtime");

    let selection = filters.toggle(FilterDimension::DataType, "realtime");
    assert!(selection.is_all());
    assert_eq!(selection.len(), 1);
}

#[test]
fn test_filter_accepts_unknown_identifiers() {
    let mut filters = FilterState::new();
    filters.toggle(FilterDimension::Source, "does-not-exist");

    assert!(filters
        .active_selections(FilterDimension::Source)
        .contains("does-not-exist"));
}

#[test]
fn test_filter_query_pairs_are_comma_joined() {
    let mut filters = FilterState::new();
    filters.toggle(FilterDimension::Market, "HSI");
    filters.toggle(FilterDimension::Market, "DJI");
    filters.toggle(FilterDimension::DataType, "kline1m");

    let pairs = filters.selection().query_pairs();
    assert_eq!(
        pairs,
        vec![
            ("markets", "DJI,HSI".to_string()),
            ("data_types", "kline1m".to_string()),
        ]
    );
}

// Test formatting
#[test]
fn test_format_price() {
    assert_eq!(format_price(Some(dec!(16500.5))), "16,500.50");
    assert_eq!(format_price(Some(dec!(0.456))), "0.46");
    assert_eq!(format_price(Some(dec!(-1234567.891))), "-1,234,567.89");
    assert_eq!(format_price(None), "N/A");
}

#[test]
fn test_format_volume_suffixes() {
    assert_eq!(format_volume(Some(dec!(250000000))), "2.50亿");
    assert_eq!(format_volume(Some(dec!(35000))), "3.50万");
    assert_eq!(format_volume(Some(dec!(9999))), "9,999");
    assert_eq!(format_volume(Some(dec!(12.3456))), "12.346");
    assert_eq!(format_volume(None), "N/A");
}

#[test]
fn test_format_change_sign() {
    assert_eq!(format_change(Some(dec!(12.5)), Some(dec!(0.35))), "+12.50 (+0.35%)");
    assert_eq!(format_change(Some(dec!(-3)), Some(dec!(-0.1))), "-3.00 (-0.10%)");
    assert_eq!(format_change(None, None), "+0.00 (+0.00%)");
}

#[test]
fn test_trend_class() {
    assert_eq!(Trend::of(dec!(0)).css_class(), "positive");
    assert_eq!(Trend::of(dec!(-0.01)).css_class(), "negative");
}

#[test]
fn test_time_label() {
    let time = parse_timestamp("2024-03-01T09:30:05Z").expect("valid timestamp");
    assert_eq!(format_time_label(time), "09:30:05");
}

// Test data model
#[test]
fn test_data_type_round_trips_wire_names() {
    assert_eq!(DataType::from("realtime"), DataType::Realtime);
    assert_eq!(DataType::from("kline3m"), DataType::Kline3mo);
    assert_eq!(DataType::Kline1m.as_str(), "kline1m");
    assert_eq!(
        DataType::from("tick"),
        DataType::Other("tick".to_string())
    );
}

#[test]
fn test_chart_eligibility() {
    assert!(DataType::Realtime.is_chart_eligible());
    assert!(DataType::Kline1m.is_chart_eligible());
    assert!(!DataType::Kline5m.is_chart_eligible());
    assert!(!DataType::Other("tick".into()).is_chart_eligible());
}

#[test]
fn test_parse_timestamp_formats() {
    assert!(parse_timestamp("2024-03-01T09:30:00+08:00").is_some());
    assert!(parse_timestamp("2024-03-01T09:30:00.123456").is_some());
    assert!(parse_timestamp("2024-03-01 09:30:00").is_some());
    assert!(parse_timestamp("yesterday").is_none());
    assert!(parse_timestamp("").is_none());
}

#[test]
fn test_config_validation() {
    assert!(MonitorConfig::default().validate().is_ok());

    let config = MonitorConfig {
        base_url: "ftp://nope".to_string(),
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = MonitorConfig {
        series_capacity: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let mut reconnect = ReconnectConfig::default();
    reconnect.policy = BackoffPolicy::Exponential;
    reconnect.multiplier = 1.0;
    assert!(reconnect.validate().is_err());
}

// Test MarketStateStore
#[test]
fn test_store_unseen_market_is_empty() {
    let store = MarketStateStore::new();
    assert!(store.latest("HSI").is_none());
    assert!(store.series("HSI").is_empty());
    assert_eq!(store.series("HSI").iter().count(), 0);
}

#[test]
fn test_store_realtime_update_appends_point() {
    let mut store = MarketStateStore::new();

    let changed = store.apply(
        MarketSnapshot::new("BTC", DataType::Realtime, dec!(100)).with_volume(dec!(3)),
    );

    assert!(changed);
    assert_eq!(store.latest("BTC").map(|s| s.price), Some(dec!(100)));
    let series = store.series("BTC");
    assert_eq!(series.len(), 1);
    assert_eq!(series.last().map(|p| p.volume), Some(dec!(3)));
}

#[test]
fn test_store_last_arrival_wins_over_timestamp() {
    let mut store = MarketStateStore::new();
    let newer = parse_timestamp("2024-03-01T10:00:00Z").expect("valid");
    let older = parse_timestamp("2024-03-01T09:00:00Z").expect("valid");

    store.apply(MarketSnapshot::new("HSI", DataType::Realtime, dec!(2)).with_timestamp(newer));
    store.apply(MarketSnapshot::new("HSI", DataType::Realtime, dec!(1)).with_timestamp(older));

    assert_eq!(store.latest("HSI").map(|s| s.price), Some(dec!(1)));
    assert_eq!(store.series("HSI").last().map(|p| p.time), Some(older));
}

#[test]
fn test_store_sources_overwrite_same_market() {
    let mut store = MarketStateStore::new();
    store.apply(MarketSnapshot::new("HSI", DataType::Realtime, dec!(1)).with_source("a"));
    store.apply(MarketSnapshot::new("HSI", DataType::Realtime, dec!(2)).with_source("b"));

    let latest = store.latest("HSI").cloned();
    assert_eq!(latest.and_then(|s| s.source_id), Some("b".to_string()));
}

#[test]
fn test_store_evicts_oldest_at_capacity() {
    let mut store = MarketStateStore::new();
    for i in 1..=60 {
        store.apply(MarketSnapshot::new("BTC", DataType::Realtime, rust_decimal::Decimal::from(i)));
    }

    let prices: Vec<_> = store.series("BTC").iter().map(|p| p.price).collect();
    assert_eq!(prices.len(), DEFAULT_SERIES_CAPACITY);
    assert_eq!(prices.first().copied(), Some(dec!(11)));
    assert_eq!(prices.last().copied(), Some(dec!(60)));
}

// Test EventDispatcher
#[derive(Default)]
struct Ctx {
    seen: Vec<String>,
}

#[test]
fn test_dispatcher_runs_in_registration_order() {
    let mut dispatcher: EventDispatcher<Ctx> = EventDispatcher::new();
    dispatcher.register(EventKind::Heartbeat, |ctx, _| ctx.seen.push("first".into()));
    dispatcher.register(EventKind::Heartbeat, |ctx, _| ctx.seen.push("second".into()));
    dispatcher.register(EventKind::Connected, |ctx, _| ctx.seen.push("other".into()));

    let mut ctx = Ctx::default();
    let delivered = dispatcher.dispatch(&mut ctx, 1, &StreamEvent::Heartbeat);

    assert_eq!(delivered, 2);
    assert_eq!(ctx.seen, vec!["first", "second"]);
}

#[test]
fn test_dispatcher_scopes_attempt_handlers() {
    let mut dispatcher: EventDispatcher<Ctx> = EventDispatcher::new();
    dispatcher.register_for_attempt(1, EventKind::Heartbeat, |ctx, _| ctx.seen.push("one".into()));
    dispatcher.register_for_attempt(2, EventKind::Heartbeat, |ctx, _| ctx.seen.push("two".into()));

    let mut ctx = Ctx::default();
    dispatcher.dispatch(&mut ctx, 2, &StreamEvent::Heartbeat);
    assert_eq!(ctx.seen, vec!["two"]);

    assert_eq!(dispatcher.unregister_attempt(2), 1);
    assert_eq!(dispatcher.dispatch(&mut ctx, 2, &StreamEvent::Heartbeat), 0);
    assert_eq!(dispatcher.attempt_handler_count(1), 1);
}

#[test]
fn test_dispatcher_unregister_by_id() {
    let mut dispatcher: EventDispatcher<Ctx> = EventDispatcher::new();
    let id = dispatcher.register(EventKind::Error, |_, _| {});

    assert_eq!(dispatcher.handler_count(EventKind::Error), 1);
    assert!(dispatcher.unregister(id));
    assert!(!dispatcher.unregister(id));
    assert_eq!(dispatcher.handler_count(EventKind::Error), 0);
}

#[test]
fn test_dispatcher_survives_panicking_handler() {
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);

    let mut dispatcher: EventDispatcher<Ctx> = EventDispatcher::new();
    dispatcher.register(EventKind::Heartbeat, |_, _| panic!("handler failure"));
    dispatcher.register(EventKind::Heartbeat, move |_, _| {
        if let Ok(mut hits) = counter.lock() {
            *hits += 1;
        }
    });

    let mut ctx = Ctx::default();
    let delivered = dispatcher.dispatch(&mut ctx, 1, &StreamEvent::Heartbeat);

    assert_eq!(delivered, 1);
    assert_eq!(*hits.lock().expect("lock"), 1);
}

#[test]
fn test_event_kind_wire_names() {
    for kind in EventKind::EVERY {
        assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
    }
    assert_eq!(EventKind::from_wire("message"), None);
}

// Test error classification
#[test]
fn test_error_severity() {
    let parse = MonitorError::Parse(ParseError::InvalidJson("x".into()));
    let lost = MonitorError::Connection(ConnectionError::ConnectionLost("x".into()));
    let endpoint = MonitorError::Connection(ConnectionError::InvalidEndpoint("x".into()));
    let bootstrap = MonitorError::Bootstrap(BootstrapError::Status {
        endpoint: "/api/sources".into(),
        status: 500,
    });

    assert_eq!(ErrorSeverity::from_error(&parse), ErrorSeverity::Low);
    assert_eq!(ErrorSeverity::from_error(&lost), ErrorSeverity::Medium);
    assert_eq!(ErrorSeverity::from_error(&endpoint), ErrorSeverity::High);
    assert_eq!(ErrorSeverity::from_error(&bootstrap), ErrorSeverity::High);
}

#[test]
fn test_error_display() {
    let error = MonitorError::Bootstrap(BootstrapError::Status {
        endpoint: "/api/sources".into(),
        status: 503,
    });
    assert_eq!(error.to_string(), "Bootstrap error: HTTP 503 from /api/sources");
}
