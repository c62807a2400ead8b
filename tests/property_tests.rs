//! Property-based tests using quickcheck

use market_monitor::{
    data::*,
    filter::*,
    state::*,
};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rust_decimal::Decimal;

fn realtime(market: &str, price: i64) -> MarketSnapshot {
    MarketSnapshot::new(market, DataType::Realtime, Decimal::from(price))
}

// Property tests for MarketStateStore
#[quickcheck]
fn prop_series_never_exceeds_capacity(prices: Vec<i64>) -> bool {
    let mut store = MarketStateStore::new();
    for price in &prices {
        store.apply(realtime("BTC", *price));
        if store.series("BTC").len() > DEFAULT_SERIES_CAPACITY {
            return false;
        }
    }
    true
}

#[quickcheck]
fn prop_series_keeps_most_recent_in_order(prices: Vec<i64>) -> bool {
    let mut store = MarketStateStore::new();
    for price in &prices {
        store.apply(realtime("BTC", *price));
    }

    let kept: Vec<Decimal> = store.series("BTC").iter().map(|p| p.price).collect();
    let skip = prices.len().saturating_sub(DEFAULT_SERIES_CAPACITY);
    let expected: Vec<Decimal> = prices[skip..].iter().map(|p| Decimal::from(*p)).collect();

    kept == expected
}

#[quickcheck]
fn prop_latest_is_last_applied(updates: Vec<(i64, i64)>) -> TestResult {
    let Some((last_price, _)) = updates.last().copied() else {
        return TestResult::discard();
    };

    let mut store = MarketStateStore::new();
    for (price, secs) in &updates {
        let timestamp = chrono::DateTime::from_timestamp(secs.rem_euclid(4_000_000_000), 0);
        let mut snapshot = realtime("HSI", *price);
        snapshot.timestamp = timestamp;
        store.apply(snapshot);
    }

    TestResult::from_bool(store.latest("HSI").map(|s| s.price) == Some(Decimal::from(last_price)))
}

#[quickcheck]
fn prop_markets_are_independent(a: Vec<i64>, b: Vec<i64>) -> bool {
    let mut store = MarketStateStore::new();
    for price in &a {
        store.apply(realtime("A", *price));
    }
    for price in &b {
        store.apply(realtime("B", *price));
    }

    store.series("A").len() == a.len().min(DEFAULT_SERIES_CAPACITY)
        && store.series("B").len() == b.len().min(DEFAULT_SERIES_CAPACITY)
}

// Property tests for FilterState
fn identifier(code: u8) -> String {
    // Small alphabet so toggles collide often; 0 maps to the sentinel
    match code % 5 {
        0 => ALL.to_string(),
        n => format!("id{}", n),
    }
}

fn selection_is_well_formed(selection: &Selection) -> bool {
    !selection.is_empty() && (!selection.is_all() || selection.len() == 1)
}

#[quickcheck]
fn prop_filter_selection_always_well_formed(toggles: Vec<(u8, u8)>) -> bool {
    let mut filters = FilterState::new();
    for (dimension, code) in toggles {
        let dimension = FilterDimension::EVERY[dimension as usize % 3];
        filters.toggle(dimension, &identifier(code));

        if !FilterDimension::EVERY
            .iter()
            .all(|dim| selection_is_well_formed(filters.active_selections(*dim)))
        {
            return false;
        }
    }
    true
}

#[quickcheck]
fn prop_toggling_all_yields_only_all(toggles: Vec<u8>) -> bool {
    let mut filters = FilterState::new();
    for code in toggles {
        filters.toggle(FilterDimension::Market, &identifier(code));
    }

    let selection = filters.toggle(FilterDimension::Market, ALL);
    selection.members().collect::<Vec<_>>() == vec![ALL]
}

#[quickcheck]
fn prop_double_toggle_restores_selection(toggles: Vec<u8>, extra: u8) -> TestResult {
    let extra = identifier(extra);
    if extra == ALL {
        return TestResult::discard();
    }

    let mut filters = FilterState::new();
    for code in toggles {
        filters.toggle(FilterDimension::Source, &identifier(code));
    }
    let before = filters.active_selections(FilterDimension::Source).clone();
    if before.is_all() {
        // From "all", one toggle selects the item and the next one returns to "all"
        filters.toggle(FilterDimension::Source, &extra);
        filters.toggle(FilterDimension::Source, &extra);
        return TestResult::from_bool(filters.active_selections(FilterDimension::Source).is_all());
    }
    if before.contains(&extra) && before.len() == 1 {
        return TestResult::discard();
    }

    filters.toggle(FilterDimension::Source, &extra);
    filters.toggle(FilterDimension::Source, &extra);

    TestResult::from_bool(filters.active_selections(FilterDimension::Source) == &before)
}
