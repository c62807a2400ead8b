//! Display formatting for prices, volumes and chart labels

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

const PLACEHOLDER: &str = "N/A";

/// Direction of a price change, used to pick the card colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Positive,
    Negative,
}

impl Trend {
    pub fn of(change: Decimal) -> Self {
        if change >= Decimal::ZERO {
            Trend::Positive
        } else {
            Trend::Negative
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Trend::Positive => "positive",
            Trend::Negative => "negative",
        }
    }
}

/// Price with thousands separators and exactly two decimals
pub fn format_price(price: Option<Decimal>) -> String {
    match price {
        Some(price) => fixed(price, 2, true),
        None => PLACEHOLDER.to_string(),
    }
}

/// Volume with 亿 (1e8) / 万 (1e4) magnitude suffixes
pub fn format_volume(volume: Option<Decimal>) -> String {
    let Some(volume) = volume else {
        return PLACEHOLDER.to_string();
    };

    let hundred_million = Decimal::from(100_000_000u64);
    let ten_thousand = Decimal::from(10_000u64);

    if volume >= hundred_million {
        format!("{}亿", fixed(volume / hundred_million, 2, false))
    } else if volume >= ten_thousand {
        format!("{}万", fixed(volume / ten_thousand, 2, false))
    } else {
        let rounded = volume.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero);
        group(&rounded.normalize().to_string())
    }
}

/// Signed change with its percentage, e.g. `+12.50 (+0.35%)`
pub fn format_change(change: Option<Decimal>, change_percent: Option<Decimal>) -> String {
    let change = change.unwrap_or(Decimal::ZERO);
    let percent = change_percent.unwrap_or(Decimal::ZERO);
    let sign = if Trend::of(change) == Trend::Positive { "+" } else { "" };
    format!(
        "{}{} ({}{}%)",
        sign,
        fixed(change, 2, true),
        sign,
        fixed(percent, 2, false)
    )
}

/// Wall-clock label used on the chart's time axis
pub fn format_time_label(time: DateTime<Utc>) -> String {
    time.format("%H:%M:%S").to_string()
}

fn fixed(value: Decimal, places: u32, grouped: bool) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = rounded.abs().to_string();

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part.to_string(), frac_part.to_string()),
        None => (digits, String::new()),
    };

    let mut frac = frac_part;
    while frac.len() < places as usize {
        frac.push('0');
    }

    let int_part = if grouped { group(&int_part) } else { int_part };
    let sign = if negative { "-" } else { "" };

    if places == 0 {
        format!("{}{}", sign, int_part)
    } else {
        format!("{}{}.{}", sign, int_part, frac)
    }
}

/// Insert `,` every three digits of the integer part
fn group(number: &str) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, out, frac),
        None => format!("{}{}", sign, out),
    }
}
