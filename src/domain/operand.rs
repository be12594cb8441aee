//! Parsers for structured condition operands (ranges, networks, clock
//! windows, weekdays). Shared by policy validation and condition evaluation.

use super::attribute::AttributeValue;
use ipnet::IpNet;
use std::net::IpAddr;

/// Inclusive numeric bounds for `between`.
pub fn between_bounds(expected: &AttributeValue) -> Option<(f64, f64)> {
    match expected.as_list()? {
        [low, high] => Some((low.as_f64()?, high.as_f64()?)),
        _ => None,
    }
}

/// Parses a CIDR block. A bare address is treated as a host route.
pub fn parse_network(raw: &str) -> Option<IpNet> {
    let raw = raw.trim();
    raw.parse::<IpNet>()
        .ok()
        .or_else(|| raw.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Networks named by an `ip_in_cidr` operand: a single string or a list of
/// strings. Returns `None` if any entry fails to parse.
pub fn networks(expected: &AttributeValue) -> Option<Vec<IpNet>> {
    match expected {
        AttributeValue::String(s) => parse_network(s).map(|net| vec![net]),
        AttributeValue::List(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_str().and_then(parse_network))
            .collect(),
        _ => None,
    }
}

/// Minutes since midnight for an `HH:MM` string.
pub fn parse_clock(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h = h.parse::<u32>().ok()?;
    let m = m.parse::<u32>().ok()?;
    (h <= 23 && m <= 59).then_some(h * 60 + m)
}

/// An inclusive time-of-day window; `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWindow {
    pub start: u32,
    pub end: u32,
}

impl ClockWindow {
    /// Accepts `"HH:MM-HH:MM"` or a two element list of `HH:MM` strings.
    pub fn parse(expected: &AttributeValue) -> Option<Self> {
        let (start, end) = match expected {
            AttributeValue::String(s) => {
                let (a, b) = s.split_once('-')?;
                (parse_clock(a)?, parse_clock(b)?)
            }
            AttributeValue::List(items) => match items.as_slice() {
                [a, b] => (parse_clock(a.as_str()?)?, parse_clock(b.as_str()?)?),
                _ => return None,
            },
            _ => return None,
        };
        Some(Self { start, end })
    }

    pub fn contains(&self, minute_of_day: u32) -> bool {
        if self.start <= self.end {
            minute_of_day >= self.start && minute_of_day <= self.end
        } else {
            minute_of_day >= self.start || minute_of_day <= self.end
        }
    }
}

/// Reads the clock time carried by an attribute: an `HH:MM` string or a
/// bare hour number.
pub fn clock_of(actual: &AttributeValue) -> Option<u32> {
    match actual {
        AttributeValue::String(s) => parse_clock(s),
        AttributeValue::Int(h) if (0..24).contains(h) => Some(*h as u32 * 60),
        _ => None,
    }
}

/// Day number with Sunday as 0. Accepts full or three letter English names
/// in any case, or the numbers 0 to 6.
pub fn parse_day_of_week(value: &AttributeValue) -> Option<u32> {
    match value {
        AttributeValue::String(s) => {
            let day = match s.trim().to_ascii_lowercase().as_str() {
                "sunday" | "sun" => 0,
                "monday" | "mon" => 1,
                "tuesday" | "tue" => 2,
                "wednesday" | "wed" => 3,
                "thursday" | "thu" => 4,
                "friday" | "fri" => 5,
                "saturday" | "sat" => 6,
                other => return other.parse::<u32>().ok().filter(|d| *d <= 6),
            };
            Some(day)
        }
        other => other.as_i64().filter(|d| (0..=6).contains(d)).map(|d| d as u32),
    }
}

/// Day set named by a `day_of_week_in` operand. A scalar is a one day set.
pub fn day_set(expected: &AttributeValue) -> Option<Vec<u32>> {
    match expected {
        AttributeValue::List(items) => items.iter().map(parse_day_of_week).collect(),
        scalar => parse_day_of_week(scalar).map(|d| vec![d]),
    }
}
