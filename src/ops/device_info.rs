use std::sync::LazyLock;

use regex::Regex;

use crate::category::Category;
use crate::evaluator::{Accumulator, Evaluation};
use crate::extraction::DeviceInfoEntry;
use crate::policy::DateRange;
use crate::timestamp::parse_timestamp;

pub const LOCAL_NETWORK_IP: &str = "DeviceInfoLocalNetworkIP";
pub const INTERNET_NETWORK_IP: &str = "DeviceInfoInternetNetworkIP";

// e.g. "192.168.1.20 at 2015-02-20 18:04:11 (UTC)"; the last "at" wins
static SEEN_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.* at (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})").expect("hard-coded regex is valid")
});

/// The `YYYY-MM-DD hh:mm:ss` part of a network-IP entry, if it has one.
pub fn seen_at(value: &str) -> Option<&str> {
    SEEN_AT
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Evaluates one device-info entry.
///
/// Only network-IP entries carry a timestamp; anything else yields `None`
/// and is left alone. The time is read as UTC whether or not the entry says so.
pub fn evaluate_entry(index: usize, entry: &DeviceInfoEntry, range: &DateRange) -> Option<Evaluation> {
    if entry.name != LOCAL_NETWORK_IP && entry.name != INTERNET_NETWORK_IP {
        return None;
    }

    let mut acc = Accumulator::new(range);
    match seen_at(&entry.value) {
        Some(raw) => {
            if !entry.value.contains("UTC") {
                log::debug!("{}: no UTC marker on `{}`, treating as UTC", entry.name, raw);
            }
            acc.observe(&entry.name, raw, parse_timestamp);
        }
        None => log::debug!("{}: no timestamp in `{}`", entry.name, entry.value),
    }

    Some(acc.finish(
        format!("device-info-{}", index),
        Category::Other("DeviceInfo".to_string()),
    ))
}
