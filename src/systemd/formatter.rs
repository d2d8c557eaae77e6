//! Display strings for unit properties.

use log::trace;

use super::data::{PropertyValue, UnitRecord};
use crate::{
    consts::{
        NOT_SET, SUFFIX_DIRECTORY_MODE, SUFFIX_TIMESTAMP, SUFFIX_USEC, SUFFIX_USEC_REALTIME,
        U32MAX, U64MAX,
    },
    utils::time_handling::{
        USEC_PER_365_DAYS, USEC_PER_SEC, format_day_clock, format_local_date_sec,
        format_local_date_usec, format_short_duration,
    },
};

/// Formats the column `key` of `record`. An absent property gives an empty string.
///
/// A key with spaces (e.g. `Unit File State`) falls back to the same key without them.
pub fn format_property(record: &UnitRecord, key: &str) -> String {
    let value = record.get(key).or_else(|| {
        if key.contains(' ') {
            record.get(&key.replace(' ', ""))
        } else {
            None
        }
    });

    match value {
        Some(value) => format_value(key, &value),
        None => {
            trace!("{} has no property {key:?}", record.name());
            String::new()
        }
    }
}

pub fn format_value(key: &str, value: &PropertyValue) -> String {
    match value {
        PropertyValue::Sequence(values) | PropertyValue::Tuple(values) => values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        PropertyValue::Integer(integer) => format_integer(key, *integer),
        PropertyValue::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_integer(key: &str, value: i128) -> String {
    if value == U64MAX as i128 || value == U32MAX as i128 {
        return NOT_SET.to_owned();
    }

    let Ok(value) = u64::try_from(value) else {
        return value.to_string();
    };

    let formatted = if key.ends_with(SUFFIX_TIMESTAMP) && value > USEC_PER_SEC {
        format_local_date_sec(value)
    } else if key.ends_with(SUFFIX_USEC) {
        Some(format_usec(value))
    } else if key.ends_with(SUFFIX_USEC_REALTIME) && value > USEC_PER_SEC {
        format_local_date_usec(value)
    } else if key.ends_with(SUFFIX_DIRECTORY_MODE) {
        Some(format!("{value:04o}"))
    } else {
        None
    };

    formatted.unwrap_or_else(|| value.to_string())
}

fn format_usec(value: u64) -> String {
    if let Some(short) = format_short_duration(value) {
        return short;
    }

    if value < USEC_PER_365_DAYS {
        return format_day_clock(value);
    }

    // only "next elapse" style markers get that big, they are points in time
    format_local_date_usec(value).unwrap_or_else(|| value.to_string())
}

/// Every base field and loaded property of `record`, formatted, properties in key order.
pub fn format_details(record: &UnitRecord) -> Vec<(String, String)> {
    const BASE_KEYS: [&str; 7] = [
        "Name",
        "Description",
        "Load",
        "State",
        "Substate",
        "Path",
        "UnitType",
    ];

    let base = BASE_KEYS
        .iter()
        .filter(|key| record.get(key).is_some())
        .map(|key| (key.to_string(), format_property(record, key)));

    let properties = record
        .properties()
        .iter()
        .map(|(key, value)| (key.clone(), format_value(key, value)));

    base.chain(properties).collect()
}
