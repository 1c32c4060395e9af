use crate::types::{Event, EventBody};

/// New random id for events, cards and links.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Wall-clock epoch milliseconds.
pub fn now_ms() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Next event timestamp: wall clock, but never below the last logged one.
pub fn next_timestamp(floor: Option<i64>) -> i64 {
    let now = now_ms();
    match floor {
        Some(last) if last > now => last,
        _ => now,
    }
}

/// Create a new event with a fresh id and a timestamp no earlier than `floor`.
pub fn new_event(body: EventBody, floor: Option<i64>) -> Event {
    Event {
        id: new_id(),
        timestamp: next_timestamp(floor),
        body,
    }
}

/// Render an event timestamp as RFC 3339 for display.
pub fn format_timestamp(ms: i64) -> String {
    let nanos = i128::from(ms) * 1_000_000;
    time::OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|t| {
            t.format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_else(|| ms.to_string())
}
