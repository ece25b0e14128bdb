use chrono::prelude::{DateTime, Utc};

pub fn timestamp_millis() -> i64 {
    let now = Utc::now();

    now.timestamp_millis()
}

// Exchange timestamps are milliseconds since epoch, rendered in UTC
pub fn format_timestamp_millis(millis: i64) -> Option<String> {
    let datetime: DateTime<Utc> = DateTime::from_timestamp_millis(millis)?;

    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}
