use chrono::{DateTime, TimeZone, Utc};

/// 保存時の精度（ミリ秒）に丸めた現在時刻
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

pub fn truncate_to_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(value.timestamp_millis())
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(ts) => ts,
        _ => DateTime::<Utc>::UNIX_EPOCH,
    }
}

pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_round_trips_through_millis() {
        let now = Utc::now();
        let truncated = truncate_to_millis(now);
        assert_eq!(from_millis(truncated.timestamp_millis()), truncated);
        assert!(now - truncated < chrono::Duration::milliseconds(1));
    }
}
