use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch. A clock set before the epoch reads as 0.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(timestamp_secs() > 1_577_836_800);
    }
}
