use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Source of clinic-local "now", swappable in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall-clock time at the clinic, which is what slot labels are written in.
pub fn clinic_time(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDateTime {
    now.naive_utc() + Duration::minutes(utc_offset_minutes as i64)
}

pub fn clinic_now(utc_offset_minutes: i32) -> NaiveDateTime {
    clinic_time(Utc::now(), utc_offset_minutes)
}

pub fn clinic_clock(utc_offset_minutes: i32) -> Clock {
    Arc::new(move || clinic_now(utc_offset_minutes))
}

pub fn fixed_clock(at: NaiveDateTime) -> Clock {
    Arc::new(move || at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn applies_offset() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let local = clinic_time(now, 300);
        assert_eq!(local.to_string(), "2026-03-02 04:30:00");
    }

    #[test]
    fn fixed_clock_does_not_move() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap().naive_utc();
        let clock = fixed_clock(at);
        assert_eq!(clock(), at);
        assert_eq!(clock(), at);
    }
}
