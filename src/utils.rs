use chrono::{DateTime, Duration, TimeZone, Timelike};
use std::num::NonZeroU32;

/// Start of the bucket *preceding* the one that contains `now`.
///
/// `now` is floored to the last multiple of `interval_minutes` within its hour
/// (seconds and sub-seconds dropped), then moved back one more interval. The
/// result therefore lies between `interval_minutes` and `2 * interval_minutes`
/// (exclusive) before `now`, which still covers a continuous aggregate that
/// lags real time by up to one refresh.
///
/// `interval_minutes` is expected to divide 60; other values are not rejected
/// but produce buckets that restart at every full hour.
pub fn align_time_to_interval<Tz: TimeZone>(now: DateTime<Tz>, interval_minutes: NonZeroU32) -> DateTime<Tz> {
    let interval = i64::from(interval_minutes.get());
    let past_boundary = Duration::minutes(i64::from(now.minute()) % interval)
        + Duration::seconds(i64::from(now.second()))
        + Duration::nanoseconds(i64::from(now.nanosecond()));
    now - past_boundary - Duration::minutes(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};
    use chrono_tz::Europe::Zurich;

    fn minutes(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn floors_then_steps_back_one_interval() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 7, 33).unwrap() + Duration::milliseconds(250);
        let aligned = align_time_to_interval(now, minutes(4));
        assert_eq!(aligned, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn exact_boundary_still_steps_back() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 8, 0).unwrap();
        let aligned = align_time_to_interval(now, minutes(4));
        assert_eq!(aligned, Utc.with_ymd_and_hms(2024, 1, 1, 12, 4, 0).unwrap());
    }

    #[test]
    fn crosses_hour_and_day_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 2, 10).unwrap();
        let aligned = align_time_to_interval(now, minutes(15));
        assert_eq!(aligned, Utc.with_ymd_and_hms(2024, 2, 29, 23, 45, 0).unwrap());
    }

    #[test]
    fn window_bounds_hold_for_every_minute_of_the_hour() {
        for interval in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            for minute in 0..60 {
                let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, minute, 41).unwrap() + Duration::microseconds(123_456);
                let aligned = align_time_to_interval(now, minutes(interval));
                let lag = now - aligned;
                assert!(lag >= Duration::minutes(i64::from(interval)), "interval={interval} minute={minute}");
                assert!(lag < Duration::minutes(2 * i64::from(interval)), "interval={interval} minute={minute}");
                assert_eq!(aligned.second(), 0);
                assert_eq!(aligned.nanosecond(), 0);
                assert_eq!(aligned.minute() % interval, 0);
            }
        }
    }

    #[test]
    fn keeps_the_input_timezone() {
        let now = Zurich.with_ymd_and_hms(2024, 7, 1, 14, 31, 5).unwrap();
        let aligned = align_time_to_interval(now, minutes(4));
        assert_eq!(aligned.timezone(), Zurich);
        assert_eq!((aligned.day(), aligned.hour(), aligned.minute()), (1, 14, 24));
    }
}
