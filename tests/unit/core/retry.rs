//! Unit tests for persisted retry backoff

use chrono::{TimeZone, Utc};
use optscreen::core::retry::RetrySchedule;
use std::time::Duration;

#[test]
fn delay_doubles_from_base() {
    let schedule = RetrySchedule::new(Duration::from_secs(30), Duration::from_secs(1800));
    let delays: Vec<u64> = (1..=5).map(|n| schedule.delay_for(n).as_secs()).collect();
    assert_eq!(delays, vec![30, 60, 120, 240, 480]);
}

#[test]
fn delay_is_capped() {
    let schedule = RetrySchedule::new(Duration::from_secs(30), Duration::from_secs(1800));
    assert_eq!(schedule.delay_for(7), Duration::from_secs(1800));
    assert_eq!(schedule.delay_for(64), Duration::from_secs(1800));
    assert_eq!(schedule.delay_for(u32::MAX), Duration::from_secs(1800));
}

#[test]
fn zeroth_attempt_uses_base() {
    let schedule = RetrySchedule::new(Duration::from_secs(10), Duration::from_secs(60));
    assert_eq!(schedule.delay_for(0), Duration::from_secs(10));
}

#[test]
fn next_available_at_adds_delay_to_now() {
    let schedule = RetrySchedule::new(Duration::from_secs(10), Duration::from_secs(60));
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
    assert_eq!(
        schedule.next_available_at(now, 3),
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 40).unwrap()
    );
}
