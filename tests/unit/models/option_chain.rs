//! Unit tests for snapshot rows and queue status types

use chrono::{NaiveDate, TimeZone, Utc};
use optscreen::error::DataIntegrityError;
use optscreen::models::{JobStatus, JobTransition, NewSnapshot, OptionType, RequestStatus};
use tokio_test::{assert_err, assert_ok};

fn row() -> NewSnapshot {
    NewSnapshot::new(
        "AAPL",
        Utc.with_ymd_and_hms(2024, 3, 1, 20, 30, 0).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
        190.0,
        OptionType::Call,
    )
}

#[test]
fn mid_price_needs_both_sides() {
    assert_eq!(row().with_quote(1.5, 1.6).into_snapshot(1).mid_price(), Some(1.55));
    assert_eq!(row().into_snapshot(1).mid_price(), None);

    let mut one_sided = row().into_snapshot(1);
    one_sided.bid = Some(1.0);
    assert_eq!(one_sided.mid_price(), None);
}

#[test]
fn days_to_expiry_counts_from_as_of_date() {
    assert_eq!(row().into_snapshot(1).days_to_expiry(), 21);
}

#[test]
fn validate_rejects_unusable_rows() {
    assert_ok!(row().with_quote(1.5, 1.6).into_snapshot(1).validate());
    assert_ok!(row().into_snapshot(1).validate());

    let crossed = row().with_quote(2.0, 1.0).into_snapshot(7);
    assert!(matches!(
        crossed.validate(),
        Err(DataIntegrityError::MalformedSnapshot { id: 7, .. })
    ));

    let mut negative = row().into_snapshot(1);
    negative.bid = Some(-0.1);
    assert_err!(negative.validate());

    let mut zero_strike = row().into_snapshot(1);
    zero_strike.strike = 0.0;
    assert_err!(zero_strike.validate());

    let mut expired = row().into_snapshot(1);
    expired.expiry = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    assert_err!(expired.validate());
}

#[test]
fn option_type_parses_column_codes() {
    assert_eq!("C".parse::<OptionType>(), Ok(OptionType::Call));
    assert_eq!("put".parse::<OptionType>(), Ok(OptionType::Put));
    assert!("X".parse::<OptionType>().is_err());
    assert_eq!(OptionType::Put.code(), "P");
    assert_eq!(OptionType::Call.to_string(), "call");
}

#[test]
fn same_contract_ignores_quotes() {
    let stored = row().with_quote(1.0, 1.1).into_snapshot(3);
    assert!(row().with_quote(2.0, 2.1).same_contract_as(&stored));

    let mut other_strike = row();
    other_strike.strike = 195.0;
    assert!(!other_strike.same_contract_as(&stored));
}

#[test]
fn statuses_round_trip_through_text() {
    for status in [
        JobStatus::Pending,
        JobStatus::Sending,
        JobStatus::Sent,
        JobStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
    }
    assert!("lost".parse::<JobStatus>().is_err());
    assert!(JobStatus::Sent.is_terminal());
    assert!(!JobStatus::Sending.is_terminal());

    assert_eq!("processing".parse::<RequestStatus>(), Ok(RequestStatus::Processing));
    assert!("queued".parse::<RequestStatus>().is_err());
}

#[test]
fn job_transition_accessors() {
    let retry = JobTransition::Retry {
        attempts: 2,
        available_at: Utc.with_ymd_and_hms(2024, 3, 1, 15, 1, 0).unwrap(),
        error: "status 503".into(),
    };
    assert_eq!(retry.target_status(), JobStatus::Pending);
    assert_eq!(retry.attempts(), 2);
    assert_eq!(retry.error(), Some("status 503"));

    let sent = JobTransition::Sent { attempts: 1 };
    assert_eq!(sent.target_status(), JobStatus::Sent);
    assert_eq!(sent.error(), None);
}
