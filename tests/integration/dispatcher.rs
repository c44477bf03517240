//! Notification dispatcher: claims, retries, failure and crash recovery

use crate::test_utils::{
    dispatcher, dispatcher_config, enqueue_jobs, memory_store, start_time, RecordingProvider,
};
use chrono::Duration as ChronoDuration;
use optscreen::core::clock::Clock;
use optscreen::core::runtime::PollingWorker;
use optscreen::db::NotificationRepository;
use optscreen::error::DeliveryError;
use optscreen::jobs::DispatchOutcome;
use optscreen::models::{JobStatus, JobTransition};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn successful_delivery_marks_job_sent() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::ok());
    let dispatcher = dispatcher(store.clone(), provider.clone(), clock, "n1", dispatcher_config());

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 1);
    assert!(job.claimed_by.is_none());

    let sent = provider.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "user0@example.com");
    assert_eq!(sent[0].body, format!("job {}", ids[0]));
}

#[tokio::test]
async fn transient_failure_schedules_a_retry() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::failing_first(vec![DeliveryError::Transient(
        "status 503".into(),
    )]));
    let dispatcher = dispatcher(store.clone(), provider.clone(), clock.clone(), "n1", dispatcher_config());

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.retried, 1);

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.available_at, start_time() + ChronoDuration::seconds(30));
    assert!(job.last_error.as_deref().unwrap().contains("503"));

    assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 0);

    clock.advance(ChronoDuration::seconds(30));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.completed, 1);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn five_consecutive_failures_end_in_failed() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::always_failing(DeliveryError::Transient(
        "connection reset".into(),
    )));
    let dispatcher = dispatcher(store.clone(), provider.clone(), clock.clone(), "n1", dispatcher_config());

    for _ in 0..10 {
        dispatcher.run_cycle().await.unwrap();
        clock.advance(ChronoDuration::hours(1));
    }

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 5);
    assert_eq!(provider.call_count(), 5);
}

#[tokio::test]
async fn backoff_doubles_between_attempts() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::always_failing(DeliveryError::Timeout(2)));
    let dispatcher = dispatcher(store.clone(), provider, clock.clone(), "n1", dispatcher_config());

    let mut expected = Vec::new();
    for delay in [30, 60, 120] {
        let now = clock.now();
        dispatcher.run_cycle().await.unwrap();
        let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
        expected.push((job.available_at - now).num_seconds());
        clock.advance(ChronoDuration::seconds(delay));
    }
    assert_eq!(expected, vec![30, 60, 120]);
}

#[tokio::test]
async fn permanent_rejection_fails_immediately() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::always_failing(DeliveryError::Rejected {
        status: 400,
        reason: "invalid email".into(),
    }));
    let dispatcher = dispatcher(store.clone(), provider.clone(), clock, "n1", dispatcher_config());

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.as_deref().unwrap().contains("invalid email"));
}

#[tokio::test]
async fn refused_credentials_are_retried() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::failing_first(vec![
        DeliveryError::Unauthorized(401),
    ]));
    let dispatcher = dispatcher(store.clone(), provider, clock, "n1", dispatcher_config());

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.retried, 1);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn slow_provider_counts_as_timeout() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let provider = Arc::new(RecordingProvider::slow(Duration::from_millis(500)));
    let mut config = dispatcher_config();
    config.delivery_timeout = Duration::from_millis(50);
    let dispatcher = dispatcher(store.clone(), provider, clock, "n1", config);

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.retried, 1);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.last_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatchers_send_each_job_exactly_once() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 100).await;
    let provider = Arc::new(RecordingProvider::ok());

    let mut handles = Vec::new();
    for i in 0..8 {
        let d = dispatcher(
            store.clone(),
            provider.clone(),
            clock.clone(),
            &format!("n{}", i),
            dispatcher_config(),
        );
        handles.push(tokio::spawn(async move {
            let mut sent = 0;
            loop {
                let report = d.run_cycle().await.unwrap();
                sent += report.completed;
                if report.claimed == 0 {
                    break;
                }
            }
            sent
        }));
    }

    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }
    assert_eq!(total, 100);

    let sent = provider.sent_messages().await;
    assert_eq!(sent.len(), 100);
    let unique: HashSet<&str> = sent.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(unique.len(), 100);

    for id in ids {
        let job = store.job_for_request(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Sent);
        assert_eq!(job.attempts, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_job_is_reclaimed_exactly_once() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let claimed = store.claim_pending_jobs(1, "crashed").await.unwrap();
    assert_eq!(claimed.len(), 1);

    clock.advance(ChronoDuration::seconds(13));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reclaim_stale_jobs(Duration::from_secs(12), 5)
                .await
                .unwrap()
                .len()
        }));
    }
    let mut reclaimed = 0;
    for h in handles {
        reclaimed += h.await.unwrap();
    }
    assert_eq!(reclaimed, 1);

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert!(job.claimed_by.is_none());

    // Within the same window nothing is stale any more.
    assert!(store
        .reclaim_stale_jobs(Duration::from_secs(12), 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn stale_job_at_max_attempts_is_failed_not_requeued() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let job = store.claim_pending_jobs(1, "n1").await.unwrap().remove(0);
    store
        .update_job_status(
            job.id,
            JobStatus::Sending,
            "n1",
            &JobTransition::Retry {
                attempts: 4,
                available_at: start_time(),
                error: "status 503".into(),
            },
        )
        .await
        .unwrap();
    store.claim_pending_jobs(1, "crashed").await.unwrap();

    clock.advance(ChronoDuration::minutes(1));
    let provider = Arc::new(RecordingProvider::ok());
    let dispatcher = dispatcher(store.clone(), provider.clone(), clock, "n2", dispatcher_config());
    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.claimed, 0);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 5);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn outcome_is_discarded_when_the_claim_was_lost() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let job = store.claim_pending_jobs(1, "slow").await.unwrap().remove(0);

    clock.advance(ChronoDuration::minutes(1));
    store
        .reclaim_stale_jobs(Duration::from_secs(12), 5)
        .await
        .unwrap();
    let taken = store.claim_pending_jobs(1, "fast").await.unwrap().remove(0);
    assert_eq!(taken.id, job.id);

    let provider = Arc::new(RecordingProvider::ok());
    let slow = dispatcher(store.clone(), provider.clone(), clock.clone(), "slow", dispatcher_config());
    assert_eq!(slow.deliver(job).await, DispatchOutcome::Lost);
    assert_eq!(provider.call_count(), 0);

    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sending);
    assert_eq!(job.claimed_by.as_deref(), Some("fast"));
    assert_eq!(job.attempts, 1);

    let fast = dispatcher(store.clone(), provider.clone(), clock, "fast", dispatcher_config());
    assert_eq!(fast.deliver(taken).await, DispatchOutcome::Sent);
    assert_eq!(provider.call_count(), 1);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn only_the_owner_can_touch_or_settle_a_job() {
    let (store, _clock) = memory_store();
    enqueue_jobs(&store, 1).await;
    let job = store.claim_pending_jobs(1, "n1").await.unwrap().remove(0);

    assert!(!store.touch_job(job.id, "n2").await.unwrap());
    assert!(!store
        .update_job_status(job.id, JobStatus::Sending, "n2", &JobTransition::Sent { attempts: 1 })
        .await
        .unwrap());
    assert!(store.touch_job(job.id, "n1").await.unwrap());
    assert!(store
        .update_job_status(job.id, JobStatus::Sending, "n1", &JobTransition::Sent { attempts: 1 })
        .await
        .unwrap());
    // Settled jobs cannot be touched by anyone.
    assert!(!store.touch_job(job.id, "n1").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn long_batch_is_not_sent_twice_when_another_dispatcher_reclaims() {
    let (store, clock) = memory_store();
    enqueue_jobs(&store, 20).await;

    // One send at a time, each taking 9s on the store clock: jobs queued
    // behind the first two go stale before this dispatcher reaches them.
    let slow_provider = Arc::new(RecordingProvider::advancing(
        clock.clone(),
        ChronoDuration::seconds(9),
        Duration::from_millis(20),
    ));
    let mut config = dispatcher_config();
    config.batch_size = 20;
    config.delivery_concurrency = 1;
    let slow = dispatcher(store.clone(), slow_provider.clone(), clock.clone(), "a", config);
    let slow_run = tokio::spawn(async move { slow.run_cycle().await.unwrap() });

    let fast_provider = Arc::new(RecordingProvider::ok());
    let fast = dispatcher(store.clone(), fast_provider.clone(), clock, "b", dispatcher_config());
    while !slow_run.is_finished() {
        fast.run_cycle().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let slow_report = slow_run.await.unwrap();
    fast.run_cycle().await.unwrap();

    let mut sent = slow_provider.sent_messages().await;
    sent.extend(fast_provider.sent_messages().await);
    let unique: HashSet<&str> = sent.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(unique.len(), 20);
    assert_eq!(sent.len(), 20);
    assert_eq!(slow_provider.call_count() + fast_provider.call_count(), 20);
    assert!(slow_report.completed < 20);
    assert!(!fast_provider.sent_messages().await.is_empty());
}

#[tokio::test]
async fn crashed_dispatcher_job_is_recovered_and_sent() {
    let (store, clock) = memory_store();
    let ids = enqueue_jobs(&store, 1).await;
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert!(store.mark_sending_since(job.id, start_time()).await);

    let provider = Arc::new(RecordingProvider::ok());
    let d = dispatcher(store.clone(), provider.clone(), clock.clone(), "n1", dispatcher_config());

    assert_eq!(d.run_cycle().await.unwrap().claimed, 0);

    clock.advance(ChronoDuration::seconds(13));
    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(provider.sent_messages().await.len(), 1);
    let job = store.job_for_request(ids[0]).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 2);
}
