//! Scheduler load tests: many jobs contending for a small rate limit.

use std::sync::Arc;
use std::time::Duration;

use service_coordinator::scheduler::{JobScheduler, RateLimiter, SchedulerGroup};

mod common;

use common::{busy_job, Concurrency};

#[tokio::test(start_paused = true)]
async fn test_rate_of_one_serializes_jobs() {
    let scheduler = JobScheduler::new(1);
    let tracker = Arc::new(Concurrency::default());

    for name in ["a", "b"] {
        let job = busy_job(
            name,
            Duration::from_millis(20),
            Duration::from_millis(15),
            tracker.clone(),
        );
        scheduler.add(job).unwrap();
    }

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop().await;

    assert_eq!(tracker.peak(), 1);
    assert!(tracker.total() >= 10);
}

#[tokio::test(start_paused = true)]
async fn test_many_jobs_respect_shared_limit() {
    let scheduler = JobScheduler::new(3);
    let tracker = Arc::new(Concurrency::default());

    for i in 0..12 {
        let job = busy_job(
            &format!("job-{i}"),
            Duration::from_millis(10),
            Duration::from_millis(25),
            tracker.clone(),
        );
        scheduler.add(job).unwrap();
    }

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.stop().await;

    assert_eq!(tracker.peak(), 3);
    assert_eq!(scheduler.limiter().available(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_shared_across_grouped_schedulers() {
    let limiter = RateLimiter::new(2);
    let tracker = Arc::new(Concurrency::default());

    let mut schedulers = Vec::new();
    for group in 0..3 {
        let scheduler = JobScheduler::with_limiter(limiter.clone());
        for i in 0..2 {
            let job = busy_job(
                &format!("g{group}-{i}"),
                Duration::from_millis(10),
                Duration::from_millis(20),
                tracker.clone(),
            );
            scheduler.add(job).unwrap();
        }
        schedulers.push(Arc::new(scheduler));
    }

    let group = SchedulerGroup::new(schedulers.clone());
    group.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    group.stop().await;

    assert_eq!(tracker.peak(), 2);
    assert!(schedulers.iter().all(|s| !s.is_started()));
    assert!(tracker.total() > 0);
}
