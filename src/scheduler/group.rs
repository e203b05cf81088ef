//! Several schedulers driven as one subsystem.

use std::sync::Arc;

use async_trait::async_trait;

use crate::lifecycle::supervisor::Subsystem;
use crate::scheduler::cron::CronScheduler;
use crate::scheduler::periodic::JobScheduler;

/// Starts and stops a list of schedulers together, in list order.
///
/// Lets a single leader election gate schedulers that were built with
/// different rate limits, plus any calendar schedulers. Fixed-tick
/// schedulers start first and stop first.
#[derive(Default)]
pub struct SchedulerGroup {
    schedulers: Vec<Arc<JobScheduler>>,
    calendars: Vec<Arc<CronScheduler>>,
}

impl SchedulerGroup {
    pub fn new(schedulers: Vec<Arc<JobScheduler>>) -> Self {
        Self {
            schedulers,
            calendars: Vec::new(),
        }
    }

    pub fn push(&mut self, scheduler: Arc<JobScheduler>) {
        self.schedulers.push(scheduler);
    }

    pub fn push_cron(&mut self, calendar: Arc<CronScheduler>) {
        self.calendars.push(calendar);
    }

    pub fn len(&self) -> usize {
        self.schedulers.len() + self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self) {
        for scheduler in &self.schedulers {
            scheduler.start();
        }
        for calendar in &self.calendars {
            calendar.start();
        }
    }

    pub async fn stop(&self) {
        for scheduler in &self.schedulers {
            scheduler.stop().await;
        }
        for calendar in &self.calendars {
            calendar.stop().await;
        }
    }
}

#[async_trait]
impl Subsystem for SchedulerGroup {
    async fn start(&self) {
        SchedulerGroup::start(self);
    }

    async fn stop(&self) {
        SchedulerGroup::stop(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::scheduler::job::JobConfig;

    #[tokio::test]
    async fn test_group_starts_and_stops_every_scheduler() {
        let first = Arc::new(JobScheduler::new(1));
        let second = Arc::new(JobScheduler::new(2));
        second
            .add(JobConfig::new("tick", Duration::from_millis(10), |_| async { Ok(()) }))
            .unwrap();

        let group: Arc<dyn Subsystem> =
            Arc::new(SchedulerGroup::new(vec![first.clone(), second.clone()]));
        group.start().await;
        assert!(first.is_started() && second.is_started());

        group.stop().await;
        assert!(!first.is_started() && !second.is_started());
    }

    #[tokio::test]
    async fn test_group_drives_cron_schedulers() {
        let ticks = Arc::new(JobScheduler::new(1));
        let calendar = Arc::new(CronScheduler::new());
        calendar
            .add("nightly", "0 0 3 * * *", |_| async { Ok(()) })
            .unwrap();

        let mut group = SchedulerGroup::new(vec![ticks.clone()]);
        group.push_cron(calendar.clone());
        assert_eq!(group.len(), 2);

        group.start();
        assert!(ticks.is_started() && calendar.is_started());
        group.stop().await;
        assert!(!ticks.is_started() && !calendar.is_started());
    }
}
