//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all components from a validated [`CoordinatorConfig`]
//! - Wire the leader election to the job scheduler through a supervisor
//! - Register shutdown hooks in dependency order
//! - Bind the probe listener and run until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Components initialize in order, not concurrently
//! - Readiness is signalled last, once supervision runs

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{CoordinatorConfig, CronSettings, JobSettings, LockerBackend, LockerConfig};
use crate::election::{ElectionError, LeaderWatchdog};
use crate::health::{probe_router, serve_probes, ProbeState, ReadinessBarrier, ReadinessSignal};
use crate::lifecycle::orchestrator::Orchestrator;
use crate::lifecycle::shutdown::Priority;
use crate::lifecycle::supervisor::{LeaderSupervisor, Subsystem};
use crate::locker::{InMemoryLocker, LockError, Locker};
use crate::scheduler::{CronScheduler, JobConfig, JobScheduler, SchedulerError, SchedulerGroup};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("lock store: {0}")]
    Lock(#[from] LockError),

    #[error("election: {0}")]
    Election(#[from] ElectionError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("failed to bind probe listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("locker.redis_url is required for the redis backend")]
    MissingRedisUrl,

    #[error("redis lock backend requires the `redis` feature")]
    RedisUnsupported,
}

/// A fully wired coordinator process, ready to [`run`](Service::run).
pub struct Service {
    orchestrator: Arc<Orchestrator>,
    readiness: Arc<ReadinessBarrier>,
    watchdog: Arc<LeaderWatchdog>,
    scheduler: Arc<JobScheduler>,
    cron: Arc<CronScheduler>,
    supervisor: Arc<LeaderSupervisor>,
    election: String,
    probes: Option<TcpListener>,
}

/// Build every component described by `config`.
pub async fn build_service(config: &CoordinatorConfig) -> Result<Service, StartupError> {
    let orchestrator = Arc::new(Orchestrator::new());
    let root = orchestrator.token();

    let locker = build_locker(&config.locker).await?;
    tracing::info!(backend = ?config.locker.backend, "Lock store initialized");

    let readiness = Arc::new(ReadinessBarrier::new(config.readiness.name.clone(), &root));
    readiness.start();
    {
        let readiness = readiness.clone();
        orchestrator.register_shutdown(
            "readiness-barrier",
            Priority::IMMEDIATE,
            move || async move {
                readiness.stop().await;
            },
        );
    }

    let scheduler = Arc::new(
        JobScheduler::new(config.scheduler.rate)
            .with_parent(&root)
            .with_reporter(orchestrator.reporter()),
    );
    for job in &config.jobs {
        scheduler.add(heartbeat_job(job))?;
    }
    let cron = Arc::new(
        CronScheduler::new()
            .with_parent(&root)
            .with_reporter(orchestrator.reporter()),
    );
    for entry in &config.cron {
        add_cron_heartbeat(&cron, entry)?;
    }

    let watchdog = Arc::new(
        LeaderWatchdog::new(locker, &root)
            .with_reporter(orchestrator.reporter())
            .with_panic_barrier(orchestrator.panic_barrier()),
    );
    let election = config.election.to_election_config();
    let events = watchdog.elect(election.clone())?;
    {
        let watchdog = watchdog.clone();
        orchestrator.register_shutdown("leader-watchdog", Priority::HIGH, move || async move {
            watchdog.stop().await;
        });
    }

    let mut group = SchedulerGroup::new(vec![scheduler.clone()]);
    group.push_cron(cron.clone());
    let subsystem: Arc<dyn Subsystem> = Arc::new(group);
    let supervisor =
        orchestrator.register_leader_supervisor(election.name.clone(), events, subsystem);
    tracing::info!(
        election = %election.name,
        jobs = config.jobs.len(),
        cron_jobs = config.cron.len(),
        rate = config.scheduler.rate,
        "Leader supervisor registered"
    );

    let probes = if config.probes.enabled {
        let addr = config.probes.bind_address.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        Some(listener)
    } else {
        None
    };

    Ok(Service {
        orchestrator,
        readiness,
        watchdog,
        scheduler,
        cron,
        supervisor,
        election: election.name,
        probes,
    })
}

impl Service {
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn readiness(&self) -> &Arc<ReadinessBarrier> {
        &self.readiness
    }

    pub fn watchdog(&self) -> &Arc<LeaderWatchdog> {
        &self.watchdog
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn cron(&self) -> &Arc<CronScheduler> {
        &self.cron
    }

    pub fn supervisor(&self) -> &Arc<LeaderSupervisor> {
        &self.supervisor
    }

    pub fn election(&self) -> &str {
        &self.election
    }

    /// Serve probes, start supervision, report ready, then block until a
    /// signal, panic or shutdown request, and shut down in order.
    pub async fn run(self) {
        let orchestrator = self.orchestrator;
        orchestrator.install_signal_handling();

        if let Some(listener) = self.probes {
            let router = probe_router(ProbeState {
                readiness: self.readiness.clone(),
                orchestrator: orchestrator.clone(),
            });
            // Outlives the root token so probes answer while hooks drain.
            let stop = CancellationToken::new();
            let server = tokio::spawn(serve_probes(listener, router, stop.clone()));
            orchestrator.register_shutdown("probe-server", Priority::LOWEST, move || async move {
                stop.cancel();
                match server.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Probe server failed"),
                    Err(e) => tracing::error!(error = %e, "Probe server task failed"),
                }
            });
        }

        orchestrator.run_supervision();

        if let Err(e) = self
            .readiness
            .send_signal(ReadinessSignal::MakeReady, &orchestrator.token())
            .await
        {
            tracing::warn!(error = %e, "Could not mark service ready");
        }
        tracing::info!(election = %self.election, "Coordinator running");

        orchestrator.run().await;
        orchestrator.shutdown().await;
        tracing::info!("Coordinator stopped");
    }
}

async fn build_locker(config: &LockerConfig) -> Result<Arc<dyn Locker>, StartupError> {
    match config.backend {
        LockerBackend::Memory => {
            let prefix = config.key_prefix.clone();
            Ok(Arc::new(InMemoryLocker::with_prefix(prefix)))
        }
        LockerBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &LockerConfig) -> Result<Arc<dyn Locker>, StartupError> {
    let url = config
        .redis_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or(StartupError::MissingRedisUrl)?;
    let prefix = config.key_prefix.clone();
    let locker = crate::locker::RedisLocker::connect_with_prefix(url, prefix).await?;
    Ok(Arc::new(locker))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &LockerConfig) -> Result<Arc<dyn Locker>, StartupError> {
    Err(StartupError::RedisUnsupported)
}

/// A configured job that records one heartbeat per tick while leading.
fn heartbeat_job(settings: &JobSettings) -> JobConfig {
    let job = JobConfig::new(
        settings.name.clone(),
        Duration::from_millis(settings.tick_ms),
        |ctx| async move {
            tracing::info!(job = ctx.job_name(), "Heartbeat");
            Ok(())
        },
    )
    .stop_mode(settings.stop_mode);
    match settings.deadline_ms {
        Some(ms) => job.deadline(Duration::from_millis(ms)),
        None => job,
    }
}

/// A configured calendar job that records one heartbeat per fire.
fn add_cron_heartbeat(cron: &CronScheduler, settings: &CronSettings) -> Result<(), SchedulerError> {
    cron.add(settings.name.clone(), &settings.schedule, |ctx| async move {
        tracing::info!(job = ctx.job_name(), "Cron heartbeat");
        Ok(())
    })
}
