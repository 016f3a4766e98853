//! Scan scheduling engine.
//!
//! Spawns one tokio task per configured target, each running a scan cycle
//! at the target's interval. The first cycle fires as soon as the daemon
//! starts. The orchestrator's cycle lock keeps cycles from overlapping, so
//! a slow cycle delays the next tick instead of racing it.

use tokio::time::{interval, MissedTickBehavior};

use lanventory_core::{PortSelection, ScanTarget};

use crate::config::{DiscoverConfig, TargetSchedule};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::scanner::HostScanner;

/// The scheduler manages periodic scan cycles for multiple targets.
pub struct ScanScheduler<S> {
    config: DiscoverConfig,
    orchestrator: Orchestrator<S>,
}

impl<S: HostScanner> ScanScheduler<S> {
    pub fn new(config: DiscoverConfig, orchestrator: Orchestrator<S>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Run the scheduler, spawning a tokio task per enabled target.
    /// Blocks until every task ends or the runtime shuts down.
    ///
    /// Targets are validated before any task starts.
    pub async fn run(&self) -> Result<()> {
        let mut jobs = Vec::new();
        for schedule in &self.config.targets {
            if !schedule.enabled {
                tracing::info!(cidr = %schedule.cidr, "Target disabled, skipping");
                continue;
            }
            jobs.push((
                schedule.clone(),
                schedule.scan_target()?,
                schedule.port_selection()?,
            ));
        }

        let mut handles = Vec::new();
        for (schedule, target, ports) in jobs {
            let orchestrator = self.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                run_target_loop(orchestrator, schedule, target, ports).await;
            }));
        }

        tracing::info!(target_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Target scan task panicked");
            }
        }

        Ok(())
    }
}

/// Per-target scan loop with configurable interval.
async fn run_target_loop<S: HostScanner>(
    orchestrator: Orchestrator<S>,
    schedule: TargetSchedule,
    target: ScanTarget,
    ports: PortSelection,
) {
    let mut ticker = interval(schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        tracing::info!(
            cidr = %target,
            name = %schedule.label(),
            "Scheduled scan triggered"
        );

        if let Err(e) = orchestrator.run_cycle(&target, &ports).await {
            tracing::error!(cidr = %target, error = %e, "Scheduled scan failed");
        }
    }
}
