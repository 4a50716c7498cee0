//! The reboot state machine and its timer.
//!
//! All mutation of the shared context goes through one async mutex; the
//! timer is a spawned task carrying a generation number. Arming a timer
//! bumps the generation and aborts the previous task, and the timer
//! callback re-checks generation and status under the lock before acting,
//! so there is never more than one live timer and a cancel racing a
//! near-fire timer either wins cleanly or the reboot has already been
//! dispatched. The reboot command itself is spawned after the lock is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use reboot_window::MaintWindow;

use crate::config::{ConfigError, ConfigStore};
use crate::runner::RebootRunner;
use crate::types::{RebootMethod, RebootStatus, RebootStrategy};

/// Scheduler outcomes that are not plain successes. The first three are
/// state reports, not failures; only `ConfigWrite` wraps a real error.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A reboot is already requested; carries the existing schedule so a
    /// replayed request learns the original answer.
    #[error("reboot already in progress")]
    AlreadyInProgress {
        method: RebootMethod,
        scheduled_at: Option<DateTime<Utc>>,
    },

    /// Strategy is off or the daemon is paused.
    #[error("reboots are currently disabled")]
    RebootDisabled,

    /// Cancel was called with nothing scheduled.
    #[error("no reboot scheduled")]
    NoRebootScheduled,

    /// A parameter failed validation; names the offending field.
    #[error("invalid {variable}")]
    InvalidParameter { variable: &'static str },

    /// The change was applied in memory but could not be persisted.
    #[error("error writing configuration")]
    ConfigWrite(#[source] ConfigError),
}

/// Successful reboot request: what will run, and when.
#[derive(Debug, Clone, Copy)]
pub struct Scheduled {
    pub method: RebootMethod,
    pub scheduled_at: DateTime<Utc>,
}

/// Point-in-time view for the status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: RebootStatus,
    pub method: Option<RebootMethod>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Point-in-time view including configuration.
#[derive(Debug, Clone)]
pub struct FullStatusReport {
    pub status: RebootStatus,
    pub strategy: RebootStrategy,
    pub method: Option<RebootMethod>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub window: Option<MaintWindow>,
}

struct RebootContext {
    status: RebootStatus,
    method: RebootMethod,
    strategy: RebootStrategy,
    window: Option<MaintWindow>,
    temp_off: bool,
    scheduled_at: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
}

impl RebootContext {
    /// Forget the pending request. Does not abort the timer task; callers
    /// that are not the timer itself use [`reset`](Self::reset).
    fn clear(&mut self) {
        self.timer = None;
        self.status = RebootStatus::NotRequested;
        self.method = RebootMethod::Unknown;
        self.scheduled_at = None;
    }

    /// Disarm the timer and forget the pending request.
    fn reset(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.clear();
    }
}

/// Owns the reboot state machine. One instance per daemon process.
pub struct RebootScheduler {
    ctx: Arc<Mutex<RebootContext>>,
    runner: Arc<dyn RebootRunner>,
    config: ConfigStore,
}

impl RebootScheduler {
    pub fn new(
        runner: Arc<dyn RebootRunner>,
        config: ConfigStore,
        strategy: RebootStrategy,
        window: Option<MaintWindow>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx: Arc::new(Mutex::new(RebootContext {
                status: RebootStatus::NotRequested,
                method: RebootMethod::Unknown,
                strategy,
                window,
                temp_off: false,
                scheduled_at: None,
                timer: None,
                timer_generation: 0,
            })),
            runner,
            config,
        })
    }

    /// Request a reboot. Idempotent: a second request while one is pending
    /// reports the existing schedule instead of changing anything.
    pub async fn request_reboot(
        &self,
        method: RebootMethod,
        force: bool,
    ) -> Result<Scheduled, SchedulerError> {
        let mut ctx = self.ctx.lock().await;

        if ctx.status != RebootStatus::NotRequested {
            info!("reboot already in progress, ignored");
            return Err(SchedulerError::AlreadyInProgress {
                method: ctx.method,
                scheduled_at: ctx.scheduled_at,
            });
        }

        ctx.status = RebootStatus::Requested;
        ctx.method = method;

        if ctx.temp_off || ctx.strategy == RebootStrategy::Off {
            info!("reboot request refused, reboots are disabled");
            ctx.reset();
            return Err(SchedulerError::RebootDisabled);
        }

        let now = Utc::now();
        let target = compute_target(
            ctx.strategy,
            ctx.window.as_ref(),
            force,
            now,
            &mut rand::rng(),
        );

        ctx.timer_generation += 1;
        let generation = ctx.timer_generation;
        if let Some(old) = ctx.timer.take() {
            old.abort();
        }
        ctx.timer = Some(self.arm_timer(target, generation));
        ctx.status = RebootStatus::WaitingWindow;
        ctx.scheduled_at = Some(target);

        info!(
            method = %method,
            scheduled_at = %target,
            in_secs = (target - now).num_seconds(),
            "reboot scheduled"
        );
        Ok(Scheduled {
            method,
            scheduled_at: target,
        })
    }

    /// Cancel a pending reboot. Reports "nothing scheduled" distinctly from
    /// a failure; once the timer has fired the reboot is already dispatched
    /// and there is nothing left to cancel.
    pub async fn cancel(&self) -> Result<(), SchedulerError> {
        let mut ctx = self.ctx.lock().await;
        if ctx.status == RebootStatus::NotRequested {
            return Err(SchedulerError::NoRebootScheduled);
        }
        ctx.reset();
        info!("reboot canceled");
        Ok(())
    }

    /// Change the strategy. Clears a pause and no-ops on an unchanged value.
    /// Every strategy except `off` is persisted; `off` is a transient pause
    /// and restarts come back with the last durable strategy.
    pub async fn set_strategy(&self, strategy: RebootStrategy) -> Result<(), SchedulerError> {
        let mut ctx = self.ctx.lock().await;
        ctx.temp_off = false;
        if ctx.strategy == strategy {
            return Ok(());
        }
        ctx.strategy = strategy;
        info!(strategy = %strategy, "reboot strategy changed");
        drop(ctx);

        if strategy == RebootStrategy::Off {
            return Ok(());
        }
        self.config
            .save_strategy(strategy)
            .map_err(SchedulerError::ConfigWrite)
    }

    /// Change the maintenance window. Validation failures reject with the
    /// offending field name and leave the context untouched. The in-memory
    /// window is applied even if persisting it afterwards fails.
    pub async fn set_window(&self, start: &str, duration: &str) -> Result<(), SchedulerError> {
        let start = start.parse().map_err(|e| {
            warn!(value = start, error = %e, "rejecting window start");
            SchedulerError::InvalidParameter {
                variable: "start time",
            }
        })?;
        let duration = reboot_window::parse_duration(duration).map_err(|e| {
            warn!(value = duration, error = %e, "rejecting window duration");
            SchedulerError::InvalidParameter {
                variable: "duration",
            }
        })?;
        let window = MaintWindow { start, duration };

        let mut ctx = self.ctx.lock().await;
        ctx.window = Some(window.clone());
        info!(start = %window.start, "maintenance window changed");
        drop(ctx);

        self.config
            .save_window(&window)
            .map_err(SchedulerError::ConfigWrite)
    }

    /// Pause or resume the daemon without touching the persisted strategy.
    pub async fn set_active(&self, active: bool) {
        let mut ctx = self.ctx.lock().await;
        ctx.temp_off = !active;
        if active {
            info!("reboot manager enabled again");
        } else {
            info!("reboot manager switched temporarily off");
        }
    }

    /// Current request state. A paused daemon reports NotRequested.
    pub async fn status(&self) -> StatusReport {
        let ctx = self.ctx.lock().await;
        if ctx.temp_off {
            return StatusReport {
                status: RebootStatus::NotRequested,
                method: None,
                scheduled_at: None,
            };
        }
        StatusReport {
            status: ctx.status,
            method: (ctx.status != RebootStatus::NotRequested).then_some(ctx.method),
            scheduled_at: ctx.scheduled_at,
        }
    }

    /// Current request state plus configuration. A paused daemon reports
    /// strategy `off`.
    pub async fn full_status(&self) -> FullStatusReport {
        let ctx = self.ctx.lock().await;
        FullStatusReport {
            status: if ctx.temp_off {
                RebootStatus::NotRequested
            } else {
                ctx.status
            },
            strategy: if ctx.temp_off {
                RebootStrategy::Off
            } else {
                ctx.strategy
            },
            method: (!ctx.temp_off && ctx.status != RebootStatus::NotRequested)
                .then_some(ctx.method),
            scheduled_at: if ctx.temp_off { None } else { ctx.scheduled_at },
            window: ctx.window.clone(),
        }
    }

    fn arm_timer(&self, target: DateTime<Utc>, generation: u64) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let delay = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
            Self::on_timer(&ctx, runner.as_ref(), generation).await;
        })
    }

    /// Timer callback. The decision is made under the lock; the reboot
    /// command runs after it is dropped.
    async fn on_timer(ctx: &Mutex<RebootContext>, runner: &dyn RebootRunner, generation: u64) {
        let method = {
            let mut ctx = ctx.lock().await;
            if ctx.timer_generation != generation || ctx.status != RebootStatus::WaitingWindow {
                debug!("stale reboot timer fired, ignored");
                return;
            }
            if ctx.temp_off {
                debug!("reboot timer fired while paused, skipping");
                ctx.clear();
                return;
            }
            let method = ctx.method;
            ctx.clear();
            method
        };

        info!(method = %method, "reboot triggered now");
        if let Err(e) = runner.reboot(method).await {
            error!(error = %e, "failed to execute reboot");
        }
    }
}

/// Compute when a requested reboot should run.
///
/// `force` and the `instantly` strategy mean now. With a maintenance window
/// configured, now if we are already inside the window, otherwise the next
/// occurrence plus a uniform random offset in `[0, duration)` so a fleet
/// does not restart in one thundering herd at the window's opening instant.
/// Without a window both remaining strategies degrade to now. The `off`
/// strategy never reaches this function.
pub fn compute_target<R: Rng>(
    strategy: RebootStrategy,
    window: Option<&MaintWindow>,
    force: bool,
    now: DateTime<Utc>,
    rng: &mut R,
) -> DateTime<Utc> {
    if force || strategy == RebootStrategy::Instantly {
        return now;
    }
    let Some(window) = window else {
        return now;
    };
    if window.contains(now) {
        return now;
    }
    let next = window.start.next_occurrence(now);
    let jitter_secs = rng.random_range(0..window.duration.as_secs().max(1));
    next + chrono::Duration::seconds(jitter_secs as i64)
}
