//! Reboot execution interface.
//!
//! The scheduler never talks to the OS directly; it goes through the
//! [`RebootRunner`] trait so the daemon's debug mode and the tests can
//! substitute the real `systemctl` invocation.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::types::RebootMethod;

const SYSTEMCTL: &str = "/usr/bin/systemctl";

/// Executes the actual reboot for a method.
#[async_trait]
pub trait RebootRunner: Send + Sync {
    async fn reboot(&self, method: RebootMethod) -> Result<()>;
}

/// Production runner: spawns `systemctl reboot` / `systemctl soft-reboot`
/// as a detached child and does not wait for it.
pub struct SystemctlRunner;

#[async_trait]
impl RebootRunner for SystemctlRunner {
    async fn reboot(&self, method: RebootMethod) -> Result<()> {
        let verb = match method {
            RebootMethod::Soft => "soft-reboot",
            RebootMethod::Hard | RebootMethod::Unknown => "reboot",
        };
        info!(verb, "spawning systemctl");
        tokio::process::Command::new(SYSTEMCTL)
            .arg(verb)
            .spawn()
            .with_context(|| format!("spawning {SYSTEMCTL} {verb}"))?;
        Ok(())
    }
}

/// Debug-mode runner: logs what would have happened, reboots nothing.
pub struct LogOnlyRunner;

#[async_trait]
impl RebootRunner for LogOnlyRunner {
    async fn reboot(&self, method: RebootMethod) -> Result<()> {
        let verb = match method {
            RebootMethod::Soft => "soft-reboot",
            RebootMethod::Hard | RebootMethod::Unknown => "reboot",
        };
        info!(verb, "debug mode, systemctl not called");
        Ok(())
    }
}

/// Recording runner for tests.
pub struct MockRunner {
    calls: Mutex<Vec<RebootMethod>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Methods passed to `reboot` so far, in order.
    pub fn calls(&self) -> Vec<RebootMethod> {
        self.calls.lock().expect("mock runner poisoned").clone()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RebootRunner for MockRunner {
    async fn reboot(&self, method: RebootMethod) -> Result<()> {
        self.calls.lock().expect("mock runner poisoned").push(method);
        Ok(())
    }
}
