//! Per-node reboot coordination daemon.
//!
//! Decides when this machine is allowed to reboot by reconciling the
//! locally configured policy (instantly, inside a maintenance window, or
//! never) with reboot requests arriving over the local control API.
//!
//! ## Architecture
//!
//! - **Scheduler**: the reboot state machine, one armed timer at most,
//!   window jitter, race-free cancellation.
//! - **Runner**: injectable reboot execution (`systemctl`, or log-only in
//!   debug mode).
//! - **Config**: the persisted policy file and environment-based runtime
//!   settings.
//! - **API**: axum router mapping the control surface onto scheduler calls.

pub mod api;
pub mod config;
pub mod runner;
pub mod scheduler;
pub mod types;
