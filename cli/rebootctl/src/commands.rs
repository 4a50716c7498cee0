//! Command definitions and dispatch.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use reboot_lock::{DistributedLock, EtcdClient, DEFAULT_GROUP};

use crate::client::DaemonClient;
use crate::error::CliError;
use crate::identity;

#[derive(Debug, Parser)]
#[command(
    name = "rebootctl",
    about = "Control the reboot daemon and the fleet reboot locks",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Request a reboot at the next allowed time
    Reboot {
        /// Userspace-only soft reboot
        #[arg(long)]
        soft: bool,

        /// Reboot now, ignoring the maintenance window
        #[arg(long)]
        force: bool,
    },

    /// Cancel a pending reboot
    Cancel,

    /// Show the daemon's status
    Status {
        /// Include strategy and maintenance window configuration
        #[arg(long)]
        full: bool,
    },

    /// Check whether the daemon is running
    IsActive {
        /// Report only through the exit code
        #[arg(short, long)]
        quiet: bool,
    },

    /// Set the reboot strategy
    SetStrategy {
        /// One of best-effort, instantly, maint-window, off
        strategy: String,
    },

    /// Print the current reboot strategy
    GetStrategy,

    /// Set the maintenance window
    SetWindow {
        /// Window start, e.g. "03:30" or "Mon,Fri 03:30"
        start: String,

        /// Window length, e.g. "1h30m"
        duration: String,
    },

    /// Print the maintenance window
    GetWindow,

    /// Pause the daemon without changing the persisted strategy
    Pause,

    /// Resume a paused daemon
    Resume,

    /// Take a slot in a reboot lock group
    Lock {
        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,

        /// Holder id, defaults to this machine's id
        id: Option<String>,
    },

    /// Give back a slot in a reboot lock group
    Unlock {
        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,

        /// Holder id, defaults to this machine's id
        id: Option<String>,
    },

    /// Set how many machines may hold a lock group at once
    SetMax {
        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,

        max: i64,
    },

    /// Show a lock group's capacity and holders
    Locks {
        #[arg(long, default_value = DEFAULT_GROUP)]
        group: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Reboot { soft, force } => {
                let method = if soft { "soft" } else { "hard" };
                let scheduled = DaemonClient::from_env().reboot(method, force).await?;
                println!(
                    "{} reboot scheduled for {}",
                    scheduled.method, scheduled.scheduled_at
                );
            }
            Command::Cancel => {
                DaemonClient::from_env().cancel().await?;
                println!("Reboot canceled");
            }
            Command::Status { full } => {
                let client = DaemonClient::from_env();
                if full {
                    let status = client.full_status().await?;
                    println!("Reboot status: {}", status.status);
                    println!("Reboot strategy: {}", status.strategy);
                    if let Some(method) = status.requested_method {
                        println!("Requested method: {method}");
                    }
                    if let Some(time) = status.reboot_time {
                        println!("Reboot time: {time}");
                    }
                    match (status.window_start, status.window_duration) {
                        (Some(start), Some(duration)) => {
                            println!("Maintenance window: {start} for {duration}");
                        }
                        _ => println!("No maintenance window configured"),
                    }
                } else {
                    let status = client.status().await?;
                    println!("Reboot status: {}", status.status);
                    if let Some(method) = status.requested_method {
                        println!("Requested method: {method}");
                    }
                    if let Some(time) = status.reboot_time {
                        println!("Reboot time: {time}");
                    }
                }
            }
            Command::IsActive { quiet } => {
                let alive = DaemonClient::from_env().is_alive().await;
                if !quiet {
                    if alive {
                        println!("rebootd is active");
                    } else {
                        println!("rebootd is dead");
                    }
                }
                if !alive {
                    std::process::exit(1);
                }
            }
            Command::SetStrategy { strategy } => {
                DaemonClient::from_env().set_strategy(&strategy).await?;
                println!("Reboot strategy set to {strategy}");
            }
            Command::GetStrategy => {
                let status = DaemonClient::from_env().full_status().await?;
                println!("Reboot strategy: {}", status.strategy);
            }
            Command::SetWindow { start, duration } => {
                DaemonClient::from_env().set_window(&start, &duration).await?;
                println!("Maintenance window set to {start} for {duration}");
            }
            Command::GetWindow => {
                let status = DaemonClient::from_env().full_status().await?;
                match (status.window_start, status.window_duration) {
                    (Some(start), Some(duration)) => {
                        println!("Maintenance window: {start} for {duration}");
                    }
                    _ => println!("No maintenance window configured"),
                }
            }
            Command::Pause => {
                DaemonClient::from_env().set_active(false).await?;
                println!("Reboot manager paused");
            }
            Command::Resume => {
                DaemonClient::from_env().set_active(true).await?;
                println!("Reboot manager resumed");
            }
            Command::Lock { group, id } => {
                let lock = lock_client().await?;
                let id = holder_id(id)?;
                lock.acquire(&group, &id).await?;
                println!("Lock acquired for {id} in group {group}");
            }
            Command::Unlock { group, id } => {
                let lock = lock_client().await?;
                let id = holder_id(id)?;
                lock.release(&group, &id).await?;
                println!("Lock released for {id} in group {group}");
            }
            Command::SetMax { group, max } => {
                let lock = lock_client().await?;
                lock.set_capacity(&group, max).await?;
                println!("Group {group} now allows {max} concurrent holders");
            }
            Command::Locks { group } => {
                let lock = lock_client().await?;
                let state = lock.group_state(&group).await?;
                println!(
                    "Group {group}: {}/{} slots taken",
                    state.holder_count(),
                    state.capacity
                );
                for holder in &state.holders {
                    println!("  {holder}");
                }
            }
        }
        Ok(())
    }
}

/// Connect to the lock backend, refusing early when it is unreachable.
async fn lock_client() -> Result<DistributedLock> {
    let url =
        std::env::var("REBOOTD_KV_URL").unwrap_or_else(|_| "http://127.0.0.1:2379".to_string());
    let lock = DistributedLock::new(Arc::new(EtcdClient::new(url)));
    if !lock.is_available().await {
        return Err(CliError::LockBackendUnavailable.into());
    }
    Ok(lock)
}

fn holder_id(explicit: Option<String>) -> Result<String> {
    match explicit {
        Some(id) => Ok(id),
        None => identity::machine_id(),
    }
}
