//! Core enums of the reboot state machine and their wire forms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebootStatus {
    /// Nothing pending.
    NotRequested,

    /// A reboot was requested and a target time is being computed.
    Requested,

    /// A timer is armed for the scheduled time.
    WaitingWindow,
}

/// How to restart the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebootMethod {
    /// Full machine restart.
    Hard,

    /// Userspace-only restart.
    Soft,

    Unknown,
}

/// The configured reboot policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebootStrategy {
    /// Use the maintenance window when one is configured, reboot right away
    /// otherwise.
    BestEffort,

    /// Always reboot right away.
    Instantly,

    /// Only reboot inside the maintenance window.
    MaintWindow,

    /// Never reboot.
    Off,
}

/// Strategy string was not one of the enumerated values.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown reboot strategy '{0}'")]
pub struct InvalidStrategy(pub String);

impl FromStr for RebootStrategy {
    type Err = InvalidStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            "instantly" => Ok(Self::Instantly),
            "maint-window" | "maint_window" => Ok(Self::MaintWindow),
            "off" => Ok(Self::Off),
            _ => Err(InvalidStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for RebootStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BestEffort => "best-effort",
            Self::Instantly => "instantly",
            Self::MaintWindow => "maint-window",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RebootMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RebootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotRequested => "not-requested",
            Self::Requested => "requested",
            Self::WaitingWindow => "waiting-window",
        };
        f.write_str(name)
    }
}
