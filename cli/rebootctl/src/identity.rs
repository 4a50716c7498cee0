//! Node identity for lock holder entries.

use std::fs;

use anyhow::{bail, Result};

/// The id this machine holds locks under: the machine id, with the kernel
/// hostname as fallback.
pub fn machine_id() -> Result<String> {
    for path in ["/etc/machine-id", "/proc/sys/kernel/hostname"] {
        if let Ok(raw) = fs::read_to_string(path) {
            let id = raw.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }
    bail!("cannot determine a machine id, pass an explicit holder id")
}
