//! Heartbeat artifact: written at the very start of every tick, before
//! anything that could fail, so external watchdogs see the process as alive
//! even when reconciliation itself is stalling.

use chrono::{DateTime, Utc};
use std::path::Path;

pub fn write(path: &Path, now: DateTime<Utc>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, now.to_rfc3339())
}
