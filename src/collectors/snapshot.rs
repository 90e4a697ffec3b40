//! Point-in-time snapshots of the collecting process's view of the host.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

use crate::collectors::collector::{CollectContext, Collectable};
use crate::constants::{ENVIRONMENT_FILENAME, HOSTNAME_FILENAME};
use crate::error::CollectResult;

/// Environment variables of the collector process, written to `environment.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment;

/// Network name of the machine, written to `hostname.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hostname;

/// Environment as a sorted map. Non-UTF-8 names and values are converted lossily.
pub fn environment_variables() -> BTreeMap<String, String> {
    env::vars_os()
        .map(|(key, value)| {
            (key.to_string_lossy().to_string(), value.to_string_lossy().to_string())
        })
        .collect()
}

/// Hostname of the machine, or "unknown" if it cannot be read.
pub fn current_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().to_string(),
        Err(e) => {
            warn!("Failed to read hostname: {}", e);
            "unknown".to_string()
        }
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> CollectResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content).await?;
    debug!("Wrote {}", path.display());
    Ok(())
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "environment variables")
    }
}

#[async_trait]
impl Collectable for Environment {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        write_json(&ctx.target_dir.join(ENVIRONMENT_FILENAME), &environment_variables()).await
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hostname")
    }
}

#[async_trait]
impl Collectable for Hostname {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        let snapshot = json!({ "hostname": current_hostname() });
        write_json(&ctx.target_dir.join(HOSTNAME_FILENAME), &snapshot).await
    }
}
