//! Run a deployment on one runtime instance.

use crate::deployment::Deployment;
use anyhow::{Context, Result};
use calvin_core::scheduler::RunStats;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cap on fire attempts when running until idle
    pub max_fires: Option<usize>,
    /// Keep running (timers, wakeups) for this long instead
    pub for_ms: Option<u64>,
    pub json: bool,
}

pub async fn run_deployment(
    config: Option<&Path>,
    deployment_path: &Path,
    opts: RunOptions,
) -> Result<()> {
    let deployment = Deployment::from_file(deployment_path)?;
    let mut runtime = super::standard_runtime(config)?;
    deployment
        .deploy(&mut runtime)
        .context("Failed to deploy")?;

    let stats: RunStats = match opts.for_ms {
        Some(ms) => {
            let shutdown = async {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
                }
            };
            runtime.run(shutdown).await
        }
        None => runtime.run_until_idle(opts.max_fires),
    };

    let faults = runtime.faults();
    runtime.shutdown();

    // stdout belongs to io.stdout
    if opts.json {
        let payload = serde_json::json!({
            "fires": stats.fires,
            "idle_checks": stats.idle_checks,
            "faults": faults
                .iter()
                .map(|f| serde_json::json!({
                    "actor": f.actor,
                    "action": f.action,
                    "error": f.error.to_string(),
                }))
                .collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        eprintln!(
            "Run complete: {} fires, {} idle checks, {} faults",
            stats.fires, stats.idle_checks, stats.faults
        );
        for fault in &faults {
            eprintln!("- {} {}: {}", fault.actor, fault.action, fault.error);
        }
    }
    Ok(())
}
