//! Install command: run the full plan through the scheduler.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};

use rpkg_core::scheduler::{NodeState, Scheduler};
use rpkg_core::settings::{BuildSettings, apply_customizations};
use rpkg_core::SystemRunner;

use super::PlanContext;

pub(crate) fn install(config_path: &Path, threads: Option<usize>, timeout: Option<u64>) -> Result<()> {
    let ctx = PlanContext::load(config_path, threads)?;
    let cache = ctx.open_cache()?;

    let mut settings = BuildSettings::new("R", &ctx.library);
    settings.timeout = timeout.map(Duration::from_secs);
    let settings = apply_customizations(&ctx.config, settings);

    let runner = SystemRunner;
    let report = Scheduler::new(
        &ctx.graph,
        &ctx.platform,
        &ctx.repos,
        ctx.rv,
        &cache,
        &settings,
        &runner,
    )
    .with_workers(ctx.workers)
    .run()?;

    for entry in &report.entries {
        match entry.state {
            NodeState::Succeeded => tracing::info!(package = %entry.package, "installed"),
            _ => tracing::error!(
                package = %entry.package,
                reason = entry.diagnostic.as_deref().unwrap_or("unknown"),
                "not installed"
            ),
        }
    }

    if !report.ok {
        bail!("{} package(s) failed to install", report.failures().count());
    }
    Ok(())
}
