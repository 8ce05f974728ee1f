//! Plan command: report what an installation would do.

use std::path::Path;

use anyhow::Result;

use super::PlanContext;

pub(crate) fn plan(config_path: &Path, threads: Option<usize>) -> Result<()> {
    let ctx = PlanContext::load(config_path, threads)?;
    let cache = ctx.open_cache()?;

    for repo in &ctx.repos {
        tracing::info!(repo = %repo.name, identity = %repo.identity(), "repository cache namespace");
    }
    tracing::info!("package installation cache directory: {}", cache.root().display());
    tracing::info!("installation would launch {} workers", ctx.workers);
    tracing::info!(library = %ctx.library, "install library");

    for name in ctx.graph.install_plan() {
        let record = ctx.graph.get(&name).expect("plan entries come from the graph");
        let origin = if ctx.is_user_defined(&name) {
            "user_defined"
        } else {
            "dependency"
        };
        tracing::info!(
            package = %record.package,
            version = %record.version,
            source = %record.source,
            origin,
            "to install"
        );
    }

    Ok(())
}
