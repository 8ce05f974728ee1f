//! The worker pool scheduler.
//!
//! Consumes a validated [`DependencyGraph`] and drives a fixed pool of
//! worker threads through it: workers claim ready packages, consult the
//! cache, and on a miss run the external build tool with that package's
//! merged environment. All dependency bookkeeping stays on the coordinating
//! thread, so decrementing a dependency count and enqueueing the newly ready
//! node happen as one step and a node can never be queued twice or missed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc;

use thiserror::Error;

use crate::artifact;
use crate::cache::{CacheKey, PackageCache};
use crate::graph::DependencyGraph;
use crate::platform::Platform;
use crate::repo::RepoUrl;
use crate::runner::{BuildInvocation, ProcessRunner};
use crate::settings::BuildSettings;
use crate::types::{PackageName, RVersion};

/// Fatal errors detected before any worker starts.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Nothing to resolve artifacts against.
    #[error("no repositories configured")]
    NoRepositories,
}

/// Lifecycle of one package during a scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on unfinished requirements.
    Pending,
    /// All requirements satisfied, waiting for a worker.
    Ready,
    /// Claimed by a worker.
    Running,
    /// Installed (or already cached).
    Succeeded,
    /// Build failed, or a requirement failed.
    Failed,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final state of one package.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// The package.
    pub package: PackageName,
    /// Terminal state: `Succeeded` or `Failed`.
    pub state: NodeState,
    /// Failure diagnostic, present iff the package failed.
    pub diagnostic: Option<String>,
}

/// Outcome of a full scheduling run, ordered by package name so identical
/// runs produce identical reports.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Per-package outcomes, lexicographic by name.
    pub entries: Vec<ReportEntry>,
    /// True only if every package succeeded.
    pub ok: bool,
}

impl InstallReport {
    /// The packages that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == NodeState::Failed)
    }
}

/// Drives one installation run over an immutable snapshot of the graph,
/// platform, repositories, cache, and settings.
pub struct Scheduler<'a> {
    graph: &'a DependencyGraph,
    platform: &'a Platform,
    repos: &'a [RepoUrl],
    rv: RVersion,
    cache: &'a PackageCache,
    settings: &'a BuildSettings,
    runner: &'a dyn ProcessRunner,
    workers: usize,
}

impl std::fmt::Debug for Scheduler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("packages", &self.graph.len())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler with one worker per CPU.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &'a DependencyGraph,
        platform: &'a Platform,
        repos: &'a [RepoUrl],
        rv: RVersion,
        cache: &'a PackageCache,
        settings: &'a BuildSettings,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            graph,
            platform,
            repos,
            rv,
            cache,
            settings,
            runner,
            workers: num_cpus::get(),
        }
    }

    /// Override the worker thread count (clamped to at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run the full plan to completion.
    ///
    /// Always finishes bookkeeping for every package: a failed build marks
    /// its transitive dependents failed without ever running them, while
    /// independent branches keep installing.
    pub fn run(&self) -> Result<InstallReport, InstallError> {
        if self.repos.is_empty() {
            return Err(InstallError::NoRepositories);
        }

        let names: Vec<&PackageName> = self.graph.names().collect();
        let total = names.len();
        if total == 0 {
            return Ok(InstallReport {
                entries: Vec::new(),
                ok: true,
            });
        }

        let index: HashMap<&PackageName, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // Remaining-requirement counts and reverse edges, indexed like `names`.
        let mut remaining = vec![0usize; total];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
        for (i, name) in names.iter().enumerate() {
            let record = self.graph.get(name).expect("names come from the graph");
            remaining[i] = record.requires.len();
            for req in &record.requires {
                dependents[index[req]].push(i);
            }
        }

        let mut states: Vec<NodeState> = remaining
            .iter()
            .map(|&r| {
                if r == 0 {
                    NodeState::Ready
                } else {
                    NodeState::Pending
                }
            })
            .collect();
        let mut diagnostics: Vec<Option<String>> = vec![None; total];

        let workers = self.workers.min(total);
        tracing::info!(
            packages = total,
            workers,
            cache = %self.cache.root().display(),
            "starting installation"
        );

        let (job_tx, job_rx) = mpsc::channel::<usize>();
        let (result_tx, result_rx) = mpsc::channel::<(usize, Result<(), String>)>();
        let job_rx = Mutex::new(job_rx);
        let job_rx = &job_rx;
        let names = &names;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    loop {
                        // Claim one ready package at a time. The guard is
                        // released before the build runs.
                        let claimed = {
                            match job_rx.lock() {
                                Ok(rx) => rx.recv().ok(),
                                Err(_) => None,
                            }
                        };
                        let Some(idx) = claimed else { break };
                        let outcome = self.execute(names[idx]);
                        if result_tx.send((idx, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            // `names` is sorted, so the initial dispatch order (and therefore
            // the whole run, given a fake single worker) is deterministic.
            for i in 0..total {
                if states[i] == NodeState::Ready {
                    states[i] = NodeState::Running;
                    let _ = job_tx.send(i);
                }
            }

            let mut completed = 0usize;
            while completed < total {
                let Ok((idx, outcome)) = result_rx.recv() else {
                    break;
                };
                match outcome {
                    Ok(()) => {
                        states[idx] = NodeState::Succeeded;
                        completed += 1;
                        tracing::debug!(package = %names[idx], "succeeded");

                        // Decrement and enqueue in the same step; nothing
                        // else mutates the counts.
                        for &dep in &dependents[idx] {
                            if states[dep] != NodeState::Pending {
                                continue;
                            }
                            remaining[dep] -= 1;
                            if remaining[dep] == 0 {
                                states[dep] = NodeState::Running;
                                let _ = job_tx.send(dep);
                            }
                        }
                    }
                    Err(diagnostic) => {
                        states[idx] = NodeState::Failed;
                        tracing::error!(package = %names[idx], %diagnostic, "install failed");
                        diagnostics[idx] = Some(diagnostic);
                        completed += 1;

                        // Fail every transitive dependent without running it.
                        let mut stack = vec![idx];
                        while let Some(failed) = stack.pop() {
                            for &dep in &dependents[failed] {
                                if states[dep] != NodeState::Pending {
                                    continue;
                                }
                                states[dep] = NodeState::Failed;
                                diagnostics[dep] = Some(format!(
                                    "not installed: requirement {} failed",
                                    names[failed]
                                ));
                                completed += 1;
                                stack.push(dep);
                            }
                        }
                    }
                }
            }

            // Closing the job channel releases any idle workers.
            drop(job_tx);
        });

        let entries: Vec<ReportEntry> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ReportEntry {
                package: (*name).clone(),
                state: states[i],
                diagnostic: diagnostics[i].take(),
            })
            .collect();
        let ok = entries.iter().all(|e| e.state == NodeState::Succeeded);

        tracing::info!(
            succeeded = entries.iter().filter(|e| e.state == NodeState::Succeeded).count(),
            failed = entries.iter().filter(|e| e.state == NodeState::Failed).count(),
            "installation finished"
        );

        Ok(InstallReport { entries, ok })
    }

    /// Install one package on the calling worker thread.
    fn execute(&self, name: &PackageName) -> Result<(), String> {
        let record = self
            .graph
            .get(name)
            .expect("scheduled packages come from the graph");
        let repo = self.repo_for(&record.source);
        let artifact = artifact::resolve(
            &record.package,
            &record.version,
            self.platform,
            repo,
            &self.rv,
        );
        let key = CacheKey::new(repo, &record.package, &record.version, artifact.kind);

        if self.cache.lookup(&key).is_some() {
            tracing::info!(package = %name, "cache hit, skipping build");
            return Ok(());
        }

        let staging = tempfile::tempdir_in(self.cache.root())
            .map_err(|e| format!("could not create staging directory: {e}"))?;

        let invocation = BuildInvocation {
            package: record.package.clone(),
            version: record.version.clone(),
            program: self.settings.program.clone(),
            args: vec![
                "CMD".to_string(),
                "INSTALL".to_string(),
                format!("--library={}", self.settings.library.display()),
                artifact.locator.clone(),
            ],
            dir: staging.path().to_path_buf(),
            env: self.settings.env_for(name),
            timeout: self.settings.timeout,
        };

        let output = self.runner.run(&invocation).map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(format!(
                "build tool exited with code {}: {}",
                output.code,
                tail(&output.stderr)
            ));
        }

        // Only succeeded builds are eligible for cache storage. The tool may
        // legitimately produce nothing here (binary installs unpack in
        // place), so a missing artifact is not an error.
        let produced = staging.path().join(&artifact.file_name);
        if produced.exists() {
            if let Err(err) = self.cache.store(&key, &produced) {
                tracing::warn!(package = %name, %err, "built but could not cache artifact");
            }
        }
        Ok(())
    }

    /// The repository a record's `Source` names, or the highest-priority
    /// one when the name is unknown.
    fn repo_for(&self, source: &str) -> &RepoUrl {
        self.repos
            .iter()
            .find(|r| r.name == source)
            .unwrap_or(&self.repos[0])
    }
}

/// Last few lines of captured stderr, enough to say why a build died.
fn tail(stderr: &str) -> String {
    const KEEP: usize = 4;
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(KEEP);
    lines[start..].join(" | ")
}
