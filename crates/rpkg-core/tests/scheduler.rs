//! End-to-end scheduling tests with a deterministic fake build tool.
//!
//! The key property under test: for every dependency edge A -> B, B has
//! succeeded before any worker claims A, under any worker count and
//! interleaving.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rpkg_core::cache::PackageCache;
use rpkg_core::graph::{DependencyGraph, base_packages};
use rpkg_core::lockfile::{PackageRecord, parse_records};
use rpkg_core::platform::{Os, Platform};
use rpkg_core::repo::RepoUrl;
use rpkg_core::runner::{BuildInvocation, ProcessOutput, ProcessRunner, RunnerError};
use rpkg_core::scheduler::{NodeState, Scheduler};
use rpkg_core::settings::BuildSettings;
use rpkg_core::types::{PackageName, RVersion};

/// A fake build tool that asserts the scheduling invariant at claim time:
/// every requirement of the package being built must already have finished.
struct InvariantRunner {
    requires: HashMap<PackageName, Vec<PackageName>>,
    finished: Mutex<HashSet<PackageName>>,
    violations: Mutex<Vec<String>>,
    fail: HashSet<PackageName>,
    max_delay_ms: u64,
}

impl InvariantRunner {
    fn new(records: &[PackageRecord], fail: &[&str], max_delay_ms: u64) -> Self {
        Self {
            requires: records
                .iter()
                .map(|r| (r.package.clone(), r.requires.clone()))
                .collect(),
            finished: Mutex::new(HashSet::new()),
            violations: Mutex::new(Vec::new()),
            fail: fail.iter().map(|n| PackageName::new(n)).collect(),
            max_delay_ms,
        }
    }

    fn assert_clean(&self) {
        let violations = self.violations.lock().unwrap();
        assert!(violations.is_empty(), "ordering violations: {violations:?}");
    }
}

impl ProcessRunner for InvariantRunner {
    fn run(&self, invocation: &BuildInvocation) -> Result<ProcessOutput, RunnerError> {
        {
            let finished = self.finished.lock().unwrap();
            for req in &self.requires[&invocation.package] {
                // Requirements outside the record set (base packages) are
                // satisfied by definition.
                if !self.requires.contains_key(req) {
                    continue;
                }
                if !finished.contains(req) {
                    self.violations.lock().unwrap().push(format!(
                        "{} claimed before requirement {} finished",
                        invocation.package, req
                    ));
                }
            }
        }

        // Shake up thread interleavings a little.
        if self.max_delay_ms > 0 {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos() as u64;
            std::thread::sleep(Duration::from_millis(nanos % self.max_delay_ms));
        }

        let failed = self.fail.contains(&invocation.package);
        if !failed {
            self.finished.lock().unwrap().insert(invocation.package.clone());
        }
        Ok(ProcessOutput {
            code: if failed { 1 } else { 0 },
            stdout: String::new(),
            stderr: if failed { "boom".to_string() } else { String::new() },
        })
    }
}

struct Fixture {
    platform: Platform,
    repos: Vec<RepoUrl>,
    _dir: tempfile::TempDir,
    cache: PackageCache,
    settings: BuildSettings,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().join("cache")).unwrap();
        Self {
            platform: Platform::new(Os::MacOs, None),
            repos: vec![RepoUrl::new("CRAN", "https://cran.r-project.org")],
            _dir: dir,
            cache,
            settings: BuildSettings::new("R", "library"),
        }
    }

    fn run(&self, graph: &DependencyGraph, runner: &dyn ProcessRunner, workers: usize) -> rpkg_core::InstallReport {
        Scheduler::new(
            graph,
            &self.platform,
            &self.repos,
            RVersion::new(4, 1, 2),
            &self.cache,
            &self.settings,
            runner,
        )
        .with_workers(workers)
        .run()
        .unwrap()
    }
}

fn record(name: &str, requires: &[&str]) -> PackageRecord {
    PackageRecord {
        package: PackageName::new(name),
        version: "1.0.0".into(),
        source: "CRAN".to_string(),
        hash: String::new(),
        requires: requires.iter().map(|r| PackageName::new(r)).collect(),
    }
}

/// A random DAG with edges only from later to earlier indices, so it is
/// acyclic by construction.
fn random_records(rng: &mut StdRng, nodes: usize, edge_prob: f64) -> Vec<PackageRecord> {
    (0..nodes)
        .map(|i| {
            let mut rec = record(&format!("pkg{i:02}"), &[]);
            for j in 0..i {
                if rng.random_bool(edge_prob) {
                    rec.requires.push(PackageName::new(&format!("pkg{j:02}")));
                }
            }
            rec
        })
        .collect()
}

#[test]
fn random_graphs_never_violate_dependency_order() {
    let mut rng = StdRng::seed_from_u64(0x7052_6b67);

    for &workers in &[1usize, 2, 4, 8] {
        for round in 0..4 {
            let records = random_records(&mut rng, 24, 0.2);
            let graph = DependencyGraph::build(records.clone(), &HashSet::new()).unwrap();
            let runner = InvariantRunner::new(&records, &[], 3);

            let fixture = Fixture::new();
            let report = fixture.run(&graph, &runner, workers);

            runner.assert_clean();
            assert!(report.ok, "workers={workers} round={round}");
            assert_eq!(report.entries.len(), 24);
        }
    }
}

#[test]
fn random_graphs_propagate_failures_exactly() {
    let mut rng = StdRng::seed_from_u64(0x6661_696c);
    let records = random_records(&mut rng, 20, 0.25);
    let graph = DependencyGraph::build(records.clone(), &HashSet::new()).unwrap();

    // Fail one mid-graph package and compute its transitive dependents.
    let victim = "pkg07";
    let mut doomed: HashSet<PackageName> = HashSet::from([PackageName::new(victim)]);
    loop {
        let before = doomed.len();
        for rec in &records {
            if rec.requires.iter().any(|r| doomed.contains(r)) {
                doomed.insert(rec.package.clone());
            }
        }
        if doomed.len() == before {
            break;
        }
    }

    let runner = InvariantRunner::new(&records, &[victim], 2);
    let fixture = Fixture::new();
    let report = fixture.run(&graph, &runner, 4);

    runner.assert_clean();
    assert!(!report.ok);
    for entry in &report.entries {
        let expected = if doomed.contains(&entry.package) {
            NodeState::Failed
        } else {
            NodeState::Succeeded
        };
        assert_eq!(entry.state, expected, "package {}", entry.package);
    }
}

#[test]
fn independent_branches_survive_a_failing_chain() {
    let records = vec![
        record("broken-top", &["broken-base"]),
        record("broken-base", &[]),
        record("healthy-top", &["healthy-base"]),
        record("healthy-base", &[]),
    ];
    let graph = DependencyGraph::build(records.clone(), &HashSet::new()).unwrap();
    let runner = InvariantRunner::new(&records, &["broken-base"], 0);

    let fixture = Fixture::new();
    let report = fixture.run(&graph, &runner, 1);

    let state = |name: &str| {
        report
            .entries
            .iter()
            .find(|e| e.package == name)
            .unwrap()
            .state
    };
    assert_eq!(state("broken-base"), NodeState::Failed);
    assert_eq!(state("broken-top"), NodeState::Failed);
    assert_eq!(state("healthy-base"), NodeState::Succeeded);
    assert_eq!(state("healthy-top"), NodeState::Succeeded);
}

#[test]
fn full_pipeline_from_lockfile_text() {
    let lockfile = "\
Package: pillar
Version: 1.6.1
Source: CRAN
Hash: aabbccdd
Requires: cli, crayon

Package: cli
Version: 2.5.0
Source: CRAN
Hash: 11223344
Requires: utils

Package: crayon
Version: 1.4.1
Source: CRAN
Hash: 55667788
";
    let records = parse_records(lockfile);
    assert_eq!(records.len(), 3);

    let graph = DependencyGraph::build(records.clone(), &base_packages()).unwrap();
    assert_eq!(
        graph.install_plan(),
        vec![PackageName::from("cli"), PackageName::from("crayon"), PackageName::from("pillar")]
    );

    let runner = InvariantRunner::new(&records, &[], 1);
    let fixture = Fixture::new();
    let report = fixture.run(&graph, &runner, 2);

    runner.assert_clean();
    assert!(report.ok);
    assert!(report.entries.iter().all(|e| e.state == NodeState::Succeeded));
}
