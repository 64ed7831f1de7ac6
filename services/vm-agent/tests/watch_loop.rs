//! Integration tests for the metadata watch loop.
//!
//! These drive the loop with a scripted metadata source and verify:
//! 1. Which domains get `set()` across cycles
//! 2. Fetch failure logging and retry behavior
//! 3. Snapshot succession and shutdown handling

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;
use vmagent::domains::{self, MockHost};
use vmagent::metadata::{FetchError, MetadataSource, NetworkInterface, Snapshot};
use vmagent::{WatchLoop, WatchStats};
use vmagent_reconcile::{ApplyError, CycleInputs, Dispatcher, Domain, Registry};

const BACKOFF: Duration = Duration::from_millis(1);

enum Step {
    Snapshot(Snapshot),
    Fail,
    SnapshotThenStop(Snapshot),
}

/// Replays a fixed script, then signals shutdown and blocks forever.
struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    async fn next_snapshot(&self) -> Result<Snapshot, FetchError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Snapshot(s)) => Ok(s),
            Some(Step::Fail) => Err(FetchError::Network("connection refused".to_string())),
            Some(Step::SnapshotThenStop(s)) => {
                let _ = self.shutdown.send(true);
                Ok(s)
            }
            None => {
                let _ = self.shutdown.send(true);
                std::future::pending().await
            }
        }
    }
}

/// Domain with snapshot-equality change detection that counts `set()` calls.
struct Counting {
    name: &'static str,
    inputs: CycleInputs<Snapshot>,
    sets: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Domain for Counting {
    fn name(&self) -> &'static str {
        self.name
    }

    fn disabled(&self) -> bool {
        self.inputs.overrides.get_bool(self.name, "disable").unwrap_or(false)
    }

    fn diff(&self) -> bool {
        self.inputs.previous != self.inputs.current
    }

    async fn set(&self) -> Result<(), ApplyError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ApplyError::Host(format!("{} unavailable", self.name)));
        }
        Ok(())
    }
}

struct Harness {
    sets: HashMap<&'static str, Arc<AtomicUsize>>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            sets: HashMap::new(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn override_path(&self) -> PathBuf {
        self.dir.path().join("instance_configs.cfg")
    }

    fn write_overrides(&self, contents: &str) {
        std::fs::write(self.override_path(), contents).unwrap();
    }

    fn dispatcher(
        &mut self,
        names: &[&'static str],
        failing: &[&'static str],
    ) -> Dispatcher<Snapshot> {
        let mut registry = Registry::new();
        for &name in names {
            let sets = Arc::new(AtomicUsize::new(0));
            self.sets.insert(name, Arc::clone(&sets));
            let fail = failing.contains(&name);
            registry = registry.register((name, move |inputs: &CycleInputs<Snapshot>| {
                Box::new(Counting {
                    name,
                    inputs: inputs.clone(),
                    sets: Arc::clone(&sets),
                    fail,
                }) as Box<dyn Domain>
            }));
        }
        Dispatcher::new(registry)
    }

    fn sets(&self, name: &str) -> usize {
        self.sets[name].load(Ordering::SeqCst)
    }

    async fn run(&self, dispatcher: Dispatcher<Snapshot>, steps: Vec<Step>) -> WatchStats {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let source = ScriptedSource {
            steps: Mutex::new(steps.into()),
            shutdown: shutdown_tx,
        };
        let watch_loop = WatchLoop::new(source, dispatcher, self.override_path(), BACKOFF);
        tokio::time::timeout(Duration::from_secs(10), watch_loop.run(shutdown_rx))
            .await
            .expect("watch loop did not stop")
    }
}

fn snapshot(generation: u64) -> Snapshot {
    let mut s = Snapshot::default();
    s.instance.id = 42;
    s.instance
        .attributes
        .insert("windows-keys".to_string(), format!("generation-{}", generation));
    s
}

const DOMAINS: &[&str] = &["addresses", "accounts", "cluster"];

#[tokio::test]
async fn test_first_cycle_applies_every_enabled_domain_once() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h.run(d, vec![Step::Snapshot(snapshot(1))]).await;

    assert_eq!(stats.cycles, 1);
    for name in DOMAINS {
        assert_eq!(h.sets(name), 1, "{} should be applied once", name);
    }
}

#[tokio::test]
async fn test_identical_snapshot_is_not_reapplied() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h
        .run(d, vec![Step::Snapshot(snapshot(1)), Step::Snapshot(snapshot(1))])
        .await;

    assert_eq!(stats.cycles, 2);
    for name in DOMAINS {
        assert_eq!(h.sets(name), 1);
    }
}

#[tokio::test]
async fn test_disabled_domain_never_applied() {
    let mut h = Harness::new();
    h.write_overrides("[Accounts]\nDisable = true\n");
    let d = h.dispatcher(DOMAINS, &[]);

    let steps = (1..=10).map(|g| Step::Snapshot(snapshot(g))).collect();
    let stats = h.run(d, steps).await;

    assert_eq!(stats.cycles, 10);
    assert_eq!(h.sets("accounts"), 0);
    assert_eq!(h.sets("addresses"), 10);
    assert_eq!(h.sets("cluster"), 10);
}

#[tokio::test]
async fn test_unreadable_overrides_fall_back_to_defaults() {
    let mut h = Harness::new();
    h.write_overrides("[accounts\ndisable = true\n");
    let d = h.dispatcher(DOMAINS, &[]);

    h.run(d, vec![Step::Snapshot(snapshot(1))]).await;

    assert_eq!(h.sets("accounts"), 1);
}

#[tokio::test]
async fn test_failing_domain_is_isolated() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &["addresses"]);

    let stats = h
        .run(d, vec![Step::Snapshot(snapshot(1)), Step::Snapshot(snapshot(2))])
        .await;

    // The cycle still advances, so each new snapshot is dispatched once.
    assert_eq!(stats.cycles, 2);
    assert_eq!(h.sets("addresses"), 2);
    assert_eq!(h.sets("accounts"), 2);
    assert_eq!(h.sets("cluster"), 2);
}

#[tokio::test]
async fn test_failed_apply_still_advances_previous_snapshot() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &["addresses"]);

    let stats = h
        .run(d, vec![Step::Snapshot(snapshot(1)), Step::Snapshot(snapshot(1))])
        .await;

    // The repeat matches the advanced previous snapshot, so nothing retries.
    assert_eq!(stats.cycles, 2);
    assert_eq!(h.sets("addresses"), 1);
    assert_eq!(h.sets("accounts"), 1);
}

#[tokio::test]
async fn test_single_fetch_failure_is_not_logged() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h.run(d, vec![Step::Fail, Step::Snapshot(snapshot(1))]).await;

    assert_eq!(stats.fetch_failures, 1);
    assert_eq!(stats.failures_logged, 0);
    assert_eq!(stats.cycles, 1);
    assert_eq!(h.sets("accounts"), 1);
}

#[tokio::test]
async fn test_three_failures_log_once() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h
        .run(
            d,
            vec![Step::Fail, Step::Fail, Step::Fail, Step::Snapshot(snapshot(1))],
        )
        .await;

    assert_eq!(stats.fetch_failures, 3);
    assert_eq!(stats.failures_logged, 1);
    assert_eq!(stats.cycles, 1);
}

#[tokio::test]
async fn test_failure_streak_restarts_after_success() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h
        .run(
            d,
            vec![
                Step::Fail,
                Step::Fail,
                Step::Snapshot(snapshot(1)),
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Snapshot(snapshot(2)),
            ],
        )
        .await;

    assert_eq!(stats.fetch_failures, 5);
    assert_eq!(stats.failures_logged, 2);
    assert_eq!(stats.cycles, 2);
}

#[tokio::test]
async fn test_loop_survives_long_failure_streak() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let mut steps: Vec<Step> = (0..25).map(|_| Step::Fail).collect();
    steps.push(Step::Snapshot(snapshot(1)));
    let stats = h.run(d, steps).await;

    assert_eq!(stats.fetch_failures, 25);
    assert_eq!(stats.cycles, 1);
    assert_eq!(h.sets("cluster"), 1);
}

#[tokio::test]
async fn test_shutdown_after_fetch_skips_dispatch() {
    let mut h = Harness::new();
    let d = h.dispatcher(DOMAINS, &[]);

    let stats = h
        .run(
            d,
            vec![
                Step::Snapshot(snapshot(1)),
                Step::SnapshotThenStop(snapshot(2)),
            ],
        )
        .await;

    assert_eq!(stats.cycles, 1);
    assert_eq!(h.sets("addresses"), 1);
}

#[tokio::test]
async fn test_registered_domains_against_mock_host() {
    let h = Harness::new();
    let host = Arc::new(MockHost::new());
    let dispatcher = Dispatcher::new(domains::registry(host.clone()));

    let mut s = snapshot(1);
    s.instance.network_interfaces.push(NetworkInterface {
        forwarded_ips: vec!["10.0.0.5".to_string()],
        ..Default::default()
    });
    s.instance.attributes.insert(
        "windows-keys".to_string(),
        r#"{"userName":"alice","modulus":"AQAB","exponent":"AQAB"}"#.to_string(),
    );

    let stats = h
        .run(dispatcher, vec![Step::Snapshot(s.clone()), Step::Snapshot(s)])
        .await;
    assert_eq!(stats.cycles, 2);

    let state = host.state();
    assert_eq!(state.addresses, vec!["10.0.0.5"]);
    assert_eq!(state.accounts, vec!["alice"]);
    assert!(state.cluster.as_ref().is_some_and(|c| !c.enabled));
    assert!(state.diagnostics_uploads.is_empty());
    // Addresses, accounts and cluster each changed host state exactly once.
    assert_eq!(state.mutations, 3);
}
