//! Integration tests for agent start/stop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use vmagent::agent::run_until;
use vmagent::domains::{self, MockHost};
use vmagent::metadata::{FetchError, MetadataSource, Snapshot};
use vmagent::WatchLoop;
use vmagent_reconcile::Dispatcher;

/// Hands out one snapshot, then long-polls forever.
struct OneShotSource {
    calls: AtomicUsize,
    fetched: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

impl OneShotSource {
    fn new(fetched: oneshot::Sender<()>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fetched: std::sync::Mutex::new(Some(fetched)),
        }
    }
}

#[async_trait]
impl MetadataSource for OneShotSource {
    async fn next_snapshot(&self) -> Result<Snapshot, FetchError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let mut snapshot = Snapshot::default();
            snapshot.instance.id = 1;
            return Ok(snapshot);
        }
        // Second call means the first cycle has joined.
        let fetched = self.fetched.lock().unwrap().take();
        if let Some(tx) = fetched {
            let _ = tx.send(());
        }
        std::future::pending().await
    }
}

fn watch_loop(source: OneShotSource, host: Arc<MockHost>) -> WatchLoop<OneShotSource> {
    let dir = std::env::temp_dir().join("vmagent-lifecycle-missing");
    WatchLoop::new(
        source,
        Dispatcher::new(domains::registry(host)),
        dir.join("instance_configs.cfg"),
        Duration::from_millis(1),
    )
}

#[tokio::test]
async fn test_stop_interrupts_pending_long_poll() {
    let (fetched_tx, fetched_rx) = oneshot::channel();
    let host = Arc::new(MockHost::new());
    let watch_loop = watch_loop(OneShotSource::new(fetched_tx), host.clone());

    let stop = async {
        let _ = fetched_rx.await;
    };
    let stats = tokio::time::timeout(Duration::from_secs(10), run_until(watch_loop, stop))
        .await
        .expect("agent did not stop");

    assert_eq!(stats.cycles, 1);
    assert!(host.state().mutations > 0);
}

#[tokio::test]
async fn test_immediate_stop() {
    let (fetched_tx, _fetched_rx) = oneshot::channel();
    let host = Arc::new(MockHost::new());
    let watch_loop = watch_loop(OneShotSource::new(fetched_tx), host);

    let stats = tokio::time::timeout(
        Duration::from_secs(10),
        run_until(watch_loop, std::future::ready(())),
    )
    .await
    .expect("agent did not stop");

    // The loop may or may not have reached its first dispatch; it must stop either way.
    assert!(stats.cycles <= 1);
}
