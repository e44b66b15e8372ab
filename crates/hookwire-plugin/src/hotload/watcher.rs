//! Filesystem watcher for the plugin source root.
//!
//! ```text
//! filesystem events (notify)
//!   → filter by source extension, skip ignored dirs
//!   → map to build unit (first path segment under the root)
//!   → re-arm the unit's debounce timer
//!   → after the quiet period, one ChangeEvent per unit
//! ```
//!
//! The root is watched recursively, so unit directories created after
//! `start` are picked up as well.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::digest::{has_source_extension, is_in_ignored_dir};
use crate::error::{PluginError, PluginResult};

/// Kind of a source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A file was created.
    Create,
    /// A file was written or renamed.
    Modify,
    /// A file was removed.
    Remove,
}

/// A coalesced change to one build unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Build unit name.
    pub unit: String,
    /// Most recently observed change kind.
    pub kind: ChangeKind,
    /// When the event was delivered.
    pub timestamp: DateTime<Utc>,
}

/// Receives coalesced change events.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Handles one change event.
    async fn on_change(&self, event: ChangeEvent);
}

#[async_trait]
impl<F> ChangeHandler for F
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    async fn on_change(&self, event: ChangeEvent) {
        self(event)
    }
}

/// A unit with an armed timer.
struct Pending {
    generation: u64,
    kind: ChangeKind,
    timer: JoinHandle<()>,
}

/// Per-unit debounce state, shared by the event loop and the timers.
struct Debouncer {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    debounce: Duration,
    extensions: Vec<String>,
    handler: Arc<dyn ChangeHandler>,
    pending: Mutex<HashMap<String, Pending>>,
    next_generation: AtomicU64,
}

impl Debouncer {
    /// Returns `path` relative to the watched root.
    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        // Some backends report canonical paths; the root may not have
        // existed when the watcher was built.
        let canonical = match &self.canonical_root {
            Some(root) => root.clone(),
            None => std::fs::canonicalize(&self.root).ok()?,
        };
        path.strip_prefix(&canonical).ok().map(Path::to_path_buf)
    }

    async fn ingest(self: &Arc<Self>, path: &Path, kind: ChangeKind) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };
        if is_in_ignored_dir(&rel) || !has_source_extension(&rel, &self.extensions) {
            return false;
        }
        let Some(unit) = unit_of(&rel) else {
            return false;
        };

        debug!(path = %path.display(), plugin = %unit, ?kind, "Source change detected");
        self.arm(unit, kind).await;
        true
    }

    /// (Re)arms the unit's timer, cancelling the one already running.
    async fn arm(self: &Arc<Self>, unit: String, kind: ChangeKind) {
        let mut pending = self.pending.lock().await;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = pending.remove(&unit) {
            previous.timer.abort();
        }

        let this = Arc::clone(self);
        let fire_unit = unit.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            this.fire(fire_unit, generation).await;
        });

        pending.insert(
            unit,
            Pending {
                generation,
                kind,
                timer,
            },
        );
    }

    async fn fire(&self, unit: String, generation: u64) {
        let kind = {
            let mut pending = self.pending.lock().await;
            // A newer event re-armed the unit; its own timer will fire.
            if pending.get(&unit).map(|e| e.generation) != Some(generation) {
                return;
            }
            match pending.remove(&unit) {
                Some(entry) => entry.kind,
                None => return,
            }
        };

        info!(plugin = %unit, ?kind, "Plugin source changed");
        self.handler
            .on_change(ChangeEvent {
                unit,
                kind,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, entry) in pending.drain() {
            entry.timer.abort();
        }
    }
}

/// A running watch session.
struct Running {
    /// Dropping it releases the OS watch descriptors.
    watcher: RecommendedWatcher,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches the plugin source root and delivers debounced per-unit changes.
pub struct PluginWatcher {
    debouncer: Arc<Debouncer>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for PluginWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginWatcher")
            .field("root", &self.debouncer.root)
            .field("debounce", &self.debouncer.debounce)
            .field("extensions", &self.debouncer.extensions)
            .finish()
    }
}

impl PluginWatcher {
    /// Creates a watcher; nothing is observed until [`start`](Self::start).
    pub fn new(
        root: impl Into<PathBuf>,
        debounce: Duration,
        extensions: Vec<String>,
        handler: Arc<dyn ChangeHandler>,
    ) -> Self {
        let root = root.into();
        let canonical_root = std::fs::canonicalize(&root).ok();
        Self {
            debouncer: Arc::new(Debouncer {
                root,
                canonical_root,
                debounce,
                extensions,
                handler,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// Starts watching. Calling it while running is a no-op.
    pub async fn start(&self) -> PluginResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let root = &self.debouncer.root;
        if !root.is_dir() {
            return Err(PluginError::Watcher(format!(
                "plugin root does not exist: {}",
                root.display()
            )));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let token = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.debouncer),
            raw_rx,
            token.clone(),
        ));

        info!(
            root = %root.display(),
            debounce_ms = self.debouncer.debounce.as_millis() as u64,
            "Plugin watcher started"
        );
        *running = Some(Running {
            watcher,
            token,
            task,
        });
        Ok(())
    }

    /// Stops watching and drops armed timers. No-op when not running.
    pub async fn stop(&self) {
        let Some(Running {
            watcher,
            token,
            task,
        }) = self.running.lock().await.take()
        else {
            return;
        };

        token.cancel();
        drop(watcher);
        if let Err(e) = task.await {
            warn!(error = %e, "Watcher loop ended abnormally");
        }
        self.debouncer.cancel_all().await;
        info!(root = %self.debouncer.root.display(), "Plugin watcher stopped");
    }

    /// Returns whether the watcher is running.
    pub async fn is_active(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Feeds one change as if the OS had reported it.
    ///
    /// Returns whether the path was accepted (matching extension, inside a
    /// unit directory).
    pub async fn ingest(&self, path: &Path, kind: ChangeKind) -> bool {
        self.debouncer.ingest(path, kind).await
    }
}

/// The build unit is the first path segment under the root. Files directly
/// under the root belong to no unit.
fn unit_of(rel: &Path) -> Option<String> {
    let mut components = rel.components();
    let unit = match components.next()? {
        Component::Normal(name) => name.to_str()?.to_string(),
        _ => return None,
    };
    components.next()?;
    Some(unit)
}

async fn run_loop(
    debouncer: Arc<Debouncer>,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            event = raw_rx.recv() => match event {
                Some(Ok(event)) => {
                    let kind = match event.kind {
                        EventKind::Create(_) => ChangeKind::Create,
                        EventKind::Modify(_) => ChangeKind::Modify,
                        EventKind::Remove(_) => ChangeKind::Remove,
                        _ => continue,
                    };
                    for path in &event.paths {
                        debouncer.ingest(path, kind).await;
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Filesystem watcher error"),
                None => {
                    debug!("Filesystem watcher channel closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_watcher(
        root: &Path,
        debounce: Duration,
    ) -> (PluginWatcher, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |event: ChangeEvent| {
            let _ = tx.send(event);
        };
        let watcher = PluginWatcher::new(
            root,
            debounce,
            vec!["rs".to_string()],
            Arc::new(handler),
        );
        (watcher, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one_event() {
        let root = PathBuf::from("/plugins/runtime");
        let (watcher, mut rx) = collecting_watcher(&root, Duration::from_millis(100));

        for i in 0..10 {
            let kind = if i == 9 { ChangeKind::Remove } else { ChangeKind::Modify };
            assert!(watcher.ingest(&root.join("orders/src/lib.rs"), kind).await);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.unit, "orders");
        assert_eq!(event.kind, ChangeKind::Remove);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_events_fire_twice() {
        let root = PathBuf::from("/plugins/runtime");
        let (watcher, mut rx) = collecting_watcher(&root, Duration::from_millis(100));

        watcher
            .ingest(&root.join("orders/src/lib.rs"), ChangeKind::Modify)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        watcher
            .ingest(&root.join("orders/src/lib.rs"), ChangeKind::Modify)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_debounce_independently() {
        let root = PathBuf::from("/plugins/runtime");
        let (watcher, mut rx) = collecting_watcher(&root, Duration::from_millis(100));

        watcher
            .ingest(&root.join("orders/src/lib.rs"), ChangeKind::Modify)
            .await;
        watcher
            .ingest(&root.join("billing/src/lib.rs"), ChangeKind::Create)
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut units = vec![rx.try_recv().unwrap().unit, rx.try_recv().unwrap().unit];
        units.sort();
        assert_eq!(units, vec!["billing".to_string(), "orders".to_string()]);
    }

    #[tokio::test]
    async fn test_filters_foreign_paths() {
        let root = PathBuf::from("/plugins/runtime");
        let (watcher, _rx) = collecting_watcher(&root, Duration::from_millis(100));

        assert!(!watcher.ingest(&root.join("orders/README.md"), ChangeKind::Modify).await);
        assert!(!watcher.ingest(&root.join("top_level.rs"), ChangeKind::Modify).await);
        assert!(!watcher.ingest(&root.join("orders/target/x.rs"), ChangeKind::Modify).await);
        assert!(!watcher.ingest(Path::new("/elsewhere/orders/lib.rs"), ChangeKind::Modify).await);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let (watcher, _rx) = collecting_watcher(tmp.path(), Duration::from_millis(50));

        assert!(!watcher.is_active().await);
        watcher.start().await.unwrap();
        watcher.start().await.unwrap();
        assert!(watcher.is_active().await);
        watcher.stop().await;
        assert!(!watcher.is_active().await);
    }

    #[tokio::test]
    async fn test_start_missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let (watcher, _rx) = collecting_watcher(&tmp.path().join("absent"), Duration::from_millis(50));
        assert!(watcher.start().await.is_err());
        assert!(!watcher.is_active().await);
    }
}
