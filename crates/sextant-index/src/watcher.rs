use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::ignore_policy::IgnorePolicy;
use crate::languages::LanguageRegistry;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches a tree and hands debounced batches of changed source paths to a callback.
///
/// Dropping the watcher stops both the filesystem watch and the callback task.
pub struct IndexWatcher {
    root: PathBuf,
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// Start watching `root` recursively. Must be called inside a tokio runtime.
    ///
    /// A batch holds every path in one debounce window that has a known
    /// language and passes `ignore`. Deleted paths are included.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the watcher cannot be initialized.
    pub fn start<F, Fut>(
        root: &Path,
        registry: Arc<LanguageRegistry>,
        ignore: IgnorePolicy,
        on_change: F,
    ) -> Result<Self>
    where
        F: Fn(Vec<PathBuf>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let root = root.canonicalize()?;
        let (batch_tx, mut batch_rx) = mpsc::channel::<Vec<PathBuf>>(16);

        let filter_root = root.clone();
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |events: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let batch: BTreeSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .map(|e| e.path)
                    .filter(|p| registry.detect_language(p).is_some() && !ignore.is_ignored(&filter_root, p))
                    .collect();

                if !batch.is_empty() && batch_tx.blocking_send(batch.into_iter().collect()).is_err() {
                    tracing::debug!("index watcher receiver closed");
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(batch) = batch_rx.recv().await {
                tracing::debug!(paths = batch.len(), "change batch");
                on_change(batch).await;
            }
        });

        Ok(Self { root, handle })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
