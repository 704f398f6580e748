//! Mutation Watcher.
//!
//! Subscribes to a document subtree, drops mutations inside excluded regions,
//! and collapses bursts into one "settled" signal after a quiet period. Any
//! structural insertion in a burst selects the shorter window; every new
//! mutation restarts the timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dom::{Document, MutationKind, MutationRecord, NodeId, ObserverId, SharedDocument};
use crate::scanner::is_excluded;

/// How a settled burst of mutations looked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// New element content, e.g. an article body arriving.
    Structural,
    /// Inline text churn.
    Plain,
}

impl ChangeKind {
    fn merge(self, other: ChangeKind) -> ChangeKind {
        if self == ChangeKind::Structural || other == ChangeKind::Structural {
            ChangeKind::Structural
        } else {
            ChangeKind::Plain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceWindows {
    pub structural: Duration,
    pub plain: Duration,
}

impl Default for DebounceWindows {
    fn default() -> Self {
        Self {
            structural: Duration::from_millis(150),
            plain: Duration::from_millis(600),
        }
    }
}

impl DebounceWindows {
    pub fn for_kind(&self, kind: ChangeKind) -> Duration {
        match kind {
            ChangeKind::Structural => self.structural,
            ChangeKind::Plain => self.plain,
        }
    }
}

/// Decide whether a mutation is worth reacting to, and how urgently.
pub fn classify(doc: &Document, record: &MutationRecord) -> Option<ChangeKind> {
    if is_excluded(doc, record.target) {
        return None;
    }
    match &record.kind {
        MutationKind::CharacterData => Some(ChangeKind::Plain),
        MutationKind::Removed { .. } => None,
        MutationKind::ChildList { added } => {
            let mut kind = None;
            for &node in added {
                if doc.is_element(node) {
                    if !is_excluded(doc, node) {
                        return Some(ChangeKind::Structural);
                    }
                } else if doc.text(node).is_some() {
                    kind = Some(ChangeKind::Plain);
                }
            }
            kind
        }
    }
}

pub type SettledCallback = Arc<dyn Fn(ChangeKind) + Send + Sync>;

pub struct MutationWatcher {
    doc: SharedDocument,
    observer: Option<ObserverId>,
    signals: mpsc::UnboundedSender<ChangeKind>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MutationWatcher {
    /// Start watching `root`. Must be called inside a Tokio runtime and
    /// without holding the document lock.
    pub fn start(
        doc: SharedDocument,
        root: NodeId,
        windows: DebounceWindows,
        on_settled: SettledCallback,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(rx, windows, cancel.clone(), on_settled));

        let observer_tx = tx.clone();
        let observer = doc.lock().observe(root, move |doc, record| {
            if let Some(kind) = classify(doc, record) {
                let _ = observer_tx.send(kind);
            }
        });

        info!(root = root.index(), "mutation watcher started");

        Self {
            doc,
            observer: Some(observer),
            signals: tx,
            cancel,
            task,
        }
    }

    /// Feed one mutation, exactly as the document subscription does.
    pub fn on_subtree_changed(&self, doc: &Document, record: &MutationRecord) {
        if let Some(kind) = classify(doc, record) {
            let _ = self.signals.send(kind);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.observer.is_some()
    }

    /// Stop observing and end the debounce task. Pending bursts are dropped.
    /// Do not call while holding the document lock.
    pub fn disconnect(&mut self) {
        if let Some(observer) = self.observer.take() {
            self.doc.lock().disconnect(observer);
            self.cancel.cancel();
            self.task.abort();
            info!("mutation watcher disconnected");
        }
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<ChangeKind>,
    windows: DebounceWindows,
    cancel: CancellationToken,
    on_settled: SettledCallback,
) {
    loop {
        let mut kind = tokio::select! {
            _ = cancel.cancelled() => return,
            received = rx.recv() => match received {
                Some(kind) => kind,
                None => return,
            },
        };
        let mut deadline = Instant::now() + windows.for_kind(kind);
        let mut burst = 1usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => break,
                received = rx.recv() => match received {
                    Some(next) => {
                        kind = kind.merge(next);
                        burst += 1;
                        deadline = Instant::now() + windows.for_kind(kind);
                    }
                    None => break,
                },
            }
        }

        debug!(?kind, burst, "mutations settled");
        on_settled(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;
    use parking_lot::Mutex;

    fn recorder() -> (SettledCallback, Arc<Mutex<Vec<ChangeKind>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SettledCallback = Arc::new(move |kind| sink.lock().push(kind));
        (callback, seen)
    }

    #[test]
    fn classifies_structural_plain_and_excluded() {
        let mut doc = parse_html("<main><p>Hi there</p></main><pre data-no-translate>x</pre>");
        let main = doc.first_element_by_tag("main").unwrap();
        let pre = doc.first_element_by_tag("pre").unwrap();
        let p = doc.first_element_by_tag("p").unwrap();
        let text = doc.children(p)[0];

        let article = doc.create_element("article");
        assert_eq!(
            classify(&doc, &MutationRecord::child_list(main, vec![article])),
            Some(ChangeKind::Structural)
        );
        let loose = doc.create_text("loose text");
        assert_eq!(
            classify(&doc, &MutationRecord::child_list(main, vec![loose])),
            Some(ChangeKind::Plain)
        );
        assert_eq!(
            classify(&doc, &MutationRecord::character_data(text)),
            Some(ChangeKind::Plain)
        );
        let pre_text = doc.children(pre)[0];
        assert_eq!(classify(&doc, &MutationRecord::character_data(pre_text)), None);
        assert_eq!(classify(&doc, &MutationRecord::removal(main, vec![p])), None);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_signal() {
        let doc = parse_html("<main><p>Hello world</p></main>").into_shared();
        let main = doc.lock().first_element_by_tag("main").unwrap();
        let (callback, seen) = recorder();
        let _watcher = MutationWatcher::start(Arc::clone(&doc), main, DebounceWindows::default(), callback);

        for i in 0..5 {
            {
                let mut d = doc.lock();
                let p = d.first_element_by_tag("p").unwrap();
                let text = d.children(p)[0];
                d.set_text(text, &format!("Hello world {i}"));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(seen.lock().is_empty(), "timer must reset on each mutation");

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(*seen.lock(), vec![ChangeKind::Plain]);
    }

    #[tokio::test(start_paused = true)]
    async fn structural_insert_uses_short_window() {
        let doc = parse_html("<main></main>").into_shared();
        let main = doc.lock().first_element_by_tag("main").unwrap();
        let (callback, seen) = recorder();
        let _watcher = MutationWatcher::start(Arc::clone(&doc), main, DebounceWindows::default(), callback);

        doc.lock()
            .append_element_with_text(main, "article", "Story body arrives");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![ChangeKind::Structural]);
    }

    #[tokio::test(start_paused = true)]
    async fn direct_callback_drives_debounce() {
        let doc = parse_html("<main><p>Hello world</p></main>").into_shared();
        let main = doc.lock().first_element_by_tag("main").unwrap();
        let (callback, seen) = recorder();
        let watcher = MutationWatcher::start(Arc::clone(&doc), main, DebounceWindows::default(), callback);

        {
            let d = doc.lock();
            let p = d.first_element_by_tag("p").unwrap();
            watcher.on_subtree_changed(&d, &MutationRecord::character_data(d.children(p)[0]));
        }
        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(*seen.lock(), vec![ChangeKind::Plain]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_removes_observer_and_silences_signals() {
        let doc = parse_html("<main></main>").into_shared();
        let main = doc.lock().first_element_by_tag("main").unwrap();
        let (callback, seen) = recorder();
        let mut watcher = MutationWatcher::start(Arc::clone(&doc), main, DebounceWindows::default(), callback);
        assert_eq!(doc.lock().observer_count(), 1);

        watcher.disconnect();
        assert!(!watcher.is_connected());
        assert_eq!(doc.lock().observer_count(), 0);

        doc.lock().append_element_with_text(main, "p", "Late content");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().is_empty());

        drop(watcher);
        assert_eq!(doc.lock().observer_count(), 0);
    }
}
