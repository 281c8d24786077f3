//! Deferred, best-effort notifications to the external file mirror.
//!
//! Each rename or delete enqueues one task on a background worker. The worker
//! holds a task until `enqueued_at + delay`, then hands it to the
//! [`SyncBridge`]. Tasks are delivered at most once: no acknowledgement, no
//! retry, no cancellation. A bridge that errors or panics is logged and the
//! worker moves on to the next task. Every task carries the item and tree snapshot taken
//! when it was scheduled, so a task whose node has since been deleted is still
//! delivered as captured.

use crate::core::collaborators::SyncBridge;
use crate::core::node::{FileTree, NodeData};
use crate::Result;
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delay between a mutation and its mirror notification.
pub const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_millis(2000);

/// What happened to the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// The item was renamed; `new_name` is the final, de-duplicated name.
    Rename { new_name: String },
    Delete,
}

impl NotificationKind {
    /// Channel name the mirror listens on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename-file-or-folder",
            Self::Delete => "delete-file-or-folder",
        }
    }
}

struct PendingNotification {
    due_at: Instant,
    kind: NotificationKind,
    item: NodeData,
    snapshot: FileTree,
}

enum NotifierMsg {
    // Snapshots can be large; keep channel messages small.
    Deliver(Box<PendingNotification>),
    Shutdown,
}

/// Background queue feeding the [`SyncBridge`].
pub struct SyncNotifier {
    sender: Sender<NotifierMsg>,
    delay: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncNotifier {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NoteTreeError::Io`] if the thread cannot be spawned.
    pub fn spawn(bridge: Arc<dyn SyncBridge>, delay: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("notetree-sync-notifier".into())
            .spawn(move || drain_loop(receiver, bridge))?;
        Ok(Self {
            sender,
            delay,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Enqueues a notification. Never blocks and never fails; if the worker
    /// is gone the notification is dropped with a warning.
    pub fn schedule(&self, kind: NotificationKind, item: NodeData, snapshot: FileTree) {
        let channel = kind.channel();
        let id = item.id.clone();
        let task = PendingNotification {
            due_at: Instant::now() + self.delay,
            kind,
            item,
            snapshot,
        };
        match self.sender.send(NotifierMsg::Deliver(Box::new(task))) {
            Ok(()) => debug!(
                "event=notify_schedule module=sync_notifier channel={channel} id={id} delay_ms={}",
                self.delay.as_millis()
            ),
            Err(_) => warn!(
                "event=notify_schedule module=sync_notifier status=dropped reason=worker_stopped channel={channel} id={id}"
            ),
        }
    }

    /// Delivers everything already queued, then stops the worker and waits
    /// for it. Anything scheduled afterwards is dropped.
    pub fn shutdown(&self) {
        let _ = self.sender.send(NotifierMsg::Shutdown);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("event=notify_shutdown module=sync_notifier status=error reason=worker_panicked");
            }
        }
    }
}

impl Drop for SyncNotifier {
    fn drop(&mut self) {
        // Pending tasks still fire; the worker exits once it reaches this message.
        let _ = self.sender.send(NotifierMsg::Shutdown);
    }
}

fn drain_loop(receiver: Receiver<NotifierMsg>, bridge: Arc<dyn SyncBridge>) {
    for msg in receiver {
        match msg {
            NotifierMsg::Deliver(task) => {
                let now = Instant::now();
                if task.due_at > now {
                    thread::sleep(task.due_at - now);
                }
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| deliver(bridge.as_ref(), &task)));
                if delivered.is_err() {
                    warn!(
                        "event=notify_deliver module=sync_notifier status=error reason=bridge_panicked channel={} id={}",
                        task.kind.channel(),
                        task.item.id
                    );
                }
            }
            NotifierMsg::Shutdown => break,
        }
    }
}

fn deliver(bridge: &dyn SyncBridge, task: &PendingNotification) {
    let result = match &task.kind {
        NotificationKind::Rename { new_name } => {
            bridge.rename_file_or_folder(&task.item, new_name, &task.snapshot)
        }
        NotificationKind::Delete => bridge.delete_file_or_folder(&task.item, &task.snapshot),
    };
    let channel = task.kind.channel();
    match result {
        Ok(()) => debug!(
            "event=notify_deliver module=sync_notifier status=ok channel={channel} id={}",
            task.item.id
        ),
        Err(err) => warn!(
            "event=notify_deliver module=sync_notifier status=error channel={channel} id={} error={err}",
            task.item.id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{TreeNode, ROOT_ID};
    use crate::NoteTreeError;

    #[derive(Default)]
    struct RecordingBridge {
        calls: Mutex<Vec<(String, String, usize)>>,
        fail_first: Mutex<bool>,
    }

    impl RecordingBridge {
        fn calls(&self) -> Vec<(String, String, usize)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, what: String, item: &NodeData, tree: &FileTree) -> Result<()> {
            let mut fail = self.fail_first.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(NoteTreeError::Bridge("mirror offline".to_string()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((what, item.id.clone(), tree.len()));
            Ok(())
        }
    }

    impl SyncBridge for RecordingBridge {
        fn delete_file_or_folder(&self, item: &NodeData, tree: &FileTree) -> Result<()> {
            self.record("delete".to_string(), item, tree)
        }

        fn rename_file_or_folder(
            &self,
            item: &NodeData,
            new_name: &str,
            tree: &FileTree,
        ) -> Result<()> {
            self.record(format!("rename:{new_name}"), item, tree)
        }
    }

    fn item(id: &str) -> NodeData {
        NodeData {
            id: id.to_string(),
            name: id.to_string(),
            file_type: None,
            created_at: 0,
            modified_at: 0,
        }
    }

    fn tree_of_size(extra: usize) -> FileTree {
        let mut tree = FileTree::with_root(0);
        for i in 0..extra {
            let node = TreeNode::folder(item(&format!("folder_{i}")));
            tree.get_mut(ROOT_ID).unwrap().children.push(node.id.clone());
            tree.insert(node);
        }
        tree
    }

    #[test]
    fn test_delivery_waits_for_delay() {
        let bridge = Arc::new(RecordingBridge::default());
        let notifier = SyncNotifier::spawn(bridge.clone(), Duration::from_millis(200)).unwrap();
        notifier.schedule(NotificationKind::Delete, item("file_a"), tree_of_size(0));

        assert!(bridge.calls().is_empty(), "must not fire before the delay");
        notifier.shutdown();
        assert_eq!(
            bridge.calls(),
            vec![("delete".to_string(), "file_a".to_string(), 1)]
        );
    }

    #[test]
    fn test_each_task_keeps_its_own_snapshot() {
        let bridge = Arc::new(RecordingBridge::default());
        let notifier = SyncNotifier::spawn(bridge.clone(), Duration::from_millis(5)).unwrap();
        notifier.schedule(
            NotificationKind::Rename { new_name: "A".to_string() },
            item("file_a"),
            tree_of_size(1),
        );
        notifier.schedule(
            NotificationKind::Rename { new_name: "B".to_string() },
            item("file_a"),
            tree_of_size(3),
        );
        notifier.shutdown();
        assert_eq!(
            bridge.calls(),
            vec![
                ("rename:A".to_string(), "file_a".to_string(), 2),
                ("rename:B".to_string(), "file_a".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_failed_delivery_is_not_retried() {
        let bridge = Arc::new(RecordingBridge::default());
        *bridge.fail_first.lock().unwrap() = true;
        let notifier = SyncNotifier::spawn(bridge.clone(), Duration::ZERO).unwrap();
        notifier.schedule(NotificationKind::Delete, item("file_a"), tree_of_size(0));
        notifier.schedule(NotificationKind::Delete, item("file_b"), tree_of_size(0));
        notifier.shutdown();
        assert_eq!(
            bridge.calls(),
            vec![("delete".to_string(), "file_b".to_string(), 1)]
        );
    }

    struct PanickingOnce {
        inner: RecordingBridge,
        panicked: Mutex<bool>,
    }

    impl SyncBridge for PanickingOnce {
        fn delete_file_or_folder(&self, item: &NodeData, tree: &FileTree) -> Result<()> {
            let first = !std::mem::replace(&mut *self.panicked.lock().unwrap(), true);
            if first {
                panic!("mirror crashed");
            }
            self.inner.delete_file_or_folder(item, tree)
        }

        fn rename_file_or_folder(
            &self,
            item: &NodeData,
            new_name: &str,
            tree: &FileTree,
        ) -> Result<()> {
            self.inner.rename_file_or_folder(item, new_name, tree)
        }
    }

    #[test]
    fn test_panicking_bridge_does_not_stop_worker() {
        let bridge = Arc::new(PanickingOnce {
            inner: RecordingBridge::default(),
            panicked: Mutex::new(false),
        });
        let notifier = SyncNotifier::spawn(bridge.clone(), Duration::ZERO).unwrap();
        notifier.schedule(NotificationKind::Delete, item("file_a"), tree_of_size(0));
        notifier.schedule(NotificationKind::Delete, item("file_b"), tree_of_size(0));
        notifier.shutdown();
        assert_eq!(
            bridge.inner.calls(),
            vec![("delete".to_string(), "file_b".to_string(), 1)]
        );
    }

    #[test]
    fn test_schedule_after_shutdown_is_dropped() {
        let bridge = Arc::new(RecordingBridge::default());
        let notifier = SyncNotifier::spawn(bridge.clone(), Duration::ZERO).unwrap();
        notifier.shutdown();
        notifier.schedule(NotificationKind::Delete, item("file_a"), tree_of_size(0));
        notifier.shutdown();
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(NotificationKind::Delete.channel(), "delete-file-or-folder");
        assert_eq!(
            NotificationKind::Rename { new_name: String::new() }.channel(),
            "rename-file-or-folder"
        );
    }
}
