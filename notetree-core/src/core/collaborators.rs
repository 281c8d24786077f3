//! Contracts for the out-of-crate services the workspace talks to.
//!
//! Note and board bodies, editor tabs, telemetry and the OS file mirror all
//! live elsewhere. The workspace only calls these traits.

use crate::core::node::{FileTree, NodeData};
use crate::Result;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Note and board content stores, keyed by file id.
pub trait ContentStore: Send + Sync {
    /// Creates empty note content for `id`.
    fn init_note_content(&self, id: &str) -> Result<()>;

    /// Creates board content for `id` holding `initial_payload`.
    fn init_board_content(&self, id: &str, initial_payload: &str) -> Result<()>;
}

/// Open editor tabs.
pub trait TabModel: Send + Sync {
    /// Updates the title of any open tab showing `id`.
    fn rename_open_tab(&self, id: &str, new_name: &str);
}

/// Fire-and-forget usage events.
pub trait Telemetry: Send + Sync {
    fn record_event(&self, name: &str, payload: Map<String, Value>);
}

/// The out-of-process file mirror.
///
/// Called from the notifier's worker thread, never from the caller of a
/// workspace operation. Errors are logged and dropped.
pub trait SyncBridge: Send + Sync {
    fn delete_file_or_folder(&self, item: &NodeData, tree: &FileTree) -> Result<()>;

    fn rename_file_or_folder(&self, item: &NodeData, new_name: &str, tree: &FileTree)
        -> Result<()>;
}

/// The full set of collaborators a [`Workspace`](super::workspace::Workspace) needs.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentStore>,
    pub tabs: Arc<dyn TabModel>,
    pub telemetry: Arc<dyn Telemetry>,
    pub bridge: Arc<dyn SyncBridge>,
}

impl Collaborators {
    /// Collaborators that only log what they are asked to do.
    pub fn detached() -> Self {
        let detached = Arc::new(Detached);
        Self {
            content: detached.clone(),
            tabs: detached.clone(),
            telemetry: detached.clone(),
            bridge: detached,
        }
    }
}

struct Detached;

impl ContentStore for Detached {
    fn init_note_content(&self, id: &str) -> Result<()> {
        debug!("event=content_init module=collaborators kind=note id={id} status=detached");
        Ok(())
    }

    fn init_board_content(&self, id: &str, _initial_payload: &str) -> Result<()> {
        debug!("event=content_init module=collaborators kind=board id={id} status=detached");
        Ok(())
    }
}

impl TabModel for Detached {
    fn rename_open_tab(&self, id: &str, _new_name: &str) {
        debug!("event=tab_rename module=collaborators id={id} status=detached");
    }
}

impl Telemetry for Detached {
    fn record_event(&self, name: &str, _payload: Map<String, Value>) {
        debug!("event=telemetry module=collaborators name={name} status=detached");
    }
}

impl SyncBridge for Detached {
    fn delete_file_or_folder(&self, item: &NodeData, _tree: &FileTree) -> Result<()> {
        debug!("event=mirror_delete module=collaborators id={} status=detached", item.id);
        Ok(())
    }

    fn rename_file_or_folder(
        &self,
        item: &NodeData,
        _new_name: &str,
        _tree: &FileTree,
    ) -> Result<()> {
        debug!("event=mirror_rename module=collaborators id={} status=detached", item.id);
        Ok(())
    }
}
