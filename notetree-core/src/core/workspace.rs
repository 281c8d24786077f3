//! High-level mutations over the workspace tree.

use crate::core::legacy::LegacyMigrator;
use crate::core::naming::resolve_name;
use crate::core::node::{FileTree, FileType, NodeData, TreeNode, FILE_PREFIX, FOLDER_PREFIX, ROOT_ID};
use crate::core::sync_notifier::{NotificationKind, SyncNotifier};
use crate::{
    Collaborators, DeleteResult, DeleteStrategy, NoteTreeError, Result, StoreConfig, TreeStore,
};
use log::debug;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Name given to a folder created without one.
pub const DEFAULT_FOLDER_NAME: &str = "New Folder";

/// Name given to a file created without one.
pub const DEFAULT_FILE_NAME: &str = "Untitled";

/// Initial content handed to the board store for a new board.
const EMPTY_BOARD_PAYLOAD: &str = "{}";

/// Where dragged items land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    /// Insert at `child_index` among `parent_id`'s children.
    ///
    /// The index counts positions after the moved items have been taken out
    /// of their old places, and is clamped to the end of the list.
    BetweenItems { parent_id: String, child_index: usize },
    /// Insert as the first children of `folder_id`.
    OntoFolder { folder_id: String },
}

/// An open workspace tree.
///
/// `Workspace` is the composition root: it owns the [`TreeStore`], the
/// [`SyncNotifier`] and the [`Collaborators`]. Every mutation loads the whole
/// tree, changes it in memory and writes the whole tree back. The store lock is
/// not held across that sequence, so two overlapping mutations both succeed and
/// the later write wins.
pub struct Workspace {
    store: TreeStore,
    notifier: SyncNotifier,
    collaborators: Collaborators,
}

impl Workspace {
    /// Opens the workspace described by `config`.
    ///
    /// Initialises the store immediately, which on a brand-new database runs
    /// the legacy import and then seeds the default tree.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::StoreUnavailable`] if the database cannot be
    /// opened, or [`NoteTreeError::Io`] if the notifier thread cannot start.
    pub fn open(config: &StoreConfig, collaborators: Collaborators) -> Result<Self> {
        let legacy = match &config.legacy_database_path {
            Some(path) => LegacyMigrator::new(path),
            None => LegacyMigrator::none(),
        };
        let store = TreeStore::new(&config.database_path, legacy);
        Self::with_store(store, config.notify_delay(), collaborators)
    }

    /// Opens a workspace over a private in-memory database.
    pub fn open_in_memory(collaborators: Collaborators, notify_delay: Duration) -> Result<Self> {
        Self::with_store(
            TreeStore::in_memory(LegacyMigrator::none()),
            notify_delay,
            collaborators,
        )
    }

    /// Opens a workspace over an already constructed store.
    pub fn with_store(
        store: TreeStore,
        notify_delay: Duration,
        collaborators: Collaborators,
    ) -> Result<Self> {
        store.init()?;
        let notifier = SyncNotifier::spawn(collaborators.bridge.clone(), notify_delay)?;
        Ok(Self {
            store,
            notifier,
            collaborators,
        })
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn notifier(&self) -> &SyncNotifier {
        &self.notifier
    }

    /// Delivers pending mirror notifications and stops the notifier.
    pub fn shutdown(&self) {
        self.notifier.shutdown();
    }

    /// Returns a copy of the whole tree.
    pub fn tree(&self) -> Result<FileTree> {
        self.load_tree()
    }

    /// Returns the payload of `id`, or `None` if it is not in the tree.
    pub fn get_item(&self, id: &str) -> Result<Option<NodeData>> {
        Ok(self.load_tree()?.get(id).map(|node| node.data.clone()))
    }

    /// Returns the payloads of `id`'s children in display order.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] if `id` is not in the tree.
    pub fn children_of(&self, id: &str) -> Result<Vec<NodeData>> {
        let tree = self.load_tree()?;
        let node = tree
            .get(id)
            .ok_or_else(|| NoteTreeError::NodeNotFound(id.to_string()))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| tree.get(child))
            .map(|child| child.data.clone())
            .collect())
    }

    /// Creates a folder as the first child of `parent_id` (default root).
    ///
    /// An empty or missing `name` becomes [`DEFAULT_FOLDER_NAME`]; a name
    /// already used by a sibling gets a `(k)` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] for an unknown parent and
    /// [`NoteTreeError::NotAFolder`] when the parent is a file.
    pub fn add_folder(&self, name: Option<&str>, parent_id: Option<&str>) -> Result<NodeData> {
        let now = now_millis();
        let node = TreeNode::folder(NodeData {
            id: format!("{FOLDER_PREFIX}{}", Uuid::new_v4().simple()),
            name: non_empty_or(name, DEFAULT_FOLDER_NAME),
            file_type: None,
            created_at: now,
            modified_at: now,
        });

        let folder = self.insert_item(node, parent_id, |_| Ok(()))?;
        self.collaborators
            .telemetry
            .record_event("create_folder", payload_of(&folder));
        Ok(folder)
    }

    /// Creates a note or board as the first child of `parent_id`.
    ///
    /// The matching content store is asked to create empty content for the new
    /// id before the tree is touched; if that fails the tree is left as it was.
    ///
    /// # Errors
    ///
    /// As [`Self::add_folder`], plus whatever the content store returns.
    pub fn add_file(
        &self,
        name: Option<&str>,
        file_type: FileType,
        parent_id: Option<&str>,
    ) -> Result<NodeData> {
        let now = now_millis();
        let node = TreeNode::file(NodeData {
            id: format!("{FILE_PREFIX}{}", Uuid::new_v4().simple()),
            name: non_empty_or(name, DEFAULT_FILE_NAME),
            file_type: Some(file_type),
            created_at: now,
            modified_at: now,
        });

        let content = &self.collaborators.content;
        let file = self.insert_item(node, parent_id, |data| match file_type {
            FileType::Note => content.init_note_content(&data.id),
            FileType::Board => content.init_board_content(&data.id, EMPTY_BOARD_PAYLOAD),
        })?;
        self.collaborators.telemetry.record_event(
            &format!("create_{}", file_type.as_str()),
            payload_of(&file),
        );
        Ok(file)
    }

    /// Renames `id`, returning the name actually stored.
    ///
    /// Does nothing when `new_name` equals the current name. Otherwise the name
    /// is made unique among the item's siblings and stored with a fresh
    /// `modified_at`. A mirror notification carrying the pre-rename item and
    /// tree is then scheduled, and open editor tabs of a renamed file are
    /// retitled.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] for an unknown id,
    /// [`NoteTreeError::RenameNotAllowed`] for the root, and
    /// [`NoteTreeError::InvalidName`] for an empty `new_name`. Unlike the add
    /// operations, rename has no default name to fall back on.
    pub fn rename_item(&self, id: &str, new_name: &str) -> Result<String> {
        if new_name.is_empty() {
            return Err(NoteTreeError::InvalidName(id.to_string()));
        }
        let mut tree = self.load_tree()?;
        let node = tree
            .get(id)
            .ok_or_else(|| NoteTreeError::NodeNotFound(id.to_string()))?;
        if !node.can_rename {
            return Err(NoteTreeError::RenameNotAllowed(id.to_string()));
        }
        if node.data.name == new_name {
            return Ok(new_name.to_string());
        }

        let previous = node.data.clone();
        let is_folder = node.is_folder;
        let snapshot = tree.clone();

        // Items missing from every children list resolve against root.
        let parent_id = tree.parent_of(id).unwrap_or(ROOT_ID).to_string();
        let final_name = resolve_name(new_name, &tree, &parent_id, Some(id));
        if let Some(node) = tree.get_mut(id) {
            node.data.name = final_name.clone();
            node.data.modified_at = now_millis();
        }
        self.store.put(&tree)?;
        debug!("event=tree_rename module=workspace id={id} parent={parent_id}");

        self.notifier.schedule(
            NotificationKind::Rename {
                new_name: final_name.clone(),
            },
            previous,
            snapshot,
        );
        if !is_folder {
            self.collaborators.tabs.rename_open_tab(id, &final_name);
        }
        Ok(final_name)
    }

    /// Moves `ids` to `target`, keeping their relative order.
    ///
    /// Every moved id is first stripped from every node's `children`, not only
    /// from its current parent, so no stale second reference survives.
    /// Duplicate ids are collapsed; an empty list does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] for unknown ids or target,
    /// [`NoteTreeError::NotAFolder`] when the target is a file, and
    /// [`NoteTreeError::InvalidMove`] when moving the root or moving a folder
    /// into itself or one of its descendants.
    pub fn move_items<S: AsRef<str>>(&self, ids: &[S], target: MoveTarget) -> Result<()> {
        let mut moved: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if !moved.iter().any(|m| m == id) {
                moved.push(id.to_string());
            }
        }
        if moved.is_empty() {
            return Ok(());
        }

        let mut tree = self.load_tree()?;
        for id in &moved {
            if id == ROOT_ID {
                return Err(NoteTreeError::InvalidMove(
                    "The root cannot be moved".to_string(),
                ));
            }
            if !tree.contains(id) {
                return Err(NoteTreeError::NodeNotFound(id.clone()));
            }
        }

        let (parent_id, child_index) = match &target {
            MoveTarget::BetweenItems {
                parent_id,
                child_index,
            } => (parent_id.as_str(), Some(*child_index)),
            MoveTarget::OntoFolder { folder_id } => (folder_id.as_str(), None),
        };
        ensure_folder(&tree, parent_id)?;
        for id in &moved {
            if id == parent_id || tree.is_descendant(id, parent_id) {
                return Err(NoteTreeError::InvalidMove(
                    "Move would create a cycle".to_string(),
                ));
            }
        }

        tree.strip_children(&moved);
        let parent = tree
            .get_mut(parent_id)
            .ok_or_else(|| NoteTreeError::NodeNotFound(parent_id.to_string()))?;
        let at = child_index.map_or(0, |index| index.min(parent.children.len()));
        parent.children.splice(at..at, moved.iter().cloned());

        self.store.put(&tree)?;
        debug!(
            "event=tree_move module=workspace count={} parent={parent_id} index={at}",
            moved.len()
        );
        Ok(())
    }

    /// Deletes `id` and scrubs it from every `children` list.
    ///
    /// Deleting a folder removes only the folder node; its descendants stay in
    /// the tree record, unreachable from root. Use [`Self::delete_item_with`]
    /// for recursive or promoting deletes.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] if `id` is not in the tree and
    /// [`NoteTreeError::InvalidMove`] for the root.
    pub fn delete_item(&self, id: &str) -> Result<()> {
        self.delete_item_with(id, DeleteStrategy::NodeOnly)
            .map(|_| ())
    }

    /// Deletes `id` using the given [`DeleteStrategy`].
    ///
    /// Whatever the strategy, exactly one mirror notification (for `id`, with
    /// the pre-delete tree) and one telemetry event are emitted.
    ///
    /// # Errors
    ///
    /// As [`Self::delete_item`].
    pub fn delete_item_with(&self, id: &str, strategy: DeleteStrategy) -> Result<DeleteResult> {
        if id == ROOT_ID {
            return Err(NoteTreeError::InvalidMove(
                "The root cannot be deleted".to_string(),
            ));
        }
        let mut tree = self.load_tree()?;
        let node = tree
            .get(id)
            .cloned()
            .ok_or_else(|| NoteTreeError::NodeNotFound(id.to_string()))?;
        let snapshot = tree.clone();

        let result = match strategy {
            DeleteStrategy::NodeOnly => {
                remove_nodes(&mut tree, vec![id.to_string()])
            }
            DeleteStrategy::DeleteAll => {
                let mut doomed = vec![id.to_string()];
                doomed.extend(tree.descendants(id));
                remove_nodes(&mut tree, doomed)
            }
            DeleteStrategy::PromoteChildren => promote_children(&mut tree, &node),
        };

        self.store.put(&tree)?;
        debug!(
            "event=tree_delete module=workspace id={id} strategy={strategy:?} deleted={}",
            result.deleted_count
        );

        self.notifier
            .schedule(NotificationKind::Delete, node.data.clone(), snapshot);
        let (event, key) = if node.is_folder {
            ("delete_folder", "folderId")
        } else {
            ("delete_file", "fileId")
        };
        let mut payload = Map::new();
        payload.insert(key.to_string(), Value::String(id.to_string()));
        self.collaborators.telemetry.record_event(event, payload);

        Ok(result)
    }

    /// Sets `modified_at` of `id` to now. Called when its content changes.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NodeNotFound`] if `id` is not in the tree.
    pub fn touch_modified(&self, id: &str) -> Result<()> {
        let mut tree = self.load_tree()?;
        let node = tree
            .get_mut(id)
            .ok_or_else(|| NoteTreeError::NodeNotFound(id.to_string()))?;
        node.data.modified_at = now_millis();
        self.store.put(&tree)
    }

    fn load_tree(&self) -> Result<FileTree> {
        // A store whose record vanished behaves like an empty workspace.
        Ok(self
            .store
            .get()?
            .unwrap_or_else(|| FileTree::with_root(now_millis())))
    }

    /// Loads, validates the parent, runs `prepare`, then inserts `node` first
    /// under the parent with a unique name and persists.
    fn insert_item(
        &self,
        mut node: TreeNode,
        parent_id: Option<&str>,
        prepare: impl FnOnce(&NodeData) -> Result<()>,
    ) -> Result<NodeData> {
        let parent_id = parent_id.unwrap_or(ROOT_ID);
        let mut tree = self.load_tree()?;
        ensure_folder(&tree, parent_id)?;
        prepare(&node.data)?;

        node.data.name = resolve_name(
            &node.data.name,
            &tree,
            parent_id,
            Some(node.id.as_str()),
        );
        let data = node.data.clone();
        tree.insert(node);
        if let Some(parent) = tree.get_mut(parent_id) {
            parent.children.insert(0, data.id.clone());
        }

        self.store.put(&tree)?;
        debug!(
            "event=tree_insert module=workspace id={} parent={parent_id}",
            data.id
        );
        Ok(data)
    }
}

fn ensure_folder(tree: &FileTree, id: &str) -> Result<()> {
    match tree.get(id) {
        None => Err(NoteTreeError::NodeNotFound(id.to_string())),
        Some(node) if !node.is_folder => Err(NoteTreeError::NotAFolder(id.to_string())),
        Some(_) => Ok(()),
    }
}

fn remove_nodes(tree: &mut FileTree, ids: Vec<String>) -> DeleteResult {
    for id in &ids {
        tree.remove(id);
    }
    tree.strip_children(&ids);
    DeleteResult {
        deleted_count: ids.len(),
        affected_ids: ids,
    }
}

/// Removes `node` and puts its children where it stood in its parent.
fn promote_children(tree: &mut FileTree, node: &TreeNode) -> DeleteResult {
    let id = node.id.clone();
    let parent_id = tree.parent_of(&id).map(str::to_string);
    let children: Vec<String> = node
        .children
        .iter()
        .filter(|child| tree.contains(child))
        .cloned()
        .collect();

    tree.remove(&id);
    if let Some(parent_id) = &parent_id {
        if let Some(parent) = tree.get_mut(parent_id) {
            if let Some(at) = parent.children.iter().position(|child| *child == id) {
                parent.children.splice(at..=at, children.iter().cloned());
            }
        }
        for child in &children {
            let current = tree.get(child).map(|n| n.data.name.clone()).unwrap_or_default();
            let unique = resolve_name(&current, tree, parent_id, Some(child.as_str()));
            if let Some(child_node) = tree.get_mut(child) {
                child_node.data.name = unique;
            }
        }
    }
    tree.strip_children(std::slice::from_ref(&id));

    let mut affected_ids = vec![id];
    affected_ids.extend(children);
    DeleteResult {
        deleted_count: 1,
        affected_ids,
    }
}

fn non_empty_or(name: Option<&str>, fallback: &str) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

fn payload_of(data: &NodeData) -> Map<String, Value> {
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
