//! Core library for notetree, the folder/file tree behind a local notes and
//! whiteboard workspace.
//!
//! The primary entry point is [`Workspace`], which opens the tree store and
//! applies every mutation: add, rename, move, delete. The whole tree lives as
//! one JSON record in a SQLite key-value table; renames and deletes are
//! forwarded to an external file mirror after a short delay.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    collaborators::{Collaborators, ContentStore, SyncBridge, TabModel, Telemetry},
    config::{config_file_path, default_data_directory, load_config, save_config, StoreConfig},
    delete::{DeleteResult, DeleteStrategy},
    error::{NoteTreeError, Result},
    legacy::LegacyMigrator,
    naming::resolve_name,
    node::{FileTree, FileType, NodeData, TreeNode, FILE_PREFIX, FOLDER_PREFIX, ROOT_ID},
    storage::{default_tree, StoreHandle, TreeStore, FILE_TREE_KEY},
    sync_notifier::{NotificationKind, SyncNotifier, DEFAULT_NOTIFY_DELAY},
    workspace::{MoveTarget, Workspace, DEFAULT_FILE_NAME, DEFAULT_FOLDER_NAME},
};
