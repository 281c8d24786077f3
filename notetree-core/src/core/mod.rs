//! Internal domain modules for the notetree core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod collaborators;
pub mod config;
pub mod delete;
pub mod error;
pub mod legacy;
pub mod naming;
pub mod node;
pub mod storage;
pub mod sync_notifier;
pub mod workspace;

#[doc(inline)]
pub use collaborators::{Collaborators, ContentStore, SyncBridge, TabModel, Telemetry};
#[doc(inline)]
pub use config::{
    config_file_path, default_data_directory, load_config, save_config, StoreConfig,
};
#[doc(inline)]
pub use delete::{DeleteResult, DeleteStrategy};
#[doc(inline)]
pub use error::{NoteTreeError, Result};
#[doc(inline)]
pub use legacy::LegacyMigrator;
#[doc(inline)]
pub use naming::resolve_name;
#[doc(inline)]
pub use node::{FileTree, FileType, NodeData, TreeNode, ROOT_ID};
#[doc(inline)]
pub use storage::{StoreHandle, TreeStore};
#[doc(inline)]
pub use sync_notifier::{NotificationKind, SyncNotifier};
#[doc(inline)]
pub use workspace::{MoveTarget, Workspace};
