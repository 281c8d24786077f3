//! Delete strategy and result types for node removal.
//!
//! [`DeleteStrategy::NodeOnly`] is what [`Workspace::delete_item`] does: it
//! removes just the named node and scrubs its id from every `children` list.
//! A deleted folder's descendants stay in the tree record but are no longer
//! reachable from root (see [`FileTree::orphans`]). The other two strategies
//! are explicit opt-ins through [`Workspace::delete_item_with`].
//!
//! Both types serialise for the UI boundary: strategies as PascalCase strings,
//! results with camelCase fields.
//!
//! ```rust
//! use notetree_core::{DeleteResult, DeleteStrategy};
//!
//! let json = serde_json::to_string(&DeleteStrategy::PromoteChildren).unwrap();
//! assert_eq!(json, r#""PromoteChildren""#);
//!
//! let result = DeleteResult { deleted_count: 1, affected_ids: vec!["file_a".to_string()] };
//! assert!(serde_json::to_string(&result).unwrap().contains("deletedCount"));
//! ```
//!
//! [`Workspace::delete_item`]: super::workspace::Workspace::delete_item
//! [`Workspace::delete_item_with`]: super::workspace::Workspace::delete_item_with
//! [`FileTree::orphans`]: super::node::FileTree::orphans

use serde::{Deserialize, Serialize};

/// Determines what happens to a folder's children when it is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DeleteStrategy {
    /// Remove only the node. Children of a deleted folder become orphans.
    #[default]
    NodeOnly,

    /// Remove the node and every descendant.
    DeleteAll,

    /// Remove the node and splice its children into its former parent, at its
    /// old position and in their existing order.
    PromoteChildren,
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Number of nodes removed from the tree record.
    pub deleted_count: usize,

    /// Removed ids, plus re-parented ids for [`DeleteStrategy::PromoteChildren`].
    pub affected_ids: Vec<String>,
}
