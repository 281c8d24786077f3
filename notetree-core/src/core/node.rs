//! Tree node types and the whole-tree record.
//!
//! The entire workspace hierarchy is one [`FileTree`] value: a map from node id
//! to [`TreeNode`] with a distinguished [`ROOT_ID`] entry. Parent links are not
//! stored; a node's parent is whichever node lists it in `children`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Id of the distinguished root entry.
pub const ROOT_ID: &str = "root";

/// Id prefix for folders.
pub const FOLDER_PREFIX: &str = "folder_";

/// Id prefix for files.
pub const FILE_PREFIX: &str = "file_";

/// Content kind of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Rich-text note, content held by the note store.
    Note,
    /// Whiteboard, content held by the board store.
    Board,
}

impl FileType {
    /// Lowercase wire name (`note` / `board`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Board => "board",
        }
    }

    /// Parses a wire name; returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(Self::Note),
            "board" => Some(Self::Board),
            _ => None,
        }
    }
}

/// Display payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: String,
    pub name: String,
    /// Set for files only.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
}

/// One folder or file in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub is_folder: bool,
    pub data: NodeData,
    /// Ordered child ids, display order. Always empty for files.
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default = "default_can_rename")]
    pub can_rename: bool,
}

fn default_can_rename() -> bool {
    true
}

impl TreeNode {
    /// Builds a renamable folder node with no children.
    pub fn folder(data: NodeData) -> Self {
        Self {
            id: data.id.clone(),
            is_folder: true,
            data,
            children: Vec::new(),
            can_rename: true,
        }
    }

    /// Builds a renamable file node.
    pub fn file(data: NodeData) -> Self {
        Self {
            id: data.id.clone(),
            is_folder: false,
            data,
            children: Vec::new(),
            can_rename: true,
        }
    }

    /// Builds the root entry.
    pub fn root(now: i64) -> Self {
        Self {
            id: ROOT_ID.to_string(),
            is_folder: true,
            data: NodeData {
                id: ROOT_ID.to_string(),
                name: ROOT_ID.to_string(),
                file_type: None,
                created_at: now,
                modified_at: now,
            },
            children: Vec::new(),
            can_rename: false,
        }
    }
}

/// The whole-tree record: every node keyed by id.
///
/// Serialises as a plain JSON object. A `BTreeMap` keeps the stored record
/// byte-stable for identical trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    nodes: BTreeMap<String, TreeNode>,
}

impl FileTree {
    /// A tree holding only an empty root.
    pub fn with_root(now: i64) -> Self {
        let mut tree = Self::default();
        tree.insert(TreeNode::root(now));
        tree
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.get(ROOT_ID)
    }

    /// Inserts or replaces a node under its own id.
    pub fn insert(&mut self, node: TreeNode) -> Option<TreeNode> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Removes a node from the mapping only; `children` lists are untouched.
    pub fn remove(&mut self, id: &str) -> Option<TreeNode> {
        self.nodes.remove(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Finds the node whose `children` lists `id`.
    ///
    /// Linear scan over every node; there is no parent back-pointer.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.nodes
            .values()
            .find(|node| node.children.iter().any(|child| child == id))
            .map(|node| node.id.as_str())
    }

    /// Names of `parent_id`'s children, skipping `exclude_id` and dangling ids.
    pub fn sibling_names(&self, parent_id: &str, exclude_id: Option<&str>) -> Vec<&str> {
        let Some(parent) = self.nodes.get(parent_id) else {
            return Vec::new();
        };
        parent
            .children
            .iter()
            .filter(|child| Some(child.as_str()) != exclude_id)
            .filter_map(|child| self.nodes.get(child))
            .map(|node| node.data.name.as_str())
            .collect()
    }

    /// Removes every id in `ids` from every node's `children`.
    pub fn strip_children(&mut self, ids: &[String]) {
        for node in self.nodes.values_mut() {
            node.children.retain(|child| !ids.contains(child));
        }
    }

    /// True when `id` sits somewhere below `ancestor` (following `children`).
    pub fn is_descendant(&self, ancestor: &str, id: &str) -> bool {
        let mut stack: Vec<&str> = match self.nodes.get(ancestor) {
            Some(node) => node.children.iter().map(String::as_str).collect(),
            None => return false,
        };
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().map(String::as_str));
            }
        }
        false
    }

    /// Every id below `id`, depth-first, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().map(String::as_str).collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            if current == id || !seen.insert(current) {
                continue;
            }
            out.push(current.to_string());
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().rev().map(String::as_str));
            }
        }
        out
    }

    /// `(parent, child)` pairs where `child` is not a key in the mapping.
    pub fn dangling_children(&self) -> Vec<(String, String)> {
        self.nodes
            .values()
            .flat_map(|node| {
                node.children
                    .iter()
                    .filter(|child| !self.nodes.contains_key(*child))
                    .map(|child| (node.id.clone(), child.clone()))
            })
            .collect()
    }

    /// Ids present in the mapping but not reachable from root.
    ///
    /// Non-recursive folder deletion leaves the former folder's descendants
    /// here.
    pub fn orphans(&self) -> Vec<String> {
        let mut reachable: HashSet<&str> = HashSet::new();
        reachable.insert(ROOT_ID);
        for id in self.descendants(ROOT_ID) {
            if let Some((key, _)) = self.nodes.get_key_value(&id) {
                reachable.insert(key.as_str());
            }
        }
        self.nodes
            .keys()
            .filter(|id| !reachable.contains(id.as_str()))
            .cloned()
            .collect()
    }
}
