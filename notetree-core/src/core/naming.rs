//! Collision-free sibling naming.

use crate::core::node::FileTree;
use regex::Regex;
use std::collections::HashSet;

/// Returns a name for a node under `parent_id` that no sibling already uses.
///
/// `exclude_id` is the node being created or renamed; its own current name
/// never counts as a collision. When `candidate` is free it comes back
/// unchanged. Otherwise the result is `candidate(m+1)`, where `m` is the
/// largest `k` among siblings named exactly `candidate(k)`.
///
/// The suffix pattern is built from `candidate` itself, so renaming an item to
/// `"Note(1)"` next to an existing `"Note(1)"` yields `"Note(1)(1)"`, and
/// repeated renames to the same base keep counting upward. If the largest
/// suffix is already `u64::MAX`, the lowest unused `k` is taken instead.
pub fn resolve_name(
    candidate: &str,
    tree: &FileTree,
    parent_id: &str,
    exclude_id: Option<&str>,
) -> String {
    let siblings = tree.sibling_names(parent_id, exclude_id);
    if !siblings.iter().any(|name| *name == candidate) {
        return candidate.to_string();
    }

    let max_index = match suffix_pattern(candidate) {
        Some(pattern) => siblings
            .iter()
            .filter_map(|name| pattern.captures(name))
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0),
        None => 0,
    };

    let taken: HashSet<&str> = siblings.iter().copied().collect();
    if let Some(next) = max_index.checked_add(1) {
        let name = format!("{candidate}({next})");
        if !taken.contains(name.as_str()) {
            return name;
        }
    }

    // Suffix space exhausted at the top; take the lowest free index instead.
    let mut k: u64 = 1;
    loop {
        let name = format!("{candidate}({k})");
        if !taken.contains(name.as_str()) {
            return name;
        }
        k += 1;
    }
}

fn suffix_pattern(candidate: &str) -> Option<Regex> {
    // Escaped, so names with regex metacharacters match literally.
    Regex::new(&format!(r"^{}\(([1-9][0-9]*)\)$", regex::escape(candidate))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{NodeData, TreeNode, ROOT_ID};

    fn tree_with_root_children(names: &[&str]) -> FileTree {
        let mut tree = FileTree::with_root(0);
        for (i, name) in names.iter().enumerate() {
            let id = format!("file_{i}");
            tree.insert(TreeNode::file(NodeData {
                id: id.clone(),
                name: name.to_string(),
                file_type: None,
                created_at: 0,
                modified_at: 0,
            }));
            tree.get_mut(ROOT_ID).unwrap().children.push(id);
        }
        tree
    }

    #[test]
    fn test_free_name_is_returned_unchanged() {
        let tree = tree_with_root_children(&["Docs", "Board"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note");
    }

    #[test]
    fn test_collision_sequence() {
        let tree = tree_with_root_children(&["Note"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note(1)");

        let tree = tree_with_root_children(&["Note", "Note(1)"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note(2)");
    }

    #[test]
    fn test_uses_max_suffix_not_count() {
        let tree = tree_with_root_children(&["Note", "Note(7)", "Note(2)"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note(8)");
    }

    #[test]
    fn test_multi_digit_suffixes_are_recognised() {
        let tree = tree_with_root_children(&["Note", "Note(10)"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note(11)");
    }

    #[test]
    fn test_excluded_node_does_not_collide_with_itself() {
        let tree = tree_with_root_children(&["Note"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, Some("file_0")), "Note");
    }

    #[test]
    fn test_suffixed_candidate_anchors_on_itself() {
        let tree = tree_with_root_children(&["Note", "Note(1)"]);
        assert_eq!(resolve_name("Note(1)", &tree, ROOT_ID, None), "Note(1)(1)");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let tree = tree_with_root_children(&["a.b", "axb(3)"]);
        assert_eq!(resolve_name("a.b", &tree, ROOT_ID, None), "a.b(1)");
    }

    #[test]
    fn test_order_independent() {
        let a = tree_with_root_children(&["Note(2)", "Note", "Note(1)"]);
        let b = tree_with_root_children(&["Note(1)", "Note(2)", "Note"]);
        assert_eq!(
            resolve_name("Note", &a, ROOT_ID, None),
            resolve_name("Note", &b, ROOT_ID, None)
        );
    }

    #[test]
    fn test_missing_parent_means_no_siblings() {
        let tree = tree_with_root_children(&["Note"]);
        assert_eq!(resolve_name("Note", &tree, "folder_missing", None), "Note");
    }

    #[test]
    fn test_max_suffix_falls_back_to_lowest_free_index() {
        let tree = tree_with_root_children(&["Note", "Note(18446744073709551615)", "Note(1)"]);
        assert_eq!(resolve_name("Note", &tree, ROOT_ID, None), "Note(2)");
    }

    #[test]
    fn test_unparseable_suffix_never_collides() {
        let tree = tree_with_root_children(&["Note", "Note(99999999999999999999)"]);
        let name = resolve_name("Note", &tree, ROOT_ID, None);
        assert_eq!(name, "Note(1)");
        assert!(!tree.sibling_names(ROOT_ID, None).contains(&name.as_str()));
    }
}
