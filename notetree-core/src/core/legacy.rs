//! One-time import of the deprecated menu database.
//!
//! The old layout kept folders and files in separate tables with a
//! `file_folder` mapping table and no ordering of its own:
//!
//! ```sql
//! CREATE TABLE folders (id TEXT PRIMARY KEY, name TEXT, gmt_create INTEGER, gmt_modified INTEGER);
//! CREATE TABLE files (id TEXT PRIMARY KEY, name TEXT, type TEXT, gmt_create INTEGER, gmt_modified INTEGER);
//! CREATE TABLE file_folder (file_id TEXT, folder_id TEXT);
//! ```
//!
//! Conversion yields a two-level tree: folders under root, mapped files under
//! their folder, unmapped files under root. Within each level the newest item
//! comes first, the same order repeated prepends would produce.

use crate::core::naming::resolve_name;
use crate::core::node::{FileTree, FileType, NodeData, TreeNode, FILE_PREFIX, FOLDER_PREFIX, ROOT_ID};
use crate::core::storage::StoreHandle;
use crate::Result;
use log::{info, warn};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Imports the legacy layout into the current store at most once per instance.
pub struct LegacyMigrator {
    source: Option<PathBuf>,
    migrated: AtomicBool,
}

impl LegacyMigrator {
    /// A migrator reading the legacy database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source: Some(path.as_ref().to_path_buf()),
            migrated: AtomicBool::new(false),
        }
    }

    /// A migrator with no legacy source; every run finds nothing.
    pub fn none() -> Self {
        Self {
            source: None,
            migrated: AtomicBool::new(false),
        }
    }

    /// Whether [`Self::migrate_once`] has already run.
    pub fn has_run(&self) -> bool {
        self.migrated.load(Ordering::SeqCst)
    }

    /// Settles the migrator without importing. Used when the store already
    /// holds a tree that an import would overwrite.
    pub fn mark_done(&self) {
        self.migrated.store(true, Ordering::SeqCst);
    }

    /// On the first call, replaces the stored tree with the legacy tree if one
    /// is found. Every later call does nothing.
    ///
    /// Returns `true` when legacy data was written. An unreadable legacy
    /// database counts as "no legacy data".
    ///
    /// # Errors
    ///
    /// Only a failure to write the imported tree into the current store is
    /// surfaced.
    pub fn migrate_once(&self, handle: &StoreHandle) -> Result<bool> {
        if self.migrated.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let Some(path) = self.source.as_deref() else {
            return Ok(false);
        };

        match read_legacy_tree(path) {
            Ok(Some(tree)) => {
                if let Err(err) = handle.write_tree(&tree) {
                    // Nothing was imported; let the next bootstrap try again.
                    self.migrated.store(false, Ordering::SeqCst);
                    return Err(err);
                }
                info!(
                    "event=legacy_migrate module=legacy status=ok nodes={}",
                    tree.len()
                );
                Ok(true)
            }
            Ok(None) => {
                info!("event=legacy_migrate module=legacy status=skipped reason=no_data");
                Ok(false)
            }
            Err(err) => {
                warn!("event=legacy_migrate module=legacy status=error error={err}");
                Ok(false)
            }
        }
    }
}

struct LegacyFolder {
    id: String,
    name: String,
    created_at: i64,
    modified_at: i64,
}

struct LegacyFile {
    id: String,
    name: String,
    file_type: String,
    created_at: i64,
    modified_at: i64,
}

/// Reads and converts the legacy database; `None` when it holds nothing.
fn read_legacy_tree(path: &Path) -> Result<Option<FileTree>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('folders', 'files')",
        [],
        |row| row.get(0),
    )?;
    if table_count != 2 {
        return Ok(None);
    }

    let folders = conn
        .prepare(
            "SELECT id, name, gmt_create, gmt_modified FROM folders
             ORDER BY gmt_create DESC, id",
        )?
        .query_map([], |row| {
            Ok(LegacyFolder {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                created_at: row.get(2)?,
                modified_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let files = conn
        .prepare(
            "SELECT id, name, type, gmt_create, gmt_modified FROM files
             ORDER BY gmt_create DESC, id",
        )?
        .query_map([], |row| {
            Ok(LegacyFile {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                file_type: row.get(2)?,
                created_at: row.get(3)?,
                modified_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if folders.is_empty() && files.is_empty() {
        return Ok(None);
    }

    let mapping = read_file_folder_mapping(&conn)?;
    Ok(Some(build_tree(folders, files, &mapping)))
}

fn read_file_folder_mapping(conn: &Connection) -> Result<HashMap<String, String>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'file_folder'",
        [],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(HashMap::new());
    }
    let pairs = conn
        .prepare("SELECT file_id, folder_id FROM file_folder")?
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(pairs)
}

fn build_tree(
    folders: Vec<LegacyFolder>,
    files: Vec<LegacyFile>,
    mapping: &HashMap<String, String>,
) -> FileTree {
    let mut tree = FileTree::with_root(chrono::Utc::now().timestamp_millis());
    // Legacy folder id -> tree id.
    let mut folder_ids: HashMap<String, String> = HashMap::new();

    for folder in folders {
        let id = with_prefix(&folder.id, FOLDER_PREFIX);
        if tree.contains(&id) {
            warn!("event=legacy_migrate module=legacy status=skipped_row reason=duplicate_id id={id}");
            continue;
        }
        let name = resolve_name(&folder.name, &tree, ROOT_ID, None);
        tree.insert(TreeNode::folder(NodeData {
            id: id.clone(),
            name,
            file_type: None,
            created_at: folder.created_at,
            modified_at: folder.modified_at,
        }));
        append_child(&mut tree, ROOT_ID, &id);
        folder_ids.insert(folder.id, id);
    }

    for file in files {
        let Some(file_type) = FileType::parse(&file.file_type) else {
            warn!(
                "event=legacy_migrate module=legacy status=skipped_row reason=unknown_type id={} type={}",
                file.id, file.file_type
            );
            continue;
        };
        let id = with_prefix(&file.id, FILE_PREFIX);
        if tree.contains(&id) {
            warn!("event=legacy_migrate module=legacy status=skipped_row reason=duplicate_id id={id}");
            continue;
        }
        let parent_id = mapping
            .get(&file.id)
            .and_then(|folder| folder_ids.get(folder))
            .cloned()
            .unwrap_or_else(|| ROOT_ID.to_string());
        let name = resolve_name(&file.name, &tree, &parent_id, None);
        tree.insert(TreeNode::file(NodeData {
            id: id.clone(),
            name,
            file_type: Some(file_type),
            created_at: file.created_at,
            modified_at: file.modified_at,
        }));
        append_child(&mut tree, &parent_id, &id);
    }

    tree
}

fn append_child(tree: &mut FileTree, parent_id: &str, child_id: &str) {
    if let Some(parent) = tree.get_mut(parent_id) {
        parent.children.push(child_id.to_string());
    }
}

fn with_prefix(id: &str, prefix: &str) -> String {
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id}")
    }
}
