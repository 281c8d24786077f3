//! Key-value store holding the whole workspace tree as one record.

use crate::core::legacy::LegacyMigrator;
use crate::core::node::{FileTree, FileType, NodeData, TreeNode, ROOT_ID};
use crate::{NoteTreeError, Result};
use log::{error, info};
use once_cell::sync::OnceCell;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Key of the single record holding the tree.
pub const FILE_TREE_KEY: &str = "file_tree";

/// Schema version written to `PRAGMA user_version` after creation.
const SCHEMA_VERSION: u32 = 1;

enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// An open, bootstrapped connection to the tree store.
pub struct StoreHandle {
    conn: Mutex<Connection>,
}

impl StoreHandle {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement cannot leave a half-written record; keep going.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the tree record, or `None` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::Database`] for SQLite failures and
    /// [`NoteTreeError::Json`] if the stored record is not a valid tree.
    pub fn read_tree(&self) -> Result<Option<FileTree>> {
        let raw: Option<String> = self
            .lock()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [FILE_TREE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Replaces the tree record with `tree` in a single statement.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::Database`] or [`NoteTreeError::Json`].
    pub fn write_tree(&self, tree: &FileTree) -> Result<()> {
        let json = serde_json::to_string(tree)?;
        self.lock().execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![FILE_TREE_KEY, json],
        )?;
        Ok(())
    }

    /// Whether a tree record exists, without parsing it.
    fn has_tree(&self) -> Result<bool> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM kv_store WHERE key = ?1",
            [FILE_TREE_KEY],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Runs `f` against the raw connection.
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.lock())
    }
}

/// Persistent store adapter for the workspace tree.
///
/// Construct one per workspace and share it by reference. The connection is
/// opened lazily by [`TreeStore::init`]; every other method initialises on
/// demand.
pub struct TreeStore {
    location: StoreLocation,
    legacy: LegacyMigrator,
    handle: OnceCell<StoreHandle>,
}

impl TreeStore {
    /// A store backed by the SQLite file at `path`.
    pub fn new<P: AsRef<Path>>(path: P, legacy: LegacyMigrator) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            legacy,
            handle: OnceCell::new(),
        }
    }

    /// A store backed by a private in-memory database.
    pub fn in_memory(legacy: LegacyMigrator) -> Self {
        Self {
            location: StoreLocation::Memory,
            legacy,
            handle: OnceCell::new(),
        }
    }

    /// Opens and bootstraps the database, once.
    ///
    /// Repeated and concurrent calls return the same handle; concurrent first
    /// callers wait on the single in-flight open. A failed open is not
    /// remembered, so a later call tries again.
    ///
    /// When the store holds no tree record yet the legacy migrator runs, and
    /// the default tree is seeded if the store is still empty afterwards. On a
    /// store that already has a record the migrator is marked as done.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::StoreUnavailable`] when the database cannot be
    /// opened or bootstrapped.
    pub fn init(&self) -> Result<&StoreHandle> {
        self.handle.get_or_try_init(|| {
            let started_at = Instant::now();
            let mode = self.location.mode();
            info!("event=store_open module=storage status=start mode={mode}");
            match self.open_and_bootstrap() {
                Ok(handle) => {
                    info!(
                        "event=store_open module=storage status=ok mode={mode} duration_ms={}",
                        started_at.elapsed().as_millis()
                    );
                    Ok(handle)
                }
                Err(err) => {
                    error!(
                        "event=store_open module=storage status=error mode={mode} duration_ms={} error={err}",
                        started_at.elapsed().as_millis()
                    );
                    Err(match err {
                        NoteTreeError::StoreUnavailable(msg) => NoteTreeError::StoreUnavailable(msg),
                        other => NoteTreeError::StoreUnavailable(other.to_string()),
                    })
                }
            }
        })
    }

    /// Loads the whole tree.
    pub fn get(&self) -> Result<Option<FileTree>> {
        self.init()?.read_tree()
    }

    /// Persists the whole tree, replacing whatever was stored.
    pub fn put(&self, tree: &FileTree) -> Result<()> {
        self.init()?.write_tree(tree)
    }

    /// Re-invokes the legacy migrator through this store.
    ///
    /// Returns `true` only if this call imported legacy data. Since
    /// [`Self::init`] always settles the migrator, this is `false` once the
    /// store is open.
    pub fn migrate_legacy(&self) -> Result<bool> {
        let handle = self.init()?;
        self.legacy.migrate_once(handle)
    }

    fn open_and_bootstrap(&self) -> Result<StoreHandle> {
        let conn = match &self.location {
            StoreLocation::File(path) => Connection::open(path),
            StoreLocation::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| NoteTreeError::StoreUnavailable(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let version = schema_version(&conn)?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(include_str!("schema.sql"))?;
        }
        let handle = StoreHandle {
            conn: Mutex::new(conn),
        };

        // A missing record means a fresh store or a bootstrap that stopped
        // before writing one; both get the import and the seed.
        if handle.has_tree()? {
            self.legacy.mark_done();
        } else {
            self.legacy.migrate_once(&handle)?;
            if !handle.has_tree()? {
                handle.write_tree(&default_tree(chrono::Utc::now().timestamp_millis()))?;
                info!("event=store_seed module=storage status=ok");
            }
        }

        // Bumped last, so an interrupted bootstrap is retried on the next open.
        if version < SCHEMA_VERSION {
            handle.with_connection(|c| {
                c.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
            })?;
        }

        Ok(handle)
    }
}

/// Reads `PRAGMA user_version`, rejecting databases newer than this build.
fn schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(NoteTreeError::StoreUnavailable(format!(
            "database schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    Ok(version)
}

/// The tree a brand-new store starts with.
pub fn default_tree(now: i64) -> FileTree {
    let entry = |id: &str, name: &str, file_type: Option<FileType>| NodeData {
        id: id.to_string(),
        name: name.to_string(),
        file_type,
        created_at: now,
        modified_at: now,
    };

    let mut folder = TreeNode::folder(entry("folder_getting_started", "Getting Started", None));
    folder.children = vec![
        "file_welcome_note".to_string(),
        "file_welcome_board".to_string(),
    ];

    let mut tree = FileTree::with_root(now);
    tree.insert(folder);
    tree.insert(TreeNode::file(entry(
        "file_welcome_note",
        "Welcome",
        Some(FileType::Note),
    )));
    tree.insert(TreeNode::file(entry(
        "file_welcome_board",
        "Sketchpad",
        Some(FileType::Board),
    )));
    if let Some(root) = tree.get_mut(ROOT_ID) {
        root.children = vec!["folder_getting_started".to_string()];
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    fn file_store(path: &Path) -> TreeStore {
        TreeStore::new(path, LegacyMigrator::none())
    }

    #[test]
    fn test_init_seeds_default_tree() {
        let temp = NamedTempFile::new().unwrap();
        let store = file_store(temp.path());

        let tree = store.get().unwrap().expect("seeded tree");
        let root = tree.root().unwrap();
        assert_eq!(root.children, vec!["folder_getting_started".to_string()]);
        assert!(tree.contains("file_welcome_note"));
        assert!(tree.contains("file_welcome_board"));
        assert!(tree.dangling_children().is_empty());
        assert!(tree.orphans().is_empty());
    }

    #[test]
    fn test_init_returns_same_handle() {
        let store = TreeStore::in_memory(LegacyMigrator::none());
        let first = store.init().unwrap() as *const StoreHandle;
        let second = store.init().unwrap() as *const StoreHandle;
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_concurrent_first_init_opens_once() {
        let temp = NamedTempFile::new().unwrap();
        let store = std::sync::Arc::new(file_store(temp.path()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.init().unwrap() as *const StoreHandle as usize)
            })
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_put_then_get_replaces_whole_record() {
        let store = TreeStore::in_memory(LegacyMigrator::none());
        let tree = FileTree::with_root(5);
        store.put(&tree).unwrap();
        assert_eq!(store.get().unwrap(), Some(tree));

        let rows: i64 = store
            .init()
            .unwrap()
            .with_connection(|c| c.query_row("SELECT COUNT(*) FROM kv_store", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_reopen_does_not_reseed() {
        let temp = NamedTempFile::new().unwrap();
        {
            let store = file_store(temp.path());
            store.put(&FileTree::with_root(9)).unwrap();
        }
        let store = file_store(temp.path());
        let tree = store.get().unwrap().unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().unwrap().children.is_empty());
    }

    #[test]
    fn test_interrupted_bootstrap_is_finished_on_next_open() {
        let temp = NamedTempFile::new().unwrap();
        {
            // Tables created but neither the seed nor the version made it.
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute_batch(include_str!("schema.sql")).unwrap();
        }
        let store = file_store(temp.path());
        let tree = store.get().unwrap().expect("seeded tree");
        assert!(tree.contains("folder_getting_started"));

        let version: u32 = store
            .init()
            .unwrap()
            .with_connection(|c| c.query_row("PRAGMA user_version;", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_unopenable_path_is_store_unavailable() {
        let dir = tempdir().unwrap();
        let store = file_store(&dir.path().join("missing").join("tree.db"));
        let err = store.get().unwrap_err();
        assert!(matches!(err, NoteTreeError::StoreUnavailable(_)), "got {err:?}");
        assert!(matches!(
            store.put(&FileTree::with_root(0)),
            Err(NoteTreeError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let temp = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute_batch("PRAGMA user_version = 42;").unwrap();
        }
        let store = file_store(temp.path());
        let err = store.init().err().expect("newer schema must fail");
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_corrupt_record_is_json_error() {
        let store = TreeStore::in_memory(LegacyMigrator::none());
        store
            .init()
            .unwrap()
            .with_connection(|c| {
                c.execute(
                    "UPDATE kv_store SET value = 'not json' WHERE key = ?1",
                    [FILE_TREE_KEY],
                )
            })
            .unwrap();
        assert!(matches!(store.get(), Err(NoteTreeError::Json(_))));
    }
}
