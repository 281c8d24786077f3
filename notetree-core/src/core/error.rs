//! Error types for the notetree core library.

use thiserror::Error;

/// All errors that can occur within the notetree core library.
#[derive(Debug, Error)]
pub enum NoteTreeError {
    /// The backing database could not be opened or bootstrapped.
    ///
    /// Every store operation fails with this until the underlying problem is
    /// resolved; nothing retries automatically.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// An operation referenced an id that is not present in the tree.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node was used as a parent or drop target but is a file.
    #[error("Not a folder: {0}")]
    NotAFolder(String),

    /// A move or delete would break the tree shape (cycle, moving root, ...).
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// A rename target name is empty.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The node is flagged as not renamable (the root).
    #[error("Rename not allowed: {0}")]
    RenameNotAllowed(String),

    /// A content-store collaborator failed to initialise content for a new file.
    #[error("Content store error: {0}")]
    Content(String),

    /// The external file-mirror bridge rejected a notification.
    #[error("Sync bridge error: {0}")]
    Bridge(String),

    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored tree record could not be (de)serialised.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias that pins the error type to [`NoteTreeError`].
pub type Result<T> = std::result::Result<T, NoteTreeError>;

impl NoteTreeError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "Workspace storage could not be opened".to_string(),
            Self::NodeNotFound(_) => "Item no longer exists".to_string(),
            Self::NotAFolder(_) => "Items can only be placed inside folders".to_string(),
            Self::InvalidMove(msg) => msg.clone(),
            Self::InvalidName(_) => "Names cannot be empty".to_string(),
            Self::RenameNotAllowed(_) => "This item cannot be renamed".to_string(),
            Self::Content(e) => format!("Failed to create content: {e}"),
            Self::Bridge(e) => format!("File mirror error: {e}"),
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
            Self::Io(e) => format!("File error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_message() {
        let e = NoteTreeError::StoreUnavailable("disk full".to_string());
        assert!(e.to_string().contains("disk full"));
        assert!(e.user_message().contains("could not be opened"));
    }

    #[test]
    fn test_node_not_found_names_the_id() {
        let e = NoteTreeError::NodeNotFound("file_abc".to_string());
        assert_eq!(e.to_string(), "Node not found: file_abc");
    }
}
