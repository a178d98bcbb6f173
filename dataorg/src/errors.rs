use thiserror::Error;
use tokio::task::JoinError;

use crate::proto::NodeKind;
use crate::{DigitalObjectId, NodeId};

/// Errors returned by the tree store and the [crate::DataOrganizer].
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A tree for this digital object and view was already created.
    #[error("a tree for {digital_object_id} in view '{view}' already exists")]
    AlreadyExists {
        digital_object_id: DigitalObjectId,
        view: String,
    },

    /// There is no tree (and thus no root node) for this digital object and view.
    #[error("no tree for {digital_object_id} in view '{view}'")]
    NotFound {
        digital_object_id: DigitalObjectId,
        view: String,
    },

    /// The handle does not resolve to a node, either because it never did,
    /// or because the tree was re-created since it has been issued.
    #[error("node handle {0} does not resolve")]
    InvalidHandle(NodeId),

    /// A content update tried to replace a node with one of a different kind.
    #[error("node kind mismatch: stored node is {stored:?}, replacement is {replacement:?}")]
    TypeMismatch {
        stored: NodeKind,
        replacement: NodeKind,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(value: prost::DecodeError) -> Self {
        Error::StorageError(format!("unable to decode node record: {}", value))
    }
}

impl From<sled::Error> for Error {
    fn from(value: sled::Error) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::Error> for Error {
    fn from(value: redb::Error) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(value: redb::DatabaseError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(value: redb::TableError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(value: redb::TransactionError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(value: redb::StorageError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(value: redb::CommitError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::InvalidInput {
            Error::InvalidRequest(value.to_string())
        } else {
            Error::StorageError(value.to_string())
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::AlreadyExists { .. } => Self::new(std::io::ErrorKind::AlreadyExists, value),
            Error::NotFound { .. } | Error::InvalidHandle(_) => {
                Self::new(std::io::ErrorKind::NotFound, value)
            }
            Error::TypeMismatch { .. } | Error::MalformedInput(_) | Error::InvalidRequest(_) => {
                Self::new(std::io::ErrorKind::InvalidInput, value)
            }
            Error::StorageError(_) => Self::new(std::io::ErrorKind::Other, value),
        }
    }
}
