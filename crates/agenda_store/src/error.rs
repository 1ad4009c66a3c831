//! Error types for the directory store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by directory mutations.
///
/// Both variants leave the directory untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `add` of a name that is already present.
    #[error("contact {name} already exists")]
    DuplicateName {
        /// The rejected name.
        name: String,
    },

    /// `remove` or `update` of a name that is not present.
    #[error("contact {name} not found")]
    NotFound {
        /// The missing name.
        name: String,
    },
}

impl StoreError {
    /// Creates a duplicate name error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}
