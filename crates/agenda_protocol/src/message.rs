//! Protocol messages.

use crate::error::{ProtocolError, ProtocolResult};
use agenda_store::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

fn default_version() -> u16 {
    PROTOCOL_VERSION
}

/// Operation kind carried by a [`SyncMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Insert a new contact.
    Add,
    /// Delete an existing contact.
    Remove,
    /// Overwrite an existing contact's phone.
    Update,
    /// Read the whole directory (client port only).
    View,
    /// Request a full snapshot (peer port only).
    FetchSnapshot,
}

impl Action {
    /// Returns the wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Remove => "remove",
            Action::Update => "update",
            Action::View => "view",
            Action::FetchSnapshot => "fetch_snapshot",
        }
    }

    /// Returns true for add, remove and update.
    pub fn is_mutation(self) -> bool {
        matches!(self, Action::Add | Action::Remove | Action::Update)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged request record.
///
/// The same shape is used for client requests and peer replication
/// traffic. Which fields are required depends on `action`; see
/// [`SyncMessage::into_mutation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Protocol version of the sender.
    #[serde(default = "default_version")]
    pub version: u16,
    /// Operation kind.
    pub action: Action,
    /// Contact name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl SyncMessage {
    /// Creates a message with the given action and fields.
    pub fn new(action: Action, name: Option<String>, phone: Option<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            action,
            name,
            phone,
        }
    }

    /// Creates an add request.
    pub fn add(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self::new(Action::Add, Some(name.into()), Some(phone.into()))
    }

    /// Creates a remove request.
    pub fn remove(name: impl Into<String>) -> Self {
        Self::new(Action::Remove, Some(name.into()), None)
    }

    /// Creates an update request.
    pub fn update(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self::new(Action::Update, Some(name.into()), Some(phone.into()))
    }

    /// Creates a view request.
    pub fn view() -> Self {
        Self::new(Action::View, None, None)
    }

    /// Creates a snapshot request.
    pub fn fetch_snapshot() -> Self {
        Self::new(Action::FetchSnapshot, None, None)
    }

    /// Rejects messages from an incompatible protocol version.
    pub fn check_version(&self) -> ProtocolResult<()> {
        if self.version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion {
                version: self.version,
            })
        }
    }

    /// Validates an add/remove/update message.
    ///
    /// `name` is required for every mutation and `phone` for add and update.
    /// Blank strings count as missing.
    pub fn into_mutation(self) -> ProtocolResult<Mutation> {
        fn required(value: Option<String>, field: &'static str) -> ProtocolResult<String> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(ProtocolError::MissingField { field })
        }

        match self.action {
            Action::Add => Ok(Mutation::Add {
                name: required(self.name, "name")?,
                phone: required(self.phone, "phone")?,
            }),
            Action::Remove => Ok(Mutation::Remove {
                name: required(self.name, "name")?,
            }),
            Action::Update => Ok(Mutation::Update {
                name: required(self.name, "name")?,
                phone: required(self.phone, "phone")?,
            }),
            other => Err(ProtocolError::UnexpectedAction {
                action: other.as_str(),
            }),
        }
    }
}

impl From<Mutation> for SyncMessage {
    fn from(mutation: Mutation) -> Self {
        match mutation {
            Mutation::Add { name, phone } => SyncMessage::add(name, phone),
            Mutation::Remove { name } => SyncMessage::remove(name),
            Mutation::Update { name, phone } => SyncMessage::update(name, phone),
        }
    }
}

/// A validated directory mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Insert a new contact.
    Add {
        /// Contact name.
        name: String,
        /// Contact phone.
        phone: String,
    },
    /// Delete a contact.
    Remove {
        /// Contact name.
        name: String,
    },
    /// Overwrite a contact's phone.
    Update {
        /// Contact name.
        name: String,
        /// New phone.
        phone: String,
    },
}

impl Mutation {
    /// Returns the action of this mutation.
    pub fn action(&self) -> Action {
        match self {
            Mutation::Add { .. } => Action::Add,
            Mutation::Remove { .. } => Action::Remove,
            Mutation::Update { .. } => Action::Update,
        }
    }

    /// Returns the targeted name.
    pub fn name(&self) -> &str {
        match self {
            Mutation::Add { name, .. }
            | Mutation::Remove { name }
            | Mutation::Update { name, .. } => name,
        }
    }

    /// Returns the phone, if the mutation carries one.
    pub fn phone(&self) -> Option<&str> {
        match self {
            Mutation::Add { phone, .. } | Mutation::Update { phone, .. } => Some(phone),
            Mutation::Remove { .. } => None,
        }
    }

    /// Returns the human-readable success text for this mutation.
    pub fn success_text(&self) -> String {
        let verb = match self {
            Mutation::Add { .. } => "added",
            Mutation::Remove { .. } => "removed",
            Mutation::Update { .. } => "updated",
        };
        format!("contact {} {} successfully", self.name(), verb)
    }
}

/// Client-facing reply to a [`SyncMessage`].
///
/// Peer-facing snapshot replies are a bare [`Snapshot`] and never use
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// The request succeeded.
    Success(String),
    /// The request failed; the directory is unchanged.
    Error(String),
    /// Full contents of a non-empty directory.
    Directory(Snapshot),
    /// The directory has no entries.
    Empty,
}

impl Response {
    /// Creates a success response.
    pub fn success(text: impl Into<String>) -> Self {
        Response::Success(text.into())
    }

    /// Creates an error response.
    pub fn error(text: impl Into<String>) -> Self {
        Response::Error(text.into())
    }

    /// Wraps a snapshot, using [`Response::Empty`] for an empty one.
    pub fn directory(snapshot: Snapshot) -> Self {
        if snapshot.is_empty() {
            Response::Empty
        } else {
            Response::Directory(snapshot)
        }
    }

    /// Returns true unless this is an error.
    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Error(_))
    }

    /// Returns the directory carried by a view reply.
    ///
    /// `Empty` yields an empty snapshot; success and error texts yield `None`.
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            Response::Directory(snapshot) => Some(snapshot),
            Response::Empty => Some(Snapshot::new()),
            Response::Success(_) | Response::Error(_) => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Success(text) => f.write_str(text),
            Response::Error(text) => write!(f, "error: {text}"),
            Response::Empty => f.write_str("directory is empty"),
            Response::Directory(snapshot) => {
                for (i, (name, phone)) in snapshot.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{name}: {phone}")?;
                }
                Ok(())
            }
        }
    }
}
