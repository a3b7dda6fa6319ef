#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Folder label used when an upload does not name one.
pub const DEFAULT_FOLDER: &str = "root";

/// Capability level of an account.
///
/// Admins may list and delete every user's files without becoming their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Represents an uploaded file as listed by the files API.
///
/// Storage location is never exposed; files are addressed by id only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileEntry {
    /// Unique numeric identifier for the file
    pub id: i64,
    /// File name as supplied by the uploader
    pub originalname: String,
    /// Size of the stored file in bytes
    pub size: u64,
    /// Free-text folder label
    pub folder: String,
    /// Upload time (RFC 3339)
    pub uploaded_at: String,
    /// Owner's email, present only in admin listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Plain acknowledgement reply.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error reply body used by the JSON API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorReply {
    pub error: String,
}

/// Result of a batch upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadReply {
    pub message: String,
    /// Ids of the records created, in upload order
    pub ids: Vec<i64>,
}

/// Identity of the logged in account.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub email: String,
    pub role: Role,
}

/// Request body of `POST /create-folder`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateFolder {
    #[serde(rename = "folderName", default)]
    pub folder_name: String,
}
