//! Authorization decisions for file operations.
//!
//! Every gated handler asks [`authorize`] before touching the registry or the
//! stored bytes. The rules depend only on the acting identity's role and on
//! ownership of the target record.

use kernel::Role;

use crate::auth::Identity;
use crate::domain::{FileRecord, ListScope};
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Upload,
    Download,
    Delete,
    CreateFolder,
}

/// Decides whether `identity` may perform `action` on `target`.
///
/// Delete depends on role alone, `target` is ignored for it.
pub fn authorize(
    identity: &Identity,
    action: Action,
    target: Option<&FileRecord>,
) -> Result<(), ApiError> {
    match action {
        Action::List | Action::Upload | Action::CreateFolder => Ok(()),
        Action::Delete if identity.role == Role::Admin => Ok(()),
        Action::Delete => Err(ApiError::Forbidden),
        Action::Download => match target {
            Some(file) if can_read(identity, file) => Ok(()),
            Some(_) => Err(ApiError::Forbidden),
            None => Err(ApiError::NotFound),
        },
    }
}

/// Records a listing made by `identity` may contain.
#[must_use]
pub fn list_scope(identity: &Identity) -> ListScope {
    match identity.role {
        Role::Admin => ListScope::All,
        Role::User => ListScope::Owner(identity.user_id),
    }
}

fn can_read(identity: &Identity, file: &FileRecord) -> bool {
    identity.role == Role::Admin || file.owner_id == identity.user_id
}
