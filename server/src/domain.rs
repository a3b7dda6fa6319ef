use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use kernel::{FileEntry, Role};

/// Registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Metadata of one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub owner_id: i64,
    pub stored_filename: String,
    pub original_filename: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub blake3_hash: String,
    pub folder: String,
    pub uploaded_at: DateTime<Utc>,
}

/// File record not yet persisted.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: i64,
    pub stored_filename: String,
    pub original_filename: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub blake3_hash: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Which file records a listing may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Every record, annotated with the owner's email
    All,
    /// Records owned by the given user id
    Owner(i64),
}

pub trait Storage {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Inserts a user. Returns `None` when the email is already registered.
    fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<i64>, Self::Err>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Self::Err>;

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>, Self::Err>;

    fn set_role(&mut self, id: i64, role: Role) -> Result<usize, Self::Err>;

    fn insert_file(&mut self, file: &NewFile) -> Result<i64, Self::Err>;

    fn get_file(&self, id: i64) -> Result<Option<FileRecord>, Self::Err>;

    fn list_files(&self, scope: ListScope) -> Result<Vec<FileEntry>, Self::Err>;

    fn delete_file(&mut self, id: i64) -> Result<usize, Self::Err>;

    fn create_session(
        &mut self,
        id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Err>;

    fn find_session(&self, id: &str) -> Result<Option<Session>, Self::Err>;

    fn touch_session(&mut self, id: &str, expires_at: DateTime<Utc>) -> Result<usize, Self::Err>;

    fn delete_session(&mut self, id: &str) -> Result<usize, Self::Err>;

    /// Removes every session that expired before `now`.
    fn purge_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, Self::Err>;
}
