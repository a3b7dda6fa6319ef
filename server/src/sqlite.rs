use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kernel::{FileEntry, Role};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Error, OpenFlags, OptionalExtension, Row};

use crate::domain::{FileRecord, ListScope, NewFile, Session, Storage, User};
use crate::error::ApiError;

const CACHE_SIZE: &str = "4096";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const FILE_COLUMNS: &str =
    "id, user_id, filename, originalname, path, size, blake3_hash, folder, uploaded_at";
const USER_COLUMNS: &str = "id, email, password, role, created_at";

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
}

impl Storage for Sqlite {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  email        TEXT NOT NULL UNIQUE,
                  password     TEXT NOT NULL,
                  role         TEXT NOT NULL DEFAULT 'user',
                  created_at   TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                  filename     TEXT NOT NULL,
                  originalname TEXT NOT NULL,
                  path         TEXT NOT NULL UNIQUE,
                  size         INTEGER NOT NULL,
                  blake3_hash  TEXT NOT NULL,
                  folder       TEXT NOT NULL DEFAULT 'root',
                  uploaded_at  TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS files_user_ix ON files(user_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                  id           TEXT PRIMARY KEY,
                  user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                  created_at   TEXT NOT NULL,
                  expires_at   INTEGER NOT NULL
                  )",
            [],
        )?;

        Ok(())
    }

    fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<i64>, Self::Err> {
        let inserted = self.conn.execute(
            "INSERT INTO users (email, password, role, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
            params![email, password_hash, role.as_str(), Utc::now()],
        )?;
        if inserted == 0 {
            Ok(None)
        } else {
            Ok(Some(self.conn.last_insert_rowid()))
        }
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Self::Err> {
        self.conn
            .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?
            .query_row(params![email], user_from_row)
            .optional()
    }

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>, Self::Err> {
        self.conn
            .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?
            .query_row(params![id], user_from_row)
            .optional()
    }

    fn set_role(&mut self, id: i64, role: Role) -> Result<usize, Self::Err> {
        self.conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id],
        )
    }

    fn insert_file(&mut self, file: &NewFile) -> Result<i64, Self::Err> {
        self.enable_foreign_keys()?;
        let size = i64::try_from(file.size_bytes).unwrap_or(i64::MAX);
        self.conn
            .prepare_cached(
                "INSERT INTO files (user_id, filename, originalname, path, size, blake3_hash, folder, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                file.owner_id,
                &file.stored_filename,
                &file.original_filename,
                &file.storage_path,
                size,
                &file.blake3_hash,
                &file.folder,
                Utc::now(),
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_file(&self, id: i64) -> Result<Option<FileRecord>, Self::Err> {
        self.conn
            .prepare_cached(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"))?
            .query_row(params![id], file_from_row)
            .optional()
    }

    fn list_files(&self, scope: ListScope) -> Result<Vec<FileEntry>, Self::Err> {
        match scope {
            ListScope::All => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT files.id, files.originalname, files.size, files.folder, files.uploaded_at, users.email
                     FROM files JOIN users ON files.user_id = users.id
                     ORDER BY files.id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(FileEntry {
                        user_email: Some(row.get(5)?),
                        ..entry_from_row(row)?
                    })
                })?;
                let entries = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            }
            ListScope::Owner(owner) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT id, originalname, size, folder, uploaded_at
                     FROM files WHERE user_id = ?1
                     ORDER BY id",
                )?;
                let rows = stmt.query_map(params![owner], entry_from_row)?;
                let entries = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            }
        }
    }

    fn delete_file(&mut self, id: i64) -> Result<usize, Self::Err> {
        self.conn
            .execute("DELETE FROM files WHERE id = ?1", params![id])
    }

    fn create_session(
        &mut self,
        id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Err> {
        self.enable_foreign_keys()?;
        self.conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, Utc::now(), expires_at.timestamp()],
        )?;
        Ok(())
    }

    fn find_session(&self, id: &str) -> Result<Option<Session>, Self::Err> {
        self.conn
            .prepare_cached("SELECT id, user_id, expires_at FROM sessions WHERE id = ?1")?
            .query_row(params![id], |row| {
                let expires_at: i64 = row.get(2)?;
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_default(),
                })
            })
            .optional()
    }

    fn touch_session(&mut self, id: &str, expires_at: DateTime<Utc>) -> Result<usize, Self::Err> {
        self.conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
            params![expires_at.timestamp(), id],
        )
    }

    fn delete_session(&mut self, id: &str) -> Result<usize, Self::Err> {
        self.conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])
    }

    fn purge_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, Self::Err> {
        self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.timestamp()],
        )
    }
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }?;
        c.busy_timeout(BUSY_TIMEOUT)?;
        let s = Self { conn: c };
        s.assign_cache_size()?;
        Ok(s)
    }

    #[cfg(test)]
    pub fn count_users_by_email(&self, email: &str) -> Result<usize, Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
    }

    #[cfg(test)]
    pub fn count_sessions(&self) -> Result<usize, Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, Error> {
        let s = Self {
            conn: Connection::open_in_memory()?,
        };
        s.new_database()?;
        Ok(s)
    }

    fn enable_foreign_keys(&self) -> Result<(), Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}

/// Opens a connection for one unit of work and runs `action` on it.
pub fn execute<F, R>(db: &Path, mode: Mode, action: F) -> Result<R, ApiError>
where
    F: FnOnce(Sqlite) -> Result<R, ApiError>,
{
    let start = Instant::now();
    match Sqlite::open(db, mode) {
        Ok(s) => {
            let res = action(s);
            let duration = start.elapsed();
            tracing::debug!("DB query time: {:?}", duration);
            res
        }
        Err(e) => {
            tracing::error!("{e}");
            Err(ApiError::Database(e))
        }
    }
}

fn user_from_row(row: &Row<'_>) -> Result<User, Error> {
    let role: String = row.get(3)?;
    let role = role.parse::<Role>().map_err(|e| {
        Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role,
        created_at: row.get(4)?,
    })
}

fn file_from_row(row: &Row<'_>) -> Result<FileRecord, Error> {
    let size: i64 = row.get(5)?;
    Ok(FileRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        stored_filename: row.get(2)?,
        original_filename: row.get(3)?,
        storage_path: row.get(4)?,
        size_bytes: u64::try_from(size).unwrap_or_default(),
        blake3_hash: row.get(6)?,
        folder: row.get(7)?,
        uploaded_at: row.get(8)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> Result<FileEntry, Error> {
    let size: i64 = row.get(2)?;
    let uploaded_at: DateTime<Utc> = row.get(4)?;
    Ok(FileEntry {
        id: row.get(0)?,
        originalname: row.get(1)?,
        size: u64::try_from(size).unwrap_or_default(),
        folder: row.get(3)?,
        uploaded_at: uploaded_at.to_rfc3339(),
        user_email: None,
    })
}
