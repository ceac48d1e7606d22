// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Database connection management and schema setup.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::debug;

use granary_core::fingerprint::Fingerprint;
use granary_core::rules::default_rules;

use crate::error::{Error, Result};
use crate::query;
use crate::schema::{DROP_VIEWS_SQL, SCHEMA_VERSION, TABLES_SQL, VIEWS_SQL, VIEWS_VERSION};
use crate::write;

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access for downstream consumers
    ReadOnly,
    /// Read-write access to an existing database
    ReadWrite,
    /// Create new database if it doesn't exist
    Create,
}

/// Metadata identifying the locked input a database caches.
///
/// Written once per database lifetime, at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedInput {
    /// String form of the locked-flake reference.
    pub locked_ref: String,
    /// Attribute form of the locked-flake reference, as JSON.
    pub attrs: Value,
    /// SHA-256 fingerprint of the locked input; the database's natural key.
    pub fingerprint: Fingerprint,
}

/// SQLite database caching package metadata for one locked input.
///
/// Single-writer: the connection is owned by the scrape engine for the
/// duration of a scrape. Readers may open the file read-only concurrently
/// to the extent SQLite's locking permits.
pub struct PkgDb {
    pub(crate) conn: Connection,
    /// Where the database file lives; `:memory:` for in-memory databases.
    path: PathBuf,
}

impl std::fmt::Debug for PkgDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkgDb").field("path", &self.path).finish()
    }
}

impl PkgDb {
    /// Open an existing database, or create one with `OpenMode::Create`.
    ///
    /// Read-write modes run the schema manager: missing tables and views
    /// are created, stale views are recreated, and a `pkgdb_schema`
    /// mismatch is reported as [`Error::SchemaMismatch`].
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let flags = match mode {
            OpenMode::ReadOnly => {
                if !path.exists() {
                    return Err(Error::NoSuchDatabase(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_ONLY
            }
            OpenMode::ReadWrite => {
                if !path.exists() {
                    return Err(Error::NoSuchDatabase(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_WRITE
            }
            OpenMode::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };

        let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        let db = Self {
            conn,
            path: path.to_owned(),
        };

        if mode == OpenMode::Create {
            db.configure_pragmas()?;
        }
        if mode != OpenMode::ReadOnly {
            db.init()?;
        }

        debug!("Opened database at {} ({:?})", path.display(), mode);
        Ok(db)
    }

    /// Create (or open) the database for `input` and record its metadata.
    pub fn create<P: AsRef<Path>>(path: P, input: &LockedInput) -> Result<Self> {
        let db = Self::open(path, OpenMode::Create)?;
        write::write_locked_input(&db.conn, input)?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn open_memory(input: &LockedInput) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.configure_pragmas()?;
        db.init()?;
        write::write_locked_input(&db.conn, input)?;
        debug!("Created in-memory database");
        Ok(db)
    }

    /// Configure SQLite pragmas for optimal performance.
    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    /// Create or reconcile the schema and its version stamps.
    fn init(&self) -> Result<()> {
        self.conn.execute_batch(TABLES_SQL)?;

        match query::db_version(&self.conn, "pkgdb_schema")? {
            None => {
                self.conn.execute_batch(VIEWS_SQL)?;
                write::set_db_version(&self.conn, "pkgdb_schema", SCHEMA_VERSION)?;
                write::set_db_version(&self.conn, "pkgdb_views_schema", VIEWS_VERSION)?;
                write::set_db_version(&self.conn, "pkgdb_rules_hash", &default_rules().get_hash())?;
                debug!("Created database schema");
            }
            Some(found) if found != SCHEMA_VERSION => {
                return Err(Error::SchemaMismatch {
                    expected: SCHEMA_VERSION.to_string(),
                    found,
                });
            }
            Some(_) => {
                let views = query::db_version(&self.conn, "pkgdb_views_schema")?;
                if views.as_deref() != Some(VIEWS_VERSION) {
                    self.conn.execute_batch(DROP_VIEWS_SQL)?;
                    self.conn.execute_batch(VIEWS_SQL)?;
                    write::set_db_version(&self.conn, "pkgdb_views_schema", VIEWS_VERSION)?;
                    debug!("Refreshed database views");
                }
            }
        }
        Ok(())
    }

    /// Where this database lives on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get raw connection (for advanced usage).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get mutable raw connection (for transactions).
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Check if the database has the expected schema tables.
    pub fn has_schema(&self) -> Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='AttrSets'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
