// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Insertion primitives for the package cache.
//!
//! All upserts are idempotent so a scrape can be re-run over the same
//! database. The module-level functions take a bare [`Connection`] so the
//! scrape driver can use them inside a per-target transaction; the
//! [`PkgDb`] methods wrap them for direct callers.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use granary_core::attr_path::AttrPath;
use granary_core::eval::{Cursor, PackageMeta};

use crate::connection::{LockedInput, PkgDb};
use crate::error::{Error, Result};
use crate::query;
use crate::types::{RowId, ROOT_ATTRSET};

/// Upsert one attribute-set row under `parent`, returning its id.
pub(crate) fn add_or_get_attr_set_id(
    conn: &Connection,
    attr_name: &str,
    parent: RowId,
) -> Result<RowId> {
    let existing: Option<RowId> = conn
        .prepare_cached("SELECT id FROM AttrSets WHERE parent = ?1 AND attrName = ?2")?
        .query_row(params![parent, attr_name], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.prepare_cached("INSERT INTO AttrSets (parent, attrName) VALUES (?1, ?2)")?
        .execute(params![parent, attr_name])?;
    Ok(conn.last_insert_rowid())
}

/// Upsert every step of `path`, threading the parent id left to right.
pub(crate) fn add_or_get_attr_path_id(conn: &Connection, path: &AttrPath) -> Result<RowId> {
    let mut id = ROOT_ATTRSET;
    for attr_name in path.iter() {
        id = add_or_get_attr_set_id(conn, attr_name, id)?;
    }
    Ok(id)
}

/// Upsert a description string, returning its id.
pub(crate) fn add_or_get_description_id(conn: &Connection, description: &str) -> Result<RowId> {
    let existing: Option<RowId> = conn
        .prepare_cached("SELECT id FROM Descriptions WHERE description = ?1")?
        .query_row(params![description], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.prepare_cached("INSERT INTO Descriptions (description) VALUES (?1)")?
        .execute(params![description])?;
    Ok(conn.last_insert_rowid())
}

/// Harvest a derivation cursor and upsert its package row.
///
/// With `replace` the row is updated in place on conflict; otherwise an
/// existing row wins. `check_drv` verifies the cursor is a derivation and
/// fails with [`Error::NotADerivation`] when it is not.
pub(crate) fn add_package(
    conn: &Connection,
    parent_id: RowId,
    attr_name: &str,
    cursor: &dyn Cursor,
    replace: bool,
    check_drv: bool,
) -> Result<RowId> {
    if check_drv && !cursor.is_derivation()? {
        return Err(Error::NotADerivation {
            attr: attr_name.to_string(),
        });
    }

    let meta = PackageMeta::harvest(attr_name, cursor)?;
    let description_id = match &meta.description {
        Some(text) => Some(add_or_get_description_id(conn, text)?),
        None => None,
    };
    let license = meta
        .license
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let outputs = serde_json::to_string(&meta.outputs)?;
    let outputs_to_install = serde_json::to_string(&meta.outputs_to_install)?;

    let sql = if replace {
        r#"
        INSERT INTO Packages (parentId, attrName, name, pname, version, semver, license,
                              outputs, outputsToInstall, broken, unfree, descriptionId,
                              system, position)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT (parentId, attrName) DO UPDATE SET
            name = excluded.name, pname = excluded.pname, version = excluded.version,
            semver = excluded.semver, license = excluded.license,
            outputs = excluded.outputs, outputsToInstall = excluded.outputsToInstall,
            broken = excluded.broken, unfree = excluded.unfree,
            descriptionId = excluded.descriptionId, system = excluded.system,
            position = excluded.position
        "#
    } else {
        r#"
        INSERT INTO Packages (parentId, attrName, name, pname, version, semver, license,
                              outputs, outputsToInstall, broken, unfree, descriptionId,
                              system, position)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT (parentId, attrName) DO NOTHING
        "#
    };
    conn.prepare_cached(sql)?.execute(params![
        parent_id,
        attr_name,
        meta.name,
        meta.pname,
        meta.version,
        meta.semver,
        license,
        outputs,
        outputs_to_install,
        meta.broken,
        meta.unfree,
        description_id,
        meta.system,
        meta.position,
    ])?;

    let id: RowId = conn
        .prepare_cached("SELECT id FROM Packages WHERE parentId = ?1 AND attrName = ?2")?
        .query_row(params![parent_id, attr_name], |row| row.get(0))?;
    Ok(id)
}

/// Mark an attribute set and, transitively, all of its children.
pub(crate) fn set_prefix_done(conn: &Connection, prefix_id: RowId, done: bool) -> Result<()> {
    conn.prepare_cached(
        r#"
        UPDATE AttrSets SET done = ?2
        WHERE id IN (
            WITH RECURSIVE Prefix(id) AS (
                SELECT id FROM AttrSets WHERE id = ?1
                UNION ALL
                SELECT a.id FROM AttrSets a JOIN Prefix p ON a.parent = p.id
            )
            SELECT id FROM Prefix
        )
        "#,
    )?
    .execute(params![prefix_id, done])?;
    Ok(())
}

/// Upsert a `DbVersions` row.
pub(crate) fn set_db_version(conn: &Connection, name: &str, version: &str) -> Result<()> {
    conn.prepare_cached(
        r#"
        INSERT INTO DbVersions (name, version) VALUES (?1, ?2)
        ON CONFLICT (name) DO UPDATE SET version = excluded.version
        "#,
    )?
    .execute(params![name, version])?;
    Ok(())
}

/// Record the locked input a database caches. First write wins.
pub(crate) fn write_locked_input(conn: &Connection, input: &LockedInput) -> Result<()> {
    conn.prepare_cached(
        r#"
        INSERT INTO LockedFlake (fingerprint, string, attrs) VALUES (?1, ?2, ?3)
        ON CONFLICT (fingerprint) DO NOTHING
        "#,
    )?
    .execute(params![
        input.fingerprint.to_string(),
        input.locked_ref,
        input.attrs.to_string(),
    ])?;
    Ok(())
}

impl PkgDb {
    /// Get the `AttrSets.id` for `attr_name` under `parent`, inserting a
    /// row if none exists. `parent` 0 means a top-level attribute set.
    pub fn add_or_get_attr_set_id(&self, attr_name: &str, parent: RowId) -> Result<RowId> {
        add_or_get_attr_set_id(&self.conn, attr_name, parent)
    }

    /// Get the `AttrSets.id` for an attribute path prefix such as
    /// `packages.x86_64-linux`, inserting rows as needed.
    pub fn add_or_get_attr_path_id(&self, path: &AttrPath) -> Result<RowId> {
        add_or_get_attr_path_id(&self.conn, path)
    }

    /// Get the `Descriptions.id` for a description string, inserting a row
    /// if none exists.
    pub fn add_or_get_description_id(&self, description: &str) -> Result<RowId> {
        add_or_get_description_id(&self.conn, description)
    }

    /// Add a package under the attribute set `parent_id`, returning its
    /// `Packages.id`. See the module-level [`add_package`] for semantics.
    pub fn add_package(
        &self,
        parent_id: RowId,
        attr_name: &str,
        cursor: &dyn Cursor,
        replace: bool,
        check_drv: bool,
    ) -> Result<RowId> {
        add_package(&self.conn, parent_id, attr_name, cursor, replace, check_drv)
    }

    /// Update the `done` column for an attribute set and all of its
    /// children recursively.
    pub fn set_prefix_done(&self, prefix_id: RowId, done: bool) -> Result<()> {
        set_prefix_done(&self.conn, prefix_id, done)
    }

    /// Path-based overload of [`PkgDb::set_prefix_done`]. A prefix that was
    /// never recorded is a no-op.
    pub fn set_prefix_done_at(&self, prefix: &AttrPath, done: bool) -> Result<()> {
        match query::attr_set_id(&self.conn, prefix.as_slice())? {
            Some(id) => set_prefix_done(&self.conn, id, done),
            None => {
                warn!(prefix = %prefix, "set_prefix_done on unknown prefix");
                Ok(())
            }
        }
    }

    /// Upsert a `DbVersions` row.
    pub fn set_db_version(&self, name: &str, version: &str) -> Result<()> {
        set_db_version(&self.conn, name, version)
    }
}
