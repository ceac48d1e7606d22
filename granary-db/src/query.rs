// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Read queries over the package cache.

use rusqlite::{params, Connection, OptionalExtension};

use granary_core::attr_path::AttrPath;

use crate::connection::{LockedInput, PkgDb};
use crate::error::{Error, Result};
use crate::types::{AttrSetRow, PackageRow, RowId, ROOT_ATTRSET};

/// Read a `DbVersions` row.
pub(crate) fn db_version(conn: &Connection, name: &str) -> Result<Option<String>> {
    Ok(conn
        .prepare_cached("SELECT version FROM DbVersions WHERE name = ?1")?
        .query_row(params![name], |row| row.get(0))
        .optional()?)
}

/// Resolve an attribute path to its `AttrSets.id` by walking the parent
/// chain. `None` when any step is missing.
pub(crate) fn attr_set_id(conn: &Connection, path: &[String]) -> Result<Option<RowId>> {
    let mut id = ROOT_ATTRSET;
    let mut stmt =
        conn.prepare_cached("SELECT id FROM AttrSets WHERE parent = ?1 AND attrName = ?2")?;
    for attr_name in path {
        match stmt
            .query_row(params![id, attr_name], |row| row.get(0))
            .optional()?
        {
            Some(next) => id = next,
            None => return Ok(None),
        }
    }
    Ok(Some(id))
}

fn decode_json_list(raw: Option<String>) -> Result<Option<Vec<String>>> {
    raw.map(|text| serde_json::from_str(&text).map_err(Error::Json))
        .transpose()
}

impl PkgDb {
    /// Read a `DbVersions` row.
    pub fn db_version(&self, name: &str) -> Result<Option<String>> {
        db_version(&self.conn, name)
    }

    /// Resolve an attribute path to its `AttrSets.id`.
    pub fn attr_set_id(&self, path: &AttrPath) -> Result<Option<RowId>> {
        attr_set_id(&self.conn, path.as_slice())
    }

    /// Read an AttrSets row by id.
    pub fn attr_set(&self, id: RowId) -> Result<Option<AttrSetRow>> {
        Ok(self
            .conn
            .prepare_cached("SELECT id, parent, attrName, done FROM AttrSets WHERE id = ?1")?
            .query_row(params![id], |row| {
                Ok(AttrSetRow {
                    id: row.get(0)?,
                    parent: row.get(1)?,
                    attr_name: row.get(2)?,
                    done: row.get::<_, i64>(3)? != 0,
                })
            })
            .optional()?)
    }

    /// Whether the attribute set at `path` is marked done.
    ///
    /// `None` when the path was never recorded.
    pub fn attr_set_done(&self, path: &AttrPath) -> Result<Option<bool>> {
        match self.attr_set_id(path)? {
            Some(id) => Ok(self.attr_set(id)?.map(|row| row.done)),
            None => Ok(None),
        }
    }

    /// Read a package row under `parent_id` by attribute name.
    pub fn package(&self, parent_id: RowId, attr_name: &str) -> Result<Option<PackageRow>> {
        let row = self
            .conn
            .prepare_cached(
                r#"
                SELECT p.id, p.parentId, p.attrName, p.name, p.pname, p.version, p.semver,
                       p.license, p.outputs, p.outputsToInstall, p.broken, p.unfree,
                       d.description, p.system, p.position
                FROM Packages p
                LEFT JOIN Descriptions d ON p.descriptionId = d.id
                WHERE p.parentId = ?1 AND p.attrName = ?2
                "#,
            )?
            .query_row(params![parent_id, attr_name], |row| {
                Ok((
                    row.get::<_, RowId>(0)?,
                    row.get::<_, RowId>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<i64>>(10)?,
                    row.get::<_, Option<i64>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, Option<String>>(13)?,
                    row.get::<_, Option<String>>(14)?,
                ))
            })
            .optional()?;

        let Some((
            id,
            parent_id,
            attr_name,
            name,
            pname,
            version,
            semver,
            license,
            outputs,
            outputs_to_install,
            broken,
            unfree,
            description,
            system,
            position,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(PackageRow {
            id,
            parent_id,
            attr_name,
            name,
            pname,
            version,
            semver,
            license: decode_json_list(license)?,
            outputs: serde_json::from_str(&outputs)?,
            outputs_to_install: decode_json_list(outputs_to_install)?,
            broken: broken.map(|b| b != 0),
            unfree: unfree.map(|b| b != 0),
            description,
            system,
            position,
        }))
    }

    /// Read a package row by its full attribute path.
    pub fn package_at(&self, path: &AttrPath) -> Result<Option<PackageRow>> {
        let Some(attr_name) = path.last() else {
            return Ok(None);
        };
        let Some(parent) = path.parent() else {
            return Ok(None);
        };
        match self.attr_set_id(&parent)? {
            Some(parent_id) => self.package(parent_id, attr_name),
            None => Ok(None),
        }
    }

    /// Count all package rows.
    pub fn count_packages(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM Packages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Full attribute paths of all packages, sorted, via the search view.
    pub fn package_attr_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT attrPath FROM v_Packages ORDER BY attrPath")?;
        let mut paths = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            paths.push(row.get(0)?);
        }
        Ok(paths)
    }

    /// The locked input recorded at creation, if any.
    pub fn locked_input(&self) -> Result<Option<LockedInput>> {
        let row = self
            .conn
            .prepare_cached("SELECT fingerprint, string, attrs FROM LockedFlake LIMIT 1")?
            .query_row([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .optional()?;
        let Some((fingerprint, locked_ref, attrs)) = row else {
            return Ok(None);
        };
        Ok(Some(LockedInput {
            locked_ref,
            attrs: serde_json::from_str(&attrs)?,
            fingerprint: fingerprint.parse::<granary_core::Fingerprint>()?,
        }))
    }

    /// Whether a view with `name` exists.
    pub fn view_exists(&self, name: &str) -> Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='view' AND name=?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
