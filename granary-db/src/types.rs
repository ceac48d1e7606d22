// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Database row types for the package cache.

/// Row id assigned by the database.
pub type RowId = i64;

/// Sentinel `parent` value for top-level attribute sets.
pub const ROOT_ATTRSET: RowId = 0;

/// A row from the AttrSets table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSetRow {
    pub id: RowId,
    /// `ROOT_ATTRSET` when this set has no parent.
    pub parent: RowId,
    pub attr_name: String,
    pub done: bool,
}

/// A row from the Packages table with its description resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub id: RowId,
    pub parent_id: RowId,
    pub attr_name: String,
    pub name: String,
    pub pname: Option<String>,
    pub version: Option<String>,
    pub semver: Option<String>,
    /// SPDX identifiers, decoded from the JSON column.
    pub license: Option<Vec<String>>,
    pub outputs: Vec<String>,
    pub outputs_to_install: Option<Vec<String>>,
    pub broken: Option<bool>,
    pub unfree: Option<bool>,
    pub description: Option<String>,
    pub system: Option<String>,
    pub position: Option<String>,
}
