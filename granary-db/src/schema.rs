// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Database schema definitions for the package cache.
//!
//! Tables are append-only during a scrape and never destructively migrated;
//! views may be dropped and recreated when `pkgdb_views_schema` is stale.

/// Core tables (DbVersions, LockedFlake, AttrSets, Descriptions, Packages)
pub const TABLES_SQL: &str = r#"
create table if not exists DbVersions (
    name    text primary key,
    version text not null
);

create table if not exists LockedFlake (
    fingerprint text primary key,
    string      text not null,
    attrs       json not null
);

create table if not exists AttrSets (
    id       integer primary key autoincrement not null,
    parent   integer not null default 0,
    attrName text    not null,
    done     integer not null default 0,
    unique (parent, attrName)
);

create index if not exists IndexAttrSetsParent on AttrSets(parent);

create table if not exists Descriptions (
    id          integer primary key autoincrement not null,
    description text unique not null
);

create table if not exists Packages (
    id               integer primary key autoincrement not null,
    parentId         integer not null,
    attrName         text    not null,
    name             text    not null,
    pname            text,
    version          text,
    semver           text,
    license          json,
    outputs          json not null default '["out"]',
    outputsToInstall json,
    broken           integer,
    unfree           integer,
    descriptionId    integer,
    system           text,
    position         text,
    unique (parentId, attrName),
    foreign key (parentId) references AttrSets(id),
    foreign key (descriptionId) references Descriptions(id)
);

create index if not exists IndexPackagesParent on Packages(parentId);
"#;

/// Views reconstructing full attribute paths and a denormalised search table
pub const VIEWS_SQL: &str = r#"
create view if not exists v_AttrPaths as
with recursive Tree(id, attrPath) as (
    select id, attrName from AttrSets where parent = 0
    union all
    select a.id, t.attrPath || '.' || a.attrName
    from AttrSets a join Tree t on a.parent = t.id
)
select id, attrPath from Tree;

create view if not exists v_Packages as
select p.id, t.attrPath || '.' || p.attrName as attrPath,
       p.attrName, p.name, p.pname, p.version, p.semver, p.license,
       p.outputs, p.outputsToInstall, p.broken, p.unfree,
       d.description, p.system, p.position
from Packages p
join v_AttrPaths t on p.parentId = t.id
left join Descriptions d on p.descriptionId = d.id;
"#;

/// Dropped (and recreated) when `pkgdb_views_schema` is stale
pub const DROP_VIEWS_SQL: &str = r#"
drop view if exists v_Packages;
drop view if exists v_AttrPaths;
"#;

/// Table schema version; a mismatch is a hard incompatibility
pub const SCHEMA_VERSION: &str = "0.2.0";

/// View schema version; a mismatch triggers view recreation
pub const VIEWS_VERSION: &str = "0.2.0";
