// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! SQLite cache of package metadata scraped from a locked flake.
//!
//! This crate owns the database half of granary: one SQLite file per locked
//! input (keyed by its fingerprint) holding the attribute sets and packages
//! discovered by the scrape engine, so downstream tooling can query instead
//! of re-evaluating the flake.
//!
//! # Key Features
//!
//! - Schema management with separate table and view version stamps
//! - Idempotent insertion primitives (attribute sets, descriptions, packages)
//! - Rule-guided breadth-first scrape driver, restartable after interruption
//! - In-memory database for testing
//!
//! # Example
//!
//! ```ignore
//! use granary_db::{PkgDb, Scraper};
//!
//! let mut db = PkgDb::create(&db_path, &locked_input)?;
//! let mut scraper = Scraper::new(&mut db)?;
//! scraper.scrape_prefix(&prefix, root_cursor)?;
//! ```

mod connection;
mod error;
mod query;
mod schema;
mod scrape;
mod types;
mod write;

pub use connection::{LockedInput, OpenMode, PkgDb};
pub use error::{Error, Result};
pub use schema::{SCHEMA_VERSION, VIEWS_VERSION};
pub use scrape::{ScrapeOutcome, Scraper, Target, Todos};
pub use types::*;
