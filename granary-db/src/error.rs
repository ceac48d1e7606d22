// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Error types for package database operations.

use std::path::PathBuf;

use thiserror::Error;

use granary_core::eval::EvalError;
use granary_core::rules::RulesError;

/// Result type for package database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during package database operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database file not found
    #[error("Database not found at: {0}")]
    NoSuchDatabase(PathBuf),

    /// Table schema incompatible with this build
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// `add_package` asked to verify a non-derivation
    #[error("Attribute '{attr}' is not a derivation")]
    NotADerivation { attr: String },

    /// Scrape rules failed to compile
    #[error("Scrape rules error: {0}")]
    Rules(#[from] RulesError),

    /// Evaluator failure carried through from the cursor capability
    #[error("Evaluator error: {0}")]
    Eval(#[from] EvalError),

    /// Malformed JSON in a database column
    #[error("Invalid JSON in database: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed fingerprint in the LockedFlake table
    #[error("Invalid fingerprint in database: {0}")]
    Fingerprint(#[from] granary_core::ParseFingerprintError),
}
