// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! Rule-guided breadth-first traversal of the attribute tree.
//!
//! The driver pops one [`Target`] at a time off a FIFO queue, classifies
//! each child through the cursor capability, records allowed derivations,
//! and enqueues sub-trees worth descending into. Each popped target runs
//! inside its own transaction so an interrupted scrape loses at most the
//! target in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, warn};

use granary_core::attr_path::AttrPath;
use granary_core::eval::CursorRef;
use granary_core::rules::{default_rules, RuleTreeNode};

use crate::connection::PkgDb;
use crate::error::{Error, Result};
use crate::types::RowId;
use crate::write;

/// One unit of scrape work: a sub-tree rooted at `path`.
///
/// `parent_id` is the `AttrSets.id` under which children of this sub-tree
/// are recorded.
pub struct Target {
    pub path: AttrPath,
    pub cursor: CursorRef,
    pub parent_id: RowId,
}

/// FIFO queue of pending sub-trees. No priority, no deduplication:
/// children are enumerated once per parent and upserts are idempotent.
pub type Todos = VecDeque<Target>;

/// How a scrape run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// The queue drained and the prefix was marked done.
    Complete,
    /// The cancellation signal fired between targets; committed targets
    /// are kept, the prefix stays not-done.
    Cancelled,
}

/// Scrape engine driving a [`PkgDb`] under a compiled rule tree.
///
/// Single-threaded and synchronous; the engine owns the database
/// connection for the duration of a scrape.
pub struct Scraper<'a> {
    db: &'a mut PkgDb,
    rules: &'a RuleTreeNode,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Scraper<'a> {
    /// A scraper using the embedded default rules.
    pub fn new(db: &'a mut PkgDb) -> Result<Self> {
        Ok(Self {
            db,
            rules: default_rules(),
            cancel: None,
        })
    }

    /// A scraper using a caller-compiled rule tree.
    ///
    /// Stamps `pkgdb_rules_hash` so consumers can detect rule changes.
    pub fn with_rules(db: &'a mut PkgDb, rules: &'a RuleTreeNode) -> Result<Self> {
        db.set_db_version("pkgdb_rules_hash", &rules.get_hash())?;
        Ok(Self {
            db,
            rules,
            cancel: None,
        })
    }

    /// Install a cancellation flag, polled between targets.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Scrape everything reachable under `prefix` through `cursor`.
    ///
    /// On successful return every allowed descendant package has a row, no
    /// disallowed package does, and the prefix and all visited descendants
    /// are marked done. Re-running over the same database is a no-op.
    pub fn scrape_prefix(&mut self, prefix: &AttrPath, cursor: CursorRef) -> Result<ScrapeOutcome> {
        if self.db.attr_set_done(prefix)? == Some(true) {
            debug!(prefix = %prefix, "prefix already scraped");
            return Ok(ScrapeOutcome::Complete);
        }

        let root_id = self.db.add_or_get_attr_path_id(prefix)?;
        let mut todo: Todos = VecDeque::new();
        todo.push_back(Target {
            path: prefix.clone(),
            cursor,
            parent_id: root_id,
        });

        while let Some(target) = todo.pop_front() {
            if self.cancelled() {
                debug!(prefix = %prefix, "scrape cancelled between targets");
                return Ok(ScrapeOutcome::Cancelled);
            }
            self.scrape(&target, &mut todo)?;
        }

        self.db.set_prefix_done(root_id, true)?;
        Ok(ScrapeOutcome::Complete)
    }

    /// Scrape one popped target inside its own transaction, pushing
    /// discovered sub-trees onto `todo`.
    pub fn scrape(&mut self, target: &Target, todo: &mut Todos) -> Result<()> {
        let tx = self.db.conn.transaction()?;
        scrape_target(&tx, self.rules, target, todo)?;
        tx.commit()?;
        Ok(())
    }
}

/// Process the children of one target. Rule queries run at the child path
/// before classification so allow/disallow is deterministic regardless of
/// evaluator laziness.
fn scrape_target(
    conn: &Connection,
    rules: &RuleTreeNode,
    target: &Target,
    todo: &mut Todos,
) -> Result<()> {
    debug!(path = %target.path, "scraping attribute set");

    for (attr_name, child) in target.cursor.children()? {
        let child_path = target.path.child(attr_name.as_str());
        let decision = rules.apply_rules(child_path.as_slice());

        // A node that is both an attribute set and a derivation counts as
        // a derivation.
        let is_derivation = match child.is_derivation() {
            Ok(flag) => flag,
            Err(err) => {
                warn!(path = %child_path, error = %err, "skipping child: evaluation failed");
                continue;
            }
        };

        if is_derivation {
            if decision == Some(false) {
                debug!(path = %child_path, "skipping disallowed package");
                continue;
            }
            match write::add_package(conn, target.parent_id, &attr_name, child.as_ref(), false, false)
            {
                Ok(_) => {}
                Err(Error::Eval(err)) => {
                    warn!(path = %child_path, error = %err, "skipping package: evaluation failed");
                }
                Err(err) => return Err(err),
            }
            continue;
        }

        let is_attr_set = match child.is_attr_set() {
            Ok(flag) => flag,
            Err(err) => {
                warn!(path = %child_path, error = %err, "skipping child: evaluation failed");
                continue;
            }
        };
        if !is_attr_set {
            continue;
        }

        let descend = match decision {
            Some(allowed) => allowed,
            // No rule anywhere on the path: honour the evaluator's own
            // recursion convention.
            None => match child.attr("recurseForDerivations") {
                Ok(Some(serde_json::Value::Bool(flag))) => flag,
                Ok(Some(other)) => {
                    warn!(
                        path = %child_path,
                        found = ?other,
                        "recurseForDerivations is not a boolean, not descending"
                    );
                    false
                }
                Ok(None) => false,
                Err(err) => {
                    warn!(path = %child_path, error = %err, "skipping child: evaluation failed");
                    false
                }
            },
        };
        if !descend {
            debug!(path = %child_path, "not descending");
            continue;
        }

        let child_row_id = write::add_or_get_attr_set_id(conn, &attr_name, target.parent_id)?;
        todo.push_back(Target {
            path: child_path,
            cursor: child,
            parent_id: child_row_id,
        });
    }
    Ok(())
}
