// SPDX-FileCopyrightText: 2026 Granary contributors
// SPDX-License-Identifier: MIT

//! End-to-end scrape scenarios against the in-memory evaluator mock.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use granary_core::attr_path::AttrPath;
use granary_core::rules::RuleTreeNode;
use granary_db::{PkgDb, ScrapeOutcome, Scraper, Target, Todos};

use common::{broken, drv, drv_with, leaf, no_recurse_set, recurse_set, set, test_input, MemCursor};

fn rules(raw: &str) -> RuleTreeNode {
    RuleTreeNode::from_json_str(raw).unwrap()
}

/// Full table contents, for idempotence comparisons.
fn dump(db: &PkgDb) -> (Vec<(i64, i64, String, i64)>, Vec<(i64, i64, String, String)>) {
    let conn = db.connection();
    let mut stmt = conn
        .prepare("SELECT id, parent, attrName, done FROM AttrSets ORDER BY id")
        .unwrap();
    let attr_sets = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let mut stmt = conn
        .prepare("SELECT id, parentId, attrName, name FROM Packages ORDER BY id")
        .unwrap();
    let packages = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .unwrap()
        .map(Result::unwrap)
        .collect();
    (attr_sets, packages)
}

/// An allowed recursive prefix records derivations and skips plain values.
#[test]
fn test_scrape_records_allowed_packages() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("hello", drv("hello", "2.12.1")),
        ("internal", set(vec![("foo", leaf(json!("just a string")))])),
    ]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    let outcome = scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();
    assert_eq!(outcome, ScrapeOutcome::Complete);

    assert_eq!(
        db.package_attr_paths().unwrap(),
        ["packages.x86_64-linux.hello"]
    );
    assert_eq!(db.attr_set_done(&prefix).unwrap(), Some(true));
}

/// A globbed allow with a package-level disallow: the disallowed leaf is
/// omitted on its system only.
#[test]
fn test_scrape_glob_allow_with_package_disallow() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(
        r#"{
             "allowRecursive": ["packages.*"],
             "disallowPackage": ["packages.x86_64-linux.evil"]
           }"#,
    );

    let linux = set(vec![
        ("good", drv("good", "1.0.0")),
        ("evil", drv("evil", "1.0.0")),
    ]);
    let darwin = set(vec![("good", drv("good", "1.0.0"))]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper
        .scrape_prefix(&AttrPath::parse("packages.x86_64-linux"), MemCursor::root(linux))
        .unwrap();
    scraper
        .scrape_prefix(&AttrPath::parse("packages.aarch64-darwin"), MemCursor::root(darwin))
        .unwrap();

    assert_eq!(
        db.package_attr_paths().unwrap(),
        [
            "packages.aarch64-darwin.good",
            "packages.x86_64-linux.good"
        ]
    );
}

/// A disallowed recursive sub-tree is pruned without evaluating its leaves.
#[test]
fn test_scrape_disallow_recursive_prunes_subtree() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(
        r#"{
             "allowRecursive": ["packages.x86_64-linux"],
             "disallowRecursive": ["packages.x86_64-linux.internal"]
           }"#,
    );
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("hello", drv("hello", "2.12.1")),
        ("internal", set(vec![("secret", drv("secret", "0.1.0"))])),
    ]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();

    assert_eq!(
        db.package_attr_paths().unwrap(),
        ["packages.x86_64-linux.hello"]
    );
    assert_eq!(
        db.attr_set_id(&prefix.child("internal")).unwrap(),
        None,
        "pruned sub-trees must not leave AttrSets rows"
    );
}

/// With no applicable rule the evaluator's own recursion convention wins.
#[test]
fn test_scrape_honours_recurse_for_derivations() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules("{}");
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("pyPkgs", recurse_set(vec![("numpy", drv("numpy", "1.26.4"))])),
        ("hidden", set(vec![("gem", drv("gem", "3.5.0"))])),
        ("opted-out", no_recurse_set(vec![("tool", drv("tool", "1.0.0"))])),
    ]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();

    assert_eq!(
        db.package_attr_paths().unwrap(),
        ["packages.x86_64-linux.pyPkgs.numpy"]
    );
}

/// A child that fails to evaluate is skipped; its siblings still land.
#[test]
fn test_scrape_skips_broken_children() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("bad", broken("assertion failed")),
        ("good", drv("good", "1.0.0")),
    ]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    let outcome = scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();
    assert_eq!(outcome, ScrapeOutcome::Complete);

    assert_eq!(
        db.package_attr_paths().unwrap(),
        ["packages.x86_64-linux.good"]
    );
}

/// Scraping twice produces identical database contents.
#[test]
fn test_scrape_is_idempotent() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("hello", drv_with("hello", "2.12.1", json!({ "description": "greeter" }))),
        ("pyPkgs", recurse_set(vec![("numpy", drv("numpy", "1.26.4"))])),
    ]);

    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper
        .scrape_prefix(&prefix, MemCursor::root(tree.clone()))
        .unwrap();
    let first = dump(&db);

    // Force a full re-walk rather than the done fast-path.
    db.set_prefix_done_at(&prefix, false).unwrap();
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();

    assert_eq!(dump(&db), first);
}

/// An interrupted scrape restarts cleanly and completes the remainder.
#[test]
fn test_scrape_restarts_after_interruption() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let tree = set(vec![
        ("hello", drv("hello", "2.12.1")),
        ("pyPkgs", recurse_set(vec![("numpy", drv("numpy", "1.26.4"))])),
    ]);

    // Process only the root target, then "crash" before the queue drains.
    let root_id = db.add_or_get_attr_path_id(&prefix).unwrap();
    let mut todo = Todos::new();
    todo.push_back(Target {
        path: prefix.clone(),
        cursor: MemCursor::root(tree.clone()),
        parent_id: root_id,
    });
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    let target = todo.pop_front().unwrap();
    scraper.scrape(&target, &mut todo).unwrap();
    assert_eq!(todo.len(), 1, "pyPkgs should be pending");
    drop(todo);

    assert_eq!(db.attr_set_done(&prefix).unwrap(), Some(false));
    assert_eq!(
        db.package_attr_paths().unwrap(),
        ["packages.x86_64-linux.hello"]
    );

    // Restart over the same database.
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    let outcome = scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();
    assert_eq!(outcome, ScrapeOutcome::Complete);

    assert_eq!(
        db.package_attr_paths().unwrap(),
        [
            "packages.x86_64-linux.hello",
            "packages.x86_64-linux.pyPkgs.numpy"
        ]
    );
    assert_eq!(db.attr_set_done(&prefix).unwrap(), Some(true));
    assert_eq!(
        db.attr_set_done(&prefix.child("pyPkgs")).unwrap(),
        Some(true)
    );

    // No duplicated rows after the restart.
    let (attr_sets, packages) = dump(&db);
    assert_eq!(attr_sets.len(), 3);
    assert_eq!(packages.len(), 2);
}

/// Cancellation between targets keeps committed work and leaves the prefix
/// not done.
#[test]
fn test_scrape_cancellation() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");
    let tree = set(vec![("hello", drv("hello", "2.12.1"))]);

    let flag = Arc::new(AtomicBool::new(true));
    let mut scraper = Scraper::with_rules(&mut db, &r)
        .unwrap()
        .cancel_flag(flag.clone());
    let outcome = scraper
        .scrape_prefix(&prefix, MemCursor::root(tree.clone()))
        .unwrap();
    assert_eq!(outcome, ScrapeOutcome::Cancelled);
    assert_eq!(db.attr_set_done(&prefix).unwrap(), Some(false));
    assert_eq!(db.count_packages().unwrap(), 0);

    flag.store(false, Ordering::Relaxed);
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap().cancel_flag(flag);
    let outcome = scraper.scrape_prefix(&prefix, MemCursor::root(tree)).unwrap();
    assert_eq!(outcome, ScrapeOutcome::Complete);
    assert_eq!(db.count_packages().unwrap(), 1);
}

/// A prefix already marked done is not re-walked.
#[test]
fn test_scrape_skips_done_prefix() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let prefix = AttrPath::parse("packages.x86_64-linux");

    let before = set(vec![("hello", drv("hello", "2.12.1"))]);
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    scraper.scrape_prefix(&prefix, MemCursor::root(before)).unwrap();

    let after = set(vec![
        ("hello", drv("hello", "2.12.1")),
        ("late", drv("late", "0.1.0")),
    ]);
    let mut scraper = Scraper::with_rules(&mut db, &r).unwrap();
    let outcome = scraper.scrape_prefix(&prefix, MemCursor::root(after)).unwrap();
    assert_eq!(outcome, ScrapeOutcome::Complete);

    assert_eq!(db.count_packages().unwrap(), 1, "done prefixes are final");
}

/// Custom rule sets stamp their content hash into DbVersions.
#[test]
fn test_scraper_stamps_rules_hash() {
    let mut db = PkgDb::open_memory(&test_input()).unwrap();
    let r = rules(r#"{ "allowRecursive": ["packages.x86_64-linux"] }"#);
    let expected = r.get_hash();

    Scraper::with_rules(&mut db, &r).unwrap();
    assert_eq!(
        db.db_version("pkgdb_rules_hash").unwrap().as_deref(),
        Some(expected.as_str())
    );
}
