//! Scrape rules: which sub-trees to descend and which leaves to record.
//!
//! A raw rules document (four lists of globbed attribute paths) compiles
//! into a [`RuleTreeNode`] prefix tree mirroring the attribute namespace.
//! Ancestors pass recursive rules down to descendants unless a deeper node
//! overrides them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::attr_path::{AttrPathGlob, GlobPart};
use crate::hash::sha256_hex;
use crate::system::DEFAULT_SYSTEMS;

/// A single scrape decision attached to a rule-tree node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrapeRule {
    /// Empty sentinel; never produced by compilation.
    None,
    /// No opinion; inherit from ancestors.
    #[default]
    Default,
    /// Force a package row for this leaf.
    AllowPackage,
    /// Never record a package row for this leaf.
    DisallowPackage,
    /// Scrape this sub-tree unconditionally.
    AllowRecursive,
    /// Ignore this sub-tree unless a descendant overrides.
    DisallowRecursive,
}

impl ScrapeRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeRule::None => "UNSET",
            ScrapeRule::Default => "default",
            ScrapeRule::AllowPackage => "allowPackage",
            ScrapeRule::DisallowPackage => "disallowPackage",
            ScrapeRule::AllowRecursive => "allowRecursive",
            ScrapeRule::DisallowRecursive => "disallowRecursive",
        }
    }
}

impl fmt::Display for ScrapeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("attempted to overwrite rule '{existing}' at '{attr_name}' with '{incoming}'")]
    RuleConflict {
        attr_name: String,
        existing: ScrapeRule,
        incoming: ScrapeRule,
    },

    #[error("unknown scrape rule: '{0}'")]
    UnknownRuleKey(String),

    #[error("wildcard outside the system position in '{0}'")]
    InvalidGlob(AttrPathGlob),

    #[error("rules document must be a JSON object")]
    NotAnObject,

    #[error("rule list '{0}' must be a JSON array")]
    NotAList(&'static str),

    #[error("couldn't interpret element of '{list}': {source}")]
    InvalidPath {
        list: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Raw allow/disallow lists as found in a rules document.
#[derive(Debug, Clone, Default)]
pub struct RulesRaw {
    pub allow_package: Vec<AttrPathGlob>,
    pub disallow_package: Vec<AttrPathGlob>,
    pub allow_recursive: Vec<AttrPathGlob>,
    pub disallow_recursive: Vec<AttrPathGlob>,
}

impl RulesRaw {
    pub fn from_json_str(raw: &str) -> Result<Self, RulesError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Parse a rules document, rejecting unknown keys and misplaced globs.
    pub fn from_value(value: &Value) -> Result<Self, RulesError> {
        let Value::Object(obj) = value else {
            return Err(RulesError::NotAnObject);
        };
        let mut rules = RulesRaw::default();
        for (key, list) in obj {
            let (target, list_name) = match key.as_str() {
                "allowPackage" => (&mut rules.allow_package, "allowPackage"),
                "disallowPackage" => (&mut rules.disallow_package, "disallowPackage"),
                "allowRecursive" => (&mut rules.allow_recursive, "allowRecursive"),
                "disallowRecursive" => (&mut rules.disallow_recursive, "disallowRecursive"),
                other => return Err(RulesError::UnknownRuleKey(other.to_string())),
            };
            let elements = list.as_array().ok_or(RulesError::NotAList(list_name))?;
            for element in elements {
                let glob: AttrPathGlob = serde_json::from_value(element.clone())
                    .map_err(|source| RulesError::InvalidPath { list: list_name, source })?;
                if glob.misplaced_glob().is_some() {
                    return Err(RulesError::InvalidGlob(glob));
                }
                target.push(glob);
            }
        }
        Ok(rules)
    }
}

/// A prefix tree of scrape rules mirroring the attribute namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTreeNode {
    /// Label of this node relative to its parent; empty at the root.
    pub attr_name: String,
    pub rule: ScrapeRule,
    pub children: BTreeMap<String, RuleTreeNode>,
}

impl RuleTreeNode {
    pub fn new(attr_name: impl Into<String>, rule: ScrapeRule) -> Self {
        Self {
            attr_name: attr_name.into(),
            rule,
            children: BTreeMap::new(),
        }
    }

    /// Compile a raw rules document into a tree rooted at the empty name.
    pub fn from_raw(raw: RulesRaw) -> Result<Self, RulesError> {
        let mut root = RuleTreeNode::default();
        for (list, rule) in [
            (&raw.allow_package, ScrapeRule::AllowPackage),
            (&raw.disallow_package, ScrapeRule::DisallowPackage),
            (&raw.allow_recursive, ScrapeRule::AllowRecursive),
            (&raw.disallow_recursive, ScrapeRule::DisallowRecursive),
        ] {
            for path in list {
                root.add_rule(path.as_slice(), rule)?;
            }
        }
        Ok(root)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RulesError> {
        Self::from_raw(RulesRaw::from_json_str(raw)?)
    }

    /// Install `rule` at `rel_path` below this node.
    ///
    /// The system wildcard expands into one call per supported system.
    /// Re-assigning the rule a node already carries is a no-op; assigning a
    /// different one is a conflict.
    pub fn add_rule(&mut self, rel_path: &[GlobPart], rule: ScrapeRule) -> Result<(), RulesError> {
        let Some((head, rest)) = rel_path.split_first() else {
            if self.rule == rule {
                return Ok(());
            }
            if self.rule != ScrapeRule::Default {
                return Err(RulesError::RuleConflict {
                    attr_name: self.attr_name.clone(),
                    existing: self.rule,
                    incoming: rule,
                });
            }
            trace!(attr = %self.attr_name, rule = %rule, "assigning rule");
            self.rule = rule;
            return Ok(());
        };

        match head {
            GlobPart::Glob => {
                for system in DEFAULT_SYSTEMS {
                    let mut expanded = Vec::with_capacity(rel_path.len());
                    expanded.push(GlobPart::Name(system.to_string()));
                    expanded.extend(rest.iter().cloned());
                    self.add_rule(&expanded, rule)?;
                }
                Ok(())
            }
            GlobPart::Name(name) => self
                .children
                .entry(name.clone())
                .or_insert_with(|| RuleTreeNode::new(name.clone(), ScrapeRule::Default))
                .add_rule(rest, rule),
        }
    }

    /// The rule stored at `path`, or `Default` when no such node exists.
    pub fn get_rule(&self, path: &[String]) -> ScrapeRule {
        let mut node = self;
        for attr_name in path {
            match node.children.get(attr_name) {
                Some(child) => node = child,
                None => return ScrapeRule::Default,
            }
        }
        node.rule
    }

    /// Resolve the effective allow/disallow decision for `path`.
    ///
    /// Walks up through ancestors while the answer is `Default`; returns
    /// `None` when no rule applies anywhere on the path.
    pub fn apply_rules(&self, path: &[String]) -> Option<bool> {
        let mut rule = self.get_rule(path);
        let mut prefix = path;
        while rule == ScrapeRule::Default && !prefix.is_empty() {
            prefix = &prefix[..prefix.len() - 1];
            rule = self.get_rule(prefix);
        }
        match rule {
            ScrapeRule::AllowPackage | ScrapeRule::AllowRecursive => Some(true),
            ScrapeRule::DisallowPackage | ScrapeRule::DisallowRecursive => Some(false),
            ScrapeRule::Default | ScrapeRule::None => None,
        }
    }

    /// Canonical JSON encoding: `__rule` plus one key per child, keys sorted.
    pub fn to_canonical_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "__rule".to_string(),
            Value::String(self.rule.as_str().to_string()),
        );
        for (name, child) in &self.children {
            obj.insert(name.clone(), child.to_canonical_json());
        }
        Value::Object(obj)
    }

    /// SHA-256 of the canonical JSON encoding, hex lowercase.
    ///
    /// Stored in `DbVersions` so consumers can detect rule changes.
    pub fn get_hash(&self) -> String {
        sha256_hex(self.to_canonical_json().to_string())
    }
}

static DEFAULT_RULES: LazyLock<RuleTreeNode> = LazyLock::new(|| {
    RuleTreeNode::from_json_str(include_str!("rules.json"))
        .expect("embedded default rules must compile")
});

/// The rule set used when the caller supplies none.
///
/// Compiled once per process from the embedded document.
pub fn default_rules() -> &'static RuleTreeNode {
    &DEFAULT_RULES
}
